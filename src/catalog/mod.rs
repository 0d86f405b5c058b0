//! Game configuration provider.
//!
//! Game rules (farm rate parameters, upgrade costs, pet and item tables, store
//! prices) live in documents keyed by `config_type`. The economy core only
//! ever reads an immutable [`CatalogSnapshot`]; [`ConfigCache`] swaps in a new
//! snapshot whenever the backing table changes.

pub mod cache;

pub use cache::ConfigCache;

use crate::domain::{Decimal, FarmRate, TimeMs, MANA_UNIT_MS};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use thiserror::Error;

pub const FARM_DATA: &str = "farm_data";
pub const GAME_PETS: &str = "game_pets";
pub const GAME_ITEMS: &str = "game_items";
pub const STORE: &str = "store";

const LEVEL_COST_PREFIX: &str = "cost_level_";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("config document missing: {0}")]
    MissingDocument(String),
    #[error("config document {document} malformed: {reason}")]
    Malformed { document: String, reason: String },
    #[error("no upgrade cost configured for level {0}")]
    MissingLevelCost(u32),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl CatalogError {
    fn malformed(document: &str, reason: impl ToString) -> Self {
        CatalogError::Malformed {
            document: document.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarmData {
    pub rate: FarmRate,
    /// Cost to reach a level, keyed by the target level.
    pub level_costs: BTreeMap<u32, Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PetSpec {
    /// Mana window in 8-hour units.
    pub max_mana: Decimal,
    max_mana_ms: i64,
}

impl PetSpec {
    pub fn max_mana_ms(&self) -> i64 {
        self.max_mana_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSpec {
    /// Mana restored per unit, in 8-hour units.
    pub mana: Decimal,
    pub cost: Decimal,
    mana_ms: i64,
}

impl ItemSpec {
    pub fn mana_ms(&self) -> i64 {
        self.mana_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOffer {
    pub level: u32,
    pub cost: Decimal,
}

/// Largest magnitude accepted for any numeric config value.
///
/// Keeps every product the economy forms from config (cost times quantity,
/// speed times days) far inside the decimal range.
pub const MAX_CONFIG_VALUE: i64 = 1_000_000_000_000_000;

fn mana_units_to_ms(document: &str, units: Decimal) -> Result<i64, CatalogError> {
    use rust_decimal::prelude::ToPrimitive;
    if units.is_negative() {
        return Err(CatalogError::malformed(document, "mana must not be negative"));
    }
    units
        .checked_mul(Decimal::from(MANA_UNIT_MS))
        .and_then(|ms| ms.floor_dp(0).inner().to_i64())
        .ok_or_else(|| CatalogError::malformed(document, format!("mana {} is out of range", units)))
}

fn number_to_decimal(document: &str, n: &serde_json::Number) -> Result<Decimal, CatalogError> {
    let value =
        Decimal::from_str(&n.to_string()).map_err(|e| CatalogError::malformed(document, e))?;
    if value.inner().abs() > Decimal::from(MAX_CONFIG_VALUE).inner() {
        return Err(CatalogError::malformed(document, format!("{} is out of range", n)));
    }
    Ok(value)
}

#[derive(Deserialize)]
struct RawPets {
    pets: HashMap<String, RawPetSpec>,
}

#[derive(Deserialize)]
struct RawPetSpec {
    max_mana: serde_json::Number,
}

#[derive(Deserialize)]
struct RawItems {
    items: HashMap<String, RawItemSpec>,
}

#[derive(Deserialize)]
struct RawItemSpec {
    mana: serde_json::Number,
    cost: serde_json::Number,
}

#[derive(Deserialize)]
struct RawStore {
    pets: HashMap<String, Vec<RawOffer>>,
}

#[derive(Deserialize)]
struct RawOffer {
    level: u32,
    cost: serde_json::Number,
}

/// Immutable, fully parsed view of every config document.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    documents: BTreeMap<String, serde_json::Value>,
    farm: Option<FarmData>,
    pets: HashMap<String, PetSpec>,
    items: HashMap<String, ItemSpec>,
    store: HashMap<String, Vec<StoreOffer>>,
    loaded_at: Option<TimeMs>,
}

impl CatalogSnapshot {
    /// Parse raw documents; any malformed known document rejects the whole set.
    pub fn from_documents(
        documents: BTreeMap<String, serde_json::Value>,
        loaded_at: TimeMs,
    ) -> Result<Self, CatalogError> {
        let farm = documents
            .get(FARM_DATA)
            .map(parse_farm_data)
            .transpose()?;

        let pets: HashMap<String, PetSpec> = match documents.get(GAME_PETS) {
            Some(doc) => {
                let raw: RawPets = serde_json::from_value(doc.clone())
                    .map_err(|e| CatalogError::malformed(GAME_PETS, e))?;
                raw.pets
                    .into_iter()
                    .map(|(name, spec)| -> Result<(String, PetSpec), CatalogError> {
                        let max_mana = number_to_decimal(GAME_PETS, &spec.max_mana)?;
                        Ok((
                            name,
                            PetSpec {
                                max_mana,
                                max_mana_ms: mana_units_to_ms(GAME_PETS, max_mana)?,
                            },
                        ))
                    })
                    .collect::<Result<_, CatalogError>>()?
            }
            None => HashMap::new(),
        };

        let items: HashMap<String, ItemSpec> = match documents.get(GAME_ITEMS) {
            Some(doc) => {
                let raw: RawItems = serde_json::from_value(doc.clone())
                    .map_err(|e| CatalogError::malformed(GAME_ITEMS, e))?;
                raw.items
                    .into_iter()
                    .map(|(name, spec)| -> Result<(String, ItemSpec), CatalogError> {
                        let mana = number_to_decimal(GAME_ITEMS, &spec.mana)?;
                        Ok((
                            name,
                            ItemSpec {
                                mana,
                                cost: number_to_decimal(GAME_ITEMS, &spec.cost)?,
                                mana_ms: mana_units_to_ms(GAME_ITEMS, mana)?,
                            },
                        ))
                    })
                    .collect::<Result<_, CatalogError>>()?
            }
            None => HashMap::new(),
        };

        let store: HashMap<String, Vec<StoreOffer>> = match documents.get(STORE) {
            Some(doc) => {
                let raw: RawStore = serde_json::from_value(doc.clone())
                    .map_err(|e| CatalogError::malformed(STORE, e))?;
                raw.pets
                    .into_iter()
                    .map(|(name, offers)| -> Result<(String, Vec<StoreOffer>), CatalogError> {
                        let offers = offers
                            .iter()
                            .map(|o| -> Result<StoreOffer, CatalogError> {
                                Ok(StoreOffer {
                                    level: o.level,
                                    cost: number_to_decimal(STORE, &o.cost)?,
                                })
                            })
                            .collect::<Result<Vec<_>, CatalogError>>()?;
                        Ok((name, offers))
                    })
                    .collect::<Result<_, CatalogError>>()?
            }
            None => HashMap::new(),
        };

        Ok(Self {
            documents,
            farm,
            pets,
            items,
            store,
            loaded_at: Some(loaded_at),
        })
    }

    /// Raw document lookup.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.documents.get(key)
    }

    pub fn documents(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.documents
    }

    pub fn loaded_at(&self) -> Option<TimeMs> {
        self.loaded_at
    }

    pub fn farm(&self) -> Result<&FarmData, CatalogError> {
        self.farm
            .as_ref()
            .ok_or_else(|| CatalogError::MissingDocument(FARM_DATA.to_string()))
    }

    pub fn farm_rate(&self) -> Result<FarmRate, CatalogError> {
        Ok(self.farm()?.rate)
    }

    pub fn level_cost(&self, level: u32) -> Result<Decimal, CatalogError> {
        self.farm()?
            .level_costs
            .get(&level)
            .copied()
            .ok_or(CatalogError::MissingLevelCost(level))
    }

    pub fn pet(&self, pet_type: &str) -> Option<&PetSpec> {
        self.pets.get(pet_type)
    }

    pub fn item(&self, name: &str) -> Option<&ItemSpec> {
        self.items.get(name)
    }

    pub fn store_offer(&self, pet_type: &str, level: u32) -> Option<&StoreOffer> {
        self.store
            .get(pet_type)
            .and_then(|offers| offers.iter().find(|o| o.level == level))
    }
}

fn parse_farm_data(doc: &serde_json::Value) -> Result<FarmData, CatalogError> {
    let obj = doc
        .as_object()
        .ok_or_else(|| CatalogError::malformed(FARM_DATA, "expected an object"))?;

    let field = |key: &str| -> Result<Decimal, CatalogError> {
        match obj.get(key) {
            Some(serde_json::Value::Number(n)) => number_to_decimal(FARM_DATA, n),
            _ => Err(CatalogError::malformed(
                FARM_DATA,
                format!("missing numeric field {}", key),
            )),
        }
    };

    let rate = FarmRate {
        baseline_cost: field("x_average_TGP")?,
        break_even_days: field("y_day_to_break_even")?,
    };

    let mut level_costs = BTreeMap::new();
    for (key, value) in obj {
        let Some(level) = key.strip_prefix(LEVEL_COST_PREFIX) else {
            continue;
        };
        let level: u32 = level
            .parse()
            .map_err(|_| CatalogError::malformed(FARM_DATA, format!("bad level key {}", key)))?;
        let serde_json::Value::Number(n) = value else {
            return Err(CatalogError::malformed(
                FARM_DATA,
                format!("{} must be numeric", key),
            ));
        };
        level_costs.insert(level, number_to_decimal(FARM_DATA, n)?);
    }

    Ok(FarmData { rate, level_costs })
}

/// Parse a seed file: a JSON object mapping `config_type` to its document.
///
/// The set is validated as a whole before anything is written.
pub fn parse_seed(raw: &str) -> Result<BTreeMap<String, serde_json::Value>, CatalogError> {
    let documents: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(|e| CatalogError::malformed("seed", e))?;
    CatalogSnapshot::from_documents(documents.clone(), TimeMs::now())?;
    Ok(documents)
}
