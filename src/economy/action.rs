//! Economy actions and their validate/delta-compute step.
//!
//! Each action turns a [`Snapshot`] into a [`WritePlan`] without touching
//! storage. Validation failures come back as errors before any write exists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::plan::{
    ActionReceipt, BalanceWrite, InventoryWrite, PetWrite, PlayerWrite, TotalWrite, WritePlan,
};
use super::snapshot::{PetScope, Snapshot};
use super::{EconomyError, EconomyRules, Reason};
use crate::catalog::CatalogSnapshot;
use crate::domain::{
    ActionKind, Decimal, Pet, PetId, Player, TimeMs, Token, BALANCE_DP, MAX_LEVEL,
};
use crate::engine::{split_payment, FarmCalculator, Payment};

/// Largest food order accepted in one purchase.
pub const MAX_FOOD_AMOUNT: u32 = 1000;

/// Lifetime total credited by claims.
pub const CLAIM_TOTAL: &str = "game_claim_tgp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum Purchase {
    Pet { pet_type: String, level: u32 },
    Food { item: String, amount: u32 },
}

impl Purchase {
    fn purpose(&self) -> &'static str {
        match self {
            Purchase::Pet { .. } => "pet",
            Purchase::Food { .. } => "food",
        }
    }
}

/// One named economy action requested by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Claim,
    FarmStart { pet_id: PetId },
    Feed { pet_id: PetId, item: String },
    Upgrade { pet_id: PetId },
    Purchase(Purchase),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Claim => ActionKind::Claim,
            Action::FarmStart { .. } => ActionKind::FarmStart,
            Action::Feed { .. } => ActionKind::Feed,
            Action::Upgrade { .. } => ActionKind::Upgrade,
            Action::Purchase(_) => ActionKind::Purchase,
        }
    }

    pub fn pet_id(&self) -> Option<&PetId> {
        match self {
            Action::FarmStart { pet_id }
            | Action::Feed { pet_id, .. }
            | Action::Upgrade { pet_id } => Some(pet_id),
            Action::Claim | Action::Purchase(_) => None,
        }
    }

    /// Pets the snapshot must contain for this action.
    pub fn pet_scope(&self) -> PetScope<'_> {
        match self {
            Action::Claim => PetScope::All,
            Action::Purchase(_) => PetScope::None,
            Action::FarmStart { pet_id }
            | Action::Feed { pet_id, .. }
            | Action::Upgrade { pet_id } => PetScope::One(pet_id),
        }
    }

    /// Parameter checks that need no player state.
    pub fn check_input(&self, catalog: &CatalogSnapshot) -> Result<(), EconomyError> {
        if let Some(pet_id) = self.pet_id() {
            if pet_id.as_str().trim().is_empty() {
                return Err(EconomyError::InvalidInput("pet_id is required".to_string()));
            }
        }

        match self {
            Action::Claim | Action::FarmStart { .. } | Action::Upgrade { .. } => Ok(()),
            Action::Feed { item, .. } => {
                if catalog.item(item).is_none() {
                    return Err(EconomyError::InvalidInput(format!("unknown item {}", item)));
                }
                Ok(())
            }
            Action::Purchase(Purchase::Pet { pet_type, level }) => {
                if !(1..=MAX_LEVEL).contains(level) {
                    return Err(EconomyError::InvalidInput(format!(
                        "pet level must be between 1 and {}",
                        MAX_LEVEL
                    )));
                }
                if catalog.store_offer(pet_type, *level).is_none() {
                    return Err(EconomyError::InvalidInput(format!(
                        "no store offer for {} at level {}",
                        pet_type, level
                    )));
                }
                Ok(())
            }
            Action::Purchase(Purchase::Food { item, amount }) => {
                if !(1..=MAX_FOOD_AMOUNT).contains(amount) {
                    return Err(EconomyError::InvalidInput(format!(
                        "food amount must be between 1 and {}",
                        MAX_FOOD_AMOUNT
                    )));
                }
                if catalog.item(item).is_none() {
                    return Err(EconomyError::InvalidInput(format!("unknown item {}", item)));
                }
                Ok(())
            }
        }
    }

    /// Validate against the snapshot and compute every delta.
    pub fn plan(
        &self,
        snapshot: &Snapshot,
        catalog: &CatalogSnapshot,
        rules: &EconomyRules,
        now: TimeMs,
    ) -> Result<WritePlan, EconomyError> {
        let mut draft = Draft::new(self.kind(), &snapshot.player, now);

        match self {
            Action::Claim => plan_claim(&mut draft, snapshot, catalog, rules)?,
            Action::FarmStart { pet_id } => {
                let pet = snapshot.pet(pet_id)?;
                if !pet.has_mana_at(now) {
                    return Err(EconomyError::PreconditionFailed(Reason::PetIsOutOfMana));
                }
                if pet.is_farming() {
                    return Err(EconomyError::PreconditionFailed(Reason::PetAlreadyFarming));
                }
                let mut after = pet.clone();
                after.farm_started_at = Some(now);
                draft.update_pet(pet, after);
            }
            Action::Feed { pet_id, item } => {
                let pet = snapshot.pet(pet_id)?;
                let item_spec = catalog
                    .item(item)
                    .ok_or_else(|| EconomyError::InvalidInput(format!("unknown item {}", item)))?;
                let pet_spec = catalog.pet(&pet.pet_type).ok_or_else(|| {
                    EconomyError::NotFound(format!("pet type {}", pet.pet_type))
                })?;
                if snapshot.player.item_count(item) == 0 {
                    return Err(EconomyError::PreconditionFailed(Reason::NotEnoughFood));
                }

                let mut after = draft.flush(pet, catalog)?;
                let fed = std::cmp::max(now, pet.mana_expiry).plus_ms(item_spec.mana_ms());
                let cap = now.plus_ms(pet_spec.max_mana_ms());
                after.mana_expiry = std::cmp::min(fed, cap);

                draft.consume(item, 1);
                draft.update_pet(pet, after);
            }
            Action::Upgrade { pet_id } => {
                let pet = snapshot.pet(pet_id)?;
                if pet.level >= MAX_LEVEL {
                    return Err(EconomyError::PreconditionFailed(Reason::PetMaxLevel));
                }
                let cost = catalog.level_cost(pet.level + 1)?;
                draft.charge(cost, "upgrade")?;

                let mut after = draft.flush(pet, catalog)?;
                after.level += 1;
                after.accumulate_total_cost = after.accumulate_total_cost + cost;
                after.farm_started_at = None;
                draft.update_pet(pet, after);
            }
            Action::Purchase(purchase) => match purchase {
                Purchase::Pet { pet_type, level } => {
                    let offer = catalog.store_offer(pet_type, *level).ok_or_else(|| {
                        EconomyError::InvalidInput(format!(
                            "no store offer for {} at level {}",
                            pet_type, level
                        ))
                    })?;
                    let spec = catalog
                        .pet(pet_type)
                        .ok_or_else(|| EconomyError::NotFound(format!("pet type {}", pet_type)))?;
                    draft.charge(offer.cost, purchase.purpose())?;
                    draft.add_total(&format!("buy_pet_{}_amount", pet_type), Decimal::from(1u32));

                    draft.insert_pet(Pet {
                        id: PetId::generate(),
                        owner: snapshot.player.id.clone(),
                        pet_type: pet_type.clone(),
                        level: *level,
                        accumulate_total_cost: offer.cost,
                        mana_expiry: now.plus_ms(spec.max_mana_ms()),
                        farm_started_at: None,
                        carried_balance: Decimal::zero(),
                        revision: 0,
                    });
                }
                Purchase::Food { item, amount } => {
                    let spec = catalog
                        .item(item)
                        .ok_or_else(|| EconomyError::InvalidInput(format!("unknown item {}", item)))?;
                    draft.charge(spec.cost * Decimal::from(*amount), purchase.purpose())?;
                    draft.stock(item, *amount);
                }
            },
        }

        Ok(draft.finish())
    }
}

fn plan_claim(
    draft: &mut Draft<'_>,
    snapshot: &Snapshot,
    catalog: &CatalogSnapshot,
    rules: &EconomyRules,
) -> Result<(), EconomyError> {
    let now = draft.now;
    if let Some(last) = snapshot.player.last_claimed_at {
        let cooldown = i64::try_from(rules.claim_cooldown.as_millis()).unwrap_or(i64::MAX);
        if now < last.plus_ms(cooldown) {
            return Err(EconomyError::PreconditionFailed(Reason::ClaimTooSoon));
        }
    }

    let calc = FarmCalculator::new(catalog.farm_rate()?);
    let mut gross = Decimal::zero();
    for pet in &snapshot.pets {
        let settlement = calc.settle(pet, &snapshot.player.boosts, now);
        if !settlement.touches(pet) {
            continue;
        }
        gross += settlement.total();
        draft.receipt_boost += settlement.boost_points;

        let mut after = pet.clone();
        after.farm_started_at = settlement.accrual.next_farm_started_at;
        after.carried_balance = Decimal::zero();
        draft.update_pet(pet, after);
    }

    let credited = gross.floor_dp(BALANCE_DP);
    if credited.is_positive() {
        draft.credit(Token::Tgp, credited);
        draft.add_total(CLAIM_TOTAL, credited);
    }
    draft.receipt_points = credited;

    if credited.is_positive() || !draft.pets.is_empty() {
        draft.player_write().last_claimed_at = Some(now);
    }
    Ok(())
}

/// Accumulates the writes of one plan.
struct Draft<'a> {
    kind: ActionKind,
    player: &'a Player,
    now: TimeMs,
    write: Option<PlayerWrite>,
    pets: Vec<PetWrite>,
    costs: BTreeMap<Token, Decimal>,
    receipt_points: Decimal,
    receipt_boost: Decimal,
}

impl<'a> Draft<'a> {
    fn new(kind: ActionKind, player: &'a Player, now: TimeMs) -> Self {
        Self {
            kind,
            player,
            now,
            write: None,
            pets: Vec::new(),
            costs: BTreeMap::new(),
            receipt_points: Decimal::zero(),
            receipt_boost: Decimal::zero(),
        }
    }

    fn player_write(&mut self) -> &mut PlayerWrite {
        let player = self.player;
        self.write
            .get_or_insert_with(|| PlayerWrite::new(player.id.clone(), player.revision))
    }

    fn adjust_balance(&mut self, token: Token, delta: Decimal) {
        let expected = self.player.balance(token);
        let write = self.player_write();
        match write.balances.iter_mut().find(|b| b.token == token) {
            Some(existing) => existing.delta += delta,
            None => write.balances.push(BalanceWrite {
                token,
                expected,
                delta,
            }),
        }
    }

    fn add_total(&mut self, metric: &str, delta: Decimal) {
        let before = self.player.total(metric);
        let write = self.player_write();
        match write.totals.iter_mut().find(|t| t.metric == metric) {
            Some(existing) => existing.delta += delta,
            None => write.totals.push(TotalWrite {
                metric: metric.to_string(),
                before,
                delta,
            }),
        }
    }

    fn credit(&mut self, token: Token, amount: Decimal) {
        self.adjust_balance(token, amount);
    }

    /// Debit `cost` in payment order and record spend totals under `purpose`.
    fn charge(&mut self, cost: Decimal, purpose: &str) -> Result<Payment, EconomyError> {
        let payment = split_payment(self.player, cost)
            .map_err(|_| EconomyError::PreconditionFailed(Reason::NotEnoughMoney))?;

        for (token, amount) in &payment.debits {
            self.adjust_balance(*token, -*amount);
            self.add_total(&format!("{}_spent", token), *amount);
            self.add_total(&format!("{}_spent_{}", token, purpose), *amount);
            *self.costs.entry(*token).or_default() += *amount;
        }
        self.add_total("spent", cost);
        self.add_total(&format!("spent_{}", purpose), cost);

        Ok(payment)
    }

    fn stock(&mut self, item: &str, amount: u32) {
        self.player_write().inventory.push(InventoryWrite {
            item: item.to_string(),
            delta: i64::from(amount),
        });
    }

    fn consume(&mut self, item: &str, amount: u32) {
        self.player_write().inventory.push(InventoryWrite {
            item: item.to_string(),
            delta: -i64::from(amount),
        });
    }

    /// Spill a pet's pending accrual and boost into its carried balance.
    fn flush(&mut self, pet: &Pet, catalog: &CatalogSnapshot) -> Result<Pet, EconomyError> {
        let calc = FarmCalculator::new(catalog.farm_rate()?);
        let settlement = calc.settle(pet, &self.player.boosts, self.now);

        let mut after = pet.clone();
        after.farm_started_at = settlement.accrual.next_farm_started_at;
        after.carried_balance = settlement.total();

        self.receipt_points += settlement.total() - pet.carried_balance.non_negative();
        self.receipt_boost += settlement.boost_points;
        Ok(after)
    }

    fn update_pet(&mut self, before: &Pet, after: Pet) {
        self.pets.push(PetWrite::Update {
            expected_revision: before.revision,
            after,
        });
    }

    fn insert_pet(&mut self, pet: Pet) {
        self.pets.push(PetWrite::Insert(pet));
    }

    fn finish(self) -> WritePlan {
        let mut balances: BTreeMap<Token, Decimal> = Token::PAYMENT_ORDER
            .iter()
            .map(|t| (*t, self.player.balance(*t)))
            .collect();
        if let Some(write) = &self.write {
            for b in &write.balances {
                balances.insert(b.token, b.after());
            }
        }

        let pet = match self.kind {
            ActionKind::Claim => None,
            _ => self.pets.last().map(|w| w.pet().clone()),
        };

        WritePlan {
            kind: self.kind,
            player: self.write,
            pets: self.pets,
            receipt: ActionReceipt {
                action: self.kind,
                points: self.receipt_points,
                boost_points: self.receipt_boost,
                costs: self.costs,
                balances,
                pet,
                at: self.now,
            },
        }
    }
}
