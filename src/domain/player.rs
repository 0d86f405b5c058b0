//! Player aggregate: balances, lifetime totals, inventory and boosts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Decimal, PlayerId, TimeMs, Token};

/// A time-bounded percentage bonus on every pet's farm rate.
///
/// Boosts are appended by reward systems and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boost {
    pub percent: Decimal,
    pub start_at: TimeMs,
    pub end_at: TimeMs,
}

impl Boost {
    pub fn new(percent: Decimal, start_at: TimeMs, end_at: TimeMs) -> Self {
        Self {
            percent,
            start_at,
            end_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Bumped by every committed write; conditional writes assert it.
    pub revision: i64,
    pub balances: BTreeMap<Token, Decimal>,
    pub totals: BTreeMap<String, Decimal>,
    pub inventory: BTreeMap<String, u32>,
    pub boosts: Vec<Boost>,
    pub last_claimed_at: Option<TimeMs>,
}

impl Player {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            revision: 0,
            balances: BTreeMap::new(),
            totals: BTreeMap::new(),
            inventory: BTreeMap::new(),
            boosts: Vec::new(),
            last_claimed_at: None,
        }
    }

    /// Balance for `token`, zero when the player never held it.
    pub fn balance(&self, token: Token) -> Decimal {
        self.balances.get(&token).copied().unwrap_or_default()
    }

    pub fn total(&self, metric: &str) -> Decimal {
        self.totals.get(metric).copied().unwrap_or_default()
    }

    pub fn item_count(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }
}
