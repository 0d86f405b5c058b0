//! Pet entity and farm-rate derivation.

use serde::{Deserialize, Serialize};

use super::{Decimal, PetId, PlayerId, TimeMs};

/// Highest reachable pet level.
pub const MAX_LEVEL: u32 = 50;

/// Parameters that turn a pet's cost basis into a daily farm rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmRate {
    pub baseline_cost: Decimal,
    pub break_even_days: Decimal,
}

impl FarmRate {
    /// Points per day for a given cost basis, never negative.
    pub fn speed(&self, accumulate_total_cost: Decimal) -> Decimal {
        if !self.break_even_days.is_positive() {
            return Decimal::zero();
        }
        ((accumulate_total_cost - self.baseline_cost) / self.break_even_days).non_negative()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    pub id: PetId,
    pub owner: PlayerId,
    pub pet_type: String,
    pub level: u32,
    pub accumulate_total_cost: Decimal,
    /// Accrual stops at this instant until the pet is fed.
    pub mana_expiry: TimeMs,
    /// Present iff the pet is farming.
    pub farm_started_at: Option<TimeMs>,
    /// Accrued points not yet merged into the owner's balance.
    pub carried_balance: Decimal,
    pub revision: i64,
}

impl Pet {
    pub fn is_farming(&self) -> bool {
        self.farm_started_at.is_some()
    }

    pub fn has_mana_at(&self, now: TimeMs) -> bool {
        now < self.mana_expiry
    }

    pub fn farm_speed(&self, rate: &FarmRate) -> Decimal {
        rate.speed(self.accumulate_total_cost)
    }
}
