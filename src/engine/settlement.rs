//! Combining accrual and boost integration into per-pet settlements.

use crate::domain::{Boost, Decimal, FarmRate, Pet, TimeMs};

use super::{Accrual, AccrualCalculator, BoostAggregator};

/// What one pet has earned as of `now`, and the farm state after flushing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetSettlement {
    pub accrual: Accrual,
    pub boost_points: Decimal,
}

impl PetSettlement {
    /// Accrual (including carried balance) plus boost bonus, unrounded.
    pub fn total(&self) -> Decimal {
        self.accrual.points + self.boost_points
    }

    /// Whether writing this settlement changes the pet at all.
    pub fn touches(&self, pet: &Pet) -> bool {
        pet.is_farming() || !pet.carried_balance.is_zero()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FarmCalculator {
    accrual: AccrualCalculator,
    boosts: BoostAggregator,
}

impl FarmCalculator {
    pub fn new(rate: FarmRate) -> Self {
        Self {
            accrual: AccrualCalculator::new(rate),
            boosts: BoostAggregator::new(rate),
        }
    }

    pub fn settle(&self, pet: &Pet, boosts: &[Boost], now: TimeMs) -> PetSettlement {
        PetSettlement {
            accrual: self.accrual.accrue(pet, now),
            boost_points: self.boosts.boost(now, [pet], boosts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PetId, PlayerId, DAY_MS};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_boost_overlap_example() {
        // farm speed 10/day, 5 days of mana, 50% boost over days 1..3
        let calc = FarmCalculator::new(FarmRate {
            baseline_cost: d("100"),
            break_even_days: d("30"),
        });
        let pet = Pet {
            id: PetId::new("pet-1"),
            owner: PlayerId::new("p1"),
            pet_type: "cat".to_string(),
            level: 1,
            accumulate_total_cost: d("400"),
            mana_expiry: TimeMs::new(5 * DAY_MS),
            farm_started_at: Some(TimeMs::new(0)),
            carried_balance: Decimal::zero(),
            revision: 0,
        };
        let boosts = [Boost::new(
            d("50"),
            TimeMs::new(DAY_MS),
            TimeMs::new(3 * DAY_MS),
        )];

        let settlement = calc.settle(&pet, &boosts, TimeMs::new(5 * DAY_MS));
        assert_eq!(settlement.accrual.points, d("50"));
        assert_eq!(settlement.boost_points, d("10"));
        assert_eq!(settlement.total(), d("60"));
        assert!(settlement.accrual.reset_farm);
    }
}
