//! Time-weighted accrual of a single pet's farming.

use crate::domain::{Decimal, FarmRate, Pet, TimeMs};

/// Half-open farming interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarmInterval {
    pub start: TimeMs,
    pub end: TimeMs,
}

impl FarmInterval {
    /// The interval a farming pet has accrued over as of `now`.
    ///
    /// Farming stops at mana exhaustion, so the end is clamped to `mana_expiry`.
    pub fn of(pet: &Pet, now: TimeMs) -> Option<Self> {
        let start = pet.farm_started_at?;
        Some(FarmInterval {
            start,
            end: std::cmp::min(now, pet.mana_expiry),
        })
    }

    pub fn days(&self) -> Decimal {
        self.start.days_until(self.end)
    }

    /// Fractional days shared with `[start, end)`.
    pub fn overlap_days(&self, start: TimeMs, end: TimeMs) -> Decimal {
        let from = std::cmp::max(self.start, start);
        let to = std::cmp::min(self.end, end);
        from.days_until(to)
    }
}

/// Result of checkpointing one pet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accrual {
    /// Points earned over the interval plus the pet's carried balance.
    pub points: Decimal,
    /// Value `farm_started_at` takes once this accrual is written.
    pub next_farm_started_at: Option<TimeMs>,
    /// Mana ran out: the farm slot is cleared.
    pub reset_farm: bool,
    pub interval: Option<FarmInterval>,
}

#[derive(Debug, Clone, Copy)]
pub struct AccrualCalculator {
    rate: FarmRate,
}

impl AccrualCalculator {
    pub fn new(rate: FarmRate) -> Self {
        Self { rate }
    }

    pub fn accrue(&self, pet: &Pet, now: TimeMs) -> Accrual {
        let carried = pet.carried_balance.non_negative();

        let Some(interval) = FarmInterval::of(pet, now) else {
            return Accrual {
                points: carried,
                next_farm_started_at: None,
                reset_farm: false,
                interval: None,
            };
        };

        let earned = interval.days() * pet.farm_speed(&self.rate);
        let reset_farm = now >= pet.mana_expiry;

        Accrual {
            points: earned + carried,
            next_farm_started_at: if reset_farm { None } else { Some(now) },
            reset_farm,
            interval: Some(interval),
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

    fn rate() -> FarmRate {
        // 400 cost basis -> 10 points/day
        FarmRate {
            baseline_cost: d("100"),
            break_even_days: d("30"),
        }
    }

    fn pet(farm_started_at: Option<i64>, mana_expiry: i64, carried: &str) -> Pet {
        Pet {
            id: PetId::new("pet-1"),
            owner: PlayerId::new("p1"),
            pet_type: "cat".to_string(),
            level: 1,
            accumulate_total_cost: d("400"),
            mana_expiry: TimeMs::new(mana_expiry),
            farm_started_at: farm_started_at.map(TimeMs::new),
            carried_balance: d(carried),
            revision: 0,
        }
    }

    #[test]
    fn test_idle_pet_yields_only_carried_balance() {
        let calc = AccrualCalculator::new(rate());
        let result = calc.accrue(&pet(None, 5 * DAY_MS, "3.5"), TimeMs::new(DAY_MS));
        assert_eq!(result.points, d("3.5"));
        assert!(!result.reset_farm);
        assert_eq!(result.next_farm_started_at, None);
        assert!(result.interval.is_none());
    }

    #[test]
    fn test_idle_pet_with_nothing_carried_yields_zero() {
        let calc = AccrualCalculator::new(rate());
        let result = calc.accrue(&pet(None, 5 * DAY_MS, "0"), TimeMs::new(DAY_MS));
        assert_eq!(result.points, Decimal::zero());
    }

    #[test]
    fn test_farming_pet_advances_checkpoint() {
        let calc = AccrualCalculator::new(rate());
        let now = TimeMs::new(2 * DAY_MS);
        let result = calc.accrue(&pet(Some(0), 5 * DAY_MS, "0"), now);
        assert_eq!(result.points, d("20"));
        assert!(!result.reset_farm);
        assert_eq!(result.next_farm_started_at, Some(now));
    }

    #[test]
    fn test_accrual_stops_at_mana_expiry() {
        let calc = AccrualCalculator::new(rate());
        let result = calc.accrue(&pet(Some(0), 5 * DAY_MS, "1"), TimeMs::new(9 * DAY_MS));
        assert_eq!(result.points, d("51"));
        assert!(result.reset_farm);
        assert_eq!(result.next_farm_started_at, None);
    }

    #[test]
    fn test_fractional_days() {
        let calc = AccrualCalculator::new(rate());
        let result = calc.accrue(&pet(Some(0), 5 * DAY_MS, "0"), TimeMs::new(DAY_MS / 4));
        assert_eq!(result.points, d("2.5"));
    }

    #[test]
    fn test_start_after_expiry_contributes_nothing() {
        let calc = AccrualCalculator::new(rate());
        let result = calc.accrue(
            &pet(Some(6 * DAY_MS), 5 * DAY_MS, "0"),
            TimeMs::new(7 * DAY_MS),
        );
        assert_eq!(result.points, Decimal::zero());
        assert!(result.reset_farm);
    }

    #[test]
    fn test_negative_carried_balance_ignored() {
        let calc = AccrualCalculator::new(rate());
        let result = calc.accrue(&pet(None, 5 * DAY_MS, "-4"), TimeMs::new(DAY_MS));
        assert_eq!(result.points, Decimal::zero());
    }
}
