//! Boost integration over farming intervals.
//!
//! A boost multiplies the farm *rate* for the time it coexists with active
//! farming, so the bonus is integrated from raw intervals at settlement time
//! rather than cached.

use crate::domain::{Boost, Decimal, FarmRate, Pet, TimeMs};

use super::accrual::FarmInterval;

#[derive(Debug, Clone, Copy)]
pub struct BoostAggregator {
    rate: FarmRate,
}

impl BoostAggregator {
    pub fn new(rate: FarmRate) -> Self {
        Self { rate }
    }

    /// Bonus points for every (pet, boost) pair, summed.
    pub fn boost<'a, I>(&self, now: TimeMs, pets: I, boosts: &[Boost]) -> Decimal
    where
        I: IntoIterator<Item = &'a Pet>,
    {
        pets.into_iter()
            .filter_map(|pet| FarmInterval::of(pet, now).map(|interval| (pet, interval)))
            .map(|(pet, interval)| self.pet_bonus(pet.farm_speed(&self.rate), interval, boosts))
            .sum()
    }

    fn pet_bonus(&self, speed: Decimal, interval: FarmInterval, boosts: &[Boost]) -> Decimal {
        boosts
            .iter()
            .map(|b| {
                let days = interval.overlap_days(b.start_at, b.end_at);
                if days.is_zero() {
                    Decimal::zero()
                } else {
                    days * speed * b.percent / Decimal::hundred()
                }
            })
            .sum()
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
        FarmRate {
            baseline_cost: d("100"),
            break_even_days: d("30"),
        }
    }

    fn farming_pet(id: &str, start_day: i64, expiry_day: i64) -> Pet {
        Pet {
            id: PetId::new(id),
            owner: PlayerId::new("p1"),
            pet_type: "cat".to_string(),
            level: 1,
            accumulate_total_cost: d("400"),
            mana_expiry: TimeMs::new(expiry_day * DAY_MS),
            farm_started_at: Some(TimeMs::new(start_day * DAY_MS)),
            carried_balance: Decimal::zero(),
            revision: 0,
        }
    }

    fn boost(percent: &str, start_day: i64, end_day: i64) -> Boost {
        Boost::new(
            d(percent),
            TimeMs::new(start_day * DAY_MS),
            TimeMs::new(end_day * DAY_MS),
        )
    }

    #[test]
    fn test_boost_fully_inside_window() {
        let agg = BoostAggregator::new(rate());
        let pets = [farming_pet("a", 0, 5)];
        let total = agg.boost(TimeMs::new(5 * DAY_MS), &pets, &[boost("50", 1, 3)]);
        assert_eq!(total, d("10"));
    }

    #[test]
    fn test_boost_clipped_by_farm_start() {
        let agg = BoostAggregator::new(rate());
        let pets = [farming_pet("a", 2, 5)];
        let total = agg.boost(TimeMs::new(5 * DAY_MS), &pets, &[boost("100", 0, 3)]);
        assert_eq!(total, d("10"));
    }

    #[test]
    fn test_boost_clipped_by_now_and_mana() {
        let agg = BoostAggregator::new(rate());
        let pets = [farming_pet("a", 0, 5)];
        // now before mana expiry clips the end
        let total = agg.boost(TimeMs::new(2 * DAY_MS), &pets, &[boost("100", 1, 10)]);
        assert_eq!(total, d("10"));
        // mana expiry clips the end once now has passed it
        let total = agg.boost(TimeMs::new(8 * DAY_MS), &pets, &[boost("100", 1, 10)]);
        assert_eq!(total, d("40"));
    }

    #[test]
    fn test_boost_outside_window_contributes_nothing() {
        let agg = BoostAggregator::new(rate());
        let pets = [farming_pet("a", 3, 5)];
        let total = agg.boost(TimeMs::new(5 * DAY_MS), &pets, &[boost("50", 0, 2)]);
        assert_eq!(total, Decimal::zero());
    }

    #[test]
    fn test_overlapping_boosts_stack_additively() {
        let agg = BoostAggregator::new(rate());
        let pets = [farming_pet("a", 0, 4)];
        let boosts = [boost("50", 0, 2), boost("25", 1, 4)];
        // 2d*10*0.5 + 3d*10*0.25
        let total = agg.boost(TimeMs::new(4 * DAY_MS), &pets, &boosts);
        assert_eq!(total, d("17.5"));
    }

    #[test]
    fn test_idle_pets_are_skipped() {
        let agg = BoostAggregator::new(rate());
        let mut idle = farming_pet("a", 0, 5);
        idle.farm_started_at = None;
        let total = agg.boost(TimeMs::new(5 * DAY_MS), [&idle], &[boost("50", 0, 5)]);
        assert_eq!(total, Decimal::zero());
    }

    #[test]
    fn test_sums_across_pets() {
        let agg = BoostAggregator::new(rate());
        let pets = [farming_pet("a", 0, 5), farming_pet("b", 1, 5)];
        let total = agg.boost(TimeMs::new(5 * DAY_MS), &pets, &[boost("10", 0, 5)]);
        // 5d*10*0.1 + 4d*10*0.1
        assert_eq!(total, d("9"));
    }
}
