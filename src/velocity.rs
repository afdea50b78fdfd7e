//! Sell-through velocity from marketplace demand/supply proxies.
//!
//! The day estimate carries a random offset within the category's band, so
//! it is not deterministic. Callers pass the RNG in; seed it for repeatable
//! output.

use crate::model::{ConditionTier, MarketReference, VelocityCategory};
use rand::Rng;
use std::ops::RangeInclusive;

const FAST_SCORE: f64 = 7.0;
const MEDIUM_SCORE: f64 = 4.0;
const LISTINGS_PER_PRESSURE_UNIT: f64 = 400.0;

/// Demand/supply inputs to the estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocitySignals {
    pub demand_score: u8,
    pub flipkart_listings: u32,
    pub amazon_rank: u8,
}

impl VelocitySignals {
    /// Assumed market when no reference row exists.
    pub const FALLBACK: VelocitySignals = VelocitySignals {
        demand_score: 5,
        flipkart_listings: 200,
        amazon_rank: 5,
    };

    pub fn from_reference(reference: Option<&MarketReference>) -> Self {
        match reference {
            Some(r) => VelocitySignals {
                demand_score: r.demand_score,
                flipkart_listings: r.flipkart_listings,
                amazon_rank: r.amazon_rank,
            },
            None => Self::FALLBACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityEstimate {
    pub category: VelocityCategory,
    pub days: u32,
}

pub fn condition_factor(tier: &ConditionTier) -> f64 {
    match tier {
        ConditionTier::LikeNew => 1.25,
        ConditionTier::Excellent => 1.05,
        ConditionTier::Good => 0.85,
        ConditionTier::Fair | ConditionTier::Other(_) => 0.65,
    }
}

/// Raw velocity score. Non-decreasing in demand score.
pub fn score(signals: &VelocitySignals, tier: &ConditionTier) -> f64 {
    let supply_pressure = signals.flipkart_listings as f64 / LISTINGS_PER_PRESSURE_UNIT;
    let amazon_boost = (10.0 - signals.amazon_rank as f64) / 10.0;
    signals.demand_score as f64 * condition_factor(tier) * (1.0 + amazon_boost) / (1.0 + supply_pressure)
}

pub fn categorize(score: f64) -> VelocityCategory {
    if score >= FAST_SCORE {
        VelocityCategory::Fast
    } else if score >= MEDIUM_SCORE {
        VelocityCategory::Medium
    } else {
        VelocityCategory::Slow
    }
}

/// Inclusive bounds of the day estimate for a category.
pub fn day_range(category: VelocityCategory) -> RangeInclusive<u32> {
    match category {
        VelocityCategory::Fast => 5..=12,
        VelocityCategory::Medium => 18..=31,
        VelocityCategory::Slow => 42..=69,
    }
}

pub fn estimate<R: Rng + ?Sized>(signals: &VelocitySignals, tier: &ConditionTier, rng: &mut R) -> VelocityEstimate {
    let category = categorize(score(signals, tier));
    let days = rng.gen_range(day_range(category));
    VelocityEstimate { category, days }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn signals(demand: u8, listings: u32, rank: u8) -> VelocitySignals {
        VelocitySignals { demand_score: demand, flipkart_listings: listings, amazon_rank: rank }
    }

    #[test]
    fn fallback_signals_give_medium_for_good() {
        let s = score(&VelocitySignals::FALLBACK, &ConditionTier::Good);
        assert!((s - 4.25).abs() < 1e-9);
        assert_eq!(categorize(s), VelocityCategory::Medium);
    }

    #[test]
    fn iphone_15_like_new_is_fast() {
        // 9 * 1.25 * 1.9 / 1.325
        let s = score(&signals(9, 130, 1), &ConditionTier::LikeNew);
        assert!(s > 16.0 && s < 16.2);
        assert_eq!(categorize(s), VelocityCategory::Fast);
    }

    #[test]
    fn oversupplied_niche_model_is_slow() {
        let s = score(&signals(3, 500, 7), &ConditionTier::Fair);
        assert_eq!(categorize(s), VelocityCategory::Slow);
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(categorize(7.0), VelocityCategory::Fast);
        assert_eq!(categorize(6.999), VelocityCategory::Medium);
        assert_eq!(categorize(4.0), VelocityCategory::Medium);
        assert_eq!(categorize(3.999), VelocityCategory::Slow);
    }

    #[test]
    fn score_is_monotonic_in_demand() {
        for tier in [ConditionTier::LikeNew, ConditionTier::Fair] {
            let mut prev = f64::MIN;
            for demand in 1..=10 {
                let s = score(&signals(demand, 250, 4), &tier);
                assert!(s >= prev);
                prev = s;
            }
        }
    }

    #[test]
    fn unknown_tier_scores_like_fair() {
        let s = signals(6, 200, 4);
        assert_eq!(score(&s, &ConditionTier::Other("Mint".into())), score(&s, &ConditionTier::Fair));
    }

    #[test]
    fn days_stay_in_band_and_repeat_with_seed() {
        let s = signals(9, 130, 1);
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let ea = estimate(&s, &ConditionTier::LikeNew, &mut a);
            let eb = estimate(&s, &ConditionTier::LikeNew, &mut b);
            assert_eq!(ea, eb);
            assert!(day_range(ea.category).contains(&ea.days));
        }
    }
}
