//! Static multiplier tables. Every lookup is total: unlisted keys resolve
//! to a documented default instead of an error.

use crate::model::{ConditionTier, NetworkType};

pub const DEFAULT_CONDITION_MULTIPLIER: f64 = 0.74;
pub const DEFAULT_BRAND_BASE: f64 = 10_000.0;

const BRAND_TIER_BASE: &[(&str, f64)] = &[
    ("Apple", 30_000.0),
    ("Samsung", 18_000.0),
    ("OnePlus", 16_000.0),
    ("Google", 22_000.0),
    ("Xiaomi", 10_000.0),
    ("Vivo", 12_000.0),
    ("Oppo", 11_000.0),
    ("Poco", 13_000.0),
];

pub fn condition_multiplier(tier: &ConditionTier) -> f64 {
    match tier {
        ConditionTier::LikeNew => 0.96,
        ConditionTier::Excellent => 0.87,
        ConditionTier::Good => 0.74,
        ConditionTier::Fair => 0.59,
        ConditionTier::Other(_) => DEFAULT_CONDITION_MULTIPLIER,
    }
}

/// Additive fraction, applied as `x (1 + premium)`.
pub fn warranty_premium(months: u32) -> f64 {
    match months {
        3 => 0.03,
        6 => 0.055,
        12 => 0.09,
        _ => 0.0,
    }
}

pub fn network_premium(network: &NetworkType) -> f64 {
    match network {
        NetworkType::FiveG => 0.05,
        NetworkType::ThreeG => -0.10,
        NetworkType::FourG | NetworkType::Other(_) => 0.0,
    }
}

/// Heuristic starting price when no market reference exists.
pub fn brand_tier_base(brand: &str) -> f64 {
    let brand = brand.trim();
    BRAND_TIER_BASE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(brand))
        .map(|(_, base)| *base)
        .unwrap_or(DEFAULT_BRAND_BASE)
}

/// Product of the condition, warranty and network adjustments, in that order.
pub fn adjustment_factor(tier: &ConditionTier, warranty_months: u32, network: &NetworkType) -> f64 {
    condition_multiplier(tier) * (1.0 + warranty_premium(warranty_months)) * (1.0 + network_premium(network))
}

/// Round half up (x.5 goes toward +inf), matching how reviewers round by hand.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Nearest multiple of 100, half up. Negative or NaN input clamps to 0.
pub fn round_to_hundred(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (round_half_up(value / 100.0) * 100.0).min(u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlisted_keys_use_defaults() {
        assert_eq!(condition_multiplier(&ConditionTier::Other("Mint".into())), 0.74);
        assert_eq!(warranty_premium(7), 0.0);
        assert_eq!(warranty_premium(24), 0.0);
        assert_eq!(network_premium(&NetworkType::Other("2G".into())), 0.0);
        assert_eq!(brand_tier_base("Nokia"), 10_000.0);
    }

    #[test]
    fn brand_lookup_ignores_case() {
        assert_eq!(brand_tier_base("oneplus"), 16_000.0);
        assert_eq!(brand_tier_base("Oneplus"), 16_000.0);
        assert_eq!(brand_tier_base("APPLE"), 30_000.0);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_to_hundred(65_374.05), 65_400);
        assert_eq!(round_to_hundred(150.0), 200);
        assert_eq!(round_to_hundred(149.99), 100);
        assert_eq!(round_to_hundred(49.0), 0);
        assert_eq!(round_to_hundred(-300.0), 0);
        assert_eq!(round_half_up(-2.5), -2.0);
    }

    #[test]
    fn factor_applies_all_three() {
        let f = adjustment_factor(&ConditionTier::LikeNew, 12, &NetworkType::FiveG);
        assert!((f - 0.96 * 1.09 * 1.05).abs() < 1e-12);
    }
}
