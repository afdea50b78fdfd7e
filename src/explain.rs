//! Reviewer-facing rationale and risk flags.
//!
//! Everything here is a pure function of the device, its reference row and
//! the already-computed quote/velocity. Nothing is recomputed.

use crate::adjustments::{condition_multiplier, network_premium, warranty_premium};
use crate::model::{ConditionTier, DeviceInput, MarketReference, NetworkType};
use crate::pricing::PriceQuote;
use crate::velocity::VelocityEstimate;

const KB_MENTION_DELTA: f64 = 500.0;
const LOW_CONFIDENCE: u8 = 55;
const OVERSUPPLY_LISTINGS: u32 = 350;
const LOW_DEMAND_SCORE: u8 = 4;
const OVANTICA_MARGIN_SHARE: f64 = 0.95;

/// Rupee amount with Indian digit grouping, e.g. `₹1,23,456`.
pub fn inr(amount: u64) -> String {
    let digits = amount.to_string();
    if digits.len() <= 3 {
        return format!("₹{}", digits);
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (h, t) = rest.split_at(rest.len() - 2);
        groups.push(t);
        rest = h;
    }
    groups.push(rest);
    groups.reverse();
    format!("₹{},{}", groups.join(","), tail)
}

fn signed_percent(fraction: f64) -> String {
    format!("{:+.1}%", fraction * 100.0)
}

pub fn pricing_explanation(
    device: &DeviceInput,
    reference: Option<&MarketReference>,
    quote: &PriceQuote,
    kb_avg_delta: Option<i64>,
) -> String {
    let (reference, blended_base) = match (reference, quote.blended_base) {
        (Some(r), Some(base)) => (r, base),
        _ => {
            return format!(
                "No direct market reference for {} {}. Low-confidence estimate of {} (range {}-{}) \
                 built from the {} brand tier base with condition, warranty and network adjustments.",
                device.brand,
                device.model,
                inr(quote.recommended as u64),
                inr(quote.low as u64),
                inr(quote.high as u64),
                device.brand,
            );
        }
    };

    let mut parts = vec![format!(
        "Blended market anchor of {} from Cashify ({}), Ovantica ({}) and Refit Global ({}).",
        inr(blended_base.round() as u64),
        inr(reference.cashify_avg as u64),
        inr(reference.ovantica_avg as u64),
        inr(reference.refit_global_avg as u64),
    )];

    parts.push(format!(
        "Applied a {:.2}x condition multiplier for {} grade.",
        condition_multiplier(&device.condition_tier),
        device.condition_tier
    ));

    let warranty = warranty_premium(device.warranty_months);
    if warranty > 0.0 {
        parts.push(format!(
            "Added a {:.1}% premium for the {}-month warranty.",
            warranty * 100.0,
            device.warranty_months
        ));
    }

    let network = network_premium(&device.network_type);
    if network != 0.0 {
        parts.push(format!(
            "Applied a {} network adjustment for {}.",
            signed_percent(network),
            device.network_type
        ));
    }

    parts.push(format!(
        "Adjusted value of {} before sample and reviewer history.",
        inr(quote.adjusted.round() as u64)
    ));

    if let Some(sample) = quote.sample_price {
        parts.push(format!(
            "Customer sample price of {} blended in at 25% weight.",
            inr(sample as u64)
        ));
    }

    if let Some(delta) = kb_avg_delta.filter(|d| (*d as f64).abs() > KB_MENTION_DELTA) {
        let direction = if delta > 0 { "upward" } else { "downward" };
        parts.push(format!(
            "Reviewers have historically moved this device {} by ~{}; applied at 40% weight ({}).",
            direction,
            inr(delta.unsigned_abs()),
            inr(quote.kb_adjustment.abs().round() as u64),
        ));
    }

    parts.push(format!(
        "Recommended {} at {}% confidence.",
        inr(quote.recommended as u64),
        quote.confidence
    ));

    parts.join(" ")
}

fn listing_depth(listings: u32) -> &'static str {
    if listings > 300 {
        "high"
    } else if listings > 150 {
        "moderate"
    } else {
        "lean"
    }
}

fn demand_strength(demand: u8) -> &'static str {
    if demand >= 7 {
        "strong"
    } else if demand >= 5 {
        "moderate"
    } else {
        "soft"
    }
}

pub fn velocity_explanation(
    device: &DeviceInput,
    reference: Option<&MarketReference>,
    velocity: &VelocityEstimate,
) -> String {
    let headline = format!(
        "Expected sell-through: {} (~{} days).",
        velocity.category, velocity.days
    );

    let reference = match reference {
        Some(r) => r,
        None => {
            return format!(
                "{} No marketplace signals exist for this model, so the estimate carries high uncertainty.",
                headline
            );
        }
    };

    let mut text = format!(
        "{} Flipkart listing depth is {} ({} listings) and Amazon demand is {} (score {}/10, rank {}).",
        headline,
        listing_depth(reference.flipkart_listings),
        reference.flipkart_listings,
        demand_strength(reference.demand_score),
        reference.demand_score,
        reference.amazon_rank,
    );

    if matches!(device.condition_tier, ConditionTier::Fair | ConditionTier::Good) {
        text.push_str(&format!(
            " {}-grade units typically take 15-30% longer to sell than Like New.",
            device.condition_tier
        ));
    }

    text
}

/// Independent checks; any number may fire, in a fixed order.
pub fn risk_flags(device: &DeviceInput, reference: Option<&MarketReference>, quote: &PriceQuote) -> Vec<String> {
    let mut flags = Vec::new();

    if reference.is_none() {
        flags.push(format!(
            "No direct market reference for {} {}; price is a heuristic estimate",
            device.brand, device.model
        ));
    }

    if quote.confidence < LOW_CONFIDENCE {
        flags.push(format!(
            "Low confidence ({}%); verify manually before listing",
            quote.confidence
        ));
    }

    if device.condition_tier == ConditionTier::Fair {
        flags.push("Fair condition: higher return and dispute risk".to_string());
    }

    if let Some(r) = reference {
        if r.flipkart_listings > OVERSUPPLY_LISTINGS {
            flags.push(format!(
                "Oversupply: {} Flipkart listings may pressure price",
                r.flipkart_listings
            ));
        }
        if r.demand_score <= LOW_DEMAND_SCORE {
            flags.push(format!(
                "Low demand (score {}/10): niche or declining model",
                r.demand_score
            ));
        }
    }

    if device.warranty_months == 0 {
        flags.push("No warranty offered: lower buyer trust".to_string());
    }

    if device.network_type == NetworkType::ThreeG {
        flags.push("3G device: shrinking buyer pool".to_string());
    }

    if let Some(r) = reference {
        if quote.recommended as f64 > r.ovantica_avg as f64 * OVANTICA_MARGIN_SHARE {
            flags.push(format!(
                "Recommended price exceeds 95% of the Ovantica anchor ({}); margin at risk",
                inr(r.ovantica_avg as u64)
            ));
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketTable;
    use crate::model::VelocityCategory;
    use crate::pricing::price;

    fn device(brand: &str, model: &str, tier: ConditionTier, warranty: u32, net: NetworkType) -> DeviceInput {
        DeviceInput {
            condition_tier: tier,
            warranty_months: warranty,
            network_type: net,
            ..DeviceInput::new(brand, model)
        }
    }

    fn medium(days: u32) -> VelocityEstimate {
        VelocityEstimate { category: VelocityCategory::Medium, days }
    }

    #[test]
    fn inr_uses_indian_grouping() {
        assert_eq!(inr(0), "₹0");
        assert_eq!(inr(999), "₹999");
        assert_eq!(inr(1000), "₹1,000");
        assert_eq!(inr(65400), "₹65,400");
        assert_eq!(inr(123456), "₹1,23,456");
        assert_eq!(inr(12345678), "₹1,23,45,678");
    }

    #[test]
    fn referenced_explanation_names_sources_and_premiums() {
        let d = device("Apple", "iPhone 15", ConditionTier::LikeNew, 12, NetworkType::FiveG);
        let r = MarketTable::builtin().lookup("Apple", "iPhone 15");
        let q = price(&d, r, None);
        let text = pricing_explanation(&d, r, &q, None);

        assert!(text.contains("₹59,500"));
        assert!(text.contains("Cashify (₹58,000)"));
        assert!(text.contains("Ovantica (₹61,000)"));
        assert!(text.contains("0.96x"));
        assert!(text.contains("9.0% premium"));
        assert!(text.contains("+5.0% network"));
        // 59,500 x 0.96 x 1.09 x 1.05
        assert!(text.contains("Adjusted value of ₹65,374"));
        assert!(!text.contains("Reviewers"));
    }

    #[test]
    fn unlisted_warranty_gets_no_premium_sentence() {
        let d = device("Samsung", "S21", ConditionTier::Good, 7, NetworkType::FourG);
        let r = MarketTable::builtin().lookup("Samsung", "S21");
        let q = price(&d, r, None);
        let text = pricing_explanation(&d, r, &q, None);
        assert!(!text.contains("premium"));
        assert!(!text.contains("network adjustment"));
    }

    #[test]
    fn kb_sentence_only_above_threshold() {
        let d = device("Samsung", "S21", ConditionTier::Good, 0, NetworkType::FourG);
        let r = MarketTable::builtin().lookup("Samsung", "S21");
        let q = price(&d, r, None);
        assert!(!pricing_explanation(&d, r, &q, Some(500)).contains("Reviewers"));
        let down = pricing_explanation(&d, r, &q, Some(-1200));
        assert!(down.contains("downward by ~₹1,200"));
        assert!(pricing_explanation(&d, r, &q, Some(900)).contains("upward"));
    }

    #[test]
    fn fallback_explanation_names_price_and_range() {
        let d = device("Nokia", "X", ConditionTier::Good, 0, NetworkType::FourG);
        let q = price(&d, None, None);
        let text = pricing_explanation(&d, None, &q, None);
        assert!(text.starts_with("No direct market reference for Nokia X."));
        assert!(text.contains("₹7,400"));
        assert!(text.contains("₹6,500-₹8,300"));
    }

    #[test]
    fn velocity_text_characterises_signals() {
        let d = device("Xiaomi", "Redmi Note 12", ConditionTier::Fair, 0, NetworkType::FourG);
        let r = MarketTable::builtin().lookup("Xiaomi", "Redmi Note 12");
        let text = velocity_explanation(&d, r, &medium(20));
        assert!(text.contains("Medium (~20 days)"));
        assert!(text.contains("listing depth is high"));
        assert!(text.contains("demand is moderate"));
        assert!(text.contains("Fair-grade units"));

        let d = device("Google", "Pixel 8", ConditionTier::LikeNew, 0, NetworkType::FiveG);
        let r = MarketTable::builtin().lookup("Google", "Pixel 8");
        let text = velocity_explanation(&d, r, &medium(20));
        assert!(text.contains("lean"));
        assert!(text.contains("strong"));
        assert!(!text.contains("longer to sell"));
    }

    #[test]
    fn good_grade_gets_slower_sale_caveat() {
        let d = device("Vivo", "V23", ConditionTier::Good, 0, NetworkType::FourG);
        let r = MarketTable::builtin().lookup("Vivo", "V23");
        let text = velocity_explanation(&d, r, &medium(22));
        assert!(text.contains("Good-grade units typically take 15-30% longer to sell"));

        let d = device("Vivo", "V23", ConditionTier::Excellent, 0, NetworkType::FourG);
        assert!(!velocity_explanation(&d, r, &medium(22)).contains("longer to sell"));
    }

    #[test]
    fn velocity_text_without_reference() {
        let d = device("Nokia", "X", ConditionTier::Good, 0, NetworkType::FourG);
        let text = velocity_explanation(&d, None, &medium(25));
        assert!(text.contains("high uncertainty"));
        assert!(!text.contains("Flipkart"));
    }

    #[test]
    fn clean_device_raises_no_flags() {
        let d = device("Samsung", "S21", ConditionTier::Excellent, 6, NetworkType::FiveG);
        let r = MarketTable::builtin().lookup("Samsung", "S21");
        let q = price(&d, r, None);
        assert!(risk_flags(&d, r, &q).is_empty());
    }

    #[test]
    fn flags_co_occur_in_order() {
        let d = device("Xiaomi", "Redmi 9A", ConditionTier::Fair, 0, NetworkType::ThreeG);
        let r = MarketTable::builtin().lookup("Xiaomi", "Redmi 9A");
        let q = price(&d, r, None);
        let flags = risk_flags(&d, r, &q);
        assert_eq!(flags.len(), 5);
        assert!(flags[0].starts_with("Fair condition"));
        assert!(flags[1].starts_with("Oversupply"));
        assert!(flags[2].starts_with("Low demand"));
        assert!(flags[3].starts_with("No warranty"));
        assert!(flags[4].starts_with("3G device"));
    }

    #[test]
    fn missing_reference_flags_low_confidence() {
        let d = device("Nokia", "X", ConditionTier::Good, 3, NetworkType::FourG);
        let q = price(&d, None, None);
        let flags = risk_flags(&d, None, &q);
        assert!(flags[0].starts_with("No direct market reference"));
        assert!(flags[1].starts_with("Low confidence (38%)"));
        assert_eq!(flags.len(), 2);
    }

    #[test]
    fn margin_warning_above_ovantica_share() {
        let d = device("Apple", "iPhone 15", ConditionTier::LikeNew, 12, NetworkType::FiveG);
        let r = MarketTable::builtin().lookup("Apple", "iPhone 15");
        let q = price(&d, r, None);
        // 65,400 > 0.95 * 61,000
        let flags = risk_flags(&d, r, &q);
        assert_eq!(flags.len(), 1);
        assert!(flags[0].contains("Ovantica anchor (₹61,000)"));
    }
}
