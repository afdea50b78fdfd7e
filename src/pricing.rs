use crate::adjustments::{adjustment_factor, brand_tier_base, round_to_hundred};
use crate::model::{DeviceInput, KBPattern, MarketReference};

const BASE_CONFIDENCE: u8 = 80;
const FALLBACK_CONFIDENCE: u8 = 38;
const MAX_CONFIDENCE: u8 = 95;
const KB_CONFIDENCE_BONUS: u8 = 8;
const SAMPLE_CONFIDENCE_BONUS: u8 = 5;
const KB_MIN_OCCURRENCES: usize = 3;
const MIN_PRICE: u32 = 100;

const KB_WEIGHT: f64 = 0.4;
const SAMPLE_WEIGHT: f64 = 0.25;

// Band around the recommendation
const LOW_FACTOR: f64 = 0.92;
const HIGH_FACTOR: f64 = 1.08;
const ANCHOR_CEILING: f64 = 0.93;    // never imply more than 93% of the cheapest anchor
const FORCED_SPREAD: f64 = 1.05;
const FALLBACK_LOW_FACTOR: f64 = 0.88;
const FALLBACK_HIGH_FACTOR: f64 = 1.12;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub recommended: u32,
    pub low: u32,
    pub high: u32,
    pub confidence: u8,

    pub blended_base: Option<f64>,     // None on the fallback path
    pub adjusted: f64,                 // after condition/warranty/network, before sample and KB
    pub sample_price: Option<u32>,     // customer sample actually blended in
    pub kb_adjustment: f64,            // already weighted
}

/// Price one device. `reference` is a validated table row (see `MarketReference::problem`);
/// `pattern` is the KB pattern for this device's brand|model|condition, if any.
pub fn price(device: &DeviceInput, reference: Option<&MarketReference>, pattern: Option<&KBPattern>) -> PriceQuote {
    match reference {
        Some(r) => price_with_reference(device, r, pattern),
        None => price_fallback(device),
    }
}

fn price_with_reference(device: &DeviceInput, reference: &MarketReference, pattern: Option<&KBPattern>) -> PriceQuote {
    let blended_base = reference.blended_base();
    let adjusted = blended_base
        * adjustment_factor(&device.condition_tier, device.warranty_months, &device.network_type);

    let sample_price = device.sample_price();
    let blended = match sample_price {
        Some(sample) => adjusted * (1.0 - SAMPLE_WEIGHT) + sample as f64 * SAMPLE_WEIGHT,
        None => adjusted,
    };

    let kb_adjustment = pattern.map(|p| p.avg_delta as f64 * KB_WEIGHT).unwrap_or(0.0);
    let recommended = round_to_hundred(blended + kb_adjustment).max(MIN_PRICE);

    let mut confidence = BASE_CONFIDENCE;
    if pattern.map_or(false, |p| p.occurrences >= KB_MIN_OCCURRENCES) {
        confidence = (confidence + KB_CONFIDENCE_BONUS).min(MAX_CONFIDENCE);
    }
    if sample_price.is_some() {
        confidence = (confidence + SAMPLE_CONFIDENCE_BONUS).min(MAX_CONFIDENCE);
    }

    let low = round_to_hundred(recommended as f64 * LOW_FACTOR);
    let ceiling = reference.lowest_sale_price() as f64 * ANCHOR_CEILING;
    let mut high = round_to_hundred((recommended as f64 * HIGH_FACTOR).min(ceiling));
    if high < low {
        high = round_to_hundred(low as f64 * FORCED_SPREAD);
    }

    PriceQuote {
        recommended,
        low,
        high,
        confidence,
        blended_base: Some(blended_base),
        adjusted,
        sample_price,
        kb_adjustment,
    }
}

fn price_fallback(device: &DeviceInput) -> PriceQuote {
    let adjusted = brand_tier_base(&device.brand)
        * adjustment_factor(&device.condition_tier, device.warranty_months, &device.network_type);
    let recommended = round_to_hundred(adjusted).max(MIN_PRICE);

    PriceQuote {
        recommended,
        low: round_to_hundred(recommended as f64 * FALLBACK_LOW_FACTOR),
        high: round_to_hundred(recommended as f64 * FALLBACK_HIGH_FACTOR),
        confidence: FALLBACK_CONFIDENCE,
        blended_base: None,
        adjusted,
        sample_price: None,
        kb_adjustment: 0.0,
    }
}
