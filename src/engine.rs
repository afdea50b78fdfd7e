//! Run orchestrator: prices every device in a batch independently.
//!
//! The engine performs no I/O. It is handed the market table and the
//! pre-aggregated KB patterns and returns one result per device, in order.

use crate::error::{Error, Result};
use crate::explain::{pricing_explanation, risk_flags, velocity_explanation};
use crate::market::MarketTable;
use crate::model::{pattern_key, DeviceInput, KBPattern, MarketReference, MarketSignal, PricingResult};
use crate::pricing::price;
use crate::velocity::{estimate, VelocitySignals};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub struct Engine<'a> {
    market: &'a MarketTable,
}

type PatternIndex<'p> = HashMap<&'p str, &'p KBPattern>;

fn index_patterns(patterns: &[KBPattern]) -> PatternIndex<'_> {
    patterns.iter().map(|p| (p.key.as_str(), p)).collect()
}

fn check_unique_ids(devices: &[DeviceInput]) -> Result<()> {
    let mut seen = HashSet::with_capacity(devices.len());
    for d in devices {
        if !seen.insert(d.id.as_str()) {
            return Err(Error::InvalidInput(format!("duplicate device id '{}' in run", d.id)));
        }
    }
    Ok(())
}

fn market_signals(device: &DeviceInput, reference: Option<&MarketReference>) -> Vec<MarketSignal> {
    let Some(r) = reference else {
        return Vec::new();
    };
    [
        ("Cashify", r.cashify_avg),
        ("Ovantica", r.ovantica_avg),
        ("Refit Global", r.refit_global_avg),
    ]
    .into_iter()
    .map(|(source, price)| MarketSignal {
        source: source.to_string(),
        price,
        condition: device.condition_tier.to_string(),
    })
    .collect()
}

impl<'a> Engine<'a> {
    pub fn new(market: &'a MarketTable) -> Self {
        Engine { market }
    }

    fn price_indexed<R: Rng + ?Sized>(&self, device: &DeviceInput, patterns: &PatternIndex<'_>, rng: &mut R) -> PricingResult {
        let reference = self.market.lookup(&device.brand, &device.model);
        let key = pattern_key(&device.brand, &device.model, &device.condition_tier);
        let pattern = patterns.get(key.as_str()).copied();

        let quote = price(device, reference, pattern);
        let velocity = estimate(&VelocitySignals::from_reference(reference), &device.condition_tier, rng);

        debug!(
            device = %device.id,
            brand = %device.brand,
            model = %device.model,
            referenced = reference.is_some(),
            recommended = quote.recommended,
            confidence = quote.confidence,
            velocity = %velocity.category,
            "priced device"
        );

        // Fallback pricing does not use KB history, so it is not mentioned either
        let kb_delta = pattern.filter(|_| reference.is_some()).map(|p| p.avg_delta);

        PricingResult {
            device_id: device.id.clone(),
            recommended_price: quote.recommended,
            price_low: quote.low,
            price_high: quote.high,
            confidence_score: quote.confidence,
            velocity_category: velocity.category,
            velocity_days_estimate: velocity.days,
            pricing_explanation: pricing_explanation(device, reference, &quote, kb_delta),
            velocity_explanation: velocity_explanation(device, reference, &velocity),
            risk_flags: risk_flags(device, reference, &quote),
            market_signals: market_signals(device, reference),
            human_approved_price: None,
            human_velocity_override: None,
            human_feedback_note: None,
            is_accepted: None,
            reviewed_at: None,
        }
    }

    /// Price a single device against the given patterns.
    pub fn price_device<R: Rng + ?Sized>(&self, device: &DeviceInput, patterns: &[KBPattern], rng: &mut R) -> PricingResult {
        self.price_indexed(device, &index_patterns(patterns), rng)
    }

    /// Price a batch in parallel. Device `i` draws its day jitter from a
    /// generator seeded with `seed + i`, so a seed pins the whole output.
    pub fn run(&self, devices: &[DeviceInput], patterns: &[KBPattern], seed: u64) -> Result<Vec<PricingResult>> {
        check_unique_ids(devices)?;
        let index = index_patterns(patterns);

        let results: Vec<PricingResult> = devices
            .par_iter()
            .enumerate()
            .map(|(i, device)| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                self.price_indexed(device, &index, &mut rng)
            })
            .collect();

        info!(
            devices = results.len(),
            referenced = results.iter().filter(|r| !r.market_signals.is_empty()).count(),
            patterns = patterns.len(),
            "priced run"
        );
        Ok(results)
    }

    /// Sequential variant drawing all jitter from one caller-owned generator.
    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        devices: &[DeviceInput],
        patterns: &[KBPattern],
        rng: &mut R,
    ) -> Result<Vec<PricingResult>> {
        check_unique_ids(devices)?;
        let index = index_patterns(patterns);
        Ok(devices
            .iter()
            .map(|device| self.price_indexed(device, &index, rng))
            .collect())
    }
}
