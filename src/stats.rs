use statrs::statistics::Statistics;
use crate::adjustments::round_half_up;
use crate::explain::inr;
use crate::model::{pattern_key, KBPattern, KnowledgeBaseEntry, Run, VelocityCategory};
use std::collections::HashMap;

// Average reviewer delta beyond which a group is considered mispriced
const MISPRICED_DELTA: f64 = 500.0;
// Reviews that moved the price by at most this much count as accepted
const ACCEPTED_DELTA: i64 = 1000;

/// Fold knowledge-base entries into one pattern per brand|model|condition.
/// Output is sorted by key.
pub fn aggregate(entries: &[KnowledgeBaseEntry]) -> Vec<KBPattern> {
    let mut map: HashMap<String, Vec<&KnowledgeBaseEntry>> = HashMap::new();

    for entry in entries {
        let key = pattern_key(&entry.brand, &entry.model, &entry.condition_tier);
        map.entry(key).or_default().push(entry);
    }

    let mut patterns: Vec<KBPattern> = map
        .into_iter()
        .map(|(key, records)| {
            let deltas: Vec<f64> = records.iter().map(|e| e.delta as f64).collect();
            let mean = deltas.iter().mean();
            let avg_delta = round_half_up(mean) as i64;

            let first = records[0];
            KBPattern {
                insight: insight(
                    &format!("{} {} ({})", first.brand, first.model, first.condition_tier),
                    mean,
                    avg_delta,
                    records.len(),
                ),
                key,
                avg_delta,
                occurrences: records.len(),
            }
        })
        .collect();

    patterns.sort_by(|a, b| a.key.cmp(&b.key));
    patterns
}

fn insight(label: &str, mean: f64, avg_delta: i64, occurrences: usize) -> String {
    let direction = if mean > MISPRICED_DELTA {
        "consistently priced below market"
    } else if mean < -MISPRICED_DELTA {
        "consistently over-priced"
    } else {
        "well-calibrated"
    };
    format!(
        "{}: {} by ~{} on average across {} review(s).",
        label,
        direction,
        inr(avg_delta.unsigned_abs()),
        occurrences
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrandStat {
    pub brand: String,
    pub count: usize,
    pub avg_price: u32,
    pub avg_confidence: u8,
    pub fast_count: usize,
}

/// Portfolio summary across every saved run and the knowledge base.
#[derive(Debug, Clone, PartialEq)]
pub struct Analytics {
    pub total_runs: usize,
    pub total_devices: usize,
    pub avg_recommended_price: u32,
    pub avg_confidence: u8,
    pub kb_entries: usize,
    pub acceptance_rate: u8,  // percent of KB entries within ACCEPTED_DELTA
    pub avg_kb_delta: i64,
    pub velocity_distribution: Vec<(VelocityCategory, usize)>,
    pub condition_distribution: Vec<(String, usize)>,  // most common first
    pub brands: Vec<BrandStat>,                        // most devices first
}

fn rounded_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        round_half_up(values.iter().mean())
    }
}

fn by_count_desc<K: Ord>(counts: HashMap<K, usize>) -> Vec<(K, usize)> {
    let mut out: Vec<(K, usize)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

pub fn analytics(runs: &[Run], entries: &[KnowledgeBaseEntry]) -> Analytics {
    let prices: Vec<f64> = runs
        .iter()
        .flat_map(|r| &r.results)
        .map(|r| r.recommended_price as f64)
        .collect();
    let confidences: Vec<f64> = runs
        .iter()
        .flat_map(|r| &r.results)
        .map(|r| r.confidence_score as f64)
        .collect();

    let mut velocity_distribution: Vec<(VelocityCategory, usize)> =
        [VelocityCategory::Fast, VelocityCategory::Medium, VelocityCategory::Slow]
            .into_iter()
            .map(|c| (c, 0))
            .collect();
    let mut conditions: HashMap<String, usize> = HashMap::new();
    let mut brands: HashMap<&str, (Vec<f64>, Vec<f64>, usize)> = HashMap::new();

    for run in runs {
        for result in &run.results {
            if let Some(slot) = velocity_distribution.iter_mut().find(|(c, _)| *c == result.velocity_category) {
                slot.1 += 1;
            }
        }
        for device in &run.devices {
            *conditions.entry(device.condition_tier.to_string()).or_default() += 1;

            // devices the engine never priced are left out of brand figures
            let Some(result) = run.result(&device.id) else { continue };
            let (brand_prices, brand_confidences, fast) = brands.entry(device.brand.as_str()).or_default();
            brand_prices.push(result.recommended_price as f64);
            brand_confidences.push(result.confidence_score as f64);
            if result.velocity_category == VelocityCategory::Fast {
                *fast += 1;
            }
        }
    }

    let mut brand_stats: Vec<BrandStat> = brands
        .into_iter()
        .map(|(brand, (prices, confidences, fast_count))| BrandStat {
            brand: brand.to_string(),
            count: prices.len(),
            avg_price: rounded_mean(&prices) as u32,
            avg_confidence: rounded_mean(&confidences) as u8,
            fast_count,
        })
        .collect();
    brand_stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.brand.cmp(&b.brand)));

    let deltas: Vec<f64> = entries.iter().map(|e| e.delta as f64).collect();
    let accepted = entries.iter().filter(|e| e.delta.abs() <= ACCEPTED_DELTA).count();
    let acceptance_rate = if entries.is_empty() {
        0
    } else {
        round_half_up(accepted as f64 * 100.0 / entries.len() as f64) as u8
    };

    Analytics {
        total_runs: runs.len(),
        total_devices: runs.iter().map(|r| r.devices.len()).sum(),
        avg_recommended_price: rounded_mean(&prices) as u32,
        avg_confidence: rounded_mean(&confidences) as u8,
        kb_entries: entries.len(),
        acceptance_rate,
        avg_kb_delta: rounded_mean(&deltas) as i64,
        velocity_distribution,
        condition_distribution: by_count_desc(conditions),
        brands: brand_stats,
    }
}
