use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Refurbishment grade. Unlisted grades are kept verbatim so the KB key and
/// exports still show what the operator typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionTier {
    LikeNew,
    Excellent,
    Good,
    Fair,
    Other(String),
}

impl ConditionTier {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionTier::LikeNew => "Like New",
            ConditionTier::Excellent => "Excellent",
            ConditionTier::Good => "Good",
            ConditionTier::Fair => "Fair",
            ConditionTier::Other(s) => s,
        }
    }
}

impl From<String> for ConditionTier {
    fn from(s: String) -> Self {
        match s.trim() {
            "Like New" => ConditionTier::LikeNew,
            "Excellent" => ConditionTier::Excellent,
            "Good" => ConditionTier::Good,
            "Fair" => ConditionTier::Fair,
            _ => ConditionTier::Other(s),
        }
    }
}

impl From<ConditionTier> for String {
    fn from(t: ConditionTier) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ConditionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkType {
    FiveG,
    FourG,
    ThreeG,
    Other(String),
}

impl NetworkType {
    pub fn as_str(&self) -> &str {
        match self {
            NetworkType::FiveG => "5G",
            NetworkType::FourG => "4G",
            NetworkType::ThreeG => "3G",
            NetworkType::Other(s) => s,
        }
    }
}

impl From<String> for NetworkType {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "5G" => NetworkType::FiveG,
            "4G" => NetworkType::FourG,
            "3G" => NetworkType::ThreeG,
            _ => NetworkType::Other(s),
        }
    }
}

impl From<NetworkType> for String {
    fn from(n: NetworkType) -> Self {
        n.as_str().to_string()
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VelocityCategory {
    Fast,
    Medium,
    Slow,
}

impl VelocityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VelocityCategory::Fast => "Fast",
            VelocityCategory::Medium => "Medium",
            VelocityCategory::Slow => "Slow",
        }
    }
}

impl FromStr for VelocityCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(VelocityCategory::Fast),
            "medium" => Ok(VelocityCategory::Medium),
            "slow" => Ok(VelocityCategory::Slow),
            other => Err(format!("unknown velocity category '{}'", other)),
        }
    }
}

impl fmt::Display for VelocityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One phone to be priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInput {
    pub id: String,
    pub brand: String,
    pub model: String,
    pub ram: String,      // free text, e.g. "6"
    pub storage: String,  // free text, e.g. "128"
    pub network_type: NetworkType,
    pub condition_tier: ConditionTier,
    pub warranty_months: u32,
    #[serde(default)]
    pub customer_sample_price: Option<u32>,
}

impl DeviceInput {
    /// A device with a fresh id and the intake defaults (4G, Good, no warranty).
    pub fn new(brand: impl Into<String>, model: impl Into<String>) -> Self {
        DeviceInput {
            id: uuid::Uuid::new_v4().to_string(),
            brand: brand.into(),
            model: model.into(),
            ram: String::new(),
            storage: String::new(),
            network_type: NetworkType::FourG,
            condition_tier: ConditionTier::Good,
            warranty_months: 0,
            customer_sample_price: None,
        }
    }

    /// Sample price only counts when it is a positive figure.
    pub fn sample_price(&self) -> Option<u32> {
        self.customer_sample_price.filter(|p| *p > 0)
    }
}

/// Static benchmark row for one brand+model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketReference {
    pub brand: String,
    pub model: String,

    // Sale price anchors
    pub cashify_avg: u32,
    pub ovantica_avg: u32,
    pub refit_global_avg: u32,

    // Velocity proxies
    pub flipkart_listings: u32,  // supply proxy
    pub amazon_rank: u8,         // 1 = top, 10 = niche
    pub demand_score: u8,        // 1-10
}

impl MarketReference {
    pub fn blended_base(&self) -> f64 {
        (self.cashify_avg as f64 + self.ovantica_avg as f64 + self.refit_global_avg as f64) / 3.0
    }

    pub fn lowest_sale_price(&self) -> u32 {
        self.cashify_avg.min(self.ovantica_avg).min(self.refit_global_avg)
    }

    /// Range problems that make the row unusable for pricing or velocity.
    pub fn problem(&self) -> Option<String> {
        if self.lowest_sale_price() == 0 {
            Some("price anchors must be positive".to_string())
        } else if !(1..=10).contains(&self.amazon_rank) {
            Some(format!("amazon_rank {} is outside 1-10", self.amazon_rank))
        } else if !(1..=10).contains(&self.demand_score) {
            Some(format!("demand_score {} is outside 1-10", self.demand_score))
        } else {
            None
        }
    }
}

/// Snapshot of one reference figure used to price a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSignal {
    pub source: String,
    pub price: u32,
    pub condition: String,
}

/// Aggregated reviewer adjustments for one brand|model|condition group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KBPattern {
    pub key: String,
    pub avg_delta: i64,
    pub occurrences: usize,
    pub insight: String,
}

pub fn pattern_key(brand: &str, model: &str, tier: &ConditionTier) -> String {
    format!("{}|{}|{}", brand, model, tier.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    pub device_id: String,
    pub recommended_price: u32,
    pub price_low: u32,
    pub price_high: u32,
    pub confidence_score: u8,
    pub velocity_category: VelocityCategory,
    pub velocity_days_estimate: u32,
    pub pricing_explanation: String,
    pub velocity_explanation: String,
    pub risk_flags: Vec<String>,
    pub market_signals: Vec<MarketSignal>,

    // Human review overlay, never written by the engine
    #[serde(default)]
    pub human_approved_price: Option<u32>,
    #[serde(default)]
    pub human_velocity_override: Option<VelocityCategory>,
    #[serde(default)]
    pub human_feedback_note: Option<String>,
    #[serde(default)]
    pub is_accepted: Option<bool>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Closed-loop feedback record produced when a reviewer signs off a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseEntry {
    pub id: String,
    pub brand: String,
    pub model: String,
    pub ram: String,
    pub storage: String,
    pub condition_tier: ConditionTier,
    pub recommended_price: u32,
    pub human_approved_price: u32,
    pub delta: i64,  // human - recommended
    pub velocity_category: VelocityCategory,
    pub human_velocity_override: Option<VelocityCategory>,
    pub feedback_note: Option<String>,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "processing" => Ok(RunStatus::Processing),
            "completed" => Ok(RunStatus::Completed),
            "error" => Ok(RunStatus::Error),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// A batch of devices priced together, plus its results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub name: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub devices: Vec<DeviceInput>,
    pub results: Vec<PricingResult>,
    pub feedback_submitted: bool,
}

impl Run {
    pub fn new(name: Option<String>, devices: Vec<DeviceInput>) -> Self {
        let now = Utc::now();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Run {}", now.format("%d %b %Y")));
        Run {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            status: RunStatus::Pending,
            created_at: now,
            completed_at: None,
            devices,
            results: Vec::new(),
            feedback_submitted: false,
        }
    }

    pub fn device(&self, id: &str) -> Option<&DeviceInput> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn result(&self, device_id: &str) -> Option<&PricingResult> {
        self.results.iter().find(|r| r.device_id == device_id)
    }
}
