//! CSV intake template, device import and result export.
//!
//! Import expected columns:
//!   brand, model, ram_gb, storage_gb, network_type, condition_tier, warranty_months
//! An optional customer_sample_price column is honoured when present.

use crate::error::{Error, Result};
use crate::model::{ConditionTier, DeviceInput, NetworkType, Run};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const TEMPLATE_HEADERS: [&str; 7] = [
    "brand",
    "model",
    "ram_gb",
    "storage_gb",
    "network_type",
    "condition_tier",
    "warranty_months",
];

const TEMPLATE_EXAMPLES: [[&str; 7]; 3] = [
    ["Apple", "iPhone 16", "4", "128", "5G", "Good", "6"],
    ["Apple", "iPhone 12", "4", "64", "5G", "Fair", "3"],
    ["Samsung", "Galaxy S21", "8", "128", "5G", "Good", "6"],
];

/// One CSV row as typed. Everything is text so a bad cell degrades instead
/// of rejecting the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DeviceRecord {
    brand: String,
    model: String,
    ram_gb: String,
    storage_gb: String,
    network_type: String,
    condition_tier: String,
    warranty_months: String,
    customer_sample_price: String,
}

impl DeviceRecord {
    fn into_device(self) -> DeviceInput {
        let network_type = if self.network_type.is_empty() {
            NetworkType::FourG
        } else {
            NetworkType::from(self.network_type)
        };
        let condition_tier = if self.condition_tier.is_empty() {
            ConditionTier::Good
        } else {
            ConditionTier::from(self.condition_tier)
        };
        DeviceInput {
            ram: self.ram_gb,
            storage: self.storage_gb,
            network_type,
            condition_tier,
            warranty_months: parse_leading_int(&self.warranty_months).unwrap_or(0),
            customer_sample_price: parse_leading_int(&self.customer_sample_price).filter(|p| *p > 0),
            ..DeviceInput::new(self.brand, self.model)
        }
    }
}

/// Leading decimal digits of a cell, so "6 months" reads as 6.
fn parse_leading_int(cell: &str) -> Option<u32> {
    let digits: String = cell.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

pub fn input_template() -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TEMPLATE_HEADERS)?;
    for row in TEMPLATE_EXAMPLES {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidInput(e.to_string()))
}

/// Parse devices from CSV, assigning each a fresh id.
pub fn read_devices<R: Read>(reader: R, max_devices: usize) -> Result<Vec<DeviceInput>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut devices = Vec::new();
    for (line_num, result) in csv_reader.deserialize::<DeviceRecord>().enumerate() {
        let record = result.map_err(|e| {
            Error::InvalidInput(format!("CSV parse error at line {}: {}", line_num + 2, e))
        })?;
        if record.brand.is_empty() && record.model.is_empty() {
            continue;
        }
        devices.push(record.into_device());
    }

    if devices.is_empty() {
        return Err(Error::InvalidInput("CSV contains no devices".to_string()));
    }
    if devices.len() > max_devices {
        return Err(Error::InvalidInput(format!(
            "CSV must contain at most {} devices, found {}",
            max_devices,
            devices.len()
        )));
    }
    Ok(devices)
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    brand: &'a str,
    model: &'a str,
    ram_gb: &'a str,
    storage_gb: &'a str,
    network_type: &'a str,
    condition_tier: &'a str,
    warranty_months: u32,
    recommended_price: Option<u32>,
    price_low: Option<u32>,
    price_high: Option<u32>,
    confidence: Option<u8>,
    velocity: Option<&'a str>,
    velocity_days: Option<u32>,
    explanation: Option<&'a str>,
    velocity_explanation: Option<&'a str>,
    risk_flags: Option<String>,
    human_approved_price: Option<u32>,
    human_velocity_override: Option<&'a str>,
    feedback_note: Option<&'a str>,
    accepted: Option<&'a str>,
}

/// Export every device of a run with its result and review overlay.
/// Devices without a result get empty result columns.
pub fn write_results<W: Write>(run: &Run, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for device in &run.devices {
        let result = run.result(&device.id);
        csv_writer.serialize(ExportRow {
            brand: &device.brand,
            model: &device.model,
            ram_gb: &device.ram,
            storage_gb: &device.storage,
            network_type: device.network_type.as_str(),
            condition_tier: device.condition_tier.as_str(),
            warranty_months: device.warranty_months,
            recommended_price: result.map(|r| r.recommended_price),
            price_low: result.map(|r| r.price_low),
            price_high: result.map(|r| r.price_high),
            confidence: result.map(|r| r.confidence_score),
            velocity: result.map(|r| r.velocity_category.as_str()),
            velocity_days: result.map(|r| r.velocity_days_estimate),
            explanation: result.map(|r| r.pricing_explanation.as_str()),
            velocity_explanation: result.map(|r| r.velocity_explanation.as_str()),
            risk_flags: result.map(|r| r.risk_flags.join("; ")),
            human_approved_price: result.and_then(|r| r.human_approved_price),
            human_velocity_override: result.and_then(|r| r.human_velocity_override).map(|v| v.as_str()),
            feedback_note: result.and_then(|r| r.human_feedback_note.as_deref()),
            accepted: result
                .and_then(|r| r.is_accepted)
                .map(|a| if a { "Yes" } else { "No" }),
        })?;
    }

    csv_writer.flush()?;
    Ok(())
}
