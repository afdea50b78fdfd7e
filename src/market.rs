//! Market reference table: brand+model -> sale anchors and demand proxies.
//!
//! Lookups fold case on both fields and otherwise require an exact match.
//! A miss is normal and sends the device down the fallback pricing path.

use crate::error::{Error, Result};
use crate::model::MarketReference;
use std::collections::HashMap;
use std::io::Read;
use std::sync::OnceLock;

// brand, model, cashify, ovantica, refit global, flipkart listings, amazon rank, demand
type Row = (&'static str, &'static str, u32, u32, u32, u32, u8, u8);

const BUILTIN_ROWS: &[Row] = &[
    ("Apple", "iPhone 15", 58000, 61000, 59500, 130, 1, 9),
    ("Apple", "iPhone 14", 46000, 49000, 47500, 190, 1, 9),
    ("Apple", "iPhone 13", 34000, 36500, 35000, 260, 2, 8),
    ("Apple", "iPhone 12", 26000, 28000, 27000, 310, 2, 7),
    ("Apple", "iPhone 11", 20000, 21500, 20800, 370, 3, 7),
    ("Apple", "iPhone X", 14500, 15800, 15000, 280, 4, 5),
    ("Samsung", "S24", 52000, 55000, 53500, 105, 2, 8),
    ("Samsung", "S21", 24000, 26000, 25000, 220, 3, 7),
    ("Samsung", "A73 5G", 18000, 19500, 18800, 300, 4, 6),
    ("Samsung", "A52 5G", 14000, 15200, 14600, 340, 4, 6),
    ("Samsung", "M34 5G", 10500, 11500, 11000, 380, 5, 5),
    ("Google", "Pixel 8", 48000, 51000, 49500, 75, 2, 7),
    ("Google", "Pixel 6a", 22000, 24000, 23000, 120, 3, 7),
    ("Vivo", "V25", 14500, 15800, 15000, 260, 5, 5),
    ("Vivo", "V23", 12500, 13800, 13000, 290, 5, 5),
    ("Vivo", "Y75 5G", 9000, 9800, 9400, 350, 6, 4),
    ("Oneplus", "9", 20000, 21800, 21000, 190, 3, 7),
    ("Oneplus", "Nord CE 2 Lite", 11000, 12000, 11500, 310, 5, 5),
    ("Xiaomi", "11T Pro 5G", 18500, 20000, 19200, 200, 4, 6),
    ("Xiaomi", "Redmi Note 12", 9500, 10500, 10000, 430, 5, 5),
    ("Xiaomi", "Redmi 9A", 5000, 5600, 5300, 500, 7, 3),
    ("Oppo", "Reno 8", 16000, 17500, 16800, 240, 5, 5),
    ("Oppo", "Reno 7", 13000, 14200, 13600, 270, 5, 5),
    ("Oppo", "F19 Pro", 10500, 11500, 11000, 290, 6, 4),
    ("Poco", "F4 5G", 15500, 17000, 16200, 230, 4, 6),
];

fn table_key(brand: &str, model: &str) -> (String, String) {
    (brand.to_lowercase(), model.to_lowercase())
}

pub struct MarketTable {
    rows: Vec<MarketReference>,
    index: HashMap<(String, String), usize>,
}

impl MarketTable {
    /// Build a table, rejecting out-of-range rows and a second row for the
    /// same brand+model.
    pub fn from_rows(rows: Vec<MarketReference>) -> Result<Self> {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if let Some(problem) = row.problem() {
                return Err(Error::InvalidInput(format!(
                    "market reference {} {} (row {}): {}",
                    row.brand,
                    row.model,
                    i + 1,
                    problem
                )));
            }
            if index.insert(table_key(&row.brand, &row.model), i).is_some() {
                return Err(Error::InvalidInput(format!(
                    "duplicate market reference for {} {}",
                    row.brand, row.model
                )));
            }
        }
        Ok(MarketTable { rows, index })
    }

    /// Load rows from a JSON array of `MarketReference` objects.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let rows: Vec<MarketReference> = serde_json::from_reader(reader)?;
        let table = Self::from_rows(rows)?;
        tracing::info!(rows = table.len(), "loaded market reference table");
        Ok(table)
    }

    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_json(std::io::BufReader::new(file))
    }

    /// The compiled-in table, built once per process.
    pub fn builtin() -> &'static MarketTable {
        static BUILTIN: OnceLock<MarketTable> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let rows = BUILTIN_ROWS
                .iter()
                .map(|&(brand, model, cashify, ovantica, refit, listings, rank, demand)| MarketReference {
                    brand: brand.to_string(),
                    model: model.to_string(),
                    cashify_avg: cashify,
                    ovantica_avg: ovantica,
                    refit_global_avg: refit,
                    flipkart_listings: listings,
                    amazon_rank: rank,
                    demand_score: demand,
                })
                .collect::<Vec<_>>();
            let index = rows
                .iter()
                .enumerate()
                .map(|(i, r)| (table_key(&r.brand, &r.model), i))
                .collect();
            MarketTable { rows, index }
        })
    }

    pub fn lookup(&self, brand: &str, model: &str) -> Option<&MarketReference> {
        self.index
            .get(&table_key(brand, model))
            .map(|&i| &self.rows[i])
    }

    pub fn rows(&self) -> &[MarketReference] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_exact() {
        let table = MarketTable::builtin();
        let r = table.lookup("apple", "IPHONE 15").unwrap();
        assert_eq!(r.cashify_avg, 58000);
        assert!(table.lookup("Apple", "iPhone15").is_none());
        assert!(table.lookup("Apple", "iPhone 15 Pro").is_none());
        assert!(table.lookup("Nokia", "X").is_none());
    }

    #[test]
    fn builtin_has_no_duplicates() {
        let table = MarketTable::builtin();
        assert_eq!(table.len(), 25);
        assert!(MarketTable::from_rows(table.rows().to_vec()).is_ok());
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let json = r#"[
            {"brand":"Apple","model":"iPhone 15","cashify_avg":1,"ovantica_avg":1,"refit_global_avg":1,
             "flipkart_listings":1,"amazon_rank":1,"demand_score":1},
            {"brand":"APPLE","model":"iphone 15","cashify_avg":2,"ovantica_avg":2,"refit_global_avg":2,
             "flipkart_listings":2,"amazon_rank":2,"demand_score":2}
        ]"#;
        let err = MarketTable::from_json(json.as_bytes()).err().unwrap();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    fn nokia_row(fields: &str) -> String {
        format!(
            r#"[{{"brand":"Nokia","model":"X","cashify_avg":5000,"ovantica_avg":5200,
                "refit_global_avg":5100,"flipkart_listings":90,{}}}]"#,
            fields
        )
    }

    #[test]
    fn out_of_range_rows_are_rejected() {
        let err = MarketTable::from_json(nokia_row(r#""amazon_rank":30,"demand_score":5"#).as_bytes())
            .err()
            .unwrap();
        match err {
            Error::InvalidInput(msg) => {
                assert!(msg.contains("Nokia X"));
                assert!(msg.contains("amazon_rank 30"));
            }
            other => panic!("unexpected error {:?}", other),
        }

        for fields in [r#""amazon_rank":0,"demand_score":5"#, r#""amazon_rank":3,"demand_score":200"#] {
            let err = MarketTable::from_json(nokia_row(fields).as_bytes()).err().unwrap();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
        assert!(MarketTable::from_json(nokia_row(r#""amazon_rank":10,"demand_score":1"#).as_bytes()).is_ok());
    }

    #[test]
    fn zero_anchor_rows_are_rejected() {
        let json = r#"[{"brand":"Apple","model":"iPhone 13","cashify_avg":0,"ovantica_avg":36500,
            "refit_global_avg":35000,"flipkart_listings":260,"amazon_rank":2,"demand_score":8}]"#;
        let err = MarketTable::from_json(json.as_bytes()).err().unwrap();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("positive")));
    }

    #[test]
    fn builtin_rows_are_in_range() {
        assert!(MarketTable::builtin().rows().iter().all(|r| r.problem().is_none()));
    }

    #[test]
    fn loads_rows_from_json() {
        let json = r#"[{"brand":"Nokia","model":"X","cashify_avg":5000,"ovantica_avg":5200,
            "refit_global_avg":5100,"flipkart_listings":90,"amazon_rank":8,"demand_score":2}]"#;
        let table = MarketTable::from_json(json.as_bytes()).unwrap();
        assert_eq!(table.lookup("nokia", "x").unwrap().demand_score, 2);
    }
}
