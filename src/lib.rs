//! Resale price and sell-through velocity recommendations for refurbished
//! smartphones.
//!
//! The core is [`engine::Engine`]: given devices, the market reference table
//! and knowledge-base patterns it produces one [`model::PricingResult`] per
//! device. Persistence, CSV and the review loop sit around it.

pub mod adjustments;
pub mod config;
pub mod csv_io;
pub mod engine;
pub mod error;
pub mod explain;
pub mod market;
pub mod model;
pub mod pricing;
pub mod runs;
pub mod stats;
pub mod store;
pub mod velocity;

pub use engine::Engine;
pub use error::{Error, Result};
pub use market::MarketTable;
