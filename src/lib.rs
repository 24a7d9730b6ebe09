//! SensCritique review harvesting and normalization.
//!
//! `pipeline::Assembler` is the entry point: it combines the base profile,
//! the browser-driven review harvest and the favorites scan into one cached
//! `models::Profile`.

pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod scraper;
pub mod utils;

pub use errors::{HarvestError, Result};
