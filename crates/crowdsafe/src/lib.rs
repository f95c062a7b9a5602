//! `crowdsafe` - Crowd-safety risk predictions over HTTP
//!
//! This library classifies crowd observations into density and risk tiers,
//! projects a short synthetic trend for charting, and records every prediction
//! in a `SQLite` store mirrored to an append-only CSV log.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod classifier;
pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod prediction;
pub mod server;
pub mod service;
pub mod storage;
pub mod store;
pub mod trend;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use prediction::{ChartData, Density, PredictionRecord, Risk, RiskCounts};
pub use service::PredictionService;
pub use store::{FileStore, PredictionStore};
