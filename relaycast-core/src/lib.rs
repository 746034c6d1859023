pub mod config;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod media;
pub mod models;
pub mod registry;
pub mod signal;

pub use config::Config;
pub use error::{Error, Result};

// Global server start time for uptime calculation
use once_cell::sync::Lazy;
use std::time::Instant;

pub static SERVER_START_TIME: Lazy<Instant> = Lazy::new(Instant::now);
