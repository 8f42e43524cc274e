#![forbid(unsafe_code)]

pub mod analysis;
pub mod capture;
pub mod config;
pub mod detector;
pub mod errors;
pub mod history;
pub mod notify;
pub mod orchestrator;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
