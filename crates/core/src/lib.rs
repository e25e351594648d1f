//! Shared foundation for garagebot: configuration loading and the error
//! kinds every other crate speaks.

pub mod config;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, DriverMode, LoadOptions, LogFormat};
pub use errors::GarageError;
