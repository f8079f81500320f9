//! Configuration file parsing (spec §6 "Configuration"), merged with an
//! auto-discovered [`cleanflux_core::catalog::RpCatalog`].

pub mod catalog;
mod config;
pub mod discovery;

pub use config::{AggregationPropertyConfig, Config, ConfigError, RetentionPolicyOverride};
pub use discovery::discover_rp_catalog;
