//! gpcompat core
//!
//! Shared domain types for the query compatibility checker: run configuration,
//! the tagged execution error reported by the target engine, and the outcome
//! every checked query is classified into.

pub mod config;
pub mod issue;

pub use config::{Config, ConfigError, InputConfig, TargetConfig, CheckConfig, RulesConfig, OutputConfig};
pub use issue::{Issue, ExecutionError, Outcome};
