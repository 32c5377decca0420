//! Compatibility checking
//!
//! This crate handles:
//! - Matching failures against the known-issue rule set
//! - Thread-safe ok / known / unknown statistics with periodic snapshots
//! - The bounded worker pool that checks queries against the target engine
//! - The end-of-run terminal report

pub mod rules;
pub mod stats;
pub mod persist;
pub mod checker;
pub mod report;

pub use rules::{RuleStore, RuleRecord, IssuePattern, RuleMatch, RulesError};
pub use stats::{StatsAggregator, StatsSnapshot, CounterWithExample, sanitize_example};
pub use persist::PersistError;
pub use checker::{ConcurrentChecker, CheckerSettings, CheckError, RunSummary};
pub use report::{ReportOptions, render_report, print_report};
