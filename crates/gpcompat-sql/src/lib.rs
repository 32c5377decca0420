//! SQL dialect normalization
//!
//! Targeted textual rewriting of source-dialect queries so the target engine
//! can parse them. This is not a SQL parser: each stage is a regex rewrite
//! that leaves text it does not recognize untouched.

pub mod normalize;

pub use normalize::{QueryNormalizer, STUB_PRIMARY_KEY_COLUMN};
