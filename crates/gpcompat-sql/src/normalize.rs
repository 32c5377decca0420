//! Query normalization pipeline
//!
//! Stages run in a fixed order:
//! 1. schema qualification folding (`schema.table` -> `schema___table`)
//! 2. synthetic primary key injection for `CREATE TABLE`
//! 3. removal of source-only constructs (`CREATE TABLE ... AS`, `DISTRIBUTED ...`)
//!
//! The two-part fold in stage 1 must run before the three-part fold, otherwise
//! `schema.table` after a clause keyword would be read as `table.field`.

use regex::{Captures, NoExpand, Regex};
use std::sync::OnceLock;

/// Column injected into `CREATE TABLE` statements without a declared key
pub const STUB_PRIMARY_KEY_COLUMN: &str = "__stub_primary_key";

/// Separator replacing the dot of a folded `schema.table` reference
const FOLD_SEPARATOR: &str = "___";

fn schema_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)(EXISTS|FROM|INSERT INTO|JOIN|GRANT\s+\w+\s+ON|ROOTPARTITION|TABLE|UPDATE)\s+"?([^\s."]+)"?\."?([^\s."]+)"?"#,
        )
        .expect("valid schema.table regex")
    })
}

fn schema_table_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""?([^\s."]+)"?\."?([^\s."]+)"?\."?([^\s."]+)"?"#)
            .expect("valid schema.table.field regex")
    })
}

fn create_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)\bCREATE\s+(?:(?:GLOBAL|LOCAL)\s+)?(?:(?:TEMP|TEMPORARY|UNLOGGED)\s+)?TABLE\b([^(;]*)\(",
        )
        .expect("valid create table regex")
    })
}

fn as_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bAS\b").expect("valid AS regex"))
}

fn create_as_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)CREATE\s+.*\sTABLE\s+.*\s+AS\s+\(\s*(.*)\s*\)\s")
            .expect("valid create as regex")
    })
}

fn create_table_as_select_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)CREATE\s+(TEMPORARY\s+)?TABLE .* AS\s+SELECT")
            .expect("valid create table as select regex")
    })
}

fn distributed_by_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)DISTRIBUTED BY \(.*\)").expect("valid distributed by regex"))
}

fn distributed_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)DISTRIBUTED \w+").expect("valid distributed regex"))
}

/// Rewrites source-dialect query text for the target engine
pub struct QueryNormalizer;

impl QueryNormalizer {
    /// Run the whole pipeline; surrounding whitespace is trimmed before and after
    pub fn normalize(query: &str) -> String {
        let query = Self::fold_schema_names(query.trim());
        let query = Self::stub_create_table(&query);
        Self::cut_unsupported_constructions(&query).trim().to_string()
    }

    /// Fold `schema.table` after clause keywords into `schema___table`, then
    /// `schema.table.column` anywhere into `schema___table.column`
    ///
    /// Names that already contain the fold separator are left alone so a
    /// second pass over normalized text changes nothing.
    pub fn fold_schema_names(query: &str) -> String {
        let folded = schema_table_re().replace_all(query, |caps: &Captures| {
            if caps[2].contains(FOLD_SEPARATOR) {
                return caps[0].to_string();
            }
            format!("{} {}{}{}", &caps[1], &caps[2], FOLD_SEPARATOR, &caps[3])
        });

        schema_table_field_re()
            .replace_all(&folded, |caps: &Captures| {
                if caps[1].contains(FOLD_SEPARATOR) {
                    return caps[0].to_string();
                }
                format!("{}{}{}.{}", &caps[1], FOLD_SEPARATOR, &caps[2], &caps[3])
            })
            .into_owned()
    }

    /// Add a serial primary key as the first column of the first
    /// `CREATE TABLE name (...)` clause
    ///
    /// `CREATE TABLE ... AS` headers are skipped; stage 3 rewrites those.
    pub fn stub_create_table(query: &str) -> String {
        if query.contains(STUB_PRIMARY_KEY_COLUMN) {
            return query.to_string();
        }

        let Some(caps) = create_table_re().captures(query) else {
            return query.to_string();
        };
        if as_keyword_re().is_match(&caps[1]) {
            return query.to_string();
        }

        let split = caps.get(0).map_or(0, |m| m.end());
        format!(
            "{} {} SERIAL PRIMARY KEY,{}",
            &query[..split],
            STUB_PRIMARY_KEY_COLUMN,
            &query[split..]
        )
    }

    /// Strip source-only clauses with no target equivalent
    pub fn cut_unsupported_constructions(query: &str) -> String {
        let query = create_as_re().replace_all(query, "$1");
        let query = create_table_as_select_re().replace_all(&query, NoExpand("SELECT"));
        let query = distributed_by_re().replace_all(&query, NoExpand(""));
        distributed_word_re()
            .replace_all(&query, NoExpand(""))
            .into_owned()
    }
}
