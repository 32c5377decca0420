//! Known-issue rules
//!
//! A rule file is an ordered YAML list. Each rule matches a failure when any
//! of its query patterns matches the checked text or any of its issue
//! patterns matches one of the engine's structured issues. Order matters:
//! the first actionable match names the failure.
//!
//! ```yaml
//! - name: distributed_by_clause
//!   query_regexp:
//!   - (?i)\bDISTRIBUTED\s+BY\b
//!   count: 12
//!   example: CREATE TABLE t (a int) DISTRIBUTED BY (a)
//! - name: noisy_hint
//!   issues:
//!   - message: '^HINT: '
//!   skip: true
//! ```

use crate::persist::{write_atomic, PersistError};
use crate::stats::{sanitize_example, StatsSnapshot};
use gpcompat_core::{ExecutionError, Issue, Outcome};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Rule file errors
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("Failed to read rules file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse rules: {0}")]
    Parse(String),

    #[error("Rule {rule:?} has an invalid pattern {pattern:?}: {message}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        message: String,
    },

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Pattern over one structured issue; every field given must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuePattern {
    /// Exact issue code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Regex over the issue message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One persisted rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(default)]
    pub name: String,

    /// Regexes over the normalized query text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_regexp: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<IssuePattern>,

    /// Matches, but never names the failure
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip: bool,

    #[serde(default)]
    pub count: u64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub example: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug)]
struct CompiledIssuePattern {
    code: Option<String>,
    message: Option<Regex>,
}

impl CompiledIssuePattern {
    fn matches(&self, issue: &Issue) -> bool {
        if self.code.is_none() && self.message.is_none() {
            return false;
        }
        self.code.as_ref().map_or(true, |code| *code == issue.code)
            && self.message.as_ref().map_or(true, |re| re.is_match(&issue.message))
    }
}

#[derive(Debug)]
struct CompiledRule {
    record: RuleRecord,
    query: Vec<Regex>,
    issues: Vec<CompiledIssuePattern>,
}

fn compile(rule: &str, pattern: &str) -> Result<Regex, RulesError> {
    Regex::new(pattern).map_err(|e| RulesError::InvalidPattern {
        rule: rule.to_string(),
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

impl CompiledRule {
    fn new(record: RuleRecord) -> Result<Self, RulesError> {
        let query = record
            .query_regexp
            .iter()
            .map(|p| compile(&record.name, p))
            .collect::<Result<Vec<_>, _>>()?;

        let issues = record
            .issues
            .iter()
            .map(|p| {
                Ok(CompiledIssuePattern {
                    code: p.code.clone(),
                    message: p.message.as_deref().map(|m| compile(&record.name, m)).transpose()?,
                })
            })
            .collect::<Result<Vec<_>, RulesError>>()?;

        Ok(Self { record, query, issues })
    }

    fn matches_issue(&self, issue: &Issue) -> bool {
        self.issues.iter().any(|p| p.matches(issue))
    }

    fn matches(&self, query: &str, issues: &[Issue]) -> bool {
        self.query.iter().any(|re| re.is_match(query))
            || issues.iter().any(|issue| self.matches_issue(issue))
    }
}

/// A rule that matched a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub name: String,
    pub skip: bool,
}

impl RuleMatch {
    /// Non-skip rule with a name
    pub fn is_actionable(&self) -> bool {
        !self.name.is_empty() && !self.skip
    }
}

/// Loaded rules
///
/// Matching always walks the rules in load order. Sorting by count only
/// changes the order they are written back in.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: RwLock<Vec<CompiledRule>>,
    sort_on_save: AtomicBool,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<RuleRecord>) -> Result<Self, RulesError> {
        let rules = records
            .into_iter()
            .map(CompiledRule::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules: RwLock::new(rules),
            sort_on_save: AtomicBool::new(false),
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, RulesError> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        let records: Vec<RuleRecord> = serde_yaml::from_str(yaml).map_err(|e| RulesError::Parse(e.to_string()))?;
        Self::from_records(records)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, RulesError> {
        let contents = std::fs::read_to_string(path).map_err(|e| RulesError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&contents)
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Rules in load order
    pub fn records(&self) -> Vec<RuleRecord> {
        self.rules.read().iter().map(|r| r.record.clone()).collect()
    }

    /// Rules in the order they are written back
    pub fn persisted_records(&self) -> Vec<RuleRecord> {
        let mut records = self.records();
        if self.sort_on_save.load(Ordering::Relaxed) {
            records.sort_by(|a, b| b.count.cmp(&a.count));
        }
        records
    }

    /// All rules matching a failure, plus the issues no rule explains
    pub fn match_failure(&self, query: &str, issues: &[Issue]) -> (Vec<RuleMatch>, Vec<Issue>) {
        let rules = self.rules.read();

        let matches = rules
            .iter()
            .filter(|rule| rule.matches(query, issues))
            .map(|rule| RuleMatch {
                name: rule.record.name.clone(),
                skip: rule.record.skip,
            })
            .collect();

        let unmatched = issues
            .iter()
            .filter(|issue| !rules.iter().any(|rule| rule.matches_issue(issue)))
            .cloned()
            .collect();

        (matches, unmatched)
    }

    /// Classify a failed query; the first actionable rule in file order wins
    pub fn classify(&self, query: &str, error: &ExecutionError) -> Outcome {
        let (matches, unmatched) = self.match_failure(query, error.issues());
        match matches.into_iter().find(RuleMatch::is_actionable) {
            Some(rule) => Outcome::KnownIssue(rule.name),
            None => Outcome::UnknownIssue(error.unknown_reason(&unmatched)),
        }
    }

    /// Replace rule counts and examples with what this run observed
    ///
    /// Rules the run never hit get a zero count and keep their example.
    /// With `sort_by_count` the saved file lists rules by descending count;
    /// the sort is stable, so equal counts keep their file order.
    pub fn update_from_stats(&self, stats: &StatsSnapshot, sort_by_count: bool) {
        let observed: HashMap<&str, _> = stats
            .known_issues
            .iter()
            .map(|c| (c.id.as_str(), c))
            .collect();

        let mut rules = self.rules.write();
        for rule in rules.iter_mut() {
            match observed.get(rule.record.name.as_str()) {
                Some(counter) if !rule.record.name.is_empty() => {
                    rule.record.count = counter.count;
                    rule.record.example = sanitize_example(&counter.example);
                }
                _ => rule.record.count = 0,
            }
        }

        self.sort_on_save.store(sort_by_count, Ordering::Relaxed);
    }

    pub fn to_yaml(&self) -> Result<String, RulesError> {
        serde_yaml::to_string(&self.persisted_records()).map_err(|e| RulesError::Parse(e.to_string()))
    }

    /// Rewrite the whole rule file
    pub fn write_to_file(&self, path: &Path) -> Result<(), RulesError> {
        let yaml = self.to_yaml()?;
        write_atomic(path, yaml.as_bytes())?;
        Ok(())
    }
}
