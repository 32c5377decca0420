//! Classification statistics
//!
//! Every checked query lands in exactly one bucket: ok, a known issue (by rule
//! name) or an unknown issue (by reason text). All buckets live behind one
//! read/write lock so counts stay consistent with the total.

use crate::persist::{write_yaml_atomic, PersistError};
use gpcompat_core::Outcome;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Occurrence count of one issue plus the shortest query that hit it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterWithExample {
    pub id: String,
    pub count: u64,
    pub example: String,
}

impl CounterWithExample {
    fn observe(&mut self, query: &str) {
        self.count += 1;
        if query.len() < self.example.len() {
            self.example = query.to_string();
        }
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    total: u64,
    ok: u64,
    known: HashMap<String, CounterWithExample>,
    unknown: HashMap<String, CounterWithExample>,
}

fn bump(buckets: &mut HashMap<String, CounterWithExample>, id: &str, query: &str) {
    buckets
        .entry(id.to_string())
        .or_insert_with(|| CounterWithExample {
            id: id.to_string(),
            count: 0,
            example: query.to_string(),
        })
        .observe(query);
}

fn top(buckets: &HashMap<String, CounterWithExample>, n: usize) -> Vec<CounterWithExample> {
    let mut counters: Vec<CounterWithExample> = buckets.values().cloned().collect();
    counters.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
    counters.truncate(n);
    counters
}

fn percent(ok: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        ok as f64 / total as f64 * 100.0
    }
}

/// Process-lifetime statistics shared by all checker workers
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: RwLock<StatsInner>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_ok(&self) {
        let mut inner = self.inner.write();
        inner.total += 1;
        inner.ok += 1;
    }

    pub fn count_known(&self, rule: &str, query: &str) {
        let mut inner = self.inner.write();
        inner.total += 1;
        bump(&mut inner.known, rule, query);
    }

    pub fn count_unknown(&self, reason: &str, query: &str) {
        let mut inner = self.inner.write();
        inner.total += 1;
        bump(&mut inner.unknown, reason, query);
    }

    /// Count one classified query
    pub fn record(&self, outcome: &Outcome, query: &str) {
        match outcome {
            Outcome::Ok => self.count_ok(),
            Outcome::KnownIssue(rule) => self.count_known(rule, query),
            Outcome::UnknownIssue(reason) => self.count_unknown(reason, query),
        }
    }

    pub fn total(&self) -> u64 {
        self.inner.read().total
    }

    pub fn ok_count(&self) -> u64 {
        self.inner.read().ok
    }

    /// Share of ok queries in percent, 0 before anything was checked
    pub fn ok_percent(&self) -> f64 {
        let inner = self.inner.read();
        percent(inner.ok, inner.total)
    }

    /// Most frequent known issues, ties ordered by rule name
    pub fn top_known(&self, n: usize) -> Vec<CounterWithExample> {
        top(&self.inner.read().known, n)
    }

    /// Most frequent unknown issues, ties ordered by reason
    pub fn top_unknown(&self, n: usize) -> Vec<CounterWithExample> {
        top(&self.inner.read().unknown, n)
    }

    /// Consistent copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.read();
        StatsSnapshot {
            total_count: inner.total,
            ok_count: inner.ok,
            ok_percent: percent(inner.ok, inner.total),
            known_issues: top(&inner.known, usize::MAX),
            unknown_issues: top(&inner.unknown, usize::MAX),
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), PersistError> {
        self.snapshot().save_to_file(path)
    }
}

/// Stats file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_count: u64,
    pub ok_count: u64,
    pub ok_percent: f64,
    pub known_issues: Vec<CounterWithExample>,
    pub unknown_issues: Vec<CounterWithExample>,
}

impl StatsSnapshot {
    pub fn known(&self, rule: &str) -> Option<&CounterWithExample> {
        self.known_issues.iter().find(|c| c.id == rule)
    }

    /// Write with examples made safe for YAML
    pub fn save_to_file(&self, path: &Path) -> Result<(), PersistError> {
        let mut file = self.clone();
        for counter in file.known_issues.iter_mut().chain(file.unknown_issues.iter_mut()) {
            counter.example = sanitize_example(&counter.example);
        }
        write_yaml_atomic(path, &file, "stats")
    }
}

/// Trim trailing blanks per line and replace characters YAML cannot print with `X`
pub fn sanitize_example(text: &str) -> String {
    text.split('\n')
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\n")
        .chars()
        .map(|c| if is_yaml_printable(c) { c } else { 'X' })
        .collect()
}

fn is_yaml_printable(c: char) -> bool {
    matches!(c,
        '\n'
        | '\u{20}'..='\u{7E}'
        | '\u{A0}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}')
        && c != '\u{FEFF}'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_and_percent() {
        let stats = StatsAggregator::new();
        assert_eq!(stats.ok_percent(), 0.0);

        stats.record(&Outcome::Ok, "SELECT 1");
        stats.record(&Outcome::KnownIssue("rule".into()), "SELECT 2");
        stats.record(&Outcome::UnknownIssue("why".into()), "SELECT 3");
        stats.record(&Outcome::Ok, "SELECT 4");

        assert_eq!(stats.total(), 4);
        assert_eq!(stats.ok_count(), 2);
        assert_eq!(stats.ok_percent(), 50.0);
    }

    #[test]
    fn keeps_shortest_example() {
        let stats = StatsAggregator::new();
        stats.count_known("r", "SELECT long_name");
        stats.count_known("r", "SELECT a");
        stats.count_known("r", "SELECT b");
        stats.count_known("r", "SELECT much_longer");

        let top = stats.top_known(5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].count, 4);
        assert_eq!(top[0].example, "SELECT a");
    }

    #[test]
    fn top_orders_by_count_then_id() {
        let stats = StatsAggregator::new();
        for (reason, times) in [("b", 2), ("a", 2), ("c", 5), ("d", 1)] {
            for _ in 0..times {
                stats.count_unknown(reason, "q");
            }
        }

        let ids: Vec<String> = stats.top_unknown(3).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(stats.top_unknown(100).len(), 4);
    }

    #[test]
    fn sanitize_replaces_unprintable() {
        assert_eq!(sanitize_example("SELECT 1  \nFROM t\t\n"), "SELECT 1\nFROM t\n");
        assert_eq!(sanitize_example("a\u{0}b\rc"), "aXbXc");
        assert_eq!(sanitize_example("\u{FEFF}x\u{1F600}"), "XxX");
        assert_eq!(sanitize_example("имя"), "имя");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn totals_stay_consistent_under_concurrency() {
        let stats = Arc::new(StatsAggregator::new());

        let mut handles = Vec::new();
        for worker in 0..8 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    let outcome = match (worker + i) % 3 {
                        0 => Outcome::Ok,
                        1 => Outcome::KnownIssue(format!("rule{}", i % 4)),
                        _ => Outcome::UnknownIssue(format!("reason{}", i % 7)),
                    };
                    stats.record(&outcome, "SELECT 1");
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = stats.snapshot();
        let known: u64 = snapshot.known_issues.iter().map(|c| c.count).sum();
        let unknown: u64 = snapshot.unknown_issues.iter().map(|c| c.count).sum();
        assert_eq!(snapshot.total_count, 2000);
        assert_eq!(snapshot.ok_count + known + unknown, snapshot.total_count);
    }

    #[test]
    fn stats_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.yaml");

        let stats = StatsAggregator::new();
        stats.count_ok();
        stats.count_unknown("syntax", "SELECT x   ");
        stats.save_to_file(&path).unwrap();

        let written: StatsSnapshot = serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.total_count, 2);
        assert_eq!(written.ok_percent, 50.0);
        assert!(written.known_issues.is_empty());
        assert_eq!(written.unknown_issues[0].example, "SELECT x");
    }
}
