//! End-of-run terminal report

use crate::stats::{CounterWithExample, StatsAggregator};
use colored::Colorize;
use gpcompat_core::OutputConfig;
use std::fmt::Write;

/// What the summary lists
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// List known issues instead of unknown ones
    pub known_issues: bool,

    pub query_for_known_issues: bool,

    pub top: usize,
}

impl From<&OutputConfig> for ReportOptions {
    fn from(output: &OutputConfig) -> Self {
        Self {
            known_issues: output.print_known_issues,
            query_for_known_issues: output.print_query_for_known_issues,
            top: output.top_issues,
        }
    }
}

/// Render the summary
pub fn render_report(stats: &StatsAggregator, options: &ReportOptions) -> String {
    let snapshot = stats.snapshot();
    let mut out = String::new();

    let _ = writeln!(out, "\n{}", "Queries stat".cyan().bold());
    let _ = writeln!(out, "  Total:            {}", snapshot.total_count);
    let _ = writeln!(out, "  Ok:               {} ({:.2}%)", snapshot.ok_count, snapshot.ok_percent);
    let _ = writeln!(out, "  Known issues:     {}", snapshot.known_issues.len());
    let _ = writeln!(out, "  Unknown issues:   {}", snapshot.unknown_issues.len());

    if options.known_issues {
        let _ = writeln!(out, "\n{}", "Top known issues:".bold());
        render_counters(&mut out, &stats.top_known(options.top), options.query_for_known_issues);
    } else {
        let _ = writeln!(out, "\n{}", "Top unknown issues:".bold());
        render_counters(&mut out, &stats.top_unknown(options.top), true);
    }

    out
}

fn render_counters(out: &mut String, counters: &[CounterWithExample], with_query: bool) {
    if counters.is_empty() {
        let _ = writeln!(out, "  {}", "none".green());
        return;
    }

    for counter in counters {
        let _ = writeln!(out, "\n  {} {}", "Problem:".yellow(), counter.id);
        let _ = writeln!(out, "  {} {}", "Count:".yellow(), counter.count);
        if with_query {
            let _ = writeln!(out, "  {} {}", "Example:".yellow(), counter.example);
        }
    }
}

pub fn print_report(stats: &StatsAggregator, options: &ReportOptions) {
    println!("{}", render_report(stats, options));
}
