//! In-place progress lines on stderr
//!
//! A progress line is only overwritten when nothing else reached stderr
//! since it was printed. Other stderr writers report themselves through
//! [`note_stderr_write`] so their output is never erased.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cursor up one line, then clear it
const ERASE_PREVIOUS_LINE: &str = "\x1b[1A\x1b[K";

/// Writes to stderr so far, progress lines included
static STDERR_WRITES: AtomicU64 = AtomicU64::new(0);

/// Record a write to stderr made outside of [`Progress`]
pub fn note_stderr_write() {
    STDERR_WRITES.fetch_add(1, Ordering::SeqCst);
}

/// Prints a progress line every `every` items, overwriting the previous one
pub struct Progress {
    label: &'static str,
    every: usize,

    /// Write count right after our last line
    last_line: Option<u64>,
}

impl Progress {
    pub fn new(label: &'static str, every: usize) -> Self {
        Self {
            label,
            every,
            last_line: None,
        }
    }

    pub fn tick(&mut self, done: usize, total: usize) {
        if self.every == 0 || done % self.every != 0 {
            return;
        }

        eprint!("{}", self.render(done, total, STDERR_WRITES.load(Ordering::SeqCst)));
        self.last_line = Some(STDERR_WRITES.fetch_add(1, Ordering::SeqCst) + 1);
    }

    /// `writes` is the stderr write count before this line
    fn render(&self, done: usize, total: usize, writes: u64) -> String {
        let erase = if self.last_line == Some(writes) {
            ERASE_PREVIOUS_LINE
        } else {
            ""
        };
        format!("{}{}\n", erase, format_line(self.label, done, total))
    }
}

/// `total` of 0 means the total is unknown
fn format_line(label: &str, done: usize, total: usize) -> String {
    let percent = if total > 0 {
        done as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    format!("{} {:8}/{} ({:.2}%)", label, done, total, percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_with_total() {
        assert_eq!(format_line("Checking query", 50, 200), "Checking query       50/200 (25.00%)");
    }

    #[test]
    fn line_without_total() {
        assert_eq!(format_line("Read items", 100, 0), "Read items      100/0 (0.00%)");
    }

    #[test]
    fn overwrites_only_its_own_line() {
        let mut progress = Progress::new("Read items", 10);
        assert_eq!(progress.render(10, 0, 7), "Read items       10/0 (0.00%)\n");

        progress.last_line = Some(8);
        assert_eq!(progress.render(20, 0, 8), "\x1b[1A\x1b[KRead items       20/0 (0.00%)\n");

        // A log line went out in between
        assert_eq!(progress.render(20, 0, 9), "Read items       20/0 (0.00%)\n");
    }

    #[test]
    fn other_writes_are_counted() {
        let before = STDERR_WRITES.load(Ordering::SeqCst);
        note_stderr_write();
        assert!(STDERR_WRITES.load(Ordering::SeqCst) > before);
    }
}
