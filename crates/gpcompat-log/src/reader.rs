//! Record-at-a-time decoding of query logs

use crate::record::LogRecord;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Errors produced while decoding a query log
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    #[error("IO error after line {line}: {message}")]
    Io { line: usize, message: String },

    /// A complete line that is not a valid record; the reader moves past it
    #[error("Malformed record on line {line}: {message}")]
    Malformed { line: usize, message: String },

    /// The stream ends in the middle of a record
    #[error("Log truncated at line {line}")]
    Truncated { line: usize },
}

impl LogError {
    /// Whether decoding can go on after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Open a query log, decompressing when the name ends with `.gz`
pub fn open_log(path: &Path) -> Result<LogReader<Box<dyn BufRead + Send>>, LogError> {
    let file = File::open(path).map_err(|e| LogError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let reader: Box<dyn BufRead + Send> = if name.ends_with(".gz") {
        Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, GzDecoder::new(reader)))
    } else {
        Box::new(reader)
    };

    Ok(LogReader::new(reader))
}

/// Iterator over the records of a newline-delimited JSON log
///
/// End of stream yields `None`. A truncated tail or an IO failure yields one
/// error and then `None`; a malformed line yields an error and decoding
/// continues with the next line.
pub struct LogReader<R> {
    reader: R,
    buf: Vec<u8>,
    line: usize,
    finished: bool,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line: 0,
            finished: false,
        }
    }

    /// Number of lines consumed so far
    pub fn line(&self) -> usize {
        self.line
    }

    fn fail(&mut self, err: LogError) -> Option<Result<LogRecord, LogError>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<LogRecord, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            self.buf.clear();
            let read = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    let line = self.line + 1;
                    return self.fail(LogError::Truncated { line });
                }
                Err(e) => {
                    let line = self.line;
                    return self.fail(LogError::Io { line, message: e.to_string() });
                }
            };

            if read == 0 {
                self.finished = true;
                return None;
            }

            self.line += 1;
            let complete = self.buf.ends_with(b"\n");
            let content = trim_ascii(&self.buf);
            if content.is_empty() {
                continue;
            }

            // Legacy logs may carry non-UTF-8 bytes; they become U+FFFD
            let parsed = serde_json::from_str::<LogRecord>(&String::from_utf8_lossy(content));
            return match parsed {
                Ok(record) => Some(Ok(record)),
                Err(e) if !complete && e.is_eof() => {
                    let line = self.line;
                    self.fail(LogError::Truncated { line })
                }
                Err(e) => Some(Err(LogError::Malformed {
                    line: self.line,
                    message: e.to_string(),
                })),
            };
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
