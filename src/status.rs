//! Operator-facing status lines emitted while resolving a correction plan
//!
//! These are diagnostics only: nothing downstream reads them back.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

pub trait StatusLog {
    /// Store one line in the sink
    fn write_line(&mut self, line: &str);

    /// Record `line` in this sink and forward it to the `log` facade
    fn note(&mut self, line: &str) {
        log::info!("{line}");
        self.write_line(line);
    }
}

/// Keeps every line, in order
impl StatusLog for Vec<String> {
    fn write_line(&mut self, line: &str) { self.push(line.to_string()) }
}

/// Lines go to the `log` facade only
pub struct LogOnly;

impl StatusLog for LogOnly {
    fn write_line(&mut self, _line: &str) {}
}

/// Append-only text file, one tab-indented line per status
pub struct LogFile(File);

impl LogFile {
    pub fn append(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self(file))
    }
}

impl StatusLog for LogFile {
    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.0, "\t{line}") {
            log::warn!("Could not append to status log: {e}");
        }
    }
}
