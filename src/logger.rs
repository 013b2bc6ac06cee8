//! Session event log

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::fmt::{self, Write as _};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Session event sink. Every hook defaults to a no-op.
pub trait Logger: Send + Sync {
    fn connect(&self, _locator: &str, _user: Option<&str>) {}
    fn round_trip(&self, _verb: &str, _locator: &str) {}
    fn transfer_done(&self, _verb: &str, _locator: &str, _local: &Path, _bytes: u64) {}
    /// A listing line did not match the expected layout and was kept verbatim.
    fn parse_anomaly(&self, _line: &str) {}
    fn error(&self, _context: &str, _locator: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Appends one `[timestamp] EVENT key=value ...` line per event.
pub struct TextLogger {
    sink: Mutex<File>,
}

impl TextLogger {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
        }
        let sink = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open session log {}", path.display()))?;
        Ok(Self {
            sink: Mutex::new(sink),
        })
    }

    fn event(&self, body: fmt::Arguments<'_>) {
        let mut line = format!("[{}] ", Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        let _ = line.write_fmt(body);
        line.push('\n');
        // Logging never fails a verb.
        let _ = self.sink.lock().write_all(line.as_bytes());
    }
}

impl Logger for TextLogger {
    fn connect(&self, locator: &str, user: Option<&str>) {
        let user = user.unwrap_or("anonymous");
        self.event(format_args!("CONNECT url={} user={}", locator, user));
    }

    fn round_trip(&self, verb: &str, locator: &str) {
        self.event(format_args!("{} url={}", verb, locator));
    }

    fn transfer_done(&self, verb: &str, locator: &str, local: &Path, bytes: u64) {
        self.event(format_args!(
            "DONE verb={} url={} local={} bytes={}",
            verb,
            locator,
            local.display(),
            bytes
        ));
    }

    fn parse_anomaly(&self, line: &str) {
        self.event(format_args!("UNPARSED line={:?}", line));
    }

    fn error(&self, context: &str, locator: &str, msg: &str) {
        self.event(format_args!("ERROR ctx={} url={} msg={}", context, locator, msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_logger_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/session.log");
        let logger = TextLogger::open(&path).unwrap();
        logger.connect("ftp://h/", Some("demo"));
        logger.error("get", "ftp://h/x", "550 not found");
        logger.parse_anomaly("total 8");
        drop(logger);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("CONNECT url=ftp://h/ user=demo"));
        assert!(lines[1].contains("ERROR ctx=get url=ftp://h/x msg=550 not found"));
        assert!(lines[2].ends_with("UNPARSED line=\"total 8\""));
    }
}
