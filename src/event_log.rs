use crate::error::Result;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One line of the event log
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub elapsed_seconds: f64,
    pub message: String,
}

impl LogRecord {
    /// Render as `[YYYY-MM-DD HH:MM:SS] (Elapsed: S.SSs) message`
    pub fn format_line(&self) -> String {
        format!(
            "[{}] (Elapsed: {:.2}s) {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.elapsed_seconds,
            self.message
        )
    }

    /// Parse a line produced by [`LogRecord::format_line`]
    pub fn parse_line(line: &str) -> Option<Self> {
        let rest = line.strip_prefix('[')?;
        let (timestamp, rest) = rest.split_once("] (Elapsed: ")?;
        let (elapsed, message) = rest.split_once("s) ")?;

        Some(Self {
            timestamp: NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?,
            elapsed_seconds: elapsed.parse().ok()?,
            message: message.to_string(),
        })
    }
}

/// Resolve the configured timezone, falling back to UTC on parse errors
pub fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid event log timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

struct LogWriter {
    sink: Box<dyn Write + Send>,
    records_written: u64,
}

/// Process-wide append-only event log.
///
/// Every record carries the wall-clock time and the seconds elapsed since
/// the log was created, and is flushed before `record` returns. Writers are
/// serialized so the file order is the total order of events.
pub struct EventLog {
    writer: Mutex<LogWriter>,
    started: Instant,
    timezone: Option<Tz>,
    path: Option<PathBuf>,
}

impl EventLog {
    /// Open (or create) the log file in append mode, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P, timezone: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Event log opened at {}", path.display());

        let mut log = Self::from_writer(Box::new(file), timezone);
        log.path = Some(path.to_path_buf());
        Ok(log)
    }

    /// Log into an arbitrary writer
    pub fn from_writer(sink: Box<dyn Write + Send>, timezone: Option<&str>) -> Self {
        Self {
            writer: Mutex::new(LogWriter {
                sink,
                records_written: 0,
            }),
            started: Instant::now(),
            timezone: timezone.map(resolve_timezone),
            path: None,
        }
    }

    /// Append one record and flush it
    pub fn record<S: Into<String>>(&self, message: S) -> Result<LogRecord> {
        let mut writer = self.writer.lock();

        // Elapsed time is taken under the lock so it never decreases in file order
        let record = LogRecord {
            timestamp: self.now(),
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
            message: single_line(message.into()),
        };

        writeln!(writer.sink, "{}", record.format_line())?;
        writer.sink.flush()?;
        writer.records_written += 1;

        info!(target: "streamguard::event", "{}", record.message);
        Ok(record)
    }

    pub fn records_written(&self) -> u64 {
        self.writer.lock().records_written
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn now(&self) -> NaiveDateTime {
        match self.timezone {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => {
                let local: DateTime<Local> = Local::now();
                local.naive_local()
            }
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        let writer = self.writer.get_mut();
        if let Err(e) = writer.sink.flush() {
            warn!("Failed to flush event log on close: {}", e);
        } else {
            debug!("Event log closed after {} records", writer.records_written);
        }
    }
}

/// One record is one line: line breaks inside a message become spaces
fn single_line(message: String) -> String {
    if message.contains(['\r', '\n']) {
        message.replace(['\r', '\n'], " ")
    } else {
        message
    }
}

/// Read back and parse every record of a log file
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<LogRecord>> {
    let content = fs::read_to_string(path)?;
    Ok(content.lines().filter_map(LogRecord::parse_line).collect())
}
