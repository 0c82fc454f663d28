/// Logging facilities to record scheduler decisions.
use std::fs::File;

use log::Level;
use serde::Serialize;

use crate::core::common::Time;

pub trait Logger {
    fn log_error(&mut self, time: Time, scope: &str, log: String);

    fn log_warn(&mut self, time: Time, scope: &str, log: String);

    fn log_info(&mut self, time: Time, scope: &str, log: String);

    fn log_debug(&mut self, time: Time, scope: &str, log: String);

    fn log_trace(&mut self, time: Time, scope: &str, log: String);

    fn save_log(&self, _path: &str) -> Result<(), std::io::Error>;
}

/// Forwards all records to the `log` facade, so the hosting process controls
/// filtering and output.
#[derive(Default)]
pub struct StdoutLogger {}

impl Logger for StdoutLogger {
    fn log_error(&mut self, time: Time, scope: &str, log: String) {
        log::error!(target: scope, "[{} ERROR {}] {}", time, scope, log);
    }

    fn log_warn(&mut self, time: Time, scope: &str, log: String) {
        log::warn!(target: scope, "[{} WARN  {}] {}", time, scope, log);
    }

    fn log_info(&mut self, time: Time, scope: &str, log: String) {
        log::info!(target: scope, "[{} INFO  {}] {}", time, scope, log);
    }

    fn log_debug(&mut self, time: Time, scope: &str, log: String) {
        log::debug!(target: scope, "[{} DEBUG {}] {}", time, scope, log);
    }

    fn log_trace(&mut self, time: Time, scope: &str, log: String) {
        log::trace!(target: scope, "[{} TRACE {}] {}", time, scope, log);
    }

    fn save_log(&self, _path: &str) -> Result<(), std::io::Error> {
        Ok(())
    }
}

impl StdoutLogger {
    pub fn new() -> Self {
        Self {}
    }
}

#[derive(Serialize)]
struct LogEntry {
    time: Time,
    scope: String,
    message: String,
}

/// Buffers records in memory and serializes them to CSV on `save_log`.
pub struct FileLogger {
    log: Vec<LogEntry>,
    level: Level,
}

impl Default for FileLogger {
    fn default() -> Self {
        Self {
            log: Vec::new(),
            level: Level::Info,
        }
    }
}

impl FileLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: Level) -> Self {
        Self { log: Vec::new(), level }
    }

    fn log_internal(&mut self, time: Time, scope: &str, message: String, level: Level) {
        if self.level < level {
            return;
        }
        self.log.push(LogEntry {
            time,
            scope: scope.to_string(),
            message,
        });
    }
}

impl Logger for FileLogger {
    fn log_error(&mut self, time: Time, scope: &str, log: String) {
        self.log_internal(time, scope, log, Level::Error)
    }

    fn log_warn(&mut self, time: Time, scope: &str, log: String) {
        self.log_internal(time, scope, log, Level::Warn)
    }

    fn log_info(&mut self, time: Time, scope: &str, log: String) {
        self.log_internal(time, scope, log, Level::Info)
    }

    fn log_debug(&mut self, time: Time, scope: &str, log: String) {
        self.log_internal(time, scope, log, Level::Debug)
    }

    fn log_trace(&mut self, time: Time, scope: &str, log: String) {
        self.log_internal(time, scope, log, Level::Trace)
    }

    fn save_log(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for entry in &self.log {
            wtr.serialize(entry)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
