// Tue Jan 13 2026 - Alex

use colored::*;
use log::{Level, LevelFilter};
use std::io::Write;
use std::time::Instant;

pub struct LoggingUtils;

impl LoggingUtils {
    /// Installs the process logger. Stage threads are named after their
    /// stage, so the thread name is printed as the record origin.
    pub fn init_logger(level: LevelFilter, use_color: bool) {
        let result = env_logger::Builder::new()
            .filter_level(level)
            .format_timestamp(None)
            .format(move |buf, record| {
                let level = if use_color {
                    Self::format_level(record.level()).to_string()
                } else {
                    format!("{:5}", record.level())
                };
                let origin = std::thread::current()
                    .name()
                    .map(|name| format!("[{}]", name))
                    .unwrap_or_default();
                writeln!(buf, "{} {} {}", level, origin, record.args())
            })
            .try_init();

        if let Err(e) = result {
            log::debug!("logger already initialized: {}", e);
        }
    }

    pub fn level_from_str(s: &str) -> LevelFilter {
        match s.to_lowercase().as_str() {
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            "off" => LevelFilter::Off,
            _ => LevelFilter::Info,
        }
    }

    fn format_level(level: Level) -> ColoredString {
        match level {
            Level::Error => "ERROR".red().bold(),
            Level::Warn => "WARN ".yellow().bold(),
            Level::Info => "INFO ".green().bold(),
            Level::Debug => "DEBUG".blue().bold(),
            Level::Trace => "TRACE".magenta().bold(),
        }
    }
}

pub struct ScopedTimer {
    name: String,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(name: &str) -> Self {
        log::debug!("[TIMER] {} started", name);
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::debug!("[TIMER] {} took {}", self.name, super::format_duration(self.start.elapsed()));
    }
}

/// Logs progress of a stage at every tenth percent of a known total.
pub struct ProgressLogger {
    name: String,
    total: usize,
    current: usize,
    last_percent: usize,
}

impl ProgressLogger {
    pub fn new(name: &str, total: usize) -> Self {
        log::info!("[{}] Starting (0/{})", name, total);
        Self {
            name: name.to_string(),
            total,
            current: 0,
            last_percent: 0,
        }
    }

    pub fn inc(&mut self) {
        self.current += 1;
        self.maybe_log();
    }

    pub fn current(&self) -> usize {
        self.current
    }

    fn maybe_log(&mut self) {
        if self.total == 0 {
            return;
        }

        let percent = (self.current * 100) / self.total;
        if percent > self.last_percent && percent % 10 == 0 {
            log::info!("[{}] Progress: {}% ({}/{})", self.name, percent, self.current, self.total);
            self.last_percent = percent;
        }
    }
}
