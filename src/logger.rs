//! Structured tick-stamped event stream consumed by the scheduler and
//! lifecycle operations.
//!
//! Grounded on `examples/original_source/src/logger/logger.c`, which
//! `fprintf`s one tab-delimited line per event straight to a process-global
//! `FILE*`. Here the sink is a trait (`LogSink`) so tests can assert against
//! an in-memory `VecLogSink` instead of a scratch file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;
use crate::openfiles::Pid;

/// The kind of a logged event, matching the original's `log_*_event`
/// functions one-for-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Schedule,
    Create,
    Signaled,
    Exited,
    Zombie,
    Orphan,
    Waited,
    Blocked,
    Unblocked,
    Stopped,
    Continued,
    /// Priority change; carries both the old and new priority.
    Changed,
}

impl EventKind {
    fn as_str(&self) -> &'static str {
        match self {
            EventKind::Schedule => "SCHEDULE",
            EventKind::Create => "CREATE",
            EventKind::Signaled => "SIGNALED",
            EventKind::Exited => "EXITED",
            EventKind::Zombie => "ZOMBIE",
            EventKind::Orphan => "ORPHAN",
            EventKind::Waited => "WAITED",
            EventKind::Blocked => "BLOCKED",
            EventKind::Unblocked => "UNBLOCKED",
            EventKind::Stopped => "STOPPED",
            EventKind::Continued => "CONTINUED",
            EventKind::Changed => "CHANGED",
        }
    }
}

/// One logged record: `[TICK] KIND PID PRIORITY NAME`, with `Changed`
/// additionally carrying the old priority.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub tick: u64,
    pub kind: EventKind,
    pub pid: Pid,
    pub priority: i8,
    pub old_priority: Option<i8>,
    pub name: String,
}

impl std::fmt::Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            EventKind::Changed => write!(
                f,
                "[{}]\t{}\t{}\t{}\t{}\t{}",
                self.tick,
                self.kind.as_str(),
                self.pid,
                self.old_priority.unwrap_or(self.priority),
                self.priority,
                self.name
            ),
            _ => write!(f, "[{}]\t{}\t{}\t{}\t{}", self.tick, self.kind.as_str(), self.pid, self.priority, self.name),
        }
    }
}

/// A destination for log records.
pub trait LogSink: Send {
    fn emit(&mut self, record: &LogRecord);
}

/// Appends one line per record to a host file, mirroring the original's
/// `FILE* logfile`.
pub struct FileLogSink {
    file: File,
}

impl FileLogSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileLogSink { file })
    }
}

impl LogSink for FileLogSink {
    fn emit(&mut self, record: &LogRecord) {
        if let Err(e) = writeln!(self.file, "{}", record) {
            log::error!("failed to write log record: {}", e);
        }
    }
}

/// An in-memory sink used by tests and by front ends that want to inspect
/// the event stream without touching the host filesystem.
#[derive(Default)]
pub struct VecLogSink {
    pub records: Vec<LogRecord>,
}

impl LogSink for VecLogSink {
    fn emit(&mut self, record: &LogRecord) {
        self.records.push(record.clone());
    }
}

/// The logger: owns a sink and the helpers that build + emit each event
/// kind, one per original `log_*_event` function.
pub struct Logger {
    sink: Mutex<Box<dyn LogSink>>,
}

impl Logger {
    pub fn new(sink: Box<dyn LogSink>) -> Self {
        Logger { sink: Mutex::new(sink) }
    }

    fn emit(&self, tick: u64, kind: EventKind, pid: Pid, priority: i8, old_priority: Option<i8>, name: &str) {
        let record = LogRecord { tick, kind, pid, priority, old_priority, name: name.to_string() };
        self.sink.lock().unwrap().emit(&record);
    }

    pub fn schedule(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Schedule, pid, priority, None, name);
    }
    pub fn create(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Create, pid, priority, None, name);
    }
    pub fn signaled(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Signaled, pid, priority, None, name);
    }
    pub fn exited(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Exited, pid, priority, None, name);
    }
    pub fn zombie(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Zombie, pid, priority, None, name);
    }
    pub fn orphan(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Orphan, pid, priority, None, name);
    }
    pub fn waited(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Waited, pid, priority, None, name);
    }
    pub fn blocked(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Blocked, pid, priority, None, name);
    }
    pub fn unblocked(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Unblocked, pid, priority, None, name);
    }
    pub fn stopped(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Stopped, pid, priority, None, name);
    }
    pub fn continued(&self, tick: u64, pid: Pid, priority: i8, name: &str) {
        self.emit(tick, EventKind::Continued, pid, priority, None, name);
    }
    pub fn changed(&self, tick: u64, pid: Pid, old_priority: i8, new_priority: i8, name: &str) {
        self.emit(tick, EventKind::Changed, pid, new_priority, Some(old_priority), name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_tab_delimited_shape() {
        let record = LogRecord {
            tick: 5,
            kind: EventKind::Create,
            pid: 3,
            priority: 0,
            old_priority: None,
            name: "sh".to_string(),
        };
        assert_eq!(record.to_string(), "[5]\tCREATE\t3\t0\tsh");
    }

    #[test]
    fn changed_carries_both_priorities() {
        let record = LogRecord {
            tick: 1,
            kind: EventKind::Changed,
            pid: 4,
            priority: 1,
            old_priority: Some(0),
            name: "job".to_string(),
        };
        assert_eq!(record.to_string(), "[1]\tCHANGED\t4\t0\t1\tjob");
    }
}
