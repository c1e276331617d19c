//! Modification-time handling for directory entries.
//!
//! The on-disk entry stores `mtime` as a `time_t`-style signed Unix
//! timestamp (seconds), matching `examples/original_source/src/pennfat/fat.h`'s
//! `time_t mtime` field. `chrono` is used only for display/formatting and to
//! read the wall clock.

#[cfg(feature = "chrono")]
use chrono::{Local, TimeZone};

/// Provides the current time used when creating or touching a directory entry.
///
/// Exists as a trait (rather than calling `chrono::Local::now()` directly
/// from `dir.rs`) so tests can supply a fixed clock.
pub trait TimeProvider {
    fn now_unix(&self) -> i64;
}

#[derive(Clone, Copy, Default)]
pub(crate) struct DefaultTimeProvider;

impl TimeProvider for DefaultTimeProvider {
    #[cfg(feature = "chrono")]
    fn now_unix(&self) -> i64 {
        Local::now().timestamp()
    }

    #[cfg(not(feature = "chrono"))]
    fn now_unix(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

pub(crate) static DEFAULT_TIME_PROVIDER: DefaultTimeProvider = DefaultTimeProvider;

/// Renders a stored `mtime` for human display (used by `ls`/`hd` front ends).
#[cfg(feature = "chrono")]
pub fn format_mtime(mtime: i64) -> String {
    match Local.timestamp_opt(mtime, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "????-??-?? ??:??:??".to_string(),
    }
}

#[cfg(not(feature = "chrono"))]
pub fn format_mtime(mtime: i64) -> String {
    mtime.to_string()
}
