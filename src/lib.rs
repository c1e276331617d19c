//! Kernel core (PCBs, cooperative scheduler, fd table) and FAT-style
//! filesystem core (block allocator, directory engine, open-files table)
//! for a user-space operating system simulator.
//!
//! The interactive shell, the standalone FAT REPL, and the `safe_*` host
//! syscall façade are ordinary application code built on top of this crate;
//! they are not part of it (see `SPEC_FULL.md` §1).

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate log;

#[cfg(feature = "chrono")]
extern crate chrono;

mod device;
mod fat;
pub mod dir_entry;
pub mod dir;
pub mod fs;
pub mod openfiles;
pub mod logger;
pub mod time;
pub mod kernel;
pub mod error;

pub use device::{FatMeta, LASTBLOCK, ROOTDIR};
pub use dir::{Dir, EntryLocation};
pub use dir_entry::{valid_filename, DirEntryData, EntryType, Permissions, DIR_ENTRY_SIZE, MAX_NAME_LEN};
pub use error::{Error, ErrorKind, Result};
pub use fs::FileSystem;
pub use kernel::{Kernel, QuantumOutcome, Signal, Status, TaskStep, Whence, EXIT_IDLE, NO_PARENT};
pub use logger::{EventKind, FileLogSink, LogRecord, LogSink, Logger, VecLogSink};
pub use openfiles::{FileId, OpenFileEntry, OpenFilesTable, OpenMode, Pid, ProcessOffset};
