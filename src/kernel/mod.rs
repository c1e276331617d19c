//! The kernel core: PCBs, the cooperative scheduler, process lifecycle, and
//! the per-process file-descriptor table.
//!
//! Grounded on `examples/original_source/src/kernel/` as a whole; module
//! split mirrors the original's `PCB.c` / `scheduler.c` /
//! `puser-functions.c` / `kernel-functions.c` one-for-one, plus `fd.rs` for
//! the fd-table operations the original spreads across
//! `src/filesystem/filesystem.c`'s `f_*` functions.

#[allow(clippy::module_inception)]
pub mod kernel;
pub mod pcb;
pub mod fd;
pub mod scheduler;
pub mod process;

pub use fd::{Whence, IO_BUF_MAX};
pub use kernel::Kernel;
pub use pcb::{FdBinding, Pcb, PcbRegistry, Status, MAX_FDS, NO_PARENT, STDERR_FD, STDIN_FD, STDOUT_FD};
pub use process::Signal;
pub use scheduler::{QuantumOutcome, Task, TaskStep, TaskTable, TickSignal, EXIT_IDLE};
