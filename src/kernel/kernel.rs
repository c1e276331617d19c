//! The kernel object: owns every piece of mutable, process-wide state and
//! is threaded explicitly through every kernel primitive.
//!
//! Grounded on spec.md §9's own re-architecture note for "global mutable
//! tables (PCB list, open-files table, next-fid, ticks)": encapsulate as a
//! single object passed explicitly, eliminating the original's
//! module-level globals (`pcb_list`, `current_pcb`, `ticks`, `fat`, `fs_fd`
//! in `examples/original_source/src/kernel/puser-functions.c` and
//! `src/util/globals.h`).

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::fs::FileSystem;
use crate::kernel::pcb::PcbRegistry;
use crate::kernel::scheduler::TaskTable;
use crate::logger::Logger;
use crate::openfiles::{OpenFilesTable, Pid};

/// Owns the filesystem, the PCB registry, the open-files table, the logger,
/// and the logical clock. Every kernel call in `fd.rs`/`process.rs`/
/// `scheduler.rs` is a method on this type.
pub struct Kernel {
    pub fs: FileSystem,
    pub open_files: OpenFilesTable,
    pub pcbs: PcbRegistry,
    pub logger: Logger,
    pub tick: u64,
    pub current_pid: Pid,
    /// Execution contexts (task bodies) for every spawned PCB that has one.
    pub tasks: TaskTable,
    pub(crate) rng: StdRng,
}

impl Kernel {
    /// Boots the kernel over an already-mounted filesystem, creating the
    /// single top-level process (no parent) that will become PID 1.
    pub fn boot(fs: FileSystem, logger: Logger) -> crate::error::Result<Self> {
        let mut pcbs = PcbRegistry::new();
        let init_pid = pcbs.create(None)?;
        pcbs.get_mut(init_pid)?.name = "init".to_string();

        // seeded from the wall clock at startup, per spec.md §4.6
        let seed = Self::wall_clock_seed();
        let rng = StdRng::seed_from_u64(seed);

        Ok(Kernel {
            fs,
            open_files: OpenFilesTable::new(),
            pcbs,
            logger,
            tick: 0,
            current_pid: init_pid,
            tasks: TaskTable::new(),
            rng,
        })
    }

    #[cfg(feature = "chrono")]
    fn wall_clock_seed() -> u64 {
        chrono::Local::now().timestamp_nanos_opt().unwrap_or(0) as u64
    }

    #[cfg(not(feature = "chrono"))]
    fn wall_clock_seed() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
    }

    pub fn current_pid(&self) -> Pid {
        self.current_pid
    }

    pub(crate) fn assert_exists(&self, pid: Pid) -> crate::error::Result<()> {
        self.pcbs.get(pid).map(|_| ())
    }
}
