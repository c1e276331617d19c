//! The task runtime: cooperative tasks driven by a priority-weighted
//! lottery scheduler and a periodic tick.
//!
//! Grounded on `examples/original_source/src/kernel/scheduler.c`, with the
//! `ucontext_t`/`swapcontext` stack-switching re-architected into closures
//! written as resumable state machines, the idiom `examples/jeehoonkang-rv6`
//! uses to represent process-resumable state without OS-level context
//! switches. A background thread advances the logical tick counter every
//! 10ms, standing in for the original's `setitimer(ITIMER_REAL, ...)` +
//! `SIGALRM` handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::kernel::kernel::Kernel;
use crate::kernel::pcb::Status;
use crate::openfiles::Pid;

/// Exit code emitted when the scheduler runs out of Running PCBs (spec.md
/// §6).
pub const EXIT_IDLE: i32 = 12;

/// What a task's resume function does on its slot of the quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStep {
    /// The task wants another quantum; its PCB stays Running (or, if the
    /// task itself blocked via a kernel call during this step, whatever
    /// status that call left it in).
    Yield,
    /// The task's body has returned; unwinds into the reaper the way a
    /// task returning into its `uc_link` does in the original.
    Exit,
}

/// A task's resumable body. Kept as a boxed closure rather than a `fn` +
/// `argv` pair because there is no safe stack-switch primitive to give it
/// its own execution context (spec.md §9); the closure is expected to
/// track its own resume point (a captured state-machine enum) across
/// invocations, since the scheduler only ever calls it once per quantum it
/// is scheduled on.
pub type Task = Box<dyn FnMut(&mut Kernel) -> TaskStep + Send>;

/// Execution contexts for every PCB with a task body, keyed by PID. Kept
/// out of `Pcb` itself: a `Box<dyn FnMut>` is neither `Clone` nor `Debug`,
/// and `Pcb` is moved and inspected freely elsewhere in the registry.
#[derive(Default)]
pub struct TaskTable {
    slots: HashMap<Pid, Task>,
}

impl TaskTable {
    pub fn new() -> Self {
        TaskTable { slots: HashMap::new() }
    }

    pub fn insert(&mut self, pid: Pid, task: Task) {
        self.slots.insert(pid, task);
    }

    /// Removes and returns the task so it can be called without holding a
    /// borrow of the table across the call (the call takes `&mut Kernel`,
    /// which owns this table).
    pub fn take(&mut self, pid: Pid) -> Option<Task> {
        self.slots.remove(&pid)
    }

    pub fn put_back(&mut self, pid: Pid, task: Task) {
        self.slots.insert(pid, task);
    }

    pub fn remove(&mut self, pid: Pid) {
        self.slots.remove(&pid);
    }
}

/// What one quantum accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantumOutcome {
    Ran(Pid),
    Idle,
}

/// One scheduling quantum.
pub const QUANTUM: Duration = Duration::from_millis(10);

/// Weighted-lottery constants over priority levels {-1, 0, +1}. The rationale
/// behind these exact weights isn't documented anywhere reachable; they're
/// preserved verbatim rather than re-derived.
const WEIGHT_HIGH: u32 = 9; // priority -1
const WEIGHT_NORMAL: u32 = 6; // priority 0
const WEIGHT_LOW: u32 = 4; // priority +1
const WEIGHT_TOTAL: u32 = WEIGHT_HIGH + WEIGHT_NORMAL + WEIGHT_LOW;

/// A free-running tick source. `TickSignal::spawn` starts a background
/// thread that increments the counter every `QUANTUM`; a caller running its
/// own main loop can instead call `tick_once` or drive ticks manually (as
/// the test suite does, to keep scheduling deterministic).
#[derive(Clone)]
pub struct TickSignal {
    counter: Arc<AtomicU64>,
}

impl TickSignal {
    pub fn new() -> Self {
        TickSignal { counter: Arc::new(AtomicU64::new(0)) }
    }

    pub fn get(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn tick_once(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Spawns the background thread driving ticks in real time. Returned
    /// handle is detached; the thread runs until the process exits.
    pub fn spawn(&self) {
        let counter = Arc::clone(&self.counter);
        thread::spawn(move || loop {
            thread::sleep(QUANTUM);
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
}

impl Default for TickSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Chooses a priority level by weighted lottery, then rotates to the
/// nearest level that actually has a Running PCB.
fn pick_priority(k: &mut Kernel) -> Option<i8> {
    if k.pcbs.running_count() == 0 {
        return None;
    }
    let roll = k.rng.gen_range(0..WEIGHT_TOTAL);
    let mut priority: i8 = if roll < WEIGHT_HIGH {
        -1
    } else if roll < WEIGHT_HIGH + WEIGHT_NORMAL {
        0
    } else {
        1
    };
    while k.pcbs.running_count_at_priority(priority) == 0 {
        priority = ((priority as i32 + 2).rem_euclid(3) - 1) as i8;
    }
    Some(priority)
}

/// Picks the k-th Running PCB at `priority`, uniform over the count, and
/// returns its PID.
fn pick_at_priority(k: &mut Kernel, priority: i8) -> Pid {
    let candidates = k.pcbs.running_at_priority(priority);
    let idx = k.rng.gen_range(0..candidates.len());
    candidates[idx]
}

impl Kernel {
    /// Runs one scheduler decision: chooses the next runnable PCB, makes it
    /// current, and emits a Schedule log record. Returns `None` when the
    /// system has nothing left to run, which the caller should treat as a
    /// deadlock/idle shutdown condition.
    pub fn schedule_one(&mut self) -> Option<Pid> {
        let priority = pick_priority(self)?;
        let pid = pick_at_priority(self, priority);
        self.current_pid = pid;
        let name = self.pcbs.try_get(pid).map(|p| p.name.clone()).unwrap_or_default();
        self.logger.schedule(self.tick, pid, priority, &name);
        Some(pid)
    }

    /// Advances the logical tick counter by one, as the alarm handler and
    /// the reaper both do in the original.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    pub fn mark_stopped(&mut self, pid: Pid) -> crate::error::Result<()> {
        self.pcbs.get_mut(pid)?.status = Status::Stopped;
        Ok(())
    }

    pub fn mark_running(&mut self, pid: Pid) -> crate::error::Result<()> {
        self.pcbs.get_mut(pid)?.status = Status::Running;
        Ok(())
    }

    /// Promotes every PCB whose `sleep_until` deadline has passed back to
    /// Running, logging a Continued record for each. Run once per quantum
    /// so a sleeper can never be rescheduled before `T >= deadline`
    /// (spec.md §4.6's "no earlier than T + ticks"), since a Blocked PCB is
    /// never itself a candidate in `schedule_one`.
    pub fn wake_sleepers(&mut self) {
        let tick = self.tick;
        let ready: Vec<Pid> = self
            .pcbs
            .iter()
            .filter(|p| p.status == Status::Blocked && p.sleep_until.map_or(false, |deadline| tick >= deadline))
            .map(|p| p.pid)
            .collect();
        for pid in ready {
            if let Ok(pcb) = self.pcbs.get_mut(pid) {
                pcb.sleep_until = None;
                pcb.status = Status::Running;
            }
            if let Ok(pcb) = self.pcbs.get(pid) {
                let (priority, name) = (pcb.priority, pcb.name.clone());
                self.logger.continued(self.tick, pid, priority, &name);
            }
        }
    }

    /// Runs one quantum: wakes any sleepers whose deadline has passed,
    /// chooses the next runnable PCB, calls its task body for one step (if
    /// it has one — a PCB created without a task, e.g. by direct kernel
    /// calls in tests, simply occupies its slot), and advances the tick.
    pub fn run_one_quantum(&mut self) -> QuantumOutcome {
        self.wake_sleepers();
        let pid = match self.schedule_one() {
            Some(pid) => pid,
            None => return QuantumOutcome::Idle,
        };
        if let Some(mut task) = self.tasks.take(pid) {
            match task(self) {
                TaskStep::Yield => self.tasks.put_back(pid, task),
                TaskStep::Exit => {
                    let _ = self.exit(pid);
                }
            }
        }
        self.advance_tick();
        QuantumOutcome::Ran(pid)
    }

    /// Drives the scheduler until no Running PCB remains, returning the
    /// exit code spec.md §6 specifies for that shutdown condition.
    pub fn run(&mut self) -> i32 {
        loop {
            if let QuantumOutcome::Idle = self.run_one_quantum() {
                return EXIT_IDLE;
            }
        }
    }
}
