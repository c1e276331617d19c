//! Process control blocks and the PCB registry.
//!
//! Grounded on `examples/original_source/src/kernel/PCB.c` (`createPCB`,
//! `addPCBToList`, `removePCBFromList`, `findPCBByPID`), re-architected: the
//! circular linked list with manual `next` pointers becomes an arena
//! (`Vec<Pcb>`) indexed by slot, with PID a separate monotonic counter
//! rather than a pointer identity.

use crate::error::{Error, ErrorKind, Result};
use crate::openfiles::{FileId, Pid};

/// Sentinel fd-table entry meaning "no file bound to this slot."
pub const NOFILE: FileId = u64::MAX;
pub const MAX_FDS: usize = 32;

pub const STDIN_FD: usize = 0;
pub const STDOUT_FD: usize = 1;
pub const STDERR_FD: usize = 2;

/// A reserved terminal or open-file binding for one fd slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdBinding {
    Stdin,
    Stdout,
    Stderr,
    OpenFile(FileId),
    Unused,
}

/// A process's lifecycle state (spec.md §3/§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Stopped,
    Blocked,
    Zombie,
    Waiting,
}

/// A process control block.
#[derive(Debug, Clone)]
pub struct Pcb {
    pub pid: Pid,
    pub name: String,
    pub parent_pid: Pid,
    pub children: Vec<Pid>,
    pub fds: [FdBinding; MAX_FDS],
    pub priority: i8,
    pub status: Status,
    /// Populated only once the process has exited: mirrors `wstatus` from
    /// the original's `p_waitpid`.
    pub exit_status: Option<Status>,
    /// Wake deadline set by `Kernel::sleep`, consulted by
    /// `Kernel::wake_sleepers`. `None` unless the PCB is Blocked on a sleep.
    pub sleep_until: Option<u64>,
}

impl Pcb {
    fn new(pid: Pid, parent_pid: Pid, fds: [FdBinding; MAX_FDS]) -> Self {
        Pcb {
            pid,
            name: String::new(),
            parent_pid,
            children: Vec::new(),
            fds,
            priority: 0,
            status: Status::Running,
            exit_status: None,
            sleep_until: None,
        }
    }

    pub fn first_unused_fd(&self) -> Option<usize> {
        (3..MAX_FDS).find(|&i| self.fds[i] == FdBinding::Unused)
    }
}

/// The "no parent" sentinel PID (spec.md §3: "0 if top-level").
pub const NO_PARENT: Pid = 0;

/// Arena-backed PCB registry. A single slot list stands in for the
/// original's circular linked list; traversal order for round-robin
/// purposes is the slot insertion order, matching spec.md §4.5's "insertion
/// order is not semantically meaningful but governs round-robin traversal
/// tie-breaks."
#[derive(Default)]
pub struct PcbRegistry {
    next_pid: Pid,
    slots: Vec<Pcb>,
}

impl PcbRegistry {
    pub fn new() -> Self {
        PcbRegistry { next_pid: 1, slots: Vec::new() }
    }

    fn default_fds() -> [FdBinding; MAX_FDS] {
        let mut fds = [FdBinding::Unused; MAX_FDS];
        fds[STDIN_FD] = FdBinding::Stdin;
        fds[STDOUT_FD] = FdBinding::Stdout;
        fds[STDERR_FD] = FdBinding::Stderr;
        fds
    }

    /// Creates a PCB. If `parent` is `Some`, the child inherits the
    /// parent's fd table; priority always starts at 0 regardless of the
    /// parent's (see SPEC_FULL.md §3 expansion / DESIGN.md).
    pub fn create(&mut self, parent: Option<Pid>) -> Result<Pid> {
        let pid = self.next_pid;
        let fds = match parent {
            Some(parent_pid) => self.get(parent_pid)?.fds,
            None => Self::default_fds(),
        };
        let parent_pid = parent.unwrap_or(NO_PARENT);
        let mut pcb = Pcb::new(pid, parent_pid, fds);
        pcb.priority = 0;
        self.next_pid += 1;

        if let Some(parent_pid) = parent {
            self.get_mut(parent_pid)?.children.push(pid);
        }
        self.slots.push(pcb);
        Ok(pid)
    }

    pub fn get(&self, pid: Pid) -> Result<&Pcb> {
        self.slots.iter().find(|p| p.pid == pid).ok_or_else(|| Error::new(ErrorKind::NotFound))
    }

    pub fn get_mut(&mut self, pid: Pid) -> Result<&mut Pcb> {
        self.slots.iter_mut().find(|p| p.pid == pid).ok_or_else(|| Error::new(ErrorKind::NotFound))
    }

    pub fn try_get(&self, pid: Pid) -> Option<&Pcb> {
        self.slots.iter().find(|p| p.pid == pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pcb> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pcb> {
        self.slots.iter_mut()
    }

    pub fn running_count(&self) -> usize {
        self.slots.iter().filter(|p| p.status == Status::Running).count()
    }

    pub fn running_count_at_priority(&self, priority: i8) -> usize {
        self.slots.iter().filter(|p| p.status == Status::Running && p.priority == priority).count()
    }

    /// Every PCB currently `Running` at `priority`, in registry order.
    pub fn running_at_priority(&self, priority: i8) -> Vec<Pid> {
        self.slots
            .iter()
            .filter(|p| p.status == Status::Running && p.priority == priority)
            .map(|p| p.pid)
            .collect()
    }

    /// Re-queues `pid`: removes then re-appends it, as `nice` requires
    /// (spec.md §4.6: "re-queue (remove-and-append)").
    pub fn requeue(&mut self, pid: Pid) -> Result<()> {
        let idx = self.slots.iter().position(|p| p.pid == pid).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        let pcb = self.slots.remove(idx);
        self.slots.push(pcb);
        Ok(())
    }

    /// Splices `pid` out of the registry. If it is a zombie, its remaining
    /// children are orphaned and it is removed from its parent's children
    /// list (spec.md §4.5).
    pub fn remove(&mut self, pid: Pid) -> Result<Pcb> {
        let idx = self.slots.iter().position(|p| p.pid == pid).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        let pcb = self.slots.remove(idx);

        if pcb.status == Status::Zombie {
            for &child_pid in &pcb.children {
                if let Some(child) = self.slots.iter_mut().find(|p| p.pid == child_pid) {
                    child.parent_pid = NO_PARENT;
                }
            }
            if pcb.parent_pid != NO_PARENT {
                if let Some(parent) = self.slots.iter_mut().find(|p| p.pid == pcb.parent_pid) {
                    parent.children.retain(|&c| c != pid);
                }
            }
        }
        Ok(pcb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_root_has_default_fds() {
        let mut reg = PcbRegistry::new();
        let pid = reg.create(None).unwrap();
        let pcb = reg.get(pid).unwrap();
        assert_eq!(pcb.fds[STDIN_FD], FdBinding::Stdin);
        assert_eq!(pcb.fds[3], FdBinding::Unused);
        assert_eq!(pcb.priority, 0);
    }

    #[test]
    fn child_inherits_fds_and_is_registered_as_child() {
        let mut reg = PcbRegistry::new();
        let parent = reg.create(None).unwrap();
        reg.get_mut(parent).unwrap().fds[3] = FdBinding::OpenFile(7);
        let child = reg.create(Some(parent)).unwrap();
        assert_eq!(reg.get(child).unwrap().fds[3], FdBinding::OpenFile(7));
        assert!(reg.get(parent).unwrap().children.contains(&child));
    }

    #[test]
    fn removing_zombie_orphans_children() {
        let mut reg = PcbRegistry::new();
        let parent = reg.create(None).unwrap();
        let child = reg.create(Some(parent)).unwrap();
        reg.get_mut(parent).unwrap().status = Status::Zombie;
        reg.remove(parent).unwrap();
        assert_eq!(reg.get(child).unwrap().parent_pid, NO_PARENT);
    }
}
