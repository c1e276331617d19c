//! The open-files table: a process-wide registry mapping a `file_id` to its
//! set of per-process offsets and its single-writer lock.
//!
//! Grounded on `examples/original_source/src/filesystem/filesystem.h`'s
//! `file_t`/`fileptr` linked structures, re-expressed as owned `HashMap`s:
//! no pointer aliasing, lookups by key instead of list walks.

use std::collections::HashMap;

use crate::error::{Error, ErrorKind, Result};

pub type FileId = u64;
pub type Pid = i32;

/// Mode a file was opened under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

/// One process's cursor into an open file. Shared by every fd that process
/// holds on the same `file_id` (spec.md §3: "all share one offset").
#[derive(Debug, Clone, Copy)]
pub struct ProcessOffset {
    pub pid: Pid,
    pub offset: u64,
}

/// A single entry in the open-files table.
#[derive(Debug, Clone)]
pub struct OpenFileEntry {
    pub file_id: FileId,
    pub filename: String,
    /// PID of the current exclusive writer, or `None`.
    pub writer: Option<Pid>,
    offsets: HashMap<Pid, u64>,
    /// Set when `unlink` marked the on-disk entry deleted-pinned while this
    /// entry still had live offsets: `(dir_block, dir_slot, first_block)`.
    /// The fd layer reclaims the slot and content chain once the last
    /// offset is dropped (spec.md §4.4 `unlink`; see the E2E scenario in
    /// spec.md §8 #3, "when A closes, foo is physically reclaimed").
    pending_reclaim: Option<(u16, usize, u16)>,
}

impl OpenFileEntry {
    pub fn offset_of(&self, pid: Pid) -> Option<u64> {
        self.offsets.get(&pid).copied()
    }

    pub fn offsets(&self) -> impl Iterator<Item = ProcessOffset> + '_ {
        self.offsets.iter().map(|(&pid, &offset)| ProcessOffset { pid, offset })
    }

    pub fn has_offsets(&self) -> bool {
        !self.offsets.is_empty()
    }

    pub fn pending_reclaim(&self) -> Option<(u16, usize, u16)> {
        self.pending_reclaim
    }
}

/// The open-files table.
#[derive(Default)]
pub struct OpenFilesTable {
    next_file_id: FileId,
    by_id: HashMap<FileId, OpenFileEntry>,
    by_name: HashMap<String, FileId>,
}

impl OpenFilesTable {
    pub fn new() -> Self {
        OpenFilesTable { next_file_id: 0, by_id: HashMap::new(), by_name: HashMap::new() }
    }

    /// Registers a freshly opened file, installing the caller's initial
    /// offset (0 for Read/Write, `size` for Append) and, for Write/Append,
    /// making the caller the writer. Returns the new `file_id`.
    pub fn register(&mut self, name: &str, mode: OpenMode, pid: Pid, size: u32) -> FileId {
        let file_id = self.next_file_id;
        self.next_file_id += 1;

        let mut offsets = HashMap::new();
        let initial_offset = match mode {
            OpenMode::Read | OpenMode::Write => 0,
            OpenMode::Append => size as u64,
        };
        offsets.insert(pid, initial_offset);

        let writer = match mode {
            OpenMode::Write | OpenMode::Append => Some(pid),
            OpenMode::Read => None,
        };

        let entry = OpenFileEntry { file_id, filename: name.to_string(), writer, offsets, pending_reclaim: None };
        self.by_id.insert(file_id, entry);
        self.by_name.insert(name.to_string(), file_id);
        file_id
    }

    /// Removes an entry. Invariant: its offset set must already be empty.
    pub fn deregister(&mut self, file_id: FileId) -> Result<()> {
        let entry = self.by_id.get(&file_id).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        if entry.has_offsets() {
            return Err(Error::with_detail(
                ErrorKind::InvalidInput,
                "cannot deregister an open-file entry with live offsets",
            ));
        }
        let name = entry.filename.clone();
        self.by_id.remove(&file_id);
        if self.by_name.get(&name) == Some(&file_id) {
            self.by_name.remove(&name);
        }
        Ok(())
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&OpenFileEntry> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub fn lookup_by_file_id(&self, file_id: FileId) -> Option<&OpenFileEntry> {
        self.by_id.get(&file_id)
    }

    pub fn lookup_by_file_id_mut(&mut self, file_id: FileId) -> Option<&mut OpenFileEntry> {
        self.by_id.get_mut(&file_id)
    }

    /// Renames the live entry tracking `old_name` to `new_name`, if one is
    /// open, keeping the name index in sync with an on-disk rename.
    pub fn rename(&mut self, old_name: &str, new_name: &str) {
        if let Some(id) = self.by_name.remove(old_name) {
            if let Some(entry) = self.by_id.get_mut(&id) {
                entry.filename = new_name.to_string();
            }
            self.by_name.insert(new_name.to_string(), id);
        }
    }

    pub fn install_offset(&mut self, file_id: FileId, pid: Pid, offset: u64) -> Result<()> {
        let entry = self.by_id.get_mut(&file_id).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        entry.offsets.insert(pid, offset);
        Ok(())
    }

    pub fn drop_offset(&mut self, file_id: FileId, pid: Pid) -> Result<()> {
        let entry = self.by_id.get_mut(&file_id).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        entry.offsets.remove(&pid);
        if entry.writer == Some(pid) {
            entry.writer = None;
        }
        Ok(())
    }

    pub fn set_offset(&mut self, file_id: FileId, pid: Pid, offset: u64) -> Result<()> {
        let entry = self.by_id.get_mut(&file_id).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        entry.offsets.insert(pid, offset);
        Ok(())
    }

    /// Records the on-disk slot to reclaim once this entry's last offset is
    /// dropped, set by `unlink` when the name was deleted while still open.
    pub fn mark_pending_reclaim(&mut self, file_id: FileId, dir_block: u16, dir_slot: usize, first_block: u16) -> Result<()> {
        let entry = self.by_id.get_mut(&file_id).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        entry.pending_reclaim = Some((dir_block, dir_slot, first_block));
        Ok(())
    }
}
