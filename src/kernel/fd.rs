//! The kernel file-descriptor API: `open`/`read`/`write`/`close`/`unlink`/
//! `lseek`, plus terminal fd handling.
//!
//! Grounded on `examples/original_source/src/filesystem/filesystem.c`
//! (`f_open`, `f_read`, `f_write`, `f_close`, `f_unlink`, `f_lseek`),
//! re-expressed as methods on `Kernel` per spec.md §9's "encapsulate as a
//! single kernel object" note.

use std::io::{Read as StdRead, Write as StdWrite};

use crate::dir_entry::Permissions;
use crate::error::{Error, ErrorKind, Result};
use crate::kernel::kernel::Kernel;
use crate::kernel::pcb::{FdBinding, MAX_FDS, STDIN_FD, STDOUT_FD};
use crate::openfiles::{FileId, OpenMode, Pid};

/// `lseek` whence values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Current,
    End,
}

/// Cap on a single terminal read, per SPEC_FULL.md §4.4 expansion.
pub const IO_BUF_MAX: usize = 4096;

impl Kernel {
    /// `open(name, mode)`.
    pub fn open(&mut self, pid: Pid, name: &str, mode: OpenMode) -> Result<usize> {
        let found = self.fs.root_dir().find(name)?;
        if mode == OpenMode::Read && found.is_none() {
            return Err(Error::new(ErrorKind::NotFound));
        }
        // Only `touch` (create) a missing entry; an existing file is opened
        // as-is so a Read-mode open never bumps its mtime.
        let entry = match found {
            Some((_, entry)) => entry,
            None => self.fs.root_dir().touch(name)?,
        };

        let file_id = if let Some(open_entry) = self.open_files.lookup_by_name(name) {
            let required = match mode {
                OpenMode::Read => Permissions::READ,
                OpenMode::Write | OpenMode::Append => Permissions::WRITE,
            };
            if !entry.perm.contains(required) {
                return Err(Error::new(ErrorKind::PermissionDenied));
            }
            if mode == OpenMode::Write && open_entry.writer.is_some() && open_entry.writer != Some(pid) {
                return Err(Error::new(ErrorKind::WriteContended));
            }

            let file_id = open_entry.file_id;
            if open_entry.offset_of(pid).is_some() {
                let new_offset = match mode {
                    OpenMode::Read | OpenMode::Write => 0,
                    OpenMode::Append => entry.size as u64,
                };
                self.open_files.set_offset(file_id, pid, new_offset)?;
            } else {
                let initial_offset = match mode {
                    OpenMode::Read | OpenMode::Write => 0,
                    OpenMode::Append => entry.size as u64,
                };
                self.open_files.install_offset(file_id, pid, initial_offset)?;
            }
            if matches!(mode, OpenMode::Write | OpenMode::Append) {
                if let Some(e) = self.open_files.lookup_by_file_id_mut(file_id) {
                    if e.writer.is_none() {
                        e.writer = Some(pid);
                    }
                }
            }
            file_id
        } else {
            self.open_files.register(name, mode, pid, entry.size)
        };

        let pcb = self.pcbs.get_mut(pid)?;
        let fd = pcb.first_unused_fd().ok_or_else(|| Error::new(ErrorKind::FdTableFull))?;
        pcb.fds[fd] = FdBinding::OpenFile(file_id);
        Ok(fd)
    }

    fn binding(&self, pid: Pid, fd: usize) -> Result<FdBinding> {
        if fd >= MAX_FDS {
            return Err(Error::new(ErrorKind::NotFound));
        }
        Ok(self.pcbs.get(pid)?.fds[fd])
    }

    /// `read(fd, n, buf)`.
    pub fn read(&mut self, pid: Pid, fd: usize, n: usize, stdin: &mut dyn StdRead) -> Result<Vec<u8>> {
        match self.binding(pid, fd)? {
            FdBinding::Stdin => {
                let cap = n.min(IO_BUF_MAX);
                let mut buf = vec![0u8; cap];
                let read = stdin.read(&mut buf).map_err(Error::from)?;
                buf.truncate(read);
                Ok(buf)
            }
            FdBinding::Stdout | FdBinding::Stderr => Err(Error::new(ErrorKind::ReadFromOutput)),
            FdBinding::Unused => Err(Error::new(ErrorKind::NotFound)),
            FdBinding::OpenFile(file_id) => {
                let entry = self.open_files.lookup_by_file_id(file_id).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
                let name = entry.filename.clone();
                let offset = entry.offset_of(pid).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
                let content = self.fs.root_dir().read_content(&name)?;
                let size = content.len() as u64;
                if offset >= size {
                    return Ok(Vec::new());
                }
                let avail = (size - offset) as usize;
                let take = n.min(avail);
                let slice = content[offset as usize..offset as usize + take].to_vec();
                self.open_files.set_offset(file_id, pid, offset + take as u64)?;
                Ok(slice)
            }
        }
    }

    /// `write(fd, buf, n)`. Returns exactly the number of payload bytes
    /// written (see SPEC_FULL.md §9: never report a trailing terminator).
    pub fn write(&mut self, pid: Pid, fd: usize, buf: &[u8], stdout: &mut dyn StdWrite, stderr: &mut dyn StdWrite) -> Result<usize> {
        match self.binding(pid, fd)? {
            FdBinding::Stdin => Err(Error::new(ErrorKind::WriteToInput)),
            FdBinding::Stdout => {
                stdout.write_all(buf).map_err(Error::from)?;
                Ok(buf.len())
            }
            FdBinding::Stderr => {
                stderr.write_all(buf).map_err(Error::from)?;
                Ok(buf.len())
            }
            FdBinding::Unused => Err(Error::new(ErrorKind::NotFound)),
            FdBinding::OpenFile(file_id) => {
                let entry = self.open_files.lookup_by_file_id(file_id).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
                if entry.writer != Some(pid) {
                    return Err(Error::new(ErrorKind::ReadOnly));
                }
                let name = entry.filename.clone();
                let offset = entry.offset_of(pid).ok_or_else(|| Error::new(ErrorKind::NotFound))?;

                let mut content = self.fs.root_dir().read_content(&name)?;
                let end = offset as usize + buf.len();
                if end > content.len() {
                    content.resize(end, 0);
                }
                content[offset as usize..end].copy_from_slice(buf);
                self.fs.root_dir().overwrite_content(&name, &content)?;
                self.open_files.set_offset(file_id, pid, end as u64)?;
                Ok(buf.len())
            }
        }
    }

    /// `close(fd)`.
    pub fn close(&mut self, pid: Pid, fd: usize) -> Result<()> {
        match self.binding(pid, fd)? {
            FdBinding::Stdin | FdBinding::Stdout | FdBinding::Stderr => Err(Error::new(ErrorKind::CloseTerminal)),
            FdBinding::Unused => Err(Error::new(ErrorKind::NotFound)),
            FdBinding::OpenFile(file_id) => {
                self.pcbs.get_mut(pid)?.fds[fd] = FdBinding::Unused;
                self.release_file_if_unaliased(pid, file_id)
            }
        }
    }

    /// If the caller holds no other fd aliasing `file_id`, drops its offset
    /// (and writer ownership, if held); deregisters the entry if no process
    /// retains an offset afterward, reclaiming a deleted-pinned on-disk slot
    /// (if `unlink` left one behind) at that point.
    fn release_file_if_unaliased(&mut self, pid: Pid, file_id: FileId) -> Result<()> {
        let still_aliased = self
            .pcbs
            .get(pid)?
            .fds
            .iter()
            .any(|b| *b == FdBinding::OpenFile(file_id));
        if still_aliased {
            return Ok(());
        }
        self.open_files.drop_offset(file_id, pid)?;
        let entry = self.open_files.lookup_by_file_id(file_id);
        let empty = entry.map(|e| !e.has_offsets()).unwrap_or(true);
        let pending_reclaim = entry.and_then(|e| e.pending_reclaim());
        if empty {
            self.open_files.deregister(file_id)?;
            if let Some((block, slot, first_block)) = pending_reclaim {
                self.fs
                    .root_dir()
                    .reclaim_pinned(crate::dir::EntryLocation { block, slot }, first_block)?;
            }
        }
        Ok(())
    }

    /// `unlink(name)`.
    pub fn unlink(&mut self, pid: Pid, name: &str) -> Result<()> {
        let file_id = self.open_files.lookup_by_name(name).map(|e| e.file_id);
        match file_id {
            None => self.fs.root_dir().remove(name),
            Some(file_id) => {
                self.open_files.drop_offset(file_id, pid)?;
                let remaining = self
                    .open_files
                    .lookup_by_file_id(file_id)
                    .map(|e| e.has_offsets())
                    .unwrap_or(false);
                if remaining {
                    let (loc, entry) = self.fs.root_dir().find(name)?.ok_or_else(|| Error::new(ErrorKind::NotFound))?;
                    self.fs.root_dir().mark_deleted_pinned(name)?;
                    self.open_files.mark_pending_reclaim(file_id, loc.block, loc.slot, entry.first_block)
                } else {
                    self.open_files.deregister(file_id)?;
                    self.fs.root_dir().remove(name)
                }
            }
        }
    }

    /// `lseek(fd, offset, whence)`.
    pub fn lseek(&mut self, pid: Pid, fd: usize, offset: i64, whence: Whence) -> Result<u64> {
        match self.binding(pid, fd)? {
            FdBinding::Stdin | FdBinding::Stdout | FdBinding::Stderr => Err(Error::new(ErrorKind::SeekOnTerminal)),
            FdBinding::Unused => Err(Error::new(ErrorKind::NotFound)),
            FdBinding::OpenFile(file_id) => {
                let entry = self.open_files.lookup_by_file_id(file_id).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
                let name = entry.filename.clone();
                let current = entry.offset_of(pid).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
                let (_, dir_entry) = self.fs.root_dir().find(&name)?.ok_or_else(|| Error::new(ErrorKind::NotFound))?;
                let size = dir_entry.size as i64;

                let new_offset = match whence {
                    Whence::Set => offset,
                    Whence::Current => current as i64 + offset,
                    Whence::End => size + offset,
                };
                if new_offset < 0 || new_offset > size {
                    return Err(Error::new(ErrorKind::SeekOutOfBounds));
                }
                self.open_files.set_offset(file_id, pid, new_offset as u64)?;
                Ok(new_offset as u64)
            }
        }
    }

    /// Duplicates the parent's fd table into a fresh child and creates a
    /// per-process offset for every unique `file_id` inherited, matching
    /// spec.md §4.4's inheritance rule.
    pub(crate) fn inherit_fds(&mut self, parent_pid: Pid, child_pid: Pid) -> Result<()> {
        let fds = self.pcbs.get(parent_pid)?.fds;
        let mut seen = std::collections::HashSet::new();
        for binding in fds.iter() {
            if let FdBinding::OpenFile(file_id) = binding {
                if seen.insert(*file_id) {
                    let parent_offset = self
                        .open_files
                        .lookup_by_file_id(*file_id)
                        .and_then(|e| e.offset_of(parent_pid))
                        .unwrap_or(0);
                    self.open_files.install_offset(*file_id, child_pid, parent_offset)?;
                }
            }
        }
        Ok(())
    }

    /// Applies I/O redirection at spawn time: overwrites the child's slots
    /// 0 and 1 with the parent's `fd0`/`fd1` bindings, transferring writer
    /// ownership to the child if that slot is a file opened for writing.
    pub(crate) fn redirect_child_io(&mut self, parent_pid: Pid, child_pid: Pid, fd0: usize, fd1: usize) -> Result<()> {
        let parent_fds = self.pcbs.get(parent_pid)?.fds;
        let in_binding = parent_fds.get(fd0).copied().unwrap_or(FdBinding::Unused);
        let out_binding = parent_fds.get(fd1).copied().unwrap_or(FdBinding::Unused);

        {
            let child = self.pcbs.get_mut(child_pid)?;
            child.fds[STDIN_FD] = in_binding;
            child.fds[STDOUT_FD] = out_binding;
        }
        if let FdBinding::OpenFile(file_id) = out_binding {
            if let Some(entry) = self.open_files.lookup_by_file_id_mut(file_id) {
                if entry.writer.is_some() {
                    entry.writer = Some(child_pid);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use crate::kernel::kernel::Kernel;
    use crate::logger::{Logger, VecLogSink};
    use std::io::Cursor;
    use tempfile::NamedTempFile;

    fn boot() -> Kernel {
        let f = NamedTempFile::new().unwrap();
        let fs = FileSystem::format(f.path(), 1, 0).unwrap();
        let logger = Logger::new(Box::new(VecLogSink::default()));
        Kernel::boot(fs, logger).unwrap()
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut k = boot();
        let pid = k.current_pid();
        let fd = k.open(pid, "foo", OpenMode::Write).unwrap();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let n = k.write(pid, fd, b"hello", &mut out, &mut err).unwrap();
        assert_eq!(n, 5);
        k.lseek(pid, fd, 0, Whence::Set).unwrap();
        let mut stdin = Cursor::new(Vec::new());
        let data = k.read(pid, fd, 5, &mut stdin).unwrap();
        assert_eq!(data, b"hello");
    }

    #[test]
    fn write_contention_then_read_only_open_succeeds() {
        let mut k = boot();
        let a = k.pcbs.create(Some(k.current_pid())).unwrap();
        let b = k.pcbs.create(Some(k.current_pid())).unwrap();
        k.open(a, "foo", OpenMode::Write).unwrap();
        assert_eq!(k.open(b, "foo", OpenMode::Write).unwrap_err().kind(), ErrorKind::WriteContended);
        assert!(k.open(b, "foo", OpenMode::Read).is_ok());
    }

    #[test]
    fn unlink_while_open_keeps_content_for_holder() {
        let mut k = boot();
        let a = k.pcbs.create(Some(k.current_pid())).unwrap();
        let b = k.pcbs.create(Some(k.current_pid())).unwrap();
        let fd_a = k.open(a, "foo", OpenMode::Write).unwrap();
        let mut out = Vec::new();
        let mut err = Vec::new();
        k.write(a, fd_a, b"hello\0", &mut out, &mut err).unwrap();
        k.lseek(a, fd_a, 0, Whence::Set).unwrap();

        k.unlink(b, "foo").unwrap();
        assert_eq!(k.open(b, "foo", OpenMode::Read).unwrap_err().kind(), ErrorKind::NotFound);

        let mut stdin = Cursor::new(Vec::new());
        let data = k.read(a, fd_a, 6, &mut stdin).unwrap();
        assert_eq!(data, b"hello\0");

        k.close(a, fd_a).unwrap();
        assert!(k.fs.root_dir().find("foo").unwrap().is_none());
        // chain is physically reclaimed: every data cell it used is free again.
        for cell in 2..k.fs.device_mut().cell_count() as u16 {
            assert_eq!(k.fs.device_mut().read_cell(cell), 0, "cell {} was not freed", cell);
        }
    }

    #[test]
    fn read_past_eof_returns_empty() {
        let mut k = boot();
        let pid = k.current_pid();
        let fd = k.open(pid, "foo", OpenMode::Write).unwrap();
        let mut out = Vec::new();
        let mut err = Vec::new();
        k.write(pid, fd, b"ab", &mut out, &mut err).unwrap();
        let mut stdin = Cursor::new(Vec::new());
        let data = k.read(pid, fd, 10, &mut stdin).unwrap();
        assert!(data.is_empty());
    }
}
