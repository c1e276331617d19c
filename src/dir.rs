//! Directory engine: find/touch/rename/remove/mark-deleted-pinned/chmod/list
//! over a chain of directory blocks, plus copy/concatenate helpers.
//!
//! Grounded on `examples/original_source/src/pennfat/fat.c` (`find_file`,
//! `fs_touch`, `fs_rm`, `fs_chmod`, `fs_ls`) and
//! `examples/original_source/src/pennfat/pennfat.c` (`cp`/`cat` front ends),
//! re-expressed against a `Dir`/iterator idiom instead of raw pointer/slot
//! pairs.

use std::io::{Read as StdRead, Write as StdWrite};

use crate::device::{BlockDevice, LASTBLOCK, ROOTDIR};
use crate::dir_entry::{
    is_reusable, valid_filename, DirEntryData, EntryType, Permissions, DIR_ENTRY_SIZE,
    NAME_DELETED_PINNED, NAME_DELETED_UNUSED,
};
use crate::error::{Error, ErrorKind, Result};
use crate::fat::{self, chain_blocks};

/// Location of a directory entry within its chain: (block index, slot index
/// within that block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub block: u16,
    pub slot: usize,
}

/// A directory engine bound to a chain head (always `ROOTDIR` in this core;
/// the on-disk format allows subdirectories but nothing above the root is
/// exposed here).
///
/// `head` names the FAT *cell* holding the chain's first block index, not a
/// block itself — cell `ROOTDIR` (1) is a dedicated pointer cell, initially
/// `LASTBLOCK` for an empty directory, exactly like cell 0 holds metadata
/// rather than data. Every walk resolves through it via `first_block()`
/// before calling `fat::chain_blocks`, which otherwise operates on real
/// data-block indices (`>= 2`).
pub struct Dir<'a> {
    dev: &'a mut BlockDevice,
    head: u16,
}

fn entries_per_block(block_size: usize) -> usize {
    block_size / DIR_ENTRY_SIZE
}

impl<'a> Dir<'a> {
    pub fn root(dev: &'a mut BlockDevice) -> Self {
        Dir { dev, head: ROOTDIR }
    }

    fn read_slot(&mut self, block: u16, slot: usize) -> Result<[u8; DIR_ENTRY_SIZE]> {
        let block_size = self.dev.block_size();
        let mut buf = vec![0u8; block_size];
        self.dev.read_block(block, &mut buf)?;
        let off = slot * DIR_ENTRY_SIZE;
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw.copy_from_slice(&buf[off..off + DIR_ENTRY_SIZE]);
        Ok(raw)
    }

    fn write_slot(&mut self, block: u16, slot: usize, raw: &[u8; DIR_ENTRY_SIZE]) -> Result<()> {
        let block_size = self.dev.block_size();
        let mut buf = vec![0u8; block_size];
        self.dev.read_block(block, &mut buf)?;
        let off = slot * DIR_ENTRY_SIZE;
        buf[off..off + DIR_ENTRY_SIZE].copy_from_slice(raw);
        self.dev.write_block(block, &buf)?;
        Ok(())
    }

    /// The chain's first actual data block, or `LASTBLOCK` if the directory
    /// has never been extended past its initial empty state.
    fn first_block(&self) -> u16 {
        self.dev.read_cell(self.head)
    }

    /// Walks the directory chain, yielding `(location, status_byte, entry)`
    /// for every occupied-or-reusable slot, stopping at end-of-directory.
    fn walk(&mut self) -> Result<Vec<(EntryLocation, u8, DirEntryData)>> {
        let mut out = Vec::new();
        let first = self.first_block();
        if first == LASTBLOCK {
            return Ok(out);
        }
        let blocks = chain_blocks(self.dev, first)?;
        let per_block = entries_per_block(self.dev.block_size());
        'outer: for block in blocks {
            for slot in 0..per_block {
                let raw = self.read_slot(block, slot)?;
                match DirEntryData::decode(&raw) {
                    None => break 'outer, // end-of-directory
                    Some((status, entry)) => {
                        out.push((EntryLocation { block, slot }, status, entry));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Finds `name` in the directory. Returns the location and decoded
    /// entry for the first match among deleted-pinned-or-live slots.
    pub fn find(&mut self, name: &str) -> Result<Option<(EntryLocation, DirEntryData)>> {
        for (loc, status, entry) in self.walk()? {
            if is_reusable(status) {
                continue;
            }
            if entry.name == name {
                return Ok(Some((loc, entry)));
            }
        }
        Ok(None)
    }

    /// Finds the first reusable slot (end-of-directory or deleted-unused),
    /// or `None` if the chain has no such slot (caller must extend it).
    fn find_reusable_slot(&mut self) -> Result<Option<EntryLocation>> {
        let first = self.first_block();
        if first == LASTBLOCK {
            return Ok(None);
        }
        let blocks = chain_blocks(self.dev, first)?;
        let per_block = entries_per_block(self.dev.block_size());
        for block in blocks {
            for slot in 0..per_block {
                let raw = self.read_slot(block, slot)?;
                let status = raw[0];
                if status == crate::dir_entry::NAME_DELETED_UNUSED {
                    return Ok(Some(EntryLocation { block, slot }));
                }
                if status == 0 {
                    return Ok(Some(EntryLocation { block, slot }));
                }
            }
        }
        Ok(None)
    }

    /// Extends the directory chain with a fresh, zeroed block and returns
    /// its first slot.
    fn extend_chain(&mut self) -> Result<EntryLocation> {
        let new_block = fat::free_block_search(self.dev);
        if new_block == 0 {
            return Err(Error::new(ErrorKind::NoSpace));
        }
        let block_size = self.dev.block_size();
        self.dev.write_block(new_block, &vec![0u8; block_size])?;
        self.dev.write_cell(new_block, LASTBLOCK)?;

        let first = self.first_block();
        if first == LASTBLOCK {
            // directory chain was empty; the head cell itself points at it.
            self.dev.write_cell(self.head, new_block)?;
        } else {
            // link the new block onto the tail of the existing chain
            let blocks = chain_blocks(self.dev, first)?;
            let tail = *blocks.last().unwrap();
            self.dev.write_cell(tail, new_block)?;
        }
        Ok(EntryLocation { block: new_block, slot: 0 })
    }

    /// Updates mtime if `name` exists, otherwise allocates a fresh empty
    /// file entry (Read+Write, size 0, empty content).
    pub fn touch(&mut self, name: &str) -> Result<DirEntryData> {
        if !valid_filename(name) {
            return Err(Error::with_detail(ErrorKind::InvalidInput, format!("invalid filename: {}", name)));
        }
        if let Some((loc, mut entry)) = self.find(name)? {
            entry.touch_mtime();
            let raw = entry.encode()?;
            self.write_slot(loc.block, loc.slot, &raw)?;
            return Ok(entry);
        }

        let loc = match self.find_reusable_slot()? {
            Some(loc) => loc,
            None => self.extend_chain()?,
        };
        let entry = DirEntryData::new_file(name);
        let raw = entry.encode()?;
        self.write_slot(loc.block, loc.slot, &raw)?;
        Ok(entry)
    }

    /// Renames `old` to `new`. Fails `AlreadyExists` if `new` already exists.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if !valid_filename(new) {
            return Err(Error::with_detail(ErrorKind::InvalidInput, format!("invalid filename: {}", new)));
        }
        if self.find(new)?.is_some() {
            return Err(Error::new(ErrorKind::AlreadyExists));
        }
        let (loc, mut entry) = self.find(old)?.ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        entry.name = new.to_string();
        entry.touch_mtime();
        let raw = entry.encode()?;
        self.write_slot(loc.block, loc.slot, &raw)?;
        Ok(())
    }

    /// Marks `name`'s slot deleted-reusable and frees its content chain.
    /// The slot becomes immediately available for reuse.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let (loc, entry) = self.find(name)?.ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        fat::delete_chain(self.dev, entry.first_block)?;
        self.mark_status(loc, NAME_DELETED_UNUSED)?;
        Ok(())
    }

    /// Marks `name`'s slot deleted-but-pinned, leaving its content chain
    /// intact for any process that still holds it open.
    pub fn mark_deleted_pinned(&mut self, name: &str) -> Result<()> {
        let (loc, _) = self.find(name)?.ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        self.mark_status(loc, NAME_DELETED_PINNED)?;
        Ok(())
    }

    /// Frees a slot that was previously marked deleted-pinned once the last
    /// holder has released it (called by the fd layer on final close).
    pub fn reclaim_pinned(&mut self, loc: EntryLocation, first_block: u16) -> Result<()> {
        fat::delete_chain(self.dev, first_block)?;
        self.mark_status(loc, NAME_DELETED_UNUSED)?;
        Ok(())
    }

    fn mark_status(&mut self, loc: EntryLocation, status: u8) -> Result<()> {
        let mut raw = self.read_slot(loc.block, loc.slot)?;
        raw[0] = status;
        self.write_slot(loc.block, loc.slot, &raw)
    }

    /// Replaces `name`'s permission bits, returning the previous value.
    pub fn chmod(&mut self, name: &str, perm: Permissions) -> Result<Permissions> {
        let (loc, mut entry) = self.find(name)?.ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        let old = entry.perm;
        entry.perm = perm;
        entry.touch_mtime();
        let raw = entry.encode()?;
        self.write_slot(loc.block, loc.slot, &raw)?;
        Ok(old)
    }

    /// Lists every live entry, in on-disk iteration order.
    pub fn list(&mut self) -> Result<Vec<DirEntryData>> {
        Ok(self
            .walk()?
            .into_iter()
            .filter(|(_, status, _)| !is_reusable(*status) && *status != NAME_DELETED_PINNED)
            .map(|(_, _, e)| e)
            .collect())
    }

    /// Reads the full content of `name`.
    pub fn read_content(&mut self, name: &str) -> Result<Vec<u8>> {
        let (_, entry) = self.find(name)?.ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        let mut content = fat::read_chain(self.dev, entry.first_block)?;
        content.truncate(entry.size as usize);
        Ok(content)
    }

    /// Overwrites `name`'s content, deleting and rebuilding its chain, and
    /// updates its directory-entry size and mtime.
    pub fn overwrite_content(&mut self, name: &str, content: &[u8]) -> Result<()> {
        let (loc, mut entry) = self.find(name)?.ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        let new_head = fat::rebuild_chain(self.dev, entry.first_block, content)?;
        entry.first_block = new_head;
        entry.size = content.len() as u32;
        entry.touch_mtime();
        let raw = entry.encode()?;
        self.write_slot(loc.block, loc.slot, &raw)?;
        Ok(())
    }

    /// Appends `content` to the tail of `name`'s chain, extending it as
    /// needed, and updates size/mtime.
    pub fn append_content(&mut self, name: &str, content: &[u8]) -> Result<()> {
        let (loc, mut entry) = self.find(name)?.ok_or_else(|| Error::new(ErrorKind::NotFound))?;
        if entry.first_block == LASTBLOCK {
            let new_head = fat::free_block_search(self.dev);
            if new_head == 0 {
                return Err(Error::new(ErrorKind::NoSpace));
            }
            fat::build_chain(self.dev, new_head, content)?;
            entry.first_block = new_head;
        } else {
            let written = fat::fill_chain(self.dev, entry.first_block, entry.size as u64, content)?;
            if written < content.len() {
                let remainder = &content[written..];
                let new_tail = fat::free_block_search(self.dev);
                if new_tail == 0 {
                    return Err(Error::new(ErrorKind::NoSpace));
                }
                fat::build_chain(self.dev, new_tail, remainder)?;
                let blocks = chain_blocks(self.dev, entry.first_block)?;
                let old_tail = *blocks.last().unwrap();
                self.dev.write_cell(old_tail, new_tail)?;
            }
        }
        entry.size += content.len() as u32;
        entry.touch_mtime();
        let raw = entry.encode()?;
        self.write_slot(loc.block, loc.slot, &raw)?;
        Ok(())
    }

    /// Copies `name`'s content out to a host sink (`cp foo host:bar`).
    pub fn copy_to_host(&mut self, name: &str, sink: &mut dyn StdWrite) -> Result<()> {
        let content = self.read_content(name)?;
        sink.write_all(&content).map_err(Error::from)
    }

    /// Copies a host source's bytes into `name` in overwrite mode
    /// (`cp host:foo bar`), creating `name` if needed.
    pub fn copy_from_host(&mut self, name: &str, source: &mut dyn StdRead) -> Result<()> {
        let mut content = Vec::new();
        source.read_to_end(&mut content).map_err(Error::from)?;
        self.touch(name)?;
        self.overwrite_content(name, &content)
    }

    /// Concatenates a list of input files to a host sink (plain `cat`).
    pub fn concat_to_host(&mut self, names: &[&str], sink: &mut dyn StdWrite) -> Result<()> {
        for name in names {
            let content = self.read_content(name)?;
            sink.write_all(&content).map_err(Error::from)?;
        }
        Ok(())
    }

    /// Concatenates a list of input files into destination `dest`, either in
    /// overwrite or append mode.
    pub fn concat_to_file(&mut self, names: &[&str], dest: &str, append: bool) -> Result<()> {
        let mut combined = Vec::new();
        for name in names {
            combined.extend(self.read_content(name)?);
        }
        self.touch(dest)?;
        if append {
            self.append_content(dest, &combined)
        } else {
            self.overwrite_content(dest, &combined)
        }
    }

    /// Renders a hex dump of `name`'s content, used by the `hd` command.
    pub fn hex_dump(&mut self, name: &str) -> Result<String> {
        let content = self.read_content(name)?;
        let mut out = String::new();
        for (i, chunk) in content.chunks(16).enumerate() {
            out.push_str(&format!("{:08x}  ", i * 16));
            for b in chunk {
                out.push_str(&format!("{:02x} ", b));
            }
            out.push('\n');
        }
        Ok(out)
    }
}

impl EntryType {
    pub fn as_char(&self) -> char {
        match self {
            EntryType::File => '-',
            EntryType::Directory => 'd',
            EntryType::Link => 'l',
            EntryType::Unknown => '?',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BlockDevice;
    use tempfile::NamedTempFile;

    fn tmp_dev() -> BlockDevice {
        let f = NamedTempFile::new().unwrap();
        BlockDevice::format(f.path(), 1, 0).unwrap() // S = 256, 4 entries/block
    }

    #[test]
    fn touch_allocates_first_directory_block_through_head_cell() {
        let mut dev = tmp_dev();
        assert_eq!(dev.read_cell(ROOTDIR), LASTBLOCK);
        Dir::root(&mut dev).touch("a").unwrap();
        assert_ne!(dev.read_cell(ROOTDIR), LASTBLOCK);
        assert!(Dir::root(&mut dev).find("a").unwrap().is_some());
    }

    #[test]
    fn directory_grows_past_one_block() {
        let mut dev = tmp_dev();
        let mut dir = Dir::root(&mut dev);
        // 4 entries/block at S=256; a 5th entry forces a second directory block.
        for name in ["a", "b", "c", "d", "e"] {
            dir.touch(name).unwrap();
        }
        let names: Vec<_> = dir.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn remove_then_touch_reuses_slot() {
        let mut dev = tmp_dev();
        let mut dir = Dir::root(&mut dev);
        dir.touch("a").unwrap();
        dir.overwrite_content("a", b"xyz").unwrap();
        dir.remove("a").unwrap();
        assert!(dir.find("a").unwrap().is_none());
        dir.touch("b").unwrap();
        let (_, entry) = dir.find("b").unwrap().unwrap();
        assert_eq!(entry.size, 0); // fresh entry, not leftover "xyz" content
    }

    #[test]
    fn rename_fails_if_target_exists() {
        let mut dev = tmp_dev();
        let mut dir = Dir::root(&mut dev);
        dir.touch("a").unwrap();
        dir.touch("b").unwrap();
        assert_eq!(dir.rename("a", "b").unwrap_err().kind(), ErrorKind::AlreadyExists);
        dir.rename("a", "c").unwrap();
        assert!(dir.find("a").unwrap().is_none());
        assert!(dir.find("c").unwrap().is_some());
    }

    #[test]
    fn chmod_returns_previous_permissions() {
        let mut dev = tmp_dev();
        let mut dir = Dir::root(&mut dev);
        dir.touch("a").unwrap();
        let old = dir.chmod("a", Permissions::READ).unwrap();
        assert_eq!(old, Permissions::read_write());
        let (_, entry) = dir.find("a").unwrap().unwrap();
        assert_eq!(entry.perm, Permissions::READ);
    }

    #[test]
    fn mark_deleted_pinned_hides_name_but_keeps_content_until_reclaimed() {
        let mut dev = tmp_dev();
        let mut dir = Dir::root(&mut dev);
        dir.touch("a").unwrap();
        dir.overwrite_content("a", b"hello").unwrap();
        let (loc, entry) = dir.find("a").unwrap().unwrap();
        let first_block = entry.first_block;
        dir.mark_deleted_pinned("a").unwrap();
        assert!(dir.find("a").unwrap().is_none());
        assert_ne!(dev.read_cell(first_block), 0); // content chain still allocated

        let mut dir = Dir::root(&mut dev);
        dir.reclaim_pinned(loc, first_block).unwrap();
        assert_eq!(dev.read_cell(first_block), 0); // now freed
        dir.touch("a").unwrap(); // slot is reusable again
        assert_eq!(dir.find("a").unwrap().unwrap().1.size, 0);
    }

    #[test]
    fn append_extends_chain_across_a_block_boundary() {
        let mut dev = tmp_dev(); // S = 256
        let mut dir = Dir::root(&mut dev);
        dir.touch("a").unwrap();
        dir.overwrite_content("a", b"ABC").unwrap();
        let payload = vec![b'x'; 256 + 5];
        dir.append_content("a", &payload).unwrap();

        let (_, entry) = dir.find("a").unwrap().unwrap();
        assert_eq!(entry.size as usize, 3 + payload.len());
        let content = dir.read_content("a").unwrap();
        assert_eq!(content.len(), 3 + payload.len());
        assert_eq!(&content[..3], b"ABC");
        assert_eq!(&content[3..], &payload[..]);
    }

    #[test]
    fn copy_to_and_from_host() {
        let mut dev = tmp_dev();
        let mut dir = Dir::root(&mut dev);
        dir.touch("a").unwrap();
        dir.overwrite_content("a", b"payload").unwrap();

        let mut host_out = Vec::new();
        dir.copy_to_host("a", &mut host_out).unwrap();
        assert_eq!(host_out, b"payload");

        let mut host_in = std::io::Cursor::new(b"from host".to_vec());
        dir.copy_from_host("b", &mut host_in).unwrap();
        assert_eq!(dir.read_content("b").unwrap(), b"from host");
    }
}
