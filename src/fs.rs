//! The mounted filesystem: owns the block device and exposes the directory
//! engine bound to the root chain.
//!
//! Grounded on `examples/original_source/src/pennfat/fat.c`'s `fs_mount` /
//! `fs_unmount` / `fs_format`, re-expressed as an owning `FileSystem` type
//! instead of a pair of globals (`fat`, `fs_fd`).

use std::path::Path;

use crate::device::BlockDevice;
use crate::dir::Dir;
use crate::error::Result;

/// An open FAT-style filesystem image.
pub struct FileSystem {
    device: BlockDevice,
}

impl FileSystem {
    /// `mkfs img blocks_in_fat block_size_exp`: formats a fresh image.
    pub fn format<P: AsRef<Path>>(path: P, blocks_in_fat: u8, block_size_exp: u8) -> Result<Self> {
        let device = BlockDevice::format(path, blocks_in_fat, block_size_exp)?;
        Ok(FileSystem { device })
    }

    /// `mount img`: opens an existing image.
    pub fn mount<P: AsRef<Path>>(path: P) -> Result<Self> {
        let device = BlockDevice::mount(path)?;
        Ok(FileSystem { device })
    }

    /// Block size `S` of the mounted image.
    pub fn block_size(&self) -> usize {
        self.device.block_size()
    }

    /// The root directory engine, borrowed mutably for the duration of one
    /// operation.
    pub fn root_dir(&mut self) -> Dir<'_> {
        Dir::root(&mut self.device)
    }

    pub fn device_mut(&mut self) -> &mut BlockDevice {
        &mut self.device
    }

    /// `unmount`: flushes the backing file. Dropping `FileSystem` also
    /// flushes via `Drop` on a best-effort basis.
    pub fn unmount(mut self) -> Result<()> {
        self.device.flush()
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        if let Err(e) = self.device.flush() {
            log::warn!("failed to flush filesystem image on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LASTBLOCK;
    use tempfile::NamedTempFile;

    #[test]
    fn format_then_mount_round_trip() {
        let f = NamedTempFile::new().unwrap();
        {
            let fs = FileSystem::format(f.path(), 1, 0).unwrap();
            assert_eq!(fs.block_size(), 256);
        }
        let mut fs = FileSystem::mount(f.path()).unwrap();
        assert_eq!(fs.device_mut().read_cell(1), LASTBLOCK);
        for cell in 2..fs.device_mut().cell_count() as u16 {
            assert_eq!(fs.device_mut().read_cell(cell), 0);
        }
    }

    #[test]
    fn touch_then_find_round_trip() {
        let f = NamedTempFile::new().unwrap();
        let mut fs = FileSystem::format(f.path(), 1, 0).unwrap();
        fs.root_dir().touch("foo.txt").unwrap();
        let (_, entry) = fs.root_dir().find("foo.txt").unwrap().unwrap();
        assert_eq!(entry.size, 0);
    }

    #[test]
    fn touch_idempotent_preserves_content() {
        let f = NamedTempFile::new().unwrap();
        let mut fs = FileSystem::format(f.path(), 1, 0).unwrap();
        fs.root_dir().touch("foo.txt").unwrap();
        fs.root_dir().overwrite_content("foo.txt", b"hello").unwrap();
        let before = fs.root_dir().find("foo.txt").unwrap().unwrap().1;
        fs.root_dir().touch("foo.txt").unwrap();
        let after = fs.root_dir().find("foo.txt").unwrap().unwrap().1;
        assert_eq!(before.size, after.size);
        assert_eq!(fs.root_dir().read_content("foo.txt").unwrap(), b"hello");
        assert!(after.mtime >= before.mtime);
    }
}
