//! End-to-end format+mount scenario (spec.md §8 #1): `mkfs img 1 0` produces
//! a 256-byte FAT region and 255*256-byte data region; remounting sees cell
//! 1 = LASTBLOCK and every other cell free.

use tempfile::NamedTempFile;

#[test]
fn mkfs_then_mount_yields_expected_geometry() {
    let f = NamedTempFile::new().unwrap();
    {
        let fs = pennos_core::FileSystem::format(f.path(), 1, 0).unwrap();
        assert_eq!(fs.block_size(), 256);
    }

    let image_len = std::fs::metadata(f.path()).unwrap().len();
    assert_eq!(image_len, 256 + 255 * 256); // B*S FAT region + (N-1)*S data region

    let mut fs = pennos_core::FileSystem::mount(f.path()).unwrap();
    let dev = fs.device_mut();
    assert_eq!(dev.read_cell(pennos_core::ROOTDIR), pennos_core::LASTBLOCK);
    for cell in 2..dev.cell_count() as u16 {
        assert_eq!(dev.read_cell(cell), 0, "cell {} should start free", cell);
    }
}

#[test]
fn mkfs_rejects_out_of_range_geometry() {
    let f = NamedTempFile::new().unwrap();
    assert!(pennos_core::FileSystem::format(f.path(), 0, 0).is_err());
    assert!(pennos_core::FileSystem::format(f.path(), 33, 0).is_err());
    assert!(pennos_core::FileSystem::format(f.path(), 1, 5).is_err());
}
