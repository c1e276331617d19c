//! The 64-byte on-disk directory entry and its permission/type bits.
//!
//! Grounded on `examples/original_source/src/pennfat/fat.h`'s `dir_entry_t`,
//! re-expressed with a `bitflags!`-based attribute style instead of raw
//! `uint8_t` constants.

use crate::error::{Error, ErrorKind, Result};
use crate::time::{DEFAULT_TIME_PROVIDER, TimeProvider};

/// Size in bytes of a single directory entry.
pub const DIR_ENTRY_SIZE: usize = 64;
/// Maximum filename length, not counting the null terminator.
pub const MAX_NAME_LEN: usize = 31;

/// First byte of `name`: entry status.
pub(crate) const NAME_END_OF_DIR: u8 = 0;
pub(crate) const NAME_DELETED_UNUSED: u8 = 1;
pub(crate) const NAME_DELETED_PINNED: u8 = 2;

bitflags! {
    /// Permission bits over a directory entry.
    #[derive(Default)]
    pub struct Permissions: u8 {
        const READ    = 0b100;
        const WRITE   = 0b010;
        const EXECUTE = 0b001;
        const NONE    = 0;
    }
}

impl Permissions {
    pub fn read_write() -> Self {
        Permissions::READ | Permissions::WRITE
    }
}

/// The type of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Unknown = 0,
    File = 1,
    Directory = 2,
    Link = 3,
}

impl EntryType {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => EntryType::File,
            2 => EntryType::Directory,
            3 => EntryType::Link,
            _ => EntryType::Unknown,
        }
    }
}

/// A decoded 64-byte directory entry.
#[derive(Debug, Clone)]
pub struct DirEntryData {
    pub name: String,
    pub size: u32,
    pub first_block: u16,
    pub entry_type: EntryType,
    pub perm: Permissions,
    pub mtime: i64,
}

impl DirEntryData {
    pub(crate) fn new_file(name: &str) -> Self {
        DirEntryData {
            name: name.to_string(),
            size: 0,
            first_block: crate::device::LASTBLOCK,
            entry_type: EntryType::File,
            perm: Permissions::read_write(),
            mtime: DEFAULT_TIME_PROVIDER.now_unix(),
        }
    }

    pub(crate) fn touch_mtime(&mut self) {
        self.mtime = DEFAULT_TIME_PROVIDER.now_unix();
    }

    /// Decodes a 64-byte on-disk record. Returns `None` for an
    /// end-of-directory slot (name[0] == 0).
    pub(crate) fn decode(raw: &[u8; DIR_ENTRY_SIZE]) -> Option<(u8, Self)> {
        let status = raw[0];
        if status == NAME_END_OF_DIR {
            return None;
        }
        // `name` is decoded straight off raw[0..32] even for deleted slots:
        // a reusable/pinned marker byte (1 or 2) can never equal the first
        // byte of a name `valid_filename` would accept, so a byte-for-byte
        // compare against such a slot naturally never matches without any
        // special-casing (see DESIGN.md).
        let name = decode_name(&raw[0..32]);
        let size = u32::from_le_bytes(raw[32..36].try_into().unwrap());
        let first_block = u16::from_le_bytes(raw[36..38].try_into().unwrap());
        let entry_type = EntryType::from_u8(raw[38]);
        let perm = Permissions::from_bits_truncate(raw[39]);
        let mtime = i64::from_le_bytes(raw[40..48].try_into().unwrap());
        Some((
            status,
            DirEntryData { name, size, first_block, entry_type, perm, mtime },
        ))
    }

    /// Encodes this entry as a live (status >= 3) 64-byte record.
    pub(crate) fn encode(&self) -> Result<[u8; DIR_ENTRY_SIZE]> {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        encode_name(&self.name, &mut raw[0..32])?;
        raw[32..36].copy_from_slice(&self.size.to_le_bytes());
        raw[36..38].copy_from_slice(&self.first_block.to_le_bytes());
        raw[38] = self.entry_type as u8;
        raw[39] = self.perm.bits();
        raw[40..48].copy_from_slice(&self.mtime.to_le_bytes());
        Ok(raw)
    }
}

fn decode_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn encode_name(name: &str, field: &mut [u8]) -> Result<()> {
    let bytes = name.as_bytes();
    if bytes.len() > MAX_NAME_LEN {
        return Err(Error::with_detail(
            ErrorKind::InvalidInput,
            format!("name '{}' exceeds {} bytes", name, MAX_NAME_LEN),
        ));
    }
    // Ensure the first byte lands at >= 3 (a live marker), never colliding
    // with the reserved 0/1/2 status bytes, by requiring a non-empty,
    // validated name (see `valid_filename` below).
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Validates a filename against the POSIX-portable charset the original
/// `valid_filename` enforces: `[A-Za-z0-9._-]`, non-empty, <= 31 bytes.
pub fn valid_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

/// Status marker for a fresh end-of-directory (unwritten) slot.
pub(crate) fn is_reusable(status: u8) -> bool {
    status == NAME_END_OF_DIR || status == NAME_DELETED_UNUSED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut entry = DirEntryData::new_file("foo.txt");
        entry.size = 42;
        entry.first_block = 7;
        let raw = entry.encode().unwrap();
        let mut with_marker = raw;
        with_marker[0] = b'f';
        let (status, decoded) = DirEntryData::decode(&with_marker).unwrap();
        assert_eq!(status, b'f');
        assert_eq!(decoded.name, "foo.txt");
        assert_eq!(decoded.size, 42);
        assert_eq!(decoded.first_block, 7);
    }

    #[test]
    fn valid_filename_rejects_bad_chars() {
        assert!(valid_filename("a.b-c_1"));
        assert!(!valid_filename("has space"));
        assert!(!valid_filename(""));
        assert!(!valid_filename(&"x".repeat(32)));
    }
}
