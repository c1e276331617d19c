//! FAT allocator: free-block search, chain construction, chain deletion,
//! chain append-fill.
//!
//! Grounded on `examples/original_source/src/pennfat/fat.c` (`create_chain`
//! / `fill_chain` / `delete_chain`), adapted to return `Result` instead of
//! void functions plus a side-channel `ERRNO`.

use crate::device::{BlockDevice, FREE, LASTBLOCK};
use crate::error::{Error, ErrorKind, Result};

/// Scans FAT cells `[1, N)` for the first free (`0`) cell.
///
/// Returns `0` if none is free. Linear scan: acceptable for the small
/// filesystems this crate targets.
pub fn free_block_search(dev: &BlockDevice) -> u16 {
    let n = dev.cell_count();
    for i in 1..n as u16 {
        if dev.read_cell(i) == FREE {
            return i;
        }
    }
    0
}

/// Builds a fresh chain rooted at `head`, writing `buffer` into it.
///
/// Chains are built tail-first: the terminating cell is written (and
/// flushed) before its predecessor is linked, so no half-formed chain is
/// ever observable.
pub fn build_chain(dev: &mut BlockDevice, head: u16, buffer: &[u8]) -> Result<()> {
    let block_size = dev.block_size();
    if buffer.len() <= block_size {
        dev.write_cell(head, LASTBLOCK)?;
        dev.write_block(head, buffer)?;
        return Ok(());
    }

    let next = free_block_search(dev);
    if next == 0 {
        return Err(Error::new(ErrorKind::NoSpace));
    }
    build_chain(dev, next, &buffer[block_size..])?;
    dev.write_cell(head, next)?;
    dev.write_block(head, &buffer[..block_size])?;
    Ok(())
}

/// Appends into the tail of an existing chain rooted at `head`, whose
/// current logical length is `chain_bytes`. Writes as many of `buffer`'s
/// bytes as fit in the chain's current tail block and returns that count;
/// the caller is responsible for allocating and linking a new sub-chain for
/// any remainder (via `build_chain`).
pub fn fill_chain(dev: &mut BlockDevice, head: u16, chain_bytes: u64, buffer: &[u8]) -> Result<usize> {
    let block_size = dev.block_size();
    let mut block = head;
    loop {
        let next = dev.read_cell(block);
        if next == LASTBLOCK {
            break;
        }
        block = next;
    }

    let used_in_tail = (chain_bytes as usize) % block_size;
    let room = block_size - used_in_tail;
    let n = room.min(buffer.len());
    if n == 0 {
        return Ok(0);
    }

    let mut tail = vec![0u8; block_size];
    dev.read_block(block, &mut tail)?;
    tail.truncate(used_in_tail);
    tail.extend_from_slice(&buffer[..n]);
    dev.write_block(block, &tail)?;
    Ok(n)
}

/// Walks the chain rooted at `head` and returns its data blocks in order.
pub fn chain_blocks(dev: &BlockDevice, head: u16) -> Result<Vec<u16>> {
    let mut blocks = Vec::new();
    let mut cur = head;
    let n = dev.cell_count();
    loop {
        if cur == LASTBLOCK {
            break;
        }
        if cur < 2 || cur as u32 >= n || blocks.contains(&cur) {
            return Err(Error::new(ErrorKind::CorruptedFileSystem));
        }
        blocks.push(cur);
        cur = dev.read_cell(cur);
    }
    Ok(blocks)
}

/// Reads the full content of the chain rooted at `head`.
pub fn read_chain(dev: &mut BlockDevice, head: u16) -> Result<Vec<u8>> {
    if head == LASTBLOCK {
        return Ok(Vec::new());
    }
    let blocks = chain_blocks(dev, head)?;
    let block_size = dev.block_size();
    let mut out = Vec::with_capacity(blocks.len() * block_size);
    let mut buf = vec![0u8; block_size];
    for b in blocks {
        let n = dev.read_block(b, &mut buf)?;
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

/// Zeroes each cell along the chain rooted at `head`, flushing after each
/// write, freeing every block it occupied.
pub fn delete_chain(dev: &mut BlockDevice, head: u16) -> Result<()> {
    if head == LASTBLOCK {
        return Ok(());
    }
    let mut cur = head;
    loop {
        let next = dev.read_cell(cur);
        dev.write_cell(cur, FREE)?;
        if next == LASTBLOCK {
            break;
        }
        cur = next;
    }
    Ok(())
}

/// Rebuilds a chain in place with new content: deletes the old chain (if
/// any) and builds a fresh one rooted at `head`. Used by overwrite-mode
/// writes (`f_write`, `cat` in overwrite mode, `cp` into an in-image file).
pub fn rebuild_chain(dev: &mut BlockDevice, head: u16, content: &[u8]) -> Result<u16> {
    delete_chain(dev, head)?;
    if content.is_empty() {
        return Ok(LASTBLOCK);
    }
    let new_head = free_block_search(dev);
    if new_head == 0 {
        return Err(Error::new(ErrorKind::NoSpace));
    }
    build_chain(dev, new_head, content)?;
    Ok(new_head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BlockDevice;
    use tempfile::NamedTempFile;

    fn tmp_device(blocks_in_fat: u8, exp: u8) -> BlockDevice {
        let f = NamedTempFile::new().unwrap();
        BlockDevice::format(f.path(), blocks_in_fat, exp).unwrap()
    }

    #[test]
    fn free_search_finds_first_free() {
        let dev = tmp_device(1, 0);
        // cell 0 = meta, cell 1 = root dir (LASTBLOCK); first free is 2.
        assert_eq!(free_block_search(&dev), 2);
    }

    #[test]
    fn build_and_read_chain_single_block() {
        let mut dev = tmp_device(1, 0);
        let head = free_block_search(&dev);
        build_chain(&mut dev, head, b"hello").unwrap();
        let content = read_chain(&mut dev, head).unwrap();
        assert_eq!(&content[..5], b"hello");
    }

    #[test]
    fn build_chain_spans_multiple_blocks() {
        let mut dev = tmp_device(1, 0); // S = 256
        let head = free_block_search(&dev);
        let payload = vec![7u8; 256 + 5];
        build_chain(&mut dev, head, &payload).unwrap();
        let blocks = chain_blocks(&dev, head).unwrap();
        assert_eq!(blocks.len(), 2);
        let content = read_chain(&mut dev, head).unwrap();
        assert_eq!(&content[..256 + 5], &payload[..]);
    }

    #[test]
    fn delete_chain_frees_all_cells() {
        let mut dev = tmp_device(1, 0);
        let head = free_block_search(&dev);
        let payload = vec![1u8; 256 + 5];
        build_chain(&mut dev, head, &payload).unwrap();
        let blocks = chain_blocks(&dev, head).unwrap();
        delete_chain(&mut dev, head).unwrap();
        for b in blocks {
            assert_eq!(dev.read_cell(b), FREE);
        }
    }

    #[test]
    fn fill_chain_appends_into_tail_space() {
        let mut dev = tmp_device(1, 0); // S = 256
        let head = free_block_search(&dev);
        build_chain(&mut dev, head, b"ABC").unwrap();
        let written = fill_chain(&mut dev, head, 3, b"DEF").unwrap();
        assert_eq!(written, 3);
        let content = read_chain(&mut dev, head).unwrap();
        assert_eq!(&content[..6], b"ABCDEF");
    }
}
