//! Single-slot block cache over a seekable stream
//!
//! Entries are fixed-stride records starting at a region offset:
//! ```text
//! offset + i * stride               -> key   (key_width bytes)
//! offset + i * stride + key_width   -> value (stride - key_width bytes)
//! ```
//! The cache holds exactly one block of `2^lb_block_size` bytes whose start is
//! a multiple of the block size. A read outside that block replaces it.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::error::{IoError, IoResult};

/// Fallback block size exponent (8KB) when the filesystem does not report one
pub const DEFAULT_LB_BLOCK_SIZE: u32 = 13;

/// Largest block size exponent accepted from the filesystem (1MB)
const MAX_LB_BLOCK_SIZE: u32 = 20;

/// Smallest block size exponent accepted from the filesystem (512B)
const MIN_LB_BLOCK_SIZE: u32 = 9;

/// Detect the block size exponent of the filesystem holding `path`
#[cfg(unix)]
pub fn detect_lb_block_size(path: &Path) -> u32 {
    use std::os::unix::fs::MetadataExt;

    match std::fs::metadata(path) {
        Ok(meta) if meta.blksize().is_power_of_two() => meta
            .blksize()
            .trailing_zeros()
            .clamp(MIN_LB_BLOCK_SIZE, MAX_LB_BLOCK_SIZE),
        _ => DEFAULT_LB_BLOCK_SIZE,
    }
}

/// Detect the block size exponent of the filesystem holding `path`
#[cfg(not(unix))]
pub fn detect_lb_block_size(_path: &Path) -> u32 {
    DEFAULT_LB_BLOCK_SIZE
}

/// Layout of the fixed-stride entry region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRegion {
    /// Byte offset of entry 0
    pub offset: u64,
    /// Bytes per entry (key width + value width)
    pub stride: usize,
    /// Bytes of key at the start of each entry
    pub key_width: usize,
    /// Number of entries
    pub count: usize,
}

impl EntryRegion {
    /// Bytes of value following each key
    pub fn value_width(&self) -> usize {
        self.stride - self.key_width
    }

    /// Byte position of entry `index`
    pub fn position(&self, index: usize) -> u64 {
        self.offset + (index as u64) * (self.stride as u64)
    }
}

/// Cached reader of fixed-stride entries
///
/// Not thread-safe; use one instance per reader.
pub struct BlockCache<R> {
    inner: R,
    region: EntryRegion,
    block_size: usize,
    block: Vec<u8>,
    /// Start of the cached block, `None` before the first read
    block_start: Option<u64>,
    /// Valid bytes in `block` (short at end of stream)
    block_len: usize,
    reloads: u64,
}

impl<R: Read + Seek> BlockCache<R> {
    /// Create a cache of `2^lb_block_size` bytes over `inner`
    pub fn new(inner: R, region: EntryRegion, lb_block_size: u32) -> Self {
        let block_size = 1usize << lb_block_size;
        Self {
            inner,
            region,
            block_size,
            block: vec![0u8; block_size],
            block_start: None,
            block_len: 0,
            reloads: 0,
        }
    }

    /// Entry region served by this cache
    pub fn region(&self) -> &EntryRegion {
        &self.region
    }

    /// Number of entries in the region
    pub fn len(&self) -> usize {
        self.region.count
    }

    pub fn is_empty(&self) -> bool {
        self.region.count == 0
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of block reads performed so far
    pub fn reloads(&self) -> u64 {
        self.reloads
    }

    /// Key bytes of entry `index` (still NUL-padded)
    pub fn key_at(&mut self, index: usize) -> IoResult<Vec<u8>> {
        self.check(index)?;
        let pos = self.region.position(index);
        let mut buf = vec![0u8; self.region.key_width];
        self.read_exact_at(pos, &mut buf)?;
        Ok(buf)
    }

    /// Value bytes of entry `index`
    pub fn value_at(&mut self, index: usize) -> IoResult<Vec<u8>> {
        self.check(index)?;
        let pos = self.region.position(index) + self.region.key_width as u64;
        let mut buf = vec![0u8; self.region.value_width()];
        self.read_exact_at(pos, &mut buf)?;
        Ok(buf)
    }

    /// Key and value bytes of entry `index`
    pub fn entry_at(&mut self, index: usize) -> IoResult<(Vec<u8>, Vec<u8>)> {
        self.check(index)?;
        let pos = self.region.position(index);
        let mut buf = vec![0u8; self.region.stride];
        self.read_exact_at(pos, &mut buf)?;
        let value = buf.split_off(self.region.key_width);
        Ok((buf, value))
    }

    fn check(&self, index: usize) -> IoResult<()> {
        if index >= self.region.count {
            return Err(IoError::OutOfRange {
                index,
                count: self.region.count,
            });
        }
        Ok(())
    }

    /// Fill `out` with the bytes at `pos`, crossing blocks as needed
    fn read_exact_at(&mut self, pos: u64, out: &mut [u8]) -> IoResult<()> {
        let mut filled = 0;
        while filled < out.len() {
            let at = pos + filled as u64;
            self.load_block(at)?;

            let start = self.block_start.unwrap_or(0);
            let in_block = (at - start) as usize;
            if in_block >= self.block_len {
                return Err(IoError::ShortRead {
                    offset: pos,
                    expected: out.len(),
                    actual: filled,
                });
            }

            let n = (self.block_len - in_block).min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&self.block[in_block..in_block + n]);
            filled += n;
        }
        Ok(())
    }

    /// Make sure the block containing `pos` is cached
    fn load_block(&mut self, pos: u64) -> IoResult<()> {
        let size = self.block_size as u64;
        let start = pos - pos % size;
        if self.block_start == Some(start) {
            return Ok(());
        }

        self.inner.seek(SeekFrom::Start(start))?;
        let mut len = 0;
        while len < self.block_size {
            match self.inner.read(&mut self.block[len..]) {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.block_start = None;
                    return Err(e.into());
                }
            }
        }

        self.block_start = Some(start);
        self.block_len = len;
        self.reloads += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// 8-byte entries: 4-byte key "kNNN", 4-byte big-endian value
    fn fixture(count: usize, header: usize) -> (Vec<u8>, EntryRegion) {
        let mut data = vec![0xAAu8; header];
        for i in 0..count {
            data.extend_from_slice(format!("k{:03}", i).as_bytes());
            data.extend_from_slice(&(i as u32).to_be_bytes());
        }
        let region = EntryRegion {
            offset: header as u64,
            stride: 8,
            key_width: 4,
            count,
        };
        (data, region)
    }

    #[test]
    fn test_key_and_value_at() {
        let (data, region) = fixture(100, 16);
        let mut cache = BlockCache::new(Cursor::new(data), region, 9);

        assert_eq!(cache.key_at(0).unwrap(), b"k000");
        assert_eq!(cache.value_at(0).unwrap(), 0u32.to_be_bytes());
        assert_eq!(cache.key_at(42).unwrap(), b"k042");
        assert_eq!(cache.value_at(99).unwrap(), 99u32.to_be_bytes());

        let (key, value) = cache.entry_at(7).unwrap();
        assert_eq!(key, b"k007");
        assert_eq!(value, 7u32.to_be_bytes());
    }

    #[test]
    fn test_single_reload_per_block() {
        let (data, region) = fixture(256, 0);
        let mut cache = BlockCache::new(Cursor::new(data), region, 9);

        // 512-byte blocks hold 64 entries each
        for i in 0..64 {
            cache.key_at(i).unwrap();
        }
        assert_eq!(cache.reloads(), 1);

        cache.key_at(64).unwrap();
        assert_eq!(cache.reloads(), 2);

        // Returning to the first block re-reads it exactly once
        cache.value_at(3).unwrap();
        cache.value_at(5).unwrap();
        assert_eq!(cache.reloads(), 3);
    }

    #[test]
    fn test_entry_straddling_blocks() {
        // A 3-byte header shifts entries off block boundaries
        let (data, region) = fixture(200, 3);
        let mut cache = BlockCache::new(Cursor::new(data), region, 9);

        // Entry 63 spans bytes 507..515
        let (key, value) = cache.entry_at(63).unwrap();
        assert_eq!(key, b"k063");
        assert_eq!(value, 63u32.to_be_bytes());
    }

    #[test]
    fn test_out_of_range() {
        let (data, region) = fixture(4, 0);
        let mut cache = BlockCache::new(Cursor::new(data), region, 9);
        assert!(matches!(
            cache.key_at(4),
            Err(IoError::OutOfRange { index: 4, count: 4 })
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let (mut data, region) = fixture(10, 0);
        data.truncate(75);
        let mut cache = BlockCache::new(Cursor::new(data), region, 9);

        assert_eq!(cache.key_at(8).unwrap(), b"k008");
        assert!(matches!(cache.value_at(9), Err(IoError::ShortRead { .. })));
    }

    #[test]
    fn test_detect_falls_back() {
        let lb = detect_lb_block_size(Path::new("/definitely/not/a/real/path"));
        assert_eq!(lb, DEFAULT_LB_BLOCK_SIZE);

        let dir = tempfile::tempdir().unwrap();
        let lb = detect_lb_block_size(dir.path());
        assert!((MIN_LB_BLOCK_SIZE..=MAX_LB_BLOCK_SIZE).contains(&lb));
    }
}
