//! Length-class file format
//!
//! Each length class L of a store lives in its own file `<stem>.<L>`:
//! ```text
//! +--------------------------------------+
//! | MasterIndex: 65536 x 3-byte counts   |  (big-endian, one per bucket)
//! +--------------------------------------+
//! | Bucket 0 entries                     |
//! | Bucket 1 entries                     |
//! | ...                                  |
//! +--------------------------------------+
//! ```
//!
//! Entry format:
//! ```text
//! | Key (2^L bytes, NUL-padded) | Value (value_width bytes) |
//! ```
//! Entries are sorted by bucket, then key bytes, then value bytes, so every
//! value of a key sits in one contiguous run.

use std::borrow::Cow;
use std::io::Read;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::io::EntryRegion;
use crate::store::error::{StoreError, StoreResult};

/// Number of buckets per length-class file
pub const BUCKET_COUNT: usize = 1 << 16;

/// Bytes per MasterIndex count
pub const COUNT_WIDTH: usize = 3;

/// Size of the MasterIndex header in bytes
pub const MASTER_INDEX_LEN: u64 = (BUCKET_COUNT * COUNT_WIDTH) as u64;

/// Largest entry count a bucket can record
pub const MAX_BUCKET_ENTRIES: u32 = (1 << 24) - 1;

/// Largest length class (keys up to 4096 bytes)
pub const MAX_LENGTH_CLASS: u32 = 12;

/// Largest key length in bytes
pub const MAX_KEY_LEN: usize = 1 << MAX_LENGTH_CLASS;

/// Suffix of the temporary file used while rewriting a class file
pub const TEMP_SUFFIX: &str = "tmp";

/// Length class of a key: `ceil(log2(max(1, len)))`
pub fn length_class(key_len: usize) -> u32 {
    let n = key_len.max(1);
    usize::BITS - (n - 1).leading_zeros()
}

/// Padded key width of a length class
pub fn key_width(class: u32) -> usize {
    1usize << class
}

/// Printable form of a key for messages and logs
pub fn display_key(key: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(key)
}

/// Reject keys the padded format cannot represent
pub fn validate_key(key: &[u8]) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidArgument("empty key".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StoreError::InvalidArgument(format!(
            "key too long: {} bytes (max {})",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    if key.contains(&0) {
        return Err(StoreError::InvalidArgument(format!(
            "key contains NUL byte: {:?}",
            String::from_utf8_lossy(key)
        )));
    }
    Ok(())
}

/// NUL-pad a key to its class width
pub fn pad_key(key: &[u8]) -> Vec<u8> {
    let mut padded = key.to_vec();
    padded.resize(key_width(length_class(key.len())), 0);
    padded
}

/// Strip the NUL padding of a stored key
pub fn trim_key(padded: &[u8]) -> &[u8] {
    let end = padded.iter().position(|&b| b == 0).unwrap_or(padded.len());
    &padded[..end]
}

/// The four bytes a key's bucket is computed from
///
/// The key is split on `/` into non-empty components. With four or more
/// components the first bytes of the first, second, second-to-last and last
/// components are used. With fewer, the first byte of every component is
/// used and the remaining slots take the following bytes of the last
/// component. Missing bytes are 0.
pub fn representative_bytes(key: &[u8]) -> [u8; 4] {
    let mut parts: Vec<&[u8]> = key
        .split(|&b| b == b'/')
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        parts.push(key);
    }

    let mut out = [0u8; 4];
    let n = parts.len();
    if n >= 4 {
        out = [parts[0][0], parts[1][0], parts[n - 2][0], parts[n - 1][0]];
    } else {
        for (slot, part) in parts.iter().enumerate() {
            out[slot] = part.first().copied().unwrap_or(0);
        }
        for (slot, &b) in (n..4).zip(parts[n - 1].iter().skip(1)) {
            out[slot] = b;
        }
    }
    out
}

/// Bucket of a key: one nibble from each representative byte
pub fn bucket_of(key: &[u8]) -> u16 {
    representative_bytes(key)
        .iter()
        .fold(0u16, |acc, &b| (acc << 4) | u16::from(b & 0x0f))
}

/// Path of the class file `<stem>.<class>` in `dir`
pub fn class_path(dir: &Path, stem: &str, class: u32) -> PathBuf {
    dir.join(format!("{}.{}", stem, class))
}

/// Path of the temporary file used while rewriting `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Entry geometry of one class file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub key_width: usize,
    pub value_width: usize,
}

impl Layout {
    pub fn new(class: u32, value_width: usize) -> Self {
        Self {
            key_width: key_width(class),
            value_width,
        }
    }

    /// Bytes per entry
    pub fn stride(&self) -> usize {
        self.key_width + self.value_width
    }

    /// Entry region of a file holding `count` entries
    pub fn region(&self, count: usize) -> EntryRegion {
        EntryRegion {
            offset: MASTER_INDEX_LEN,
            stride: self.stride(),
            key_width: self.key_width,
            count,
        }
    }

    /// Expected file size for `count` entries
    pub fn file_size(&self, count: u64) -> u64 {
        MASTER_INDEX_LEN + count * self.stride() as u64
    }
}

/// Per-bucket entry counts with their prefix sums
#[derive(Debug, Clone)]
pub struct MasterIndex {
    counts: Vec<u32>,
    /// `starts[b]` is the index of bucket b's first entry; `starts[BUCKET_COUNT]` is the total
    starts: Vec<u64>,
}

impl MasterIndex {
    /// Build from per-bucket counts
    pub fn from_counts(counts: Vec<u32>) -> Self {
        debug_assert_eq!(counts.len(), BUCKET_COUNT);
        let mut starts = Vec::with_capacity(BUCKET_COUNT + 1);
        let mut total = 0u64;
        starts.push(0);
        for &c in &counts {
            total += u64::from(c);
            starts.push(total);
        }
        Self { counts, starts }
    }

    /// Parse the on-disk header
    pub fn decode(buf: &[u8]) -> Self {
        let counts = buf
            .chunks_exact(COUNT_WIDTH)
            .take(BUCKET_COUNT)
            .map(|c| u32::from_be_bytes([0, c[0], c[1], c[2]]))
            .collect();
        Self::from_counts(counts)
    }

    /// Read the header from the start of a class file
    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut buf = vec![0u8; MASTER_INDEX_LEN as usize];
        reader.read_exact(&mut buf)?;
        Ok(Self::decode(&buf))
    }

    /// Serialize to the on-disk header
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MASTER_INDEX_LEN as usize);
        for &c in &self.counts {
            buf.extend_from_slice(&c.to_be_bytes()[1..]);
        }
        buf
    }

    pub fn count(&self, bucket: u16) -> u32 {
        self.counts[bucket as usize]
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Total number of entries
    pub fn total(&self) -> u64 {
        self.starts[BUCKET_COUNT]
    }

    /// Global entry indices of a bucket
    pub fn bucket_range(&self, bucket: u16) -> Range<usize> {
        let b = bucket as usize;
        self.starts[b] as usize..self.starts[b + 1] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_class() {
        assert_eq!(length_class(0), 0);
        assert_eq!(length_class(1), 0);
        assert_eq!(length_class(2), 1);
        assert_eq!(length_class(3), 2);
        assert_eq!(length_class(4), 2);
        assert_eq!(length_class(5), 3);
        assert_eq!(length_class(8), 3);
        assert_eq!(length_class(9), 4);
        assert_eq!(length_class(4096), 12);
        assert_eq!(key_width(3), 8);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key(b"usr/bin/ls").is_ok());
        assert!(validate_key(b"").is_err());
        assert!(validate_key(b"a\0b").is_err());
        assert!(validate_key(&vec![b'x'; MAX_KEY_LEN]).is_ok());
        assert!(validate_key(&vec![b'x'; MAX_KEY_LEN + 1]).is_err());
    }

    #[test]
    fn test_key_messages() {
        let err = validate_key(b"lib\0x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: key contains NUL byte: \"lib\\0x\""
        );
        assert_eq!(display_key(b"usr/bin/ls"), "usr/bin/ls");
        assert_eq!(display_key(&[b'a', 0xff]), "a\u{fffd}");
    }

    #[test]
    fn test_pad_and_trim() {
        let padded = pad_key(b"abc");
        assert_eq!(padded, b"abc\0");
        assert_eq!(trim_key(&padded), b"abc");
        assert_eq!(pad_key(b"ab"), b"ab");
        assert_eq!(trim_key(b"ab"), b"ab");
    }

    #[test]
    fn test_representative_bytes() {
        assert_eq!(representative_bytes(b"b"), [b'b', 0, 0, 0]);
        assert_eq!(representative_bytes(b"hello"), *b"hell");
        assert_eq!(representative_bytes(b"usr/bin"), [b'u', b'b', b'i', b'n']);
        assert_eq!(representative_bytes(b"usr/bin/ls"), [b'u', b'b', b'l', b's']);
        assert_eq!(representative_bytes(b"/usr/share/doc/pkg/README"), *b"uspR");
        assert_eq!(representative_bytes(b"a/b/c"), [b'a', b'b', b'c', 0]);
        assert_eq!(representative_bytes(b"///"), [b'/', b'/', b'/', 0]);
    }

    #[test]
    fn test_bucket_of() {
        // 'a' = 0x61, 'b' = 0x62
        assert_eq!(bucket_of(b"ab"), 0x1200);
        assert_eq!(bucket_of(b"aa"), 0x1100);
        // Keys sharing leading directories and file name stay together
        assert_eq!(
            bucket_of(b"usr/share/doc/pkg/README"),
            bucket_of(b"usr/share/man/pkg/README")
        );
    }

    #[test]
    fn test_master_index_roundtrip() {
        let mut counts = vec![0u32; BUCKET_COUNT];
        counts[0] = 3;
        counts[7] = MAX_BUCKET_ENTRIES;
        counts[BUCKET_COUNT - 1] = 1;
        let index = MasterIndex::from_counts(counts);

        let encoded = index.encode();
        assert_eq!(encoded.len() as u64, MASTER_INDEX_LEN);

        let decoded = MasterIndex::decode(&encoded);
        assert_eq!(decoded.count(7), MAX_BUCKET_ENTRIES);
        assert_eq!(decoded.total(), 3 + u64::from(MAX_BUCKET_ENTRIES) + 1);
        assert_eq!(decoded.bucket_range(0), 0..3);
        assert_eq!(decoded.bucket_range(1), 3..3);
        assert_eq!(
            decoded.bucket_range(u16::MAX),
            decoded.total() as usize - 1..decoded.total() as usize
        );
    }

    #[test]
    fn test_temp_path() {
        let path = class_path(Path::new("/db"), "priv_file_id", 4);
        assert_eq!(path, PathBuf::from("/db/priv_file_id.4"));
        assert_eq!(temp_path(&path), PathBuf::from("/db/priv_file_id.4.tmp"));
    }
}
