//! Whole-file writes for class files
//!
//! Every mutation produces a complete new class file. The new image is
//! written next to the target and renamed over it only once complete, so a
//! crash leaves either the old or the new file:
//! 1. Write `<file>.tmp`
//! 2. fsync it (when syncing is enabled)
//! 3. Rename to the final path
//! 4. fsync the directory

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::store::error::{StoreError, StoreResult};
use crate::store::format::{
    temp_path, Layout, MasterIndex, BUCKET_COUNT, MASTER_INDEX_LEN, MAX_BUCKET_ENTRIES,
};

/// Buffer size for streaming copies (1MB)
const COPY_BUFFER_SIZE: usize = 1 << 20;

/// One entry ready to be written: bucket, padded key, value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Prepared {
    pub bucket: u16,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// One edit of a rewrite pass
///
/// At old entry index `index`, write `entries` and then drop `remove` old
/// entries. All entries belong to `bucket`.
#[derive(Debug, Clone)]
pub(crate) struct Splice {
    pub index: usize,
    pub remove: usize,
    pub bucket: u16,
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Splice {
    pub fn insert(index: usize, bucket: u16, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            index,
            remove: 0,
            bucket,
            entries,
        }
    }

    pub fn replace(
        index: usize,
        remove: usize,
        bucket: u16,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Self {
        Self {
            index,
            remove,
            bucket,
            entries,
        }
    }
}

/// Write a complete new image of `target` through `fill`, then rename it
/// into place. On failure the temporary file is removed and `target` is left
/// as it was.
fn replace_file<F>(target: &Path, sync: bool, fill: F) -> StoreResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> StoreResult<()>,
{
    let temp = temp_path(target);

    let written: StoreResult<()> = (|| {
        let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, File::create(&temp)?);
        fill(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        if sync {
            file.sync_all()?;
        }
        Ok(())
    })();

    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp);
        return Err(e);
    }

    std::fs::rename(&temp, target)?;

    #[cfg(unix)]
    if sync {
        if let Some(dir) = target.parent() {
            if let Ok(dir) = File::open(dir) {
                let _ = dir.sync_all();
            }
        }
    }

    Ok(())
}

fn check_counts(path: &Path, counts: &[u64]) -> StoreResult<Vec<u32>> {
    counts
        .iter()
        .enumerate()
        .map(|(bucket, &c)| {
            u32::try_from(c)
                .ok()
                .filter(|&c| c <= MAX_BUCKET_ENTRIES)
                .ok_or_else(|| {
                    StoreError::InvalidArgument(format!(
                        "bucket {:#06x} of {} would hold {} entries (max {})",
                        bucket,
                        path.display(),
                        c,
                        MAX_BUCKET_ENTRIES
                    ))
                })
        })
        .collect()
}

/// Write a fresh class file from entries sorted by (bucket, key, value)
pub(crate) fn write_sorted(
    path: &Path,
    layout: Layout,
    entries: &[Prepared],
    sync: bool,
) -> StoreResult<MasterIndex> {
    debug_assert!(entries.windows(2).all(|w| w[0] <= w[1]));

    let mut counts = vec![0u64; BUCKET_COUNT];
    for e in entries {
        counts[e.bucket as usize] += 1;
    }
    let index = MasterIndex::from_counts(check_counts(path, &counts)?);

    replace_file(path, sync, |writer| {
        writer.write_all(&index.encode())?;
        for e in entries {
            debug_assert_eq!(e.key.len(), layout.key_width);
            debug_assert_eq!(e.value.len(), layout.value_width);
            writer.write_all(&e.key)?;
            writer.write_all(&e.value)?;
        }
        Ok(())
    })?;

    tracing::debug!(path = %path.display(), entries = entries.len(), "wrote class file");
    Ok(index)
}

/// Rewrite an existing class file in one linear pass applying `splices`
///
/// Unchanged byte ranges are copied verbatim; the MasterIndex is patched with
/// the per-bucket added and removed counts before the entries are streamed.
pub(crate) fn apply_splices(
    path: &Path,
    layout: Layout,
    index: &MasterIndex,
    mut splices: Vec<Splice>,
    sync: bool,
) -> StoreResult<MasterIndex> {
    splices.sort_by(|a, b| {
        a.index
            .cmp(&b.index)
            .then_with(|| a.bucket.cmp(&b.bucket))
            .then_with(|| a.remove.cmp(&b.remove))
            .then_with(|| a.entries.first().cmp(&b.entries.first()))
    });

    let total = index.total() as usize;

    // Added and removed are tracked apart: one splice can do both
    let mut changes: BTreeMap<u16, (u64, u64)> = BTreeMap::new();
    let mut cursor = 0usize;
    for s in &splices {
        if s.index < cursor || s.index + s.remove > total {
            return Err(StoreError::corrupt(
                path,
                format!(
                    "splice at entry {} (+{} -{}) overlaps a previous edit or the end of file ({} entries)",
                    s.index,
                    s.entries.len(),
                    s.remove,
                    total
                ),
            ));
        }
        cursor = s.index + s.remove;

        let change = changes.entry(s.bucket).or_default();
        change.0 += s.entries.len() as u64;
        change.1 += s.remove as u64;
    }

    let mut counts: Vec<u64> = index.counts().iter().map(|&c| u64::from(c)).collect();
    for (&bucket, &(added, removed)) in &changes {
        let current = counts[bucket as usize] + added;
        if removed > current {
            return Err(StoreError::corrupt(
                path,
                format!(
                    "bucket {:#06x} would lose {} entries but holds {}",
                    bucket, removed, current
                ),
            ));
        }
        counts[bucket as usize] = current - removed;
    }
    let new_index = MasterIndex::from_counts(check_counts(path, &counts)?);

    let stride = layout.stride() as u64;
    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, File::open(path)?);
    reader.seek(SeekFrom::Start(MASTER_INDEX_LEN))?;

    replace_file(path, sync, |writer| {
        writer.write_all(&new_index.encode())?;

        let mut cursor = 0usize;
        for s in &splices {
            copy_entries(path, &mut reader, writer, (s.index - cursor) as u64 * stride)?;
            for (key, value) in &s.entries {
                debug_assert_eq!(key.len(), layout.key_width);
                debug_assert_eq!(value.len(), layout.value_width);
                writer.write_all(key)?;
                writer.write_all(value)?;
            }
            if s.remove > 0 {
                reader.seek_relative(s.remove as i64 * stride as i64)?;
            }
            cursor = s.index + s.remove;
        }
        copy_entries(path, &mut reader, writer, (total - cursor) as u64 * stride)
    })?;

    tracing::debug!(
        path = %path.display(),
        splices = splices.len(),
        before = total,
        after = new_index.total(),
        "rewrote class file"
    );
    Ok(new_index)
}

/// Copy exactly `len` bytes from the old file into the new one
fn copy_entries<R: Read, W: Write>(
    path: &Path,
    reader: &mut R,
    writer: &mut W,
    len: u64,
) -> StoreResult<()> {
    if len == 0 {
        return Ok(());
    }
    let copied = std::io::copy(&mut Read::take(&mut *reader, len), writer)?;
    if copied != len {
        return Err(StoreError::corrupt(
            path,
            format!("expected {} more bytes of entries, found {}", len, copied),
        ));
    }
    Ok(())
}
