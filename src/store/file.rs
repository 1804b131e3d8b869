//! Read access to one length-class file

use std::cmp::Ordering;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::io::{detect_lb_block_size, BlockCache, IoError};
use crate::search::{multi_key_search, SearchHit, SortedSeq};
use crate::store::error::{StoreError, StoreResult};
use crate::store::format::{Layout, MasterIndex, MASTER_INDEX_LEN};

/// An open class file: its MasterIndex plus a block cache over the entries
pub(crate) struct ClassFile {
    path: PathBuf,
    index: MasterIndex,
    cache: BlockCache<File>,
}

/// The padded keys of one bucket as a sorted sequence
struct BucketKeys<'a> {
    cache: &'a mut BlockCache<File>,
    base: usize,
}

impl SortedSeq<Vec<u8>> for BucketKeys<'_> {
    type Error = IoError;

    fn cmp_at(&mut self, index: usize, item: &Vec<u8>) -> Result<Ordering, IoError> {
        let key = self.cache.key_at(self.base + index)?;
        Ok(key.as_slice().cmp(item.as_slice()))
    }
}

impl ClassFile {
    /// Open a class file, `None` if it does not exist
    ///
    /// The file size must match the MasterIndex total exactly.
    pub fn open(path: &Path, layout: Layout, lb_block_size: Option<u32>) -> StoreResult<Option<Self>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let size = file.metadata()?.len();
        if size < MASTER_INDEX_LEN {
            return Err(StoreError::corrupt(
                path,
                format!("file too small for master index: {} bytes", size),
            ));
        }

        let index = MasterIndex::read_from(&mut file)?;
        let expected = layout.file_size(index.total());
        if size != expected {
            return Err(StoreError::corrupt(
                path,
                format!(
                    "master index records {} entries ({} bytes) but file has {} bytes",
                    index.total(),
                    expected,
                    size
                ),
            ));
        }

        let lb = lb_block_size.unwrap_or_else(|| detect_lb_block_size(path));
        let cache = BlockCache::new(file, layout.region(index.total() as usize), lb);

        Ok(Some(Self {
            path: path.to_path_buf(),
            index,
            cache,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &MasterIndex {
        &self.index
    }

    pub fn entry_at(&mut self, index: usize) -> StoreResult<(Vec<u8>, Vec<u8>)> {
        Ok(self.cache.entry_at(index)?)
    }

    /// Search sorted, distinct padded keys within one bucket
    ///
    /// Positions are global entry indices.
    pub fn search_bucket(
        &mut self,
        bucket: u16,
        needles: &[Vec<u8>],
    ) -> StoreResult<Vec<(usize, SearchHit)>> {
        let range = self.index.bucket_range(bucket);
        let mut keys = BucketKeys {
            cache: &mut self.cache,
            base: range.start,
        };
        let hits = multi_key_search(&mut keys, range.len(), needles)?;
        Ok(hits
            .into_iter()
            .map(|(i, outcome)| (i, outcome.shifted(range.start)))
            .collect())
    }

    /// Every entry index holding `key`, given one hit inside `bucket`
    pub fn run_around(&mut self, bucket: u16, hit: usize, key: &[u8]) -> StoreResult<Range<usize>> {
        let range = self.index.bucket_range(bucket);

        let mut start = hit;
        while start > range.start && self.cache.key_at(start - 1)? == key {
            start -= 1;
        }

        let mut end = hit + 1;
        while end < range.end && self.cache.key_at(end)? == key {
            end += 1;
        }

        Ok(start..end)
    }

    /// Values of a run of entries
    pub fn values(&mut self, run: Range<usize>) -> StoreResult<Vec<Vec<u8>>> {
        run.map(|i| self.cache.value_at(i).map_err(StoreError::from))
            .collect()
    }
}
