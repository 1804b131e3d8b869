//! Single-key and batched binary search over sorted sequences
//!
//! The store searches on-disk key runs whose reads can fail, so sequences are
//! abstracted behind [`SortedSeq`] with a fallible comparison. In-memory
//! slices implement it with [`Infallible`] errors.
//!
//! [`multi_key_search`] resolves M sorted needles against a haystack of size H
//! in O(log H + M) comparisons by narrowing the haystack bound for each half
//! of the needles around the midpoint needle's position.

use std::cmp::Ordering;
use std::convert::Infallible;

/// A sorted sequence that can compare the element at an index with an item
pub trait SortedSeq<T: ?Sized> {
    /// Error produced while reading an element
    type Error;

    /// Compare the element at `index` against `item`
    fn cmp_at(&mut self, index: usize, item: &T) -> Result<Ordering, Self::Error>;
}

impl<T: Ord> SortedSeq<T> for &[T] {
    type Error = Infallible;

    fn cmp_at(&mut self, index: usize, item: &T) -> Result<Ordering, Infallible> {
        Ok(self[index].cmp(item))
    }
}

/// Outcome of a single search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchHit {
    /// Element found at this index
    Found(usize),
    /// Element absent; it would be inserted at this index
    Missing(usize),
}

impl SearchHit {
    /// Index of the match or the insertion point
    pub fn position(self) -> usize {
        match self {
            SearchHit::Found(i) | SearchHit::Missing(i) => i,
        }
    }

    pub fn is_found(self) -> bool {
        matches!(self, SearchHit::Found(_))
    }

    /// Same hit with its position moved by `base`
    pub fn shifted(self, base: usize) -> Self {
        match self {
            SearchHit::Found(i) => SearchHit::Found(base + i),
            SearchHit::Missing(i) => SearchHit::Missing(base + i),
        }
    }

    /// Classic signed encoding: the index when found, otherwise the bitwise
    /// complement of the insertion point (always negative).
    pub fn to_signed(self) -> isize {
        match self {
            SearchHit::Found(i) => i as isize,
            SearchHit::Missing(i) => !(i as isize),
        }
    }

    /// Inverse of [`SearchHit::to_signed`]
    pub fn from_signed(value: isize) -> Self {
        if value >= 0 {
            SearchHit::Found(value as usize)
        } else {
            SearchHit::Missing(!value as usize)
        }
    }
}

/// Binary search for `item` within `seq[lo..hi]`
///
/// No duplicate collapsing: with equal elements any one of them may be
/// reported.
pub fn binary_search<T, S>(seq: &mut S, item: &T, lo: usize, hi: usize) -> Result<SearchHit, S::Error>
where
    T: ?Sized,
    S: SortedSeq<T> + ?Sized,
{
    let mut lo = lo;
    let mut hi = hi;

    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match seq.cmp_at(mid, item)? {
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
            Ordering::Equal => return Ok(SearchHit::Found(mid)),
        }
    }

    Ok(SearchHit::Missing(lo))
}

/// One pending unit of batched search work
#[derive(Debug, Clone, Copy)]
struct Pending {
    needle_lo: usize,
    needle_hi: usize,
    hay_lo: usize,
    hay_hi: usize,
}

/// Search every needle in a haystack of `hay_len` elements
///
/// `needles` must be sorted ascending and distinct. Returns one
/// `(needle_index, outcome)` per needle, in no particular order. Each outcome is
/// identical to what [`binary_search`] over the full haystack reports, up to
/// the choice among duplicate haystack elements.
pub fn multi_key_search<T, S>(
    haystack: &mut S,
    hay_len: usize,
    needles: &[T],
) -> Result<Vec<(usize, SearchHit)>, S::Error>
where
    S: SortedSeq<T> + ?Sized,
{
    let mut results = Vec::with_capacity(needles.len());
    if needles.is_empty() {
        return Ok(results);
    }

    // Right halves are pushed, left halves are processed in place, so the
    // stack never holds more than log2(M) entries.
    let mut stack = vec![Pending {
        needle_lo: 0,
        needle_hi: needles.len(),
        hay_lo: 0,
        hay_hi: hay_len,
    }];

    while let Some(mut work) = stack.pop() {
        while work.needle_hi - work.needle_lo > 1 {
            let mid = work.needle_lo + (work.needle_hi - work.needle_lo) / 2;
            let outcome = binary_search(haystack, &needles[mid], work.hay_lo, work.hay_hi)?;
            results.push((mid, outcome));

            let (left_hi, right_lo) = match outcome {
                SearchHit::Found(i) => (i, i + 1),
                SearchHit::Missing(i) => (i, i),
            };

            if mid + 1 < work.needle_hi {
                stack.push(Pending {
                    needle_lo: mid + 1,
                    needle_hi: work.needle_hi,
                    hay_lo: right_lo,
                    hay_hi: work.hay_hi,
                });
            }
            work.needle_hi = mid;
            work.hay_hi = left_hi;
        }

        if work.needle_hi - work.needle_lo == 1 {
            let outcome = binary_search(
                haystack,
                &needles[work.needle_lo],
                work.hay_lo,
                work.hay_hi,
            )?;
            results.push((work.needle_lo, outcome));
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn search_slice(hay: &[u32], item: u32) -> SearchHit {
        let mut seq = hay;
        binary_search(&mut seq, &item, 0, hay.len()).unwrap()
    }

    #[test]
    fn test_binary_search_found_and_missing() {
        let hay = [2u32, 4, 6, 8];
        assert_eq!(search_slice(&hay, 6), SearchHit::Found(2));
        assert_eq!(search_slice(&hay, 1), SearchHit::Missing(0));
        assert_eq!(search_slice(&hay, 5), SearchHit::Missing(2));
        assert_eq!(search_slice(&hay, 9), SearchHit::Missing(4));
    }

    #[test]
    fn test_binary_search_empty_range() {
        let hay: [u32; 0] = [];
        assert_eq!(search_slice(&hay, 3), SearchHit::Missing(0));

        let hay = [1u32, 2, 3];
        let mut seq: &[u32] = &hay;
        assert_eq!(binary_search(&mut seq, &3, 1, 1).unwrap(), SearchHit::Missing(1));
    }

    #[test]
    fn test_signed_encoding() {
        assert_eq!(SearchHit::Found(3).to_signed(), 3);
        assert_eq!(SearchHit::Missing(0).to_signed(), -1);
        assert_eq!(SearchHit::Missing(5).to_signed(), !5);
        assert!(SearchHit::Missing(5).to_signed() < 0);
        assert_eq!(SearchHit::from_signed(!5), SearchHit::Missing(5));
        assert_eq!(SearchHit::from_signed(7), SearchHit::Found(7));
    }

    #[test]
    fn test_multi_key_search_small() {
        let hay = [10u32, 20, 30, 40, 50];
        let needles = [5u32, 20, 35, 50, 60];
        let mut seq: &[u32] = &hay;

        let mut results = multi_key_search(&mut seq, hay.len(), &needles).unwrap();
        results.sort_by_key(|(i, _)| *i);

        let hits: Vec<SearchHit> = results.into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            hits,
            vec![
                SearchHit::Missing(0),
                SearchHit::Found(1),
                SearchHit::Missing(3),
                SearchHit::Found(4),
                SearchHit::Missing(5),
            ]
        );
    }

    #[test]
    fn test_multi_key_search_empty_inputs() {
        let hay = [1u32, 2, 3];
        let mut seq: &[u32] = &hay;
        assert!(multi_key_search(&mut seq, hay.len(), &[] as &[u32])
            .unwrap()
            .is_empty());

        let empty: [u32; 0] = [];
        let mut seq: &[u32] = &empty;
        let results = multi_key_search(&mut seq, 0, &[1u32, 2]).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, p)| *p == SearchHit::Missing(0)));
    }

    #[test]
    fn test_multi_key_search_duplicates_in_haystack() {
        let hay = [1u32, 3, 3, 3, 5, 7];
        let needles = [0u32, 3, 4, 7];
        let mut seq: &[u32] = &hay;

        let results = multi_key_search(&mut seq, hay.len(), &needles).unwrap();
        for (i, outcome) in results {
            match needles[i] {
                3 => match outcome {
                    SearchHit::Found(j) => assert_eq!(hay[j], 3),
                    other => panic!("expected a match for 3, got {:?}", other),
                },
                0 => assert_eq!(outcome, SearchHit::Missing(0)),
                4 => assert_eq!(outcome, SearchHit::Missing(4)),
                7 => assert_eq!(outcome, SearchHit::Found(5)),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn test_multi_key_search_matches_single_search_randomized() {
        let mut rng = rand::thread_rng();

        for round in 0..40 {
            let hay_len = if round == 0 { 10_000 } else { rng.gen_range(0..10_000) };
            let mut hay: Vec<u32> = (0..hay_len).map(|_| rng.gen_range(0..50_000)).collect();
            hay.sort_unstable();
            hay.dedup();

            let needle_len = rng.gen_range(1..2_000);
            let mut needles: Vec<u32> = (0..needle_len).map(|_| rng.gen_range(0..50_000)).collect();
            needles.sort_unstable();
            needles.dedup();

            let mut seq: &[u32] = &hay;
            let results = multi_key_search(&mut seq, hay.len(), &needles).unwrap();
            assert_eq!(results.len(), needles.len());

            let mut seen = vec![false; needles.len()];
            for (i, outcome) in results {
                assert!(!seen[i], "needle {} reported twice", i);
                seen[i] = true;
                assert_eq!(outcome, search_slice(&hay, needles[i]), "needle {}", needles[i]);
            }
        }
    }
}
