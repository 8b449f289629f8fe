//! Range-cover codec: dyadic labels over the 64-bit timestamp space
//!
//! A label names a node of a depth-64 binary trie. Level 0 nodes are single
//! values; a node at level `i` covers the `2^i` values sharing its prefix.
//!
//! Records are tagged with every ancestor of their timestamp
//! ([`insertion_labels`]); queries send the minimal set of nodes that tile
//! the requested interval ([`range_cover`]). A value lies in `[a, b]` iff
//! exactly one of its ancestors is in the cover.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::Dimension;
use crate::{Error, Result};

/// Number of trie levels (and insertion labels per value)
pub const LEVELS: u8 = 64;

/// A node of the dyadic trie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexLabel {
    /// Trie level, 0 (leaf) ..= 63
    pub level: u8,
    /// The value's bits above `level`, shifted into the low bits
    pub prefix: u64,
}

impl IndexLabel {
    pub fn new(level: u8, prefix: u64) -> Self {
        debug_assert!(level < LEVELS);
        Self { level, prefix }
    }

    /// First value covered by this node
    pub fn start(&self) -> u64 {
        self.prefix << self.level
    }

    /// Last value covered by this node (inclusive)
    pub fn end(&self) -> u64 {
        let span_minus_one = (1u64 << self.level) - 1;
        self.start() | span_minus_one
    }

    /// Whether `value` falls under this node
    pub fn covers(&self, value: u64) -> bool {
        value >> self.level == self.prefix
    }

    /// Build the index keyword for a field value under this label
    ///
    /// Format: `<dimension>:<value>:<LL>/<prefix:016x>`. The label suffix has
    /// a fixed width of 19 bytes, so a keyword parses unambiguously from the
    /// right even when `value` contains `:`.
    pub fn keyword(&self, dimension: Dimension, value: &str) -> Vec<u8> {
        format!("{}:{}:{}", dimension, value, self).into_bytes()
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:016x}", self.level, self.prefix)
    }
}

/// Every ancestor of `value`, from the leaf (level 0) to the root level 63
pub fn insertion_labels(value: u64) -> Vec<IndexLabel> {
    (0..LEVELS)
        .map(|level| IndexLabel::new(level, value >> level))
        .collect()
}

/// Minimal canonical set of trie nodes whose union is exactly `[start, end]`
///
/// Greedily peels the largest aligned power-of-two block starting at the
/// current lower bound that still fits. Output is ordered by position, has
/// no duplicates and holds at most `2 * 64` labels.
pub fn range_cover(start: u64, end: u64) -> Result<Vec<IndexLabel>> {
    if start > end {
        return Err(Error::InvalidRange { start, end });
    }

    // u128 so that `end + 1` and block arithmetic never overflow at u64::MAX
    let mut lo = start as u128;
    let hi = end as u128 + 1;
    let mut labels = Vec::new();

    while lo < hi {
        let mut level = if lo == 0 {
            LEVELS as u32 - 1
        } else {
            lo.trailing_zeros().min(LEVELS as u32 - 1)
        };
        while lo + (1u128 << level) > hi {
            level -= 1;
        }
        labels.push(IndexLabel::new(level as u8, (lo >> level) as u64));
        lo += 1u128 << level;
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matches(cover: &[IndexLabel], value: u64) -> usize {
        let ancestors = insertion_labels(value);
        cover.iter().filter(|l| ancestors.contains(l)).count()
    }

    #[test]
    fn test_insertion_labels_are_ancestors() {
        let value = 0b1011_0110u64;
        let labels = insertion_labels(value);

        assert_eq!(labels.len(), 64);
        assert_eq!(labels[0], IndexLabel::new(0, value));
        assert_eq!(labels[3], IndexLabel::new(3, 0b1_0110));
        assert_eq!(labels[63], IndexLabel::new(63, 0));
        assert!(labels.iter().all(|l| l.covers(value)));
    }

    #[test]
    fn test_aligned_block_is_one_label() {
        for k in 0..20u8 {
            let start = 5u64 << k;
            let end = start + (1u64 << k) - 1;
            let cover = range_cover(start, end).unwrap();
            assert_eq!(cover, vec![IndexLabel::new(k, 5)], "k = {}", k);
        }
    }

    #[test]
    fn test_single_value() {
        assert_eq!(range_cover(42, 42).unwrap(), vec![IndexLabel::new(0, 42)]);
    }

    #[test]
    fn test_known_decomposition() {
        // [3, 12] = {3} + [4,7] + [8,11] + {12}
        let cover = range_cover(3, 12).unwrap();
        assert_eq!(
            cover,
            vec![
                IndexLabel::new(0, 3),
                IndexLabel::new(2, 1),
                IndexLabel::new(2, 2),
                IndexLabel::new(0, 12),
            ]
        );
    }

    #[test]
    fn test_full_domain() {
        let cover = range_cover(0, u64::MAX).unwrap();
        assert_eq!(cover, vec![IndexLabel::new(63, 0), IndexLabel::new(63, 1)]);
    }

    #[test]
    fn test_worst_case_size() {
        let cover = range_cover(1, u64::MAX - 1).unwrap();
        assert!(cover.len() <= 2 * LEVELS as usize);
        assert_eq!(cover.first().unwrap().start(), 1);
        assert_eq!(cover.last().unwrap().end(), u64::MAX - 1);
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(matches!(
            range_cover(10, 9),
            Err(Error::InvalidRange { start: 10, end: 9 })
        ));
    }

    #[test]
    fn test_exhaustive_small_domain() {
        for a in 0..64u64 {
            for b in a..64 {
                let cover = range_cover(a, b).unwrap();
                for v in 0..80u64 {
                    let expected = usize::from(a <= v && v <= b);
                    assert_eq!(matches(&cover, v), expected, "[{}, {}] v={}", a, b, v);
                }
            }
        }
    }

    #[test]
    fn test_keyword_format() {
        let label = IndexLabel::new(7, 0xabc);
        assert_eq!(
            label.keyword(Dimension::B, "loc:1"),
            b"B:loc:1:07/0000000000000abc".to_vec()
        );
    }

    proptest! {
        #[test]
        fn prop_cover_matches_exactly_members(
            a in 0u64..(1 << 20),
            len in 0u64..(1 << 12),
            v in 0u64..(1 << 21),
        ) {
            let b = a + len;
            let cover = range_cover(a, b).unwrap();
            let expected = usize::from(a <= v && v <= b);
            prop_assert_eq!(matches(&cover, v), expected);
        }

        #[test]
        fn prop_cover_tiles_range(a in any::<u64>(), b in any::<u64>()) {
            let (a, b) = if a <= b { (a, b) } else { (b, a) };
            let cover = range_cover(a, b).unwrap();
            prop_assert!(cover.len() <= 2 * LEVELS as usize);
            prop_assert_eq!(cover.first().unwrap().start(), a);
            prop_assert_eq!(cover.last().unwrap().end(), b);
            for pair in cover.windows(2) {
                prop_assert_eq!(pair[0].end() + 1, pair[1].start());
            }
        }
    }
}
