use std::ops::Range;

use prolly_common::Address;
use serde::{Deserialize, Serialize};

use crate::{ChunkingStrategy, ValueChunking};

/// How a value is held by its leaf entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueRef {
    /// The value's bytes, stored in the leaf itself
    Inline(#[serde(with = "serde_bytes")] Vec<u8>),
    /// The value was split into chunks that live in the content store as
    /// raw blocks; concatenating them in order yields the value
    Chunked {
        /// Chunk addresses in value order
        chunks: Vec<Address>,
        /// Total length of the value in bytes
        length: u64,
    },
}

impl ValueRef {
    /// Length of the referenced value in bytes
    pub fn len(&self) -> u64 {
        match self {
            ValueRef::Inline(bytes) => bytes.len() as u64,
            ValueRef::Chunked { length, .. } => *length,
        }
    }

    /// Whether the referenced value is zero bytes long
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the value is stored in the leaf
    pub fn is_inline(&self) -> bool {
        matches!(self, ValueRef::Inline(_))
    }

    /// Addresses of the value's chunks (empty for inline values)
    pub fn chunks(&self) -> &[Address] {
        match self {
            ValueRef::Inline(_) => &[],
            ValueRef::Chunked { chunks, .. } => chunks,
        }
    }
}

const GEAR: [u64; 256] = gear_table();

// splitmix64, so the table is fixed across builds and platforms
const fn gear_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut state: u64 = 0;
    let mut index = 0;
    while index < 256 {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut mixed = state;
        mixed = (mixed ^ (mixed >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        mixed = (mixed ^ (mixed >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        table[index] = mixed ^ (mixed >> 31);
        index += 1;
    }
    table
}

/// Computes the cut points of a value according to [`ValueChunking`]
pub struct ValueChunker<'a> {
    chunking: &'a ValueChunking,
}

impl<'a> ValueChunker<'a> {
    /// Create a new [`ValueChunker`]
    pub fn new(chunking: &'a ValueChunking) -> Self {
        Self { chunking }
    }

    /// Whether `bytes` is small enough to stay inline
    pub fn is_inline(&self, bytes: &[u8]) -> bool {
        bytes.len() <= self.chunking.max_inline_value_size
    }

    /// Split `bytes` into contiguous, non-empty ranges that cover it entirely
    pub fn cut(&self, bytes: &[u8]) -> Vec<Range<usize>> {
        match self.chunking.chunking_strategy {
            ChunkingStrategy::Fixed => self.cut_fixed(bytes),
            ChunkingStrategy::ContentDefined => self.cut_content_defined(bytes),
        }
    }

    fn cut_fixed(&self, bytes: &[u8]) -> Vec<Range<usize>> {
        let step = self.chunking.avg_chunk_size.max(1);
        (0..bytes.len())
            .step_by(step)
            .map(|start| start..(start + step).min(bytes.len()))
            .collect()
    }

    fn cut_content_defined(&self, bytes: &[u8]) -> Vec<Range<usize>> {
        let minimum = self.chunking.min_chunk_size.max(1);
        let maximum = self.chunking.max_chunk_size.max(minimum);
        let bits = self.chunking.avg_chunk_size.max(1).ilog2();
        // High bits carry the longest window of the gear hash
        let mask = u64::MAX.checked_shl(64 - bits).unwrap_or(0);

        let mut ranges = Vec::new();
        let mut start = 0;
        let mut hash = 0u64;

        for (offset, byte) in bytes.iter().enumerate() {
            hash = (hash << 1).wrapping_add(GEAR[*byte as usize]);
            let size = offset + 1 - start;

            if (size >= minimum && hash & mask == 0) || size >= maximum {
                ranges.push(start..offset + 1);
                start = offset + 1;
                hash = 0;
            }
        }

        if start < bytes.len() {
            ranges.push(start..bytes.len());
        }

        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{RngCore, SeedableRng, rngs::StdRng};

    fn random_bytes(seed: u64, length: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; length];
        StdRng::seed_from_u64(seed).fill_bytes(&mut bytes);
        bytes
    }

    fn small_chunking(chunking_strategy: ChunkingStrategy) -> ValueChunking {
        ValueChunking {
            chunking_strategy,
            min_chunk_size: 64,
            avg_chunk_size: 256,
            max_chunk_size: 1024,
            max_inline_value_size: 32,
        }
    }

    #[test]
    fn it_cuts_fixed_size_chunks() {
        let chunking = ValueChunking {
            chunking_strategy: ChunkingStrategy::Fixed,
            min_chunk_size: 1,
            avg_chunk_size: 4,
            max_chunk_size: 4,
            max_inline_value_size: 0,
        };
        let chunker = ValueChunker::new(&chunking);

        assert_eq!(chunker.cut(&[0u8; 10]), vec![0..4, 4..8, 8..10]);
        assert!(chunker.cut(&[]).is_empty());
    }

    #[test]
    fn it_respects_chunk_size_bounds() {
        let chunking = small_chunking(ChunkingStrategy::ContentDefined);
        let chunker = ValueChunker::new(&chunking);
        let bytes = random_bytes(7, 64 * 1024);
        let ranges = chunker.cut(&bytes);

        assert!(ranges.len() > 1);
        assert_eq!(ranges.first().map(|range| range.start), Some(0));
        assert_eq!(ranges.last().map(|range| range.end), Some(bytes.len()));

        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for (index, range) in ranges.iter().enumerate() {
            assert!(range.len() <= 1024);
            if index + 1 < ranges.len() {
                assert!(range.len() >= 64);
            }
        }
    }

    #[test]
    fn it_keeps_cut_points_ahead_of_an_edit() {
        let chunking = small_chunking(ChunkingStrategy::ContentDefined);
        let chunker = ValueChunker::new(&chunking);
        let original = random_bytes(11, 32 * 1024);
        let mut edited = original.clone();
        let edit_at = 20 * 1024;
        edited[edit_at] ^= 0xff;

        let before: Vec<_> = chunker
            .cut(&original)
            .into_iter()
            .filter(|range| range.end <= edit_at)
            .collect();
        let after: Vec<_> = chunker
            .cut(&edited)
            .into_iter()
            .filter(|range| range.end <= edit_at)
            .collect();

        assert!(!before.is_empty());
        assert_eq!(before, after);
    }

    #[test]
    fn it_measures_values() {
        assert_eq!(ValueRef::Inline(b"abc".to_vec()).len(), 3);
        assert!(ValueRef::Inline(vec![]).is_empty());

        let chunked = ValueRef::Chunked {
            chunks: vec![Address::default()],
            length: 4096,
        };
        assert_eq!(chunked.len(), 4096);
        assert!(!chunked.is_inline());
        assert_eq!(chunked.chunks().len(), 1);
    }
}
