//! Chunk planner: splits `[0, total)` into dispatch-sized ranges.

use crate::{FillError, Result};

/// Half-open range `[start, end)` of flattened work indices handled by one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn contains(&self, index: u64) -> bool {
        self.start <= index && index < self.end
    }
}

/// Ordered, gap-free sequence of chunks covering `[0, total)`.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    next: u64,
    total: u64,
    ceiling: u64,
}

/// Plan the chunks for `total` work items with at most `ceiling` items each.
pub fn plan_chunks(total: u64, ceiling: u64) -> Result<ChunkPlan> {
    if ceiling == 0 {
        return Err(FillError::InvalidConfig(
            "maximum work per dispatch must be positive".into(),
        ));
    }
    Ok(ChunkPlan { next: 0, total, ceiling })
}

/// Ceiling actually used for a call: the configured value, clamped to what
/// the backend can address in one dispatch.
pub fn effective_ceiling(configured: u64, capacity: u64) -> u64 {
    configured.min(capacity)
}

impl ChunkPlan {
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next >= self.total {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.ceiling).min(self.total);
        self.next = end;
        Some(Chunk { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        let n = remaining.div_ceil(self.ceiling) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChunkPlan {}

impl std::iter::FusedIterator for ChunkPlan {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_total() {
        let plan = plan_chunks(0, 100).unwrap();
        assert_eq!(plan.len(), 0);
        assert_eq!(plan.count(), 0);
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        assert!(matches!(plan_chunks(10, 0), Err(FillError::InvalidConfig(_))));
    }

    #[test]
    fn test_single_chunk() {
        let chunks: Vec<_> = plan_chunks(8, 100).unwrap().collect();
        assert_eq!(chunks, vec![Chunk { start: 0, end: 8 }]);
    }

    #[test]
    fn test_remainder_chunk() {
        let chunks: Vec<_> = plan_chunks(250_000, 100_000).unwrap().collect();
        assert_eq!(
            chunks,
            vec![
                Chunk { start: 0, end: 100_000 },
                Chunk { start: 100_000, end: 200_000 },
                Chunk { start: 200_000, end: 250_000 },
            ]
        );
        assert_eq!(chunks[2].len(), 50_000);
        assert!(chunks[1].contains(100_000));
        assert!(!chunks[1].contains(200_000));
    }

    #[test]
    fn test_exact_multiple() {
        let plan = plan_chunks(300, 100).unwrap();
        assert_eq!(plan.len(), 3);
        let last = plan.last().unwrap();
        assert_eq!(last, Chunk { start: 200, end: 300 });
    }

    #[test]
    fn test_huge_ceiling_does_not_overflow() {
        let chunks: Vec<_> = plan_chunks(u64::MAX, u64::MAX - 1).unwrap().collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].end, u64::MAX);
    }

    #[test]
    fn test_effective_ceiling() {
        assert_eq!(effective_ceiling(1 << 30, 1 << 20), 1 << 20);
        assert_eq!(effective_ceiling(100, u64::MAX), 100);
    }

    proptest! {
        #[test]
        fn chunks_tile_the_range(total in 0u64..100_000, ceiling in 1u64..5_000) {
            let plan = plan_chunks(total, ceiling).unwrap();
            let expected = plan.len();
            let chunks: Vec<_> = plan.collect();
            prop_assert_eq!(chunks.len(), expected);
            let mut cursor = 0;
            for c in &chunks {
                prop_assert_eq!(c.start, cursor);
                prop_assert!(!c.is_empty());
                prop_assert!(c.len() <= ceiling);
                cursor = c.end;
            }
            prop_assert_eq!(cursor, total);
        }
    }
}
