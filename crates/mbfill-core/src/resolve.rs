//! Work-index to owning-buffer resolution over a monotonic prefix table.
//!
//! This is the per-element step of every dispatch. It is kept free of any
//! device or threading concern so that backends only decide *where* it runs.

/// Location of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Index of the owning buffer.
    pub buffer: usize,
    /// Element offset inside that buffer.
    pub offset: u64,
}

/// Find the buffer that owns flattened work index `index`.
///
/// `offsets` is a prefix-sum table (`offsets[0] == 0`, non-decreasing, last
/// entry is the total). Returns the greatest `k` with
/// `offsets[k] <= index < offsets[k + 1]`, so an index sitting exactly on a
/// boundary belongs to the buffer that starts there, and zero-length buffers
/// are skipped. Indices at or past the total resolve to `None`.
#[inline]
pub fn resolve_owner(offsets: &[u64], index: u64) -> Option<Slot> {
    let total = *offsets.last()?;
    if index >= total {
        return None;
    }
    // First entry strictly greater than `index`; its predecessor owns it.
    let upper = offsets.partition_point(|&start| start <= index);
    let buffer = upper - 1;
    Some(Slot { buffer, offset: index - offsets[buffer] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_buffer() {
        let offsets = [0, 2];
        assert_eq!(resolve_owner(&offsets, 0), Some(Slot { buffer: 0, offset: 0 }));
        assert_eq!(resolve_owner(&offsets, 1), Some(Slot { buffer: 0, offset: 1 }));
        assert_eq!(resolve_owner(&offsets, 2), None);
    }

    #[test]
    fn test_boundary_resolves_to_next_buffer() {
        let offsets = [0, 5, 8];
        assert_eq!(resolve_owner(&offsets, 4), Some(Slot { buffer: 0, offset: 4 }));
        assert_eq!(resolve_owner(&offsets, 5), Some(Slot { buffer: 1, offset: 0 }));
        assert_eq!(resolve_owner(&offsets, 7), Some(Slot { buffer: 1, offset: 2 }));
    }

    #[test]
    fn test_zero_length_buffers_are_skipped() {
        // sizes {0, 5, 0, 0, 3}
        let offsets = [0, 0, 5, 5, 5, 8];
        assert_eq!(resolve_owner(&offsets, 0), Some(Slot { buffer: 1, offset: 0 }));
        assert_eq!(resolve_owner(&offsets, 5), Some(Slot { buffer: 4, offset: 0 }));
        assert_eq!(resolve_owner(&offsets, 8), None);
    }

    #[test]
    fn test_degenerate_tables() {
        assert_eq!(resolve_owner(&[], 0), None);
        assert_eq!(resolve_owner(&[0], 0), None);
        assert_eq!(resolve_owner(&[0, 0, 0], 0), None);
    }

    fn prefix(lengths: &[u64]) -> Vec<u64> {
        let mut out = vec![0];
        for &len in lengths {
            out.push(out[out.len() - 1] + len);
        }
        out
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn resolves_like_linear_scan(lengths in prop::collection::vec(0u64..40, 0..24)) {
            let offsets = prefix(&lengths);
            let total = offsets[offsets.len() - 1];
            let mut index = 0u64;
            for (buffer, &len) in lengths.iter().enumerate() {
                for offset in 0..len {
                    prop_assert_eq!(resolve_owner(&offsets, index), Some(Slot { buffer, offset }));
                    index += 1;
                }
            }
            prop_assert_eq!(index, total);
            prop_assert_eq!(resolve_owner(&offsets, total), None);
        }
    }
}
