//! Buffer descriptor builder: element counts folded into a prefix-sum table.

use crate::span::DeviceSpan;
use crate::{FillError, Result};

/// Prefix-sum view of one call's buffer set.
///
/// `offsets[k]` is the number of work items owned by buffers `0..k`, so the
/// table has `num_buffers() + 1` entries, starts at 0 and ends at `total()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    offsets: Vec<u64>,
}

impl BufferLayout {
    /// Validate the spans and build the prefix table.
    ///
    /// A null address is accepted only for a zero-length span.
    pub fn build<T>(bufs: &[DeviceSpan<T>]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(bufs.len() + 1);
        let mut running: u64 = 0;
        offsets.push(running);
        for (index, buf) in bufs.iter().enumerate() {
            if buf.is_null() && !buf.is_empty() {
                return Err(FillError::NullBuffer { index, len: buf.len() });
            }
            running = running
                .checked_add(buf.len() as u64)
                .ok_or(FillError::WorkOverflow { index })?;
            offsets.push(running);
        }
        Ok(Self { offsets })
    }

    /// Build directly from element counts.
    pub fn from_lengths(lengths: &[u64]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(lengths.len() + 1);
        let mut running: u64 = 0;
        offsets.push(running);
        for (index, &len) in lengths.iter().enumerate() {
            running = running
                .checked_add(len)
                .ok_or(FillError::WorkOverflow { index })?;
            offsets.push(running);
        }
        Ok(Self { offsets })
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn num_buffers(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of work items across all buffers.
    pub fn total(&self) -> u64 {
        self.offsets[self.offsets.len() - 1]
    }

    /// Element count of buffer `k`.
    pub fn len_of(&self, k: usize) -> Option<u64> {
        Some(self.offsets.get(k + 1)? - self.offsets[k])
    }

    pub fn non_empty_buffers(&self) -> usize {
        self.offsets.windows(2).filter(|w| w[1] > w[0]).count()
    }
}
