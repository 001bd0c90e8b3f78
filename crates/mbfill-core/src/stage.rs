//! Metadata stager, host half: packs the tables a dispatch needs.
//!
//! Scratch layout, in `u64` words:
//!
//! ```text
//! [ offsets[0] .. offsets[n] | addr[0] .. addr[n-1] ]
//!   n + 1 words                n words
//! ```

use crate::layout::BufferLayout;
use crate::span::DeviceSpan;

const WORD: usize = std::mem::size_of::<u64>();

/// Host copy of the prefix table and buffer base addresses, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTables {
    words: Vec<u64>,
    num_buffers: usize,
}

impl MetadataTables {
    pub fn new<T>(layout: &BufferLayout, bufs: &[DeviceSpan<T>]) -> Self {
        debug_assert_eq!(layout.num_buffers(), bufs.len());
        let mut words = Vec::with_capacity(Self::words_for(bufs.len()));
        words.extend_from_slice(layout.offsets());
        words.extend(bufs.iter().map(|b| b.addr()));
        Self { words, num_buffers: bufs.len() }
    }

    fn words_for(num_buffers: usize) -> usize {
        2 * num_buffers + 1
    }

    /// Scratch bytes needed for `num_buffers` buffers.
    pub fn byte_len_for(num_buffers: usize) -> usize {
        Self::words_for(num_buffers) * WORD
    }

    pub fn byte_len(&self) -> usize {
        self.words.len() * WORD
    }

    pub fn num_buffers(&self) -> usize {
        self.num_buffers
    }

    pub fn offsets(&self) -> &[u64] {
        &self.words[..=self.num_buffers]
    }

    pub fn addrs(&self) -> &[u64] {
        &self.words[self.num_buffers + 1..]
    }

    /// The packed words, in scratch order.
    pub fn as_words(&self) -> &[u64] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u64> {
        self.words
    }
}

/// Where a call's tables live once uploaded to device-visible scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedMetadata {
    base: u64,
    num_buffers: usize,
}

impl StagedMetadata {
    pub fn new(base: u64, num_buffers: usize) -> Self {
        Self { base, num_buffers }
    }

    pub fn num_buffers(&self) -> usize {
        self.num_buffers
    }

    /// Device address of the `num_buffers + 1` prefix entries.
    pub fn offsets_addr(&self) -> u64 {
        self.base
    }

    /// Device address of the `num_buffers` base addresses.
    pub fn addrs_addr(&self) -> u64 {
        self.base + ((self.num_buffers + 1) * WORD) as u64
    }
}
