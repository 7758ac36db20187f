//! FEC block segmentation and reassembly.

use std::collections::VecDeque;

use wran_core::Mcs;

use crate::codec::BitVec;

/// Block geometry of one burst under one MCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    pub block_size_bits: u32,
    pub nr_blocks: u32,
    pub padding_bits: u32,
}

impl BlockPlan {
    pub fn new(burst_bytes: u32, mcs: Mcs) -> Self {
        let block_size_bits = mcs.payload_block_bits();
        let nr_blocks = mcs.nr_blocks(burst_bytes);
        let burst_bits = burst_bytes as u64 * 8;
        let total_bits = nr_blocks as u64 * block_size_bits as u64;
        assert!(
            total_bits >= burst_bits,
            "block accounting violated: {} blocks of {} bits cannot hold {} bits",
            nr_blocks,
            block_size_bits,
            burst_bits
        );
        Self {
            block_size_bits,
            nr_blocks,
            padding_bits: (total_bits - burst_bits) as u32,
        }
    }

    /// Bits on the air once padding is included.
    pub fn total_bits(&self) -> u64 {
        self.nr_blocks as u64 * self.block_size_bits as u64
    }

    /// True once `blocks` whole blocks cover the burst plus its padding.
    pub fn is_complete(&self, blocks: u32, burst_bytes: u32) -> bool {
        blocks as u64 * self.block_size_bits as u64
            == burst_bytes as u64 * 8 + self.padding_bits as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FecBlock {
    bits: BitVec,
}

impl FecBlock {
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

pub fn segment(bits: &[bool], block_size_bits: usize) -> VecDeque<FecBlock> {
    assert!(block_size_bits > 0, "zero-sized FEC block");
    bits.chunks(block_size_bits)
        .map(|chunk| {
            let mut block = chunk.to_vec();
            block.resize(block_size_bits, false);
            FecBlock { bits: block }
        })
        .collect()
}

/// Pops `block_count` blocks off the front of `queue` and concatenates them.
/// Padding is left in place; see [`strip_padding`].
pub fn reassemble(queue: &mut VecDeque<FecBlock>, block_count: usize, block_size_bits: usize) -> BitVec {
    assert!(
        queue.len() >= block_count,
        "reassembly needs {} blocks but only {} were received",
        block_count,
        queue.len()
    );
    let mut bits = Vec::with_capacity(block_count * block_size_bits);
    for block in queue.drain(..block_count) {
        assert_eq!(block.len(), block_size_bits, "FEC block size mismatch");
        bits.extend_from_slice(&block.bits);
    }
    bits
}

pub fn strip_padding(bits: &mut BitVec, padding_bits: usize) {
    let keep = bits.len().saturating_sub(padding_bits);
    bits.truncate(keep);
}
