//! Per-destination staging blocks reused by both passes.

use core::mem;

use crate::exchange::errors::ExchangeError;

/// `N` blocks of `block_len` slots, one per destination node.
///
/// The blocks leave the arena for the duration of an exchange and the blocks
/// received in exchange take their place, so a session allocates its staging
/// memory once.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingArena {
    blocks: Vec<Vec<f64>>,
    block_len: usize,
}

impl StagingArena {
    #[must_use]
    pub fn new(num_blocks: usize, block_len: usize) -> Self {
        Self {
            blocks: vec![vec![0.0; block_len]; num_blocks],
            block_len,
        }
    }

    #[must_use]
    pub const fn block_len(&self) -> usize {
        self.block_len
    }

    /// Blocks currently held; empty while an exchange is in flight.
    #[must_use]
    pub fn blocks(&self) -> &[Vec<f64>] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Vec<f64>] {
        &mut self.blocks
    }

    /// Hands all blocks over to an exchange.
    pub fn take(&mut self) -> Vec<Vec<f64>> {
        mem::take(&mut self.blocks)
    }

    /// Checks that a block received from `from_node` has the staging size.
    pub const fn check_received(&self, from_node: usize, block: &[f64]) -> Result<(), ExchangeError> {
        if block.len() == self.block_len {
            Ok(())
        } else {
            Err(ExchangeError::BlockLength {
                from_node,
                expected: self.block_len,
                found: block.len(),
            })
        }
    }

    /// Puts received blocks, indexed by source, back into the arena.
    pub fn restore(&mut self, blocks: Vec<Vec<f64>>) -> Result<(), ExchangeError> {
        for (from_node, block) in blocks.iter().enumerate() {
            self.check_received(from_node, block)?;
        }
        self.blocks = blocks;
        Ok(())
    }
}
