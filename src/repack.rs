//! Local data movement around the global exchanges.
//!
//! Before an exchange every local line (a row in the first pass, a column in
//! the second) is split into `N` equal chunks, chunk `j` going to node `j`.
//! Line `r`'s chunk for node `j` is stored in staging block `j` at offset
//! `r * chunk_len`, so block `j` ends up holding, line after line, everything
//! this node sends to `j`.
//!
//! After the exchange, the block received from source `i` holds the sender's
//! lines one after the other, each restricted to this node's partition. Local
//! target `k` collects the `k`-th complex value of every such line into the
//! contiguous range that source `i` owns in the other dimension.

use rayon::prelude::*;

/// Splits `line` into `targets.len()` equal chunks, copying chunk `j` to `targets[j]`.
pub fn split_line(line: &[f64], targets: &mut [&mut [f64]]) {
    debug_assert!(!targets.is_empty());
    let chunk_len = line.len() / targets.len();
    debug_assert_eq!(chunk_len * targets.len(), line.len());

    for (target, chunk) in targets.iter_mut().zip(line.chunks_exact(chunk_len)) {
        target.copy_from_slice(chunk);
    }
}

/// Copies the `k`-th complex value of each line of `block` into `out`.
///
/// The lines of `block` are `stride` slots long; `out` receives one `(re, im)`
/// pair per line, in line order.
pub fn transpose_block(block: &[f64], k: usize, stride: usize, out: &mut [f64]) {
    debug_assert_eq!(out.len() / 2 * stride, block.len());

    for (pair, line) in out.chunks_exact_mut(2).zip(block.chunks_exact(stride)) {
        pair.copy_from_slice(&line[2 * k..2 * k + 2]);
    }
}

/// Scatters the block received from one source into its slots of every local target.
///
/// `views[k]` is the part of target `k` owned by that source.
pub fn transpose_source(block: &[f64], stride: usize, views: &mut [&mut [f64]]) {
    views
        .par_iter_mut()
        .enumerate()
        .for_each(|(k, out)| transpose_block(block, k, stride, out));
}

/// Cuts every buffer into `chunk_len` chunks and regroups them by chunk index.
///
/// Entry `[c][b]` of the result is chunk `c` of buffer `b`. All buffers must
/// have the same length, a multiple of `chunk_len`. The views are disjoint, so
/// different entries can be written from different threads.
pub fn chunk_views(buffers: &mut [Vec<f64>], chunk_len: usize) -> Vec<Vec<&mut [f64]>> {
    let mut chunks: Vec<_> = buffers
        .iter_mut()
        .map(|buffer| buffer.chunks_exact_mut(chunk_len))
        .collect();
    let num_chunks = chunks.first().map_or(0, ExactSizeIterator::len);
    debug_assert!(chunks.iter().all(|c| c.len() == num_chunks));

    (0..num_chunks)
        .map(|_| chunks.iter_mut().filter_map(Iterator::next).collect())
        .collect()
}
