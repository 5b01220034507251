//! Distributed two-dimensional real-to-complex FFT.
//!
//! Rows of the input array are partitioned across `N` nodes. Every node runs
//! the same two-pass pipeline: a real-to-complex transform of its rows, a
//! global transpose through an exchange group, a complex-to-complex transform
//! of the transposed columns, and a second transpose back to the original
//! row partitioning.

pub mod cluster;
pub mod dft;
pub mod errors;
pub mod exchange;
pub mod geometry;
pub mod parameters;
pub mod reference;
pub mod repack;
pub mod session;
pub mod staging;
pub mod workload;
