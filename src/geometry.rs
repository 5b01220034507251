//! Partition geometry shared by every node of a run.
//!
//! All sizes are in `f64` storage slots unless stated otherwise: a complex value
//! occupies two consecutive slots `(re, im)`.

use core::ops::Range;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while deriving the partition geometry or checking input shapes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// A run needs at least one node.
    #[error("node count must be at least 1")]
    NoNodes,

    /// A global dimension is zero.
    #[error("dimension `{name}` must be non-zero")]
    EmptyDimension { name: &'static str },

    /// The node count does not evenly divide a dimension that gets partitioned.
    #[error("{nodes} nodes do not evenly divide `{name}` = {value}")]
    Indivisible {
        name: &'static str,
        value: usize,
        nodes: usize,
    },

    /// A node was handed a different number of rows than its partition holds.
    #[error("expected {expected} local rows, found {found}")]
    RowCount { expected: usize, found: usize },

    /// A local row does not have room for the in-place real-to-complex output.
    #[error("row {row} has {found} slots, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Size constants of a distributed `dim_x` x `dim_y_real` transform over `num_nodes` nodes.
///
/// The first pass works on `n_x_local` rows of `row_len()` slots per node, the
/// second pass on `n_y_local` columns of `column_len()` slots per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PartitionGeometry {
    dim_x: usize,
    dim_y_real: usize,
    dim_y_complex: usize,
    num_nodes: usize,
    n_x_local: usize,
    n_y_local: usize,
}

impl PartitionGeometry {
    /// Derives the geometry, failing if `num_nodes` does not divide `dim_x`
    /// and `dim_y_real / 2 + 1`.
    pub const fn new(
        dim_x: usize,
        dim_y_real: usize,
        num_nodes: usize,
    ) -> Result<Self, GeometryError> {
        if num_nodes == 0 {
            return Err(GeometryError::NoNodes);
        }
        if dim_x == 0 {
            return Err(GeometryError::EmptyDimension { name: "dim_x" });
        }
        if dim_y_real == 0 {
            return Err(GeometryError::EmptyDimension { name: "dim_y_real" });
        }

        let dim_y_complex = dim_y_real / 2 + 1;

        if dim_x % num_nodes != 0 {
            return Err(GeometryError::Indivisible {
                name: "dim_x",
                value: dim_x,
                nodes: num_nodes,
            });
        }
        if dim_y_complex % num_nodes != 0 {
            return Err(GeometryError::Indivisible {
                name: "dim_y_complex",
                value: dim_y_complex,
                nodes: num_nodes,
            });
        }

        Ok(Self {
            dim_x,
            dim_y_real,
            dim_y_complex,
            num_nodes,
            n_x_local: dim_x / num_nodes,
            n_y_local: dim_y_complex / num_nodes,
        })
    }

    #[must_use]
    pub const fn dim_x(&self) -> usize {
        self.dim_x
    }

    #[must_use]
    pub const fn dim_y_real(&self) -> usize {
        self.dim_y_real
    }

    #[must_use]
    pub const fn dim_y_complex(&self) -> usize {
        self.dim_y_complex
    }

    #[must_use]
    pub const fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Rows owned by each node during the first pass.
    #[must_use]
    pub const fn n_x_local(&self) -> usize {
        self.n_x_local
    }

    /// Complex columns owned by each node during the second pass.
    #[must_use]
    pub const fn n_y_local(&self) -> usize {
        self.n_y_local
    }

    /// Slots per row: the complex output of the in-place real-to-complex transform.
    #[must_use]
    pub const fn row_len(&self) -> usize {
        2 * self.dim_y_complex
    }

    /// Slots per transposed column.
    #[must_use]
    pub const fn column_len(&self) -> usize {
        2 * self.dim_x
    }

    /// Slots of one row that belong to a single destination node.
    #[must_use]
    pub const fn y_block_len(&self) -> usize {
        2 * self.dim_y_complex / self.num_nodes
    }

    /// Slots of one column that belong to a single destination node.
    #[must_use]
    pub const fn x_block_len(&self) -> usize {
        2 * self.dim_x / self.num_nodes
    }

    /// Slots of one per-destination staging block.
    ///
    /// Both passes produce blocks of the same size:
    /// `n_x_local * y_block_len == n_y_local * x_block_len`.
    #[must_use]
    pub const fn staging_block_len(&self) -> usize {
        self.n_x_local * self.y_block_len()
    }

    /// Global rows owned by `node` during the first pass.
    #[must_use]
    pub const fn x_partition(&self, node: usize) -> Range<usize> {
        node * self.n_x_local..(node + 1) * self.n_x_local
    }

    /// Global complex columns owned by `node` during the second pass.
    #[must_use]
    pub const fn y_partition(&self, node: usize) -> Range<usize> {
        node * self.n_y_local..(node + 1) * self.n_y_local
    }

    /// Slot ranges of a row, one per destination node, in node order.
    pub fn y_blocks(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let len = self.y_block_len();
        (0..self.num_nodes).map(move |j| j * len..(j + 1) * len)
    }

    /// Slot ranges of a column, one per destination node, in node order.
    pub fn x_blocks(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let len = self.x_block_len();
        (0..self.num_nodes).map(move |j| j * len..(j + 1) * len)
    }

    /// Checks that a node's initial rows match the first-pass layout.
    pub fn check_rows(&self, rows: &[Vec<f64>]) -> Result<(), GeometryError> {
        if rows.len() != self.n_x_local {
            return Err(GeometryError::RowCount {
                expected: self.n_x_local,
                found: rows.len(),
            });
        }
        rows.iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.row_len())
            .map_or(Ok(()), |(row, values)| {
                Err(GeometryError::RowLength {
                    row,
                    expected: self.row_len(),
                    found: values.len(),
                })
            })
    }
}
