//! Single-node 2D real-to-complex transform used to check distributed results.

use rayon::prelude::*;
use tracing::instrument;

use crate::{
    dft::{DftPlanner, RowTransform},
    geometry::PartitionGeometry,
    parameters::PlanHint,
};

/// Transforms the full `dim_x` x `dim_y_real` array on one node.
///
/// `rows` has the layout of [`crate::workload::global_rows`]. The result has
/// the same layout as the concatenated per-node output of a distributed run:
/// `dim_x` rows of `dim_y_complex` interleaved complex values.
#[instrument(skip_all, fields(dim_x = geometry.dim_x(), dim_y_real = geometry.dim_y_real()))]
pub fn transform_2d(geometry: &PartitionGeometry, mut rows: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let mut planner = DftPlanner::new(PlanHint::Estimate);
    let r2c = planner.plan_forward_r2c(geometry.dim_y_real());
    let c2c = planner.plan_forward_c2c(geometry.dim_x());

    rows.par_iter_mut().for_each(|row| r2c.execute_in_place(row));

    // Columns are transformed one at a time through a gathered copy
    let mut column = vec![0.0; geometry.column_len()];
    for c in 0..geometry.dim_y_complex() {
        for (pair, row) in column.chunks_exact_mut(2).zip(&rows) {
            pair.copy_from_slice(&row[2 * c..2 * c + 2]);
        }
        c2c.execute_in_place(&mut column);
        for (pair, row) in column.chunks_exact(2).zip(&mut rows) {
            row[2 * c..2 * c + 2].copy_from_slice(pair);
        }
    }

    rows
}

/// Largest absolute difference between two row sets of the same shape.
#[must_use]
pub fn max_abs_error(actual: &[Vec<f64>], expected: &[Vec<f64>]) -> f64 {
    actual
        .iter()
        .zip(expected)
        .flat_map(|(a, b)| a.iter().zip(b).map(|(x, y)| (x - y).abs()))
        .fold(0.0, f64::max)
}
