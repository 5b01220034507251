//! Local 1D transforms applied to single rows.
//!
//! Rows are stored as `f64` slices. A complex value occupies two consecutive
//! slots `(re, im)`, so a row of `n` complex values has `2n` slots. The
//! real-to-complex plan reads `n` real samples from the front of the row and
//! overwrites the row with `n / 2 + 1` complex outputs; the row must have room
//! for them.
//!
//! Plans are built once per session and are safe to execute concurrently on
//! disjoint rows. Each thread keeps its own complex workspace, so executing a
//! plan does not allocate once that workspace has grown to the plan size.

use core::fmt;
use std::{cell::RefCell, sync::Arc};

use rustfft::{Fft, FftPlanner, FftPlannerScalar, num_complex::Complex};

use crate::parameters::PlanHint;

thread_local! {
    static WORKSPACE: RefCell<Vec<Complex<f64>>> = const { RefCell::new(Vec::new()) };
}

/// An in-place transform of one row.
pub trait RowTransform: Send + Sync {
    /// Logical transform length (real samples or complex values).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `f64` slots a row must provide.
    fn row_len(&self) -> usize;

    /// Transforms `row` in place.
    fn execute_in_place(&self, row: &mut [f64]);
}

enum Planner {
    Scalar(FftPlannerScalar<f64>),
    Simd(FftPlanner<f64>),
}

/// Builds forward plans for the row transforms.
///
/// `PlanHint::Estimate` uses the portable scalar planner; every other hint
/// lets the backend pick SIMD kernels for the running CPU.
pub struct DftPlanner {
    hint: PlanHint,
    planner: Planner,
}

impl fmt::Debug for DftPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DftPlanner").field("hint", &self.hint).finish()
    }
}

impl DftPlanner {
    #[must_use]
    pub fn new(hint: PlanHint) -> Self {
        let planner = match hint {
            PlanHint::Estimate => Planner::Scalar(FftPlannerScalar::new()),
            PlanHint::Measure | PlanHint::Patient | PlanHint::Exhaustive => {
                Planner::Simd(FftPlanner::new())
            }
        };
        Self { hint, planner }
    }

    fn plan_forward(&mut self, len: usize) -> Arc<dyn Fft<f64>> {
        match &mut self.planner {
            Planner::Scalar(planner) => planner.plan_fft_forward(len),
            Planner::Simd(planner) => planner.plan_fft_forward(len),
        }
    }

    /// Plans a forward real-to-complex transform of `len` real samples.
    pub fn plan_forward_r2c(&mut self, len: usize) -> R2cPlan {
        let fft = self.plan_forward(len);
        R2cPlan {
            scratch_len: fft.get_inplace_scratch_len(),
            fft,
            len,
        }
    }

    /// Plans a forward complex-to-complex transform of `len` complex values.
    pub fn plan_forward_c2c(&mut self, len: usize) -> C2cPlan {
        let fft = self.plan_forward(len);
        C2cPlan {
            scratch_len: fft.get_inplace_scratch_len(),
            fft,
            len,
        }
    }
}

/// Runs `f` on a thread-local `(buffer, scratch)` pair of the requested sizes.
fn with_workspace<R>(
    len: usize,
    scratch_len: usize,
    f: impl FnOnce(&mut [Complex<f64>], &mut [Complex<f64>]) -> R,
) -> R {
    WORKSPACE.with_borrow_mut(|workspace| {
        workspace.clear();
        workspace.resize(len + scratch_len, Complex::new(0.0, 0.0));
        let (buffer, scratch) = workspace.split_at_mut(len);
        f(buffer, scratch)
    })
}

/// Forward real-to-complex plan.
pub struct R2cPlan {
    fft: Arc<dyn Fft<f64>>,
    len: usize,
    scratch_len: usize,
}

impl fmt::Debug for R2cPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("R2cPlan").field("len", &self.len).finish()
    }
}

impl RowTransform for R2cPlan {
    fn len(&self) -> usize {
        self.len
    }

    fn row_len(&self) -> usize {
        2 * (self.len / 2 + 1)
    }

    fn execute_in_place(&self, row: &mut [f64]) {
        debug_assert!(row.len() >= self.row_len());
        let outputs = self.len / 2 + 1;

        with_workspace(self.len, self.scratch_len, |buffer, scratch| {
            for (value, &sample) in buffer.iter_mut().zip(&row[..self.len]) {
                *value = Complex::new(sample, 0.0);
            }

            self.fft.process_with_scratch(buffer, scratch);

            // Hermitian symmetry: the upper half is redundant
            for (pair, value) in row.chunks_exact_mut(2).zip(&buffer[..outputs]) {
                pair[0] = value.re;
                pair[1] = value.im;
            }
        });
    }
}

/// Forward complex-to-complex plan.
pub struct C2cPlan {
    fft: Arc<dyn Fft<f64>>,
    len: usize,
    scratch_len: usize,
}

impl fmt::Debug for C2cPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("C2cPlan").field("len", &self.len).finish()
    }
}

impl RowTransform for C2cPlan {
    fn len(&self) -> usize {
        self.len
    }

    fn row_len(&self) -> usize {
        2 * self.len
    }

    fn execute_in_place(&self, row: &mut [f64]) {
        debug_assert_eq!(row.len(), self.row_len());

        with_workspace(self.len, self.scratch_len, |buffer, scratch| {
            for (value, pair) in buffer.iter_mut().zip(row.chunks_exact(2)) {
                *value = Complex::new(pair[0], pair[1]);
            }

            self.fft.process_with_scratch(buffer, scratch);

            for (pair, value) in row.chunks_exact_mut(2).zip(buffer.iter()) {
                pair[0] = value.re;
                pair[1] = value.im;
            }
        });
    }
}
