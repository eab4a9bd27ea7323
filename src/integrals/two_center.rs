//! The two-centre integral batch driver.

use std::ops::Range;
use std::time::Instant;

use anyhow;
use derive_builder::Builder;
use log;
use ndarray::{s, Array3, ArrayViewMut3, Axis, Ix3};
use rayon::prelude::*;

use crate::basis::env::BasisEnv;
use crate::integrals::kernel::IntegralKernel;
use crate::integrals::layout::{self, OffsetTable, TwoCenterLayout};
use crate::integrals::{
    BatchCancelled, BufferSizeMismatchError, CancelToken, EvaluationError, ShellRange,
};

#[cfg(test)]
#[path = "two_center_tests.rs"]
mod two_center_tests;

/// A two-centre integral batch request: one shell range applied as both the
/// row and the column dimension, always in full (unpacked) storage, since
/// the downstream Cholesky factorization requires the fully materialised
/// symmetric matrix.
///
/// The output shape is `(components, naux, naux)`.
#[derive(Builder, Clone)]
pub struct TwoCenterBatch<'a> {
    /// The environment containing the shell range.
    env: &'a BasisEnv,

    /// The kernel evaluating one shell pair at a time.
    kernel: &'a dyn IntegralKernel,

    /// The shell range spanning both dimensions.
    range: ShellRange,

    /// An optional precomputed offset table for the range.
    #[builder(default = "None")]
    offsets: Option<OffsetTable>,

    /// An optional cooperative cancellation token polled between work items.
    #[builder(default = "None")]
    cancel: Option<CancelToken>,
}

impl<'a> TwoCenterBatch<'a> {
    /// Returns a builder to construct a new batch request.
    pub fn builder() -> TwoCenterBatchBuilder<'a> {
        TwoCenterBatchBuilder::default()
    }

    /// Resolves the storage layout of this request.
    pub fn layout(&self) -> Result<TwoCenterLayout, anyhow::Error> {
        layout::two_center_layout(self.kernel.kind(), self.env, self.range, self.offsets.clone())
    }

    /// Fills a freshly allocated output tensor of shape
    /// `(components, naux, naux)`.
    pub fn fill(&self) -> Result<Array3<f64>, anyhow::Error> {
        let batch_layout = self.layout()?;
        let [comp, n, _] = batch_layout.shape();
        let mut out = Array3::zeros((comp, n, n));
        self.fill_view(&batch_layout, out.view_mut())?;
        Ok(out)
    }

    /// Fills a caller-supplied buffer, whose shape must match the resolved
    /// layout exactly.
    pub fn fill_into(&self, out: ArrayViewMut3<f64>) -> Result<(), anyhow::Error> {
        let batch_layout = self.layout()?;
        if out.shape() != &batch_layout.shape()[..] {
            return Err(BufferSizeMismatchError {
                expected: batch_layout.shape().to_vec(),
                found: out.shape().to_vec(),
            }
            .into());
        }
        self.fill_view(&batch_layout, out)
    }

    fn fill_view(
        &self,
        batch_layout: &TwoCenterLayout,
        out: ArrayViewMut3<f64>,
    ) -> Result<(), anyhow::Error> {
        let t0 = Instant::now();
        let n_shells = self.range.count();
        if n_shells == 0 {
            return Ok(());
        }

        // Contiguous row-shell groups, one worker and one kernel context per
        // group; writes are disjoint across groups.
        let n_groups = rayon::current_num_threads().min(n_shells);
        let mut groups = Vec::with_capacity(n_groups);
        let mut rest = out;
        let mut row0 = 0;
        for g in 0..n_groups {
            let shell_lo = g * n_shells / n_groups;
            let shell_hi = (g + 1) * n_shells / n_groups;
            let row_hi = batch_layout.loc().offset(shell_hi);
            let (head, tail) = rest.split_at(Axis(1), row_hi - row0);
            groups.push((shell_lo..shell_hi, row0, head));
            rest = tail;
            row0 = row_hi;
        }

        groups
            .into_par_iter()
            .map(|(shells, row0, view)| self.fill_rows(batch_layout, shells, row0, view))
            .collect::<Result<Vec<_>, anyhow::Error>>()?;

        log::debug!(
            "two-centre batch `{}` {:?} filled in {:.2?}",
            self.kernel.kind().name(),
            batch_layout.shape(),
            t0.elapsed()
        );
        Ok(())
    }

    fn fill_rows(
        &self,
        batch_layout: &TwoCenterLayout,
        shells: Range<usize>,
        row0: usize,
        mut out: ArrayViewMut3<f64>,
    ) -> Result<(), anyhow::Error> {
        let mut ctx = self.kernel.prepare(self.env)?;
        let comp = batch_layout.components();
        for ish in shells {
            let i_abs = self.range.start() + ish;
            let i0 = batch_layout.loc().offset(ish);
            let di = batch_layout.loc().width(ish);
            for jsh in 0..self.range.count() {
                if let Some(token) = &self.cancel {
                    if token.is_cancelled() {
                        return Err(BatchCancelled.into());
                    }
                }
                let j_abs = self.range.start() + jsh;
                let j0 = batch_layout.loc().offset(jsh);
                let dj = batch_layout.loc().width(jsh);
                let block = ctx
                    .evaluate(&[i_abs, j_abs])?
                    .into_dimensionality::<Ix3>()
                    .map_err(|_| {
                        EvaluationError(format!(
                            "kernel block for shells ({i_abs}, {j_abs}) is not three-dimensional"
                        ))
                    })?;
                if block.shape() != [comp, di, dj] {
                    return Err(EvaluationError(format!(
                        "kernel block for shells ({i_abs}, {j_abs}) has shape {:?}, expected {:?}",
                        block.shape(),
                        [comp, di, dj]
                    ))
                    .into());
                }
                for c in 0..comp {
                    for mu in 0..di {
                        let row = i0 + mu - row0;
                        out.slice_mut(s![c, row, j0..j0 + dj])
                            .assign(&block.slice(s![c, mu, ..]));
                    }
                }
            }
        }
        Ok(())
    }
}
