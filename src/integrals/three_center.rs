//! The three-centre integral batch driver.

use std::ops::Range;
use std::time::Instant;

use anyhow;
use derive_builder::Builder;
use log;
use ndarray::{s, Array3, ArrayViewMut3, Axis, Ix4};
use rayon::prelude::*;

use crate::basis::env::BasisEnv;
use crate::integrals::kernel::IntegralKernel;
use crate::integrals::layout::{self, BatchLayout, OffsetTable};
use crate::integrals::{
    BatchCancelled, BufferSizeMismatchError, CancelToken, EvaluationError, PairSymmetry,
    ShellRange,
};

#[cfg(test)]
#[path = "three_center_tests.rs"]
mod three_center_tests;

/// A three-centre integral batch request over a concatenated environment.
///
/// Output rows cover the (i, j) function pairs of the bra ranges (every
/// ordered pair for [`PairSymmetry::S1`], triangular-packed i ≥ j pairs for
/// [`PairSymmetry::S2`]); columns cover the auxiliary functions of the k
/// range. A leading component dimension carries vector-valued kinds, so the
/// output shape is `(components, npair, naux)`.
///
/// The fill is parallelised over contiguous i-shell groups: distinct shells
/// map to disjoint row intervals, so workers write to disjoint output
/// regions without locking. Each worker prepares and owns one kernel
/// context.
#[derive(Builder, Clone)]
pub struct ThreeCenterBatch<'a> {
    /// The concatenated environment containing all three shell ranges.
    env: &'a BasisEnv,

    /// The kernel evaluating one shell triple at a time.
    kernel: &'a dyn IntegralKernel,

    /// The bra i shell range.
    i_range: ShellRange,

    /// The bra j shell range.
    j_range: ShellRange,

    /// The auxiliary k shell range.
    k_range: ShellRange,

    /// The pair-index storage symmetry.
    #[builder(default = "PairSymmetry::S1")]
    symmetry: PairSymmetry,

    /// An optional precomputed offset table for the i range.
    #[builder(default = "None")]
    i_offsets: Option<OffsetTable>,

    /// An optional precomputed offset table for the j range.
    #[builder(default = "None")]
    j_offsets: Option<OffsetTable>,

    /// An optional precomputed offset table for the k range.
    #[builder(default = "None")]
    k_offsets: Option<OffsetTable>,

    /// An optional cooperative cancellation token polled between work items.
    #[builder(default = "None")]
    cancel: Option<CancelToken>,
}

impl<'a> ThreeCenterBatch<'a> {
    /// Returns a builder to construct a new batch request.
    pub fn builder() -> ThreeCenterBatchBuilder<'a> {
        ThreeCenterBatchBuilder::default()
    }

    /// Resolves the storage layout of this request.
    pub fn layout(&self) -> Result<BatchLayout, anyhow::Error> {
        layout::three_center_layout(
            self.kernel.kind(),
            self.env,
            self.i_range,
            self.j_range,
            self.k_range,
            self.symmetry,
            [
                self.i_offsets.clone(),
                self.j_offsets.clone(),
                self.k_offsets.clone(),
            ],
        )
    }

    /// Fills a freshly allocated output tensor.
    ///
    /// # Returns
    ///
    /// The filled `(components, npair, naux)` tensor. A cancelled build
    /// returns [`BatchCancelled`] and discards the partially filled buffer.
    pub fn fill(&self) -> Result<Array3<f64>, anyhow::Error> {
        let batch_layout = self.layout()?;
        let [comp, npair, naux] = batch_layout.shape();
        let mut out = Array3::zeros((comp, npair, naux));
        self.fill_view(&batch_layout, out.view_mut())?;
        Ok(out)
    }

    /// Fills a caller-supplied buffer, whose shape must match the resolved
    /// layout exactly.
    ///
    /// # Arguments
    ///
    /// * `out` - The output view of shape `(components, npair, naux)`.
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
        batch_layout: &BatchLayout,
        out: ArrayViewMut3<f64>,
    ) -> Result<(), anyhow::Error> {
        let t0 = Instant::now();
        let n_i = self.i_range.count();
        if n_i == 0 {
            return Ok(());
        }

        // Carve the row space into contiguous i-shell groups, one worker and
        // one kernel context per group.
        let n_groups = rayon::current_num_threads().min(n_i);
        let mut groups = Vec::with_capacity(n_groups);
        let mut rest = out;
        let mut row0 = 0;
        for g in 0..n_groups {
            let shell_lo = g * n_i / n_groups;
            let shell_hi = (g + 1) * n_i / n_groups;
            let row_hi = batch_layout.i_shell_rows(shell_hi - 1).end;
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
            "three-centre batch `{}` {:?} filled in {:.2?}",
            self.kernel.kind().name(),
            batch_layout.shape(),
            t0.elapsed()
        );
        Ok(())
    }

    /// Fills the rows of the i shells in `shells` (local indices), whose
    /// global row span starts at `row0`.
    fn fill_rows(
        &self,
        batch_layout: &BatchLayout,
        shells: Range<usize>,
        row0: usize,
        mut out: ArrayViewMut3<f64>,
    ) -> Result<(), anyhow::Error> {
        let mut ctx = self.kernel.prepare(self.env)?;
        let comp = batch_layout.components();
        for ish in shells {
            let i_abs = self.i_range.start() + ish;
            let i0 = batch_layout.iloc().offset(ish);
            let di = batch_layout.iloc().width(ish);
            let n_j = match batch_layout.symmetry() {
                PairSymmetry::S1 => self.j_range.count(),
                PairSymmetry::S2 => ish + 1,
            };
            for jsh in 0..n_j {
                if let Some(token) = &self.cancel {
                    if token.is_cancelled() {
                        return Err(BatchCancelled.into());
                    }
                }
                let j_abs = self.j_range.start() + jsh;
                let j0 = batch_layout.jloc().offset(jsh);
                let dj = batch_layout.jloc().width(jsh);
                for ksh in 0..self.k_range.count() {
                    let k_abs = self.k_range.start() + ksh;
                    let k0 = batch_layout.kloc().offset(ksh);
                    let dk = batch_layout.kloc().width(ksh);
                    let block = ctx
                        .evaluate(&[i_abs, j_abs, k_abs])?
                        .into_dimensionality::<Ix4>()
                        .map_err(|_| {
                            EvaluationError(format!(
                                "kernel block for shells ({i_abs}, {j_abs}, {k_abs}) is not \
                                 four-dimensional"
                            ))
                        })?;
                    if block.shape() != [comp, di, dj, dk] {
                        return Err(EvaluationError(format!(
                            "kernel block for shells ({i_abs}, {j_abs}, {k_abs}) has shape {:?}, \
                             expected {:?}",
                            block.shape(),
                            [comp, di, dj, dk]
                        ))
                        .into());
                    }
                    for c in 0..comp {
                        for mu in 0..di {
                            for nu in 0..dj {
                                let (gmu, gnu) = (i0 + mu, j0 + nu);
                                if batch_layout.symmetry() == PairSymmetry::S2 && gnu > gmu {
                                    continue;
                                }
                                let row = batch_layout.pair_row(gmu, gnu) - row0;
                                out.slice_mut(s![c, row, k0..k0 + dk])
                                    .assign(&block.slice(s![c, mu, nu, ..]));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
