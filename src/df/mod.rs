//! The density-fitting pipeline: batch assembly of the two-centre metric and
//! the three-centre tensor, Cholesky factorization, and the triangular solve
//! producing the compact fitting tensor.

use std::error::Error;
use std::fmt;
use std::time::Instant;

use anyhow::{self, ensure, format_err};
use approx;
use log;
use ndarray::{s, Array2, Array3, Axis};
use ndarray_linalg::{Cholesky, Diag, SolveTriangular, UPLO};
use serde::{Deserialize, Serialize};

use crate::basis::env::BasisEnv;
use crate::basis::fitting::{synthesize_aux_basis, AuxBasisSpec};
use crate::integrals::kernel::{registered_kernel, IntegralKernel};
use crate::integrals::three_center::ThreeCenterBatch;
use crate::integrals::two_center::TwoCenterBatch;
use crate::integrals::{CancelToken, PairSymmetry, ShellRange};


/// Relative threshold below which a Cholesky-factor diagonal entry is
/// treated as numerically zero.
const FACTOR_DIAG_TOL: f64 = 1.0e-14;

// ------------
// Error types
// ------------

/// An error signifying a two-centre metric that is not symmetric positive
/// definite and therefore admits no Cholesky factorization.
#[derive(Debug, Clone)]
pub struct NonPositiveDefiniteError {
    /// The order of the first non-positive leading minor, when the
    /// factorization exposes it.
    pub minor: Option<usize>,

    /// The backend's failure message.
    pub detail: String,
}

impl fmt::Display for NonPositiveDefiniteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(
                f,
                "Two-centre metric is not positive definite: leading minor of order {minor} \
                 fails ({}).",
                self.detail
            ),
            None => write!(
                f,
                "Two-centre metric is not positive definite: {}.",
                self.detail
            ),
        }
    }
}

impl Error for NonPositiveDefiniteError {}

/// An error signifying a Cholesky factor with a numerically zero diagonal
/// entry, against which no triangular solve is attempted.
#[derive(Debug, Clone)]
pub struct SingularFactorError {
    /// The index of the offending diagonal entry.
    pub index: usize,

    /// The value of the offending diagonal entry.
    pub value: f64,
}

impl fmt::Display for SingularFactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cholesky factor is numerically singular: diagonal entry {} is {:e}.",
            self.index, self.value
        )
    }
}

impl Error for SingularFactorError {}

// ------------
// CholeskyEri
// ------------

/// The compact density-fitting representation of the four-centre
/// electron-repulsion tensor: a row-major `(naux, npair)` matrix `X` such
/// that `Xᵗ·X` approximates the four-centre tensor over the stored pair
/// indices.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CholeskyEri {
    tensor: Array2<f64>,
    symmetry: PairSymmetry,
    naoi: usize,
    naoj: usize,
}

impl CholeskyEri {
    /// The `(naux, npair)` fitting tensor.
    #[must_use]
    pub fn tensor(&self) -> &Array2<f64> {
        &self.tensor
    }

    /// The auxiliary dimension.
    #[must_use]
    pub fn naux(&self) -> usize {
        self.tensor.nrows()
    }

    /// The pair-index count.
    #[must_use]
    pub fn npair(&self) -> usize {
        self.tensor.ncols()
    }

    /// The pair-index storage symmetry.
    #[must_use]
    pub fn symmetry(&self) -> PairSymmetry {
        self.symmetry
    }

    /// The bra function counts `(naoi, naoj)` behind the pair index.
    #[must_use]
    pub fn nao(&self) -> (usize, usize) {
        (self.naoi, self.naoj)
    }

    /// Contracts the tensor with itself over the auxiliary index, yielding
    /// the fitted `(npair, npair)` pair tensor.
    #[must_use]
    pub fn fitted_pair_tensor(&self) -> Array2<f64> {
        self.tensor.t().dot(&self.tensor)
    }
}

// ----------------------------
// Factorization and the solve
// ----------------------------

/// Cholesky-decomposes the symmetric positive-definite two-centre metric.
///
/// # Arguments
///
/// * `j2c` - The symmetric `(naux, naux)` metric.
///
/// # Returns
///
/// The lower-triangular factor `L` with `L·Lᵗ = j2c`, or
/// [`NonPositiveDefiniteError`] naming the first failing leading minor.
pub fn cholesky_factor(j2c: &Array2<f64>) -> Result<Array2<f64>, NonPositiveDefiniteError> {
    j2c.cholesky(UPLO::Lower)
        .map_err(|err| NonPositiveDefiniteError {
            minor: failing_minor(j2c),
            detail: err.to_string(),
        })
}

/// Locates the order of the first non-positive leading minor of `j2c` by
/// factorizing its leading submatrices. Only invoked on the error path.
fn failing_minor(j2c: &Array2<f64>) -> Option<usize> {
    (1..=j2c.nrows()).find(|&k| {
        j2c.slice(s![..k, ..k])
            .to_owned()
            .cholesky(UPLO::Lower)
            .is_err()
    })
}

/// Solves `L·X = rhs` by forward substitution against the lower-triangular
/// Cholesky factor `low`, after defensively checking the factor diagonal for
/// numerically zero entries.
///
/// # Arguments
///
/// * `low` - The lower-triangular factor.
/// * `rhs` - The `(naux, npair)` right-hand side.
///
/// # Returns
///
/// `X` in standard row-major layout, or [`SingularFactorError`].
pub fn triangular_solve(
    low: &Array2<f64>,
    rhs: &Array2<f64>,
) -> Result<Array2<f64>, anyhow::Error> {
    let diag_scale = low
        .diag()
        .iter()
        .fold(0.0_f64, |acc, &d| acc.max(d.abs()))
        .max(1.0);
    for (index, &value) in low.diag().iter().enumerate() {
        if approx::abs_diff_eq!(value, 0.0, epsilon = FACTOR_DIAG_TOL * diag_scale) {
            return Err(SingularFactorError { index, value }.into());
        }
    }
    let solution = low.solve_triangular(UPLO::Lower, Diag::NonUnit, rhs)?;
    Ok(solution.as_standard_layout().to_owned())
}

/// Assembles a [`CholeskyEri`] from an already-computed two-centre metric
/// and three-centre tensor.
///
/// # Arguments
///
/// * `j2c` - The symmetric `(naux, naux)` metric.
/// * `j3c` - The `(npair, naux)` three-centre tensor.
/// * `symmetry` - The pair-index symmetry `j3c` was filled with.
/// * `naoi`, `naoj` - The bra function counts behind the pair index.
///
/// # Returns
///
/// The compact fitting tensor. No tensor is produced if the metric fails
/// the factorization.
pub fn cholesky_eri_from_integrals(
    j2c: &Array2<f64>,
    j3c: &Array2<f64>,
    symmetry: PairSymmetry,
    naoi: usize,
    naoj: usize,
) -> Result<CholeskyEri, anyhow::Error> {
    ensure!(
        j2c.nrows() == j2c.ncols() && j2c.nrows() == j3c.ncols(),
        "Dimension mismatch between the two-centre metric {:?} and the three-centre tensor {:?}.",
        j2c.dim(),
        j3c.dim()
    );
    let t0 = Instant::now();
    let low = cholesky_factor(j2c)?;
    log::debug!(
        "Cholesky factor of the {}x{} metric in {:.2?}",
        j2c.nrows(),
        j2c.ncols(),
        t0.elapsed()
    );

    let t1 = Instant::now();
    let rhs = j3c.t().as_standard_layout().to_owned();
    let tensor = triangular_solve(&low, &rhs)?;
    log::debug!(
        "triangular solve against {} pair indices in {:.2?}",
        j3c.nrows(),
        t1.elapsed()
    );
    Ok(CholeskyEri {
        tensor,
        symmetry,
        naoi,
        naoj,
    })
}

// -------------------------
// Batch-assembly front end
// -------------------------

/// Generates the `(components, npair, naux)` three-centre tensor over
/// `{primary} × {primary} × {aux}`.
pub fn three_center(
    primary: &BasisEnv,
    aux: &BasisEnv,
    kernel: &dyn IntegralKernel,
    symmetry: PairSymmetry,
    cancel: Option<CancelToken>,
) -> Result<Array3<f64>, anyhow::Error> {
    let env = primary.concat(aux);
    let bra = ShellRange::new(0, primary.n_shells());
    let ket = ShellRange::new(primary.n_shells(), aux.n_shells());
    ThreeCenterBatch::builder()
        .env(&env)
        .kernel(kernel)
        .i_range(bra)
        .j_range(bra)
        .k_range(ket)
        .symmetry(symmetry)
        .cancel(cancel)
        .build()
        .map_err(|err| format_err!(err))?
        .fill()
}

/// Generates the mixed three-centre tensor over
/// `{primary} × {second} × {aux}`, with the second bra range drawn from its
/// own environment appended after the auxiliary one. Always full storage,
/// since the bra ranges differ.
pub fn three_center_mixed(
    primary: &BasisEnv,
    aux: &BasisEnv,
    second: &BasisEnv,
    kernel: &dyn IntegralKernel,
    cancel: Option<CancelToken>,
) -> Result<Array3<f64>, anyhow::Error> {
    let env = primary.concat(aux).concat(second);
    let i_range = ShellRange::new(0, primary.n_shells());
    let j_range = ShellRange::new(
        primary.n_shells() + aux.n_shells(),
        second.n_shells(),
    );
    let k_range = ShellRange::new(primary.n_shells(), aux.n_shells());
    ThreeCenterBatch::builder()
        .env(&env)
        .kernel(kernel)
        .i_range(i_range)
        .j_range(j_range)
        .k_range(k_range)
        .cancel(cancel)
        .build()
        .map_err(|err| format_err!(err))?
        .fill()
}

/// Generates the three-centre tensor in `(naux, npair)` orientation, with
/// the auxiliary index leading. Only defined for single-component kinds.
pub fn three_center_transposed(
    primary: &BasisEnv,
    aux: &BasisEnv,
    kernel: &dyn IntegralKernel,
    symmetry: PairSymmetry,
    cancel: Option<CancelToken>,
) -> Result<Array2<f64>, anyhow::Error> {
    ensure!(
        kernel.kind().components() == 1,
        "Transposed orientation requires a single-component kind, `{}` has {}.",
        kernel.kind().name(),
        kernel.kind().components()
    );
    let tensor = three_center(primary, aux, kernel, symmetry, cancel)?;
    let pairs = tensor.index_axis_move(Axis(0), 0);
    Ok(pairs.t().as_standard_layout().to_owned())
}

/// Generates the symmetric `(naux, naux)` two-centre metric over the
/// auxiliary range of the concatenated environment. Only defined for
/// single-component kinds.
pub fn two_center(
    primary: &BasisEnv,
    aux: &BasisEnv,
    kernel: &dyn IntegralKernel,
    cancel: Option<CancelToken>,
) -> Result<Array2<f64>, anyhow::Error> {
    ensure!(
        kernel.kind().components() == 1,
        "The two-centre metric requires a single-component kind, `{}` has {}.",
        kernel.kind().name(),
        kernel.kind().components()
    );
    let env = primary.concat(aux);
    let range = ShellRange::new(primary.n_shells(), aux.n_shells());
    let matrix = TwoCenterBatch::builder()
        .env(&env)
        .kernel(kernel)
        .range(range)
        .cancel(cancel)
        .build()
        .map_err(|err| format_err!(err))?
        .fill()?;
    Ok(matrix.index_axis_move(Axis(0), 0))
}

// ---------------
// Full pipeline
// ---------------

/// Builds the compact fitting tensor against an explicit auxiliary
/// environment: the two-centre metric is assembled and factorized, the
/// packed three-centre tensor is filled, and the triangular solve yields the
/// fitting tensor.
///
/// The stages form a strict pipeline: the factorization starts only after
/// the metric is complete, the solve only after both the factor and the
/// three-centre tensor are complete.
pub fn cholesky_eri_with_aux(
    primary: &BasisEnv,
    aux: &BasisEnv,
    kernel_3c: &dyn IntegralKernel,
    kernel_2c: &dyn IntegralKernel,
    cancel: Option<CancelToken>,
) -> Result<CholeskyEri, anyhow::Error> {
    ensure!(
        kernel_3c.kind().components() == 1 && kernel_2c.kind().components() == 1,
        "The fitting pipeline requires single-component kinds."
    );
    let t0 = Instant::now();

    let j2c = two_center(primary, aux, kernel_2c, cancel.clone())?;
    log::debug!("size of aux basis {}", j2c.nrows());

    let j3c = three_center(primary, aux, kernel_3c, PairSymmetry::S2, cancel)?
        .index_axis_move(Axis(0), 0);

    let nao = {
        let repr = kernel_3c.kind().repr(0);
        primary.nao(repr)
    };
    let cderi = cholesky_eri_from_integrals(&j2c, &j3c, PairSymmetry::S2, nao, nao)?;
    log::debug!(
        "cholesky_eri ({} aux, {} pairs) in {:.2?}",
        cderi.naux(),
        cderi.npair(),
        t0.elapsed()
    );
    Ok(cderi)
}

/// Builds the compact fitting tensor, synthesizing the auxiliary environment
/// from `aux_spec` first.
pub fn cholesky_eri(
    primary: &BasisEnv,
    aux_spec: &AuxBasisSpec,
    kernel_3c: &dyn IntegralKernel,
    kernel_2c: &dyn IntegralKernel,
    cancel: Option<CancelToken>,
) -> Result<CholeskyEri, anyhow::Error> {
    let aux = synthesize_aux_basis(primary, aux_spec)?;
    cholesky_eri_with_aux(primary, &aux, kernel_3c, kernel_2c, cancel)
}

/// Builds the compact fitting tensor with kernels looked up from the
/// process-wide registry by kind name.
pub fn cholesky_eri_named(
    primary: &BasisEnv,
    aux_spec: &AuxBasisSpec,
    kind_3c: &str,
    kind_2c: &str,
    cancel: Option<CancelToken>,
) -> Result<CholeskyEri, anyhow::Error> {
    let kernel_3c = registered_kernel(kind_3c)
        .ok_or_else(|| format_err!("No kernel registered under `{kind_3c}`."))?;
    let kernel_2c = registered_kernel(kind_2c)
        .ok_or_else(|| format_err!("No kernel registered under `{kind_2c}`."))?;
    let aux = synthesize_aux_basis(primary, aux_spec)?;
    cholesky_eri_with_aux(primary, &aux, kernel_3c.as_ref(), kernel_2c.as_ref(), cancel)
}
