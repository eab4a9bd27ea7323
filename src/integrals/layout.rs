//! Offset tables and the storage-layout policy shared by the batch drivers.

use std::ops::Range;

use anyhow::{self, ensure};

use crate::basis::env::BasisEnv;
use crate::basis::shell::ShellRepr;
use crate::integrals::kernel::IntegralKind;
use crate::integrals::{InvalidRangeError, PairSymmetry, ShellRange, UnsupportedSymmetryError};

#[cfg(test)]
#[path = "layout_tests.rs"]
mod layout_tests;

/// The `n`-th triangular number, the packed pair count of `n` functions.
pub(crate) fn triangle(n: usize) -> usize {
    n * (n + 1) / 2
}

// ------------
// OffsetTable
// ------------

/// Cumulative basis-function offsets of a contiguous shell range.
///
/// For a range of `count` shells the table has `count + 1` entries:
/// `offset(k)` is the range-relative starting function index of the `k`-th
/// shell, `offset(count)` the total function count. Entries are strictly
/// non-decreasing with `offset(0) == 0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetTable {
    range: ShellRange,
    offsets: Vec<usize>,
}

impl OffsetTable {
    /// Builds the table for `range` from a per-shell cardinality function,
    /// in O(count).
    ///
    /// # Arguments
    ///
    /// * `range` - The shell range.
    /// * `card` - Maps an absolute shell index to its function count; every
    ///     value must be positive.
    ///
    /// # Returns
    ///
    /// The table, or [`InvalidRangeError`] if any cardinality is zero.
    pub fn build_with<F>(range: ShellRange, card: F) -> Result<Self, InvalidRangeError>
    where
        F: Fn(usize) -> usize,
    {
        let mut offsets = Vec::with_capacity(range.count() + 1);
        let mut off = 0;
        offsets.push(0);
        for shell in range.shells() {
            let n = card(shell);
            if n == 0 {
                return Err(InvalidRangeError(format!(
                    "shell {shell} expands to zero functions"
                )));
            }
            off += n;
            offsets.push(off);
        }
        Ok(Self { range, offsets })
    }

    /// Builds the table for `range` of `env` under the function convention
    /// `repr`.
    pub fn build(
        env: &BasisEnv,
        range: ShellRange,
        repr: ShellRepr,
    ) -> Result<Self, InvalidRangeError> {
        if range.end() > env.n_shells() {
            return Err(InvalidRangeError(format!(
                "range {range} exceeds the environment's {} shells",
                env.n_shells()
            )));
        }
        Self::build_with(range, |shell| env.shell(shell).n_funcs(repr))
    }

    /// The shell range this table describes.
    #[must_use]
    pub fn range(&self) -> ShellRange {
        self.range
    }

    /// The range-relative starting function index of the `k`-th shell of the
    /// range; `k == count` yields the total function count.
    #[must_use]
    pub fn offset(&self, k: usize) -> usize {
        self.offsets[k]
    }

    /// The function count of the `k`-th shell of the range.
    #[must_use]
    pub fn width(&self, k: usize) -> usize {
        self.offsets[k + 1] - self.offsets[k]
    }

    /// The total function count of the range.
    #[must_use]
    pub fn n_funcs(&self) -> usize {
        *self
            .offsets
            .last()
            .expect("An offset table always has at least one entry.")
    }
}

// ------------
// BatchLayout
// ------------

/// The resolved storage layout of a three-centre batch: per-dimension offset
/// tables, pair-index symmetry and the output shape
/// `(components, npair, naux)`.
#[derive(Clone, Debug)]
pub struct BatchLayout {
    iloc: OffsetTable,
    jloc: OffsetTable,
    kloc: OffsetTable,
    symmetry: PairSymmetry,
    comp: usize,
    npair: usize,
    naux: usize,
}

impl BatchLayout {
    /// The output shape `(components, npair, naux)`.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        [self.comp, self.npair, self.naux]
    }

    /// The pair-index count.
    #[must_use]
    pub fn npair(&self) -> usize {
        self.npair
    }

    /// The auxiliary function count.
    #[must_use]
    pub fn naux(&self) -> usize {
        self.naux
    }

    /// The component count.
    #[must_use]
    pub fn components(&self) -> usize {
        self.comp
    }

    /// The pair-index symmetry.
    #[must_use]
    pub fn symmetry(&self) -> PairSymmetry {
        self.symmetry
    }

    pub(crate) fn iloc(&self) -> &OffsetTable {
        &self.iloc
    }

    pub(crate) fn jloc(&self) -> &OffsetTable {
        &self.jloc
    }

    pub(crate) fn kloc(&self) -> &OffsetTable {
        &self.kloc
    }

    /// The row index of the range-relative function pair `(mu, nu)`.
    ///
    /// Packed rows use triangular-number indexing on the range-relative
    /// function indices (`mu >= nu`), so interior ranges pack densely from
    /// row zero.
    pub(crate) fn pair_row(&self, mu: usize, nu: usize) -> usize {
        match self.symmetry {
            PairSymmetry::S1 => mu * self.jloc.n_funcs() + nu,
            PairSymmetry::S2 => triangle(mu) + nu,
        }
    }

    /// The contiguous span of rows whose leading function belongs to the
    /// `k`-th i-shell of the range.
    pub(crate) fn i_shell_rows(&self, k: usize) -> Range<usize> {
        match self.symmetry {
            PairSymmetry::S1 => {
                let naoj = self.jloc.n_funcs();
                self.iloc.offset(k) * naoj..self.iloc.offset(k + 1) * naoj
            }
            PairSymmetry::S2 => {
                triangle(self.iloc.offset(k))..triangle(self.iloc.offset(k + 1))
            }
        }
    }
}

// -----------------
// TwoCenterLayout
// -----------------

/// The resolved storage layout of a two-centre batch: one offset table
/// applied to both dimensions, always full storage.
#[derive(Clone, Debug)]
pub struct TwoCenterLayout {
    loc: OffsetTable,
    comp: usize,
}

impl TwoCenterLayout {
    /// The output shape `(components, naux, naux)`.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        let n = self.loc.n_funcs();
        [self.comp, n, n]
    }

    /// The component count.
    #[must_use]
    pub fn components(&self) -> usize {
        self.comp
    }

    pub(crate) fn loc(&self) -> &OffsetTable {
        &self.loc
    }
}

// -------------------
// Layout resolution
// -------------------

/// Resolves the storage layout of a three-centre batch.
///
/// The per-dimension function conventions come from the explicit tags of
/// `kind`; packing is permitted only when the i and j ranges coincide.
/// Caller-supplied offset tables are used verbatim after checking that they
/// describe the corresponding ranges.
///
/// # Arguments
///
/// * `kind` - The integral kind; must have three centres.
/// * `env` - The concatenated environment containing all three ranges.
/// * `i_range`, `j_range`, `k_range` - The participating shell ranges.
/// * `symmetry` - The requested pair-index storage symmetry.
/// * `tables` - Optional precomputed offset tables for i, j and k.
///
/// # Returns
///
/// The resolved [`BatchLayout`].
pub fn three_center_layout(
    kind: &IntegralKind,
    env: &BasisEnv,
    i_range: ShellRange,
    j_range: ShellRange,
    k_range: ShellRange,
    symmetry: PairSymmetry,
    tables: [Option<OffsetTable>; 3],
) -> Result<BatchLayout, anyhow::Error> {
    ensure!(
        kind.centers() == 3,
        "Integral kind `{}` has {} centres; a three-centre batch requires 3.",
        kind.name(),
        kind.centers()
    );
    if symmetry == PairSymmetry::S2 && i_range != j_range {
        return Err(UnsupportedSymmetryError(format!(
            "pair packing requires coincident i and j shell ranges, got {i_range} and {j_range}"
        ))
        .into());
    }

    let [i_table, j_table, k_table] = tables;
    let iloc = resolve_table(env, i_range, kind.repr(0), i_table)?;
    let jloc = resolve_table(env, j_range, kind.repr(1), j_table)?;
    let kloc = resolve_table(env, k_range, kind.repr(2), k_table)?;

    let npair = match symmetry {
        PairSymmetry::S1 => iloc.n_funcs() * jloc.n_funcs(),
        PairSymmetry::S2 => triangle(iloc.n_funcs()),
    };
    let naux = kloc.n_funcs();
    Ok(BatchLayout {
        iloc,
        jloc,
        kloc,
        symmetry,
        comp: kind.components(),
        npair,
        naux,
    })
}

/// Resolves the storage layout of a two-centre batch over a single range.
pub fn two_center_layout(
    kind: &IntegralKind,
    env: &BasisEnv,
    range: ShellRange,
    table: Option<OffsetTable>,
) -> Result<TwoCenterLayout, anyhow::Error> {
    ensure!(
        kind.centers() == 2,
        "Integral kind `{}` has {} centres; a two-centre batch requires 2.",
        kind.name(),
        kind.centers()
    );
    let loc = resolve_table(env, range, kind.repr(0), table)?;
    Ok(TwoCenterLayout {
        loc,
        comp: kind.components(),
    })
}

fn resolve_table(
    env: &BasisEnv,
    range: ShellRange,
    repr: ShellRepr,
    table: Option<OffsetTable>,
) -> Result<OffsetTable, InvalidRangeError> {
    match table {
        Some(table) => {
            if table.range() != range {
                return Err(InvalidRangeError(format!(
                    "precomputed offset table describes range {}, batch requests {range}",
                    table.range()
                )));
            }
            Ok(table)
        }
        None => OffsetTable::build(env, range, repr),
    }
}
