//! Basis environments: atom tables, shell tables and flat parameter buffers.

use anyhow::{self, ensure};
use serde::{Deserialize, Serialize};

use crate::auxiliary::atom::Atom;
use crate::basis::shell::{Shell, ShellRepr};
use crate::integrals::ShellRange;

#[cfg(test)]
#[path = "env_tests.rs"]
mod env_tests;

// -----------
// EnvSegment
// -----------

/// A contiguous block of shells and atoms contributed by one source
/// environment after concatenation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSegment {
    /// Index of the first shell of this segment in the concatenated shell
    /// table.
    pub shell_start: usize,

    /// The number of shells in this segment.
    pub shell_count: usize,

    /// Index of the first atom of this segment in the concatenated atom
    /// table.
    pub atom_start: usize,

    /// The number of atoms in this segment.
    pub atom_count: usize,
}

impl EnvSegment {
    /// The shells of this segment as a [`ShellRange`].
    #[must_use]
    pub fn shell_range(&self) -> ShellRange {
        ShellRange::new(self.shell_start, self.shell_count)
    }
}

// ---------
// BasisEnv
// ---------

/// An immutable basis environment: an atom table, a shell table and the flat
/// floating-point parameter buffer holding every shell's exponents and
/// contraction coefficients.
///
/// Environments are concatenable: [`Self::concat`] produces a new environment
/// in which the shells of each source environment occupy one contiguous index
/// block, in concatenation order, with every shell's parameter pointers
/// still valid against the combined buffer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BasisEnv {
    atoms: Vec<Atom>,
    shells: Vec<Shell>,
    params: Vec<f64>,
    segments: Vec<EnvSegment>,
}

impl BasisEnv {
    /// Constructs a single-segment environment, verifying that every shell's
    /// atom index and parameter pointers are consistent with the supplied
    /// tables.
    ///
    /// # Arguments
    ///
    /// * `atoms` - The atom table.
    /// * `shells` - The shell table.
    /// * `params` - The flat parameter buffer indexed by the shells' `ptr_exp`
    ///     and `ptr_coeff` fields.
    ///
    /// # Returns
    ///
    /// The constructed environment.
    pub fn new(
        atoms: Vec<Atom>,
        shells: Vec<Shell>,
        params: Vec<f64>,
    ) -> Result<Self, anyhow::Error> {
        for (i, shell) in shells.iter().enumerate() {
            ensure!(
                shell.atom < atoms.len(),
                "Shell {i} is centred on atom {} but the atom table has only {} entries.",
                shell.atom,
                atoms.len()
            );
            ensure!(
                shell.nprim > 0 && shell.nctr > 0,
                "Shell {i} has a degenerate contraction ({} primitives, {} contractions).",
                shell.nprim,
                shell.nctr
            );
            ensure!(
                shell.ptr_exp + shell.nprim <= params.len()
                    && shell.ptr_coeff + shell.nprim * shell.nctr <= params.len(),
                "Shell {i} points past the end of the parameter buffer."
            );
        }
        let segments = vec![EnvSegment {
            shell_start: 0,
            shell_count: shells.len(),
            atom_start: 0,
            atom_count: atoms.len(),
        }];
        Ok(Self {
            atoms,
            shells,
            params,
            segments,
        })
    }

    /// The atom table.
    #[must_use]
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// The shell table.
    #[must_use]
    pub fn shells(&self) -> &[Shell] {
        &self.shells
    }

    /// The flat parameter buffer.
    #[must_use]
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// The contiguous segments contributed by each concatenated source
    /// environment, in concatenation order.
    #[must_use]
    pub fn segments(&self) -> &[EnvSegment] {
        &self.segments
    }

    /// The number of shells in the environment.
    #[must_use]
    pub fn n_shells(&self) -> usize {
        self.shells.len()
    }

    /// The number of atoms in the environment.
    #[must_use]
    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// The shell with index `i`.
    #[must_use]
    pub fn shell(&self, i: usize) -> &Shell {
        &self.shells[i]
    }

    /// The exponents of `shell`.
    #[must_use]
    pub fn exponents(&self, shell: &Shell) -> &[f64] {
        &self.params[shell.ptr_exp..shell.ptr_exp + shell.nprim]
    }

    /// The contraction coefficients of `shell`, contraction-major.
    #[must_use]
    pub fn coefficients(&self, shell: &Shell) -> &[f64] {
        &self.params[shell.ptr_coeff..shell.ptr_coeff + shell.nprim * shell.nctr]
    }

    /// The total number of basis functions in the environment under `repr`.
    #[must_use]
    pub fn nao(&self, repr: ShellRepr) -> usize {
        self.shells.iter().map(|shell| shell.n_funcs(repr)).sum()
    }

    /// Concatenates `self` with `other` into a new environment.
    ///
    /// The shells and atoms of `self` keep their indices; those of `other`
    /// are shifted past them, and the parameter pointers of `other`'s shells
    /// are shifted past `self`'s parameter buffer. The segment tables of both
    /// sources are carried over, so the partition of the result into source
    /// blocks remains recoverable.
    #[must_use]
    pub fn concat(&self, other: &BasisEnv) -> BasisEnv {
        let atom_shift = self.atoms.len();
        let param_shift = self.params.len();
        let shell_shift = self.shells.len();

        let mut atoms = self.atoms.clone();
        atoms.extend(other.atoms.iter().cloned());

        let mut shells = self.shells.clone();
        shells.extend(other.shells.iter().map(|shell| Shell {
            atom: shell.atom + atom_shift,
            ptr_exp: shell.ptr_exp + param_shift,
            ptr_coeff: shell.ptr_coeff + param_shift,
            ..*shell
        }));

        let mut params = self.params.clone();
        params.extend_from_slice(&other.params);

        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().map(|seg| EnvSegment {
            shell_start: seg.shell_start + shell_shift,
            atom_start: seg.atom_start + atom_shift,
            ..*seg
        }));

        BasisEnv {
            atoms,
            shells,
            params,
            segments,
        }
    }
}
