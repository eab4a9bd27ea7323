//! Built-in basis-set tables and element-wise shell lookup.
//!
//! The tables embed Basis Set Exchange data for the sets shipped with the
//! crate, so no network access is required to resolve a basis. External
//! callers with their own basis data can bypass the library entirely and
//! construct a [`BasisEnv`](crate::basis::env::BasisEnv) directly.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use lazy_static::lazy_static;

use crate::auxiliary::atom::Atom;
use crate::basis::env::BasisEnv;
use crate::basis::shell::Shell;

#[cfg(test)]
#[path = "library_tests.rs"]
mod library_tests;

// ------------------
// UnknownBasisError
// ------------------

/// An error signifying a basis-set lookup with no definition for the
/// requested element.
#[derive(Debug, Clone)]
pub struct UnknownBasisError {
    /// The element symbol of the failed lookup.
    pub element: String,

    /// The requested basis-set name.
    pub basis: String,
}

impl fmt::Display for UnknownBasisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No definition of basis set `{}` for element {}.",
            self.basis, self.element
        )
    }
}

impl Error for UnknownBasisError {}

// ---------
// ShellDef
// ---------

/// One shell entry of a basis-set table: an angular momentum, a primitive
/// exponent list and one coefficient column per contracted function.
#[derive(Clone, Debug)]
pub struct ShellDef {
    /// The angular momentum quantum number.
    pub l: u32,

    /// The primitive exponents.
    pub exponents: Vec<f64>,

    /// One inner vector of `exponents.len()` contraction coefficients per
    /// contracted function.
    pub coefficients: Vec<Vec<f64>>,
}

impl ShellDef {
    fn new(l: u32, exponents: &[f64], coefficients: &[&[f64]]) -> Self {
        Self {
            l,
            exponents: exponents.to_vec(),
            coefficients: coefficients.iter().map(|d| d.to_vec()).collect(),
        }
    }
}

// STO-3G first-row contraction coefficients are shared across elements; only
// the exponents differ.
const STO3G_1S: &[f64] = &[0.1543289673, 0.5353281423, 0.4446345422];
const STO3G_2S: &[f64] = &[-0.09996722919, 0.3995128261, 0.7001154689];
const STO3G_2P: &[f64] = &[0.1559162750, 0.6076837186, 0.3919573931];

lazy_static! {
    static ref LIBRARY: HashMap<&'static str, HashMap<&'static str, Vec<ShellDef>>> = {
        let mut sto3g = HashMap::new();
        sto3g.insert(
            "H",
            vec![ShellDef::new(
                0,
                &[3.425250914, 0.6239137298, 0.1688554040],
                &[STO3G_1S],
            )],
        );
        sto3g.insert(
            "C",
            vec![
                ShellDef::new(0, &[71.61683735, 13.04509632, 3.530512160], &[STO3G_1S]),
                ShellDef::new(0, &[2.941249355, 0.6834830964, 0.2222899159], &[STO3G_2S]),
                ShellDef::new(1, &[2.941249355, 0.6834830964, 0.2222899159], &[STO3G_2P]),
            ],
        );
        sto3g.insert(
            "N",
            vec![
                ShellDef::new(0, &[99.10616896, 18.05231239, 4.885660238], &[STO3G_1S]),
                ShellDef::new(0, &[3.780455879, 0.8784966449, 0.2857143744], &[STO3G_2S]),
                ShellDef::new(1, &[3.780455879, 0.8784966449, 0.2857143744], &[STO3G_2P]),
            ],
        );
        sto3g.insert(
            "O",
            vec![
                ShellDef::new(0, &[130.7093214, 23.80886605, 6.443608313], &[STO3G_1S]),
                ShellDef::new(0, &[5.033151319, 1.169596125, 0.3803889600], &[STO3G_2S]),
                ShellDef::new(1, &[5.033151319, 1.169596125, 0.3803889600], &[STO3G_2P]),
            ],
        );

        let mut lib = HashMap::new();
        lib.insert("sto-3g", sto3g);
        lib
    };
}

/// Resolves the shell definitions of `basis` for `element`.
///
/// # Arguments
///
/// * `element` - The element symbol, *e.g.* `"O"`.
/// * `basis` - The basis-set name, case-insensitive.
///
/// # Returns
///
/// The shell definitions, or [`UnknownBasisError`] if the library has no
/// entry for the pair.
pub fn basis_shells(element: &str, basis: &str) -> Result<Vec<ShellDef>, UnknownBasisError> {
    let key = basis.to_lowercase();
    LIBRARY
        .get(key.as_str())
        .and_then(|sets| sets.get(element))
        .cloned()
        .ok_or_else(|| UnknownBasisError {
            element: element.to_string(),
            basis: basis.to_string(),
        })
}

/// Assembles a [`BasisEnv`] for `atoms` from per-atom shell definitions.
///
/// The atom table of the result is `atoms` verbatim (index-for-index); the
/// shell and parameter tables are freshly allocated, with each shell's
/// exponents followed by its contraction-major coefficients appended to the
/// flat buffer in shell order.
pub fn assemble_env(
    atoms: &[Atom],
    shell_defs: &[Vec<ShellDef>],
) -> Result<BasisEnv, anyhow::Error> {
    let mut shells = Vec::new();
    let mut params = Vec::new();
    for (atom_index, defs) in shell_defs.iter().enumerate() {
        for def in defs {
            let nprim = def.exponents.len();
            let nctr = def.coefficients.len();
            let ptr_exp = params.len();
            params.extend_from_slice(&def.exponents);
            let ptr_coeff = params.len();
            for column in &def.coefficients {
                params.extend_from_slice(column);
            }
            shells.push(Shell {
                atom: atom_index,
                l: def.l,
                nprim,
                nctr,
                ptr_exp,
                ptr_coeff,
            });
        }
    }
    BasisEnv::new(atoms.to_vec(), shells, params)
}

/// Constructs a [`BasisEnv`] for `atoms` with the named library basis applied
/// to every atom.
///
/// # Arguments
///
/// * `atoms` - The atoms of the system, in order.
/// * `basis` - The basis-set name to resolve for every element present.
///
/// # Returns
///
/// The constructed environment, or [`UnknownBasisError`] for the first
/// element the library cannot resolve.
pub fn build_env(atoms: &[Atom], basis: &str) -> Result<BasisEnv, anyhow::Error> {
    let shell_defs = atoms
        .iter()
        .map(|atom| basis_shells(&atom.atomic_symbol, basis))
        .collect::<Result<Vec<_>, _>>()?;
    assemble_env(atoms, &shell_defs)
}
