//! Synthesis of auxiliary (fitting) basis environments.

use std::collections::HashMap;

use anyhow::{self, ensure};
use itertools::Itertools;
use log;

use crate::basis::env::BasisEnv;
use crate::basis::library::{self, ShellDef, UnknownBasisError};
use crate::basis::shell::ShellRepr;

#[cfg(test)]
#[path = "fitting_tests.rs"]
mod fitting_tests;

/// How the fitting basis of each element is chosen when synthesizing an
/// auxiliary environment.
#[derive(Clone, Debug)]
pub enum AuxBasisSpec {
    /// One named library set applied uniformly to every distinct element
    /// present.
    Uniform(String),

    /// An explicit mapping from element symbols to set names.
    PerElement(HashMap<String, String>),

    /// Even-tempered geometric progressions derived per element from the
    /// exponent ranges of the primary environment. `beta` is the progression
    /// ratio and must exceed 1.
    EvenTempered { beta: f64 },
}

/// Synthesizes an auxiliary basis environment for the atoms of `primary`.
///
/// The atom table of the result corresponds to `primary` index-for-index
/// (same elements, same coordinates), so that environments concatenated
/// downstream stay aligned atom-by-atom. Shell and parameter tables are
/// freshly allocated; nothing of `primary` is aliased or mutated.
///
/// # Arguments
///
/// * `primary` - The primary (molecular) environment.
/// * `spec` - The fitting-basis selection.
///
/// # Returns
///
/// The synthesized environment, or [`UnknownBasisError`] if a requested
/// basis/element pair has no definition.
pub fn synthesize_aux_basis(
    primary: &BasisEnv,
    spec: &AuxBasisSpec,
) -> Result<BasisEnv, anyhow::Error> {
    let shell_defs = primary
        .atoms()
        .iter()
        .enumerate()
        .map(|(atom_index, atom)| {
            let element = atom.atomic_symbol.as_str();
            match spec {
                AuxBasisSpec::Uniform(name) => Ok(library::basis_shells(element, name)?),
                AuxBasisSpec::PerElement(map) => {
                    let name = map.get(element).ok_or_else(|| UnknownBasisError {
                        element: element.to_string(),
                        basis: "(per-element spec)".to_string(),
                    })?;
                    Ok(library::basis_shells(element, name)?)
                }
                AuxBasisSpec::EvenTempered { beta } => {
                    even_tempered_shells(primary, atom_index, *beta)
                }
            }
        })
        .collect::<Result<Vec<_>, anyhow::Error>>()?;

    let aux = library::assemble_env(primary.atoms(), &shell_defs)?;
    log::debug!(
        "aux basis {:?}: {} shells, {} spherical functions over {} atoms",
        spec,
        aux.n_shells(),
        aux.nao(ShellRepr::Spherical),
        aux.n_atoms()
    );
    Ok(aux)
}

/// Generates even-tempered shell definitions for one atom of `primary`.
///
/// For an atom whose primary shells span exponents `[a_min, a_max]` and
/// angular momenta up to `l_max`, uncontracted shells with exponents
/// `2 a_min · beta^k` up to `2 a_max` are generated for every angular
/// momentum up to `2 l_max`, covering the exponent and angular-momentum
/// ranges of primary function products.
fn even_tempered_shells(
    primary: &BasisEnv,
    atom_index: usize,
    beta: f64,
) -> Result<Vec<ShellDef>, anyhow::Error> {
    ensure!(
        beta > 1.0,
        "Even-tempered progression ratio must exceed 1, got {beta}."
    );
    let atom_shells = primary
        .shells()
        .iter()
        .filter(|shell| shell.atom == atom_index)
        .collect_vec();
    ensure!(
        !atom_shells.is_empty(),
        "Atom {atom_index} carries no primary shells to derive an even-tempered basis from."
    );

    let exps = atom_shells
        .iter()
        .flat_map(|shell| primary.exponents(shell).iter().copied())
        .collect_vec();
    let a_min = exps.iter().copied().fold(f64::INFINITY, f64::min);
    let a_max = exps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let l_max = atom_shells
        .iter()
        .map(|shell| shell.l)
        .max()
        .expect("The maximum angular momentum could not be determined.");

    let lo = 2.0 * a_min;
    let hi = 2.0 * a_max;
    let n_exp = ((hi / lo).ln() / beta.ln()).ceil() as usize + 1;

    let defs = (0..=2 * l_max)
        .flat_map(|l| {
            (0..n_exp).map(move |k| (l, k))
        })
        .map(|(l, k)| ShellDef {
            l,
            exponents: vec![lo * beta.powi(k as i32)],
            coefficients: vec![vec![1.0]],
        })
        .collect_vec();
    Ok(defs)
}
