//! Basis shell descriptors and function-counting conventions.

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "shell_tests.rs"]
mod shell_tests;

// ----------
// ShellRepr
// ----------

/// The function convention determining how many basis functions a shell of a
/// given angular momentum expands to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShellRepr {
    /// Real solid-harmonic functions: $`2l + 1`$ per contraction.
    Spherical,

    /// Cartesian functions: $`(l + 1)(l + 2)/2`$ per contraction.
    Cartesian,
}

impl ShellRepr {
    /// The number of functions a single contraction of angular momentum `l`
    /// expands to under this convention.
    #[must_use]
    pub fn ncomps(self, l: u32) -> usize {
        let l = l
            .to_usize()
            .unwrap_or_else(|| panic!("Unable to convert the angular momentum {l} to `usize`."));
        match self {
            ShellRepr::Spherical => 2 * l + 1,
            ShellRepr::Cartesian => (l + 1) * (l + 2) / 2,
        }
    }
}

// ------
// Shell
// ------

/// A contracted shell of Gaussian basis functions within a basis environment.
///
/// Exponents and contraction coefficients are not stored inline: `ptr_exp`
/// and `ptr_coeff` index into the flat parameter buffer of the owning
/// [`BasisEnv`](crate::basis::env::BasisEnv), so that shell descriptors
/// remain valid under environment concatenation. The `nprim * nctr`
/// coefficients are laid out contraction-major: the coefficients of the
/// `c`-th contracted function occupy `ptr_coeff + c * nprim ..
/// ptr_coeff + (c + 1) * nprim`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shell {
    /// Index of the atom this shell is centred on, into the atom table of the
    /// owning environment.
    pub atom: usize,

    /// The angular momentum quantum number.
    pub l: u32,

    /// The number of primitive Gaussians.
    pub nprim: usize,

    /// The number of contracted functions sharing the primitives.
    pub nctr: usize,

    /// Offset of the `nprim` exponents in the parameter buffer.
    pub ptr_exp: usize,

    /// Offset of the `nprim * nctr` contraction coefficients in the parameter
    /// buffer.
    pub ptr_coeff: usize,
}

impl Shell {
    /// The number of basis functions this shell expands to under `repr`.
    #[must_use]
    pub fn n_funcs(&self, repr: ShellRepr) -> usize {
        repr.ncomps(self.l) * self.nctr
    }
}
