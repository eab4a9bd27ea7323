//! Atoms and element data.

use std::collections::HashMap;
use std::fmt;

use anyhow::{self, format_err};
use nalgebra::Point3;
use periodic_table;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "atom_tests.rs"]
mod atom_tests;

/// A struct storing a look-up of element symbols to give atomic numbers
/// and atomic masses.
pub struct ElementMap<'a> {
    /// A [`HashMap`] from a symbol string to a tuple of atomic number and
    /// atomic mass.
    map: HashMap<&'a str, (u32, f64)>,
}

impl Default for ElementMap<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementMap<'static> {
    /// Creates a new [`ElementMap`] for all elements in the periodic table.
    #[must_use]
    pub fn new() -> ElementMap<'static> {
        let mut map = HashMap::new();
        let elements = periodic_table::periodic_table();
        for element in elements {
            let mass = parse_atomic_mass(element.atomic_mass);
            map.insert(element.symbol, (element.atomic_number, mass));
        }
        ElementMap { map }
    }
}

impl<'a> ElementMap<'a> {
    /// Returns the atomic number and atomic mass of the element with the
    /// given symbol, if any.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&(u32, f64)> {
        self.map.get(symbol)
    }
}

/// An auxiliary function that parses the atomic mass string in the format of
/// [`periodic_table`] to a single float value.
///
/// # Arguments
///
/// * `mass_str` - A string of mass value that is either `x.y(z)` where the
///     uncertain digit `z` is enclosed in parentheses, or `[x]` where `x`
///     is the mass number in place of precise experimental values.
///
/// # Returns
///
/// The numeric mass value.
fn parse_atomic_mass(mass_str: &str) -> f64 {
    let mass = mass_str.replace(&['(', ')', '[', ']'][..], "");
    mass.parse::<f64>()
        .unwrap_or_else(|_| panic!("Unable to parse atomic mass string {mass}."))
}

/// A struct representing an atom.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// The atomic number of the atom.
    pub atomic_number: u32,

    /// The atomic symbol of the atom.
    pub atomic_symbol: String,

    /// The weighted-average atomic mass for all naturally occurring isotopes.
    pub atomic_mass: f64,

    /// The position of the atom in Bohr.
    pub coordinates: Point3<f64>,
}

impl Atom {
    /// Constructs an [`Atom`] from an element symbol and a position.
    ///
    /// # Arguments
    ///
    /// * `symbol` - The element symbol, *e.g.* `"O"`.
    /// * `coordinates` - The position of the atom in Bohr.
    /// * `emap` - A hash map between atomic symbols and atomic numbers and
    ///     masses.
    ///
    /// # Returns
    ///
    /// The constructed atom, or an error if the symbol is not an element.
    pub fn new(
        symbol: &str,
        coordinates: Point3<f64>,
        emap: &ElementMap,
    ) -> Result<Atom, anyhow::Error> {
        let &(atomic_number, atomic_mass) = emap
            .get(symbol)
            .ok_or_else(|| format_err!("Unknown element symbol {symbol}."))?;
        Ok(Atom {
            atomic_number,
            atomic_symbol: symbol.to_string(),
            atomic_mass,
            coordinates,
        })
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:+.8} {:+.8} {:+.8}",
            self.atomic_symbol, self.coordinates[0], self.coordinates[1], self.coordinates[2]
        )
    }
}
