//! Primitive-integral kernels: the opaque evaluation boundary and the
//! process-wide kernel registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::basis::env::BasisEnv;
use crate::basis::shell::ShellRepr;
use crate::integrals::EvaluationError;

// -------------
// IntegralKind
// -------------

/// The identity of an integral kind: its name, the number of participating
/// centres, the number of components each function tuple produces (1 for
/// plain integrals, 3 for Cartesian-derivative kinds, …) and the explicit
/// function convention of every centre.
///
/// The per-centre [`ShellRepr`] tags replace name-based convention sniffing:
/// layout decisions read the tags, never the name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegralKind {
    name: String,
    centers: usize,
    components: usize,
    reprs: [ShellRepr; 3],
}

impl IntegralKind {
    /// An all-spherical kind over `centers` centres with one component.
    #[must_use]
    pub fn spherical(name: &str, centers: usize) -> Self {
        Self {
            name: name.to_string(),
            centers,
            components: 1,
            reprs: [ShellRepr::Spherical; 3],
        }
    }

    /// An all-Cartesian kind over `centers` centres with one component.
    #[must_use]
    pub fn cartesian(name: &str, centers: usize) -> Self {
        Self {
            name: name.to_string(),
            centers,
            components: 1,
            reprs: [ShellRepr::Cartesian; 3],
        }
    }

    /// A three-centre kind with spherical bra functions and a Cartesian
    /// auxiliary dimension.
    #[must_use]
    pub fn mixed_spherical_cartesian(name: &str) -> Self {
        Self {
            name: name.to_string(),
            centers: 3,
            components: 1,
            reprs: [
                ShellRepr::Spherical,
                ShellRepr::Spherical,
                ShellRepr::Cartesian,
            ],
        }
    }

    /// Replaces the component count, *e.g.* 3 for a Cartesian-derivative
    /// kind.
    #[must_use]
    pub fn with_components(mut self, components: usize) -> Self {
        self.components = components;
        self
    }

    /// The kind name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of participating centres (2 or 3).
    #[must_use]
    pub fn centers(&self) -> usize {
        self.centers
    }

    /// The number of components per function tuple.
    #[must_use]
    pub fn components(&self) -> usize {
        self.components
    }

    /// The function convention of centre `dim`.
    #[must_use]
    pub fn repr(&self, dim: usize) -> ShellRepr {
        self.reprs[dim]
    }
}

// --------------
// Kernel traits
// --------------

/// An opaque primitive-integral backend for one integral kind.
///
/// Implementations own whatever tables or screening data they need; the batch
/// drivers only ever see dense shell blocks. A kernel must be shareable
/// across worker threads; all per-evaluation mutable state lives in the
/// [`KernelContext`] it prepares.
pub trait IntegralKernel: Send + Sync {
    /// The integral kind this kernel evaluates.
    fn kind(&self) -> &IntegralKind;

    /// Performs the expensive per-environment setup and returns the context
    /// used for subsequent block evaluations.
    ///
    /// Contexts are intended to be amortised: one context serves many
    /// [`KernelContext::evaluate`] calls within a batch, and is released when
    /// dropped. A context must only ever be driven by one worker at a time.
    fn prepare<'a>(
        &'a self,
        env: &'a BasisEnv,
    ) -> Result<Box<dyn KernelContext + 'a>, EvaluationError>;
}

/// Per-batch, per-worker evaluation state of an [`IntegralKernel`].
pub trait KernelContext {
    /// Evaluates the dense block of one ordered shell pair or triple.
    ///
    /// # Arguments
    ///
    /// * `shells` - The absolute shell indices in the environment the context
    ///     was prepared for; two or three of them according to the kind's
    ///     centre count.
    ///
    /// # Returns
    ///
    /// The block in row-major `(components, d0, d1[, d2])` order, where `d`
    /// are the shells' function counts under the kind's per-centre
    /// conventions.
    fn evaluate(&mut self, shells: &[usize]) -> Result<ArrayD<f64>, EvaluationError>;
}

// ----------------
// Kernel registry
// ----------------

lazy_static! {
    static ref KERNEL_REGISTRY: RwLock<HashMap<String, Arc<dyn IntegralKernel>>> =
        RwLock::new(HashMap::new());
}

/// Binds `kernel` under its kind name in the process-wide registry.
///
/// Intended to be called once per kind at startup; rebinding a name replaces
/// the previous kernel for subsequent lookups.
pub fn register_kernel(kernel: Arc<dyn IntegralKernel>) {
    let name = kernel.kind().name().to_string();
    KERNEL_REGISTRY
        .write()
        .expect("The kernel registry is poisoned.")
        .insert(name, kernel);
}

/// Looks up the kernel bound under `name`, if any.
#[must_use]
pub fn registered_kernel(name: &str) -> Option<Arc<dyn IntegralKernel>> {
    KERNEL_REGISTRY
        .read()
        .expect("The kernel registry is poisoned.")
        .get(name)
        .cloned()
}
