//! Integral-batch generation over shell ranges: shared range, symmetry,
//! cancellation and error types, plus the batch drivers themselves.

use std::error::Error;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod kernel;
pub mod layout;
pub mod three_center;
pub mod two_center;

#[cfg(test)]
#[path = "model_kernel.rs"]
pub(crate) mod model_kernel;

// -----------
// ShellRange
// -----------

/// A contiguous sub-sequence of shells within one basis environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShellRange {
    start: usize,
    count: usize,
}

impl ShellRange {
    /// Constructs the range covering `count` shells starting at shell
    /// `start`.
    #[must_use]
    pub fn new(start: usize, count: usize) -> Self {
        Self { start, count }
    }

    /// The index of the first shell in the range.
    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    /// The number of shells in the range.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// The index one past the last shell in the range.
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    /// Iterates over the absolute shell indices of the range.
    pub fn shells(&self) -> Range<usize> {
        self.start..self.end()
    }
}

impl fmt::Display for ShellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

// -------------
// PairSymmetry
// -------------

/// The storage symmetry applied to the bra (i, j) pair index of a
/// three-centre batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairSymmetry {
    /// Every ordered (i, j) pair is stored.
    S1,

    /// Only pairs with i ≥ j are stored, at triangular-packed row indices.
    /// Requires the i and j shell ranges to coincide.
    S2,
}

impl fmt::Display for PairSymmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairSymmetry::S1 => write!(f, "s1"),
            PairSymmetry::S2 => write!(f, "s2"),
        }
    }
}

// ------------
// CancelToken
// ------------

/// A cooperative cancellation flag shared between a batch build and its
/// owner. Batch drivers poll the token between work items; a cancelled build
/// terminates with [`BatchCancelled`] and never exposes a partially filled
/// buffer.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every build holding a clone of this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Checks whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ------------
// Error types
// ------------

/// An error signifying a malformed shell range or a degenerate per-shell
/// cardinality.
#[derive(Debug, Clone)]
pub struct InvalidRangeError(pub String);

impl fmt::Display for InvalidRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid shell range: {}.", self.0)
    }
}

impl Error for InvalidRangeError {}

/// An error signifying a packing request that the participating shell ranges
/// cannot support.
#[derive(Debug, Clone)]
pub struct UnsupportedSymmetryError(pub String);

impl fmt::Display for UnsupportedSymmetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported storage symmetry: {}.", self.0)
    }
}

impl Error for UnsupportedSymmetryError {}

/// An error signifying a caller-supplied output buffer whose shape does not
/// match the resolved batch layout exactly.
#[derive(Debug, Clone)]
pub struct BufferSizeMismatchError {
    /// The shape required by the batch layout.
    pub expected: Vec<usize>,

    /// The shape of the supplied buffer.
    pub found: Vec<usize>,
}

impl fmt::Display for BufferSizeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Output buffer shape mismatch: expected {:?}, found {:?}.",
            self.expected, self.found
        )
    }
}

impl Error for BufferSizeMismatchError {}

/// An error raised by a primitive-integral kernel while evaluating a shell
/// block or preparing its context.
#[derive(Debug, Clone)]
pub struct EvaluationError(pub String);

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Integral evaluation error: {}.", self.0)
    }
}

impl Error for EvaluationError {}

/// The distinguished outcome of a cooperatively cancelled batch build. This
/// is not a failure of the inputs: it is the expected early termination
/// requested through a [`CancelToken`].
#[derive(Debug, Clone)]
pub struct BatchCancelled;

impl fmt::Display for BatchCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Batch build cancelled.")
    }
}

impl Error for BatchCancelled {}

/// Checks whether `err` reports a cooperative cancellation rather than a
/// failure.
#[must_use]
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<BatchCancelled>().is_some())
}
