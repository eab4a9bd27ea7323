//! # rifit: density-fitted two-electron integral tensors
//!
//! `rifit` assembles the density-fitted representation of the four-centre
//! electron-repulsion tensor used in quantum-chemical calculations. It covers:
//! - batch generation of three-centre and two-centre integrals over contiguous
//!   shell ranges of a basis environment, with spherical, Cartesian and mixed
//!   function conventions,
//! - symmetry-compressed packing of the bra pair index (full or
//!   triangular-packed storage),
//! - synthesis of auxiliary (fitting) basis environments from built-in basis
//!   tables or even-tempered progressions, and
//! - Cholesky factorization of the two-centre metric followed by a triangular
//!   solve against the three-centre tensor, yielding the compact
//!   `(naux, npair)` fitting tensor.
//!
//! Primitive-integral evaluation itself is *not* performed here: batches are
//! driven through the opaque [`integrals::kernel::IntegralKernel`] interface,
//! so any backend able to produce dense shell blocks can be plugged in and
//! registered under its integral-kind name at startup.
//!
//! ## Linear algebra backend
//!
//! The Cholesky and triangular-solve stages are backed by
//! [`ndarray-linalg`](https://docs.rs/ndarray-linalg/latest/ndarray_linalg/).
//! One backend feature must be enabled; the default is `openblas-static`:
//! - `openblas-static`: builds OpenBLAS and links statically
//! - `openblas-system`: links an existing OpenBLAS in the system
//! - `netlib-static`: builds LAPACK and links statically
//! - `netlib-system`: links an existing LAPACK in the system
//! - `intel-mkl-static`: links static Intel MKL, downloading if not found
//! - `intel-mkl-system`: links shared Intel MKL in the system
//!
//! ## Examples and usage
//!
//! For most items (structs, enums, functions, and traits), their usages are
//! illustrated in test functions. For more explanation, please consult this
//! documentation.
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod auxiliary;
pub mod basis;
pub mod df;
pub mod integrals;
