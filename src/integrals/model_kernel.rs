//! Deterministic model kernels for driver and pipeline tests.
//!
//! Two families are provided:
//! - hash kernels, whose block entries are seeded-RNG functions of the
//!   participating function indices (symmetric under bra exchange), enough
//!   for layout, packing and determinism tests;
//! - Gram kernels, whose auxiliary functions carry latent vectors
//!   `v_κ ∈ R^M` over the latent space of symmetrised bra pairs. Two-centre
//!   blocks are `v·v` inner products (an SPD Gram matrix whenever
//!   `naux == M`), three-centre blocks are scaled latent components, and the
//!   model's exact four-centre tensor is diagonal in the packed pair index,
//!   so the density-fitted tensor reproduces it exactly, up to round-off,
//!   when the auxiliary set spans the latent space.

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::basis::env::BasisEnv;
use crate::basis::shell::ShellRepr;
use crate::integrals::kernel::{IntegralKernel, IntegralKind, KernelContext};
use crate::integrals::layout::triangle;
use crate::integrals::EvaluationError;

const SALT_LATENT: u64 = 0x1234_5678;
const SALT_HASH: u64 = 0x9abc_def0;

fn mix(a: u64, b: u64, c: u64) -> u64 {
    a.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ b.wrapping_mul(0xBF58_476D_1CE4_E5B9)
        ^ c.wrapping_mul(0x94D0_49BB_1331_11EB)
}

/// A reproducible value in [-1, 1) derived from `seed`.
fn sym_noise(seed: u64) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed);
    2.0 * rng.gen::<f64>() - 1.0
}

/// The packed index of the unordered function pair (mu, nu).
pub(crate) fn packed_pair(mu: usize, nu: usize) -> usize {
    let (hi, lo) = if mu >= nu { (mu, nu) } else { (nu, mu) };
    triangle(hi) + lo
}

/// The scale attached to the packed bra pair `p` in the Gram model.
pub(crate) fn pair_scale(p: usize) -> f64 {
    0.5 + 0.4 * sym_noise(mix(p as u64, 1, SALT_LATENT)).abs()
}

/// The `m`-th component of the latent vector of auxiliary function `k`:
/// near-identity columns, well-conditioned whenever `naux <= M`.
pub(crate) fn latent_component(k: usize, m: usize) -> f64 {
    let delta = if k == m { 1.0 } else { 0.0 };
    delta + 0.05 * sym_noise(mix(k as u64, m as u64, SALT_LATENT))
}

/// The latent-space dimension of `env`: the packed pair count of its first
/// segment under `repr`.
pub(crate) fn latent_dim(env: &BasisEnv, repr: ShellRepr) -> usize {
    let seg = env.segments()[0];
    let nao = seg
        .shell_range()
        .shells()
        .map(|s| env.shell(s).n_funcs(repr))
        .sum::<usize>();
    triangle(nao)
}

/// Per-dimension segment-relative function offsets of every shell of `env`.
fn segment_offsets(env: &BasisEnv, repr: ShellRepr) -> Vec<usize> {
    let mut offsets = vec![0; env.n_shells()];
    for seg in env.segments() {
        let mut off = 0;
        for s in seg.shell_range().shells() {
            offsets[s] = off;
            off += env.shell(s).n_funcs(repr);
        }
    }
    offsets
}

/// The segment index of `shell` within `env`.
fn segment_of(env: &BasisEnv, shell: usize) -> usize {
    env.segments()
        .iter()
        .position(|seg| shell >= seg.shell_start && shell < seg.shell_start + seg.shell_count)
        .expect("Shell belongs to no segment.")
}

struct ModelContext<'a> {
    env: &'a BasisEnv,
    kind: IntegralKind,
    offsets: [Vec<usize>; 3],
    gram: bool,
}

impl ModelContext<'_> {
    fn block_dims(&self, shells: &[usize]) -> Vec<usize> {
        shells
            .iter()
            .enumerate()
            .map(|(dim, &s)| self.env.shell(s).n_funcs(self.kind.repr(dim)))
            .collect()
    }

    /// A globally unique tag for the `a`-th function of `shell` along `dim`.
    fn fn_tag(&self, dim: usize, shell: usize, a: usize) -> u64 {
        let seg = segment_of(self.env, shell) as u64;
        seg * 1_000_000 + (self.offsets[dim][shell] + a) as u64
    }
}

impl KernelContext for ModelContext<'_> {
    fn evaluate(&mut self, shells: &[usize]) -> Result<ArrayD<f64>, EvaluationError> {
        let comp = self.kind.components();
        let dims = self.block_dims(shells);
        match (self.kind.centers(), shells) {
            (3, &[si, sj, sk]) => {
                let (di, dj, dk) = (dims[0], dims[1], dims[2]);
                let mut block = ArrayD::zeros(IxDyn(&[comp, di, dj, dk]));
                for mu in 0..di {
                    for nu in 0..dj {
                        for kap in 0..dk {
                            let val = if self.gram {
                                let p = packed_pair(
                                    self.offsets[0][si] + mu,
                                    self.offsets[1][sj] + nu,
                                );
                                let k = self.offsets[2][sk] + kap;
                                pair_scale(p) * latent_component(k, p)
                            } else {
                                let ti = self.fn_tag(0, si, mu);
                                let tj = self.fn_tag(1, sj, nu);
                                let tk = self.fn_tag(2, sk, kap);
                                sym_noise(mix(ti.min(tj), ti.max(tj), tk ^ SALT_HASH))
                            };
                            for c in 0..comp {
                                block[[c, mu, nu, kap]] = (c + 1) as f64 * val;
                            }
                        }
                    }
                }
                Ok(block)
            }
            (2, &[si, sj]) => {
                let (di, dj) = (dims[0], dims[1]);
                let m_latent = latent_dim(self.env, self.kind.repr(0)).max(1);
                let mut block = ArrayD::zeros(IxDyn(&[comp, di, dj]));
                for mu in 0..di {
                    for nu in 0..dj {
                        let k = self.offsets[0][si] + mu;
                        let l = self.offsets[1][sj] + nu;
                        let val = if self.gram {
                            (0..m_latent)
                                .map(|m| latent_component(k, m) * latent_component(l, m))
                                .sum::<f64>()
                        } else {
                            let ti = self.fn_tag(0, si, mu);
                            let tj = self.fn_tag(1, sj, nu);
                            sym_noise(mix(ti.min(tj), ti.max(tj), SALT_HASH))
                        };
                        for c in 0..comp {
                            block[[c, mu, nu]] = (c + 1) as f64 * val;
                        }
                    }
                }
                Ok(block)
            }
            _ => Err(EvaluationError(format!(
                "model kernel received {} shells for a {}-centre kind",
                shells.len(),
                self.kind.centers()
            ))),
        }
    }
}

/// A model kernel whose blocks are reproducible hashes of the participating
/// function indices, symmetric under bra exchange.
pub(crate) struct HashKernel {
    kind: IntegralKind,
}

impl HashKernel {
    pub(crate) fn new(kind: IntegralKind) -> Self {
        Self { kind }
    }
}

impl IntegralKernel for HashKernel {
    fn kind(&self) -> &IntegralKind {
        &self.kind
    }

    fn prepare<'a>(
        &'a self,
        env: &'a BasisEnv,
    ) -> Result<Box<dyn KernelContext + 'a>, EvaluationError> {
        Ok(Box::new(ModelContext {
            env,
            kind: self.kind.clone(),
            offsets: [
                segment_offsets(env, self.kind.repr(0)),
                segment_offsets(env, self.kind.repr(1)),
                segment_offsets(env, self.kind.repr(2)),
            ],
            gram: false,
        }))
    }
}

/// The latent Gram-model kernel; see the module documentation.
pub(crate) struct GramKernel {
    kind: IntegralKind,
}

impl GramKernel {
    /// The spherical three-centre Gram kernel.
    pub(crate) fn three_center() -> Self {
        Self {
            kind: IntegralKind::spherical("model3c2e", 3),
        }
    }

    /// The spherical two-centre Gram kernel. The latent dimension is derived
    /// from the first segment of the environment the context is prepared
    /// for, so the two-centre matrix of an auxiliary environment standing
    /// alone must be generated from the concatenated primary ⊕ auxiliary
    /// environment.
    pub(crate) fn two_center() -> Self {
        Self {
            kind: IntegralKind::spherical("model2c2e", 2),
        }
    }
}

impl IntegralKernel for GramKernel {
    fn kind(&self) -> &IntegralKind {
        &self.kind
    }

    fn prepare<'a>(
        &'a self,
        env: &'a BasisEnv,
    ) -> Result<Box<dyn KernelContext + 'a>, EvaluationError> {
        Ok(Box::new(ModelContext {
            env,
            kind: self.kind.clone(),
            offsets: [
                segment_offsets(env, self.kind.repr(0)),
                segment_offsets(env, self.kind.repr(1)),
                segment_offsets(env, self.kind.repr(2)),
            ],
            gram: true,
        }))
    }
}
