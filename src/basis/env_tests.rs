use nalgebra::Point3;

use crate::auxiliary::atom::{Atom, ElementMap};
use crate::basis::env::BasisEnv;
use crate::basis::shell::{Shell, ShellRepr};

fn h_atom(z: f64, emap: &ElementMap) -> Atom {
    Atom::new("H", Point3::new(0.0, 0.0, z), emap).expect("Unable to construct H.")
}

/// A tiny environment with `n` s-shells, one per atom, one primitive each.
fn s_only_env(n: usize) -> BasisEnv {
    let emap = ElementMap::new();
    let atoms = (0..n).map(|i| h_atom(i as f64, &emap)).collect::<Vec<_>>();
    let shells = (0..n)
        .map(|i| Shell {
            atom: i,
            l: 0,
            nprim: 1,
            nctr: 1,
            ptr_exp: 2 * i,
            ptr_coeff: 2 * i + 1,
        })
        .collect::<Vec<_>>();
    let params = (0..n).flat_map(|i| [0.5 + i as f64, 1.0]).collect::<Vec<_>>();
    BasisEnv::new(atoms, shells, params).expect("Unable to construct the environment.")
}

#[test]
fn test_env_construction_validation() {
    let emap = ElementMap::new();
    let atoms = vec![h_atom(0.0, &emap)];
    // Shell centred on a non-existent atom.
    let shells = vec![Shell {
        atom: 1,
        l: 0,
        nprim: 1,
        nctr: 1,
        ptr_exp: 0,
        ptr_coeff: 1,
    }];
    assert!(BasisEnv::new(atoms.clone(), shells, vec![0.5, 1.0]).is_err());

    // Shell pointing past the parameter buffer.
    let shells = vec![Shell {
        atom: 0,
        l: 0,
        nprim: 2,
        nctr: 1,
        ptr_exp: 0,
        ptr_coeff: 2,
    }];
    assert!(BasisEnv::new(atoms, shells, vec![0.5, 1.0]).is_err());
}

#[test]
fn test_env_nao() {
    let emap = ElementMap::new();
    let atoms = vec![h_atom(0.0, &emap)];
    let shells = vec![
        Shell {
            atom: 0,
            l: 0,
            nprim: 1,
            nctr: 1,
            ptr_exp: 0,
            ptr_coeff: 1,
        },
        Shell {
            atom: 0,
            l: 2,
            nprim: 1,
            nctr: 1,
            ptr_exp: 0,
            ptr_coeff: 1,
        },
    ];
    let env = BasisEnv::new(atoms, shells, vec![0.5, 1.0]).expect("Unable to construct.");
    assert_eq!(env.nao(ShellRepr::Spherical), 6);
    assert_eq!(env.nao(ShellRepr::Cartesian), 7);
}

#[test]
fn test_env_concat_shell_index_partition() {
    let envs = [s_only_env(2), s_only_env(3), s_only_env(1)];
    let cat = envs[0].concat(&envs[1]).concat(&envs[2]);

    assert_eq!(cat.n_shells(), 6);
    assert_eq!(cat.n_atoms(), 6);
    assert_eq!(cat.segments().len(), 3);

    // Shell k of source environment m maps to the global index
    // (sum of shell counts of environments 0..m) + k, exactly.
    let mut shift = 0;
    for (m, env) in envs.iter().enumerate() {
        let seg = cat.segments()[m];
        assert_eq!(seg.shell_start, shift);
        assert_eq!(seg.shell_count, env.n_shells());
        for k in 0..env.n_shells() {
            let global = cat.shell(shift + k);
            let local = env.shell(k);
            // Parameter pointers stay valid across concatenation.
            assert_eq!(cat.exponents(global), env.exponents(local));
            assert_eq!(cat.coefficients(global), env.coefficients(local));
            assert_eq!(
                cat.atoms()[global.atom].coordinates,
                env.atoms()[local.atom].coordinates
            );
        }
        shift += env.n_shells();
    }
}

#[test]
fn test_env_concat_is_non_destructive() {
    let a = s_only_env(2);
    let b = s_only_env(2);
    let before = a.params().to_vec();
    let _ = a.concat(&b);
    assert_eq!(a.params(), &before[..]);
    assert_eq!(a.n_shells(), 2);
}
