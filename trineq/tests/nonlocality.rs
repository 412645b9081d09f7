//! End-to-end scenarios, grounded on the Shared Random Bit and Elegant Joint Measurement case
//! studies the solver was originally validated against (`user::applications::srb`, `ejm`).

use trineq::certificate;
use trineq::feasibility::{FeasibilityProblem, FwAlgo, RetainEvents, SearchMode, Status};
use trineq::inflation::UseDistrSymmetries;
use trineq::network::{Network, TargetDistr};
use trineq::oracle::{Optimize, Oracle, StopMode, TreeSearch};
use trineq::tensor::EventTensor;
use trineq::visibility::{SearchConfig, VisibilityProblem};

const N_OUTCOMES: u8 = 2;

fn noisy_srb(visibility: i64, visibility_denom: i64) -> TargetDistr {
    let network = Network::new(N_OUTCOMES);
    let n = i64::from(N_OUTCOMES);
    let total = n.pow(3) * visibility_denom;
    let mut tensor = EventTensor::zeros(3, u64::from(N_OUTCOMES));
    tensor.set_denominator(total);

    for a in 0..N_OUTCOMES {
        for b in 0..N_OUTCOMES {
            for c in 0..N_OUTCOMES {
                let noise = visibility_denom - visibility;
                let signal = if a == b && b == c { visibility * n.pow(2) } else { 0 };
                tensor.set(&[a, b, c], noise + signal);
            }
        }
    }
    TargetDistr::new(network, tensor, "srb")
}

/// Scenario 1: triangle, 2 outcomes, SRB family, size (2,2,2), single diagonal constraint,
/// denom = 100000. Minimum nonlocal visibility is 46411.
#[test]
fn srb_222_diagonal_visibility_matches_known_value() {
    let descriptions = vec![vec!["A00,B00,C00".to_string(), "A11,B11,C11".to_string(), String::new()]];

    let mut problem = VisibilityProblem::new(
        noisy_srb,
        0,
        100_000,
        100_000,
        [2, 2, 2],
        UseDistrSymmetries::Yes,
        descriptions,
        true,
        FwAlgo::FullyCorrective,
        SearchConfig::TreeSearch { n_threads: 1 },
        StopMode::Opt,
        RetainEvents::Yes,
    );

    assert_eq!(problem.get_minimum_nonlocal_visibility().unwrap(), 46_411);
}

/// Scenario 2: same family and size, with the additional `A00 | A11,B10,B11,C01,C11`
/// constraint. Minimum nonlocal visibility is 41422.
fn scenario_2_constraint_descriptions() -> Vec<Vec<String>> {
    vec![
        vec!["A00,B00,C00".to_string(), "A11,B11,C11".to_string(), String::new()],
        vec!["A00".to_string(), "A11,B10,B11,C01,C11".to_string()],
    ]
}

#[test]
fn srb_222_two_constraints_visibility_matches_known_value() {
    let mut problem = VisibilityProblem::new(
        noisy_srb,
        0,
        100_000,
        100_000,
        [2, 2, 2],
        UseDistrSymmetries::Yes,
        scenario_2_constraint_descriptions(),
        true,
        FwAlgo::FullyCorrective,
        SearchConfig::TreeSearch { n_threads: 1 },
        StopMode::Opt,
        RetainEvents::Yes,
    );

    assert_eq!(problem.get_minimum_nonlocal_visibility().unwrap(), 41_422);
}

/// Scenario 3: same family and size (2,2,3), with the diagonal constraint plus the two
/// additional `A`/`C`-type constraints. Minimum nonlocal visibility is 39415.
#[test]
fn srb_223_three_constraints_visibility_matches_known_value() {
    let descriptions = vec![
        vec!["A00,B00,C00".to_string(), "A11,A12, B11,B21, C11".to_string()],
        vec!["A00".to_string(), "A11,A12, B10,B11,B20,B21, C01,C11".to_string()],
        vec!["C00".to_string(), "A10,A11,A12, B01,B11,B21, C11".to_string()],
    ];

    let mut problem = VisibilityProblem::new(
        noisy_srb,
        0,
        100_000,
        100_000,
        [2, 2, 3],
        UseDistrSymmetries::Yes,
        descriptions,
        true,
        FwAlgo::FullyCorrective,
        SearchConfig::TreeSearch { n_threads: 1 },
        StopMode::Opt,
        RetainEvents::Yes,
    );

    assert_eq!(problem.get_minimum_nonlocal_visibility().unwrap(), 39_415);
}

const EJM_N_OUTCOMES: u8 = 4;

/// The Elegant Joint Measurement distribution family, symmetric under party exchange and global
/// outcome relabelings, parametrized by the three orbit weights `(s111, s112, s123) / s_denom`.
fn ejm_symmetric(s111: i64, s112: i64, s123: i64, s_denom: i64) -> TargetDistr {
    assert_eq!(s111 + s112 + s123, s_denom);

    let network = Network::new(EJM_N_OUTCOMES);
    // Smallest common multiple of (4, 36, 24) is 72: 1/4 = 18/72, 1/36 = 2/72, 1/24 = 3/72.
    let d_denom = s_denom * 72;
    let mut tensor = EventTensor::zeros(3, u64::from(EJM_N_OUTCOMES));
    tensor.set_denominator(d_denom);

    for a in 0..EJM_N_OUTCOMES {
        for b in 0..EJM_N_OUTCOMES {
            for c in 0..EJM_N_OUTCOMES {
                let numerator = if a == b && b == c {
                    s111 * 18
                } else if a != b && b != c && c != a {
                    s123 * 3
                } else {
                    s112 * 2
                };
                tensor.set(&[a, b, c], numerator);
            }
        }
    }
    TargetDistr::new(network, tensor, "ejm")
}

/// The noisy purified-EJM family used for the dichotomic visibility searches: a mixture of the
/// maximally mixed distribution and a pure EJM-like distribution, with `vis = 75%` recovering the
/// nominal EJM distribution (`ejm_nominal`).
fn noisy_pure_ejm(vis: i64, vis_denom: i64) -> TargetDistr {
    let network = Network::new(EJM_N_OUTCOMES);
    let d_denom = vis_denom * 192;
    let mut tensor = EventTensor::zeros(3, u64::from(EJM_N_OUTCOMES));
    tensor.set_denominator(d_denom);

    for a in 0..EJM_N_OUTCOMES {
        for b in 0..EJM_N_OUTCOMES {
            for c in 0..EJM_N_OUTCOMES {
                let noise = vis_denom - vis;
                let numerator = if a == b && b == c {
                    noise * 3 + vis * 24
                } else if a != b && b != c && c != a {
                    noise * 3 + vis * 4
                } else {
                    noise * 3
                };
                tensor.set(&[a, b, c], numerator);
            }
        }
    }
    TargetDistr::new(network, tensor, "ejm")
}

/// The nominal Elegant Joint Measurement distribution: `(s111, s112, s123) = (25, 9, 30) / 64`,
/// i.e. `p(a,a,a) = 25/256`, `p(a,a,b) = 1/256`, `p(a,b,c) = 5/256`.
fn ejm_nominal() -> TargetDistr {
    ejm_symmetric(25, 9, 30, 64)
}

/// Scenario 4: triangle, 4 outcomes, noisy purified EJM family, size (2,2,2), single diagonal
/// constraint, denom = 512. Minimum nonlocal visibility is 467.
#[test]
fn ejm_222_diagonal_visibility_matches_known_value() {
    let descriptions = vec![vec!["A00,B00,C00".to_string(), "A11,B11,C11".to_string(), String::new()]];

    let mut problem = VisibilityProblem::new(
        noisy_pure_ejm,
        384,
        512,
        512,
        [2, 2, 2],
        UseDistrSymmetries::Yes,
        descriptions,
        true,
        FwAlgo::FullyCorrective,
        SearchConfig::TreeSearch { n_threads: 1 },
        StopMode::Opt,
        RetainEvents::Yes,
    );

    assert_eq!(problem.get_minimum_nonlocal_visibility().unwrap(), 467);
}

/// Scenario 5: EJM family, size (2,2,4), with the `A00,B00,C00 | A11,A12,A13,B11,B21,B31,C11`
/// and `A00 | B10,B11,B20,B21,B30,B31,C01,C11` constraints. The nominal EJM distribution
/// (`(s111,s112,s123) = (25,9,30)/64`, i.e. `p(a,a,a)=25/256, p(a,a,b)=1/256, p(a,b,c)=5/256`) is
/// `Nonlocal` under this inflation.
#[test]
fn ejm_nominal_224_two_constraints_is_nonlocal() {
    let descriptions = vec![
        vec!["A00,B00,C00".to_string(), "A11,A12,A13, B11,B21,B31, C11".to_string()],
        vec!["A00".to_string(), "B10,B11,B20,B21,B30,B31, C01,C11".to_string()],
    ];

    let mut problem = FeasibilityProblem::new(
        ejm_nominal(),
        [2, 2, 4],
        UseDistrSymmetries::Yes,
        &descriptions,
        true,
        FwAlgo::FullyCorrective,
        SearchMode::TreeSearch { n_threads: 1, cached_tree: None },
        StopMode::Opt,
    )
    .unwrap();

    assert_eq!(problem.get_feasibility().unwrap(), Status::Nonlocal);
}

/// Scenario 6: certificate file round-trip for scenario 2 at visibility 41422: produce, write,
/// reload, verify `Nonlocal`.
#[test]
fn scenario_2_certificate_round_trips_and_reverifies_nonlocal() {
    let descriptions = scenario_2_constraint_descriptions();
    let distr = noisy_srb(41_422, 100_000);

    let mut problem = FeasibilityProblem::new(
        distr,
        [2, 2, 2],
        UseDistrSymmetries::Yes,
        &descriptions,
        true,
        FwAlgo::FullyCorrective,
        SearchMode::TreeSearch { n_threads: 1, cached_tree: None },
        StopMode::Opt,
    )
    .unwrap();

    let status = problem.get_feasibility().unwrap();
    assert_eq!(status, Status::Nonlocal);

    let mut buf = Vec::new();
    certificate::write_text(&mut buf, "scenario 2 @ 41422/100000", problem.inflation(), problem.constraints()).unwrap();

    let mut reread_problem = FeasibilityProblem::new(
        noisy_srb(41_422, 100_000),
        [2, 2, 2],
        UseDistrSymmetries::Yes,
        &descriptions,
        true,
        FwAlgo::FullyCorrective,
        SearchMode::TreeSearch { n_threads: 1, cached_tree: None },
        StopMode::Opt,
    )
    .unwrap();
    // Certificate checking only needs the dual vector restored, not a fresh FW/oracle run; zero
    // it out first so the re-verification below can't accidentally pass on leftover state.
    let zero = vec![0i64; reread_problem.constraints().quovec_size()];
    let (inflation, constraints) = reread_problem.inflation_and_constraints_mut();
    constraints.set_dual_vector_from_quovec(&zero).unwrap();

    certificate::read_text(buf.as_slice(), "scenario 2 @ 41422/100000", inflation, constraints).unwrap();

    // Property 10: a reloaded certificate's dual vector yields a strictly positive score from a
    // single oracle call.
    let mut oracle: Oracle<'_> = TreeSearch::new(inflation, 1).into();
    let solution = oracle.optimize(constraints, StopMode::Opt);
    assert!(solution.score > 0);
}
