//! Shared Random Bit scenario applications, grounded on `user::applications::srb`: a noisy
//! shared-random-bit distribution `p_v = v/denom * (GHZ correlation) + (1 - v/denom) * (white
//! noise)` over an `n`-outcome triangle, used throughout the original to validate the solver
//! against known nonlocal-visibility results.

use crate::app::Application;
use crate::Cli;
use anyhow::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use trineq::certificate;
use trineq::feasibility::{FeasibilityProblem, FwAlgo, SearchMode as FeasSearchMode, Status};
use trineq::inflation::UseDistrSymmetries;
use trineq::network::{Network, TargetDistr};
use trineq::oracle::StopMode;
use trineq::tensor::EventTensor;
use trineq::visibility::{visibility_to_str, SearchConfig, VisibilityProblem};

const N_OUTCOMES: u8 = 2;

/// The noisy shared random bit distribution on an `N_OUTCOMES`-outcome triangle (`srb.h`'s
/// `get_noisy_srb`): `visibility/visibility_denom` of the perfectly-correlated `[0..0] + [1..1]`
/// mixture, plus the rest as white noise.
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

fn search_config(cli: &Cli) -> SearchConfig {
    SearchConfig::TreeSearch { n_threads: cli.threads }
}

fn search_mode(cli: &Cli) -> FeasSearchMode {
    FeasSearchMode::TreeSearch { n_threads: cli.threads, cached_tree: None }
}

/// Nonlocal visibility of the SRB for the 2x2x2 inflation under the order-2 diagonal constraint
/// only (`srb_vis_222_weak`).
pub struct SrbVis222Weak;

impl Application for SrbVis222Weak {
    fn name(&self) -> &'static str {
        "srb_vis_222_weak"
    }

    fn description(&self) -> &'static str {
        "Nonlocal visibility of the Shared Random Bit for the 2x2x2 inflation under {\"A00,B00,C00\",\"A11,B11,C11\",\"\"}"
    }

    fn run(&self, cli: &Cli) -> Result<()> {
        let denom = 1_000_000;
        let descriptions =
            vec![vec!["A00,B00,C00".to_string(), "A11,B11,C11".to_string(), String::new()]];

        let mut problem = VisibilityProblem::new(
            noisy_srb,
            0,
            denom,
            denom,
            [2, 2, 2],
            UseDistrSymmetries::Yes,
            descriptions,
            true,
            FwAlgo::FullyCorrective,
            search_config(cli),
            StopMode::Opt,
            trineq::feasibility::RetainEvents::Yes,
        );

        let threshold = problem.get_minimum_nonlocal_visibility()?;
        println!("minimum nonlocal visibility: {}", visibility_to_str(threshold, denom));
        Ok(())
    }
}

/// Writes a nonlocality certificate for the noiseless SRB and reads it back to check that it
/// still verifies (`srb_dual_vector_io`).
pub struct SrbDualVectorIo;

impl SrbDualVectorIo {
    fn certificate_path() -> PathBuf {
        std::env::temp_dir().join("trineq_srb_dual_vector_io.cert")
    }
}

impl Application for SrbDualVectorIo {
    fn name(&self) -> &'static str {
        "srb_dual_vector_io"
    }

    fn description(&self) -> &'static str {
        "Testing disk I/O of nonlocality certificates for the Shared Random Bit with the 2x2x2 inflation"
    }

    fn run(&self, cli: &Cli) -> Result<()> {
        let descriptions =
            vec![vec!["A00,B00,C00".to_string(), "A11,B11,C11".to_string(), String::new()]];

        let build_problem = |cli: &Cli| -> Result<FeasibilityProblem> {
            Ok(FeasibilityProblem::new(
                noisy_srb(1, 1),
                [2, 2, 2],
                UseDistrSymmetries::Yes,
                &descriptions,
                true,
                FwAlgo::FullyCorrective,
                search_mode(cli),
                StopMode::Opt,
            )?)
        };

        let mut problem = build_problem(cli)?;
        let status = problem.get_feasibility()?;
        println!("feasibility before writing certificate: {status:?}");

        let path = Self::certificate_path();
        certificate::write_text(
            BufWriter::new(File::create(&path)?),
            "srb_dual_vector_io",
            problem.inflation(),
            problem.constraints(),
        )?;
        println!("wrote certificate to {}", path.display());

        // Build a fresh problem to read the certificate into, since the reader needs a
        // `&mut ConstraintSet` alongside an `&Inflation` it can't borrow disjointly from the
        // same `problem` that wrote the certificate above.
        let mut reread_problem = build_problem(cli)?;
        let (inflation, constraints) = reread_problem.inflation_and_constraints_mut();
        certificate::read_text(BufReader::new(File::open(&path)?), "srb_dual_vector_io", inflation, constraints)
            .map_or_else(
            |e| println!("certificate failed to re-verify: {e}"),
            |()| println!("certificate re-verified: {}", status == Status::Nonlocal),
        );

        Ok(())
    }
}
