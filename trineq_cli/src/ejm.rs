//! Elegant Joint Measurement scenario applications, grounded on `user::applications::ejm`: the
//! party-exchange- and outcome-relabeling-symmetric distribution over a 4-outcome triangle whose
//! nonlocality under the classical triangle network was open for several years (Gisin,
//! arXiv:1708.05556).

use crate::app::Application;
use crate::Cli;
use anyhow::Result;
use trineq::inflation::UseDistrSymmetries;
use trineq::network::{Network, TargetDistr};
use trineq::oracle::StopMode;
use trineq::tensor::EventTensor;
use trineq::visibility::{visibility_to_str, SearchConfig, VisibilityProblem};

const N_OUTCOMES: u8 = 4;

/// The noisy purified-EJM family (`ejm.h`'s `get_noisy_pureejm`): a mixture of the maximally
/// mixed distribution and a pure EJM-like distribution, with `vis/vis_denom = 75%` recovering
/// the nominal EJM distribution.
fn noisy_pure_ejm(vis: i64, vis_denom: i64) -> TargetDistr {
    let network = Network::new(N_OUTCOMES);
    let d_denom = vis_denom * 192;
    let mut tensor = EventTensor::zeros(3, u64::from(N_OUTCOMES));
    tensor.set_denominator(d_denom);

    for a in 0..N_OUTCOMES {
        for b in 0..N_OUTCOMES {
            for c in 0..N_OUTCOMES {
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

/// Nonlocal visibility of the noisy purified EJM for the 2x2x2 inflation under the order-2
/// diagonal constraint only (`ejm_vis_222_weak`).
pub struct EjmVis222Weak;

impl Application for EjmVis222Weak {
    fn name(&self) -> &'static str {
        "ejm_vis_222_weak"
    }

    fn description(&self) -> &'static str {
        "Nonlocal visibility of the noisy purified EJM for the 2x2x2 inflation under {\"A00,B00,C00\",\"A11,B11,C11\",\"\"}"
    }

    fn run(&self, cli: &Cli) -> Result<()> {
        let denom = 512;
        let descriptions =
            vec![vec!["A00,B00,C00".to_string(), "A11,B11,C11".to_string(), String::new()]];

        let mut problem = VisibilityProblem::new(
            noisy_pure_ejm,
            384,
            denom,
            denom,
            [2, 2, 2],
            UseDistrSymmetries::Yes,
            descriptions,
            true,
            trineq::feasibility::FwAlgo::FullyCorrective,
            SearchConfig::TreeSearch { n_threads: cli.threads },
            StopMode::Opt,
            trineq::feasibility::RetainEvents::Yes,
        );

        let threshold = problem.get_minimum_nonlocal_visibility()?;
        println!("minimum nonlocal visibility: {}", visibility_to_str(threshold, denom));
        Ok(())
    }
}
