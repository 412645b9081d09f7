//! Registry of runnable demo scenarios, selected by the CLI's positional application name (spec
//! §6), grounded on `user::Application`/`user::get_application_list`. The core solver doesn't
//! define any scenarios itself; this registry exists purely so the binary has something to run.

use crate::ejm::EjmVis222Weak;
use crate::srb::{SrbDualVectorIo, SrbVis222Weak};
use crate::Cli;
use anyhow::{bail, Result};
use enum_dispatch::enum_dispatch;

/// A named, runnable scenario.
#[enum_dispatch]
pub trait Application {
    /// The name passed on the command line to select this application.
    fn name(&self) -> &'static str;
    /// A short description, shown when the requested name doesn't match any application.
    fn description(&self) -> &'static str;
    /// Runs the scenario, printing its own progress and results.
    ///
    /// # Errors
    ///
    /// Propagates any error from building or solving the underlying problem.
    fn run(&self, cli: &Cli) -> Result<()>;
}

#[enum_dispatch(Application)]
enum ApplicationEnum {
    SrbVis222Weak(SrbVis222Weak),
    SrbDualVectorIo(SrbDualVectorIo),
    EjmVis222Weak(EjmVis222Weak),
}

fn application_list() -> Vec<ApplicationEnum> {
    vec![SrbVis222Weak.into(), SrbDualVectorIo.into(), EjmVis222Weak.into()]
}

/// Looks `name` up in the application registry and runs it.
///
/// # Errors
///
/// Returns an error if no application is registered under `name`, or propagates any error from
/// running it.
pub fn find_and_run(name: &str, cli: &Cli) -> Result<()> {
    let applications = application_list();
    match applications.into_iter().find(|app| app.name() == name) {
        Some(app) => app.run(cli),
        None => {
            let available: Vec<&str> = application_list().iter().map(Application::name).collect();
            bail!("unknown application {name:?}; available applications: {}", available.join(", "));
        }
    }
}
