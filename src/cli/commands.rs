use clap::Subcommand;

use super::plan::PlanArgs;
use super::run::RunArgs;
use super::serve::ServeArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Classify a goal and print the plan it would run
    Plan(PlanArgs),

    /// Run a goal against the fixture site and stream its progress
    Run(RunArgs),

    /// Serve the task control API over HTTP
    Serve(ServeArgs),
}
