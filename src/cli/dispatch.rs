use anyhow::Result;

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::plan::cmd_plan;
use super::run::cmd_run;
use super::serve::cmd_serve;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Plan(args) => cmd_plan(args, ctx, cli.output).await,
        Commands::Run(args) => cmd_run(args, ctx, cli.output).await,
        Commands::Serve(args) => cmd_serve(args, ctx).await,
    }
}
