use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use tabpilot_core_types::{OriginId, TaskStatus};
use tabpilot_orchestrator::{SessionOrchestrator, TaskEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{timeout, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use super::context::CliContext;
use crate::config::ProviderKind;
use super::output::{print_json_line, OutputFormat};
use super::runtime::build_orchestrator;

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Goal in plain language
    #[arg(required = true, num_args = 1..)]
    pub goal: Vec<String>,

    /// Origin (tab) identifier; a random one when omitted
    #[arg(long)]
    pub origin: Option<String>,

    /// Give up after this long, e.g. "90s" or "2m"
    #[arg(long, default_value = "2m")]
    pub timeout: humantime::Duration,

    /// Ask for a fresh plan once if the first one fails
    #[arg(long)]
    pub replan: bool,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let mut config = ctx.config().clone();
    if args.replan {
        if config.provider == ProviderKind::None {
            bail!("--replan needs an analysis provider; set `provider: rules` or TABPILOT_PROVIDER=rules");
        }
        config.planner.replan_on_failure = true;
    }
    let (orchestrator, _contexts) = build_orchestrator(&config)?;

    let origin = OriginId::new(args.origin.unwrap_or_else(random_origin));
    let goal = args.goal.join(" ");
    let limit: Duration = args.timeout.into();

    // subscribe first so the plan event is not missed
    let mut events = orchestrator.subscribe(&origin);
    let started = Instant::now();
    let receipt = orchestrator
        .start_task(&goal, &origin)
        .await
        .with_context(|| format!("Failed to start task for origin {origin}"))?;
    info!(origin = %origin, run_id = %receipt.run_id, "task running");

    match timeout(limit, watch(&mut events, output)).await {
        Ok(watched) => watched?,
        Err(_) => {
            orchestrator.shutdown();
            bail!(
                "task did not finish within {}",
                humantime::format_duration(limit)
            );
        }
    }

    let outcome = finish(&orchestrator, &origin, started, output);
    orchestrator.shutdown();
    outcome
}

async fn watch(events: &mut broadcast::Receiver<TaskEvent>, output: OutputFormat) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(event) => {
                render(&event, output)?;
                if event.is_terminal() {
                    return Ok(());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event stream lagged");
                continue;
            }
            Err(RecvError::Closed) => bail!("event stream closed before the task finished"),
        }
    }
}

fn render(event: &TaskEvent, output: OutputFormat) -> Result<()> {
    if output == OutputFormat::Json {
        return print_json_line(event);
    }
    match event {
        TaskEvent::PlanCreated {
            generation,
            task_type,
            title,
            steps,
            ..
        } => {
            println!("Plan: {title} [{task_type}, generation {generation}]");
            for (index, step) in steps.iter().enumerate() {
                println!("  {}. {step}", index + 1);
            }
        }
        TaskEvent::Replanned {
            generation, steps, ..
        } => {
            println!("New plan (generation {generation}):");
            for (index, step) in steps.iter().enumerate() {
                println!("  {}. {step}", index + 1);
            }
        }
        TaskEvent::Thinking { line, .. } => println!("> {line}"),
        TaskEvent::StepStarted { .. }
        | TaskEvent::StepFinished { .. }
        | TaskEvent::Finished { .. } => {}
    }
    Ok(())
}

fn finish(
    orchestrator: &SessionOrchestrator,
    origin: &OriginId,
    started: Instant,
    output: OutputFormat,
) -> Result<()> {
    let snapshot = orchestrator.get_status(origin);
    let Some(status) = snapshot.found() else {
        bail!("session for origin {origin} disappeared");
    };

    let elapsed = Duration::from_millis(
        u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    );
    match output {
        OutputFormat::Json => print_json_line(status)?,
        OutputFormat::Human => {
            let succeeded = status.history.iter().filter(|result| result.success).count();
            println!(
                "Finished: {} after {} ({succeeded}/{} steps succeeded)",
                status.status,
                humantime::format_duration(elapsed),
                status.steps.len()
            );
        }
    }

    if status.status != TaskStatus::Completed {
        let reason = status
            .thinking_log
            .last()
            .cloned()
            .unwrap_or_else(|| status.status.to_string());
        bail!("{reason}");
    }
    Ok(())
}

fn random_origin() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("cli-{}", &id[..8])
}
