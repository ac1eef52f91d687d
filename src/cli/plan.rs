use agent_core::{Goal, GoalAnalyzer, Plan, PlanGenerator};
use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use super::context::CliContext;
use super::output::{print_json, OutputFormat};

#[derive(Args, Clone)]
pub struct PlanArgs {
    /// Goal in plain language, e.g. "search for rust on google"
    #[arg(required = true, num_args = 1..)]
    pub goal: Vec<String>,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    goal: &'a Goal,
    plan: &'a Plan,
}

pub async fn cmd_plan(args: PlanArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let text = args.goal.join(" ");
    if text.trim().is_empty() {
        bail!("goal is empty");
    }
    let planner =
        PlanGenerator::from_config(&ctx.config().planner).context("Failed to load plan templates")?;
    let goal = GoalAnalyzer::new().analyze(&text);
    let plan = planner.generate(&goal);

    match output {
        OutputFormat::Json => print_json(&PlanReport {
            goal: &goal,
            plan: &plan,
        }),
        OutputFormat::Human => {
            print_plan(&goal, &plan);
            Ok(())
        }
    }
}

fn print_plan(goal: &Goal, plan: &Plan) {
    println!("Goal: {}", goal.text);
    println!("Type: {}", goal.task_type);
    for (name, value) in &goal.parameters {
        println!("  {name} = {value}");
    }
    println!("Plan: {} ({} steps)", plan.title, plan.len());
    let mut phase = "";
    for (index, step) in plan.steps.iter().enumerate() {
        if step.sub_goal != phase {
            phase = step.sub_goal.as_str();
            println!("  [{phase}]");
        }
        let mut line = format!("    {}. {}", index + 1, step.describe());
        if let Some(state) = &step.expected_state {
            line.push_str(&format!(" -> {state}"));
        }
        if step.critical {
            line.push_str(" (critical)");
        }
        println!("{line}");
    }
}
