use std::io::Write;

use agent_core::{
    Goal, GoalAnalyzer, PlanGenerator, PlanSource, PlannerConfig, StepAction, TaskType,
    TemplateRegistry,
};
use serde_json::json;

fn generator() -> PlanGenerator {
    PlanGenerator::new(TemplateRegistry::builtin().expect("builtin templates"))
}

fn plan_for(goal: &str) -> agent_core::Plan {
    generator().generate(&GoalAnalyzer::new().analyze(goal))
}

#[test]
fn search_plan_navigates_types_and_submits() {
    let plan = plan_for("search for wireless headphones on amazon");
    assert_eq!(plan.task_type, TaskType::GenericSearch);
    assert_eq!(plan.source, PlanSource::Template);
    let actions: Vec<_> = plan.steps.iter().map(|s| s.action).collect();
    assert_eq!(
        actions,
        vec![StepAction::Navigate, StepAction::Type, StepAction::Click]
    );
    assert_eq!(plan.steps[0].value.as_deref(), Some("https://www.amazon.com"));
    assert_eq!(plan.steps[1].value.as_deref(), Some("wireless headphones"));
    assert_eq!(plan.steps[1].target.description, "search box");
    assert_eq!(
        plan.steps[2].expected_state.as_deref(),
        Some("search_results_page")
    );
}

#[test]
fn search_without_site_defaults_to_google() {
    let plan = plan_for("look up rust borrow checker");
    assert_eq!(plan.steps[0].value.as_deref(), Some("https://www.google.com"));
}

#[test]
fn cart_plan_has_eight_steps_in_phase_order() {
    let plan = plan_for("find iphone 15 on amazon and add it to cart");
    assert_eq!(plan.task_type, TaskType::ComplexCartFlow);
    assert_eq!(
        plan.phases(),
        vec![
            "navigation",
            "search",
            "search",
            "verification",
            "product_selection",
            "verification",
            "cart_operation",
            "verification",
        ]
    );
    assert_eq!(plan.steps[1].value.as_deref(), Some("iphone 15"));
    assert_eq!(plan.steps[4].target.description, "iphone 15");
    let critical: Vec<_> = plan
        .steps
        .iter()
        .enumerate()
        .filter(|(_, s)| s.critical)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(critical, vec![0, 1, 4, 6]);
    assert_eq!(plan.title, "Add iphone 15 to the cart on amazon");
}

#[test]
fn form_plan_repeats_per_question() {
    let plan = plan_for("create a form about team lunch with 3 short answer questions");
    assert_eq!(plan.task_type, TaskType::FormCreation);
    // navigate, title, 3 x (add, type), verify
    assert_eq!(plan.steps.len(), 2 + 3 * 2 + 1);
    assert_eq!(
        plan.steps[3].value.as_deref(),
        Some("Question 1 (short answer) about team lunch")
    );
    assert_eq!(
        plan.steps[7].value.as_deref(),
        Some("Question 3 (short answer) about team lunch")
    );
    assert_eq!(plan.steps.last().unwrap().action, StepAction::ObserveState);
}

#[test]
fn oversized_form_degrades_to_generic() {
    let goal = Goal::new("create a form with 500 questions", TaskType::FormCreation)
        .with_param("count", "500");
    let plan = generator().generate(&goal);
    assert_eq!(plan.task_type, TaskType::Generic);
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.steps[0].action, StepAction::ObserveState);
}

#[test]
fn missing_placeholder_degrades_to_generic() {
    // hand-built goal without the required query
    let goal = Goal::new("search https://example.com", TaskType::GenericSearch)
        .with_param("url", "https://example.com");
    let plan = generator().generate(&goal);
    assert_eq!(plan.task_type, TaskType::Generic);
    assert_eq!(plan.steps[0].action, StepAction::Navigate);
    assert_eq!(plan.steps[0].value.as_deref(), Some("https://example.com"));
}

#[test]
fn navigate_plan_is_single_step() {
    let plan = plan_for("go to wikipedia");
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.steps[0].value.as_deref(), Some("https://www.wikipedia.org"));
    assert!(plan.steps[0].critical);
}

#[test]
fn override_file_replaces_named_templates() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
templates:
  navigate:
    title: "Jump to {{target}}"
    steps:
      - action: navigate
        value: "{{siteUrl}}"
        sub_goal: navigation
      - action: observe-state
        expected_state: page_loaded
        sub_goal: verification
"#
    )
    .unwrap();

    let generator = PlanGenerator::from_config(&PlannerConfig {
        template_path: Some(file.path().to_path_buf()),
        ..PlannerConfig::default()
    })
    .unwrap();
    let plan = generator.generate(&GoalAnalyzer::new().analyze("go to amazon"));
    assert_eq!(plan.title, "Jump to amazon");
    assert_eq!(plan.steps.len(), 2);

    // untouched templates survive
    let search = generator.generate(&GoalAnalyzer::new().analyze("search for socks"));
    assert_eq!(search.steps.len(), 3);
}

#[test]
fn bad_override_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "templates:\n  teleport:\n    steps: []\n").unwrap();
    let err = TemplateRegistry::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("teleport"));
}

#[test]
fn analysis_with_explicit_steps_builds_plan() {
    let goal = GoalAnalyzer::new().analyze("do something clever");
    let payload = json!({
        "task_type": "generic",
        "title": "Clever thing",
        "steps": [
            {"action": "navigate", "value": "https://example.com", "sub_goal": "navigation"},
            {"action": "click", "target": {"description": "More information"}, "sub_goal": "explore"}
        ]
    });
    let plan = generator().from_analysis(&goal, &payload).unwrap();
    assert_eq!(plan.source, PlanSource::Analysis);
    assert_eq!(plan.title, "Clever thing");
    assert_eq!(plan.steps.len(), 2);
}

#[test]
fn analysis_with_parameters_renders_template() {
    let goal = GoalAnalyzer::new().analyze("I need headphones");
    let payload = json!({
        "task_type": "generic-search",
        "parameters": {"query": "headphones", "siteUrl": "https://www.amazon.com"}
    });
    let plan = generator().from_analysis(&goal, &payload).unwrap();
    assert_eq!(plan.task_type, TaskType::GenericSearch);
    assert_eq!(plan.source, PlanSource::Analysis);
    assert_eq!(plan.steps[0].value.as_deref(), Some("https://www.amazon.com"));
}
