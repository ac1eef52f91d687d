use agent_core::{
    parse_analysis, parse_suggestion, AnalysisProvider, MockAnalysisProvider, Step, StepAction,
    TaskType,
};
use futures::executor::block_on;
use page_driver::PageSnapshot;
use serde_json::json;

fn blank_page() -> PageSnapshot {
    PageSnapshot {
        url: "about:blank".into(),
        ..Default::default()
    }
}

#[test]
fn mock_falls_back_to_rule_analysis() {
    let provider = MockAnalysisProvider::new();
    let value = block_on(provider.analyze_goal(&blank_page(), "go to amazon")).unwrap();
    let analysis = parse_analysis(&value).unwrap();
    assert_eq!(analysis.task_type, TaskType::Navigate);
    assert_eq!(
        analysis.parameters.get("siteUrl").map(String::as_str),
        Some("https://www.amazon.com")
    );
    assert_eq!(provider.calls(), vec!["analyze_goal:go to amazon".to_string()]);
}

#[test]
fn mock_returns_scripted_responses_in_order() {
    let provider = MockAnalysisProvider::new()
        .with_analysis(json!({"task_type": "generic"}))
        .with_suggestion(json!({"selector": "#add-to-cart-button"}));

    let first = block_on(provider.analyze_goal(&blank_page(), "anything")).unwrap();
    assert_eq!(first, json!({"task_type": "generic"}));
    let second = block_on(provider.analyze_goal(&blank_page(), "search for socks")).unwrap();
    assert_eq!(parse_analysis(&second).unwrap().task_type, TaskType::GenericSearch);

    let step = Step::new(StepAction::Click, "cart_operation");
    let suggestion = block_on(provider.suggest_step(&blank_page(), &step, "not found")).unwrap();
    assert_eq!(
        parse_suggestion(&suggestion).unwrap().unwrap().selector.as_deref(),
        Some("#add-to-cart-button")
    );
    let exhausted = block_on(provider.suggest_step(&blank_page(), &step, "not found")).unwrap();
    assert!(parse_suggestion(&exhausted).unwrap().is_none());
    assert_eq!(provider.calls().len(), 4);
}

#[test]
fn mock_rejects_empty_goal() {
    let provider = MockAnalysisProvider::new();
    assert!(block_on(provider.analyze_goal(&blank_page(), "  ")).is_err());
}

#[tokio::test]
async fn provider_works_behind_trait_object() {
    let provider: std::sync::Arc<dyn AnalysisProvider> = std::sync::Arc::new(MockAnalysisProvider::new());
    let value = provider
        .analyze_goal(&blank_page(), "search for wireless headphones on amazon")
        .await
        .unwrap();
    assert_eq!(value["task_type"], "generic-search");
}
