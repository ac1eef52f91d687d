use agent_core::{GoalAnalyzer, TaskType};

fn analyze(goal: &str) -> agent_core::Goal {
    GoalAnalyzer::new().analyze(goal)
}

#[test]
fn search_goal_extracts_query_and_site() {
    let goal = analyze("search for wireless headphones on amazon");
    assert_eq!(goal.task_type, TaskType::GenericSearch);
    assert_eq!(goal.param("query"), Some("wireless headphones"));
    assert_eq!(goal.param("site"), Some("amazon"));
    assert_eq!(goal.param("siteUrl"), Some("https://www.amazon.com"));
}

#[test]
fn cart_goal_extracts_product() {
    let goal = analyze("find iphone 15 on amazon and add it to cart");
    assert_eq!(goal.task_type, TaskType::ComplexCartFlow);
    assert_eq!(goal.param("productName"), Some("iphone 15"));
    assert_eq!(goal.param("siteUrl"), Some("https://www.amazon.com"));

    let quoted = analyze("Look for \"Sony WH-1000XM5\" and add it to my cart");
    assert_eq!(quoted.task_type, TaskType::ComplexCartFlow);
    assert_eq!(quoted.param("productName"), Some("Sony WH-1000XM5"));
    assert_eq!(quoted.param("site"), None);
}

#[test]
fn cart_goal_with_placeholder_product_is_generic() {
    let goal = analyze("find it and add it to cart");
    assert_eq!(goal.task_type, TaskType::Generic);
    assert!(goal.param("productName").is_none());
    assert!(goal.param("query").is_none());

    let item = analyze("get the item and add it to my cart");
    assert_eq!(item.task_type, TaskType::Generic);
}

#[test]
fn form_goal_extracts_count_type_and_topic() {
    let goal = analyze("Create a google form about customer feedback with 5 multiple choice questions");
    assert_eq!(goal.task_type, TaskType::FormCreation);
    assert_eq!(goal.param("count"), Some("5"));
    assert_eq!(goal.param("questionType"), Some("multiple choice"));
    assert_eq!(goal.param("topic"), Some("customer feedback"));

    let worded = analyze("create a form with three questions about travel plans");
    assert_eq!(worded.param("count"), Some("3"));
    assert_eq!(worded.param("topic"), Some("travel plans"));
}

#[test]
fn form_goal_without_count_falls_through_to_generic() {
    let goal = analyze("create a form with some questions");
    assert_eq!(goal.task_type, TaskType::Generic);
}

#[test]
fn navigate_goals_resolve_urls() {
    let goal = analyze("go to amazon");
    assert_eq!(goal.task_type, TaskType::Navigate);
    assert_eq!(goal.param("target"), Some("amazon"));
    assert_eq!(goal.param("siteUrl"), Some("https://www.amazon.com"));

    let url = analyze("Open https://example.com/docs.");
    assert_eq!(url.param("siteUrl"), Some("https://example.com/docs"));

    let site = analyze("visit the github website");
    assert_eq!(site.param("target"), Some("github"));
    assert_eq!(site.param("siteUrl"), Some("https://github.com"));
}

#[test]
fn unmatched_goal_is_generic_with_url() {
    let goal = analyze("Check whether https://example.com is up");
    assert_eq!(goal.task_type, TaskType::Generic);
    assert_eq!(goal.param("url"), Some("https://example.com"));

    let bare = analyze("tell me a joke");
    assert_eq!(bare.task_type, TaskType::Generic);
    assert!(bare.parameters.is_empty());
}

#[test]
fn analysis_is_deterministic() {
    let goals = [
        "search for wireless headphones on amazon",
        "find iphone 15 on amazon and add it to cart",
        "go to wikipedia",
        "random words",
    ];
    for goal in goals {
        assert_eq!(analyze(goal), analyze(goal));
    }
}
