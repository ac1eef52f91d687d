use std::sync::Arc;
use std::time::Duration;

use page_driver::memory::{demo_site, InMemoryPage};
use page_driver::PageDriver;
use state_verifier::{
    Condition, StateSpec, StateTable, StateVerifier, VerifierConfig, VerifyError, CART_UPDATED,
    PAGE_LOADED, PRODUCT_PAGE, QUESTION_ADDED, SEARCH_RESULTS_PAGE,
};

fn verifier() -> StateVerifier {
    StateVerifier::new(
        Arc::new(StateTable::with_builtins()),
        VerifierConfig {
            timeout: Duration::from_millis(1_000),
            poll_interval: Duration::from_millis(100),
        },
    )
}

fn page() -> InMemoryPage {
    InMemoryPage::new(Arc::new(demo_site().unwrap()))
}

#[tokio::test(start_paused = true)]
async fn blank_page_is_not_loaded() {
    let page = page();
    let result = verifier().verify(&page, PAGE_LOADED).await.unwrap();
    assert!(!result.passed);
    assert!(result.attempts > 1);
    assert!(result.latency_ms >= 1_000);
    assert!(result.diagnostic.contains("page loaded"));
}

#[tokio::test(start_paused = true)]
async fn search_results_and_product_pages_verify() {
    let page = page();
    let verifier = verifier();

    page.navigate("https://www.amazon.com/s?k=iphone").await.unwrap();
    let results = verifier.verify(&page, SEARCH_RESULTS_PAGE).await.unwrap();
    assert!(results.passed, "{}", results.diagnostic);
    assert_eq!(results.attempts, 1);

    let product = verifier.verify(&page, PRODUCT_PAGE).await.unwrap();
    assert!(!product.passed);

    page.navigate("https://www.amazon.com/dp/B0CHX1W1XY").await.unwrap();
    assert!(verifier.verify(&page, PRODUCT_PAGE).await.unwrap().passed);
}

#[tokio::test(start_paused = true)]
async fn cart_confirmation_verifies() {
    let page = page();
    page.navigate("https://www.amazon.com/cart/add-to-cart").await.unwrap();
    let result = verifier().verify(&page, CART_UPDATED).await.unwrap();
    assert!(result.passed);
}

#[tokio::test(start_paused = true)]
async fn hidden_question_card_does_not_count() {
    let page = page();
    page.navigate("https://docs.google.com/forms/create").await.unwrap();
    let result = verifier().verify(&page, QUESTION_ADDED).await.unwrap();
    assert!(!result.passed);
}

#[tokio::test(start_paused = true)]
async fn unknown_state_passes_with_diagnostic() {
    let page = page();
    let result = verifier().verify(&page, "dashboard_visible").await.unwrap();
    assert!(result.passed);
    assert!(result.diagnostic.contains("not registered"));
}

#[tokio::test(start_paused = true)]
async fn runtime_registered_state_and_deny() {
    let page = page();
    page.navigate("https://example.com").await.unwrap();
    let verifier = verifier();
    verifier.table().register(
        "example_home",
        StateSpec::new()
            .require(Condition::TitleContains("example".into()))
            .reject(Condition::TextPresent("error".into())),
    );
    assert!(verifier.verify(&page, "example_home").await.unwrap().passed);

    verifier.table().register(
        "no_more_info",
        StateSpec::new().reject(Condition::TextPresent("more information".into())),
    );
    assert!(!verifier.verify(&page, "no_more_info").await.unwrap().passed);
}

#[tokio::test(start_paused = true)]
async fn invalid_regex_is_an_error() {
    let page = page();
    page.navigate("https://example.com").await.unwrap();
    let verifier = verifier();
    verifier.table().register(
        "broken",
        StateSpec::new().require(Condition::UrlMatches("(".into())),
    );
    let err = verifier.verify(&page, "broken").await.unwrap_err();
    assert!(matches!(err, VerifyError::InvalidCondition(_)));
}

#[tokio::test(start_paused = true)]
async fn unbounded_timeout_still_verifies() {
    let page = page();
    page.navigate("https://www.amazon.com/s?k=iphone").await.unwrap();
    let verifier = StateVerifier::new(
        Arc::new(StateTable::with_builtins()),
        VerifierConfig {
            timeout: Duration::MAX,
            poll_interval: Duration::from_millis(100),
        },
    );
    let result = verifier.verify(&page, SEARCH_RESULTS_PAGE).await.unwrap();
    assert!(result.passed);
    assert_eq!(result.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn zero_poll_interval_is_floored() {
    let page = page();
    let verifier = StateVerifier::new(
        Arc::new(StateTable::with_builtins()),
        VerifierConfig {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::ZERO,
        },
    );
    let result = verifier.verify(&page, PAGE_LOADED).await.unwrap();
    assert!(!result.passed);
    assert!(result.attempts > 1);
    assert!(result.attempts <= 7, "polled {} times", result.attempts);
}
