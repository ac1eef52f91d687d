use std::sync::Arc;

use action_locator::{ElementLocator, LocateRequest, LocatorError, LocatorStrategy};
use page_driver::memory::{demo_site, InMemoryPage};
use page_driver::{Affordance, PageDriver};

async fn page_at(url: &str) -> InMemoryPage {
    let page = InMemoryPage::new(Arc::new(demo_site().unwrap()));
    page.navigate(url).await.unwrap();
    page
}

#[tokio::test]
async fn primary_selector_wins() {
    let page = page_at("https://www.amazon.com").await;
    let request = LocateRequest::new("search box")
        .with_selector("#twotabsearchtextbox")
        .with_affordance(Affordance::Editable);
    let found = ElementLocator::new().locate(&page, &request).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].strategy, LocatorStrategy::Selector);
}

#[tokio::test]
async fn second_fallback_hint_is_used_when_primary_misses() {
    let page = page_at("https://www.amazon.com").await;
    let request = LocateRequest::new("search box")
        .with_selector("input[type=search]")
        .with_fallbacks(vec![
            "input[name=q]".to_string(),
            "#twotabsearchtextbox".to_string(),
        ])
        .with_affordance(Affordance::Editable);
    let found = ElementLocator::new().locate(&page, &request).await.unwrap();
    assert_eq!(found[0].strategy, LocatorStrategy::Fallback(1));
    assert_eq!(
        found[0].element.attributes.id.as_deref(),
        Some("twotabsearchtextbox")
    );
}

#[tokio::test]
async fn text_strategy_filters_by_affordance() {
    let page = page_at("https://www.amazon.com").await;
    let request = LocateRequest::new("search box").with_affordance(Affordance::Editable);
    let found = ElementLocator::new().locate(&page, &request).await.unwrap();
    assert_eq!(found[0].strategy, LocatorStrategy::Text);
    assert!(found.iter().all(|c| c.element.editable));
}

#[tokio::test]
async fn product_name_picks_matching_result() {
    let page = page_at("https://www.amazon.com/s?k=iphone+15").await;
    let request = LocateRequest::new("iphone 15").with_affordance(Affordance::Clickable);
    let found = ElementLocator::new().locate(&page, &request).await.unwrap();
    assert!(found[0].element.text.starts_with("Apple iPhone 15 (128 GB)"));

    let headphones = LocateRequest::new("wireless headphones").with_affordance(Affordance::Clickable);
    let found = ElementLocator::new().locate(&page, &headphones).await.unwrap();
    assert!(found[0].element.text.contains("Headphones"));
}

#[tokio::test]
async fn hidden_elements_never_returned() {
    let page = page_at("https://www.amazon.com").await;
    let request = LocateRequest::new("your account").with_selector("#nav-flyout-menu");
    let found = ElementLocator::new().locate(&page, &request).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn excluded_elements_are_skipped() {
    let page = page_at("https://www.amazon.com/s?k=iphone").await;
    let locator = ElementLocator::new();
    let request = LocateRequest::new("iphone 15").with_affordance(Affordance::Clickable);
    let first = locator.locate_best(&page, &request).await.unwrap().unwrap();
    let retry = request.clone().excluding(first.element_ref().clone());
    let second = locator.locate_best(&page, &retry).await.unwrap().unwrap();
    assert_ne!(first.element_ref(), second.element_ref());
}

#[tokio::test]
async fn locate_is_idempotent_on_unchanged_page() {
    let page = page_at("https://www.amazon.com/s?k=headphones").await;
    let locator = ElementLocator::new();
    let request = LocateRequest::new("headphones")
        .with_affordance(Affordance::Clickable)
        .near(Some(2));
    let a = locator.locate(&page, &request).await.unwrap();
    let b = locator.locate(&page, &request).await.unwrap();
    let refs = |list: &[action_locator::Candidate]| {
        list.iter().map(|c| c.element_ref().clone()).collect::<Vec<_>>()
    };
    assert_eq!(refs(&a), refs(&b));
}

#[tokio::test]
async fn empty_request_is_rejected() {
    let page = page_at("https://example.com").await;
    let err = ElementLocator::new()
        .locate(&page, &LocateRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LocatorError::InvalidRequest(_)));
}
