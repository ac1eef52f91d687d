//! Driver traits

use async_trait::async_trait;
use std::sync::Arc;
use tabpilot_core_types::OriginId;

use crate::errors::DriverError;
use crate::types::{
    ElementDescriptor, ElementRef, InteractOutcome, Interaction, LocateCriteria, PageSnapshot,
};

/// Page driver trait
///
/// Every call may suspend. Implementations must be safe to share between the
/// runner task and status readers.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Return elements matching the criteria in document order
    async fn locate_candidates(
        &self,
        criteria: &LocateCriteria,
    ) -> Result<Vec<ElementDescriptor>, DriverError>;

    /// Dispatch a synthetic interaction against an element
    async fn interact(
        &self,
        element: &ElementRef,
        interaction: Interaction,
        value: Option<&str>,
    ) -> Result<InteractOutcome, DriverError>;

    /// Load a URL in the page
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn page_title(&self) -> Result<String, DriverError>;

    /// Wait for the page to quiesce after a mutation
    async fn wait_for_settle(&self, ms: u64) -> Result<(), DriverError>;

    /// Capture a serializable view of the page
    async fn snapshot(&self) -> Result<PageSnapshot, DriverError> {
        let url = self.current_url().await?;
        let title = self.page_title().await?;
        let elements = self.locate_candidates(&LocateCriteria::all()).await?;
        Ok(PageSnapshot {
            url,
            title,
            elements,
        })
    }
}

/// Hands out one page handle per origin
#[async_trait]
pub trait PageContextProvider: Send + Sync {
    async fn acquire(&self, origin: &OriginId) -> Result<Arc<dyn PageDriver>, DriverError>;

    /// Tear down a handle previously returned by `acquire`
    async fn release(&self, origin: &OriginId, handle: Arc<dyn PageDriver>);
}
