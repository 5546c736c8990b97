//! Page source and extractor traits.
//!
//! These are the seams behind which all site-specific navigation lives.
//! Implementations hold a stateful session, so every method takes
//! `&mut self` and calls are made strictly one at a time.
//!
//! Implementations convert their own expected failures (missing element,
//! network hiccup, malformed field) into [`Extraction::Skip`] or an empty
//! page. `Err` is reserved for conditions that must halt the run.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FeedbackEntry, Item};
use crate::policy::SkipReason;

/// Outcome of extracting one candidate reference.
#[derive(Debug, Clone)]
pub enum Extraction {
    Item(Item),
    Skip(SkipReason),
}

/// A paginated listing of candidate item references.
///
/// The listing is assumed to be pre-sorted by the source's own criterion;
/// callers preserve that order.
#[async_trait]
pub trait PageSource: Send {
    /// References on the page the session is currently positioned at.
    async fn current_page_references(&mut self) -> Result<Vec<String>>;

    /// Move to the next page. `false` means there are no more pages and the
    /// session is unchanged.
    async fn advance_page(&mut self) -> Result<bool>;
}

/// Produces a fully populated [`Item`] from a reference.
#[async_trait]
pub trait ItemExtractor: Send {
    async fn extract(&mut self, reference: &str) -> Result<Extraction>;
}

/// Produces feedback entries for an item, one page at a time.
#[async_trait]
pub trait FeedbackExtractor: Send {
    /// Position the session at the first feedback page for the current item.
    ///
    /// With `locator = None` the live session must already be on the item
    /// page; an implementation with no live session must then fail with
    /// [`HarvestError::Config`](crate::error::HarvestError::Config).
    async fn goto_first_page(&mut self, locator: Option<&str>) -> Result<()>;

    /// Entries on the current page, excluding the given authors.
    async fn extract_page(
        &mut self,
        identifier: &str,
        exclude_authors: &HashSet<String>,
    ) -> Result<Vec<FeedbackEntry>>;

    async fn advance_page(&mut self) -> Result<bool>;
}
