//! Feedback collection loop.
//!
//! Drives a [`FeedbackExtractor`] page by page until enough *new* entries
//! are in hand. The target is the number still needed, not the total:
//! authors already on file count toward the goal and are excluded from the
//! result.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::dedup::AuthorFilter;
use crate::error::Result;
use crate::models::FeedbackEntry;
use crate::source::FeedbackExtractor;

/// Entries still needed to reach `target`, floored at zero.
pub fn needed(target: usize, known: usize) -> usize {
    target.saturating_sub(known)
}

/// Collect up to `target - known_authors.len()` new feedback entries.
///
/// Makes no extractor call at all when nothing is needed. A page that times
/// out ends collection for this item; whatever was gathered so far is
/// returned. Fatal extractor errors propagate.
pub async fn collect_feedback(
    extractor: &mut (dyn FeedbackExtractor + '_),
    identifier: &str,
    locator: Option<&str>,
    known_authors: &HashSet<String>,
    target: usize,
    step_timeout: Duration,
) -> Result<Vec<FeedbackEntry>> {
    let needed = needed(target, known_authors.len());
    if needed == 0 {
        return Ok(Vec::new());
    }

    match tokio::time::timeout(step_timeout, extractor.goto_first_page(locator)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(identifier, "timed out opening feedback pages");
            return Ok(Vec::new());
        }
    }

    let mut filter = AuthorFilter::new(identifier, known_authors);
    let mut collected: Vec<FeedbackEntry> = Vec::new();
    let mut pages = 0usize;

    loop {
        let page = match tokio::time::timeout(
            step_timeout,
            extractor.extract_page(identifier, filter.excluded()),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(identifier, pages, "timed out reading feedback page");
                break;
            }
        };
        pages += 1;
        collected.extend(filter.retain_new(page));

        if collected.len() >= needed {
            break;
        }

        match tokio::time::timeout(step_timeout, extractor.advance_page()).await {
            Ok(result) => {
                if !result? {
                    break;
                }
            }
            Err(_) => {
                warn!(identifier, pages, "timed out turning feedback page");
                break;
            }
        }
    }

    collected.truncate(needed);
    debug!(
        identifier,
        pages,
        collected = collected.len(),
        needed,
        "feedback collected"
    );
    Ok(collected)
}
