//! De-duplication policy.
//!
//! Two independent layers that are never conflated:
//!
//! | Layer | Applied | Key |
//! |-------|---------|-----|
//! | [`ReferenceFilter`] | before item extraction | normalized page reference |
//! | [`AuthorFilter`] | before feedback is stored | author name, scoped to one identifier |
//!
//! Both are exact string matches. Near-duplicate references and author
//! aliases are not detected.

use std::collections::HashSet;

use crate::models::FeedbackEntry;

/// Normalize a page reference for dedup comparison.
///
/// Strips the fragment, the query string, a tracking path segment that
/// begins with `ref=` along with everything after it, and trailing slashes.
/// A segment merely containing `ref=` (`.../pref=x`) is kept. Case is
/// preserved because catalog paths are case-sensitive. The function is
/// idempotent.
pub fn normalize_reference(reference: &str) -> String {
    let r = reference.trim();
    let r = r.split('#').next().unwrap_or(r);
    let r = r.split('?').next().unwrap_or(r);
    let r = match r.find("/ref=") {
        Some(idx) => &r[..idx],
        None => r,
    };
    r.trim_end_matches('/').to_string()
}

/// Reference-level filter over page-source output.
///
/// Rejects references whose item already meets the feedback target and
/// references already admitted earlier in the same run.
#[derive(Debug, Default)]
pub struct ReferenceFilter {
    satisfied: HashSet<String>,
    admitted: HashSet<String>,
}

impl ReferenceFilter {
    pub fn new<I, S>(satisfied: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            satisfied: satisfied
                .into_iter()
                .map(|s| normalize_reference(s.as_ref()))
                .collect(),
            admitted: HashSet::new(),
        }
    }

    /// Returns the normalized reference if it should be extracted.
    pub fn admit(&mut self, reference: &str) -> Option<String> {
        let normalized = normalize_reference(reference);
        if normalized.is_empty() || self.satisfied.contains(&normalized) {
            return None;
        }
        if !self.admitted.insert(normalized.clone()) {
            return None;
        }
        Some(normalized)
    }

    pub fn is_satisfied(&self, reference: &str) -> bool {
        self.satisfied.contains(&normalize_reference(reference))
    }
}

/// Author-level filter for one item's feedback.
#[derive(Debug)]
pub struct AuthorFilter {
    identifier: String,
    seen: HashSet<String>,
}

impl AuthorFilter {
    /// Seed the filter with the authors already on file for `identifier`.
    pub fn new(identifier: impl Into<String>, known_authors: &HashSet<String>) -> Self {
        Self {
            identifier: identifier.into(),
            seen: known_authors.clone(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Authors to hand to the extractor as its exclusion set.
    pub fn excluded(&self) -> &HashSet<String> {
        &self.seen
    }

    /// Keep entries from authors not yet seen, recording them as seen.
    ///
    /// Entries with a blank author or blank text are dropped.
    pub fn retain_new(&mut self, entries: Vec<FeedbackEntry>) -> Vec<FeedbackEntry> {
        entries
            .into_iter()
            .filter(|e| !e.author.trim().is_empty() && !e.text.trim().is_empty())
            .filter(|e| self.seen.insert(e.author.clone()))
            .collect()
    }
}
