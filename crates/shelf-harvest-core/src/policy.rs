//! Harvest policy: tunables and the skip taxonomy.
//!
//! [`HarvestPolicy`] is deserialized from the `[harvest]` table of the
//! configuration file and handed to the controller at construction time.
//! [`SkipReason`] enumerates every expected, non-fatal extraction outcome.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::models::Item;

/// Why a candidate reference was dropped without producing an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingTitle,
    MissingIdentifier,
    /// The title contains a configured banned phrase.
    BannedTitle(String),
    /// The item's language is not the target language (`None` = unknown).
    WrongLanguage(Option<String>),
    /// An expected page element was absent after the bounded wait.
    ElementNotFound(String),
    Timeout,
    /// Reference or identifier already handled in this run.
    Duplicate,
    /// A stored item short on feedback for which no new entry was found.
    NoNewFeedback,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingTitle => write!(f, "missing title"),
            SkipReason::MissingIdentifier => write!(f, "missing identifier"),
            SkipReason::BannedTitle(phrase) => write!(f, "banned title phrase '{}'", phrase),
            SkipReason::WrongLanguage(Some(lang)) => write!(f, "language '{}'", lang),
            SkipReason::WrongLanguage(None) => write!(f, "unknown language"),
            SkipReason::ElementNotFound(what) => write!(f, "element not found: {}", what),
            SkipReason::Timeout => write!(f, "timed out"),
            SkipReason::Duplicate => write!(f, "duplicate"),
            SkipReason::NoNewFeedback => write!(f, "no new feedback"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestPolicy {
    /// Pause after each listing page turn.
    #[serde(default = "default_page_load_wait_ms")]
    pub page_load_wait_ms: u64,
    /// Upper bound on any single navigation or extraction step.
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    #[serde(default)]
    pub banned_titles: Vec<String>,
    #[serde(default = "default_feedback_per_item")]
    pub feedback_per_item: usize,
    /// Fraction of the deficit added to absorb extraction failures.
    #[serde(default = "default_error_margin")]
    pub error_margin: f64,
    /// Required item language; `None` or an empty string accepts every
    /// language.
    #[serde(default = "default_language")]
    pub language: Option<String>,
}

fn default_page_load_wait_ms() -> u64 {
    500
}
fn default_navigation_timeout_secs() -> u64 {
    15
}
fn default_feedback_per_item() -> usize {
    10
}
fn default_error_margin() -> f64 {
    0.05
}
fn default_language() -> Option<String> {
    Some("English".to_string())
}

impl Default for HarvestPolicy {
    fn default() -> Self {
        Self {
            page_load_wait_ms: default_page_load_wait_ms(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            banned_titles: Vec::new(),
            feedback_per_item: default_feedback_per_item(),
            error_margin: default_error_margin(),
            language: default_language(),
        }
    }
}

impl HarvestPolicy {
    pub fn page_load_wait(&self) -> Duration {
        Duration::from_millis(self.page_load_wait_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    /// Deficit plus the error margin, rounded down.
    pub fn budget(&self, deficit: usize) -> usize {
        deficit + (deficit as f64 * self.error_margin).floor() as usize
    }

    /// Screen an extracted item before any feedback work is done on it.
    pub fn screen(&self, item: &Item) -> Option<SkipReason> {
        if item.identifier.trim().is_empty() {
            return Some(SkipReason::MissingIdentifier);
        }
        if item.title.trim().is_empty() {
            return Some(SkipReason::MissingTitle);
        }
        if let Some(phrase) = self
            .banned_titles
            .iter()
            .find(|phrase| !phrase.is_empty() && item.title.contains(phrase.as_str()))
        {
            return Some(SkipReason::BannedTitle(phrase.clone()));
        }
        if let Some(wanted) = self.language.as_deref().filter(|w| !w.is_empty()) {
            match item.language.as_deref() {
                Some(lang) if lang.eq_ignore_ascii_case(wanted) => {}
                other => return Some(SkipReason::WrongLanguage(other.map(str::to_string))),
            }
        }
        None
    }
}
