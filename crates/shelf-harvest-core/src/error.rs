//! Fatal error taxonomy.
//!
//! Only conditions that must halt an acquisition run are represented here.
//! Expected, per-candidate failures are modelled as
//! [`SkipReason`](crate::policy::SkipReason) and never surface as errors.

/// Result alias for fallible harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Malformed or incomplete configuration (e.g. a feedback extraction
    /// requested with neither a live session nor a starting locator).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown storage backend '{0}': expected 'local' or 'cloud'")]
    UnknownBackend(String),

    /// Exactly one of the two mirrored stores holds a record.
    #[error(
        "integrity violation: item '{identifier}' is present in {present_in} but missing from {missing_from}"
    )]
    Integrity {
        identifier: String,
        present_in: String,
        missing_from: String,
    },

    /// A critical write or read against a store failed.
    #[error("storage error in {backend}: {source}")]
    Storage {
        backend: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarvestError {
    pub fn storage(backend: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        HarvestError::Storage {
            backend: backend.into(),
            source: source.into(),
        }
    }

    /// True for dual-store mismatches.
    pub fn is_integrity(&self) -> bool {
        matches!(self, HarvestError::Integrity { .. })
    }
}
