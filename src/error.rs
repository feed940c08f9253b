use thiserror::Error;

use crate::models::TalkerId;

/// The document could not be turned into a section tree. Fatal for the date.
#[derive(Debug, Clone, Error)]
#[error("malformed document {source_id}: {reason}")]
pub struct MalformedDocument {
    pub source_id: String,
    pub reason: String,
}

impl MalformedDocument {
    pub fn new(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}

/// A reference that could not be attached to its entity. Logged, never fatal.
#[derive(Debug, Clone, Error)]
#[error("unresolved reference {reference}: {reason}")]
pub struct UnresolvedReference {
    pub reference: String,
    pub reason: String,
}

/// Talker roster failures
#[derive(Debug, Clone, Error)]
pub enum RosterError {
    /// The label maps to a talker whose record does not carry it
    #[error("roster conflict for label '{label}': mapped to {existing}, record disagrees")]
    Conflict { label: String, existing: TalkerId },

    /// Nothing left to key on after normalization
    #[error("talker label '{0}' is empty after normalization")]
    EmptyLabel(String),
}

/// Document fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no transcript found for {0}")]
    NotFound(String),

    #[error("transcript request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcript source returned {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("failed to read transcript: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence gateway failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The batch breaks an entity invariant and was not applied
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything that can fail a single sitting date
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    MalformedDocument(#[from] MalformedDocument),

    #[error(transparent)]
    RosterConflict(#[from] RosterError),

    #[error("fetch failed: {0}")]
    FetchFailure(#[from] FetchError),

    #[error("persistence failed: {0}")]
    PersistenceFailure(#[from] PersistenceError),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    /// A blocking worker panicked or was cancelled
    #[error("worker failed: {0}")]
    Worker(String),
}

impl IngestError {
    /// Short machine-friendly name for status reports
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MalformedDocument(_) => "malformed_document",
            IngestError::RosterConflict(_) => "roster_conflict",
            IngestError::FetchFailure(FetchError::NotFound(_)) => "not_found",
            IngestError::FetchFailure(_) => "fetch_failure",
            IngestError::PersistenceFailure(_) => "persistence_failure",
            IngestError::Timeout { .. } => "timeout",
            IngestError::Worker(_) => "worker",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err: IngestError = MalformedDocument::new("a.xml", "truncated").into();
        assert_eq!(err.kind(), "malformed_document");
        assert_eq!(err.to_string(), "malformed document a.xml: truncated");

        let err: IngestError = FetchError::NotFound("hor 2024-02-06".into()).into();
        assert_eq!(err.kind(), "not_found");

        let err = IngestError::Timeout {
            stage: "fetch",
            secs: 30,
        };
        assert_eq!(err.to_string(), "fetch timed out after 30s");
    }
}
