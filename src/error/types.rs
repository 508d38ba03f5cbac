use thiserror::Error;

/// Unified result type for the Mosaic crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the layout engine.
///
/// Component-level failures (a constraint that cannot be honoured, a
/// rectangle that does not fit) never appear here; they are folded into the
/// layout's `not_placed` records. `EngineError` is reserved for malformed
/// input the caller must fix.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("constraint `{constraint_id}` is invalid: {reason}")]
    InvalidConstraint {
        constraint_id: String,
        reason: String,
    },
    #[error("component `{0}` is not part of the DMApp")]
    UnknownComponent(String),
    #[error("constraint document has no `default` entry")]
    MissingDefaultConstraint,
    #[error("layout model `{0}` is not supported by the packer engine")]
    UnsupportedLayoutModel(String),
    #[error("constraint document version {0} is not supported")]
    UnsupportedDocumentVersion(u32),
    #[error("constraint document error: {0}")]
    Document(#[from] serde_json::Error),
}
