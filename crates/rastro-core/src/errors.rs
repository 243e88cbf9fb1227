/// Errors surfaced by hub operations.
///
/// Connection-local failures (`Malformed`) end the offending connection only.
/// `NotFound` is a normal lookup outcome, not an internal fault.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl HubError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Malformed(_) => "malformed",
            Self::Conflict(_) => "conflict",
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::Malformed(e.to_string())
    }
}
