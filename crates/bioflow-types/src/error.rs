use thiserror::Error;

/// Application-level error taxonomy shared by commands, queries and handlers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl AppError {
    /// Validation and data errors are never worth redelivering.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AppError::Invalid(_))
    }
}

/// Errors from repository operations (used by trait definitions in bioflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => AppError::NotFound("entity not found".to_string()),
            RepositoryError::Conflict(msg) => AppError::AlreadyExists(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Errors reported by the workflow engine client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine resource not found: {0}")]
    NotFound(String),

    #[error("engine rejected request: {0}")]
    BadRequest(String),

    #[error("engine error: {0}")]
    Other(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(msg) => AppError::NotFound(msg),
            EngineError::BadRequest(msg) => AppError::Invalid(msg),
            EngineError::Other(msg) => AppError::Internal(msg),
        }
    }
}

/// Errors raised while expanding an input/output template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("malformed reference '{0}'")]
    MalformedReference(String),

    #[error("header '{header}' not found in table '{table}'")]
    UnknownHeader { table: String, header: String },

    #[error("row '{row_id}' not found in table '{table}'")]
    UnknownRow { table: String, row_id: String },

    #[error("path '{0}' descends deeper than the available entity-set levels")]
    PathTooDeep(String),

    #[error("no workspace table available for '{0}'")]
    MissingWorkspaceTable(String),

    #[error("no current row for '{0}'")]
    MissingRow(String),

    #[error("cell '{0}' is not a JSON list of row ids")]
    NotAnIdList(String),

    #[error("data model lookup failed: {0}")]
    Lookup(String),
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_repository_error_into_app_error() {
        assert!(matches!(
            AppError::from(RepositoryError::NotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(RepositoryError::Conflict("dup".into())),
            AppError::AlreadyExists(_)
        ));
        assert!(matches!(
            AppError::from(RepositoryError::Connection),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn test_only_invalid_is_non_retryable() {
        assert!(!AppError::Invalid("x".into()).is_retryable());
        assert!(AppError::Internal("x".into()).is_retryable());
        assert!(AppError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_resolve_error_surfaces_as_internal() {
        let err: AppError = ResolveError::UnknownHeader {
            table: "sample".into(),
            header: "bam".into(),
        }
        .into();
        match err {
            AppError::Internal(msg) => assert!(msg.contains("bam")),
            other => panic!("expected Internal, got {other:?}"),
        }
    }
}
