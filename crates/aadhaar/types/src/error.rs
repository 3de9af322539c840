use thiserror::Error;

/// Errors raised while parsing or validating domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("malformed digest: {0}")]
    MalformedDigest(String),

    #[error("malformed access token")]
    MalformedToken,
}

impl TypesError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::invalid(field, "is required")
    }
}
