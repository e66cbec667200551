use thiserror::Error;

/// Errors raised by the calculation, numbering and lifecycle engine.
///
/// Calculators fail synchronously and never produce a partial result; the
/// enclosing create/update operation rejects the whole write.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// One or more input fields are invalid.
    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// The operation is not allowed in the document's current state.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A unit of work kept conflicting and the retry budget ran out.
    #[error("could not commit '{key}' after {attempts} attempts")]
    RetryExceeded { key: String, attempts: u32 },

    /// A concurrent writer won; the unit of work was rolled back.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An external collaborator (catalog, store) did not answer in time.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Persisted state contradicts itself. Never expected with atomic writes.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// Referenced document, client or counter does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage backend failure that is not a serialization conflict.
    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![ValidationError::new(field, message)])
    }

    /// Transient failures the caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RetryExceeded { .. } | Self::Conflict(_) | Self::Unavailable(_)
        )
    }

    /// Field-level validation problems, empty for all other variants.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "line_items[0].tax_key").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
    /// Short rule identifier if applicable (e.g. "TAX-KEY-UNKNOWN").
    pub rule: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "[{}] {}: {}", rule, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl ValidationError {
    /// Create a validation error without a rule ID.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Create a validation error with a rule ID.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}
