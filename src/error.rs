use thiserror::Error;

/// Recoverable failures surfaced to the API layer.
///
/// The `Display` text of each variant is the reason string returned to callers,
/// so keep it short and user-facing.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("{what} not found.")]
    NotFound { what: String },

    #[error("{reason}")]
    InsufficientData { reason: String },

    #[error("Model not found for requested stat ({stat}).")]
    ModelUnavailable { stat: String },

    #[error("{reason}")]
    InvalidRequest { reason: String },

    #[error("Model for {stat} returned an unusable probability.")]
    BadModelOutput { stat: String },

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl PredictError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Short machine-readable tag, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::BadModelOutput { .. } => "bad_model_output",
            Self::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PredictError;

    #[test]
    fn reason_strings_are_plain() {
        let err = PredictError::insufficient("Not enough opponent history to build features.");
        assert_eq!(
            err.to_string(),
            "Not enough opponent history to build features."
        );
        assert_eq!(err.kind(), "insufficient_data");
        assert_eq!(
            PredictError::not_found("Player").to_string(),
            "Player not found."
        );
    }
}
