//! Error types for the demand forecasting pipeline.

use thiserror::Error;

use crate::schema::CanonicalField;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types for pipeline operations.
///
/// Batch-level problems (`SchemaValidation`, invalid configuration) abort a
/// run. Entity-level problems (`Forecasting`) are collected per entity and
/// never stop sibling entities from producing results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Schema validation failed: missing required fields: {}", join_fields(.missing))]
    SchemaValidation { missing: Vec<CanonicalField> },

    #[error("Invalid horizon: requested {requested} periods, must be between 1 and {max}")]
    InvalidHorizon { requested: usize, max: usize },

    #[error("Forecasting failed for entity '{entity}': {reason}")]
    Forecasting { entity: String, reason: String },

    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Internal error: {0}")]
    InternalError(String),
}

fn join_fields(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl PipelineError {
    /// Convert to a stable numeric code (used as the CLI exit status).
    pub fn to_code(&self) -> i32 {
        match self {
            PipelineError::SchemaValidation { .. } => 2,
            PipelineError::InvalidHorizon { .. } => 3,
            PipelineError::Forecasting { .. } => 4,
            PipelineError::InsufficientData { .. } => 5,
            PipelineError::InvalidInput(_) => 6,
            PipelineError::ComputationError(_) => 7,
            PipelineError::InvalidModel(_) => 8,
            PipelineError::InvalidParameter { .. } => 9,
            PipelineError::InternalError(_) => 10,
        }
    }

    /// Attach an entity to a capability-level error.
    ///
    /// Errors that already name an entity are returned unchanged.
    pub fn for_entity(self, entity: &str) -> PipelineError {
        match self {
            err @ PipelineError::Forecasting { .. } => err,
            other => PipelineError::Forecasting {
                entity: entity.to_string(),
                reason: other.to_string(),
            },
        }
    }

    pub(crate) fn invalid_parameter(
        param: &str,
        value: impl ToString,
        reason: &str,
    ) -> PipelineError {
        PipelineError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
