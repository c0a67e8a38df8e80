use thiserror::Error;

use crate::entities::{ExcludedVariant, VariantId};

#[derive(Debug, Error)]
pub enum AbrankError {
    /// Collaborator output was present but malformed or inconsistent with the variant.
    #[error("Parse error for variant {variant_id}: {message}")]
    Parse { variant_id: VariantId, message: String },

    /// Collaborator output was absent (not produced, not finished, or timed out).
    #[error("Missing data for variant {variant_id}: {message}")]
    MissingData { variant_id: VariantId, message: String },

    #[error("Scoring configuration error: {0}")]
    Scoring(String),

    #[error("Ranking error: {message} ({count} variants excluded)", count = .excluded.len())]
    Ranking {
        message: String,
        excluded: Vec<ExcludedVariant>,
    },

    #[error("Invalid variant {variant_id}: {message}")]
    InvalidVariant { variant_id: VariantId, message: String },

    #[error("Invalid cohort: {0}")]
    InvalidCohort(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AbrankError {
    pub fn parse(variant_id: &VariantId, message: impl Into<String>) -> Self {
        Self::Parse {
            variant_id: variant_id.clone(),
            message: message.into(),
        }
    }

    pub fn missing(variant_id: &VariantId, message: impl Into<String>) -> Self {
        Self::MissingData {
            variant_id: variant_id.clone(),
            message: message.into(),
        }
    }

    /// Variant the error is attributed to, for per-variant failures.
    pub fn variant_id(&self) -> Option<&VariantId> {
        match self {
            Self::Parse { variant_id, .. }
            | Self::MissingData { variant_id, .. }
            | Self::InvalidVariant { variant_id, .. } => Some(variant_id),
            _ => None,
        }
    }

    /// Per-variant failures only mark a record missing; everything else aborts the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Parse { .. } | Self::MissingData { .. })
    }
}

pub type Result<T> = std::result::Result<T, AbrankError>;
