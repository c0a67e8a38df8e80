//! abrank-common - Shared entities, errors and configuration used across all abrank crates.

pub mod error;
pub mod entities;
pub mod weights;
pub mod config;

// Re-export commonly used types
pub use config::{
    DockingConfig, ExecutionConfig, FilterConfig, FusionConfig, ImmunogenicityConfig,
    LiabilityConfig, LoopPeaks, MissingDataPolicy, PipelineConfig, PoseReduction,
    ShortlistConfig, SolubilityConfig,
};
pub use entities::{
    CdrLoop, CdrRegion, Cohort, ExcludedVariant, PipelineStage, Variant,
    VariantId, VariantSpec,
};
pub use error::{AbrankError, Result};
pub use weights::DevelopabilityWeights;
