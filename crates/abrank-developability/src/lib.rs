//! abrank-developability - per-variant developability scoring.
//!
//! Covers the sequence- and structure-side of candidate triage:
//! 1. Structural confidence extraction from predictor output
//! 2. Solubility / aggregation risk from sequence
//! 3. CDR chemical-liability scanning
//! 4. T-cell epitope burden from peptide-binding predictions
//! 5. Cohort normalisation and the Composite Developability Score

pub mod normalise;
pub mod structure;
pub mod solubility;
pub mod liability;
pub mod immunogenicity;
pub mod aggregate;

pub use aggregate::{aggregate, composite_score, DevelopabilityRecord, RawDevelopability};
pub use immunogenicity::{score_immunogenicity, ImmunogenicityScore, PeptidePrediction};
pub use liability::{LiabilityFinding, LiabilityKind, LiabilityReport, LiabilityScorer};
pub use solubility::{SolubilityScore, SolubilityScorer};
pub use structure::{
    extract_metrics, ChainRole, ChainSpan, LoopConfidence, RawStructurePrediction,
    StructuralMetrics,
};
