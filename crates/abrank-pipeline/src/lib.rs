//! abrank-pipeline - Candidate scoring and ranking pipeline.
//! Wires the scoring crates into one run over a cohort:
//! - Collaborator interfaces (structure, peptide binding, docking)
//! - Bounded per-variant fan-out with collaborator timeouts
//! - Hard gates
//! - Cohort-level aggregation and rank fusion
//! - CSV / JSON report export

pub mod sources;
pub mod gates;
pub mod bundle;
pub mod pipeline;
pub mod report;

pub use bundle::CohortBundle;
pub use pipeline::{AbrankPipeline, PipelineProgress, PipelineReport, VariantIssue, VariantRecords};
pub use sources::{
    Collaborators, DockingPoseSource, InMemoryPeptides, InMemoryPoses, InMemoryStructures,
    PeptideBindingPredictor, StructurePredictor,
};
