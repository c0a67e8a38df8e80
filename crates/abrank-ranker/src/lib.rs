//! abrank-ranker - docking reduction and final rank fusion.
//!
//! Consumes the cohort's developability records and per-variant docking
//! poses, and produces the deterministic final ranking and a diversity-aware
//! shortlist of its head.

pub mod docking;
pub mod merge;
pub mod shortlist;

pub use docking::{DockingPose, DockingRecord, DockingScorer};
pub use merge::{DockingSource, RankMerger, RankedCandidate, RankingOutcome};
pub use shortlist::{select_diverse, DiversityFeatures, ShortlistEntry};
