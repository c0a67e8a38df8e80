//! External collaborator interfaces.
//!
//! Structure prediction, peptide-binding prediction and docking all run
//! outside this process. The pipeline only sees their outputs through these
//! traits, so they can be backed by files, a job queue or a remote service.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use abrank_common::{Variant, VariantId};
use abrank_developability::{PeptidePrediction, RawStructurePrediction};
use abrank_ranker::DockingPose;

/// Source of raw structure predictions.
#[async_trait]
pub trait StructurePredictor: Send + Sync {
    /// Returns `None` when no prediction exists (yet) for the variant.
    async fn predict(&self, variant: &Variant) -> anyhow::Result<Option<RawStructurePrediction>>;
}

/// Source of MHC-II peptide-binding predictions.
#[async_trait]
pub trait PeptideBindingPredictor: Send + Sync {
    /// Returns `None` when the variant has not been run through the predictor.
    async fn predict(&self, variant: &Variant) -> anyhow::Result<Option<Vec<PeptidePrediction>>>;
}

/// Source of docking poses.
#[async_trait]
pub trait DockingPoseSource: Send + Sync {
    /// Every pose produced so far for the variant; empty when none.
    async fn poses(&self, variant: &Variant) -> anyhow::Result<Vec<DockingPose>>;
}

/// The three collaborators a pipeline run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub structures: Arc<dyn StructurePredictor>,
    pub peptides: Arc<dyn PeptideBindingPredictor>,
    pub docking: Arc<dyn DockingPoseSource>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    pub fn new(
        structures: impl StructurePredictor + 'static,
        peptides: impl PeptideBindingPredictor + 'static,
        docking: impl DockingPoseSource + 'static,
    ) -> Self {
        Self {
            structures: Arc::new(structures),
            peptides: Arc::new(peptides),
            docking: Arc::new(docking),
        }
    }
}

// ── In-memory implementations ──────────────────────────────────────────────

/// Pre-computed structure predictions keyed by variant id.
///
/// When several seeds are supplied for one variant, the lowest seed is kept.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStructures {
    data: BTreeMap<VariantId, RawStructurePrediction>,
}

impl InMemoryStructures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prediction: RawStructurePrediction) -> Self {
        self.insert(prediction);
        self
    }

    pub fn insert(&mut self, prediction: RawStructurePrediction) {
        match self.data.get(&prediction.variant_id) {
            Some(existing) if existing.seed <= prediction.seed => {
                warn!(
                    variant_id = %prediction.variant_id,
                    kept_seed = existing.seed,
                    dropped_seed = prediction.seed,
                    "Duplicate structure prediction ignored"
                );
            }
            _ => {
                self.data.insert(prediction.variant_id.clone(), prediction);
            }
        }
    }
}

#[async_trait]
impl StructurePredictor for InMemoryStructures {
    async fn predict(&self, variant: &Variant) -> anyhow::Result<Option<RawStructurePrediction>> {
        Ok(self.data.get(variant.id()).cloned())
    }
}

/// Pre-computed peptide predictions keyed by variant id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPeptides {
    data: BTreeMap<VariantId, Vec<PeptidePrediction>>,
}

impl InMemoryPeptides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prediction: PeptidePrediction) -> Self {
        self.insert(prediction);
        self
    }

    pub fn insert(&mut self, prediction: PeptidePrediction) {
        self.data
            .entry(prediction.variant_id.clone())
            .or_default()
            .push(prediction);
    }
}

#[async_trait]
impl PeptideBindingPredictor for InMemoryPeptides {
    async fn predict(&self, variant: &Variant) -> anyhow::Result<Option<Vec<PeptidePrediction>>> {
        Ok(self.data.get(variant.id()).cloned())
    }
}

/// Pre-computed docking poses keyed by variant id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPoses {
    data: BTreeMap<VariantId, Vec<DockingPose>>,
}

impl InMemoryPoses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pose: DockingPose) -> Self {
        self.insert(pose);
        self
    }

    pub fn insert(&mut self, pose: DockingPose) {
        self.data.entry(pose.variant_id.clone()).or_default().push(pose);
    }
}

#[async_trait]
impl DockingPoseSource for InMemoryPoses {
    async fn poses(&self, variant: &Variant) -> anyhow::Result<Vec<DockingPose>> {
        Ok(self.data.get(variant.id()).cloned().unwrap_or_default())
    }
}
