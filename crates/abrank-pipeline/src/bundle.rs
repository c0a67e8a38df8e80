//! JSON cohort bundle: the variants of one run plus every collaborator
//! output already collected for them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use abrank_common::{Result, Variant, VariantSpec};
use abrank_developability::{PeptidePrediction, RawStructurePrediction};
use abrank_ranker::DockingPose;

use crate::sources::{Collaborators, InMemoryPeptides, InMemoryPoses, InMemoryStructures};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohortBundle {
    pub variants: Vec<VariantSpec>,
    #[serde(default)]
    pub structures: Vec<RawStructurePrediction>,
    #[serde(default)]
    pub peptides: Vec<PeptidePrediction>,
    #[serde(default)]
    pub poses: Vec<DockingPose>,
}

impl CohortBundle {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let bundle = Self::from_json_str(&content)?;
        info!(
            path = %path.as_ref().display(),
            variants = bundle.variants.len(),
            structures = bundle.structures.len(),
            peptides = bundle.peptides.len(),
            poses = bundle.poses.len(),
            "Cohort bundle loaded"
        );
        Ok(bundle)
    }

    /// Validate every variant and wrap the collaborator outputs in in-memory
    /// sources. Any invalid variant fails the whole bundle.
    pub fn into_parts(self) -> Result<(Vec<Variant>, Collaborators)> {
        let variants = self
            .variants
            .into_iter()
            .map(Variant::new)
            .collect::<Result<Vec<_>>>()?;

        let mut structures = InMemoryStructures::new();
        for s in self.structures {
            structures.insert(s);
        }
        let mut peptides = InMemoryPeptides::new();
        for p in self.peptides {
            peptides.insert(p);
        }
        let mut poses = InMemoryPoses::new();
        for p in self.poses {
            poses.insert(p);
        }

        Ok((variants, Collaborators::new(structures, peptides, poses)))
    }
}
