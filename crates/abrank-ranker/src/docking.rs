//! Reduction of docking poses to a single per-variant confidence.
//!
//! A variant with no poses gets no record at all. Absence is carried forward
//! as `None` and resolved later by the missing-data policy, never as 0.0.
//!
//! When poses report an interface PAE (Å, lower is better) and a penalty
//! weight is configured, the ranking confidence is
//! `interface_confidence - pae_penalty × min(pae / pae_ceiling, 1)`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use abrank_common::{AbrankError, DockingConfig, PoseReduction, Result, VariantId};

/// One docked model of a variant against the target antigen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingPose {
    pub variant_id: VariantId,
    /// Seed / model index of the docking run.
    pub seed: u32,
    pub interface_confidence: f64,
    #[serde(default)]
    pub global_confidence: Option<f64>,
    /// Mean predicted aligned error across the antibody-antigen interface.
    #[serde(default)]
    pub interface_pae: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingRecord {
    pub variant_id: VariantId,
    /// Ranking confidence: reduced interface confidence minus the PAE
    /// penalty. Higher = better.
    pub confidence: f64,
    /// Reduced interface confidence before any PAE penalty.
    pub interface_confidence: f64,
    /// Mean interface PAE over the poses used, when every one reports it.
    pub interface_pae: Option<f64>,
    /// Mean global confidence over the poses used, when every one reports it.
    pub global_confidence: Option<f64>,
    pub reduction: PoseReduction,
    pub poses_used: usize,
    pub poses_available: usize,
    /// Seed of the highest-confidence pose.
    pub best_seed: u32,
}

/// Highest interface confidence first; equal confidences by ascending seed.
fn pose_order(a: &DockingPose, b: &DockingPose) -> Ordering {
    b.interface_confidence
        .total_cmp(&a.interface_confidence)
        .then(a.seed.cmp(&b.seed))
}

pub struct DockingScorer<'a> {
    config: &'a DockingConfig,
}

impl<'a> DockingScorer<'a> {
    pub fn new(config: &'a DockingConfig) -> Self {
        Self { config }
    }

    /// Reduce `poses` for `variant_id`.
    ///
    /// `Ok(None)` when there are no poses. Poses for another variant or with
    /// non-finite confidence are a `Parse` error.
    pub fn reduce(
        &self,
        variant_id: &VariantId,
        poses: &[DockingPose],
    ) -> Result<Option<DockingRecord>> {
        for pose in poses {
            if pose.variant_id != *variant_id {
                return Err(AbrankError::parse(
                    variant_id,
                    format!("docking pose (seed {}) belongs to variant {}", pose.seed, pose.variant_id),
                ));
            }
            let global_ok = pose.global_confidence.map_or(true, f64::is_finite);
            if !pose.interface_confidence.is_finite() || !global_ok {
                return Err(AbrankError::parse(
                    variant_id,
                    format!("non-finite confidence in docking pose seed {}", pose.seed),
                ));
            }
            if let Some(pae) = pose.interface_pae {
                if !pae.is_finite() || pae < 0.0 {
                    return Err(AbrankError::parse(
                        variant_id,
                        format!("invalid interface PAE {pae} in docking pose seed {}", pose.seed),
                    ));
                }
            }
        }

        if poses.is_empty() {
            debug!(variant_id = %variant_id, "No docking poses; record left missing");
            return Ok(None);
        }

        let mut sorted: Vec<&DockingPose> = poses.iter().collect();
        sorted.sort_by(|a, b| pose_order(a, b));

        let k = match self.config.reduction {
            PoseReduction::BestOfN => 1,
            PoseReduction::TopKAverage => self.config.top_k.clamp(1, sorted.len()),
        };
        let used = &sorted[..k];

        let interface_confidence =
            used.iter().map(|p| p.interface_confidence).sum::<f64>() / k as f64;
        let mean_of = |values: Option<Vec<f64>>| values.map(|v| v.iter().sum::<f64>() / k as f64);
        let global_confidence =
            mean_of(used.iter().map(|p| p.global_confidence).collect::<Option<Vec<f64>>>());
        let interface_pae =
            mean_of(used.iter().map(|p| p.interface_pae).collect::<Option<Vec<f64>>>());

        let penalty = interface_pae.map_or(0.0, |pae| {
            self.config.pae_penalty * (pae / self.config.pae_ceiling).min(1.0)
        });
        let confidence = interface_confidence - penalty;
        if penalty > 0.0 {
            debug!(
                variant_id = %variant_id,
                interface_confidence,
                interface_pae = ?interface_pae,
                penalty,
                "Interface PAE penalty applied"
            );
        }

        Ok(Some(DockingRecord {
            variant_id: variant_id.clone(),
            confidence,
            interface_confidence,
            interface_pae,
            global_confidence,
            reduction: self.config.reduction,
            poses_used: k,
            poses_available: poses.len(),
            best_seed: sorted[0].seed,
        }))
    }
}
