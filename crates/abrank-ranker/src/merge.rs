//! Rank fusion of developability and docking.
//!
//! final_score = α·(1 − n_cds_rank) + (1 − α)·(1 − n_dock_rank)
//!
//! Both ranks are computed over the final candidate set and normalised to
//! [0, 1] with rank 1 → 0. Every ordering breaks exact ties by ascending
//! variant id, so the output is a total order independent of input order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use abrank_common::{
    AbrankError, ExcludedVariant, FusionConfig, MissingDataPolicy, PipelineStage, Result,
    VariantId,
};
use abrank_developability::normalise::normalise_rank;
use abrank_developability::DevelopabilityRecord;

use crate::docking::DockingRecord;

/// Where a candidate's docking rank came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockingSource {
    Measured,
    WorstRank,
    ImputedMedian,
}

impl DockingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Measured => "measured",
            Self::WorstRank => "worst_rank",
            Self::ImputedMedian => "imputed_median",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub variant_id: VariantId,
    pub cds: f64,
    /// None when the docking record is missing; never defaulted to 0.
    pub docking_confidence: Option<f64>,
    pub cds_rank: usize,
    /// Fractional under IMPUTE_MEDIAN with an even number of measured variants.
    pub docking_rank: f64,
    pub docking_source: DockingSource,
    pub final_score: f64,
    /// 1 = best; contiguous 1..N.
    pub final_rank: usize,
    /// Lexicographic key applied to exact score ties.
    pub tie_break_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingOutcome {
    pub ranked: Vec<RankedCandidate>,
    /// Candidates removed by the EXCLUDE policy.
    pub pending: Vec<ExcludedVariant>,
}

/// Descending by score, ascending by id on exact ties.
fn score_desc_then_id(a: (f64, &VariantId), b: (f64, &VariantId)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

pub struct RankMerger<'a> {
    config: &'a FusionConfig,
}

impl<'a> RankMerger<'a> {
    pub fn new(config: &'a FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse the cohort's developability and docking records into one ranking.
    ///
    /// Every developability record is a candidate. Docking records for
    /// variants without one are ignored. Fails with `Ranking` when the
    /// missing-data policy leaves nothing to rank.
    pub fn merge(
        &self,
        developability: &[DevelopabilityRecord],
        docking: &[DockingRecord],
    ) -> Result<RankingOutcome> {
        let alpha = self.config.alpha;
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            return Err(AbrankError::Scoring(format!("fusion alpha must lie in [0, 1], got {alpha}")));
        }

        let mut cds_by_id: BTreeMap<&VariantId, f64> = BTreeMap::new();
        for rec in developability {
            if cds_by_id.insert(&rec.variant_id, rec.cds).is_some() {
                return Err(AbrankError::InvalidCohort(format!(
                    "duplicate developability record for {}",
                    rec.variant_id
                )));
            }
        }
        let mut dock_by_id: BTreeMap<&VariantId, f64> = BTreeMap::new();
        for rec in docking {
            if dock_by_id.insert(&rec.variant_id, rec.confidence).is_some() {
                return Err(AbrankError::InvalidCohort(format!(
                    "duplicate docking record for {}",
                    rec.variant_id
                )));
            }
        }

        // Apply the policy to decide the final candidate set.
        let mut pending = Vec::new();
        let candidates: Vec<&VariantId> = match self.config.missing_data {
            MissingDataPolicy::Exclude => cds_by_id
                .keys()
                .copied()
                .filter(|id| {
                    let docked = dock_by_id.contains_key(id);
                    if !docked {
                        pending.push(ExcludedVariant::new(
                            (*id).clone(),
                            PipelineStage::Docking,
                            "no docking record",
                        ));
                    }
                    docked
                })
                .collect(),
            MissingDataPolicy::WorstRank | MissingDataPolicy::ImputeMedian => {
                cds_by_id.keys().copied().collect()
            }
        };

        if candidates.is_empty() {
            return Err(AbrankError::Ranking {
                message: "no rankable variants after applying the missing-data policy".into(),
                excluded: pending,
            });
        }
        let n = candidates.len();

        // CDS ranks over the final set.
        let mut by_cds = candidates.clone();
        by_cds.sort_by(|a, b| score_desc_then_id((cds_by_id[a], a), (cds_by_id[b], b)));
        let cds_rank: BTreeMap<&VariantId, usize> =
            by_cds.iter().enumerate().map(|(i, id)| (*id, i + 1)).collect();

        // Docking ranks: measured 1..M, missing per policy.
        let mut measured: Vec<&VariantId> = candidates
            .iter()
            .copied()
            .filter(|id| dock_by_id.contains_key(id))
            .collect();
        measured.sort_by(|a, b| score_desc_then_id((dock_by_id[a], a), (dock_by_id[b], b)));
        let m = measured.len();
        let measured_rank: BTreeMap<&VariantId, usize> =
            measured.iter().enumerate().map(|(i, id)| (*id, i + 1)).collect();

        // `worst` is the largest docking rank actually assigned.
        let (missing_rank, missing_source, worst) = match self.config.missing_data {
            // Nothing is missing under EXCLUDE.
            MissingDataPolicy::Exclude => (m as f64, DockingSource::Measured, m as f64),
            MissingDataPolicy::WorstRank => {
                let worst = if m < n { m + 1 } else { m };
                ((m + 1) as f64, DockingSource::WorstRank, worst as f64)
            }
            MissingDataPolicy::ImputeMedian => {
                ((m as f64 + 1.0) / 2.0, DockingSource::ImputedMedian, m as f64)
            }
        };

        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .map(|&id| {
                let (docking_rank, docking_source) = match measured_rank.get(id) {
                    Some(&r) => (r as f64, DockingSource::Measured),
                    None => (missing_rank, missing_source),
                };
                let n_dock = if m == 0 && missing_source == DockingSource::ImputedMedian {
                    0.5
                } else {
                    normalise_rank(docking_rank, worst)
                };
                let n_cds = normalise_rank(cds_rank[id] as f64, n as f64);
                let final_score = alpha * (1.0 - n_cds) + (1.0 - alpha) * (1.0 - n_dock);

                RankedCandidate {
                    variant_id: id.clone(),
                    cds: cds_by_id[id],
                    docking_confidence: dock_by_id.get(id).copied(),
                    cds_rank: cds_rank[id],
                    docking_rank,
                    docking_source,
                    final_score,
                    final_rank: 0,
                    tie_break_key: id.as_str().to_string(),
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            score_desc_then_id((a.final_score, &a.variant_id), (b.final_score, &b.variant_id))
        });
        for (i, c) in ranked.iter_mut().enumerate() {
            c.final_rank = i + 1;
        }

        debug!(
            measured = m,
            imputed = n - m,
            policy = ?self.config.missing_data,
            "Docking ranks assigned"
        );
        info!(ranked = n, pending = pending.len(), "Rank fusion complete");

        Ok(RankingOutcome { ranked, pending })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abrank_common::PoseReduction;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn ranked_ids(ranked: &[RankedCandidate]) -> Vec<&str> {
        ranked.iter().map(|c| c.variant_id.as_str()).collect()
    }

    /// Final ranks are 1..N, each exactly once.
    fn is_contiguous(ranked: &[RankedCandidate]) -> bool {
        let ranks: BTreeSet<usize> = ranked.iter().map(|c| c.final_rank).collect();
        ranks.len() == ranked.len() && ranks.iter().copied().eq(1..=ranked.len())
    }

    fn dev(id: &str, cds: f64) -> DevelopabilityRecord {
        DevelopabilityRecord {
            variant_id: VariantId::new(id),
            norm_solubility: 0.0,
            norm_liability: 0.0,
            norm_immunogenicity: 0.0,
            cds,
        }
    }

    fn dock(id: &str, confidence: f64) -> DockingRecord {
        DockingRecord {
            variant_id: VariantId::new(id),
            confidence,
            interface_confidence: confidence,
            interface_pae: None,
            global_confidence: None,
            reduction: PoseReduction::BestOfN,
            poses_used: 1,
            poses_available: 1,
            best_seed: 0,
        }
    }

    fn fusion(alpha: f64, policy: MissingDataPolicy) -> FusionConfig {
        FusionConfig { alpha, missing_data: policy }
    }

    #[test]
    fn test_cds_only_ranking() {
        let cfg = fusion(1.0, MissingDataPolicy::WorstRank);
        let out = RankMerger::new(&cfg)
            .merge(&[dev("c", 0.0), dev("a", 1.0), dev("b", 0.5)], &[])
            .unwrap();
        assert_eq!(ranked_ids(&out.ranked), vec!["a", "b", "c"]);
        let cds_ranks: Vec<usize> = out.ranked.iter().map(|c| c.cds_rank).collect();
        assert_eq!(cds_ranks, vec![1, 2, 3]);
        assert!(out.pending.is_empty());
    }

    #[test]
    fn test_exclude_reports_pending() {
        let cfg = fusion(0.5, MissingDataPolicy::Exclude);
        let out = RankMerger::new(&cfg)
            .merge(
                &[dev("a", 0.9), dev("b", 0.5), dev("c", 0.1)],
                &[dock("a", 0.7), dock("c", 0.8)],
            )
            .unwrap();
        assert_eq!(out.ranked.len(), 2);
        assert!(is_contiguous(&out.ranked));
        assert_eq!(out.pending.len(), 1);
        assert_eq!(out.pending[0].variant_id.as_str(), "b");
        assert_eq!(out.pending[0].stage, PipelineStage::Docking);
    }

    #[test]
    fn test_worst_rank_sinks_missing_docking() {
        let cfg = fusion(0.0, MissingDataPolicy::WorstRank);
        let out = RankMerger::new(&cfg)
            .merge(&[dev("a", 0.9), dev("b", 0.5), dev("c", 0.1)], &[dock("b", 0.2), dock("c", 0.3)])
            .unwrap();
        assert_eq!(ranked_ids(&out.ranked), vec!["c", "b", "a"]);
        let a = &out.ranked[2];
        assert_eq!(a.docking_rank, 3.0);
        assert_eq!(a.docking_source, DockingSource::WorstRank);
        assert_eq!(a.docking_confidence, None);
        assert_eq!(a.final_score, 0.0);
    }

    #[test]
    fn test_impute_median_rank() {
        let cfg = fusion(0.0, MissingDataPolicy::ImputeMedian);
        let out = RankMerger::new(&cfg)
            .merge(
                &[dev("a", 0.9), dev("b", 0.5), dev("c", 0.1), dev("d", 0.3)],
                &[dock("b", 0.9), dock("c", 0.5), dock("d", 0.1)],
            )
            .unwrap();
        let a = out.ranked.iter().find(|c| c.variant_id.as_str() == "a").unwrap();
        assert_eq!(a.docking_rank, 2.0);
        assert_eq!(a.docking_source, DockingSource::ImputedMedian);
        assert!((a.final_score - 0.5).abs() < 1e-12);
        assert!(is_contiguous(&out.ranked));
    }

    #[test]
    fn test_impute_median_with_nothing_measured() {
        let cfg = fusion(0.5, MissingDataPolicy::ImputeMedian);
        let out = RankMerger::new(&cfg).merge(&[dev("a", 0.9), dev("b", 0.1)], &[]).unwrap();
        assert_eq!(ranked_ids(&out.ranked), vec!["a", "b"]);
        assert!((out.ranked[0].final_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_exact_tie_broken_by_id() {
        let cfg = fusion(0.5, MissingDataPolicy::WorstRank);
        // b wins CDS, a wins docking: both fuse to 0.5.
        let out = RankMerger::new(&cfg)
            .merge(&[dev("b", 0.9), dev("a", 0.1)], &[dock("a", 0.9), dock("b", 0.1)])
            .unwrap();
        assert_eq!(out.ranked[0].final_score, out.ranked[1].final_score);
        assert_eq!(ranked_ids(&out.ranked), vec!["a", "b"]);
        assert_eq!(out.ranked[0].tie_break_key, "a");
    }

    #[test]
    fn test_nothing_rankable() {
        let cfg = fusion(0.5, MissingDataPolicy::Exclude);
        let err = RankMerger::new(&cfg).merge(&[dev("a", 0.5)], &[]).unwrap_err();
        match err {
            AbrankError::Ranking { excluded, .. } => assert_eq!(excluded.len(), 1),
            other => panic!("expected ranking error, got {other:?}"),
        }
        assert!(RankMerger::new(&cfg).merge(&[], &[]).is_err());
    }

    #[test]
    fn test_bad_alpha_rejected() {
        let cfg = fusion(1.5, MissingDataPolicy::WorstRank);
        assert!(matches!(
            RankMerger::new(&cfg).merge(&[dev("a", 0.5)], &[]),
            Err(AbrankError::Scoring(_))
        ));
    }

    #[test]
    fn test_ranks_form_permutation_under_every_policy() {
        let mut rng = StdRng::seed_from_u64(7);
        for policy in [
            MissingDataPolicy::Exclude,
            MissingDataPolicy::WorstRank,
            MissingDataPolicy::ImputeMedian,
        ] {
            for _ in 0..100 {
                let n = rng.gen_range(1..20);
                let mut devs: Vec<DevelopabilityRecord> = (0..n)
                    .map(|i| dev(&format!("v{i:03}"), (rng.gen_range(0..5) as f64) / 4.0))
                    .collect();
                let mut docks: Vec<DockingRecord> = devs
                    .iter()
                    .filter_map(|d| {
                        rng.gen_bool(0.7)
                            .then(|| dock(d.variant_id.as_str(), (rng.gen_range(0..5) as f64) / 4.0))
                    })
                    .collect();
                let cfg = fusion(rng.gen_range(0.0..=1.0), policy);
                let merger = RankMerger::new(&cfg);

                let first = match merger.merge(&devs, &docks) {
                    Ok(out) => out,
                    Err(AbrankError::Ranking { .. }) => {
                        assert_eq!(policy, MissingDataPolicy::Exclude);
                        assert!(docks.is_empty());
                        continue;
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                };
                assert!(is_contiguous(&first.ranked));
                assert_eq!(first.ranked.len() + first.pending.len(), n);

                // Input order never matters.
                devs.shuffle(&mut rng);
                docks.shuffle(&mut rng);
                let second = merger.merge(&devs, &docks).unwrap();
                assert_eq!(first, second);
            }
        }
    }
}
