//! End-to-end candidate scoring pipeline.
//!
//! Orchestrates one ranking run over a cohort:
//!   1. Validate configuration (fatal on failure, before any work starts)
//!   2. Fan out one task per variant on a bounded worker pool:
//!      structure metrics, solubility, liabilities, immunogenicity, docking
//!   3. Barrier: wait until every task has settled, in variant-id order
//!   4. Apply hard gates, then normalise and aggregate the CDS over the cohort
//!   5. Fuse CDS and docking ranks into the final ordering
//!   6. Pick a diversity-aware shortlist from the head of the ranking
//!   7. Emit progress events via broadcast channel
//!
//! Per-variant failures are logged and recorded as issues; they never abort
//! the run. Only configuration errors and an empty final ranking are fatal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use abrank_common::{
    AbrankError, Cohort, ExcludedVariant, PipelineConfig, PipelineStage, Result, Variant,
    VariantId,
};
use abrank_developability::{
    aggregate, extract_metrics, score_immunogenicity, ImmunogenicityScore, LiabilityReport,
    LiabilityScorer, RawDevelopability, SolubilityScore, SolubilityScorer, StructuralMetrics,
};
use abrank_ranker::{
    select_diverse, DiversityFeatures, DockingRecord, DockingScorer, RankMerger, RankedCandidate,
    ShortlistEntry,
};

use crate::gates::gate_failure;
use crate::sources::Collaborators;

// ── Progress events ───────────────────────────────────────────────────────────

/// Progress event emitted during a pipeline run (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct PipelineProgress {
    pub run_id: Uuid,
    pub stage: String,
    pub message: String,
    pub variants_total: usize,
    pub variants_scored: usize,
    pub variants_ranked: usize,
}

impl PipelineProgress {
    fn new(run_id: Uuid, stage: &str, message: &str) -> Self {
        Self {
            run_id,
            stage: stage.to_string(),
            message: message.to_string(),
            variants_total: 0,
            variants_scored: 0,
            variants_ranked: 0,
        }
    }
}

// ── Result summary ────────────────────────────────────────────────────────────

/// A non-fatal per-variant failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantIssue {
    pub variant_id: VariantId,
    pub stage: PipelineStage,
    pub message: String,
}

/// Every per-variant record produced by the extraction stage.
#[derive(Debug, Clone, Serialize)]
pub struct VariantRecords {
    pub variant_id: VariantId,
    pub sequence: String,
    pub parent: Option<VariantId>,
    pub generation: u32,
    pub structure: Option<StructuralMetrics>,
    pub solubility: SolubilityScore,
    pub liability: LiabilityReport,
    pub immunogenicity: Option<ImmunogenicityScore>,
    pub docking: Option<DockingRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub cohort_size: usize,
    /// Final ordering, rank 1 first.
    pub ranked: Vec<RankedCandidate>,
    /// Diversity-aware selection from the head of `ranked`.
    pub shortlist: Vec<ShortlistEntry>,
    /// Variants left out of the ranking, ordered by id.
    pub pending: Vec<ExcludedVariant>,
    pub issues: Vec<VariantIssue>,
    pub variants: Vec<VariantRecords>,
}

// ── Per-variant extraction ────────────────────────────────────────────────────

struct VariantOutcome {
    records: VariantRecords,
    issues: Vec<VariantIssue>,
}

/// Await a collaborator call under `timeout`. Timeouts and collaborator
/// failures both become `MissingData`.
async fn call_collaborator<T, F>(
    variant_id: &VariantId,
    what: &str,
    timeout: Duration,
    call: F,
) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Err(_) => Err(AbrankError::missing(
            variant_id,
            format!("{what} timed out after {} ms", timeout.as_millis()),
        )),
        Ok(Err(e)) => Err(AbrankError::missing(variant_id, format!("{what} failed: {e:#}"))),
        Ok(Ok(value)) => Ok(value),
    }
}

async fn score_variant(
    variant: Variant,
    config: Arc<PipelineConfig>,
    collaborators: Collaborators,
) -> VariantOutcome {
    let id = variant.id().clone();
    let timeout = config.execution.collaborator_timeout();
    let mut issues = Vec::new();
    let mut note = |stage: PipelineStage, err: AbrankError| {
        issues.push(VariantIssue {
            variant_id: id.clone(),
            stage,
            message: err.to_string(),
        });
    };

    let structure = match call_collaborator(
        &id,
        "structure prediction",
        timeout,
        collaborators.structures.predict(&variant),
    )
    .await
    .and_then(|raw| extract_metrics(&variant, raw.as_ref()))
    {
        Ok(m) => Some(m),
        Err(e) => {
            note(PipelineStage::Structure, e);
            None
        }
    };

    let solubility = SolubilityScorer::new(&config.solubility).score(&variant);
    let liability = LiabilityScorer::new(&config.liability).scan(&variant);

    let immunogenicity = match call_collaborator(
        &id,
        "peptide-binding prediction",
        timeout,
        collaborators.peptides.predict(&variant),
    )
    .await
    .and_then(|preds| score_immunogenicity(&variant, preds.as_deref(), &config.immunogenicity))
    {
        Ok(s) => Some(s),
        Err(e) => {
            note(PipelineStage::Immunogenicity, e);
            None
        }
    };

    let docking = match call_collaborator(
        &id,
        "docking pose retrieval",
        timeout,
        collaborators.docking.poses(&variant),
    )
    .await
    .and_then(|poses| DockingScorer::new(&config.docking).reduce(&id, &poses))
    {
        Ok(Some(record)) => Some(record),
        Ok(None) => {
            note(PipelineStage::Docking, AbrankError::missing(&id, "no docking poses"));
            None
        }
        Err(e) => {
            note(PipelineStage::Docking, e);
            None
        }
    };

    debug!(
        variant_id = %id,
        solubility = solubility.raw_risk,
        liability = liability.raw_penalty,
        immunogenicity = ?immunogenicity.as_ref().map(|s| s.raw_score),
        docking = ?docking.as_ref().map(|d| d.confidence),
        "Variant scored"
    );

    VariantOutcome {
        records: VariantRecords {
            variant_id: id,
            sequence: variant.sequence().to_string(),
            parent: variant.parent().cloned(),
            generation: variant.generation(),
            structure,
            solubility,
            liability,
            immunogenicity,
            docking,
        },
        issues,
    }
}

// ── Pipeline orchestrator ─────────────────────────────────────────────────────

pub struct AbrankPipeline {
    config: Arc<PipelineConfig>,
    collaborators: Collaborators,
    progress_tx: Option<broadcast::Sender<PipelineProgress>>,
}

impl AbrankPipeline {
    /// Build a pipeline. Invalid configuration is rejected here, before any
    /// variant is touched.
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            collaborators,
            progress_tx: None,
        })
    }

    pub fn with_progress(mut self, tx: broadcast::Sender<PipelineProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn emit(&self, progress: PipelineProgress) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(progress);
        }
    }

    /// Score and rank `variants`.
    ///
    /// Fails on duplicate ids, invalid weights, or when nothing is left to
    /// rank. The `Ranking` error lists every excluded variant.
    #[instrument(skip_all, fields(variants = variants.len()))]
    pub async fn run(&self, variants: Vec<Variant>) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let t0 = std::time::Instant::now();

        let cohort = Cohort::new(variants)?;
        let total = cohort.len();
        info!(run_id = %run_id, variants = total, "Starting ranking pipeline");

        let prog_base = {
            let mut p = PipelineProgress::new(run_id, "extract", "");
            p.variants_total = total;
            p
        };
        self.emit({
            let mut p = prog_base.clone();
            p.message = format!("Scoring {total} variants");
            p
        });

        // ── 1. Fan out per-variant extraction ─────────────────────────────────
        let workers = Arc::new(Semaphore::new(self.config.execution.parallel_workers));
        let mut handles = Vec::with_capacity(total);
        for variant in cohort.iter() {
            let workers = workers.clone();
            let config = self.config.clone();
            let collaborators = self.collaborators.clone();
            let variant = variant.clone();
            let id = variant.id().clone();
            let handle = tokio::spawn(async move {
                // The pool is never closed, so acquisition only waits.
                let _permit = workers.acquire_owned().await.ok();
                score_variant(variant, config, collaborators).await
            });
            handles.push((id, handle));
        }

        // ── 2. Barrier: every task settles before cohort-level work ───────────
        let mut records = Vec::with_capacity(total);
        let mut issues = Vec::new();
        let mut pending = Vec::new();
        for (id, handle) in handles {
            match handle.await {
                Ok(outcome) => {
                    issues.extend(outcome.issues);
                    records.push(outcome.records);
                }
                Err(e) => {
                    let message = format!("scoring task failed: {e}");
                    warn!(variant_id = %id, error = %e, "Variant task did not complete");
                    issues.push(VariantIssue {
                        variant_id: id.clone(),
                        stage: PipelineStage::Structure,
                        message: message.clone(),
                    });
                    pending.push(ExcludedVariant::new(id, PipelineStage::Structure, message));
                }
            }
        }

        for issue in &issues {
            warn!(
                variant_id = %issue.variant_id,
                stage = %issue.stage,
                "{}",
                issue.message
            );
        }

        // ── 3. Gates and developability aggregation ───────────────────────────
        self.emit({
            let mut p = prog_base.clone();
            p.stage = "aggregate".to_string();
            p.message = format!("{} variants scored, aggregating", records.len());
            p.variants_scored = records.len();
            p
        });

        let mut raws = Vec::new();
        for rec in &records {
            if let Some(reason) = gate_failure(
                &self.config.filters,
                rec.structure.as_ref(),
                &rec.liability,
                rec.docking.as_ref(),
            ) {
                info!(variant_id = %rec.variant_id, reason = %reason, "Variant gated");
                pending.push(ExcludedVariant::new(
                    rec.variant_id.clone(),
                    PipelineStage::Gate,
                    reason,
                ));
                continue;
            }
            let Some(immuno) = rec.immunogenicity.as_ref() else {
                let reason = issues
                    .iter()
                    .find(|i| {
                        i.variant_id == rec.variant_id && i.stage == PipelineStage::Immunogenicity
                    })
                    .map(|i| i.message.clone())
                    .unwrap_or_else(|| "no immunogenicity score".to_string());
                pending.push(ExcludedVariant::new(
                    rec.variant_id.clone(),
                    PipelineStage::Immunogenicity,
                    reason,
                ));
                continue;
            };
            raws.push(RawDevelopability {
                variant_id: rec.variant_id.clone(),
                solubility_risk: rec.solubility.raw_risk,
                liability_penalty: rec.liability.raw_penalty,
                immunogenicity: immuno.raw_score,
            });
        }

        let developability = aggregate(&raws, &self.config.developability)?;

        // ── 4. Rank fusion ────────────────────────────────────────────────────
        self.emit({
            let mut p = prog_base.clone();
            p.stage = "rank".to_string();
            p.message = format!("Ranking {} candidates", developability.len());
            p.variants_scored = records.len();
            p
        });

        let docking: Vec<DockingRecord> =
            records.iter().filter_map(|r| r.docking.clone()).collect();
        let outcome = match RankMerger::new(&self.config.fusion).merge(&developability, &docking) {
            Ok(outcome) => outcome,
            Err(AbrankError::Ranking { message, excluded }) => {
                pending.extend(excluded);
                pending.sort_by(|a, b| a.variant_id.cmp(&b.variant_id));
                warn!(run_id = %run_id, excluded = pending.len(), "No rankable variants");
                return Err(AbrankError::Ranking { message, excluded: pending });
            }
            Err(e) => return Err(e),
        };
        pending.extend(outcome.pending);
        pending.sort_by(|a, b| a.variant_id.cmp(&b.variant_id));

        // ── 5. Diversity shortlist ────────────────────────────────────────────
        let features: Vec<DiversityFeatures> = records
            .iter()
            .map(|r| DiversityFeatures {
                variant_id: r.variant_id.clone(),
                solubility_risk: r.solubility.raw_risk,
                liability_penalty: r.liability.raw_penalty,
                cdr_confidence: r.structure.as_ref().and_then(|m| m.cdr_mean_confidence),
            })
            .collect();
        let shortlist = select_diverse(&outcome.ranked, &features, &self.config.shortlist);

        let report = PipelineReport {
            run_id,
            started_at,
            duration_ms: t0.elapsed().as_millis() as u64,
            cohort_size: total,
            ranked: outcome.ranked,
            shortlist,
            pending,
            issues,
            variants: records,
        };

        info!(
            run_id      = %run_id,
            variants    = total,
            ranked      = report.ranked.len(),
            shortlisted = report.shortlist.len(),
            pending     = report.pending.len(),
            issues      = report.issues.len(),
            duration_ms = report.duration_ms,
            "Ranking pipeline complete"
        );

        self.emit({
            let mut p = prog_base.clone();
            p.stage = "complete".to_string();
            p.message = format!(
                "Done. {} ranked, {} pending, {} issues.",
                report.ranked.len(),
                report.pending.len(),
                report.issues.len()
            );
            p.variants_scored = report.variants.len();
            p.variants_ranked = report.ranked.len();
            p
        });

        Ok(report)
    }
}
