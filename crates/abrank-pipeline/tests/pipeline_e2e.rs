//! End-to-end pipeline runs over small in-memory cohorts.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use abrank_common::{
    AbrankError, CdrLoop, CdrRegion, MissingDataPolicy, PipelineConfig, PipelineStage, Variant,
    VariantId, VariantSpec,
};
use abrank_developability::{PeptidePrediction, RawStructurePrediction};
use abrank_pipeline::report::write_shortlist_fasta;
use abrank_pipeline::{
    AbrankPipeline, Collaborators, InMemoryPeptides, InMemoryPoses, InMemoryStructures,
    PipelineReport, StructurePredictor,
};
use abrank_ranker::DockingPose;

const LEAD: &str = "GSGSGSGSGS";
const H3: &str = "GYSYG";
const TAIL: &str = "GSGSGS";

/// Framework + clean H3 + framework, with `insert` placed after the H3.
fn build_variant(id: &str, insert: &str) -> Variant {
    let sequence = format!("{LEAD}{H3}GSGSG{insert}{TAIL}");
    let start = LEAD.len();
    Variant::new(VariantSpec {
        id: VariantId::new(id),
        sequence,
        cdrs: vec![CdrRegion::new(CdrLoop::H3, start, start + H3.len())],
        parent: None,
        generation: 1,
    })
    .unwrap()
}

fn structure_for(v: &Variant, confidence: f64) -> RawStructurePrediction {
    RawStructurePrediction {
        variant_id: v.id().clone(),
        seed: 0,
        per_residue_confidence: vec![confidence; v.len()],
        chains: vec![],
        residue_map: None,
        pair_confidence: None,
        ptm: Some(0.85),
        iptm: None,
    }
}

/// One weak binder: immunogenicity raw score 0.
fn peptide_for(v: &Variant) -> PeptidePrediction {
    PeptidePrediction {
        variant_id: v.id().clone(),
        start: 0,
        peptide: v.sequence()[..9].to_string(),
        percentile_rank: 50.0,
        allele: None,
    }
}

fn pose_for(v: &Variant, seed: u32, confidence: f64) -> DockingPose {
    DockingPose {
        variant_id: v.id().clone(),
        seed,
        interface_confidence: confidence,
        global_confidence: None,
        interface_pae: None,
    }
}

/// Fixture: every variant gets a structure and peptides; `docked` lists the
/// interface confidence per variant, `None` meaning no poses at all.
struct Fixture {
    variants: Vec<Variant>,
    structures: InMemoryStructures,
    peptides: InMemoryPeptides,
    poses: InMemoryPoses,
}

impl Fixture {
    fn new(variants: Vec<Variant>, docked: &[Option<f64>]) -> Self {
        let mut structures = InMemoryStructures::new();
        let mut peptides = InMemoryPeptides::new();
        let mut poses = InMemoryPoses::new();
        for (v, dock) in variants.iter().zip(docked) {
            structures.insert(structure_for(v, 85.0));
            peptides.insert(peptide_for(v));
            if let Some(conf) = dock {
                poses.insert(pose_for(v, 0, *conf));
                poses.insert(pose_for(v, 1, conf / 2.0));
            }
        }
        Self { variants, structures, peptides, poses }
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators::new(self.structures.clone(), self.peptides.clone(), self.poses.clone())
    }

    async fn run(&self, config: PipelineConfig) -> Result<PipelineReport, AbrankError> {
        AbrankPipeline::new(config, self.collaborators())?
            .run(self.variants.clone())
            .await
    }
}

fn config(alpha: f64, policy: MissingDataPolicy) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.fusion.alpha = alpha;
    config.fusion.missing_data = policy;
    config
}

fn ranked_ids(report: &PipelineReport) -> Vec<&str> {
    report.ranked.iter().map(|c| c.variant_id.as_str()).collect()
}

fn final_ranks(report: &PipelineReport) -> Vec<usize> {
    report.ranked.iter().map(|c| c.final_rank).collect()
}

#[tokio::test]
async fn test_solubility_gradient_orders_cds() {
    // Raw solubility risk 0, 0.6 and 1.2: normalised 0, 0.5 and 1.
    let fixture = Fixture::new(
        vec![
            build_variant("var_0001", ""),
            build_variant("var_0002", "K"),
            build_variant("var_0003", "KK"),
        ],
        &[None, None, None],
    );
    let report = fixture.run(config(1.0, MissingDataPolicy::WorstRank)).await.unwrap();

    assert_eq!(ranked_ids(&report), vec!["var_0001", "var_0002", "var_0003"]);
    let cds: Vec<f64> = report.ranked.iter().map(|c| c.cds).collect();
    assert!((cds[0] - 1.0).abs() < 1e-9);
    assert!((cds[1] - 0.5).abs() < 1e-9);
    assert!(cds[2].abs() < 1e-9);
    let cds_ranks: Vec<usize> = report.ranked.iter().map(|c| c.cds_rank).collect();
    assert_eq!(cds_ranks, vec![1, 2, 3]);
    assert!(report.pending.is_empty());
}

#[tokio::test]
async fn test_exclude_policy_reports_pending() {
    let fixture = Fixture::new(
        vec![
            build_variant("var_0001", ""),
            build_variant("var_0002", "K"),
            build_variant("var_0003", "KK"),
            build_variant("var_0004", "D"),
        ],
        &[Some(0.6), None, Some(0.9), Some(0.3)],
    );
    let report = fixture.run(config(0.5, MissingDataPolicy::Exclude)).await.unwrap();

    assert_eq!(report.ranked.len(), 3);
    assert_eq!(final_ranks(&report), vec![1, 2, 3]);
    assert!(!ranked_ids(&report).contains(&"var_0002"));
    assert_eq!(report.pending.len(), 1);
    assert_eq!(report.pending[0].variant_id.as_str(), "var_0002");
    assert_eq!(report.pending[0].stage, PipelineStage::Docking);
}

#[tokio::test]
async fn test_missing_docking_never_counts_as_zero() {
    let fixture = Fixture::new(
        vec![build_variant("var_0001", ""), build_variant("var_0002", "")],
        &[Some(0.7), None],
    );
    let report = fixture.run(config(0.5, MissingDataPolicy::ImputeMedian)).await.unwrap();
    let missing = report
        .ranked
        .iter()
        .find(|c| c.variant_id.as_str() == "var_0002")
        .unwrap();
    assert_eq!(missing.docking_confidence, None);
    let record = report
        .variants
        .iter()
        .find(|r| r.variant_id.as_str() == "var_0002")
        .unwrap();
    assert!(record.docking.is_none());
}

#[tokio::test]
async fn test_every_policy_yields_contiguous_ranks() {
    let variants: Vec<Variant> = ["", "K", "KK", "D", "E", "KD"]
        .iter()
        .enumerate()
        .map(|(i, ins)| build_variant(&format!("var_{i:04}"), ins))
        .collect();
    let docked = [Some(0.5), None, Some(0.2), None, Some(0.9), Some(0.4)];
    let fixture = Fixture::new(variants, &docked);

    for policy in [
        MissingDataPolicy::Exclude,
        MissingDataPolicy::WorstRank,
        MissingDataPolicy::ImputeMedian,
    ] {
        let report = fixture.run(config(0.5, policy)).await.unwrap();
        let n = report.ranked.len();
        assert_eq!(final_ranks(&report), (1..=n).collect::<Vec<_>>());
        assert_eq!(n + report.pending.len(), 6);
        if policy == MissingDataPolicy::Exclude {
            assert_eq!(n, 4);
        } else {
            assert_eq!(n, 6);
        }
    }
}

#[tokio::test]
async fn test_rerun_is_identical() {
    let fixture = Fixture::new(
        vec![
            build_variant("var_0003", "KK"),
            build_variant("var_0001", ""),
            build_variant("var_0002", "E"),
        ],
        &[Some(0.4), Some(0.8), None],
    );
    let first = fixture.run(config(0.3, MissingDataPolicy::WorstRank)).await.unwrap();
    let second = fixture.run(config(0.3, MissingDataPolicy::WorstRank)).await.unwrap();

    assert_eq!(first.ranked, second.ranked);
    assert_eq!(first.pending, second.pending);
    assert_eq!(first.issues, second.issues);
    assert_eq!(
        serde_json::to_string(&first.ranked).unwrap(),
        serde_json::to_string(&second.ranked).unwrap()
    );
}

#[tokio::test]
async fn test_exact_tie_ordered_by_id() {
    // var_b wins on CDS, var_a on docking: the fused scores tie exactly.
    let fixture = Fixture::new(
        vec![build_variant("var_b", ""), build_variant("var_a", "K")],
        &[Some(0.5), Some(0.9)],
    );
    for _ in 0..3 {
        let report = fixture.run(config(0.5, MissingDataPolicy::Exclude)).await.unwrap();
        assert_eq!(report.ranked[0].final_score, report.ranked[1].final_score);
        assert_eq!(ranked_ids(&report), vec!["var_a", "var_b"]);
    }
}

#[tokio::test]
async fn test_centre_glycosylation_penalised_more_than_edge() {
    let centre = Variant::new(VariantSpec {
        id: VariantId::new("var_centre"),
        sequence: "GSGSAAANGSAAAGSGS".into(),
        cdrs: vec![CdrRegion::new(CdrLoop::H3, 4, 13)],
        parent: None,
        generation: 1,
    })
    .unwrap();
    let edge = Variant::new(VariantSpec {
        id: VariantId::new("var_edge"),
        sequence: "GSGSNGSAAAAAAGSGS".into(),
        cdrs: vec![CdrRegion::new(CdrLoop::H3, 4, 13)],
        parent: None,
        generation: 1,
    })
    .unwrap();
    let fixture = Fixture::new(vec![centre, edge], &[Some(0.5), Some(0.5)]);
    let report = fixture.run(config(1.0, MissingDataPolicy::WorstRank)).await.unwrap();

    let liability = |id: &str| {
        report
            .variants
            .iter()
            .find(|r| r.variant_id.as_str() == id)
            .map(|r| r.liability.raw_penalty)
            .unwrap()
    };
    assert!(liability("var_centre") > liability("var_edge"));
    assert_eq!(ranked_ids(&report), vec!["var_edge", "var_centre"]);
}

#[tokio::test]
async fn test_missing_peptides_leave_variant_pending() {
    let v1 = build_variant("var_0001", "");
    let v2 = build_variant("var_0002", "K");
    let collaborators = Collaborators::new(
        InMemoryStructures::new()
            .with(structure_for(&v1, 80.0))
            .with(structure_for(&v2, 80.0)),
        InMemoryPeptides::new().with(peptide_for(&v1)),
        InMemoryPoses::new().with(pose_for(&v1, 0, 0.5)).with(pose_for(&v2, 0, 0.5)),
    );
    let report = AbrankPipeline::new(PipelineConfig::default(), collaborators)
        .unwrap()
        .run(vec![v1, v2])
        .await
        .unwrap();

    assert_eq!(ranked_ids(&report), vec!["var_0001"]);
    assert_eq!(report.pending.len(), 1);
    assert_eq!(report.pending[0].stage, PipelineStage::Immunogenicity);
    assert!(report
        .issues
        .iter()
        .any(|i| i.variant_id.as_str() == "var_0002" && i.stage == PipelineStage::Immunogenicity));
}

/// Structure predictor that stalls for selected variants.
struct StallingStructures {
    inner: InMemoryStructures,
    stall: BTreeSet<VariantId>,
}

#[async_trait]
impl StructurePredictor for StallingStructures {
    async fn predict(&self, variant: &Variant) -> anyhow::Result<Option<RawStructurePrediction>> {
        if self.stall.contains(variant.id()) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.inner.predict(variant).await
    }
}

#[tokio::test]
async fn test_collaborator_timeout_marks_missing_and_run_completes() {
    let fixture = Fixture::new(
        vec![build_variant("var_0001", ""), build_variant("var_0002", "K")],
        &[Some(0.5), Some(0.6)],
    );
    let stalling = StallingStructures {
        inner: fixture.structures.clone(),
        stall: [VariantId::new("var_0002")].into_iter().collect(),
    };
    let collaborators = Collaborators::new(stalling, fixture.peptides.clone(), fixture.poses.clone());

    let mut config = PipelineConfig::default();
    config.execution.collaborator_timeout_ms = 50;
    let report = AbrankPipeline::new(config, collaborators)
        .unwrap()
        .run(fixture.variants.clone())
        .await
        .unwrap();

    // Structure is not required for ranking: both variants still rank.
    assert_eq!(report.ranked.len(), 2);
    let issue = report
        .issues
        .iter()
        .find(|i| i.stage == PipelineStage::Structure)
        .unwrap();
    assert_eq!(issue.variant_id.as_str(), "var_0002");
    assert!(issue.message.contains("timed out"));
    let record = report
        .variants
        .iter()
        .find(|r| r.variant_id.as_str() == "var_0002")
        .unwrap();
    assert!(record.structure.is_none());
}

#[tokio::test]
async fn test_confidence_gate_excludes_before_normalisation() {
    let low = build_variant("var_low", "KK");
    let ok = build_variant("var_ok", "");
    let other = build_variant("var_other", "K");
    let collaborators = Collaborators::new(
        InMemoryStructures::new()
            .with(structure_for(&low, 40.0))
            .with(structure_for(&ok, 90.0))
            .with(structure_for(&other, 90.0)),
        InMemoryPeptides::new()
            .with(peptide_for(&low))
            .with(peptide_for(&ok))
            .with(peptide_for(&other)),
        InMemoryPoses::new(),
    );
    let mut config = config(1.0, MissingDataPolicy::WorstRank);
    config.filters.min_global_confidence = Some(70.0);

    let report = AbrankPipeline::new(config, collaborators)
        .unwrap()
        .run(vec![low, ok, other])
        .await
        .unwrap();

    assert_eq!(ranked_ids(&report), vec!["var_ok", "var_other"]);
    assert_eq!(report.pending[0].stage, PipelineStage::Gate);
    // The gated variant no longer stretches the solubility bounds.
    assert!((report.ranked[0].cds - 1.0).abs() < 1e-9);
    assert!(report.ranked[1].cds.abs() < 1e-9);
}

#[tokio::test]
async fn test_nothing_rankable_is_ranking_error() {
    let fixture = Fixture::new(
        vec![build_variant("var_0001", ""), build_variant("var_0002", "K")],
        &[None, None],
    );
    let err = fixture.run(config(0.5, MissingDataPolicy::Exclude)).await.unwrap_err();
    match err {
        AbrankError::Ranking { excluded, .. } => {
            let ids: Vec<&str> = excluded.iter().map(|e| e.variant_id.as_str()).collect();
            assert_eq!(ids, vec!["var_0001", "var_0002"]);
        }
        other => panic!("expected ranking error, got {other}"),
    }
}

#[tokio::test]
async fn test_invalid_configuration_aborts() {
    let fixture = Fixture::new(vec![build_variant("var_0001", "")], &[Some(0.5)]);
    let mut bad = PipelineConfig::default();
    bad.fusion.alpha = 1.5;
    let err = fixture.run(bad).await.unwrap_err();
    assert!(matches!(err, AbrankError::Scoring(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_duplicate_ids_rejected() {
    let fixture = Fixture::new(
        vec![build_variant("var_0001", ""), build_variant("var_0001", "K")],
        &[Some(0.5), Some(0.5)],
    );
    assert!(matches!(
        fixture.run(PipelineConfig::default()).await,
        Err(AbrankError::InvalidCohort(_))
    ));
}

#[tokio::test]
async fn test_progress_events_cover_every_stage() {
    let fixture = Fixture::new(
        vec![build_variant("var_0001", ""), build_variant("var_0002", "K")],
        &[Some(0.5), Some(0.6)],
    );
    let (tx, mut rx) = broadcast::channel(16);
    let report = AbrankPipeline::new(PipelineConfig::default(), fixture.collaborators())
        .unwrap()
        .with_progress(tx)
        .run(fixture.variants.clone())
        .await
        .unwrap();

    let mut stages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.run_id, report.run_id);
        stages.push(event.stage);
    }
    assert_eq!(stages, vec!["extract", "aggregate", "rank", "complete"]);
}

#[tokio::test]
async fn test_shortlist_keeps_near_duplicates_to_two_per_bucket() {
    let start = LEAD.len();
    let wide = Variant::new(VariantSpec {
        id: VariantId::new("var_wide"),
        sequence: format!("{LEAD}{H3}GSGSGKKKKK{TAIL}"),
        cdrs: vec![CdrRegion::new(CdrLoop::H3, start, start + H3.len())],
        parent: Some(VariantId::new("var_dup_0")),
        generation: 2,
    })
    .unwrap();
    let mut variants: Vec<Variant> =
        (0..5).map(|i| build_variant(&format!("var_dup_{i}"), "")).collect();
    variants.push(wide.clone());
    let fixture = Fixture::new(variants, &[Some(0.5); 6]);

    let report = fixture.run(PipelineConfig::default()).await.unwrap();
    assert_eq!(report.ranked.len(), 6);

    let mut per_bucket: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &report.shortlist {
        *per_bucket.entry(entry.bucket.as_str()).or_default() += 1;
    }
    assert!(per_bucket.values().all(|&n| n <= 2));
    let shortlisted: Vec<&str> =
        report.shortlist.iter().map(|e| e.variant_id.as_str()).collect();
    assert_eq!(shortlisted, vec!["var_dup_0", "var_dup_1", "var_wide"]);

    let mut buf = Vec::new();
    write_shortlist_fasta(&report.shortlist, &report.variants, &mut buf).unwrap();
    let fasta = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = fasta.lines().collect();
    assert_eq!(lines.iter().filter(|l| l.starts_with('>')).count(), 3);
    assert!(lines[0].starts_with(">var_dup_0 rank=1 "));
    assert!(lines[0].ends_with("parent=- generation=1"));
    let wide_header = lines.iter().position(|l| l.starts_with(">var_wide")).unwrap();
    assert!(lines[wide_header].ends_with("parent=var_dup_0 generation=2"));
    assert_eq!(lines[wide_header + 1], wide.sequence());
}
