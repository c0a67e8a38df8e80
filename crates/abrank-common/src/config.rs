//! Pipeline configuration.
//!
//! One `PipelineConfig` is built (from TOML/YAML/JSON or defaults), validated
//! once with [`PipelineConfig::validate`] before any extraction starts, and then
//! passed by reference into every stage.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entities::CdrLoop;
use crate::error::{AbrankError, Result};
use crate::weights::DevelopabilityWeights;

/// Complete scoring and ranking configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// CDS weights
    #[serde(default)]
    pub developability: DevelopabilityWeights,

    /// Rank fusion
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Docking pose reduction
    #[serde(default)]
    pub docking: DockingConfig,

    #[serde(default)]
    pub solubility: SolubilityConfig,

    #[serde(default)]
    pub liability: LiabilityConfig,

    #[serde(default)]
    pub immunogenicity: ImmunogenicityConfig,

    /// Optional hard gates applied before cohort normalisation
    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Diversity-aware shortlist of top candidates
    #[serde(default)]
    pub shortlist: ShortlistConfig,
}

// ── Fusion ────────────────────────────────────────────────────────────────────

/// How variants without a docking record are treated by the rank merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissingDataPolicy {
    /// Drop from the ranking and report as pending.
    Exclude,
    /// Rank below every measured variant.
    WorstRank,
    /// Assign the median docking rank of the measured variants.
    ImputeMedian,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Weight of the CDS rank; the docking rank gets `1 - alpha`.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    #[serde(default = "default_policy")]
    pub missing_data: MissingDataPolicy,
}

fn default_alpha() -> f64 { 0.5 }
fn default_policy() -> MissingDataPolicy { MissingDataPolicy::WorstRank }

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            missing_data: default_policy(),
        }
    }
}

// ── Docking ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseReduction {
    /// Keep the single pose with the highest interface confidence.
    BestOfN,
    /// Average the `top_k` highest-confidence poses.
    TopKAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingConfig {
    #[serde(default = "default_reduction")]
    pub reduction: PoseReduction,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Weight of the interface PAE penalty subtracted from the reduced
    /// interface confidence. 0 disables it.
    #[serde(default)]
    pub pae_penalty: f64,

    /// Interface PAE (Å) at which the penalty reaches its full weight
    #[serde(default = "default_pae_ceiling")]
    pub pae_ceiling: f64,
}

fn default_reduction() -> PoseReduction { PoseReduction::BestOfN }
fn default_top_k() -> usize { 1 }
fn default_pae_ceiling() -> f64 { 31.75 }

impl Default for DockingConfig {
    fn default() -> Self {
        Self {
            reduction: default_reduction(),
            top_k: default_top_k(),
            pae_penalty: 0.0,
            pae_ceiling: default_pae_ceiling(),
        }
    }
}

// ── Solubility ────────────────────────────────────────────────────────────────

/// Sequence solubility proxy parameters.
/// Hydrophobicity uses the Kyte-Doolittle (1982) scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolubilityConfig {
    /// Window width for the charge-patch scan
    #[serde(default = "default_charge_window")]
    pub charge_window: usize,

    /// Window width for the hydrophobic-patch scan
    #[serde(default = "default_hydrophobic_window")]
    pub hydrophobic_window: usize,

    /// Mean Kyte-Doolittle value above which a window is a hydrophobic patch
    #[serde(default = "default_hydrophobic_threshold")]
    pub hydrophobic_threshold: f64,

    /// Coefficient on |net charge|
    #[serde(default = "default_net_charge_coef")]
    pub net_charge_coef: f64,

    /// Coefficient on the charge-patch score
    #[serde(default = "default_charge_patch_coef")]
    pub charge_patch_coef: f64,

    /// Coefficient on the number of hydrophobic-patch windows
    #[serde(default = "default_hydrophobic_coef")]
    pub hydrophobic_coef: f64,
}

fn default_charge_window() -> usize { 5 }
fn default_hydrophobic_window() -> usize { 7 }
fn default_hydrophobic_threshold() -> f64 { 1.6 }
fn default_net_charge_coef() -> f64 { 0.1 }
fn default_charge_patch_coef() -> f64 { 0.5 }
fn default_hydrophobic_coef() -> f64 { 1.0 }

impl Default for SolubilityConfig {
    fn default() -> Self {
        Self {
            charge_window: default_charge_window(),
            hydrophobic_window: default_hydrophobic_window(),
            hydrophobic_threshold: default_hydrophobic_threshold(),
            net_charge_coef: default_net_charge_coef(),
            charge_patch_coef: default_charge_patch_coef(),
            hydrophobic_coef: default_hydrophobic_coef(),
        }
    }
}

// ── Liability ─────────────────────────────────────────────────────────────────

/// Peak paratope-proximity weight per CDR loop (reached at the loop centre).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopPeaks {
    #[serde(default = "default_peak_h1")]
    pub h1: f64,
    #[serde(default = "default_peak_h2")]
    pub h2: f64,
    #[serde(default = "default_peak_h3")]
    pub h3: f64,
    #[serde(default = "default_peak_l1")]
    pub l1: f64,
    #[serde(default = "default_peak_l2")]
    pub l2: f64,
    #[serde(default = "default_peak_l3")]
    pub l3: f64,
}

fn default_peak_h1() -> f64 { 0.7 }
fn default_peak_h2() -> f64 { 0.7 }
fn default_peak_h3() -> f64 { 1.0 }
fn default_peak_l1() -> f64 { 0.6 }
fn default_peak_l2() -> f64 { 0.6 }
fn default_peak_l3() -> f64 { 0.8 }

impl Default for LoopPeaks {
    fn default() -> Self {
        Self {
            h1: default_peak_h1(),
            h2: default_peak_h2(),
            h3: default_peak_h3(),
            l1: default_peak_l1(),
            l2: default_peak_l2(),
            l3: default_peak_l3(),
        }
    }
}

impl LoopPeaks {
    pub fn peak(&self, cdr: CdrLoop) -> f64 {
        match cdr {
            CdrLoop::H1 => self.h1,
            CdrLoop::H2 => self.h2,
            CdrLoop::H3 => self.h3,
            CdrLoop::L1 => self.l1,
            CdrLoop::L2 => self.l2,
            CdrLoop::L3 => self.l3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiabilityConfig {
    /// Base weight of an N-X-S/T glycosylation sequon
    #[serde(default = "default_nglyco_weight")]
    pub n_glycosylation_weight: f64,

    /// Base weight of an NG / NS deamidation hotspot
    #[serde(default = "default_deamidation_weight")]
    pub deamidation_weight: f64,

    /// Base weight of a DP / DG isomerization hotspot
    #[serde(default = "default_isomerization_weight")]
    pub isomerization_weight: f64,

    #[serde(default)]
    pub loop_peaks: LoopPeaks,

    /// Fraction of the loop peak left at the loop edges, in [0, 1)
    #[serde(default = "default_edge_floor")]
    pub edge_floor: f64,
}

fn default_nglyco_weight() -> f64 { 3.0 }
fn default_deamidation_weight() -> f64 { 1.0 }
fn default_isomerization_weight() -> f64 { 1.5 }
fn default_edge_floor() -> f64 { 0.25 }

impl Default for LiabilityConfig {
    fn default() -> Self {
        Self {
            n_glycosylation_weight: default_nglyco_weight(),
            deamidation_weight: default_deamidation_weight(),
            isomerization_weight: default_isomerization_weight(),
            loop_peaks: LoopPeaks::default(),
            edge_floor: default_edge_floor(),
        }
    }
}

// ── Immunogenicity ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmunogenicityConfig {
    /// Percentile rank strictly below which a peptide counts as a strong binder
    #[serde(default = "default_strong_binder_percentile")]
    pub strong_binder_percentile: f64,

    /// Weight of a strong binder overlapping any CDR
    #[serde(default = "default_cdr_weight")]
    pub cdr_weight: f64,

    /// Weight of a framework-only strong binder
    #[serde(default = "default_framework_weight")]
    pub framework_weight: f64,
}

fn default_strong_binder_percentile() -> f64 { 2.0 }
fn default_cdr_weight() -> f64 { 2.0 }
fn default_framework_weight() -> f64 { 1.0 }

impl Default for ImmunogenicityConfig {
    fn default() -> Self {
        Self {
            strong_binder_percentile: default_strong_binder_percentile(),
            cdr_weight: default_cdr_weight(),
            framework_weight: default_framework_weight(),
        }
    }
}

// ── Filters ───────────────────────────────────────────────────────────────────

/// Hard gates. All disabled by default; a gate whose metric is missing passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum mean per-residue structural confidence
    #[serde(default)]
    pub min_global_confidence: Option<f64>,

    /// Minimum framework structural confidence
    #[serde(default)]
    pub min_framework_confidence: Option<f64>,

    /// Minimum reduced docking interface confidence
    #[serde(default)]
    pub min_interface_confidence: Option<f64>,

    /// Drop variants carrying an N-glycosylation sequon in any CDR
    #[serde(default)]
    pub reject_cdr_glycosylation: bool,
}

// ── Shortlist ─────────────────────────────────────────────────────────────────

/// Diversity-aware shortlist. Ranked candidates are bucketed by equal-width
/// bins of solubility risk, liability penalty and CDR confidence; the best
/// `per_bucket` of each bucket are kept, in final-rank order, up to
/// `max_candidates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistConfig {
    /// Bins per feature
    #[serde(default = "default_bins")]
    pub bins: usize,

    #[serde(default = "default_per_bucket")]
    pub per_bucket: usize,

    /// Shortlist size cap; 0 disables the shortlist
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

fn default_bins() -> usize { 5 }
fn default_per_bucket() -> usize { 2 }
fn default_max_candidates() -> usize { 20 }

impl Default for ShortlistConfig {
    fn default() -> Self {
        Self {
            bins: default_bins(),
            per_bucket: default_per_bucket(),
            max_candidates: default_max_candidates(),
        }
    }
}

// ── Execution ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum number of variants processed concurrently
    #[serde(default = "default_workers")]
    pub parallel_workers: usize,

    /// Upper bound on each external collaborator call
    #[serde(default = "default_timeout_ms")]
    pub collaborator_timeout_ms: u64,
}

fn default_workers() -> usize { 4 }
fn default_timeout_ms() -> u64 { 30_000 }

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel_workers: default_workers(),
            collaborator_timeout_ms: default_timeout_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

fn non_negative(problems: &mut Vec<String>, name: &str, v: f64) {
    if !v.is_finite() || v < 0.0 {
        problems.push(format!("{name} must be a non-negative number, got {v}"));
    }
}

impl PipelineConfig {
    /// Validate every section, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if let Err(e) = self.developability.validate() {
            problems.push(match e {
                AbrankError::Scoring(msg) => msg,
                other => other.to_string(),
            });
        }

        let alpha = self.fusion.alpha;
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            problems.push(format!("fusion.alpha must lie in [0, 1], got {alpha}"));
        }

        if self.docking.top_k == 0 {
            problems.push("docking.top_k must be at least 1".to_string());
        }
        non_negative(&mut problems, "docking.pae_penalty", self.docking.pae_penalty);
        let ceiling = self.docking.pae_ceiling;
        if !ceiling.is_finite() || ceiling <= 0.0 {
            problems.push(format!("docking.pae_ceiling must be positive, got {ceiling}"));
        }

        let sol = &self.solubility;
        if sol.charge_window == 0 {
            problems.push("solubility.charge_window must be at least 1".to_string());
        }
        if sol.hydrophobic_window == 0 {
            problems.push("solubility.hydrophobic_window must be at least 1".to_string());
        }
        if !sol.hydrophobic_threshold.is_finite() {
            problems.push("solubility.hydrophobic_threshold must be finite".to_string());
        }
        non_negative(&mut problems, "solubility.net_charge_coef", sol.net_charge_coef);
        non_negative(&mut problems, "solubility.charge_patch_coef", sol.charge_patch_coef);
        non_negative(&mut problems, "solubility.hydrophobic_coef", sol.hydrophobic_coef);

        let liab = &self.liability;
        non_negative(&mut problems, "liability.n_glycosylation_weight", liab.n_glycosylation_weight);
        non_negative(&mut problems, "liability.deamidation_weight", liab.deamidation_weight);
        non_negative(&mut problems, "liability.isomerization_weight", liab.isomerization_weight);
        if !liab.edge_floor.is_finite() || !(0.0..1.0).contains(&liab.edge_floor) {
            problems.push(format!(
                "liability.edge_floor must lie in [0, 1), got {}",
                liab.edge_floor
            ));
        }
        for cdr in CdrLoop::ALL {
            let peak = liab.loop_peaks.peak(cdr);
            if !peak.is_finite() || peak <= 0.0 {
                problems.push(format!("liability.loop_peaks.{} must be positive, got {peak}", cdr.as_str().to_lowercase()));
            } else if peak > liab.loop_peaks.h3 {
                problems.push(format!(
                    "liability.loop_peaks.{} ({peak}) exceeds the H3 peak ({})",
                    cdr.as_str().to_lowercase(),
                    liab.loop_peaks.h3
                ));
            }
        }

        let imm = &self.immunogenicity;
        let pct = imm.strong_binder_percentile;
        if !pct.is_finite() || pct <= 0.0 || pct > 100.0 {
            problems.push(format!(
                "immunogenicity.strong_binder_percentile must lie in (0, 100], got {pct}"
            ));
        }
        non_negative(&mut problems, "immunogenicity.cdr_weight", imm.cdr_weight);
        non_negative(&mut problems, "immunogenicity.framework_weight", imm.framework_weight);

        let gates = [
            ("filters.min_global_confidence", self.filters.min_global_confidence),
            ("filters.min_framework_confidence", self.filters.min_framework_confidence),
            ("filters.min_interface_confidence", self.filters.min_interface_confidence),
        ];
        for (name, gate) in gates {
            if let Some(v) = gate {
                if !v.is_finite() {
                    problems.push(format!("{name} must be finite, got {v}"));
                }
            }
        }

        if self.shortlist.bins == 0 {
            problems.push("shortlist.bins must be at least 1".to_string());
        }
        if self.shortlist.per_bucket == 0 {
            problems.push("shortlist.per_bucket must be at least 1".to_string());
        }

        if self.execution.parallel_workers == 0 {
            problems.push("execution.parallel_workers must be at least 1".to_string());
        }
        if self.execution.collaborator_timeout_ms == 0 {
            problems.push("execution.collaborator_timeout_ms must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AbrankError::Scoring(problems.join("; ")))
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AbrankError::Config(e.to_string()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| AbrankError::Config(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load from a `.toml`, `.yaml`/`.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(AbrankError::Config(format!(
                "unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Save as YAML.
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| AbrankError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
