//! CDR chemical-liability scanning.
//!
//! Only residues inside declared CDRs are scanned, and motifs never span two
//! loops. Each hit is weighted by its base severity times a paratope-proximity
//! factor that peaks at the loop centre and falls linearly to
//! `edge_floor × peak` at the loop ends.

use serde::{Deserialize, Serialize};
use tracing::trace;

use abrank_common::{CdrLoop, LiabilityConfig, Variant, VariantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiabilityKind {
    /// N-X-S/T with X ≠ P
    NGlycosylation,
    /// NG, NS
    Deamidation,
    /// DP, DG
    Isomerization,
}

impl LiabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NGlycosylation => "n_glycosylation",
            Self::Deamidation => "deamidation",
            Self::Isomerization => "isomerization",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiabilityFinding {
    pub kind: LiabilityKind,
    pub motif: String,
    pub cdr: CdrLoop,
    /// 0-based start of the motif in the full sequence.
    pub position: usize,
    pub proximity_weight: f64,
    pub severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiabilityReport {
    pub variant_id: VariantId,
    pub findings: Vec<LiabilityFinding>,
    /// Sum of finding severities; 0 when the CDRs are clean.
    pub raw_penalty: f64,
}

impl LiabilityReport {
    pub fn count(&self, kind: LiabilityKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    pub fn has_glycosylation_site(&self) -> bool {
        self.count(LiabilityKind::NGlycosylation) > 0
    }
}

/// Proximity weight of a motif of `motif_len` residues starting `local_start`
/// residues into a loop of `loop_len` residues.
///
/// Triangular profile over the motif midpoint: `peak` at the loop centre,
/// `peak × edge_floor` at either end.
pub fn proximity_weight(
    loop_len: usize,
    local_start: usize,
    motif_len: usize,
    peak: f64,
    edge_floor: f64,
) -> f64 {
    let centre = (loop_len.saturating_sub(1)) as f64 / 2.0;
    if centre <= 0.0 {
        return peak;
    }
    let midpoint = local_start as f64 + (motif_len.saturating_sub(1)) as f64 / 2.0;
    let closeness = (1.0 - (midpoint - centre).abs() / centre).clamp(0.0, 1.0);
    peak * (edge_floor + (1.0 - edge_floor) * closeness)
}

/// Motifs starting at `i` within one loop, in fixed kind order.
fn motifs_at(loop_seq: &[u8], i: usize) -> Vec<(LiabilityKind, usize)> {
    let at = |k: usize| loop_seq.get(i + k).copied();
    let mut hits = Vec::new();

    if at(0) == Some(b'N')
        && matches!(at(1), Some(x) if x != b'P')
        && matches!(at(2), Some(b'S') | Some(b'T'))
    {
        hits.push((LiabilityKind::NGlycosylation, 3));
    }
    if at(0) == Some(b'N') && matches!(at(1), Some(b'G') | Some(b'S')) {
        hits.push((LiabilityKind::Deamidation, 2));
    }
    if at(0) == Some(b'D') && matches!(at(1), Some(b'P') | Some(b'G')) {
        hits.push((LiabilityKind::Isomerization, 2));
    }
    hits
}

pub struct LiabilityScorer<'a> {
    config: &'a LiabilityConfig,
}

impl<'a> LiabilityScorer<'a> {
    pub fn new(config: &'a LiabilityConfig) -> Self {
        Self { config }
    }

    fn base_weight(&self, kind: LiabilityKind) -> f64 {
        match kind {
            LiabilityKind::NGlycosylation => self.config.n_glycosylation_weight,
            LiabilityKind::Deamidation => self.config.deamidation_weight,
            LiabilityKind::Isomerization => self.config.isomerization_weight,
        }
    }

    /// Scan every CDR of `variant`. Findings come out ordered by position.
    pub fn scan(&self, variant: &Variant) -> LiabilityReport {
        let residues = variant.residues();
        let mut findings = Vec::new();

        for region in variant.cdrs() {
            let loop_seq = &residues[region.start..region.end];
            let peak = self.config.loop_peaks.peak(region.cdr);

            for i in 0..loop_seq.len() {
                for (kind, len) in motifs_at(loop_seq, i) {
                    let proximity =
                        proximity_weight(loop_seq.len(), i, len, peak, self.config.edge_floor);
                    let motif = String::from_utf8_lossy(&loop_seq[i..i + len]).into_owned();
                    trace!(
                        variant_id = %variant.id(),
                        cdr = %region.cdr,
                        kind = kind.as_str(),
                        motif = %motif,
                        "Liability motif"
                    );
                    findings.push(LiabilityFinding {
                        kind,
                        motif,
                        cdr: region.cdr,
                        position: region.start + i,
                        proximity_weight: proximity,
                        severity: self.base_weight(kind) * proximity,
                    });
                }
            }
        }

        let raw_penalty = findings.iter().map(|f| f.severity).sum();
        LiabilityReport {
            variant_id: variant.id().clone(),
            findings,
            raw_penalty,
        }
    }
}
