//! Core cohort entities.
//! Every metric, score and ranking row refers back to a `Variant` by `VariantId`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AbrankError, Result};

// ---------------------------------------------------------------------------
// Variant identifier
// ---------------------------------------------------------------------------

/// Stable, lexicographically ordered variant identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(String);

impl VariantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VariantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VariantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// CDR loops and regions
// ---------------------------------------------------------------------------

/// Complementarity-determining loops, heavy chain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CdrLoop {
    H1,
    H2,
    H3,
    L1,
    L2,
    L3,
}

impl CdrLoop {
    pub const ALL: [CdrLoop; 6] = [
        CdrLoop::H1,
        CdrLoop::H2,
        CdrLoop::H3,
        CdrLoop::L1,
        CdrLoop::L2,
        CdrLoop::L3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CdrLoop::H1 => "H1",
            CdrLoop::H2 => "H2",
            CdrLoop::H3 => "H3",
            CdrLoop::L1 => "L1",
            CdrLoop::L2 => "L2",
            CdrLoop::L3 => "L3",
        }
    }
}

impl fmt::Display for CdrLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CDR loop as a half-open `[start, end)` range of 0-based sequence positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdrRegion {
    pub cdr: CdrLoop,
    pub start: usize,
    pub end: usize,
}

impl CdrRegion {
    pub fn new(cdr: CdrLoop, start: usize, end: usize) -> Self {
        Self { cdr, start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end
    }

    /// True when `[start, end)` shares at least one residue with this loop.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && self.start < end
    }
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// The 20 standard amino acids, one-letter codes.
pub const STANDARD_RESIDUES: &[u8; 20] = b"ACDEFGHIKLMNPQRSTVWY";

pub fn is_standard_residue(aa: u8) -> bool {
    STANDARD_RESIDUES.contains(&aa)
}

/// Wire form of a variant as delivered by the library generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSpec {
    pub id: VariantId,
    pub sequence: String,
    #[serde(default)]
    pub cdrs: Vec<CdrRegion>,
    #[serde(default)]
    pub parent: Option<VariantId>,
    #[serde(default)]
    pub generation: u32,
}

/// An antibody sequence variant. Immutable once constructed.
///
/// The sequence is the full chain-segmented sequence (e.g. VH-linker-VL);
/// every residue not covered by a CDR loop counts as framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VariantSpec", into = "VariantSpec")]
pub struct Variant {
    id: VariantId,
    sequence: String,
    cdrs: Vec<CdrRegion>,
    parent: Option<VariantId>,
    generation: u32,
}

impl Variant {
    /// Validate and build a variant.
    ///
    /// The sequence is upper-cased and stripped of whitespace; it must then be
    /// non-empty and contain only standard residues. CDR loops must lie inside
    /// the sequence, be non-empty, appear at most once and not overlap.
    pub fn new(spec: VariantSpec) -> Result<Self> {
        let VariantSpec { id, sequence, mut cdrs, parent, generation } = spec;

        let invalid = |message: String| AbrankError::InvalidVariant {
            variant_id: id.clone(),
            message,
        };

        if id.as_str().trim().is_empty() {
            return Err(invalid("variant id is empty".to_string()));
        }

        let sequence: String = sequence
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if sequence.is_empty() {
            return Err(invalid("sequence is empty".to_string()));
        }
        if let Some((pos, aa)) = sequence
            .bytes()
            .enumerate()
            .find(|(_, aa)| !is_standard_residue(*aa))
        {
            return Err(invalid(format!(
                "non-standard residue '{}' at position {pos}",
                aa as char
            )));
        }

        cdrs.sort_by_key(|r| (r.start, r.cdr));
        let mut seen = BTreeSet::new();
        for (i, region) in cdrs.iter().enumerate() {
            if region.is_empty() {
                return Err(invalid(format!("CDR {} is empty", region.cdr)));
            }
            if region.end > sequence.len() {
                return Err(invalid(format!(
                    "CDR {} [{}, {}) exceeds sequence length {}",
                    region.cdr,
                    region.start,
                    region.end,
                    sequence.len()
                )));
            }
            if !seen.insert(region.cdr) {
                return Err(invalid(format!("CDR {} declared twice", region.cdr)));
            }
            if let Some(prev) = i.checked_sub(1).map(|j| cdrs[j]) {
                if prev.end > region.start {
                    return Err(invalid(format!(
                        "CDR {} overlaps CDR {}",
                        region.cdr, prev.cdr
                    )));
                }
            }
        }

        Ok(Self { id, sequence, cdrs, parent, generation })
    }

    pub fn id(&self) -> &VariantId {
        &self.id
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn residues(&self) -> &[u8] {
        self.sequence.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// CDR loops sorted by start position.
    pub fn cdrs(&self) -> &[CdrRegion] {
        &self.cdrs
    }

    pub fn parent(&self) -> Option<&VariantId> {
        self.parent.as_ref()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// True when any residue in `[start, end)` lies in a CDR loop.
    pub fn overlaps_cdr(&self, start: usize, end: usize) -> bool {
        self.cdrs.iter().any(|r| r.overlaps(start, end))
    }

    /// Sequence positions outside every CDR loop.
    pub fn framework_positions(&self) -> Vec<usize> {
        (0..self.len())
            .filter(|&pos| !self.cdrs.iter().any(|r| r.contains(pos)))
            .collect()
    }
}

impl TryFrom<VariantSpec> for Variant {
    type Error = AbrankError;

    fn try_from(spec: VariantSpec) -> Result<Self> {
        Variant::new(spec)
    }
}

impl From<Variant> for VariantSpec {
    fn from(v: Variant) -> Self {
        Self {
            id: v.id,
            sequence: v.sequence,
            cdrs: v.cdrs,
            parent: v.parent,
            generation: v.generation,
        }
    }
}

// ---------------------------------------------------------------------------
// Cohort
// ---------------------------------------------------------------------------

/// The set of variants scored together in one run, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct Cohort {
    variants: Vec<Variant>,
}

impl Cohort {
    /// Build a cohort; ids must be unique.
    pub fn new(mut variants: Vec<Variant>) -> Result<Self> {
        variants.sort_by(|a, b| a.id().cmp(b.id()));
        let dupes: Vec<String> = variants
            .windows(2)
            .filter(|w| w[0].id() == w[1].id())
            .map(|w| w[0].id().to_string())
            .collect();
        if !dupes.is_empty() {
            return Err(AbrankError::InvalidCohort(format!(
                "duplicate variant ids: {}",
                dupes.join(", ")
            )));
        }
        Ok(Self { variants })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Exclusions
// ---------------------------------------------------------------------------

/// Pipeline stage a per-variant failure or exclusion originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Structure,
    Solubility,
    Liability,
    Immunogenicity,
    Docking,
    Gate,
    Ranking,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Structure => "structure",
            PipelineStage::Solubility => "solubility",
            PipelineStage::Liability => "liability",
            PipelineStage::Immunogenicity => "immunogenicity",
            PipelineStage::Docking => "docking",
            PipelineStage::Gate => "gate",
            PipelineStage::Ranking => "ranking",
        };
        f.write_str(s)
    }
}

/// A variant left out of the final ranking, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedVariant {
    pub variant_id: VariantId,
    pub stage: PipelineStage,
    pub reason: String,
}

impl ExcludedVariant {
    pub fn new(variant_id: VariantId, stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self { variant_id, stage, reason: reason.into() }
    }
}
