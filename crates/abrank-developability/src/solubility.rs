//! Sequence-based solubility / aggregation risk.
//!
//! Three features feed the raw risk: absolute net charge at neutral pH, the
//! strongest local charge patch, and the number of hydrophobic windows on the
//! Kyte-Doolittle scale. Higher raw risk means worse solubility.

use serde::{Deserialize, Serialize};

use abrank_common::{SolubilityConfig, Variant, VariantId};

/// Approximate side-chain charge at pH ~7.4.
pub fn residue_charge(aa: u8) -> f64 {
    match aa {
        b'K' | b'R' => 1.0,
        b'H' => 0.1, // mostly neutral, pKa ~6.0
        b'D' | b'E' => -1.0,
        _ => 0.0,
    }
}

/// Kyte-Doolittle hydropathy index.
pub fn kyte_doolittle(aa: u8) -> f64 {
    match aa {
        b'I' => 4.5,
        b'V' => 4.2,
        b'L' => 3.8,
        b'F' => 2.8,
        b'C' => 2.5,
        b'M' => 1.9,
        b'A' => 1.8,
        b'G' => -0.4,
        b'T' => -0.7,
        b'S' => -0.8,
        b'W' => -0.9,
        b'Y' => -1.3,
        b'P' => -1.6,
        b'H' => -3.2,
        b'E' | b'Q' | b'D' | b'N' => -3.5,
        b'K' => -3.9,
        b'R' => -4.5,
        _ => 0.0,
    }
}

/// Per-variant solubility features and raw risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolubilityScore {
    pub variant_id: VariantId,
    pub net_charge: f64,
    /// Largest |summed charge| over any charge window.
    pub charge_patch: f64,
    /// Windows whose mean hydropathy exceeds the threshold.
    pub hydrophobic_patches: usize,
    /// Mean hydropathy of the most hydrophobic window.
    pub max_window_hydropathy: f64,
    /// Raw risk in [0, ∞); higher = worse.
    pub raw_risk: f64,
}

/// Sliding-window sums. A sequence shorter than `width` forms one window.
fn window_sums(values: &[f64], width: usize) -> Vec<(f64, usize)> {
    let width = width.max(1);
    if values.len() <= width {
        return vec![(values.iter().sum(), values.len())];
    }
    values
        .windows(width)
        .map(|w| (w.iter().sum(), width))
        .collect()
}

pub struct SolubilityScorer<'a> {
    config: &'a SolubilityConfig,
}

impl<'a> SolubilityScorer<'a> {
    pub fn new(config: &'a SolubilityConfig) -> Self {
        Self { config }
    }

    /// Score one variant. Pure function of the sequence and configuration.
    pub fn score(&self, variant: &Variant) -> SolubilityScore {
        let residues = variant.residues();

        let charges: Vec<f64> = residues.iter().map(|&aa| residue_charge(aa)).collect();
        let net_charge: f64 = charges.iter().sum();
        let charge_patch = window_sums(&charges, self.config.charge_window)
            .into_iter()
            .map(|(sum, _)| sum.abs())
            .fold(0.0, f64::max);

        let hydropathy: Vec<f64> = residues.iter().map(|&aa| kyte_doolittle(aa)).collect();
        let means: Vec<f64> = window_sums(&hydropathy, self.config.hydrophobic_window)
            .into_iter()
            .filter(|&(_, n)| n > 0)
            .map(|(sum, n)| sum / n as f64)
            .collect();
        let hydrophobic_patches = means
            .iter()
            .filter(|&&m| m > self.config.hydrophobic_threshold)
            .count();
        let max_window_hydropathy = means.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let raw_risk = self.config.net_charge_coef * net_charge.abs()
            + self.config.charge_patch_coef * charge_patch
            + self.config.hydrophobic_coef * hydrophobic_patches as f64;

        SolubilityScore {
            variant_id: variant.id().clone(),
            net_charge,
            charge_patch,
            hydrophobic_patches,
            max_window_hydropathy,
            raw_risk,
        }
    }
}
