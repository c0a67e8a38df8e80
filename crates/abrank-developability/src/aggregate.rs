//! Composite Developability Score (CDS).
//!
//! CDS(v) = Σ wᵢ · (1 − nᵢ(v)) over solubility, liability and immunogenicity,
//! where nᵢ is the cohort min-max normalised raw risk. Higher CDS = better.
//!
//! A component with no spread across the cohort cannot tell variants apart;
//! its weight moves proportionally onto the components that do vary.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use abrank_common::{AbrankError, DevelopabilityWeights, Result, VariantId};

use crate::normalise::{cohort_minmax, has_spread};

/// Raw risk scores for one variant, each in its natural units (higher = worse).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDevelopability {
    pub variant_id: VariantId,
    pub solubility_risk: f64,
    pub liability_penalty: f64,
    pub immunogenicity: f64,
}

impl RawDevelopability {
    pub fn as_array(&self) -> [f64; 3] {
        [self.solubility_risk, self.liability_penalty, self.immunogenicity]
    }
}

/// Normalised component risks (all in [0, 1]) and the resulting CDS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevelopabilityRecord {
    pub variant_id: VariantId,
    pub norm_solubility: f64,
    pub norm_liability: f64,
    pub norm_immunogenicity: f64,
    pub cds: f64,
}

impl DevelopabilityRecord {
    pub fn as_array(&self) -> [f64; 3] {
        [self.norm_solubility, self.norm_liability, self.norm_immunogenicity]
    }
}

/// Weighted sum of normalised goodness scores.
pub fn composite_score(normed: [f64; 3], weights: &DevelopabilityWeights) -> f64 {
    normed
        .iter()
        .zip(weights.as_array().iter())
        .map(|(n, w)| w * (1.0 - n))
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

/// Weights applied to one cohort given which components vary.
///
/// Non-varying components get zero weight and the rest are rescaled to sum to
/// 1. When no weighted component varies the configured weights stand.
pub fn effective_weights(
    weights: &DevelopabilityWeights,
    spread: [bool; 3],
) -> DevelopabilityWeights {
    let kept: Vec<f64> = weights
        .as_array()
        .iter()
        .zip(spread)
        .map(|(&w, varies)| if varies { w } else { 0.0 })
        .collect();
    if kept.iter().sum::<f64>() <= 0.0 {
        return weights.clone();
    }
    let mut effective = DevelopabilityWeights::new(kept[0], kept[1], kept[2]);
    effective.normalise();
    effective
}

/// Normalise a cohort of raw scores and compute each variant's CDS.
///
/// Only variants with all three raw scores belong in `raws`. Output is sorted
/// by variant id regardless of input order.
pub fn aggregate(
    raws: &[RawDevelopability],
    weights: &DevelopabilityWeights,
) -> Result<Vec<DevelopabilityRecord>> {
    weights.validate()?;

    let mut seen = BTreeSet::new();
    for raw in raws {
        if !seen.insert(&raw.variant_id) {
            return Err(AbrankError::InvalidCohort(format!(
                "variant {} appears twice in developability input",
                raw.variant_id
            )));
        }
        if raw.as_array().iter().any(|x| !x.is_finite()) {
            return Err(AbrankError::Scoring(format!(
                "non-finite raw developability score for variant {}",
                raw.variant_id
            )));
        }
    }

    let mut sorted: Vec<&RawDevelopability> = raws.iter().collect();
    sorted.sort_by(|a, b| a.variant_id.cmp(&b.variant_id));

    let column = |i: usize| -> Vec<f64> { sorted.iter().map(|r| r.as_array()[i]).collect() };
    let columns = [column(0), column(1), column(2)];
    let solubility = cohort_minmax(&columns[0]);
    let liability = cohort_minmax(&columns[1]);
    let immunogenicity = cohort_minmax(&columns[2]);
    let applied = effective_weights(
        weights,
        [has_spread(&columns[0]), has_spread(&columns[1]), has_spread(&columns[2])],
    );

    let records: Vec<DevelopabilityRecord> = sorted
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let normed = [solubility[i], liability[i], immunogenicity[i]];
            DevelopabilityRecord {
                variant_id: raw.variant_id.clone(),
                norm_solubility: normed[0],
                norm_liability: normed[1],
                norm_immunogenicity: normed[2],
                cds: composite_score(normed, &applied),
            }
        })
        .collect();

    debug!(
        variants = records.len(),
        w_sol = applied.solubility,
        w_liab = applied.liability,
        w_immuno = applied.immunogenicity,
        "Developability aggregated"
    );
    Ok(records)
}
