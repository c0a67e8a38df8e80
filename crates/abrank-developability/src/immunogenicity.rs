//! T-cell epitope burden from external MHC-II peptide-binding predictions.
//!
//! The predictor runs elsewhere; each [`PeptidePrediction`] names a window of
//! the variant sequence and its best percentile rank across the allele panel.

use serde::{Deserialize, Serialize};

use abrank_common::{AbrankError, ImmunogenicityConfig, Result, Variant, VariantId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeptidePrediction {
    pub variant_id: VariantId,
    /// 0-based start of the peptide in the variant sequence.
    pub start: usize,
    pub peptide: String,
    /// Percentile rank, 0-100; lower = stronger binder.
    pub percentile_rank: f64,
    #[serde(default)]
    pub allele: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmunogenicityScore {
    pub variant_id: VariantId,
    pub peptides_evaluated: usize,
    pub strong_binders_cdr: usize,
    pub strong_binders_framework: usize,
    /// Weighted strong-binder count in [0, ∞); higher = worse.
    pub raw_score: f64,
}

/// Check one prediction against the variant; returns the window end.
fn validate_prediction(variant: &Variant, p: &PeptidePrediction) -> Result<usize> {
    let id = variant.id();
    if p.variant_id != *id {
        return Err(AbrankError::parse(
            id,
            format!("peptide prediction belongs to variant {}", p.variant_id),
        ));
    }
    if p.peptide.is_empty() {
        return Err(AbrankError::parse(id, format!("empty peptide at position {}", p.start)));
    }
    let end = p.start.checked_add(p.peptide.len()).ok_or_else(|| {
        AbrankError::parse(id, format!("peptide window start {} overflows", p.start))
    })?;
    let window = variant.sequence().get(p.start..end).ok_or_else(|| {
        AbrankError::parse(
            id,
            format!(
                "peptide window {}..{end} exceeds sequence length {}",
                p.start,
                variant.len()
            ),
        )
    })?;
    if !window.eq_ignore_ascii_case(&p.peptide) {
        return Err(AbrankError::parse(
            id,
            format!("peptide {} does not match sequence window {window} at {}", p.peptide, p.start),
        ));
    }
    if !p.percentile_rank.is_finite() || !(0.0..=100.0).contains(&p.percentile_rank) {
        return Err(AbrankError::parse(
            id,
            format!("percentile rank {} outside [0, 100]", p.percentile_rank),
        ));
    }
    Ok(end)
}

/// Score `variant` from its peptide predictions.
///
/// `None` or an empty list is `MissingData`. A single malformed record is a
/// `Parse` error for the whole variant.
pub fn score_immunogenicity(
    variant: &Variant,
    predictions: Option<&[PeptidePrediction]>,
    config: &ImmunogenicityConfig,
) -> Result<ImmunogenicityScore> {
    let predictions = match predictions {
        Some(p) if !p.is_empty() => p,
        _ => return Err(AbrankError::missing(variant.id(), "no peptide-binding predictions")),
    };

    let mut strong_cdr = 0;
    let mut strong_framework = 0;
    for p in predictions {
        let end = validate_prediction(variant, p)?;
        if p.percentile_rank >= config.strong_binder_percentile {
            continue;
        }
        if variant.overlaps_cdr(p.start, end) {
            strong_cdr += 1;
        } else {
            strong_framework += 1;
        }
    }

    Ok(ImmunogenicityScore {
        variant_id: variant.id().clone(),
        peptides_evaluated: predictions.len(),
        strong_binders_cdr: strong_cdr,
        strong_binders_framework: strong_framework,
        raw_score: config.cdr_weight * strong_cdr as f64
            + config.framework_weight * strong_framework as f64,
    })
}
