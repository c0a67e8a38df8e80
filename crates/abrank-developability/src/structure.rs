//! Structural confidence extraction from raw structure-prediction output.
//!
//! The predictor itself (AlphaFold2/3, ColabFold) runs elsewhere; this module
//! only turns its per-residue confidence array and optional pairwise matrix
//! into [`StructuralMetrics`] for one variant.

use serde::{Deserialize, Serialize};
use tracing::debug;

use abrank_common::{AbrankError, CdrLoop, Result, Variant, VariantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRole {
    Antibody,
    Antigen,
}

/// One chain of the predicted model, in model residue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSpan {
    pub chain_id: String,
    pub length: usize,
    pub role: ChainRole,
}

/// Raw output of one structure prediction for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStructurePrediction {
    pub variant_id: VariantId,
    #[serde(default)]
    pub seed: u32,
    /// Per-residue confidence (pLDDT-like), model residue order, all chains.
    pub per_residue_confidence: Vec<f64>,
    /// Chain layout. Empty means a single antibody chain covering every residue.
    #[serde(default)]
    pub chains: Vec<ChainSpan>,
    /// Model antibody residue `i` → sequence position `residue_map[i]`.
    /// Identity when absent.
    #[serde(default)]
    pub residue_map: Option<Vec<usize>>,
    /// Pairwise inter-residue confidence over all model residues (multimers).
    #[serde(default)]
    pub pair_confidence: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub ptm: Option<f64>,
    #[serde(default)]
    pub iptm: Option<f64>,
}

/// Length-weighted confidence of one CDR loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfidence {
    pub cdr: CdrLoop,
    pub residues: usize,
    pub mean_confidence: f64,
}

/// Summary confidence metrics for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralMetrics {
    pub variant_id: VariantId,
    pub seed: u32,
    /// Antibody per-residue confidence in sequence order.
    pub per_residue_confidence: Vec<f64>,
    /// None when every residue lies in a CDR.
    pub framework_confidence: Option<f64>,
    pub cdr_confidence: Vec<LoopConfidence>,
    /// Mean over all CDR residues; None when no CDRs are declared.
    pub cdr_mean_confidence: Option<f64>,
    /// Global fold confidence: mean over all antibody residues.
    pub global_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// Mean pairwise confidence across the antibody-antigen boundary.
    pub interface_confidence: Option<f64>,
    pub ptm: Option<f64>,
    pub iptm: Option<f64>,
}

fn mean_at(values: &[f64], positions: impl Iterator<Item = usize>) -> Option<f64> {
    let (sum, n) = positions.fold((0.0, 0usize), |(s, n), p| (s + values[p], n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Extract [`StructuralMetrics`] for `variant`.
///
/// `None` means the prediction never arrived and yields `MissingData`.
/// Residue-count, mapping or matrix-shape mismatches yield `Parse`.
pub fn extract_metrics(
    variant: &Variant,
    raw: Option<&RawStructurePrediction>,
) -> Result<StructuralMetrics> {
    let id = variant.id();
    let raw = raw.ok_or_else(|| AbrankError::missing(id, "no structure prediction supplied"))?;

    if raw.variant_id != *id {
        return Err(AbrankError::parse(
            id,
            format!("structure prediction belongs to variant {}", raw.variant_id),
        ));
    }

    let conf = &raw.per_residue_confidence;
    if conf.is_empty() {
        return Err(AbrankError::parse(id, "per-residue confidence array is empty"));
    }
    if let Some(pos) = conf.iter().position(|c| !c.is_finite()) {
        return Err(AbrankError::parse(
            id,
            format!("non-finite confidence at model residue {pos}"),
        ));
    }

    // Split model residues into antibody and antigen index lists.
    let (antibody_idx, antigen_idx) = if raw.chains.is_empty() {
        ((0..conf.len()).collect::<Vec<_>>(), Vec::new())
    } else {
        let total = raw
            .chains
            .iter()
            .try_fold(0usize, |acc, c| acc.checked_add(c.length))
            .ok_or_else(|| AbrankError::parse(id, "chain lengths overflow"))?;
        if total != conf.len() {
            return Err(AbrankError::parse(
                id,
                format!(
                    "chain lengths sum to {total} but {} confidence values were supplied",
                    conf.len()
                ),
            ));
        }
        let mut ab = Vec::new();
        let mut ag = Vec::new();
        let mut offset = 0;
        for chain in &raw.chains {
            let span = offset..offset + chain.length;
            match chain.role {
                ChainRole::Antibody => ab.extend(span),
                ChainRole::Antigen => ag.extend(span),
            }
            offset += chain.length;
        }
        (ab, ag)
    };

    if antibody_idx.len() != variant.len() {
        return Err(AbrankError::parse(
            id,
            format!(
                "{} antibody residues in prediction but sequence length is {}",
                antibody_idx.len(),
                variant.len()
            ),
        ));
    }

    // Re-order antibody confidences into sequence order.
    let per_residue = match &raw.residue_map {
        None => antibody_idx.iter().map(|&i| conf[i]).collect::<Vec<_>>(),
        Some(map) => {
            if map.len() != antibody_idx.len() {
                return Err(AbrankError::parse(
                    id,
                    format!(
                        "residue map has {} entries for {} antibody residues",
                        map.len(),
                        antibody_idx.len()
                    ),
                ));
            }
            let mut ordered: Vec<Option<f64>> = vec![None; variant.len()];
            for (&model_i, &seq_pos) in antibody_idx.iter().zip(map) {
                let slot = ordered.get_mut(seq_pos).ok_or_else(|| {
                    AbrankError::parse(
                        id,
                        format!("residue map points past the sequence (position {seq_pos})"),
                    )
                })?;
                if slot.is_some() {
                    return Err(AbrankError::parse(
                        id,
                        format!("residue map assigns sequence position {seq_pos} twice"),
                    ));
                }
                *slot = Some(conf[model_i]);
            }
            // Every slot is filled: lengths match and no position repeats.
            ordered.into_iter().flatten().collect()
        }
    };

    let global_confidence = per_residue.iter().sum::<f64>() / per_residue.len() as f64;
    let min_confidence = per_residue.iter().copied().fold(f64::INFINITY, f64::min);
    let max_confidence = per_residue.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let framework_confidence = mean_at(&per_residue, variant.framework_positions().into_iter());
    let cdr_confidence: Vec<LoopConfidence> = variant
        .cdrs()
        .iter()
        .map(|r| LoopConfidence {
            cdr: r.cdr,
            residues: r.len(),
            mean_confidence: mean_at(&per_residue, r.start..r.end).unwrap_or_default(),
        })
        .collect();
    let cdr_mean_confidence = mean_at(
        &per_residue,
        variant.cdrs().iter().flat_map(|r| r.start..r.end),
    );

    let interface_confidence = match &raw.pair_confidence {
        None => None,
        Some(matrix) => interface_mean(id, matrix, conf.len(), &antibody_idx, &antigen_idx)?,
    };

    debug!(
        variant_id = %id,
        global = global_confidence,
        interface = ?interface_confidence,
        "Structural metrics extracted"
    );

    Ok(StructuralMetrics {
        variant_id: id.clone(),
        seed: raw.seed,
        per_residue_confidence: per_residue,
        framework_confidence,
        cdr_confidence,
        cdr_mean_confidence,
        global_confidence,
        min_confidence,
        max_confidence,
        interface_confidence,
        ptm: raw.ptm,
        iptm: raw.iptm,
    })
}

/// Mean over both off-diagonal blocks (ab→ag and ag→ab) of a square matrix.
/// `Ok(None)` when the model has no antigen chain.
fn interface_mean(
    id: &VariantId,
    matrix: &[Vec<f64>],
    n_residues: usize,
    antibody_idx: &[usize],
    antigen_idx: &[usize],
) -> Result<Option<f64>> {
    if matrix.len() != n_residues || matrix.iter().any(|row| row.len() != n_residues) {
        return Err(AbrankError::parse(
            id,
            format!("pair confidence matrix is not {n_residues}x{n_residues}"),
        ));
    }
    if antigen_idx.is_empty() || antibody_idx.is_empty() {
        debug!(variant_id = %id, "No antibody-antigen boundary; interface confidence skipped");
        return Ok(None);
    }

    let mut sum = 0.0;
    let mut n = 0usize;
    for &i in antibody_idx {
        for &j in antigen_idx {
            let (a, b) = (matrix[i][j], matrix[j][i]);
            if !a.is_finite() || !b.is_finite() {
                return Err(AbrankError::parse(
                    id,
                    format!("non-finite pair confidence between residues {i} and {j}"),
                ));
            }
            sum += a + b;
            n += 2;
        }
    }
    Ok(Some(sum / n as f64))
}
