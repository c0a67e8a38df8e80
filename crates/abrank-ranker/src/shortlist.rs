//! Diversity-aware shortlist of the top-ranked candidates.
//!
//! Near-identical variants tend to crowd the head of the ranking. Each
//! candidate is put in a bucket keyed by equal-width bins of its solubility
//! risk, liability penalty and CDR confidence; walking the ranking from the
//! top, at most `per_bucket` candidates are taken from any one bucket.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use abrank_common::{ShortlistConfig, VariantId};
use abrank_developability::normalise::equal_width_bin;

use crate::merge::RankedCandidate;

/// Raw per-variant features used for bucketing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityFeatures {
    pub variant_id: VariantId,
    pub solubility_risk: f64,
    pub liability_penalty: f64,
    /// Mean CDR structural confidence; None without a structure.
    pub cdr_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistEntry {
    pub variant_id: VariantId,
    pub final_rank: usize,
    /// `<solubility bin>_<liability bin>_<cdr bin>`; `na` for a missing feature.
    pub bucket: String,
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)))
}

/// Select the shortlist from `ranked`. Bin edges span the features of the
/// ranked candidates only. Candidates without features share the `na_na_na`
/// bucket.
pub fn select_diverse(
    ranked: &[RankedCandidate],
    features: &[DiversityFeatures],
    config: &ShortlistConfig,
) -> Vec<ShortlistEntry> {
    if config.max_candidates == 0 {
        return Vec::new();
    }

    let by_id: BTreeMap<&VariantId, &DiversityFeatures> =
        features.iter().map(|f| (&f.variant_id, f)).collect();
    let present: Vec<&DiversityFeatures> = ranked
        .iter()
        .filter_map(|c| by_id.get(&c.variant_id).copied())
        .collect();

    let (sol_lo, sol_hi) = bounds(present.iter().map(|f| f.solubility_risk));
    let (liab_lo, liab_hi) = bounds(present.iter().map(|f| f.liability_penalty));
    let (cdr_lo, cdr_hi) = bounds(present.iter().filter_map(|f| f.cdr_confidence));

    let bucket_of = |f: Option<&&DiversityFeatures>| -> String {
        match f {
            None => "na_na_na".to_string(),
            Some(f) => {
                let cdr = f
                    .cdr_confidence
                    .map(|c| equal_width_bin(c, cdr_lo, cdr_hi, config.bins).to_string())
                    .unwrap_or_else(|| "na".to_string());
                format!(
                    "{}_{}_{}",
                    equal_width_bin(f.solubility_risk, sol_lo, sol_hi, config.bins),
                    equal_width_bin(f.liability_penalty, liab_lo, liab_hi, config.bins),
                    cdr
                )
            }
        }
    };

    let mut order: Vec<&RankedCandidate> = ranked.iter().collect();
    order.sort_by_key(|c| c.final_rank);

    let mut taken: BTreeMap<String, usize> = BTreeMap::new();
    let mut shortlist = Vec::new();
    for candidate in order {
        if shortlist.len() >= config.max_candidates {
            break;
        }
        let bucket = bucket_of(by_id.get(&candidate.variant_id));
        let count = taken.entry(bucket.clone()).or_insert(0);
        if *count >= config.per_bucket {
            continue;
        }
        *count += 1;
        shortlist.push(ShortlistEntry {
            variant_id: candidate.variant_id.clone(),
            final_rank: candidate.final_rank,
            bucket,
        });
    }

    debug!(
        ranked = ranked.len(),
        shortlisted = shortlist.len(),
        buckets = taken.len(),
        "Diversity shortlist selected"
    );
    shortlist
}
