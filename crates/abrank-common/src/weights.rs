//! Weight vector for the Composite Developability Score (CDS).

use serde::{Deserialize, Serialize};

use crate::error::{AbrankError, Result};

/// Tolerance when checking that weights sum to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// The 3-component CDS weight vector W.
/// Weights are non-negative and sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevelopabilityWeights {
    /// Solubility risk (charge and hydrophobic patches)
    #[serde(default = "default_third")]
    pub solubility: f64,
    /// CDR chemical liability penalty
    #[serde(default = "default_third")]
    pub liability: f64,
    /// Predicted T-cell epitope burden
    #[serde(default = "default_third")]
    pub immunogenicity: f64,
}

fn default_third() -> f64 { 1.0 / 3.0 }

impl Default for DevelopabilityWeights {
    /// Equal thirds.
    fn default() -> Self {
        Self {
            solubility:     default_third(),
            liability:      default_third(),
            immunogenicity: default_third(),
        }
    }
}

impl DevelopabilityWeights {
    pub fn new(solubility: f64, liability: f64, immunogenicity: f64) -> Self {
        Self { solubility, liability, immunogenicity }
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// Check every weight is finite and non-negative and that they sum to 1.0.
    pub fn validate(&self) -> Result<()> {
        let names = ["solubility", "liability", "immunogenicity"];
        for (name, w) in names.iter().zip(self.as_array()) {
            if !w.is_finite() || w < 0.0 {
                return Err(AbrankError::Scoring(format!(
                    "CDS weight `{name}` must be a non-negative number, got {w}"
                )));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AbrankError::Scoring(format!(
                "CDS weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }

    /// Renormalise weights so they sum to 1.0
    pub fn normalise(&mut self) {
        let sum = self.sum();
        if sum > 0.0 {
            self.solubility     /= sum;
            self.liability      /= sum;
            self.immunogenicity /= sum;
        }
    }

    /// Convert to array for iteration.
    pub fn as_array(&self) -> [f64; 3] {
        [self.solubility, self.liability, self.immunogenicity]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = DevelopabilityWeights::default();
        assert!(w.validate().is_ok(), "Default weights must sum to 1.0");
    }

    #[test]
    fn test_normalise_restores_sum() {
        let mut w = DevelopabilityWeights::default();
        w.solubility += 0.10; // deliberately break sum
        assert!(w.validate().is_err());
        w.normalise();
        assert!(w.validate().is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let w = DevelopabilityWeights::new(1.2, -0.2, 0.0);
        let err = w.validate().unwrap_err();
        assert!(err.to_string().contains("liability"));
    }

    #[test]
    fn test_nan_weight_rejected() {
        let w = DevelopabilityWeights::new(f64::NAN, 0.5, 0.5);
        assert!(w.validate().is_err());
    }

    #[test]
    fn test_randomised_weight_configurations() {
        let mut rng = StdRng::seed_from_u64(0xAB);
        for _ in 0..500 {
            let raw: [f64; 3] = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
            let mut w = DevelopabilityWeights::new(raw[0], raw[1], raw[2]);

            // Accepted exactly when the sum is within tolerance of 1.0.
            let accepted = w.validate().is_ok();
            assert_eq!(accepted, (w.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE);

            w.normalise();
            assert!(w.validate().is_ok());
            assert!((w.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE);

            // Push one weight negative: never valid, however the rest sum.
            let bad = DevelopabilityWeights::new(-raw[0] - 1e-3, raw[1], 1.0 + raw[0]);
            assert!(bad.validate().is_err());
        }
    }
}
