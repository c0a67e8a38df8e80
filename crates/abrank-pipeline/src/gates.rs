//! Optional hard gates applied before cohort normalisation.
//!
//! A gated variant never enters the min-max bounds and is reported as pending.
//! A gate whose metric is unavailable passes.

use abrank_common::FilterConfig;
use abrank_developability::{LiabilityReport, StructuralMetrics};
use abrank_ranker::DockingRecord;

/// Reason the variant fails a gate, or `None` when it passes all of them.
pub fn gate_failure(
    filters: &FilterConfig,
    structure: Option<&StructuralMetrics>,
    liability: &LiabilityReport,
    docking: Option<&DockingRecord>,
) -> Option<String> {
    if let (Some(min), Some(m)) = (filters.min_global_confidence, structure) {
        if m.global_confidence < min {
            return Some(format!(
                "global confidence {:.2} below minimum {min}",
                m.global_confidence
            ));
        }
    }

    if let (Some(min), Some(fw)) = (
        filters.min_framework_confidence,
        structure.and_then(|m| m.framework_confidence),
    ) {
        if fw < min {
            return Some(format!("framework confidence {fw:.2} below minimum {min}"));
        }
    }

    if let (Some(min), Some(dock)) = (filters.min_interface_confidence, docking) {
        if dock.interface_confidence < min {
            return Some(format!(
                "docking interface confidence {:.3} below minimum {min}",
                dock.interface_confidence
            ));
        }
    }

    if filters.reject_cdr_glycosylation && liability.has_glycosylation_site() {
        return Some("N-glycosylation sequon in a CDR".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use abrank_common::{CdrLoop, PoseReduction, VariantId};
    use abrank_developability::{LiabilityFinding, LiabilityKind};

    fn metrics(global: f64, framework: Option<f64>) -> StructuralMetrics {
        StructuralMetrics {
            variant_id: VariantId::new("var_0001"),
            seed: 0,
            per_residue_confidence: vec![global],
            framework_confidence: framework,
            cdr_confidence: vec![],
            cdr_mean_confidence: None,
            global_confidence: global,
            min_confidence: global,
            max_confidence: global,
            interface_confidence: None,
            ptm: None,
            iptm: None,
        }
    }

    fn clean() -> LiabilityReport {
        LiabilityReport {
            variant_id: VariantId::new("var_0001"),
            findings: vec![],
            raw_penalty: 0.0,
        }
    }

    #[test]
    fn test_no_gates_by_default() {
        let filters = FilterConfig::default();
        assert_eq!(gate_failure(&filters, Some(&metrics(10.0, Some(5.0))), &clean(), None), None);
    }

    #[test]
    fn test_low_confidence_gated() {
        let filters = FilterConfig {
            min_global_confidence: Some(70.0),
            ..Default::default()
        };
        let reason = gate_failure(&filters, Some(&metrics(60.0, None)), &clean(), None).unwrap();
        assert!(reason.contains("global confidence"));
        assert_eq!(gate_failure(&filters, Some(&metrics(75.0, None)), &clean(), None), None);
    }

    #[test]
    fn test_missing_metric_passes() {
        let filters = FilterConfig {
            min_global_confidence: Some(70.0),
            min_framework_confidence: Some(70.0),
            min_interface_confidence: Some(0.5),
            ..Default::default()
        };
        assert_eq!(gate_failure(&filters, None, &clean(), None), None);
        assert_eq!(gate_failure(&filters, Some(&metrics(80.0, None)), &clean(), None), None);
    }

    #[test]
    fn test_interface_gate_uses_docking_record() {
        let filters = FilterConfig {
            min_interface_confidence: Some(0.5),
            ..Default::default()
        };
        let weak = DockingRecord {
            variant_id: VariantId::new("var_0001"),
            confidence: 0.3,
            interface_confidence: 0.3,
            interface_pae: None,
            global_confidence: None,
            reduction: PoseReduction::BestOfN,
            poses_used: 1,
            poses_available: 1,
            best_seed: 0,
        };
        assert!(gate_failure(&filters, None, &clean(), Some(&weak)).is_some());
        let strong = DockingRecord {
            confidence: 0.8,
            interface_confidence: 0.8,
            ..weak
        };
        assert_eq!(gate_failure(&filters, None, &clean(), Some(&strong)), None);
    }

    #[test]
    fn test_glycosylation_gate() {
        let filters = FilterConfig {
            reject_cdr_glycosylation: true,
            ..Default::default()
        };
        let mut report = clean();
        report.findings.push(LiabilityFinding {
            kind: LiabilityKind::NGlycosylation,
            motif: "NGS".into(),
            cdr: CdrLoop::H3,
            position: 100,
            proximity_weight: 1.0,
            severity: 3.0,
        });
        report.raw_penalty = 3.0;
        assert!(gate_failure(&filters, None, &report, None).is_some());
    }
}
