//! Diagnoser - runs every principle and ranks the violations.
//! Mission: One bad principle must never take the pipeline down

use crate::observer::EconomyMetrics;
use crate::principles::{Category, Principle, PrincipleResult, Violation};
use crate::thresholds::Thresholds;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// One ranked violation. The engine acts on the top entry only; the full list
/// is exposed for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub principle_id: String,
    pub principle_name: String,
    pub category: Category,
    pub violation: Violation,
    pub tick: u64,
}

pub struct Diagnoser {
    principles: Vec<Principle>,
}

impl Diagnoser {
    pub fn new(principles: Vec<Principle>) -> Self {
        Self { principles }
    }

    pub fn principles(&self) -> &[Principle] {
        &self.principles
    }

    /// Run all checks against the tick's metrics. A panicking check is logged
    /// and skipped; malformed results are clamped into range. The returned
    /// list is sorted by (severity desc, confidence desc).
    pub fn diagnose(&self, metrics: &EconomyMetrics, thresholds: &Thresholds) -> Vec<Diagnosis> {
        let mut diagnoses = Vec::new();

        for principle in &self.principles {
            let check = principle.check;
            let outcome = catch_unwind(AssertUnwindSafe(|| check(metrics, thresholds)));
            let result = match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        principle = principle.id,
                        "principle check panicked; skipping"
                    );
                    continue;
                }
            };
            if let PrincipleResult::Violated(violation) = result {
                diagnoses.push(Diagnosis {
                    principle_id: principle.id.to_string(),
                    principle_name: principle.name.to_string(),
                    category: principle.category,
                    violation: clamp(violation),
                    tick: metrics.tick,
                });
            }
        }

        diagnoses.sort_by(|a, b| {
            b.violation
                .severity
                .partial_cmp(&a.violation.severity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.violation
                        .confidence
                        .partial_cmp(&a.violation.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        debug!(
            tick = metrics.tick,
            violations = diagnoses.len(),
            "diagnosis complete"
        );
        diagnoses
    }
}

/// Clamp malformed principle output into contract ranges.
fn clamp(mut v: Violation) -> Violation {
    if !v.severity.is_finite() {
        v.severity = 1.0;
    }
    v.severity = v.severity.clamp(1.0, 10.0);
    if !v.confidence.is_finite() {
        v.confidence = 0.0;
    }
    v.confidence = v.confidence.clamp(0.0, 1.0);
    if !v.suggested_action.magnitude.is_finite() || v.suggested_action.magnitude <= 0.0 {
        v.suggested_action.magnitude = 0.01;
    }
    v.suggested_action.magnitude = v.suggested_action.magnitude.min(1.0);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principles::{builtin_principles, Direction, SuggestedAction};

    fn panicking_check(_m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
        panic!("buggy principle");
    }

    fn malformed_check(_m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
        PrincipleResult::Violated(Violation {
            severity: 42.0,
            confidence: 3.0,
            estimated_lag: None,
            evidence: Default::default(),
            suggested_action: SuggestedAction::new("cost", Direction::Increase, 7.0, "broken"),
        })
    }

    #[test]
    fn panicking_principle_is_isolated() {
        let diagnoser = Diagnoser::new(vec![Principle {
            id: "PX",
            name: "Panics",
            category: Category::Operations,
            description: "always panics",
            check: panicking_check,
        }]);
        let metrics = EconomyMetrics::default();
        let diagnoses = diagnoser.diagnose(&metrics, &Thresholds::default());
        assert!(diagnoses.is_empty());
    }

    #[test]
    fn malformed_results_are_clamped() {
        let diagnoser = Diagnoser::new(vec![Principle {
            id: "PY",
            name: "Malformed",
            category: Category::Operations,
            description: "returns out-of-range numbers",
            check: malformed_check,
        }]);
        let metrics = EconomyMetrics::default();
        let diagnoses = diagnoser.diagnose(&metrics, &Thresholds::default());
        assert_eq!(diagnoses.len(), 1);
        let v = &diagnoses[0].violation;
        assert_eq!(v.severity, 10.0);
        assert_eq!(v.confidence, 1.0);
        assert_eq!(v.suggested_action.magnitude, 1.0);
    }

    #[test]
    fn diagnoses_sort_by_severity_then_confidence() {
        let thresholds = Thresholds::default();
        let mut metrics = EconomyMetrics {
            event_completion_rate: f64::NAN,
            total_agents: 10.0,
            ..Default::default()
        };
        // Critical inequality (P33, severity >= 6) plus inflationary net flow
        // (P12, severity 5).
        metrics
            .gini_coefficient_by_currency
            .insert("gems".into(), 0.75);
        metrics.net_flow_by_currency.insert("gold".into(), 15.0);

        let diagnoser = Diagnoser::new(builtin_principles());
        let diagnoses = diagnoser.diagnose(&metrics, &thresholds);
        assert!(diagnoses.len() >= 2);
        assert_eq!(diagnoses[0].principle_id, "P33");
        let p12_pos = diagnoses
            .iter()
            .position(|d| d.principle_id == "P12")
            .unwrap();
        assert!(p12_pos > 0);
        for pair in diagnoses.windows(2) {
            assert!(pair[0].violation.severity >= pair[1].violation.severity);
        }
    }
}
