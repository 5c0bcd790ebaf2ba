//! Measurement principles: the economy's instrumentation itself.

use super::{evidence, Direction, Principle, PrincipleResult, SuggestedAction, Violation};
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P41",
            name: "Missing event telemetry",
            category: Category::Measurement,
            description: "A populated economy reports no economic events at all.",
            check: check_missing_telemetry,
        },
        Principle {
            id: "P42",
            name: "Completion rate unmeasured",
            category: Category::Measurement,
            description: "Systems are declared but no completion telemetry arrives.",
            check: check_unmeasured_completion,
        },
        Principle {
            id: "P43",
            name: "Custom alarm breach",
            category: Category::Measurement,
            description: "A host-defined alarm gauge (custom key ending in 'Alarm') \
                          reads positive.",
            check: check_custom_alarm,
        },
    ]
}

fn check_missing_telemetry(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    let silent = m.total_agents >= 10.0
        && m.total_supply > 0.0
        && m.faucet_volume == 0.0
        && m.sink_volume == 0.0
        && m.velocity == 0.0
        && m.churn_rate == 0.0;
    if !silent {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 2.0,
        confidence: 0.4,
        estimated_lag: Some(20),
        evidence: evidence(vec![("totalAgents", json!(m.total_agents))]),
        suggested_action: SuggestedAction::new(
            "multiplier",
            Direction::Increase,
            0.05,
            "a populated economy is reporting zero events; telemetry may be broken",
        ),
    })
}

fn check_unmeasured_completion(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.systems.is_empty() || !m.event_completion_rate.is_nan() {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 1.0,
        confidence: 0.3,
        estimated_lag: Some(30),
        evidence: evidence(vec![("systems", json!(m.systems.len()))]),
        suggested_action: SuggestedAction::new(
            "multiplier",
            Direction::Increase,
            0.05,
            "systems are declared but completion telemetry is absent",
        ),
    })
}

fn check_custom_alarm(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    let breach = m
        .custom
        .iter()
        .filter(|(name, value)| name.ends_with("Alarm") && value.is_finite() && **value > 0.0)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
    let Some((name, value)) = breach else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: value.clamp(1.0, 10.0),
        confidence: 0.5,
        estimated_lag: Some(5),
        evidence: evidence(vec![("alarm", json!(name)), ("value", json!(value))]),
        suggested_action: SuggestedAction::new(
            "multiplier",
            Direction::Decrease,
            0.1,
            "a host-defined alarm gauge is raised; damp the associated mechanism",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_alarms_pass_through_severity() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        m.custom.insert("dupeExploitAlarm".into(), 8.0);
        match check_custom_alarm(&m, &t) {
            PrincipleResult::Violated(v) => assert_eq!(v.severity, 8.0),
            PrincipleResult::Pass => panic!("expected violation"),
        }
    }
}
