//! Operations principles: the live-ops cadence the host reports.

use super::{evidence, scaled_severity, Direction, Principle, PrincipleResult, SuggestedAction,
            Violation};
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P59",
            name: "Low event completion",
            category: Category::Operations,
            description: "Participants start hosted events but do not finish them.",
            check: check_event_completion,
        },
        Principle {
            id: "P60",
            name: "Content drop overdue",
            category: Category::Operations,
            description: "The newest content drop is older than the cadence allows.",
            check: check_content_drop_age,
        },
    ]
}

fn check_event_completion(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    // NaN means "not measured", which is the measurement category's concern.
    if m.event_completion_rate.is_nan() || m.event_completion_rate >= t.event_completion_floor {
        return PrincipleResult::Pass;
    }
    let deficit = (t.event_completion_floor - m.event_completion_rate)
        / t.event_completion_floor.max(f64::EPSILON);
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(4.0, 1.0 + deficit),
        confidence: 0.75,
        estimated_lag: Some(6),
        evidence: evidence(vec![(
            "eventCompletionRate",
            json!(m.event_completion_rate),
        )]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Decrease,
            0.2,
            "events are abandoned midway; lower the cost of finishing",
        ),
    })
}

fn check_content_drop_age(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.content_drop_age <= t.content_drop_age_max {
        return PrincipleResult::Pass;
    }
    let ratio = m.content_drop_age / t.content_drop_age_max;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(3.0, ratio.min(2.0)),
        confidence: 0.7,
        estimated_lag: Some(10),
        evidence: evidence(vec![("contentDropAge", json!(m.content_drop_age))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.15,
            "content is overdue; bridge the gap with boosted rewards",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_completion_rate_is_not_a_violation() {
        let t = Thresholds::default();
        let m = EconomyMetrics {
            event_completion_rate: f64::NAN,
            ..Default::default()
        };
        assert!(!check_event_completion(&m, &t).violated());
    }

    #[test]
    fn low_completion_fires() {
        let t = Thresholds::default();
        let m = EconomyMetrics {
            event_completion_rate: 0.2,
            ..Default::default()
        };
        assert!(check_event_completion(&m, &t).violated());
    }
}
