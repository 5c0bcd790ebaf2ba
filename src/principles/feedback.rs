//! Feedback principles: self-reinforcing loops that compound quietly until
//! they don't.

use super::{evidence, Direction, Principle, PrincipleResult, SuggestedAction, Violation};
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P24",
            name: "Compounding yield loop",
            category: Category::Feedback,
            description: "Inflation and inequality rising together: yields compound \
                          for those who already hold.",
            check: check_compounding_yield,
        },
        Principle {
            id: "P25",
            name: "Winner-take-all loop",
            category: Category::Feedback,
            description: "Concentrated holdings and concentrated trade capture reinforce \
                          each other.",
            check: check_winner_take_all,
        },
        Principle {
            id: "P26",
            name: "Death spiral",
            category: Category::Feedback,
            description: "Low satisfaction feeding churn feeding lower satisfaction.",
            check: check_death_spiral,
        },
        Principle {
            id: "P27",
            name: "Engagement oscillation",
            category: Category::Feedback,
            description: "Peak/valley swings are widening instead of damping.",
            check: check_oscillation,
        },
    ]
}

fn check_compounding_yield(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.inflation_rate <= t.inflation_warn || m.gini_coefficient <= t.gini_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 6.0,
        confidence: 0.65,
        estimated_lag: Some(10),
        evidence: evidence(vec![
            ("inflationRate", json!(m.inflation_rate)),
            ("giniCoefficient", json!(m.gini_coefficient)),
        ]),
        suggested_action: SuggestedAction::new(
            "yield",
            Direction::Decrease,
            0.2,
            "new supply is accruing to existing holders; damp compounding yields",
        ),
    })
}

fn check_winner_take_all(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.top10_pct_share <= t.top10_share_warn || m.extraction_ratio <= t.extraction_ratio_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 7.0,
        confidence: 0.7,
        estimated_lag: Some(8),
        evidence: evidence(vec![
            ("top10PctShare", json!(m.top10_pct_share)),
            ("extractionRatio", json!(m.extraction_ratio)),
        ]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Increase,
            0.2,
            "holdings and trade capture are concentrating together; tax the loop",
        ),
    })
}

fn check_death_spiral(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.total_agents <= 0.0 || m.avg_satisfaction >= 50.0 || m.churn_rate <= t.churn_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 9.0,
        confidence: 0.85,
        estimated_lag: Some(10),
        evidence: evidence(vec![
            ("avgSatisfaction", json!(m.avg_satisfaction)),
            ("churnRate", json!(m.churn_rate)),
        ]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.3,
            "unhappiness and churn are feeding each other; intervene strongly",
        ),
    })
}

fn check_oscillation(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.cyclical_peaks.len() < 3 || m.cyclical_valleys.len() < 3 {
        return PrincipleResult::Pass;
    }
    let pairs = m.cyclical_peaks.len().min(m.cyclical_valleys.len());
    let first_gap = m.cyclical_peaks[0] - m.cyclical_valleys[0];
    let last_gap = m.cyclical_peaks[pairs - 1] - m.cyclical_valleys[pairs - 1];
    if first_gap <= 0.0 || last_gap <= 2.0 * first_gap {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.5,
        estimated_lag: Some(15),
        evidence: evidence(vec![
            ("firstAmplitude", json!(first_gap)),
            ("lastAmplitude", json!(last_gap)),
        ]),
        suggested_action: SuggestedAction::new(
            "multiplier",
            Direction::Decrease,
            0.1,
            "engagement swings are widening; damp the amplifying multiplier",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn death_spiral_needs_both_signals() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics {
            total_agents: 50.0,
            avg_satisfaction: 40.0,
            churn_rate: 0.01,
            ..Default::default()
        };
        assert!(!check_death_spiral(&m, &t).violated());
        m.churn_rate = 0.2;
        assert!(check_death_spiral(&m, &t).violated());
    }

    #[test]
    fn oscillation_compares_first_and_last_amplitudes() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        m.cyclical_peaks = vec![10.0, 12.0, 30.0];
        m.cyclical_valleys = vec![8.0, 6.0, 2.0];
        // amplitudes 2 -> 28: widening
        assert!(check_oscillation(&m, &t).violated());

        m.cyclical_peaks = vec![10.0, 10.0, 10.0];
        m.cyclical_valleys = vec![8.0, 8.0, 8.0];
        assert!(!check_oscillation(&m, &t).violated());
    }
}
