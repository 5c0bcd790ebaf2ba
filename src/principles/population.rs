//! Population principles: who is playing, who is leaving, who is stuck.

use super::{evidence, scaled_severity, Direction, Principle, PrincipleResult, SuggestedAction,
            Violation};
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P16",
            name: "Churn spike",
            category: Category::Population,
            description: "Participants are leaving faster than tolerance.",
            check: check_churn_spike,
        },
        Principle {
            id: "P17",
            name: "Role imbalance",
            category: Category::Population,
            description: "One role dominates the population in a multi-role economy.",
            check: check_role_imbalance,
        },
        Principle {
            id: "P18",
            name: "Population stagnation",
            category: Category::Population,
            description: "No entries, no churn, no trade: the economy has frozen.",
            check: check_stagnation,
        },
        Principle {
            id: "P19",
            name: "Blocked agents",
            category: Category::Population,
            description: "Too many agents hold nothing and cannot participate.",
            check: check_blocked_agents,
        },
    ]
}

fn check_churn_spike(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.churn_rate <= t.churn_warn {
        return PrincipleResult::Pass;
    }
    let ratio = m.churn_rate / t.churn_warn;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(4.0, ratio.min(2.5)),
        confidence: 0.75,
        estimated_lag: Some(8),
        evidence: evidence(vec![("churnRate", json!(m.churn_rate))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.2,
            "churn is above tolerance; sweeten retention rewards",
        ),
    })
}

fn check_role_imbalance(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.role_shares.len() < 2 {
        return PrincipleResult::Pass;
    }
    let (role, share) = m
        .role_shares
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, v)| (k.clone(), *v))
        .unwrap_or_default();
    if share <= 0.8 {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(15),
        evidence: evidence(vec![("role", json!(role)), ("share", json!(share))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.15,
            "one role crowds out the rest; boost rewards for the minority roles",
        ),
    })
}

fn check_stagnation(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let frozen = m.total_agents > 0.0
        && m.velocity < t.velocity_floor
        && m.churn_rate == 0.0
        && m.new_user_dependency == 0.0
        && m.faucet_volume == 0.0
        && m.sink_volume == 0.0;
    if !frozen {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 2.0,
        confidence: 0.4,
        estimated_lag: Some(20),
        evidence: evidence(vec![("totalAgents", json!(m.total_agents))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.1,
            "the economy shows no movement at all; seed activity",
        ),
    })
}

fn check_blocked_agents(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.total_agents <= 0.0 {
        return PrincipleResult::Pass;
    }
    let share = m.blocked_agent_count / m.total_agents;
    if share <= t.blocked_agent_percent_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 6.0,
        confidence: 0.8,
        estimated_lag: Some(4),
        evidence: evidence(vec![
            ("blockedAgentCount", json!(m.blocked_agent_count)),
            ("share", json!(share)),
        ]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.2,
            "a meaningful share of agents hold nothing; open a relief faucet",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stagnation_needs_total_silence() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics {
            total_agents: 10.0,
            ..Default::default()
        };
        assert!(check_stagnation(&m, &t).violated());
        m.faucet_volume = 1.0;
        assert!(!check_stagnation(&m, &t).violated());
    }

    #[test]
    fn blocked_agents_use_population_share() {
        let t = Thresholds::default();
        let m = EconomyMetrics {
            total_agents: 100.0,
            blocked_agent_count: 5.0,
            ..Default::default()
        };
        assert!(!check_blocked_agents(&m, &t).violated());

        let m = EconomyMetrics {
            total_agents: 100.0,
            blocked_agent_count: 30.0,
            ..Default::default()
        };
        assert!(check_blocked_agents(&m, &t).violated());
    }
}
