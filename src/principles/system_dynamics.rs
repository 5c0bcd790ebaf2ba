//! System dynamics principles: how flow distributes across the host's named
//! gameplay/market systems.

use super::{evidence, Direction, Principle, PrincipleResult, SuggestedAction, Violation};
use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P44",
            name: "System flow concentration",
            category: Category::SystemDynamics,
            description: "One system accounts for nearly all currency flow.",
            check: check_flow_concentration,
        },
        Principle {
            id: "P45",
            name: "Participation collapse",
            category: Category::SystemDynamics,
            description: "A busy system is carried by a handful of participants.",
            check: check_participation_collapse,
        },
        Principle {
            id: "P46",
            name: "Inactive system",
            category: Category::SystemDynamics,
            description: "A declared system saw no activity at all this tick.",
            check: check_inactive_system,
        },
        Principle {
            id: "P47",
            name: "Source concentration",
            category: Category::SystemDynamics,
            description: "One source or sink dominates all attributed flow.",
            check: check_source_concentration,
        },
    ]
}

fn check_flow_concentration(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.flow_by_system.len() < 2 {
        return PrincipleResult::Pass;
    }
    let total: f64 = m.flow_by_system.values().map(|v| v.abs()).sum();
    if total <= 0.0 {
        return PrincipleResult::Pass;
    }
    let (system, flow) = m
        .flow_by_system
        .iter()
        .max_by(|a, b| {
            a.1.abs()
                .partial_cmp(&b.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(k, v)| (k.clone(), *v))
        .unwrap_or_default();
    let share = flow.abs() / total;
    if share <= 0.8 {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![("system", json!(system)), ("share", json!(share))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Decrease,
            0.15,
            "one system dominates all flow; rebalance incentives across systems",
        )
        .scoped(ParamScope::for_system(system)),
    })
}

fn check_participation_collapse(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.total_agents < 20.0 {
        return PrincipleResult::Pass;
    }
    let candidate = m.participants_by_system.iter().find(|(system, count)| {
        **count > 0.0
            && **count < 3.0
            && m.activity_by_system.get(*system).copied().unwrap_or(0.0) > 0.0
    });
    let Some((system, count)) = candidate else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: 3.0,
        confidence: 0.5,
        estimated_lag: Some(12),
        evidence: evidence(vec![
            ("system", json!(system)),
            ("participants", json!(count)),
        ]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.2,
            "a live system is carried by a couple of farmers; widen its appeal",
        )
        .scoped(ParamScope::for_system(system.clone())),
    })
}

fn check_inactive_system(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.systems.is_empty() || m.total_agents <= 0.0 {
        return PrincipleResult::Pass;
    }
    let dead = m
        .systems
        .iter()
        .find(|s| m.activity_by_system.get(*s).copied().unwrap_or(0.0) == 0.0);
    let Some(system) = dead else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: 2.0,
        confidence: 0.5,
        estimated_lag: Some(15),
        evidence: evidence(vec![("system", json!(system))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.15,
            "a declared system is completely idle; make it worth visiting",
        )
        .scoped(ParamScope::for_system(system.clone())),
    })
}

fn check_source_concentration(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.flow_by_source.len() < 2 {
        return PrincipleResult::Pass;
    }
    let total: f64 = m.flow_by_source.values().map(|v| v.abs()).sum();
    if total <= 0.0 {
        return PrincipleResult::Pass;
    }
    let (source, flow) = m
        .flow_by_source
        .iter()
        .max_by(|a, b| {
            a.1.abs()
                .partial_cmp(&b.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(k, v)| (k.clone(), *v))
        .unwrap_or_default();
    let share = flow.abs() / total;
    if share <= 0.8 {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 3.0,
        confidence: 0.55,
        estimated_lag: Some(10),
        evidence: evidence(vec![("source", json!(source)), ("share", json!(share))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Decrease,
            0.15,
            "one faucet or sink carries nearly all attributed flow; diversify",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_concentration_requires_dominant_share() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        m.flow_by_system.insert("crafting".into(), 50.0);
        m.flow_by_system.insert("fishing".into(), 50.0);
        assert!(!check_flow_concentration(&m, &t).violated());

        m.flow_by_system.insert("crafting".into(), 900.0);
        match check_flow_concentration(&m, &t) {
            PrincipleResult::Violated(v) => {
                assert_eq!(v.evidence["system"], "crafting");
                let scope = v.suggested_action.scope.unwrap();
                assert_eq!(scope.system.as_deref(), Some("crafting"));
            }
            PrincipleResult::Pass => panic!("expected violation"),
        }
    }
}
