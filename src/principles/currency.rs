//! Currency principles: per-currency flow and price-level discipline.
//!
//! These prefer the per-currency metric maps when currencies are declared and
//! scope their suggested actions to the worst offender.

use super::{evidence, scaled_severity, worst_above, worst_below, Direction, Principle,
            PrincipleResult, SuggestedAction, Violation};
use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P10",
            name: "Velocity collapse",
            category: Category::Currency,
            description: "Trading exists but is vanishingly small against supply.",
            check: check_velocity_collapse,
        },
        Principle {
            id: "P11",
            name: "Hyperinflation",
            category: Category::Currency,
            description: "Supply expanded past the critical inflation bound in one tick.",
            check: check_hyperinflation,
        },
        Principle {
            id: "P12",
            name: "Inflationary net flow",
            category: Category::Currency,
            description: "Faucets persistently exceed sinks for a currency.",
            check: check_net_flow_inflation,
        },
        Principle {
            id: "P13",
            name: "Deflationary spiral",
            category: Category::Currency,
            description: "Sinks persistently exceed faucets for a currency.",
            check: check_net_flow_deflation,
        },
        Principle {
            id: "P14",
            name: "Currency dominance",
            category: Category::Currency,
            description: "In a multi-currency economy, nearly all trade happens in one currency.",
            check: check_currency_dominance,
        },
        Principle {
            id: "P15",
            name: "Creeping inflation",
            category: Category::Currency,
            description: "Inflation sits in the warning band; early, cheap to correct.",
            check: check_creeping_inflation,
        },
    ]
}

fn check_velocity_collapse(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    // velocity == 0 means no market at all, which is a bootstrap concern,
    // not a collapse.
    let candidate = m
        .velocity_by_currency
        .iter()
        .filter(|(_, v)| **v > 0.0 && **v < t.velocity_floor)
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
    let Some((currency, velocity)) = candidate else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(8),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("velocity", json!(velocity)),
        ]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Decrease,
            0.2,
            "trade volume is negligible against supply; cut transaction friction",
        )
        .scoped(ParamScope::for_currency(currency)),
    })
}

fn check_hyperinflation(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let Some((currency, rate)) =
        worst_above(&m.inflation_rate_by_currency, t.inflation_critical)
    else {
        return PrincipleResult::Pass;
    };
    let ratio = rate / t.inflation_critical;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(8.0, ratio),
        confidence: 0.85,
        estimated_lag: Some(3),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("inflationRate", json!(rate)),
        ]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Increase,
            0.3,
            "supply is expanding explosively; raise sinks hard and fast",
        )
        .scoped(ParamScope::for_currency(currency)),
    })
}

fn check_net_flow_inflation(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let Some((currency, flow)) = worst_above(&m.net_flow_by_currency, t.net_flow_warn) else {
        return PrincipleResult::Pass;
    };
    let ratio = flow / t.net_flow_warn;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(3.0, ratio),
        confidence: 0.8,
        estimated_lag: Some(5),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("netFlow", json!(flow)),
            ("threshold", json!(t.net_flow_warn)),
        ]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Increase,
            (ratio - 1.0).min(0.5).max(0.05),
            "net flow is positive beyond tolerance; deepen sinks for this currency",
        )
        .scoped(ParamScope::for_currency(currency)),
    })
}

fn check_net_flow_deflation(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let Some((currency, flow)) = worst_below(&m.net_flow_by_currency, -t.net_flow_warn) else {
        return PrincipleResult::Pass;
    };
    let ratio = flow.abs() / t.net_flow_warn;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(3.0, ratio),
        confidence: 0.8,
        estimated_lag: Some(5),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("netFlow", json!(flow)),
            ("threshold", json!(-t.net_flow_warn)),
        ]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Decrease,
            (ratio - 1.0).min(0.5).max(0.05),
            "sinks are draining the currency faster than faucets refill it",
        )
        .scoped(ParamScope::for_currency(currency)),
    })
}

fn check_currency_dominance(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.velocity_by_currency.len() < 2 {
        return PrincipleResult::Pass;
    }
    // Trade volume per currency = velocity * supply.
    let volumes: Vec<(&String, f64)> = m
        .velocity_by_currency
        .iter()
        .map(|(c, v)| {
            let supply = m.total_supply_by_currency.get(c).copied().unwrap_or(0.0);
            (c, *v * supply)
        })
        .collect();
    let total: f64 = volumes.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return PrincipleResult::Pass;
    }
    let (currency, volume) = volumes
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .expect("non-empty volumes");
    let share = volume / total;
    if share <= 0.9 {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 3.0,
        confidence: 0.5,
        estimated_lag: Some(15),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("tradeShare", json!(share)),
        ]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Increase,
            0.1,
            "one currency carries nearly all trade; nudge flow toward the others",
        )
        .scoped(ParamScope::for_currency(currency.clone())),
    })
}

fn check_creeping_inflation(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let candidate = m
        .inflation_rate_by_currency
        .iter()
        .filter(|(_, r)| **r > t.inflation_warn && **r <= t.inflation_critical)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
    let Some((currency, rate)) = candidate else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.7,
        estimated_lag: Some(6),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("inflationRate", json!(rate)),
        ]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Increase,
            0.15,
            "inflation is in the warning band; correct before it compounds",
        )
        .scoped(ParamScope::for_currency(currency.clone())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_flow_inflation_reference_point() {
        // netFlow 15 against warn 10 must produce severity 5 and a suggested
        // cost increase scoped to the offending currency.
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        m.net_flow_by_currency.insert("gold".into(), 15.0);

        match check_net_flow_inflation(&m, &t) {
            PrincipleResult::Violated(v) => {
                assert_eq!(v.severity, 5.0);
                assert_eq!(v.evidence["currency"], "gold");
                let scope = v.suggested_action.scope.unwrap();
                assert_eq!(scope.currency.as_deref(), Some("gold"));
                assert_eq!(v.suggested_action.parameter_type, "cost");
                assert!(matches!(v.suggested_action.direction, Direction::Increase));
            }
            PrincipleResult::Pass => panic!("expected violation"),
        }
    }

    #[test]
    fn worst_currency_wins() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        m.net_flow_by_currency.insert("gold".into(), 12.0);
        m.net_flow_by_currency.insert("gems".into(), 40.0);

        match check_net_flow_inflation(&m, &t) {
            PrincipleResult::Violated(v) => assert_eq!(v.evidence["currency"], "gems"),
            PrincipleResult::Pass => panic!("expected violation"),
        }
    }

    #[test]
    fn zero_velocity_is_not_a_collapse() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        m.velocity_by_currency.insert("gold".into(), 0.0);
        assert!(!check_velocity_collapse(&m, &t).violated());

        m.velocity_by_currency.insert("gold".into(), 0.01);
        assert!(check_velocity_collapse(&m, &t).violated());
    }
}
