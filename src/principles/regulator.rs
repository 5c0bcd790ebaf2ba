//! Regulator principles: named currency pools (prize pots, reserves, house
//! takes) and the rules that keep them honest.

use super::{evidence, scaled_severity, Direction, Principle, PrincipleResult, SuggestedAction,
            Violation};
use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

/// Pool names treated as operator-held.
const OPERATOR_POOLS: [&str; 4] = ["operator", "house", "treasury", "rake"];

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P28",
            name: "Pool cap exceeded",
            category: Category::Regulator,
            description: "Pooled currency exceeds its allowed share of total supply.",
            check: check_pool_cap,
        },
        Principle {
            id: "P29",
            name: "Operator pool share",
            category: Category::Regulator,
            description: "Operator-held pools take too large a share of all pooled value.",
            check: check_operator_share,
        },
        Principle {
            id: "P30",
            name: "Pool win-rate skew",
            category: Category::Regulator,
            description: "Host-reported pool win rate favors the pool beyond tolerance.",
            check: check_pool_win_rate,
        },
    ]
}

fn check_pool_cap(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    for (currency, pools) in &m.pool_sizes_by_currency {
        let pooled: f64 = pools.values().filter(|v| v.is_finite()).sum();
        let supply = m
            .total_supply_by_currency
            .get(currency)
            .copied()
            .unwrap_or(0.0);
        let circulating = supply + pooled;
        if circulating <= 0.0 {
            continue;
        }
        let share = pooled / circulating;
        if share > t.pool_cap_percent {
            let ratio = share / t.pool_cap_percent;
            return PrincipleResult::Violated(Violation {
                severity: scaled_severity(4.0, ratio.min(2.0)),
                confidence: 0.75,
                estimated_lag: Some(6),
                evidence: evidence(vec![
                    ("currency", json!(currency)),
                    ("pooledShare", json!(share)),
                ]),
                suggested_action: SuggestedAction::new(
                    "fee",
                    Direction::Decrease,
                    0.2,
                    "pools are swallowing circulating supply; slow the intake",
                )
                .scoped(ParamScope::for_currency(currency.clone())),
            });
        }
    }
    PrincipleResult::Pass
}

fn check_operator_share(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    for (currency, pools) in &m.pool_sizes_by_currency {
        let total: f64 = pools.values().filter(|v| v.is_finite()).sum();
        if total <= 0.0 {
            continue;
        }
        let operator: f64 = pools
            .iter()
            .filter(|(name, _)| {
                let lower = name.to_ascii_lowercase();
                OPERATOR_POOLS.iter().any(|p| lower.contains(*p))
            })
            .map(|(_, v)| v)
            .filter(|v| v.is_finite())
            .sum();
        let share = operator / total;
        if share > t.pool_operator_share {
            return PrincipleResult::Violated(Violation {
                severity: 5.0,
                confidence: 0.7,
                estimated_lag: Some(8),
                evidence: evidence(vec![
                    ("currency", json!(currency)),
                    ("operatorShare", json!(share)),
                ]),
                suggested_action: SuggestedAction::new(
                    "fee",
                    Direction::Decrease,
                    0.2,
                    "the operator's cut of pooled value is too large; reduce the rake",
                )
                .scoped(ParamScope::for_currency(currency.clone())),
            });
        }
    }
    PrincipleResult::Pass
}

fn check_pool_win_rate(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let Some(win_rate) = m.custom.get("poolWinRate").copied() else {
        return PrincipleResult::Pass;
    };
    if !win_rate.is_finite() || win_rate <= t.pool_win_rate {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![("poolWinRate", json!(win_rate))]),
        suggested_action: SuggestedAction::new(
            "multiplier",
            Direction::Decrease,
            0.15,
            "the pool wins too often against participants; rebalance the odds",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn pool_cap_uses_share_of_circulating() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        m.total_supply_by_currency.insert("gold".into(), 700.0);
        let mut pools = HashMap::new();
        pools.insert("prize".to_string(), 300.0);
        m.pool_sizes_by_currency.insert("gold".into(), pools);
        // 300 / 1000 = 0.30 > 0.25
        match check_pool_cap(&m, &t) {
            PrincipleResult::Violated(v) => {
                assert_eq!(v.evidence["currency"], "gold");
            }
            PrincipleResult::Pass => panic!("expected violation"),
        }
    }

    #[test]
    fn operator_share_matches_known_pool_names() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        let mut pools = HashMap::new();
        pools.insert("houseTake".to_string(), 40.0);
        pools.insert("prize".to_string(), 60.0);
        m.pool_sizes_by_currency.insert("gold".into(), pools);
        assert!(check_operator_share(&m, &t).violated());
    }
}
