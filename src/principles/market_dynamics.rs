//! Market dynamics principles: the price surface and its pathologies.

use super::{evidence, scaled_severity, Direction, Principle, PrincipleResult, SuggestedAction,
            Violation};
use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P36",
            name: "Arbitrage warning",
            category: Category::MarketDynamics,
            description: "Price dispersion within a currency entered the warning band.",
            check: check_arbitrage_warning,
        },
        Principle {
            id: "P37",
            name: "Arbitrage critical",
            category: Category::MarketDynamics,
            description: "Price dispersion past critical; riskless loops are likely.",
            check: check_arbitrage_critical,
        },
        Principle {
            id: "P38",
            name: "Market illiquidity",
            category: Category::MarketDynamics,
            description: "A priced market exists but almost nothing trades.",
            check: check_illiquidity,
        },
        Principle {
            id: "P39",
            name: "Exchange-rate skew",
            category: Category::MarketDynamics,
            description: "Price levels across currencies have drifted an order of \
                          magnitude apart.",
            check: check_exchange_skew,
        },
        Principle {
            id: "P40",
            name: "Price pinning",
            category: Category::MarketDynamics,
            description: "Every price identical across a broad market; the price \
                          mechanism has stopped discovering.",
            check: check_price_pinning,
        },
    ]
}

fn check_arbitrage_warning(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let candidate = m
        .arbitrage_index_by_currency
        .iter()
        .filter(|(_, v)| **v > t.arbitrage_index_warning && **v <= t.arbitrage_index_critical)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
    let Some((currency, index)) = candidate else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.7,
        estimated_lag: Some(5),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("arbitrageIndex", json!(index)),
        ]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Increase,
            0.1,
            "price dispersion is widening; add light transaction friction",
        )
        .scoped(ParamScope::for_currency(currency.clone())),
    })
}

fn check_arbitrage_critical(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let candidate = m
        .arbitrage_index_by_currency
        .iter()
        .filter(|(_, v)| **v > t.arbitrage_index_critical)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
    let Some((currency, index)) = candidate else {
        return PrincipleResult::Pass;
    };
    let ratio = index / t.arbitrage_index_critical;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(6.0, ratio.min(1.5)),
        confidence: 0.85,
        estimated_lag: Some(3),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("arbitrageIndex", json!(index)),
        ]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Increase,
            0.25,
            "riskless price loops are live; raise transaction friction now",
        )
        .scoped(ParamScope::for_currency(currency.clone())),
    })
}

fn check_illiquidity(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.prices.len() < 2 || m.total_supply <= 0.0 || m.velocity >= t.velocity_floor {
        return PrincipleResult::Pass;
    }
    if m.velocity <= 0.0 {
        // A silent market is stagnation, not illiquidity.
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![
            ("velocity", json!(m.velocity)),
            ("pricedResources", json!(m.prices.len())),
        ]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Decrease,
            0.2,
            "prices exist but almost nothing moves; cut the cost of trading",
        ),
    })
}

fn check_exchange_skew(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.prices_by_currency.len() < 2 {
        return PrincipleResult::Pass;
    }
    let mut levels: Vec<(&String, f64)> = Vec::new();
    for (currency, by_resource) in &m.prices_by_currency {
        let positive: Vec<f64> = by_resource
            .values()
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .collect();
        if !positive.is_empty() {
            levels.push((currency, positive.iter().sum::<f64>() / positive.len() as f64));
        }
    }
    if levels.len() < 2 {
        return PrincipleResult::Pass;
    }
    let max = levels
        .iter()
        .cloned()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .expect("non-empty");
    let min = levels
        .iter()
        .cloned()
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .expect("non-empty");
    if min.1 <= 0.0 || max.1 / min.1 <= 10.0 {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 3.0,
        confidence: 0.5,
        estimated_lag: Some(15),
        evidence: evidence(vec![
            ("highCurrency", json!(max.0)),
            ("lowCurrency", json!(min.0)),
            ("ratio", json!(max.1 / min.1)),
        ]),
        suggested_action: SuggestedAction::new(
            "multiplier",
            Direction::Decrease,
            0.1,
            "cross-currency price levels diverged an order of magnitude; rebalance",
        )
        .scoped(ParamScope::for_currency(max.0.clone())),
    })
}

fn check_price_pinning(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.prices.len() < 3 || m.arbitrage_index != 0.0 {
        return PrincipleResult::Pass;
    }
    let mut values = m.prices.values().filter(|p| **p > 0.0);
    let Some(first) = values.next().copied() else {
        return PrincipleResult::Pass;
    };
    if !values.all(|p| (*p - first).abs() < f64::EPSILON) {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 2.0,
        confidence: 0.4,
        estimated_lag: Some(20),
        evidence: evidence(vec![
            ("pinnedPrice", json!(first)),
            ("pricedResources", json!(m.prices.len())),
        ]),
        suggested_action: SuggestedAction::new(
            "cap",
            Direction::Decrease,
            0.1,
            "a broad market with one identical price suggests discovery is pinned",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_and_critical_bands_are_disjoint() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        m.arbitrage_index_by_currency.insert("gold".into(), 0.4);
        assert!(check_arbitrage_warning(&m, &t).violated());
        assert!(!check_arbitrage_critical(&m, &t).violated());

        m.arbitrage_index_by_currency.insert("gold".into(), 0.8);
        assert!(!check_arbitrage_warning(&m, &t).violated());
        assert!(check_arbitrage_critical(&m, &t).violated());
    }
}
