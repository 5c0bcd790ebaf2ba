//! Resource principles: physical goods behind the currencies.

use super::{evidence, Direction, Principle, PrincipleResult, SuggestedAction, Violation};
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P48",
            name: "Resource price collapse",
            category: Category::Resource,
            description: "A resource trades at a small fraction of the general price level.",
            check: check_price_collapse,
        },
        Principle {
            id: "P49",
            name: "Resource glut",
            category: Category::Resource,
            description: "One resource is stockpiled an order of magnitude past the rest.",
            check: check_glut,
        },
        Principle {
            id: "P50",
            name: "Resource scarcity",
            category: Category::Resource,
            description: "A priced resource has no supply anywhere in inventories.",
            check: check_scarcity,
        },
    ]
}

fn check_price_collapse(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.price_index <= 0.0 || m.prices.len() < 2 {
        return PrincipleResult::Pass;
    }
    let collapsed = m
        .prices
        .iter()
        .filter(|(_, p)| **p > 0.0 && **p < 0.1 * m.price_index)
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
    let Some((resource, price)) = collapsed else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(8),
        evidence: evidence(vec![
            ("resource", json!(resource)),
            ("price", json!(price)),
            ("priceIndex", json!(m.price_index)),
        ]),
        suggested_action: SuggestedAction::new(
            "yield",
            Direction::Decrease,
            0.2,
            "the resource's price collapsed against the index; throttle its production",
        ),
    })
}

fn check_glut(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.supply_by_resource.len() < 2 {
        return PrincipleResult::Pass;
    }
    let mut supplies: Vec<(&String, f64)> = m
        .supply_by_resource
        .iter()
        .map(|(k, v)| (k, *v))
        .collect();
    supplies.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let (top_resource, top_supply) = supplies[0];
    let median_supply = supplies[supplies.len() / 2].1;
    if median_supply <= 0.0 || top_supply <= 10.0 * median_supply {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 3.0,
        confidence: 0.55,
        estimated_lag: Some(12),
        evidence: evidence(vec![
            ("resource", json!(top_resource)),
            ("supply", json!(top_supply)),
            ("medianSupply", json!(median_supply)),
        ]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Increase,
            0.15,
            "one resource is stockpiled far past the rest; raise its production cost",
        ),
    })
}

fn check_scarcity(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    let scarce = m.prices.iter().find(|(resource, price)| {
        **price > 0.0
            && m.supply_by_resource
                .get(*resource)
                .copied()
                .unwrap_or(0.0)
                <= 0.0
    });
    let Some((resource, price)) = scarce else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(8),
        evidence: evidence(vec![
            ("resource", json!(resource)),
            ("price", json!(price)),
        ]),
        suggested_action: SuggestedAction::new(
            "yield",
            Direction::Increase,
            0.2,
            "a priced resource has no stock anywhere; raise its production yield",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scarcity_requires_price_without_supply() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics::default();
        m.prices.insert("iron".into(), 12.0);
        assert!(check_scarcity(&m, &t).violated());

        m.supply_by_resource.insert("iron".into(), 100.0);
        assert!(!check_scarcity(&m, &t).violated());
    }
}
