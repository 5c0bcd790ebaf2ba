//! Supply chain principles: the plumbing between faucets, sinks, production
//! and storage.

use super::{evidence, scaled_severity, Direction, Principle, PrincipleResult, SuggestedAction,
            Violation};
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P1",
            name: "Faucet/sink imbalance",
            category: Category::SupplyChain,
            description: "Faucet volume dwarfs sink volume even though sinks exist; \
                          supply will inflate until sinks catch up.",
            check: check_faucet_sink_imbalance,
        },
        Principle {
            id: "P2",
            name: "Sink starvation",
            category: Category::SupplyChain,
            description: "Large faucet volume with no sinks at all this tick.",
            check: check_sink_starvation,
        },
        Principle {
            id: "P3",
            name: "Production stall",
            category: Category::SupplyChain,
            description: "Consumption continues but production has collapsed.",
            check: check_production_stall,
        },
        Principle {
            id: "P4",
            name: "Capacity saturation",
            category: Category::SupplyChain,
            description: "Reported capacity usage is near its ceiling.",
            check: check_capacity_saturation,
        },
        Principle {
            id: "P5",
            name: "Resource hoarding",
            category: Category::SupplyChain,
            description: "A single resource dominates all inventories.",
            check: check_resource_hoarding,
        },
    ]
}

fn check_faucet_sink_imbalance(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.sink_volume <= 0.0 || m.tap_sink_ratio <= t.tap_sink_ratio_warn {
        return PrincipleResult::Pass;
    }
    let ratio = m.tap_sink_ratio / t.tap_sink_ratio_warn;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(3.0, ratio),
        confidence: 0.7,
        estimated_lag: Some(5),
        evidence: evidence(vec![
            ("tapSinkRatio", json!(m.tap_sink_ratio)),
            ("faucetVolume", json!(m.faucet_volume)),
            ("sinkVolume", json!(m.sink_volume)),
        ]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Increase,
            (0.1 * ratio).min(0.5),
            "faucets outpace sinks; raise sink-side costs to drain the surplus",
        ),
    })
}

fn check_sink_starvation(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.sink_volume > 0.0 || m.faucet_volume <= 5.0 * t.net_flow_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.65,
        estimated_lag: Some(8),
        evidence: evidence(vec![("faucetVolume", json!(m.faucet_volume))]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Increase,
            0.2,
            "currency enters but nothing destroys it; introduce meaningful costs",
        ),
    })
}

fn check_production_stall(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.sink_volume <= 0.0 || m.production_index >= t.production_index_floor {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 5.0,
        confidence: 0.7,
        estimated_lag: Some(6),
        evidence: evidence(vec![("productionIndex", json!(m.production_index))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.25,
            "consumption is running ahead of production; strengthen production incentives",
        ),
    })
}

fn check_capacity_saturation(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.capacity_usage <= t.capacity_usage_critical {
        return PrincipleResult::Pass;
    }
    let ratio = m.capacity_usage / t.capacity_usage_critical;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(5.0, ratio),
        confidence: 0.75,
        estimated_lag: Some(3),
        evidence: evidence(vec![("capacityUsage", json!(m.capacity_usage))]),
        suggested_action: SuggestedAction::new(
            "cap",
            Direction::Increase,
            0.2,
            "capacity is nearly exhausted; raise the ceiling before queues form",
        ),
    })
}

fn check_resource_hoarding(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.supply_by_resource.len() < 2 {
        return PrincipleResult::Pass;
    }
    let total: f64 = m.supply_by_resource.values().sum();
    if total <= 0.0 {
        return PrincipleResult::Pass;
    }
    let (resource, supply) = m
        .supply_by_resource
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, v)| (k.clone(), *v))
        .unwrap_or_default();
    let share = supply / total;
    if share <= 0.8 {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![
            ("resource", json!(resource)),
            ("share", json!(share)),
        ]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Increase,
            0.15,
            "one resource dominates inventories; add carrying friction",
        ),
    })
}
