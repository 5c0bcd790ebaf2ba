//! Bootstrap principles: hazards specific to young economies.
//!
//! All of these stop checking once the economy is past its bootstrap window;
//! the steady-state versions live in other categories.

use super::{evidence, Direction, Principle, PrincipleResult, SuggestedAction, Violation};
use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

/// Ticks during which an economy counts as bootstrapping.
const BOOTSTRAP_WINDOW: u64 = 60;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P20",
            name: "Onboarding faucet overload",
            category: Category::Bootstrap,
            description: "Early economy is fed almost entirely by entry bonuses.",
            check: check_onboarding_overload,
        },
        Principle {
            id: "P21",
            name: "Thin market",
            category: Category::Bootstrap,
            description: "Participants exist but the market has no meaningful price surface.",
            check: check_thin_market,
        },
        Principle {
            id: "P22",
            name: "Missing early sink",
            category: Category::Bootstrap,
            description: "Currency enters the young economy with nowhere to go.",
            check: check_missing_early_sink,
        },
        Principle {
            id: "P23",
            name: "Early whale capture",
            category: Category::Bootstrap,
            description: "Wealth concentrated before the economy even matured.",
            check: check_early_whale_capture,
        },
    ]
}

fn bootstrapping(m: &EconomyMetrics) -> bool {
    m.tick <= BOOTSTRAP_WINDOW && m.total_agents > 0.0
}

fn check_onboarding_overload(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if !bootstrapping(m) || m.new_user_dependency <= t.new_user_dependency_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![("newUserDependency", json!(m.new_user_dependency))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Decrease,
            0.2,
            "entry bonuses dominate all faucets; taper onboarding grants",
        )
        .scoped(ParamScope {
            tags: vec!["onboarding".to_string()],
            ..Default::default()
        }),
    })
}

fn check_thin_market(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if !bootstrapping(m) || m.total_agents <= 5.0 || m.prices.len() >= 2 {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 3.0,
        confidence: 0.5,
        estimated_lag: Some(12),
        evidence: evidence(vec![("pricedResources", json!(m.prices.len()))]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Decrease,
            0.1,
            "almost nothing is priced yet; lower listing friction to seed the market",
        ),
    })
}

fn check_missing_early_sink(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if !bootstrapping(m)
        || m.faucet_volume <= 0.0
        || m.faucet_volume > 5.0 * t.net_flow_warn
        || m.sink_volume > 0.0
    {
        // Large-volume starvation is the steady-state principle's call.
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 3.0,
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![("faucetVolume", json!(m.faucet_volume))]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Increase,
            0.1,
            "the young economy has faucets but no sinks; introduce gentle costs now",
        ),
    })
}

fn check_early_whale_capture(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if !bootstrapping(m) || m.top10_pct_share <= t.top10_share_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.7,
        estimated_lag: Some(10),
        evidence: evidence(vec![("top10PctShare", json!(m.top10_pct_share))]),
        suggested_action: SuggestedAction::new(
            "penalty",
            Direction::Increase,
            0.15,
            "wealth locked in before maturity; add progressive holding costs early",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_checks_expire_after_window() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics {
            tick: 50,
            total_agents: 10.0,
            faucet_volume: 5.0,
            ..Default::default()
        };
        assert!(check_missing_early_sink(&m, &t).violated());

        m.tick = BOOTSTRAP_WINDOW + 1;
        assert!(!check_missing_early_sink(&m, &t).violated());
    }
}
