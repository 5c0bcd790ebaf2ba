//! Open economy principles: flows across the economy's boundary - entrants,
//! leavers and the value they carry.

use super::{evidence, Direction, Principle, PrincipleResult, SuggestedAction, Violation};
use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

/// Past this tick the economy no longer counts as young; sustained entry
/// dependence becomes structural.
const MATURITY_TICK: u64 = 100;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P56",
            name: "New-user dependency",
            category: Category::OpenEconomy,
            description: "A mature economy still runs on onboarding inflows.",
            check: check_new_user_dependency,
        },
        Principle {
            id: "P57",
            name: "Replacement rate",
            category: Category::OpenEconomy,
            description: "Participants leave without comparable inflow replacing them.",
            check: check_replacement_rate,
        },
        Principle {
            id: "P58",
            name: "Churn wealth leak",
            category: Category::OpenEconomy,
            description: "Churn while wealth is concentrated: leavers take the treasury \
                          with them.",
            check: check_churn_wealth_leak,
        },
    ]
}

fn check_new_user_dependency(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.tick <= MATURITY_TICK || m.new_user_dependency <= t.new_user_dependency_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 6.0,
        confidence: 0.7,
        estimated_lag: Some(10),
        evidence: evidence(vec![("newUserDependency", json!(m.new_user_dependency))]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Decrease,
            0.2,
            "the mature economy still depends on entry bonuses; wean it off",
        )
        .scoped(ParamScope {
            tags: vec!["onboarding".to_string()],
            ..Default::default()
        }),
    })
}

fn check_replacement_rate(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let churn_limit = t.churn_warn * t.replacement_rate_multiplier;
    if m.churn_rate <= churn_limit || m.new_user_dependency >= 0.1 {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 5.0,
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![
            ("churnRate", json!(m.churn_rate)),
            ("newUserDependency", json!(m.new_user_dependency)),
        ]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.2,
            "departures are not being replaced by new entrants; invest in onboarding",
        )
        .scoped(ParamScope {
            tags: vec!["onboarding".to_string()],
            ..Default::default()
        }),
    })
}

fn check_churn_wealth_leak(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.churn_rate <= 0.0 || m.top10_pct_share <= t.top10_share_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.5,
        estimated_lag: Some(12),
        evidence: evidence(vec![
            ("churnRate", json!(m.churn_rate)),
            ("top10PctShare", json!(m.top10_pct_share)),
        ]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Increase,
            0.1,
            "concentrated wealth is walking out the door; meter large exits",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_only_matters_after_maturity() {
        let t = Thresholds::default();
        let mut m = EconomyMetrics {
            tick: 50,
            new_user_dependency: 0.9,
            ..Default::default()
        };
        assert!(!check_new_user_dependency(&m, &t).violated());
        m.tick = 150;
        assert!(check_new_user_dependency(&m, &t).violated());
    }
}
