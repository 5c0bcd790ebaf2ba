//! Statistical principles: distributional shape of wealth.

use super::{evidence, scaled_severity, worst_above, Direction, Principle, PrincipleResult,
            SuggestedAction, Violation};
use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P31",
            name: "Mean/median divergence",
            category: Category::Statistical,
            description: "Mean balance pulled far from the median by a heavy tail.",
            check: check_mean_median,
        },
        Principle {
            id: "P32",
            name: "Top-decile concentration",
            category: Category::Statistical,
            description: "The top tenth of holders control too much of a currency.",
            check: check_top_decile,
        },
        Principle {
            id: "P33",
            name: "Critical inequality",
            category: Category::Statistical,
            description: "Per-currency Gini coefficient past the red line.",
            check: check_gini_red,
        },
        Principle {
            id: "P34",
            name: "Inequality warning band",
            category: Category::Statistical,
            description: "Aggregate Gini in the warning band; cheap to correct now.",
            check: check_gini_warn,
        },
        Principle {
            id: "P35",
            name: "Extreme wealth skew",
            category: Category::Statistical,
            description: "Divergence so large the median participant is economically \
                          invisible.",
            check: check_extreme_skew,
        },
    ]
}

fn check_mean_median(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let Some((currency, divergence)) = worst_above(
        &m.mean_median_divergence_by_currency,
        t.mean_median_divergence_warn,
    ) else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.65,
        estimated_lag: Some(12),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("meanMedianDivergence", json!(divergence)),
        ]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Increase,
            0.15,
            "a heavy tail distorts the mean; add progressive friction at the top",
        )
        .scoped(ParamScope::for_currency(currency)),
    })
}

fn check_top_decile(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let Some((currency, share)) =
        worst_above(&m.top10_pct_share_by_currency, t.top10_share_warn)
    else {
        return PrincipleResult::Pass;
    };
    PrincipleResult::Violated(Violation {
        severity: 5.0,
        confidence: 0.7,
        estimated_lag: Some(10),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("top10PctShare", json!(share)),
        ]),
        suggested_action: SuggestedAction::new(
            "penalty",
            Direction::Increase,
            0.2,
            "the top decile holds most of the supply; tax concentration",
        )
        .scoped(ParamScope::for_currency(currency)),
    })
}

fn check_gini_red(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    let Some((currency, gini)) = worst_above(&m.gini_coefficient_by_currency, t.gini_red) else {
        return PrincipleResult::Pass;
    };
    let excess = (gini - t.gini_red) / t.gini_red;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(6.0, 1.0 + excess),
        confidence: 0.85,
        estimated_lag: Some(8),
        evidence: evidence(vec![
            ("currency", json!(currency)),
            ("giniCoefficient", json!(gini)),
            ("threshold", json!(t.gini_red)),
        ]),
        suggested_action: SuggestedAction::new(
            "penalty",
            Direction::Increase,
            0.2,
            "inequality crossed the red line for this currency; redistribute via \
             progressive sinks",
        )
        .scoped(ParamScope::for_currency(currency)),
    })
}

fn check_gini_warn(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.gini_coefficient <= t.gini_warn || m.gini_coefficient > t.gini_red {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(15),
        evidence: evidence(vec![("giniCoefficient", json!(m.gini_coefficient))]),
        suggested_action: SuggestedAction::new(
            "penalty",
            Direction::Increase,
            0.1,
            "inequality entered the warning band; start correcting gently",
        ),
    })
}

fn check_extreme_skew(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.mean_median_divergence <= 2.0 * t.mean_median_divergence_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 6.0,
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![(
            "meanMedianDivergence",
            json!(m.mean_median_divergence),
        )]),
        suggested_action: SuggestedAction::new(
            "penalty",
            Direction::Increase,
            0.2,
            "the median participant is economically invisible; strong correction needed",
        ),
    })
}
