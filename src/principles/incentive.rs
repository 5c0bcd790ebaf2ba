//! Incentive principles: whether the reward structure still points at the
//! behavior the economy wants.

use super::{evidence, scaled_severity, Direction, Principle, PrincipleResult, SuggestedAction,
            Violation};
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P6",
            name: "Anchor ratio drift",
            category: Category::Incentive,
            description: "The effort-to-value anchor has drifted from baseline, \
                          a leading indicator of inflation or deflation.",
            check: check_anchor_drift,
        },
        Principle {
            id: "P7",
            name: "Extraction imbalance",
            category: Category::Incentive,
            description: "Trade value flows disproportionately to top holders.",
            check: check_extraction,
        },
        Principle {
            id: "P8",
            name: "Gift/trade anomaly",
            category: Category::Incentive,
            description: "Unpriced transfers rival priced trades; classic \
                          real-money-trading signature.",
            check: check_gift_ratio,
        },
        Principle {
            id: "P9",
            name: "Disposal over trade",
            category: Category::Incentive,
            description: "Participants destroy value rather than trade it.",
            check: check_disposal_ratio,
        },
    ]
}

fn check_anchor_drift(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.anchor_ratio_drift <= t.anchor_drift_warn {
        return PrincipleResult::Pass;
    }
    let ratio = m.anchor_ratio_drift / t.anchor_drift_warn;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(3.0, ratio),
        confidence: 0.6,
        estimated_lag: Some(8),
        evidence: evidence(vec![("anchorRatioDrift", json!(m.anchor_ratio_drift))]),
        suggested_action: SuggestedAction::new(
            "cost",
            Direction::Increase,
            m.anchor_ratio_drift.min(0.3),
            "price level drifted from its anchor; tighten sink-side pricing",
        ),
    })
}

fn check_extraction(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.extraction_ratio <= t.extraction_ratio_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 5.0,
        confidence: 0.7,
        estimated_lag: Some(6),
        evidence: evidence(vec![("extractionRatio", json!(m.extraction_ratio))]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Increase,
            0.2,
            "top holders capture most trade value; add progressive trade friction",
        ),
    })
}

fn check_gift_ratio(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.gift_trade_ratio <= t.gift_trade_ratio_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        // Gifting between friends is legitimate; keep confidence modest.
        confidence: 0.55,
        estimated_lag: Some(10),
        evidence: evidence(vec![("giftTradeRatio", json!(m.gift_trade_ratio))]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Increase,
            0.15,
            "unpriced transfers rival the market; meter large gifts",
        ),
    })
}

fn check_disposal_ratio(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.disposal_trade_ratio <= t.disposal_trade_ratio_warn {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 3.0,
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![("disposalTradeRatio", json!(m.disposal_trade_ratio))]),
        suggested_action: SuggestedAction::new(
            "fee",
            Direction::Decrease,
            0.15,
            "participants destroy value instead of trading it; lower market friction",
        ),
    })
}
