//! Participant experience principles: engagement rhythm and morale.
//!
//! The cyclical checks read the shark-tooth pattern the observer extracts
//! from its engagement window: alternating peaks and valleys whose decay
//! ratios tell whether each cycle comes back weaker.

use super::{evidence, scaled_severity, Direction, Principle, PrincipleResult, SuggestedAction,
            Violation};
use crate::observer::EconomyMetrics;
use crate::principles::Category;
use crate::thresholds::Thresholds;
use serde_json::json;

/// Mean successive-peak ratio below which engagement counts as decaying.
const PEAK_DECAY_RATIO: f64 = 0.9;

pub fn principles() -> Vec<Principle> {
    vec![
        Principle {
            id: "P51",
            name: "Engagement peak decay",
            category: Category::ParticipantExperience,
            description: "Each engagement peak comes back lower than the last.",
            check: check_peak_decay,
        },
        Principle {
            id: "P52",
            name: "Satisfaction floor",
            category: Category::ParticipantExperience,
            description: "Average satisfaction fell through the configured floor.",
            check: check_satisfaction_floor,
        },
        Principle {
            id: "P53",
            name: "Valley deepening",
            category: Category::ParticipantExperience,
            description: "Engagement valleys are getting deeper cycle over cycle.",
            check: check_valley_deepening,
        },
        Principle {
            id: "P54",
            name: "Cycle amplitude collapse",
            category: Category::ParticipantExperience,
            description: "The engagement rhythm has flattened into noise.",
            check: check_amplitude_collapse,
        },
        Principle {
            id: "P55",
            name: "Content staleness",
            category: Category::ParticipantExperience,
            description: "Content is aging while satisfaction sags.",
            check: check_content_staleness,
        },
    ]
}

fn mean_successive_ratio(values: &[f64]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for pair in values.windows(2) {
        if pair[0] > 0.0 {
            sum += pair[1] / pair[0];
            count += 1;
        }
    }
    (count > 0).then(|| sum / count as f64)
}

fn check_peak_decay(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    let Some(ratio) = mean_successive_ratio(&m.cyclical_peaks) else {
        return PrincipleResult::Pass;
    };
    if ratio >= PEAK_DECAY_RATIO {
        return PrincipleResult::Pass;
    }
    let deficit = (PEAK_DECAY_RATIO - ratio) / PEAK_DECAY_RATIO;
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(5.0, 1.0 + deficit),
        confidence: 0.6,
        estimated_lag: Some(10),
        evidence: evidence(vec![
            ("peakDecayRatio", json!(ratio)),
            ("peaks", json!(m.cyclical_peaks.clone())),
        ]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.2,
            "each engagement peak returns lower; refresh the reward loop",
        ),
    })
}

fn check_satisfaction_floor(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.total_agents <= 0.0 || m.avg_satisfaction >= t.satisfaction_floor {
        return PrincipleResult::Pass;
    }
    let deficit = (t.satisfaction_floor - m.avg_satisfaction) / t.satisfaction_floor.max(1.0);
    PrincipleResult::Violated(Violation {
        severity: scaled_severity(5.0, 1.0 + deficit),
        confidence: 0.8,
        estimated_lag: Some(5),
        evidence: evidence(vec![
            ("avgSatisfaction", json!(m.avg_satisfaction)),
            ("floor", json!(t.satisfaction_floor)),
        ]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.25,
            "average satisfaction fell through the floor; make participation pay",
        ),
    })
}

fn check_valley_deepening(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.cyclical_valleys.len() < 3 {
        return PrincipleResult::Pass;
    }
    let first = m.cyclical_valleys[0];
    let last = *m.cyclical_valleys.last().expect("non-empty");
    if first <= 0.0 || last >= 0.8 * first {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 5.0,
        confidence: 0.55,
        estimated_lag: Some(10),
        evidence: evidence(vec![
            ("firstValley", json!(first)),
            ("lastValley", json!(last)),
        ]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.2,
            "engagement troughs are deepening; cushion the off-cycle",
        ),
    })
}

fn check_amplitude_collapse(m: &EconomyMetrics, _t: &Thresholds) -> PrincipleResult {
    if m.cyclical_peaks.len() < 2 || m.cyclical_valleys.len() < 2 {
        return PrincipleResult::Pass;
    }
    let mean_peak: f64 =
        m.cyclical_peaks.iter().sum::<f64>() / m.cyclical_peaks.len() as f64;
    let mean_valley: f64 =
        m.cyclical_valleys.iter().sum::<f64>() / m.cyclical_valleys.len() as f64;
    if mean_peak <= 0.0 {
        return PrincipleResult::Pass;
    }
    let amplitude = (mean_peak - mean_valley) / mean_peak;
    if amplitude >= 0.1 {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 3.0,
        confidence: 0.5,
        estimated_lag: Some(15),
        evidence: evidence(vec![
            ("meanPeak", json!(mean_peak)),
            ("meanValley", json!(mean_valley)),
        ]),
        suggested_action: SuggestedAction::new(
            "multiplier",
            Direction::Increase,
            0.1,
            "the engagement rhythm flattened; events no longer move the needle",
        ),
    })
}

fn check_content_staleness(m: &EconomyMetrics, t: &Thresholds) -> PrincipleResult {
    if m.total_agents <= 0.0
        || m.content_drop_age <= 0.5 * t.content_drop_age_max
        || m.avg_satisfaction >= 65.0
    {
        return PrincipleResult::Pass;
    }
    PrincipleResult::Violated(Violation {
        severity: 4.0,
        confidence: 0.6,
        estimated_lag: Some(12),
        evidence: evidence(vec![
            ("contentDropAge", json!(m.content_drop_age)),
            ("avgSatisfaction", json!(m.avg_satisfaction)),
        ]),
        suggested_action: SuggestedAction::new(
            "reward",
            Direction::Increase,
            0.15,
            "content is aging while satisfaction sags; boost interim incentives",
        ),
    })
}
