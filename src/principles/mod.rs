//! Principle framework.
//! Mission: Sixty small, pure, deterministic economic invariants
//!
//! A principle is a value-type record holding its textual identity plus a
//! plain function pointer; the engine registers the built-in set once at
//! construction and the list is append-only afterwards.

mod bootstrap;
mod currency;
mod feedback;
mod incentive;
mod market_dynamics;
mod measurement;
mod open_economy;
mod operations;
mod participant_experience;
mod population;
mod regulator;
mod resource;
mod statistical;
mod supply_chain;
mod system_dynamics;

use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::thresholds::Thresholds;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SupplyChain,
    Incentive,
    Population,
    Currency,
    Bootstrap,
    Feedback,
    Regulator,
    MarketDynamics,
    Measurement,
    Statistical,
    SystemDynamics,
    Resource,
    ParticipantExperience,
    OpenEconomy,
    Operations,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SupplyChain => "supply_chain",
            Category::Incentive => "incentive",
            Category::Population => "population",
            Category::Currency => "currency",
            Category::Bootstrap => "bootstrap",
            Category::Feedback => "feedback",
            Category::Regulator => "regulator",
            Category::MarketDynamics => "market_dynamics",
            Category::Measurement => "measurement",
            Category::Statistical => "statistical",
            Category::SystemDynamics => "system_dynamics",
            Category::Resource => "resource",
            Category::ParticipantExperience => "participant_experience",
            Category::OpenEconomy => "open_economy",
            Category::Operations => "operations",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

/// Corrective action proposed by a violated principle. The planner resolves
/// `parameter_type` + `scope` to a concrete key and records it in
/// `resolved_parameter`; nothing else ever mutates this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedAction {
    /// Canonical field; the legacy `parameter` wire name is accepted too.
    #[serde(alias = "parameter")]
    pub parameter_type: String,
    pub direction: Direction,
    /// Relative adjustment in (0, 1].
    pub magnitude: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ParamScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_parameter: Option<String>,
}

impl SuggestedAction {
    pub fn new(
        parameter_type: &str,
        direction: Direction,
        magnitude: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            parameter_type: parameter_type.to_string(),
            direction,
            magnitude,
            reasoning: reasoning.into(),
            scope: None,
            resolved_parameter: None,
        }
    }

    pub fn scoped(mut self, scope: ParamScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

pub type Evidence = HashMap<String, serde_json::Value>;

/// A confirmed violation with everything downstream stages need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Clamped into [1, 10] by the diagnoser.
    pub severity: f64,
    /// Clamped into [0, 1] by the diagnoser.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_lag: Option<u64>,
    pub evidence: Evidence,
    pub suggested_action: SuggestedAction,
}

#[derive(Debug, Clone)]
pub enum PrincipleResult {
    Pass,
    Violated(Violation),
}

impl PrincipleResult {
    pub fn violated(&self) -> bool {
        matches!(self, PrincipleResult::Violated(_))
    }
}

pub type CheckFn = fn(&EconomyMetrics, &Thresholds) -> PrincipleResult;

/// One registered principle. `check` must be deterministic and side-effect
/// free; a panicking check is isolated by the diagnoser.
#[derive(Clone)]
pub struct Principle {
    pub id: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub description: &'static str,
    pub check: CheckFn,
}

impl std::fmt::Debug for Principle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

/// The full built-in set, in id order.
pub fn builtin_principles() -> Vec<Principle> {
    let mut all = Vec::with_capacity(60);
    all.extend(supply_chain::principles());
    all.extend(incentive::principles());
    all.extend(currency::principles());
    all.extend(population::principles());
    all.extend(bootstrap::principles());
    all.extend(feedback::principles());
    all.extend(regulator::principles());
    all.extend(statistical::principles());
    all.extend(market_dynamics::principles());
    all.extend(measurement::principles());
    all.extend(system_dynamics::principles());
    all.extend(resource::principles());
    all.extend(participant_experience::principles());
    all.extend(open_economy::principles());
    all.extend(operations::principles());
    all
}

// ---- helpers shared by the category modules ----

pub(crate) fn evidence(pairs: Vec<(&str, serde_json::Value)>) -> Evidence {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Ceil-scaled severity: `ceil(base * ratio)` clamped into [1, 10]. A ratio
/// of 1.0 (exactly at threshold) lands at `base`.
pub(crate) fn scaled_severity(base: f64, ratio: f64) -> f64 {
    (base * ratio).ceil().clamp(1.0, 10.0)
}

/// Worst per-currency offender strictly above `threshold`.
pub(crate) fn worst_above<'a>(
    map: &'a HashMap<String, f64>,
    threshold: f64,
) -> Option<(&'a str, f64)> {
    map.iter()
        .filter(|(_, v)| v.is_finite() && **v > threshold)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, v)| (k.as_str(), *v))
}

/// Worst per-currency offender strictly below `threshold`.
pub(crate) fn worst_below<'a>(
    map: &'a HashMap<String, f64>,
    threshold: f64,
) -> Option<(&'a str, f64)> {
    map.iter()
        .filter(|(_, v)| v.is_finite() && **v < threshold)
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, v)| (k.as_str(), *v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_has_sixty_unique_ids() {
        let all = builtin_principles();
        assert_eq!(all.len(), 60);
        let ids: std::collections::HashSet<&str> = all.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 60);
        for (i, p) in all.iter().enumerate() {
            assert_eq!(p.id, format!("P{}", i + 1));
        }
    }

    #[test]
    fn category_sizes_are_within_contract() {
        let all = builtin_principles();
        let mut counts: HashMap<Category, usize> = HashMap::new();
        for p in &all {
            *counts.entry(p.category).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), 15);
        for (category, count) in counts {
            assert!(
                (2..=8).contains(&count),
                "{:?} has {} members",
                category,
                count
            );
        }
    }

    #[test]
    fn scaled_severity_reproduces_reference_points() {
        // net flow 15 vs warn 10: ratio 1.5, base 3 -> severity 5
        assert_eq!(scaled_severity(3.0, 1.5), 5.0);
        assert_eq!(scaled_severity(3.0, 100.0), 10.0);
        assert_eq!(scaled_severity(3.0, 0.01), 1.0);
    }

    #[test]
    fn legacy_parameter_field_is_canonicalized() {
        let json = r#"{
            "parameter": "cost",
            "direction": "increase",
            "magnitude": 0.2,
            "reasoning": "legacy caller"
        }"#;
        let action: SuggestedAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.parameter_type, "cost");
    }

    #[test]
    fn all_checks_run_clean_on_an_empty_economy() {
        let metrics = EconomyMetrics {
            // The observer reports NaN when completion is unmeasured.
            event_completion_rate: f64::NAN,
            ..Default::default()
        };
        let thresholds = Thresholds::default();
        for p in builtin_principles() {
            // Empty economies must not violate anything.
            let result = (p.check)(&metrics, &thresholds);
            assert!(!result.violated(), "{} fired on an empty economy", p.id);
        }
    }
}
