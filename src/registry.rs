//! Parameter registry.
//! Mission: Turn a principle's abstract "parameterType + scope" into the one
//! concrete key the host adapter understands

use crate::models::ParamScope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// How changing a parameter moves currency through the economy. Drives the
/// simulator's projection model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowImpact {
    Sink,
    Faucet,
    Neutral,
    Mixed,
    Friction,
    Redistribution,
}

impl FlowImpact {
    /// Fallback inference from the abstract parameter type. Production
    /// deployments should register explicit impacts instead.
    pub fn infer(parameter_type: &str) -> FlowImpact {
        let t = parameter_type.to_ascii_lowercase();
        if t.contains("cost") || t.contains("fee") || t.contains("penalty") {
            FlowImpact::Sink
        } else if t.contains("reward") {
            FlowImpact::Faucet
        } else if t.contains("yield") {
            FlowImpact::Mixed
        } else {
            // cap, multiplier, anything unknown
            FlowImpact::Neutral
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredParameter {
    pub key: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub flow_impact: Option<FlowImpact>,
    #[serde(default)]
    pub scope: Option<ParamScope>,
    #[serde(default)]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl RegisteredParameter {
    pub fn new(key: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            param_type: param_type.into(),
            flow_impact: None,
            scope: None,
            current_value: None,
            priority: 0,
            description: None,
            label: None,
        }
    }

    pub fn with_flow_impact(mut self, impact: FlowImpact) -> Self {
        self.flow_impact = Some(impact);
        self
    }

    pub fn with_scope(mut self, scope: ParamScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_current_value(mut self, value: f64) -> Self {
        self.current_value = Some(value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

/// Registration-ordered parameter registry. Resolution is deterministic given
/// registration order.
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    params: Vec<RegisteredParameter>,
    by_key: HashMap<String, usize>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Register a parameter. Re-registering an existing key replaces it in
    /// place, keeping its original position in the order.
    pub fn register(&mut self, param: RegisteredParameter) {
        if let Some(&idx) = self.by_key.get(&param.key) {
            self.params[idx] = param;
            return;
        }
        self.by_key.insert(param.key.clone(), self.params.len());
        self.params.push(param);
    }

    pub fn get(&self, key: &str) -> Option<&RegisteredParameter> {
        self.by_key.get(key).map(|&idx| &self.params[idx])
    }

    pub fn get_flow_impact(&self, key: &str) -> Option<FlowImpact> {
        self.get(key).and_then(|p| p.flow_impact)
    }

    pub fn current_value(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|p| p.current_value)
    }

    pub fn set_current_value(&mut self, key: &str, value: f64) {
        if let Some(&idx) = self.by_key.get(key) {
            self.params[idx].current_value = Some(value);
        }
    }

    /// Resolve a parameter type and optional scope to the best-matching
    /// registered parameter: highest specificity score, ties broken by
    /// priority, then registration order.
    pub fn resolve(
        &self,
        param_type: &str,
        scope: Option<&ParamScope>,
    ) -> Option<&RegisteredParameter> {
        let mut best: Option<(i64, i32, usize)> = None;
        for (idx, candidate) in self.params.iter().enumerate() {
            if candidate.param_type != param_type {
                continue;
            }
            let Some(score) = specificity(candidate.scope.as_ref(), scope) else {
                continue; // disqualified
            };
            let ranking = (score, candidate.priority, idx);
            let better = match best {
                None => true,
                // Earlier registration wins ties, so strictly-greater only.
                Some((s, p, _)) => score > s || (score == s && candidate.priority > p),
            };
            if better {
                best = Some(ranking);
            }
        }
        let (_, _, idx) = best?;
        debug!(
            param_type,
            key = %self.params[idx].key,
            "resolved parameter"
        );
        Some(&self.params[idx])
    }

    /// Configuration sanity report: ambiguous unscoped types are errors,
    /// undeclared flow impacts are warnings.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let mut unscoped_by_type: HashMap<&str, Vec<&str>> = HashMap::new();
        for p in &self.params {
            let unscoped = p.scope.as_ref().map_or(true, |s| s.is_empty());
            if unscoped {
                unscoped_by_type
                    .entry(p.param_type.as_str())
                    .or_default()
                    .push(p.key.as_str());
            }
            if p.flow_impact.is_none() {
                issues.push(ValidationIssue {
                    severity: IssueSeverity::Warning,
                    message: format!(
                        "parameter '{}' has no declared flowImpact; simulator will infer from type '{}'",
                        p.key, p.param_type
                    ),
                });
            }
        }
        for (param_type, keys) in unscoped_by_type {
            if keys.len() > 1 {
                issues.push(ValidationIssue {
                    severity: IssueSeverity::Error,
                    message: format!(
                        "ambiguous: multiple unscoped parameters share type '{}': {}",
                        param_type,
                        keys.join(", ")
                    ),
                });
            }
        }
        issues
    }

    pub fn snapshot(&self) -> Vec<RegisteredParameter> {
        self.params.clone()
    }
}

/// Specificity score for a candidate's scope against a query scope. `None`
/// means disqualified.
fn specificity(candidate: Option<&ParamScope>, query: Option<&ParamScope>) -> Option<i64> {
    let (candidate, query) = match (candidate, query) {
        (Some(c), Some(q)) => (c, q),
        // A missing scope on either side contributes nothing and cannot
        // disqualify.
        _ => return Some(0),
    };

    let mut score = 0i64;

    if let (Some(cs), Some(qs)) = (&candidate.system, &query.system) {
        if cs == qs {
            score += 10;
        } else {
            return None;
        }
    }
    if let (Some(cc), Some(qc)) = (&candidate.currency, &query.currency) {
        if cc == qc {
            score += 5;
        } else {
            return None;
        }
    }
    if !candidate.tags.is_empty() && !query.tags.is_empty() {
        let overlap = candidate
            .tags
            .iter()
            .filter(|t| query.tags.contains(t))
            .count() as i64;
        if overlap == 0 {
            return None;
        }
        score += 3 * overlap;
    }

    Some(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoped(system: Option<&str>, currency: Option<&str>, tags: &[&str]) -> ParamScope {
        ParamScope {
            system: system.map(String::from),
            currency: currency.map(String::from),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn tag_overlap_beats_plain_scope_match() {
        let mut registry = ParameterRegistry::new();
        registry.register(
            RegisteredParameter::new("craftingCostGold", "cost")
                .with_scope(scoped(Some("crafting"), Some("gold"), &[])),
        );
        registry.register(
            RegisteredParameter::new("craftingEntryCostGold", "cost")
                .with_scope(scoped(Some("crafting"), Some("gold"), &["entry"])),
        );

        // Query with tags: B scores 10+5+3 = 18 over A's 15.
        let query = scoped(Some("crafting"), Some("gold"), &["entry"]);
        let hit = registry.resolve("cost", Some(&query)).unwrap();
        assert_eq!(hit.key, "craftingEntryCostGold");

        // Query without tags: both score 15, registration order breaks the tie.
        let query = scoped(Some("crafting"), Some("gold"), &[]);
        let hit = registry.resolve("cost", Some(&query)).unwrap();
        assert_eq!(hit.key, "craftingCostGold");
    }

    #[test]
    fn mismatched_scope_disqualifies() {
        let mut registry = ParameterRegistry::new();
        registry.register(
            RegisteredParameter::new("fishingFee", "fee")
                .with_scope(scoped(Some("fishing"), None, &[])),
        );
        let query = scoped(Some("crafting"), None, &[]);
        assert!(registry.resolve("fee", Some(&query)).is_none());

        // No scope on the query side never disqualifies.
        assert!(registry.resolve("fee", None).is_some());
    }

    #[test]
    fn priority_breaks_score_ties() {
        let mut registry = ParameterRegistry::new();
        registry.register(RegisteredParameter::new("rewardA", "reward"));
        registry.register(RegisteredParameter::new("rewardB", "reward").with_priority(5));
        let hit = registry.resolve("reward", None).unwrap();
        assert_eq!(hit.key, "rewardB");
    }

    #[test]
    fn resolution_is_deterministic_in_registration_order() {
        let mut registry = ParameterRegistry::new();
        registry.register(RegisteredParameter::new("first", "cap"));
        registry.register(RegisteredParameter::new("second", "cap"));
        for _ in 0..10 {
            assert_eq!(registry.resolve("cap", None).unwrap().key, "first");
        }
    }

    #[test]
    fn validate_flags_ambiguity_and_missing_impacts() {
        let mut registry = ParameterRegistry::new();
        registry.register(RegisteredParameter::new("a", "cost"));
        registry.register(RegisteredParameter::new("b", "cost"));
        registry
            .register(RegisteredParameter::new("c", "reward").with_flow_impact(FlowImpact::Faucet));

        let issues = registry.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Error && i.message.contains("cost")));
        // a and b lack flow impacts; c declares one.
        let warnings = issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .count();
        assert_eq!(warnings, 2);
    }

    #[test]
    fn flow_impact_inference_fallback() {
        assert_eq!(FlowImpact::infer("craftingCost"), FlowImpact::Sink);
        assert_eq!(FlowImpact::infer("listingFee"), FlowImpact::Sink);
        assert_eq!(FlowImpact::infer("deathPenalty"), FlowImpact::Sink);
        assert_eq!(FlowImpact::infer("questReward"), FlowImpact::Faucet);
        assert_eq!(FlowImpact::infer("stakingYield"), FlowImpact::Mixed);
        assert_eq!(FlowImpact::infer("inventoryCap"), FlowImpact::Neutral);
        assert_eq!(FlowImpact::infer("mystery"), FlowImpact::Neutral);
    }

    #[test]
    fn reregistering_a_key_replaces_in_place() {
        let mut registry = ParameterRegistry::new();
        registry.register(RegisteredParameter::new("x", "cost").with_current_value(1.0));
        registry.register(RegisteredParameter::new("y", "cost"));
        registry.register(RegisteredParameter::new("x", "cost").with_current_value(2.0));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.current_value("x"), Some(2.0));
        // x kept its original slot, so it still wins the order tiebreak.
        assert_eq!(registry.resolve("cost", None).unwrap().key, "x");
    }
}
