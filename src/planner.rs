//! Planner - turns the top diagnosis into an action plan, or refuses.
//! Mission: Every refusal has a name; every plan has a rollback condition
//!
//! The planner is the engine's safety layer: grace period, resolution, locks,
//! cooldowns, complexity budget and simulation acceptance all live here.

use crate::diagnoser::Diagnosis;
use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::principles::{Category, Direction};
use crate::registry::ParameterRegistry;
use crate::simulator::{SimulationResult, DEFAULT_ESTIMATED_LAG};
use crate::thresholds::Thresholds;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum share of simulated futures allowed to overshoot the target.
const OVERSHOOT_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackDirection {
    Above,
    Below,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackCondition {
    /// Dotted metric path evaluated against each subsequent tick's metrics.
    pub metric: String,
    pub direction: RollbackDirection,
    pub threshold: f64,
    pub check_after_tick: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    pub id: String,
    pub diagnosis: Diagnosis,
    pub parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ParamScope>,
    pub current_value: f64,
    pub target_value: f64,
    pub max_change_percent: f64,
    pub cooldown_ticks: u64,
    pub rollback_condition: RollbackCondition,
    pub simulation_result: SimulationResult,
    pub estimated_lag: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<u64>,
}

/// Why the planner refused to produce a plan this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    GracePeriod,
    UnresolvedParameter,
    Locked,
    Cooldown,
    Budget,
    Simulation,
    Timeout,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::GracePeriod => "grace_period",
            SkipReason::UnresolvedParameter => "unresolved",
            SkipReason::Locked => "locked",
            SkipReason::Cooldown => "cooldown",
            SkipReason::Budget => "budget",
            SkipReason::Simulation => "simulation",
            SkipReason::Timeout => "timeout",
        }
    }
}

pub struct Planner {
    /// (parameterType, canonical scope) -> last applied tick.
    cooldowns: HashMap<String, u64>,
    active_plans: usize,
    locked: HashSet<String>,
    /// key -> (min, max) clamp from operator config.
    constraints: HashMap<String, (f64, f64)>,
    /// Last values this engine wrote, used when the registry has none.
    current_params: HashMap<String, f64>,
}

impl Planner {
    pub fn new() -> Self {
        Self {
            cooldowns: HashMap::new(),
            active_plans: 0,
            locked: HashSet::new(),
            constraints: HashMap::new(),
            current_params: HashMap::new(),
        }
    }

    pub fn active_plans(&self) -> usize {
        self.active_plans
    }

    pub fn lock(&mut self, key: impl Into<String>) {
        self.locked.insert(key.into());
    }

    pub fn unlock(&mut self, key: &str) {
        self.locked.remove(key);
    }

    pub fn constrain(&mut self, key: impl Into<String>, min: f64, max: f64) {
        self.constraints.insert(key.into(), (min, max));
    }

    pub fn note_applied_value(&mut self, key: &str, value: f64) {
        self.current_params.insert(key.to_string(), value);
    }

    pub fn record_settled(&mut self) {
        self.active_plans = self.active_plans.saturating_sub(1);
    }

    pub fn record_rolled_back(&mut self) {
        self.active_plans = self.active_plans.saturating_sub(1);
    }

    /// Run the gate sequence and build a plan. `simulation` is `None` when
    /// the simulator was preempted past its deadline.
    pub fn plan(
        &mut self,
        diagnosis: &Diagnosis,
        simulation: Option<SimulationResult>,
        metrics: &EconomyMetrics,
        thresholds: &Thresholds,
        registry: &ParameterRegistry,
    ) -> Result<ActionPlan, SkipReason> {
        let action = &diagnosis.violation.suggested_action;

        // Gate 1: grace period.
        if metrics.tick < thresholds.grace_period {
            return Err(SkipReason::GracePeriod);
        }

        // Gate 2 (mode) is enforced by the engine, which still wants the
        // plan fully formed in advisor mode.

        // Gate 3: parameter resolution.
        let resolved = registry.resolve(&action.parameter_type, action.scope.as_ref());
        let key = match resolved {
            Some(param) => param.key.clone(),
            None if registry.is_empty() => action.parameter_type.clone(),
            None => return Err(SkipReason::UnresolvedParameter),
        };

        // Gate 4: lock list.
        if self.locked.contains(&key) {
            return Err(SkipReason::Locked);
        }

        // Gate 5: type-level cooldown.
        let cooldown_key = cooldown_key(&action.parameter_type, action.scope.as_ref());
        if let Some(&last) = self.cooldowns.get(&cooldown_key) {
            if metrics.tick < last + thresholds.cooldown_ticks {
                debug!(
                    key = %cooldown_key,
                    last_applied = last,
                    "cooldown active"
                );
                return Err(SkipReason::Cooldown);
            }
        }

        // Gate 6: complexity budget.
        if self.active_plans >= thresholds.complexity_budget_max {
            return Err(SkipReason::Budget);
        }

        // Gate 7: simulation acceptance.
        let simulation = simulation.ok_or(SkipReason::Timeout)?;
        if !(simulation.net_improvement
            && simulation.no_new_problems
            && simulation.overshoot_risk <= OVERSHOOT_TOLERANCE)
        {
            return Err(SkipReason::Simulation);
        }

        // Target value: magnitude is capped, never enlarged.
        let baseline = registry
            .current_value(&key)
            .or_else(|| self.current_params.get(&key).copied())
            .unwrap_or(1.0);
        let magnitude = action.magnitude.min(thresholds.max_adjustment_percent);
        let mut target = match action.direction {
            Direction::Increase => baseline * (1.0 + magnitude),
            Direction::Decrease => baseline * (1.0 - magnitude),
        };
        if let Some(&(min, max)) = self.constraints.get(&key) {
            target = target.clamp(min, max);
        }

        let estimated_lag = diagnosis
            .violation
            .estimated_lag
            .unwrap_or(DEFAULT_ESTIMATED_LAG);
        let rollback_condition = rollback_condition_for(
            diagnosis,
            metrics,
            thresholds,
            metrics.tick + estimated_lag,
        );

        let mut diagnosis = diagnosis.clone();
        diagnosis.violation.suggested_action.resolved_parameter = Some(key.clone());

        // Bookkeeping: the cooldown starts now and the plan counts against
        // the budget until settled or rolled back.
        self.cooldowns.insert(cooldown_key, metrics.tick);
        self.active_plans += 1;

        let plan = ActionPlan {
            id: Uuid::new_v4().to_string(),
            parameter: key,
            scope: action.scope.clone(),
            current_value: baseline,
            target_value: target,
            max_change_percent: thresholds.max_adjustment_percent,
            cooldown_ticks: thresholds.cooldown_ticks,
            rollback_condition,
            simulation_result: simulation,
            estimated_lag,
            applied_at: None,
            diagnosis,
        };
        info!(
            plan = %plan.id,
            parameter = %plan.parameter,
            from = plan.current_value,
            to = plan.target_value,
            "plan created"
        );
        Ok(plan)
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

fn cooldown_key(parameter_type: &str, scope: Option<&ParamScope>) -> String {
    match scope {
        Some(scope) => format!("{}@{}", parameter_type, scope.canonical_key()),
        None => format!("{}@", parameter_type),
    }
}

/// Category -> rollback metric mapping. Conservative defaults; treated as the
/// single tunable point for this policy.
fn rollback_condition_for(
    diagnosis: &Diagnosis,
    metrics: &EconomyMetrics,
    thresholds: &Thresholds,
    check_after_tick: u64,
) -> RollbackCondition {
    match diagnosis.category {
        Category::SupplyChain | Category::Resource => {
            if let Some(resource) = diagnosis
                .violation
                .evidence
                .get("resource")
                .and_then(|v| v.as_str())
            {
                let current = metrics
                    .supply_by_resource
                    .get(resource)
                    .copied()
                    .unwrap_or(0.0);
                return RollbackCondition {
                    metric: format!("supplyByResource.{resource}"),
                    direction: RollbackDirection::Below,
                    threshold: current * 0.5,
                    check_after_tick,
                };
            }
            satisfaction_guard(metrics, check_after_tick)
        }
        Category::Operations | Category::Measurement => {
            if metrics.event_completion_rate.is_finite() {
                RollbackCondition {
                    metric: "eventCompletionRate".to_string(),
                    direction: RollbackDirection::Below,
                    threshold: 0.8 * thresholds.event_completion_floor,
                    check_after_tick,
                }
            } else {
                satisfaction_guard(metrics, check_after_tick)
            }
        }
        _ => satisfaction_guard(metrics, check_after_tick),
    }
}

/// Default guard: roll back if satisfaction drops well below where it was
/// when the plan was made.
fn satisfaction_guard(metrics: &EconomyMetrics, check_after_tick: u64) -> RollbackCondition {
    RollbackCondition {
        metric: "avgSatisfaction".to_string(),
        direction: RollbackDirection::Below,
        threshold: (metrics.avg_satisfaction - 15.0).max(0.0),
        check_after_tick,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principles::{evidence, SuggestedAction, Violation};
    use crate::registry::{FlowImpact, RegisteredParameter};
    use crate::simulator::Simulator;
    use serde_json::json;

    fn diagnosis_for_net_flow(tick: u64) -> Diagnosis {
        Diagnosis {
            principle_id: "P12".to_string(),
            principle_name: "Inflationary net flow".to_string(),
            category: Category::Currency,
            violation: Violation {
                severity: 5.0,
                confidence: 0.8,
                estimated_lag: Some(5),
                evidence: evidence(vec![("currency", json!("gold"))]),
                suggested_action: SuggestedAction::new(
                    "cost",
                    Direction::Increase,
                    0.5,
                    "drain the surplus",
                )
                .scoped(ParamScope::for_currency("gold")),
            },
            tick,
        }
    }

    fn inflated_metrics(tick: u64) -> EconomyMetrics {
        let mut m = EconomyMetrics {
            tick,
            net_flow: 15.0,
            total_supply: 200.0,
            total_agents: 3.0,
            avg_satisfaction: 70.0,
            ..Default::default()
        };
        m.net_flow_by_currency.insert("gold".into(), 15.0);
        m.total_supply_by_currency.insert("gold".into(), 200.0);
        m
    }

    fn registry_with_crafting_cost() -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        registry.register(
            RegisteredParameter::new("craftingCost", "cost")
                .with_flow_impact(FlowImpact::Sink)
                .with_current_value(100.0),
        );
        registry
    }

    fn simulate(
        diagnosis: &Diagnosis,
        metrics: &EconomyMetrics,
        thresholds: &Thresholds,
        registry: &ParameterRegistry,
    ) -> Option<SimulationResult> {
        Simulator::new().simulate(
            &diagnosis.violation.suggested_action,
            metrics,
            thresholds,
            registry,
            metrics.tick,
            5,
            None,
        )
    }

    #[test]
    fn grace_period_blocks_planning() {
        let thresholds = Thresholds {
            grace_period: 50,
            ..Default::default()
        };
        let registry = registry_with_crafting_cost();
        let metrics = inflated_metrics(10);
        let diagnosis = diagnosis_for_net_flow(10);
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);

        let mut planner = Planner::new();
        let result = planner.plan(&diagnosis, sim, &metrics, &thresholds, &registry);
        assert_eq!(result.unwrap_err(), SkipReason::GracePeriod);
        assert_eq!(planner.active_plans(), 0);
    }

    #[test]
    fn magnitude_is_capped_to_max_adjustment() {
        let thresholds = Thresholds::default(); // maxAdjustmentPercent 0.15
        let registry = registry_with_crafting_cost();
        let metrics = inflated_metrics(100);
        let diagnosis = diagnosis_for_net_flow(100); // suggests 0.5
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);

        let mut planner = Planner::new();
        let plan = planner
            .plan(&diagnosis, sim, &metrics, &thresholds, &registry)
            .unwrap();
        assert_eq!(plan.parameter, "craftingCost");
        assert_eq!(plan.current_value, 100.0);
        assert!((plan.target_value - 115.0).abs() < 1e-9);
        assert_eq!(
            plan.diagnosis
                .violation
                .suggested_action
                .resolved_parameter
                .as_deref(),
            Some("craftingCost")
        );
        assert_eq!(planner.active_plans(), 1);
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let thresholds = Thresholds {
            cooldown_ticks: 15,
            ..Default::default()
        };
        let registry = registry_with_crafting_cost();
        let mut planner = Planner::new();

        let metrics = inflated_metrics(100);
        let diagnosis = diagnosis_for_net_flow(100);
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);
        planner
            .plan(&diagnosis, sim, &metrics, &thresholds, &registry)
            .unwrap();

        let metrics = inflated_metrics(105);
        let diagnosis = diagnosis_for_net_flow(105);
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);
        let result = planner.plan(&diagnosis, sim, &metrics, &thresholds, &registry);
        assert_eq!(result.unwrap_err(), SkipReason::Cooldown);

        planner.record_settled();
        let metrics = inflated_metrics(115);
        let diagnosis = diagnosis_for_net_flow(115);
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);
        assert!(planner
            .plan(&diagnosis, sim, &metrics, &thresholds, &registry)
            .is_ok());
    }

    #[test]
    fn budget_limits_active_plans() {
        let thresholds = Thresholds {
            complexity_budget_max: 1,
            cooldown_ticks: 0,
            ..Default::default()
        };
        let registry = registry_with_crafting_cost();
        let mut planner = Planner::new();

        let metrics = inflated_metrics(100);
        let diagnosis = diagnosis_for_net_flow(100);
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);
        planner
            .plan(&diagnosis, sim, &metrics, &thresholds, &registry)
            .unwrap();

        let metrics = inflated_metrics(101);
        let diagnosis = diagnosis_for_net_flow(101);
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);
        let result = planner.plan(&diagnosis, sim, &metrics, &thresholds, &registry);
        assert_eq!(result.unwrap_err(), SkipReason::Budget);
    }

    #[test]
    fn locked_keys_are_skipped() {
        let thresholds = Thresholds::default();
        let registry = registry_with_crafting_cost();
        let mut planner = Planner::new();
        planner.lock("craftingCost");

        let metrics = inflated_metrics(100);
        let diagnosis = diagnosis_for_net_flow(100);
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);
        let result = planner.plan(&diagnosis, sim, &metrics, &thresholds, &registry);
        assert_eq!(result.unwrap_err(), SkipReason::Locked);

        planner.unlock("craftingCost");
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);
        assert!(planner
            .plan(&diagnosis, sim, &metrics, &thresholds, &registry)
            .is_ok());
    }

    #[test]
    fn configured_registry_without_match_skips_unresolved() {
        let thresholds = Thresholds::default();
        let mut registry = ParameterRegistry::new();
        registry.register(RegisteredParameter::new("questReward", "reward"));

        let metrics = inflated_metrics(100);
        let diagnosis = diagnosis_for_net_flow(100); // wants a "cost"
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);
        let mut planner = Planner::new();
        let result = planner.plan(&diagnosis, sim, &metrics, &thresholds, &registry);
        assert_eq!(result.unwrap_err(), SkipReason::UnresolvedParameter);
    }

    #[test]
    fn empty_registry_falls_back_to_type_as_key() {
        let thresholds = Thresholds::default();
        let registry = ParameterRegistry::new();
        let metrics = inflated_metrics(100);
        let diagnosis = diagnosis_for_net_flow(100);
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);

        let mut planner = Planner::new();
        let plan = planner
            .plan(&diagnosis, sim, &metrics, &thresholds, &registry)
            .unwrap();
        assert_eq!(plan.parameter, "cost");
        // Unknown baseline defaults to 1.
        assert!((plan.target_value - 1.15).abs() < 1e-9);
    }

    #[test]
    fn constraints_clamp_the_target() {
        let thresholds = Thresholds::default();
        let registry = registry_with_crafting_cost();
        let mut planner = Planner::new();
        planner.constrain("craftingCost", 0.0, 110.0);

        let metrics = inflated_metrics(100);
        let diagnosis = diagnosis_for_net_flow(100);
        let sim = simulate(&diagnosis, &metrics, &thresholds, &registry);
        let plan = planner
            .plan(&diagnosis, sim, &metrics, &thresholds, &registry)
            .unwrap();
        assert_eq!(plan.target_value, 110.0);
    }

    #[test]
    fn missing_simulation_is_a_timeout_skip() {
        let thresholds = Thresholds::default();
        let registry = registry_with_crafting_cost();
        let metrics = inflated_metrics(100);
        let diagnosis = diagnosis_for_net_flow(100);

        let mut planner = Planner::new();
        let result = planner.plan(&diagnosis, None, &metrics, &thresholds, &registry);
        assert_eq!(result.unwrap_err(), SkipReason::Timeout);
    }

    #[test]
    fn rollback_condition_follows_category() {
        let thresholds = Thresholds::default();
        let metrics = inflated_metrics(100);

        let diagnosis = diagnosis_for_net_flow(100);
        let rc = rollback_condition_for(&diagnosis, &metrics, &thresholds, 105);
        assert_eq!(rc.metric, "avgSatisfaction");
        assert_eq!(rc.direction, RollbackDirection::Below);
        assert_eq!(rc.check_after_tick, 105);

        let mut supply_diag = diagnosis_for_net_flow(100);
        supply_diag.category = Category::SupplyChain;
        supply_diag
            .violation
            .evidence
            .insert("resource".to_string(), json!("iron"));
        let mut metrics = inflated_metrics(100);
        metrics.supply_by_resource.insert("iron".into(), 80.0);
        let rc = rollback_condition_for(&supply_diag, &metrics, &thresholds, 105);
        assert_eq!(rc.metric, "supplyByResource.iron");
        assert_eq!(rc.threshold, 40.0);
    }
}
