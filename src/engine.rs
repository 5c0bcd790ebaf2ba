//! Engine - the five-stage control pipeline.
//! Mission: Observe, diagnose, simulate, plan, execute; one adjustment per
//! cycle, every outcome logged
//!
//! The engine owns every cross-cutting store. Tick processing is strictly
//! serialized by the transport through one async mutex; the read-side
//! endpoints consume the shared store handles and the status snapshot
//! without touching the pipeline.

use crate::adapter::EconomyAdapter;
use crate::decision_log::{DecisionEntry, DecisionLog, DecisionResult};
use crate::diagnoser::{Diagnoser, Diagnosis};
use crate::executor::{Executor, PlanOutcome};
use crate::metric_store::MetricStore;
use crate::models::{Adjustment, Alert, EconomicEvent, EconomyState, EngineMode};
use crate::observer::{EconomyMetrics, Observer};
use crate::planner::Planner;
use crate::principles::builtin_principles;
use crate::registry::ParameterRegistry;
use crate::simulator::{Simulator, DEFAULT_ESTIMATED_LAG};
use crate::thresholds::Thresholds;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Snapshot served by `/health` without taking the pipeline lock.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub health: f64,
    pub tick: u64,
    pub mode: EngineMode,
    pub active_plans: usize,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            health: 100.0,
            tick: 0,
            mode: EngineMode::Autonomous,
            active_plans: 0,
        }
    }
}

/// Everything one processed tick hands back to the transport.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub tick: u64,
    pub health: f64,
    pub adjustments: Vec<Adjustment>,
    pub alerts: Vec<Alert>,
    pub diagnoses: Vec<Diagnosis>,
}

pub struct Engine {
    mode: EngineMode,
    thresholds: Thresholds,
    observer: Observer,
    diagnoser: Diagnoser,
    simulator: Simulator,
    planner: Planner,
    executor: Executor,
    registry: ParameterRegistry,
    metric_store: Arc<RwLock<MetricStore>>,
    decision_log: Arc<RwLock<DecisionLog>>,
    status: Arc<RwLock<EngineStatus>>,
}

impl Engine {
    pub fn new(mode: EngineMode, thresholds: Thresholds, registry: ParameterRegistry) -> Self {
        let engine = Self {
            mode,
            thresholds,
            observer: Observer::new(),
            diagnoser: Diagnoser::new(builtin_principles()),
            simulator: Simulator::new(),
            planner: Planner::new(),
            executor: Executor::new(),
            registry,
            metric_store: Arc::new(RwLock::new(MetricStore::new())),
            decision_log: Arc::new(RwLock::new(DecisionLog::new())),
            status: Arc::new(RwLock::new(EngineStatus {
                mode,
                ..Default::default()
            })),
        };
        for issue in engine.registry.validate() {
            warn!(severity = ?issue.severity, "{}", issue.message);
        }
        engine
    }

    pub fn metric_store(&self) -> Arc<RwLock<MetricStore>> {
        self.metric_store.clone()
    }

    pub fn decision_log(&self) -> Arc<RwLock<DecisionLog>> {
        self.decision_log.clone()
    }

    pub fn status_handle(&self) -> Arc<RwLock<EngineStatus>> {
        self.status.clone()
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: EngineMode) {
        if self.mode != mode {
            info!(mode = mode.as_str(), "engine mode changed");
        }
        self.mode = mode;
        self.status.write().mode = mode;
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ParameterRegistry {
        &mut self.registry
    }

    pub fn planner_mut(&mut self) -> &mut Planner {
        &mut self.planner
    }

    pub fn principles(&self) -> &[crate::principles::Principle] {
        self.diagnoser.principles()
    }

    /// Process one tick end to end. The caller guarantees serialization; no
    /// two ticks for the same adapter are ever in flight.
    pub async fn process_tick(
        &mut self,
        state: &EconomyState,
        events: &[EconomicEvent],
        persona_distribution: Option<&HashMap<String, f64>>,
        adapter: &dyn EconomyAdapter,
    ) -> TickReport {
        let deadline = Instant::now() + Duration::from_millis(self.thresholds.tick_deadline_ms);
        let tick = state.tick;

        // Stage 1: observe, then persist before anything reads back.
        let metrics = self
            .observer
            .observe(state, events, persona_distribution);
        self.metric_store.write().record(metrics.clone());

        let mut adjustments: Vec<Adjustment> = Vec::new();

        // Rollback sweep for plans applied at earlier ticks.
        let (restored, outcomes) = self
            .executor
            .check_rollbacks(tick, &metrics, adapter)
            .await;
        adjustments.extend(restored);
        for outcome in outcomes {
            match outcome {
                PlanOutcome::RolledBack {
                    plan,
                    original_value,
                    reason,
                } => {
                    self.planner.record_rolled_back();
                    self.registry
                        .set_current_value(&plan.parameter, original_value);
                    self.planner.note_applied_value(&plan.parameter, original_value);
                    let entry = DecisionEntry::new(
                        tick,
                        plan.diagnosis.clone(),
                        Some(plan),
                        DecisionResult::RolledBack,
                        reason,
                        metrics.clone(),
                    );
                    self.decision_log.write().record(entry);
                }
                PlanOutcome::Settled { .. } => {
                    self.planner.record_settled();
                }
            }
        }

        // Stage 2: diagnose.
        let diagnoses = self.diagnoser.diagnose(&metrics, &self.thresholds);
        let alerts: Vec<Alert> = diagnoses.iter().map(diagnosis_to_alert).collect();

        // Stages 3-5 act on the top violation only.
        if let Some(top) = diagnoses.first() {
            self.drive_top_diagnosis(top, &metrics, tick, deadline, adapter, &mut adjustments)
                .await;
        }

        let health = metrics.health();
        {
            let mut status = self.status.write();
            status.health = health;
            status.tick = tick;
            status.active_plans = self.executor.active_count();
        }

        info!(
            tick,
            health,
            alerts = alerts.len(),
            adjustments = adjustments.len(),
            "tick processed"
        );
        TickReport {
            tick,
            health,
            adjustments,
            alerts,
            diagnoses,
        }
    }

    async fn drive_top_diagnosis(
        &mut self,
        top: &Diagnosis,
        metrics: &EconomyMetrics,
        tick: u64,
        deadline: Instant,
        adapter: &dyn EconomyAdapter,
        adjustments: &mut Vec<Adjustment>,
    ) {
        let estimated_lag = top
            .violation
            .estimated_lag
            .unwrap_or(DEFAULT_ESTIMATED_LAG);

        // Stage 3: simulate. None means the deadline preempted the run.
        let simulation = self.simulator.simulate(
            &top.violation.suggested_action,
            metrics,
            &self.thresholds,
            &self.registry,
            tick,
            estimated_lag,
            Some(deadline),
        );

        // Stage 4: plan.
        let planned = self
            .planner
            .plan(top, simulation, metrics, &self.thresholds, &self.registry);

        let entry = match planned {
            Err(reason) => {
                info!(
                    principle = %top.principle_id,
                    reason = reason.as_str(),
                    "no action this cycle"
                );
                DecisionEntry::new(
                    tick,
                    top.clone(),
                    None,
                    reason.into(),
                    format!(
                        "{} violation not acted on: {}",
                        top.principle_id,
                        reason.as_str()
                    ),
                    metrics.clone(),
                )
            }
            Ok(plan) if self.mode == EngineMode::Advisor => {
                // Fully planned but never executed; free the budget slot.
                self.planner.record_settled();
                DecisionEntry::new(
                    tick,
                    plan.diagnosis.clone(),
                    Some(plan),
                    DecisionResult::SkippedAdvisorMode,
                    "advisor mode: plan produced but not executed",
                    metrics.clone(),
                )
            }
            // Stage 5: execute.
            Ok(plan) => match self.executor.apply(plan.clone(), tick, adapter).await {
                Ok(adjustment) => {
                    self.registry
                        .set_current_value(&plan.parameter, plan.target_value);
                    self.planner
                        .note_applied_value(&plan.parameter, plan.target_value);
                    adjustments.push(adjustment);
                    let mut applied_plan = plan;
                    applied_plan.applied_at = Some(tick);
                    let reasoning = applied_plan
                        .diagnosis
                        .violation
                        .suggested_action
                        .reasoning
                        .clone();
                    DecisionEntry::new(
                        tick,
                        applied_plan.diagnosis.clone(),
                        Some(applied_plan),
                        DecisionResult::Applied,
                        reasoning,
                        metrics.clone(),
                    )
                }
                Err(e) => {
                    warn!(error = %e, "adapter rejected the adjustment");
                    self.planner.record_settled();
                    DecisionEntry::new(
                        tick,
                        plan.diagnosis.clone(),
                        Some(plan),
                        DecisionResult::ApplyFailed,
                        format!("adapter setParam failed: {e}"),
                        metrics.clone(),
                    )
                }
            },
        };
        self.decision_log.write().record(entry);
    }

    /// Side-effect-free diagnosis of an arbitrary snapshot: observer state is
    /// cloned, nothing is recorded.
    pub fn diagnose_only(&self, state: &EconomyState) -> (f64, Vec<Diagnosis>) {
        let mut observer = self.observer.clone();
        let metrics = observer.observe(state, &[], None);
        let diagnoses = self.diagnoser.diagnose(&metrics, &self.thresholds);
        (metrics.health(), diagnoses)
    }
}

fn diagnosis_to_alert(d: &Diagnosis) -> Alert {
    Alert {
        principle_id: d.principle_id.clone(),
        principle_name: d.principle_name.clone(),
        severity: d.violation.severity,
        evidence: d.violation.evidence.clone(),
        reasoning: d.violation.suggested_action.reasoning.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CollectingAdapter;
    use crate::models::EventKind;
    use crate::registry::{FlowImpact, RegisteredParameter};

    fn gold_state(tick: u64) -> EconomyState {
        let mut state = EconomyState {
            tick,
            currencies: vec!["gold".to_string()],
            ..Default::default()
        };
        for (agent, balance) in [("a", 100.0), ("b", 50.0), ("c", 50.0)] {
            state
                .agent_balances
                .entry(agent.to_string())
                .or_default()
                .insert("gold".to_string(), balance);
        }
        state
    }

    fn mint_events(amount: f64) -> Vec<EconomicEvent> {
        vec![EconomicEvent::new(EventKind::Mint, "system")
            .with_amount(amount)
            .with_currency("gold")]
    }

    fn engine_with_crafting_cost(mode: EngineMode, thresholds: Thresholds) -> Engine {
        let mut registry = ParameterRegistry::new();
        registry.register(
            RegisteredParameter::new("craftingCost", "cost")
                .with_flow_impact(FlowImpact::Sink)
                .with_current_value(100.0),
        );
        Engine::new(mode, thresholds, registry)
    }

    #[tokio::test]
    async fn inflationary_tick_applies_one_cost_increase() {
        let mut engine =
            engine_with_crafting_cost(EngineMode::Autonomous, Thresholds::default());
        let adapter = CollectingAdapter::new();

        let report = engine
            .process_tick(&gold_state(100), &mint_events(15.0), None, &adapter)
            .await;

        assert_eq!(report.adjustments.len(), 1);
        assert_eq!(report.adjustments[0].key, "craftingCost");
        assert!((report.adjustments[0].value - 115.0).abs() < 1e-9);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].principle_id, "P12");
        assert_eq!(report.alerts[0].severity, 5.0);

        let log = engine.decision_log();
        let entries = log.read().latest(1);
        assert_eq!(entries[0].result, DecisionResult::Applied);
        assert_eq!(entries[0].tick, 100);
    }

    #[tokio::test]
    async fn grace_period_blocks_but_still_alerts() {
        let thresholds = Thresholds {
            grace_period: 50,
            ..Default::default()
        };
        let mut engine = engine_with_crafting_cost(EngineMode::Autonomous, thresholds);
        let adapter = CollectingAdapter::new();

        let report = engine
            .process_tick(&gold_state(10), &mint_events(15.0), None, &adapter)
            .await;

        assert!(report.adjustments.is_empty());
        assert!(report
            .alerts
            .iter()
            .any(|a| a.principle_id == "P12"));
        let log = engine.decision_log();
        let entries = log.read().latest(1);
        assert_eq!(entries[0].result, DecisionResult::SkippedGracePeriod);
    }

    #[tokio::test]
    async fn advisor_mode_plans_without_executing() {
        let mut engine = engine_with_crafting_cost(EngineMode::Advisor, Thresholds::default());
        let adapter = CollectingAdapter::new();

        let report = engine
            .process_tick(&gold_state(100), &mint_events(15.0), None, &adapter)
            .await;

        assert!(report.adjustments.is_empty());
        let log = engine.decision_log();
        let entries = log.read().latest(1);
        assert_eq!(entries[0].result, DecisionResult::SkippedAdvisorMode);
        let plan = entries[0].plan.as_ref().unwrap();
        assert!((plan.target_value - 115.0).abs() < 1e-9);
        // Budget slot was released.
        assert_eq!(engine.planner.active_plans(), 0);
    }

    #[tokio::test]
    async fn cooldown_then_recovery_across_ticks() {
        let thresholds = Thresholds {
            cooldown_ticks: 15,
            ..Default::default()
        };
        let mut engine = engine_with_crafting_cost(EngineMode::Autonomous, thresholds);
        let adapter = CollectingAdapter::new();

        let report = engine
            .process_tick(&gold_state(100), &mint_events(15.0), None, &adapter)
            .await;
        assert_eq!(report.adjustments.len(), 1);

        let report = engine
            .process_tick(&gold_state(105), &mint_events(15.0), None, &adapter)
            .await;
        assert!(report.adjustments.is_empty());
        {
            let log = engine.decision_log();
            let entries = log.read().latest(1);
            assert_eq!(entries[0].result, DecisionResult::SkippedCooldown);
        }

        let report = engine
            .process_tick(&gold_state(115), &mint_events(15.0), None, &adapter)
            .await;
        assert_eq!(report.adjustments.len(), 1);
        // Second apply compounds on the updated value.
        assert!((report.adjustments[0].value - 132.25).abs() < 1e-6);
    }

    #[tokio::test]
    async fn multi_currency_diagnosis_targets_sick_currency() {
        let mut registry = ParameterRegistry::new();
        registry.register(
            RegisteredParameter::new("wealthTax", "penalty")
                .with_flow_impact(FlowImpact::Redistribution)
                .with_current_value(0.02),
        );
        let mut engine = Engine::new(EngineMode::Autonomous, Thresholds::default(), registry);
        let adapter = CollectingAdapter::new();

        // gold spread fairly; gems concentrated in one holder.
        let mut state = EconomyState {
            tick: 100,
            currencies: vec!["gold".to_string(), "gems".to_string()],
            ..Default::default()
        };
        let holdings: [(&str, f64, f64); 6] = [
            ("a", 100.0, 940.0),
            ("b", 90.0, 20.0),
            ("c", 110.0, 15.0),
            ("d", 95.0, 10.0),
            ("e", 105.0, 10.0),
            ("f", 100.0, 5.0),
        ];
        for (agent, gold, gems) in holdings {
            let balances = state.agent_balances.entry(agent.to_string()).or_default();
            balances.insert("gold".to_string(), gold);
            balances.insert("gems".to_string(), gems);
        }

        let report = engine.process_tick(&state, &[], None, &adapter).await;
        let p33 = report
            .alerts
            .iter()
            .find(|a| a.principle_id == "P33")
            .expect("P33 fires");
        assert_eq!(p33.evidence["currency"], "gems");
        assert_eq!(report.diagnoses[0].principle_id, "P33");
        let scope = report.diagnoses[0]
            .violation
            .suggested_action
            .scope
            .as_ref()
            .unwrap();
        assert_eq!(scope.currency.as_deref(), Some("gems"));
    }

    #[tokio::test]
    async fn diagnose_only_has_no_side_effects() {
        let engine = engine_with_crafting_cost(EngineMode::Autonomous, Thresholds::default());
        let (health, diagnoses) = engine.diagnose_only(&gold_state(100));
        assert!(health > 0.0);
        assert!(diagnoses.iter().all(|d| d.tick == 100));
        assert!(engine.decision_log.read().is_empty());
        assert_eq!(engine.metric_store.read().len(crate::metric_store::Resolution::Fine), 0);
    }
}
