//! Executor - the only stage that touches the host.
//! Mission: One apply per cycle, remember the original, never strand a
//! bad adjustment
//!
//! Applied plans stay active until their rollback window passes (settled),
//! their condition trips (rolled back), or a hard TTL expires.

use crate::adapter::EconomyAdapter;
use crate::models::Adjustment;
use crate::observer::EconomyMetrics;
use crate::planner::{ActionPlan, RollbackDirection};
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Plans older than this many ticks settle unconditionally.
const HARD_TTL_TICKS: u64 = 200;

/// Ticks past `checkAfterTick` during which the condition is still evaluated.
const CHECK_WINDOW_TICKS: u64 = 10;

#[derive(Debug)]
struct ActivePlan {
    plan: ActionPlan,
    original_value: f64,
}

/// What happened to an active plan during a rollback sweep.
#[derive(Debug)]
pub enum PlanOutcome {
    RolledBack {
        plan: ActionPlan,
        original_value: f64,
        reason: String,
    },
    Settled {
        plan: ActionPlan,
    },
}

pub struct Executor {
    active: Vec<ActivePlan>,
}

impl Executor {
    pub fn new() -> Self {
        Self { active: Vec::new() }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Apply one plan to the host. On adapter failure the plan is NOT added
    /// to the active list and the error propagates for the engine to log.
    pub async fn apply(
        &mut self,
        mut plan: ActionPlan,
        tick: u64,
        adapter: &dyn EconomyAdapter,
    ) -> Result<Adjustment> {
        adapter
            .set_param(&plan.parameter, plan.target_value, plan.scope.as_ref())
            .await
            .with_context(|| format!("setParam({}) failed", plan.parameter))?;

        plan.applied_at = Some(tick);
        let adjustment = Adjustment {
            key: plan.parameter.clone(),
            value: plan.target_value,
            scope: plan.scope.clone(),
        };
        info!(
            plan = %plan.id,
            parameter = %plan.parameter,
            value = plan.target_value,
            tick,
            "adjustment applied"
        );
        self.active.push(ActivePlan {
            original_value: plan.current_value,
            plan,
        });
        Ok(adjustment)
    }

    /// Evaluate every active plan against this tick's metrics. Returns the
    /// restore adjustments issued plus one outcome per plan that left the
    /// active set.
    pub async fn check_rollbacks(
        &mut self,
        tick: u64,
        metrics: &EconomyMetrics,
        adapter: &dyn EconomyAdapter,
    ) -> (Vec<Adjustment>, Vec<PlanOutcome>) {
        enum Verdict {
            Keep,
            Settle,
            RollBack(String),
        }

        let mut adjustments = Vec::new();
        let mut outcomes = Vec::new();
        let mut remaining = Vec::with_capacity(self.active.len());

        for entry in self.active.drain(..) {
            let rc = &entry.plan.rollback_condition;
            let applied_at = entry.plan.applied_at.unwrap_or(0);

            let verdict = if tick.saturating_sub(applied_at) > HARD_TTL_TICKS {
                Verdict::Settle
            } else if tick < rc.check_after_tick {
                Verdict::Keep
            } else {
                let value = metrics.value_at_path(&rc.metric);
                if value.is_nan() {
                    // Fail safe: an unobservable guard metric means we can no
                    // longer tell whether the adjustment is hurting.
                    Verdict::RollBack(format!(
                        "rollback metric '{}' resolved to NaN (fail-safe)",
                        rc.metric
                    ))
                } else {
                    let tripped = match rc.direction {
                        RollbackDirection::Below => value < rc.threshold,
                        RollbackDirection::Above => value > rc.threshold,
                    };
                    if tripped {
                        Verdict::RollBack(format!(
                            "rollback metric '{}' = {:.4} crossed threshold {:.4}",
                            rc.metric, value, rc.threshold
                        ))
                    } else if tick > rc.check_after_tick + CHECK_WINDOW_TICKS {
                        Verdict::Settle
                    } else {
                        Verdict::Keep
                    }
                }
            };

            match verdict {
                Verdict::Keep => remaining.push(entry),
                Verdict::Settle => {
                    info!(plan = %entry.plan.id, tick, "plan settled");
                    outcomes.push(PlanOutcome::Settled { plan: entry.plan });
                }
                Verdict::RollBack(reason) => {
                    let restore = adapter
                        .set_param(
                            &entry.plan.parameter,
                            entry.original_value,
                            entry.plan.scope.as_ref(),
                        )
                        .await;
                    match restore {
                        Ok(()) => {
                            warn!(
                                plan = %entry.plan.id,
                                parameter = %entry.plan.parameter,
                                restored = entry.original_value,
                                %reason,
                                "plan rolled back"
                            );
                            adjustments.push(Adjustment {
                                key: entry.plan.parameter.clone(),
                                value: entry.original_value,
                                scope: entry.plan.scope.clone(),
                            });
                            outcomes.push(PlanOutcome::RolledBack {
                                original_value: entry.original_value,
                                plan: entry.plan,
                                reason,
                            });
                        }
                        Err(e) => {
                            // Keep the plan active and retry next tick.
                            warn!(
                                plan = %entry.plan.id,
                                error = %e,
                                "rollback setParam failed; will retry"
                            );
                            remaining.push(entry);
                        }
                    }
                }
            }
        }

        self.active = remaining;
        (adjustments, outcomes)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CollectingAdapter;
    use crate::diagnoser::Diagnosis;
    use crate::models::ParamScope;
    use crate::planner::RollbackCondition;
    use crate::principles::{Category, Direction, SuggestedAction, Violation};
    use crate::registry::ParameterRegistry;
    use crate::simulator::Simulator;
    use crate::thresholds::Thresholds;

    fn test_plan(check_after_tick: u64, metric: &str) -> ActionPlan {
        let action = SuggestedAction::new("cost", Direction::Increase, 0.15, "test")
            .scoped(ParamScope::for_currency("gold"));
        let mut metrics = EconomyMetrics {
            net_flow: 15.0,
            ..Default::default()
        };
        metrics.net_flow_by_currency.insert("gold".into(), 15.0);
        let simulation = Simulator::new()
            .simulate(
                &action,
                &metrics,
                &Thresholds::default(),
                &ParameterRegistry::new(),
                50,
                5,
                None,
            )
            .expect("simulation");

        ActionPlan {
            id: "plan-test".to_string(),
            diagnosis: Diagnosis {
                principle_id: "P12".to_string(),
                principle_name: "Inflationary net flow".to_string(),
                category: Category::Currency,
                violation: Violation {
                    severity: 5.0,
                    confidence: 0.8,
                    estimated_lag: Some(5),
                    evidence: Default::default(),
                    suggested_action: action.clone(),
                },
                tick: 50,
            },
            parameter: "craftingCost".to_string(),
            scope: None,
            current_value: 100.0,
            target_value: 115.0,
            max_change_percent: 0.15,
            cooldown_ticks: 15,
            rollback_condition: RollbackCondition {
                metric: metric.to_string(),
                direction: RollbackDirection::Below,
                threshold: 55.0,
                check_after_tick,
            },
            simulation_result: simulation,
            estimated_lag: 5,
            applied_at: None,
        }
    }

    #[tokio::test]
    async fn apply_then_immediate_rollback_restores_original() {
        let adapter = CollectingAdapter::new();
        let mut executor = Executor::new();

        let plan = test_plan(60, "avgSatisfaction");
        executor.apply(plan, 50, &adapter).await.unwrap();
        assert_eq!(adapter.drain()[0].value, 115.0);

        // Satisfaction below threshold at the check tick.
        let metrics = EconomyMetrics {
            avg_satisfaction: 40.0,
            ..Default::default()
        };
        let (adjustments, outcomes) = executor.check_rollbacks(60, &metrics, &adapter).await;
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].value, 100.0);
        assert!(matches!(outcomes[0], PlanOutcome::RolledBack { .. }));
        assert_eq!(executor.active_count(), 0);
    }

    #[tokio::test]
    async fn nan_metric_path_triggers_failsafe_rollback() {
        let adapter = CollectingAdapter::new();
        let mut executor = Executor::new();

        let plan = test_plan(60, "poolSizesByCurrency.bank.gold");
        executor.apply(plan, 50, &adapter).await.unwrap();
        adapter.drain();

        // Metrics with no pool data at all: the path resolves to NaN.
        let metrics = EconomyMetrics::default();
        let (adjustments, outcomes) = executor.check_rollbacks(61, &metrics, &adapter).await;
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].value, 100.0);
        match &outcomes[0] {
            PlanOutcome::RolledBack { reason, .. } => assert!(reason.contains("NaN")),
            other => panic!("expected rollback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plan_settles_after_quiet_window() {
        let adapter = CollectingAdapter::new();
        let mut executor = Executor::new();

        let plan = test_plan(60, "avgSatisfaction");
        executor.apply(plan, 50, &adapter).await.unwrap();

        let healthy = EconomyMetrics {
            avg_satisfaction: 80.0,
            ..Default::default()
        };
        // Inside the check window: stays active.
        let (_, outcomes) = executor.check_rollbacks(65, &healthy, &adapter).await;
        assert!(outcomes.is_empty());
        assert_eq!(executor.active_count(), 1);

        // Past checkAfterTick + window: settles.
        let (_, outcomes) = executor.check_rollbacks(71, &healthy, &adapter).await;
        assert!(matches!(outcomes[0], PlanOutcome::Settled { .. }));
        assert_eq!(executor.active_count(), 0);
    }

    #[tokio::test]
    async fn waiting_plans_are_untouched_before_check_tick() {
        let adapter = CollectingAdapter::new();
        let mut executor = Executor::new();

        let plan = test_plan(60, "avgSatisfaction");
        executor.apply(plan, 50, &adapter).await.unwrap();

        let terrible = EconomyMetrics::default(); // satisfaction 0
        let (adjustments, outcomes) = executor.check_rollbacks(55, &terrible, &adapter).await;
        assert!(adjustments.is_empty());
        assert!(outcomes.is_empty());
        assert_eq!(executor.active_count(), 1);
    }

    #[tokio::test]
    async fn hard_ttl_settles_stuck_plans() {
        let adapter = CollectingAdapter::new();
        let mut executor = Executor::new();

        // A plan whose check tick never arrives within the TTL.
        let plan = test_plan(10_000, "avgSatisfaction");
        executor.apply(plan, 50, &adapter).await.unwrap();

        let metrics = EconomyMetrics::default();
        let (_, outcomes) = executor.check_rollbacks(251, &metrics, &adapter).await;
        assert!(matches!(outcomes[0], PlanOutcome::Settled { .. }));
    }
}
