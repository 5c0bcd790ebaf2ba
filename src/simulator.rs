//! Simulator - Monte-Carlo projection of a proposed action.
//! Mission: Cheap, seeded futures; accept an action only when the median
//! future is better and no metric newly breaks
//!
//! Each iteration projects the current metrics `forward_ticks` steps under a
//! flow-impact model plus Gaussian noise, then the endpoints are aggregated
//! into p10/p50/p90/mean outcomes.

use crate::models::ParamScope;
use crate::observer::EconomyMetrics;
use crate::principles::{Direction, SuggestedAction};
use crate::registry::{FlowImpact, ParameterRegistry};
use crate::thresholds::Thresholds;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, OrderStatistics};
use std::time::Instant;
use tracing::debug;

/// Minimum completed iterations for a deadline-preempted run to still count.
const MIN_ACCEPTED_ITERATIONS: usize = 10;

/// Default effect lag assumed when the diagnosing principle does not set one.
pub const DEFAULT_ESTIMATED_LAG: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutcomes {
    pub p10: EconomyMetrics,
    pub p50: EconomyMetrics,
    pub p90: EconomyMetrics,
    pub mean: EconomyMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub proposed_action: SuggestedAction,
    pub iterations: usize,
    pub forward_ticks: u64,
    pub outcomes: SimulationOutcomes,
    pub net_improvement: bool,
    pub no_new_problems: bool,
    pub confidence_interval: [f64; 2],
    pub estimated_effect_tick: u64,
    pub overshoot_risk: f64,
}

pub struct Simulator;

impl Simulator {
    pub fn new() -> Self {
        Self
    }

    /// Run the Monte-Carlo projection. Returns `None` only when a deadline
    /// preempted the run before `MIN_ACCEPTED_ITERATIONS` futures completed.
    pub fn simulate(
        &self,
        action: &SuggestedAction,
        metrics: &EconomyMetrics,
        thresholds: &Thresholds,
        registry: &ParameterRegistry,
        start_tick: u64,
        estimated_lag: u64,
        deadline: Option<Instant>,
    ) -> Option<SimulationResult> {
        let impact = resolve_flow_impact(action, registry);
        let forward_ticks = thresholds.simulation_forward_ticks.max(1);
        let wanted = thresholds.simulation_min_iterations.max(1);
        let lag = estimated_lag.min(forward_ticks);

        let dominant = thresholds.dominant_role_count(
            &metrics.population_by_role,
            metrics.total_agents,
        );
        let mut rng = seeded_rng(action, start_tick);

        let mut endpoints: Vec<EconomyMetrics> = Vec::with_capacity(wanted);
        let mut target_at_lag: Vec<f64> = Vec::with_capacity(wanted);
        let mut overshoots = 0usize;
        let baseline_target = target_value(metrics, impact, action);

        for _ in 0..wanted {
            if let Some(deadline) = deadline {
                // Preempt only at iteration boundaries.
                if Instant::now() >= deadline {
                    break;
                }
            }
            let (endpoint, lag_value) =
                project(metrics, action, impact, forward_ticks, lag, dominant, &mut rng);
            let end_target = target_value(&endpoint, impact, action);
            if crossed_zero(baseline_target, end_target) {
                overshoots += 1;
            }
            target_at_lag.push(lag_value);
            endpoints.push(endpoint);
        }

        let iterations = endpoints.len();
        if iterations < wanted && iterations < MIN_ACCEPTED_ITERATIONS {
            debug!(iterations, "simulation preempted before minimum iterations");
            return None;
        }

        let outcomes = SimulationOutcomes {
            p10: percentile_metrics(&endpoints, 10.0),
            p50: percentile_metrics(&endpoints, 50.0),
            p90: percentile_metrics(&endpoints, 90.0),
            mean: mean_metrics(&endpoints),
        };

        let baseline_health = metrics.health();
        let p50_health = outcomes.p50.health();
        let net_improvement = p50_health >= baseline_health;
        let no_new_problems = check_no_new_problems(metrics, &outcomes.p50, thresholds);

        let mut lag_data = Data::new(target_at_lag);
        let confidence_interval = [lag_data.percentile(10), lag_data.percentile(90)];

        Some(SimulationResult {
            proposed_action: action.clone(),
            iterations,
            forward_ticks,
            outcomes,
            net_improvement,
            no_new_problems,
            confidence_interval,
            estimated_effect_tick: start_tick + lag,
            overshoot_risk: overshoots as f64 / iterations.max(1) as f64,
        })
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolution order: explicit resolved key, then scope resolution, then
/// inference from the abstract type. The simulator stays correct with an
/// empty registry.
fn resolve_flow_impact(action: &SuggestedAction, registry: &ParameterRegistry) -> FlowImpact {
    if let Some(key) = &action.resolved_parameter {
        if let Some(impact) = registry.get_flow_impact(key) {
            return impact;
        }
    }
    if action.scope.is_some() {
        if let Some(param) = registry.resolve(&action.parameter_type, action.scope.as_ref()) {
            if let Some(impact) = param.flow_impact {
                return impact;
            }
        }
    }
    FlowImpact::infer(&action.parameter_type)
}

fn seeded_rng(action: &SuggestedAction, start_tick: u64) -> ChaCha8Rng {
    let mut seed = start_tick.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    for byte in action.parameter_type.bytes() {
        seed = seed.rotate_left(8) ^ byte as u64;
    }
    ChaCha8Rng::seed_from_u64(seed)
}

/// Currencies the projection perturbs: the scoped one, or all of them.
fn projected_currencies(metrics: &EconomyMetrics, scope: Option<&ParamScope>) -> Vec<String> {
    if let Some(currency) = scope.and_then(|s| s.currency.as_ref()) {
        return vec![currency.clone()];
    }
    let all: Vec<String> = metrics.net_flow_by_currency.keys().cloned().collect();
    all
}

/// One Monte-Carlo future. Returns the endpoint metrics and the targeted
/// metric's value at the estimated-lag step.
fn project(
    baseline: &EconomyMetrics,
    action: &SuggestedAction,
    impact: FlowImpact,
    forward_ticks: u64,
    lag: u64,
    dominant_role_count: f64,
    rng: &mut ChaCha8Rng,
) -> (EconomyMetrics, f64) {
    let mut m = baseline.clone();
    let sign = match action.direction {
        Direction::Decrease => 1.0,
        Direction::Increase => -1.0,
    };
    let magnitude = action.magnitude;
    let currencies = projected_currencies(baseline, action.scope.as_ref());
    let mut lag_value = target_value(baseline, impact, action);

    for step in 1..=forward_ticks {
        if currencies.is_empty() {
            // No per-currency data: operate on the aggregates directly.
            step_flow(
                &mut m.net_flow,
                &mut m.total_supply,
                m.faucet_volume,
                impact,
                sign,
                magnitude,
                dominant_role_count,
                rng,
            );
        } else {
            for currency in &currencies {
                let faucet = m
                    .faucet_volume_by_currency
                    .get(currency)
                    .copied()
                    .unwrap_or(0.0);
                let mut flow = m.net_flow_by_currency.get(currency).copied().unwrap_or(0.0);
                let mut supply = m
                    .total_supply_by_currency
                    .get(currency)
                    .copied()
                    .unwrap_or(0.0);
                step_flow(
                    &mut flow,
                    &mut supply,
                    faucet,
                    impact,
                    sign,
                    magnitude,
                    dominant_role_count,
                    rng,
                );
                m.net_flow_by_currency.insert(currency.clone(), flow);
                m.total_supply_by_currency.insert(currency.clone(), supply);
            }
            m.net_flow = m.net_flow_by_currency.values().sum();
            m.total_supply = m.total_supply_by_currency.values().sum();
        }

        match impact {
            FlowImpact::Friction => {
                let noise = gaussian(rng) * 0.01 * (m.velocity.abs() + 0.01);
                m.velocity = (m.velocity - 0.05 * magnitude + noise).max(0.0);
            }
            FlowImpact::Redistribution => {
                let noise = gaussian(rng) * 0.005;
                m.gini_coefficient =
                    (m.gini_coefficient - 0.01 * magnitude + noise).clamp(0.0, 1.0);
            }
            _ => {}
        }

        if step == lag {
            lag_value = target_value(&m, impact, action);
        }
    }

    (m, lag_value)
}

/// Apply one projection step of the flow-impact model to a single currency's
/// net flow and supply.
#[allow(clippy::too_many_arguments)]
fn step_flow(
    net_flow: &mut f64,
    supply: &mut f64,
    faucet_volume: f64,
    impact: FlowImpact,
    sign: f64,
    magnitude: f64,
    dominant_role_count: f64,
    rng: &mut ChaCha8Rng,
) {
    let delta = match impact {
        FlowImpact::Sink => sign * *net_flow * 0.2 * magnitude,
        FlowImpact::Faucet => -sign * dominant_role_count * 0.3 * magnitude,
        FlowImpact::Mixed => sign * faucet_volume * 0.15 * magnitude,
        FlowImpact::Neutral => sign * dominant_role_count * 0.5 * magnitude * 0.1,
        FlowImpact::Friction | FlowImpact::Redistribution => 0.0,
    };
    // Volatility-proportional noise.
    let sigma = 0.05 * (net_flow.abs() + 1.0);
    *net_flow += delta + gaussian(rng) * sigma;
    *supply = (*supply + *net_flow).max(0.0);
}

/// The metric the action is trying to move.
fn target_value(m: &EconomyMetrics, impact: FlowImpact, action: &SuggestedAction) -> f64 {
    match impact {
        FlowImpact::Friction => m.velocity,
        FlowImpact::Redistribution => m.gini_coefficient,
        _ => match action.scope.as_ref().and_then(|s| s.currency.as_ref()) {
            Some(currency) => m.net_flow_for(currency),
            None => m.net_flow,
        },
    }
}

fn crossed_zero(baseline: f64, endpoint: f64) -> bool {
    if baseline == 0.0 {
        return false;
    }
    endpoint == 0.0 || baseline.signum() != endpoint.signum()
}

fn gaussian(rng: &mut ChaCha8Rng) -> f64 {
    // Box-Muller; avoids ln(0) by nudging the uniform sample off zero.
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Critical bounds that must not be crossed *newly* by the median outcome.
fn check_no_new_problems(
    baseline: &EconomyMetrics,
    p50: &EconomyMetrics,
    t: &Thresholds,
) -> bool {
    let newly = |before: f64, after: f64, limit: f64| before <= limit && after > limit;
    if newly(
        baseline.gini_coefficient,
        p50.gini_coefficient,
        t.gini_red,
    ) {
        return false;
    }
    if newly(
        baseline.inflation_rate.abs(),
        p50.inflation_rate.abs(),
        t.inflation_critical,
    ) {
        return false;
    }
    if newly(
        baseline.arbitrage_index,
        p50.arbitrage_index,
        t.arbitrage_index_critical,
    ) {
        return false;
    }
    if newly(
        baseline.net_flow.abs(),
        p50.net_flow.abs(),
        2.0 * t.net_flow_warn,
    ) {
        return false;
    }
    // Satisfaction breaks downward.
    if baseline.avg_satisfaction >= t.satisfaction_floor
        && p50.avg_satisfaction < t.satisfaction_floor
    {
        return false;
    }
    true
}

/// Element-wise percentile across endpoint snapshots for the scalar fields;
/// non-scalar fields keep the last endpoint's values.
fn percentile_metrics(endpoints: &[EconomyMetrics], p: f64) -> EconomyMetrics {
    fold_metrics(endpoints, |values| {
        let mut data = Data::new(values);
        data.percentile(p as usize)
    })
}

fn mean_metrics(endpoints: &[EconomyMetrics]) -> EconomyMetrics {
    fold_metrics(endpoints, |values| {
        Data::new(values).mean().unwrap_or(f64::NAN)
    })
}

fn fold_metrics<F>(endpoints: &[EconomyMetrics], fold: F) -> EconomyMetrics
where
    F: Fn(Vec<f64>) -> f64,
{
    let last = endpoints.last().cloned().unwrap_or_default();
    let mut out = last;

    macro_rules! fold_scalar {
        ($($field:ident),+ $(,)?) => {
            $(
                let values: Vec<f64> = endpoints
                    .iter()
                    .map(|m| m.$field)
                    .filter(|v| v.is_finite())
                    .collect();
                if !values.is_empty() {
                    out.$field = fold(values);
                }
            )+
        };
    }
    fold_scalar!(
        total_supply,
        net_flow,
        velocity,
        inflation_rate,
        gini_coefficient,
        avg_satisfaction,
        churn_rate,
        faucet_volume,
        sink_volume,
        tap_sink_ratio,
        arbitrage_index,
        price_index,
    );

    // Per-currency flow maps matter for scoped rollback checks.
    let currencies: Vec<String> = out.net_flow_by_currency.keys().cloned().collect();
    for currency in currencies {
        let values: Vec<f64> = endpoints
            .iter()
            .filter_map(|m| m.net_flow_by_currency.get(&currency))
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        if !values.is_empty() {
            out.net_flow_by_currency.insert(currency, fold(values));
        }
    }

    out
}
