//! Observer - derives a fresh `EconomyMetrics` from each host snapshot.
//! Mission: One pass over balances and events, no NaN leaks, no surprises
//!
//! Pure apart from two bounded pieces of state: the previous tick's metrics
//! (for deltas like inflation) and a short engagement ring used to detect
//! cyclical peaks and valleys.

pub mod metrics;
pub mod persona;

pub use metrics::EconomyMetrics;
pub use persona::PersonaTracker;

use crate::models::{EconomicEvent, EconomyState, EventKind};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Engagement ring length; local extrema are detected inside this window.
const ENGAGEMENT_WINDOW: usize = 60;

/// Neutral satisfaction assumed when the host reports none. Keeps
/// satisfaction-driven principles quiet for hosts that never measure it.
const SATISFACTION_UNREPORTED: f64 = 70.0;

#[derive(Debug, Default)]
struct CurrencyFlows {
    faucet: f64,
    sink: f64,
    trade: f64,
    transfer: f64,
    consume: f64,
}

#[derive(Clone)]
pub struct Observer {
    prev: Option<EconomyMetrics>,
    engagement: VecDeque<f64>,
    personas: PersonaTracker,
}

impl Observer {
    pub fn new() -> Self {
        Self {
            prev: None,
            engagement: VecDeque::with_capacity(ENGAGEMENT_WINDOW),
            personas: PersonaTracker::new(),
        }
    }

    /// Compute the metrics for one tick. `events` are the events belonging to
    /// this tick only; they are discarded afterwards.
    pub fn observe(
        &mut self,
        state: &EconomyState,
        events: &[EconomicEvent],
        persona_distribution: Option<&HashMap<String, f64>>,
    ) -> EconomyMetrics {
        if let Some(dist) = persona_distribution {
            self.personas.record(dist);
        }

        let mut m = EconomyMetrics {
            tick: state.tick,
            ..Default::default()
        };

        let agents: Vec<&String> = state.agent_balances.keys().collect();
        let total_agents = state.total_agents() as f64;
        m.total_agents = total_agents;

        // Per-currency balance statistics.
        for currency in &state.currencies {
            let balances: Vec<f64> = agents
                .iter()
                .map(|a| {
                    state.agent_balances[*a]
                        .get(currency)
                        .copied()
                        .filter(|v| v.is_finite())
                        .unwrap_or(0.0)
                })
                .collect();
            let supply: f64 = balances.iter().sum();
            m.total_supply_by_currency.insert(currency.clone(), supply);
            m.mean_balance_by_currency
                .insert(currency.clone(), mean(&balances));
            m.median_balance_by_currency
                .insert(currency.clone(), median(&balances));
            m.gini_coefficient_by_currency
                .insert(currency.clone(), gini(&balances));
            m.top10_pct_share_by_currency
                .insert(currency.clone(), top_decile_share(&balances));
            let mean_c = mean(&balances);
            let divergence = (mean_c - median(&balances)).abs() / mean_c.max(1.0);
            m.mean_median_divergence_by_currency
                .insert(currency.clone(), divergence);
        }
        m.total_supply = m.total_supply_by_currency.values().sum();

        // Aggregate wealth statistics over per-agent totals across currencies.
        let totals: Vec<f64> = agents
            .iter()
            .map(|a| {
                state.agent_balances[*a]
                    .values()
                    .filter(|v| v.is_finite())
                    .sum::<f64>()
            })
            .collect();
        m.mean_balance = mean(&totals);
        m.median_balance = median(&totals);
        m.gini_coefficient = gini(&totals);
        m.top10_pct_share = top_decile_share(&totals);
        m.mean_median_divergence =
            (m.mean_balance - m.median_balance).abs() / m.mean_balance.max(1.0);

        self.aggregate_events(state, events, &mut m, &totals, &agents);

        // Per-currency derived flow metrics. Quiet currencies still get
        // explicit zero entries so per-currency principles see them.
        for currency in &state.currencies {
            let supply = m.total_supply_by_currency[currency];
            let faucet = *m
                .faucet_volume_by_currency
                .entry(currency.clone())
                .or_insert(0.0);
            let sink = *m
                .sink_volume_by_currency
                .entry(currency.clone())
                .or_insert(0.0);
            m.velocity_by_currency.entry(currency.clone()).or_insert(0.0);
            m.arbitrage_index_by_currency
                .entry(currency.clone())
                .or_insert(0.0);
            m.net_flow_by_currency
                .insert(currency.clone(), faucet - sink);

            let prev_supply = self
                .prev
                .as_ref()
                .and_then(|p| p.total_supply_by_currency.get(currency))
                .copied();
            let inflation = match prev_supply {
                Some(prev) => (supply - prev) / prev.max(1.0),
                None => 0.0,
            };
            m.inflation_rate_by_currency
                .insert(currency.clone(), inflation);
        }
        m.faucet_volume = m.faucet_volume_by_currency.values().sum();
        m.sink_volume = m.sink_volume_by_currency.values().sum();
        m.net_flow = m.faucet_volume - m.sink_volume;
        m.tap_sink_ratio = m.faucet_volume / m.sink_volume.max(1.0);
        m.inflation_rate = match self.prev.as_ref().map(|p| p.total_supply) {
            Some(prev) => (m.total_supply - prev) / prev.max(1.0),
            None => 0.0,
        };

        self.observe_prices(state, &mut m);
        self.observe_population(state, &mut m, total_agents);
        self.observe_satisfaction(state, &mut m);
        self.observe_inventories(state, &mut m);
        self.observe_custom(state, &mut m);
        self.observe_engagement(&mut m);

        m.systems = state.systems.clone().unwrap_or_default();
        m.sources = state.sources.clone().unwrap_or_default();
        m.sinks = state.sinks.clone().unwrap_or_default();

        scrub_nans(&mut m);
        debug!(
            tick = m.tick,
            supply = m.total_supply,
            net_flow = m.net_flow,
            agents = m.total_agents,
            "observed economy"
        );

        self.prev = Some(m.clone());
        m
    }

    fn aggregate_events(
        &self,
        state: &EconomyState,
        events: &[EconomicEvent],
        m: &mut EconomyMetrics,
        agent_totals: &[f64],
        agents: &[&String],
    ) {
        let primary = state.primary_currency().unwrap_or("").to_string();
        let mut flows: HashMap<String, CurrencyFlows> = HashMap::new();
        let mut produce_volume = 0.0;
        let mut churn_count = 0usize;
        let mut participants: HashMap<String, HashSet<String>> = HashMap::new();

        // Top-decile holders by total balance, for extraction tracking.
        let top_holders: HashSet<&str> = {
            let mut ranked: Vec<(usize, f64)> = agent_totals
                .iter()
                .copied()
                .enumerate()
                .filter(|(_, v)| *v > 0.0)
                .collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let keep = div_ceil(ranked.len(), 10);
            ranked
                .into_iter()
                .take(keep)
                .map(|(i, _)| agents[i].as_str())
                .collect()
        };
        let mut extracted_volume = 0.0;

        for event in events {
            let amount = event.amount_or_zero();
            let currency = event
                .currency
                .clone()
                .unwrap_or_else(|| primary.clone());
            let entry = flows.entry(currency).or_default();

            match event.kind {
                EventKind::Mint | EventKind::Enter => entry.faucet += amount,
                EventKind::Burn => entry.sink += amount,
                EventKind::Consume => {
                    entry.sink += amount;
                    entry.consume += amount;
                }
                EventKind::Trade => {
                    entry.trade += amount;
                    if let Some(to) = &event.to {
                        if top_holders.contains(to.as_str()) {
                            extracted_volume += amount;
                        }
                    }
                }
                EventKind::Transfer => entry.transfer += amount,
                EventKind::Produce => produce_volume += amount,
                EventKind::Churn => churn_count += 1,
                EventKind::RoleChange => {}
            }

            // Onboarding bonuses are global faucets; keep them out of the
            // system/source local aggregates.
            if event.kind != EventKind::Enter {
                let signed = if event.kind.is_faucet() {
                    amount
                } else if event.kind.is_sink() {
                    -amount
                } else {
                    0.0
                };
                if let Some(system) = &event.system {
                    if signed != 0.0 {
                        *m.flow_by_system.entry(system.clone()).or_insert(0.0) += signed;
                    }
                    *m.activity_by_system.entry(system.clone()).or_insert(0.0) += amount;
                    if !event.actor.is_empty() {
                        participants
                            .entry(system.clone())
                            .or_default()
                            .insert(event.actor.clone());
                    }
                }
                if let Some(source) = &event.source_or_sink {
                    if signed != 0.0 {
                        *m.flow_by_source.entry(source.clone()).or_insert(0.0) += signed;
                    }
                }
            }
        }

        let mut total_trade = 0.0;
        let mut total_transfer = 0.0;
        let mut total_consume = 0.0;
        for (currency, f) in flows {
            total_trade += f.trade;
            total_transfer += f.transfer;
            total_consume += f.consume;
            let supply = m
                .total_supply_by_currency
                .get(&currency)
                .copied()
                .unwrap_or(0.0);
            m.velocity_by_currency
                .insert(currency.clone(), f.trade / supply.max(1.0));
            m.faucet_volume_by_currency.insert(currency.clone(), f.faucet);
            m.sink_volume_by_currency.insert(currency, f.sink);
        }

        m.velocity = total_trade / m.total_supply.max(1.0);
        m.churn_rate = churn_count as f64 / m.total_agents.max(1.0);
        m.production_index = produce_volume / total_consume.max(1.0);
        m.gift_trade_ratio = total_transfer / (total_trade + total_transfer).max(1.0);
        m.disposal_trade_ratio = total_consume / (total_trade + total_consume).max(1.0);
        m.extraction_ratio = extracted_volume / total_trade.max(1.0);
        m.new_user_dependency = {
            let enter_volume: f64 = events
                .iter()
                .filter(|e| e.kind == EventKind::Enter)
                .map(|e| e.amount_or_zero())
                .sum();
            enter_volume / m.faucet_volume_by_currency.values().sum::<f64>().max(1.0)
        };
        for (system, actors) in participants {
            m.participants_by_system
                .insert(system, actors.len() as f64);
        }
    }

    fn observe_prices(&self, state: &EconomyState, m: &mut EconomyMetrics) {
        m.prices_by_currency = state.market_prices.clone();
        m.pool_sizes_by_currency = state.pool_sizes.clone();

        let mut price_sums: HashMap<String, (f64, usize)> = HashMap::new();
        let mut all_prices: Vec<f64> = Vec::new();
        for (currency, by_resource) in &state.market_prices {
            let positive: Vec<f64> = by_resource
                .values()
                .copied()
                .filter(|p| p.is_finite() && *p > 0.0)
                .collect();
            m.arbitrage_index_by_currency
                .insert(currency.clone(), arbitrage_index(&positive));
            for (resource, price) in by_resource {
                if price.is_finite() && *price > 0.0 {
                    let entry = price_sums.entry(resource.clone()).or_insert((0.0, 0));
                    entry.0 += price;
                    entry.1 += 1;
                    all_prices.push(*price);
                }
            }
        }
        for (resource, (sum, count)) in price_sums {
            m.prices.insert(resource, sum / count as f64);
        }
        m.price_index = mean(&all_prices);
        m.arbitrage_index = arbitrage_index(&all_prices);

        m.anchor_ratio_drift = match self.prev.as_ref() {
            Some(prev) if prev.price_index > 0.0 => {
                (m.price_index - prev.price_index).abs() / prev.price_index.max(1.0)
            }
            _ => 0.0,
        };
    }

    fn observe_population(&self, state: &EconomyState, m: &mut EconomyMetrics, total: f64) {
        for role in state.agent_roles.values() {
            *m.population_by_role.entry(role.clone()).or_insert(0.0) += 1.0;
        }

        // Fallback: empty or single-role populations are assumed unreported;
        // scale the supplied persona distribution instead.
        let degenerate = m.population_by_role.len() <= 1;
        if degenerate && !self.personas.is_empty() {
            let shares = self.personas.smoothed();
            if !shares.is_empty() {
                m.population_by_role = shares
                    .iter()
                    .map(|(role, share)| (role.clone(), share * total))
                    .collect();
            }
        }

        let pop_total: f64 = m.population_by_role.values().sum();
        if pop_total > 0.0 {
            m.role_shares = m
                .population_by_role
                .iter()
                .map(|(role, count)| (role.clone(), count / pop_total))
                .collect();
        }
    }

    fn observe_satisfaction(&self, state: &EconomyState, m: &mut EconomyMetrics) {
        m.avg_satisfaction = match &state.agent_satisfaction {
            Some(map) if !map.is_empty() => {
                let values: Vec<f64> = map
                    .values()
                    .copied()
                    .filter(|v| v.is_finite())
                    .map(|v| v.clamp(0.0, 100.0))
                    .collect();
                if values.is_empty() {
                    SATISFACTION_UNREPORTED
                } else {
                    mean(&values)
                }
            }
            _ => SATISFACTION_UNREPORTED,
        };
    }

    fn observe_inventories(&self, state: &EconomyState, m: &mut EconomyMetrics) {
        for inventory in state.agent_inventories.values() {
            for (resource, quantity) in inventory {
                if quantity.is_finite() {
                    *m.supply_by_resource.entry(resource.clone()).or_insert(0.0) += quantity;
                }
            }
        }

        let blocked = state
            .agent_balances
            .values()
            .filter(|balances| {
                !balances.is_empty()
                    && balances.values().all(|v| !v.is_finite() || *v <= 0.0)
            })
            .count();
        m.blocked_agent_count = blocked as f64;
    }

    fn observe_custom(&self, state: &EconomyState, m: &mut EconomyMetrics) {
        if let Some(custom) = &state.custom {
            m.custom = custom
                .iter()
                .filter(|(_, v)| v.is_finite())
                .map(|(k, v)| (k.clone(), *v))
                .collect();
        }
        m.event_completion_rate = m
            .custom
            .get("eventCompletionRate")
            .copied()
            .unwrap_or(f64::NAN);
        m.content_drop_age = m.custom.get("contentDropAge").copied().unwrap_or(0.0);
        m.capacity_usage = m.custom.get("capacityUsage").copied().unwrap_or(0.0);
    }

    /// Track `velocity x totalAgents` as an engagement proxy and surface the
    /// local extrema of the retained window.
    fn observe_engagement(&mut self, m: &mut EconomyMetrics) {
        let signal = m.velocity * m.total_agents;
        if self.engagement.len() >= ENGAGEMENT_WINDOW {
            self.engagement.pop_front();
        }
        self.engagement.push_back(signal);

        let window: Vec<f64> = self.engagement.iter().copied().collect();
        for i in 1..window.len().saturating_sub(1) {
            if window[i] > window[i - 1] && window[i] > window[i + 1] {
                m.cyclical_peaks.push(window[i]);
            } else if window[i] < window[i - 1] && window[i] < window[i + 1] {
                m.cyclical_valleys.push(window[i]);
            }
        }
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}

fn div_ceil(n: usize, d: usize) -> usize {
    (n + d - 1) / d.max(1)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Standard Lorenz-curve Gini over non-zero balances; 0 when one or fewer
/// holders.
fn gini(balances: &[f64]) -> f64 {
    let mut holders: Vec<f64> = balances.iter().copied().filter(|b| *b > 0.0).collect();
    if holders.len() <= 1 {
        return 0.0;
    }
    holders.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = holders.len() as f64;
    let total: f64 = holders.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = holders
        .iter()
        .enumerate()
        .map(|(i, b)| (i as f64 + 1.0) * b)
        .sum();
    ((2.0 * weighted) / (n * total) - (n + 1.0) / n).max(0.0)
}

/// Share of total supply held by the top ceil(n/10) holders.
fn top_decile_share(balances: &[f64]) -> f64 {
    let mut holders: Vec<f64> = balances.iter().copied().filter(|b| *b > 0.0).collect();
    if holders.is_empty() {
        return 0.0;
    }
    holders.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let total: f64 = holders.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let keep = div_ceil(holders.len(), 10);
    holders.iter().take(keep).sum::<f64>() / total
}

/// `min(1, stddev(ln p))` over positive prices; 0 when fewer than two prices
/// or all equal.
fn arbitrage_index(prices: &[f64]) -> f64 {
    let logs: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| *p > 0.0 && p.is_finite())
        .map(|p| p.ln())
        .collect();
    if logs.len() < 2 {
        return 0.0;
    }
    let mu = mean(&logs);
    let variance = logs.iter().map(|l| (l - mu).powi(2)).sum::<f64>() / logs.len() as f64;
    let sd = variance.sqrt();
    if sd < 1e-12 {
        return 0.0;
    }
    sd.min(1.0)
}

/// Replace NaN scalars with 0 so they never leak into principles or the
/// simulator. `eventCompletionRate` is the single sanctioned exception.
fn scrub_nans(m: &mut EconomyMetrics) {
    let scalars: [&mut f64; 26] = [
        &mut m.total_supply,
        &mut m.net_flow,
        &mut m.velocity,
        &mut m.inflation_rate,
        &mut m.gini_coefficient,
        &mut m.mean_balance,
        &mut m.median_balance,
        &mut m.top10_pct_share,
        &mut m.mean_median_divergence,
        &mut m.avg_satisfaction,
        &mut m.churn_rate,
        &mut m.faucet_volume,
        &mut m.sink_volume,
        &mut m.tap_sink_ratio,
        &mut m.production_index,
        &mut m.capacity_usage,
        &mut m.anchor_ratio_drift,
        &mut m.arbitrage_index,
        &mut m.price_index,
        &mut m.extraction_ratio,
        &mut m.new_user_dependency,
        &mut m.gift_trade_ratio,
        &mut m.disposal_trade_ratio,
        &mut m.content_drop_age,
        &mut m.blocked_agent_count,
        &mut m.total_agents,
    ];
    for value in scalars {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    for map in [
        &mut m.total_supply_by_currency,
        &mut m.net_flow_by_currency,
        &mut m.velocity_by_currency,
        &mut m.inflation_rate_by_currency,
        &mut m.gini_coefficient_by_currency,
        &mut m.mean_balance_by_currency,
        &mut m.median_balance_by_currency,
        &mut m.top10_pct_share_by_currency,
        &mut m.mean_median_divergence_by_currency,
        &mut m.faucet_volume_by_currency,
        &mut m.sink_volume_by_currency,
        &mut m.arbitrage_index_by_currency,
    ] {
        for value in map.values_mut() {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
    }
}
