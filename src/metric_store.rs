//! Multi-resolution metric store.
//! Mission: Bounded memory, three time horizons, one source of truth
//!
//! Fine records every tick; medium and coarse are window means. Each
//! resolution lives in a fixed-capacity ring so memory never grows.

use crate::observer::EconomyMetrics;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

const RING_CAPACITY: usize = 200;
const DEFAULT_MEDIUM_WINDOW: usize = 10;
const DEFAULT_COARSE_WINDOW: usize = 60;

/// Satisfaction gap between fine and coarse horizons that flags divergence.
const DIVERGENCE_GAP: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Fine,
    Medium,
    Coarse,
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fine" => Ok(Resolution::Fine),
            "medium" => Ok(Resolution::Medium),
            "coarse" => Ok(Resolution::Coarse),
            other => Err(format!("unknown resolution: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricQuery {
    pub metric: String,
    pub resolution: Option<Resolution>,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    pub tick: u64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub tick: u64,
    pub health: f64,
}

pub struct MetricStore {
    fine: VecDeque<EconomyMetrics>,
    medium: VecDeque<EconomyMetrics>,
    coarse: VecDeque<EconomyMetrics>,
    medium_buf: Vec<EconomyMetrics>,
    coarse_buf: Vec<EconomyMetrics>,
    medium_window: usize,
    coarse_window: usize,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::with_windows(DEFAULT_MEDIUM_WINDOW, DEFAULT_COARSE_WINDOW)
    }

    pub fn with_windows(medium_window: usize, coarse_window: usize) -> Self {
        Self {
            fine: VecDeque::with_capacity(RING_CAPACITY),
            medium: VecDeque::with_capacity(RING_CAPACITY),
            coarse: VecDeque::with_capacity(RING_CAPACITY),
            medium_buf: Vec::new(),
            coarse_buf: Vec::new(),
            medium_window: medium_window.max(1),
            coarse_window: coarse_window.max(1),
        }
    }

    pub fn record(&mut self, m: EconomyMetrics) {
        push_bounded(&mut self.fine, m.clone());

        self.medium_buf.push(m.clone());
        if self.medium_buf.len() >= self.medium_window {
            let aggregated = aggregate(&self.medium_buf);
            push_bounded(&mut self.medium, aggregated);
            self.medium_buf.clear();
        }

        self.coarse_buf.push(m);
        if self.coarse_buf.len() >= self.coarse_window {
            let aggregated = aggregate(&self.coarse_buf);
            push_bounded(&mut self.coarse, aggregated);
            self.coarse_buf.clear();
        }
    }

    pub fn latest(&self, resolution: Resolution) -> Option<&EconomyMetrics> {
        self.ring(resolution).back()
    }

    pub fn len(&self, resolution: Resolution) -> usize {
        self.ring(resolution).len()
    }

    /// Dotted-path time series. Unresolvable paths yield NaN values rather
    /// than an error.
    pub fn query(&self, q: &MetricQuery) -> Vec<MetricPoint> {
        let ring = self.ring(q.resolution.unwrap_or(Resolution::Fine));
        ring.iter()
            .filter(|m| q.from.map_or(true, |from| m.tick >= from))
            .filter(|m| q.to.map_or(true, |to| m.tick <= to))
            .map(|m| MetricPoint {
                tick: m.tick,
                value: m.value_at_path(&q.metric),
            })
            .collect()
    }

    /// Last `n` fine entries, oldest first, with precomputed health.
    pub fn recent_history(&self, n: usize) -> Vec<HistoryPoint> {
        let skip = self.fine.len().saturating_sub(n);
        self.fine
            .iter()
            .skip(skip)
            .map(|m| HistoryPoint {
                tick: m.tick,
                health: m.health(),
            })
            .collect()
    }

    /// True when the fine and coarse satisfaction horizons disagree sharply -
    /// a hint that the short-term picture is misleading.
    pub fn divergence_detected(&self) -> bool {
        match (self.fine.back(), self.coarse.back()) {
            (Some(fine), Some(coarse)) => {
                (fine.avg_satisfaction - coarse.avg_satisfaction).abs() > DIVERGENCE_GAP
            }
            _ => false,
        }
    }

    pub fn latest_health(&self) -> f64 {
        self.fine.back().map(|m| m.health()).unwrap_or(100.0)
    }

    fn ring(&self, resolution: Resolution) -> &VecDeque<EconomyMetrics> {
        match resolution {
            Resolution::Fine => &self.fine,
            Resolution::Medium => &self.medium,
            Resolution::Coarse => &self.coarse,
        }
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded(ring: &mut VecDeque<EconomyMetrics>, m: EconomyMetrics) {
    if ring.len() >= RING_CAPACITY {
        ring.pop_front();
    }
    ring.push_back(m);
}

/// Window aggregate: scalars are NaN-ignoring arithmetic means, maps are
/// key-wise means over the union of keys (absent keys are skipped, not
/// treated as zero), arrays and other non-numeric fields keep the last
/// snapshot's value.
fn aggregate(window: &[EconomyMetrics]) -> EconomyMetrics {
    let last = window
        .last()
        .expect("aggregate called with non-empty window");
    let mut out = last.clone();

    macro_rules! mean_scalar {
        ($($field:ident),+ $(,)?) => {
            $(out.$field = nan_mean(window.iter().map(|m| m.$field));)+
        };
    }
    mean_scalar!(
        total_supply,
        net_flow,
        velocity,
        inflation_rate,
        gini_coefficient,
        mean_balance,
        median_balance,
        top10_pct_share,
        mean_median_divergence,
        avg_satisfaction,
        churn_rate,
        faucet_volume,
        sink_volume,
        tap_sink_ratio,
        production_index,
        capacity_usage,
        anchor_ratio_drift,
        arbitrage_index,
        price_index,
        extraction_ratio,
        new_user_dependency,
        gift_trade_ratio,
        disposal_trade_ratio,
        event_completion_rate,
        content_drop_age,
        blocked_agent_count,
        total_agents,
    );

    macro_rules! mean_map {
        ($($field:ident),+ $(,)?) => {
            $(out.$field = keywise_mean(window.iter().map(|m| &m.$field));)+
        };
    }
    mean_map!(
        total_supply_by_currency,
        net_flow_by_currency,
        velocity_by_currency,
        inflation_rate_by_currency,
        gini_coefficient_by_currency,
        mean_balance_by_currency,
        median_balance_by_currency,
        top10_pct_share_by_currency,
        mean_median_divergence_by_currency,
        faucet_volume_by_currency,
        sink_volume_by_currency,
        arbitrage_index_by_currency,
        population_by_role,
        role_shares,
        supply_by_resource,
        prices,
        flow_by_system,
        flow_by_source,
        activity_by_system,
        participants_by_system,
        custom,
    );

    out
}

fn nan_mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        if v.is_finite() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn keywise_mean<'a>(
    maps: impl Iterator<Item = &'a HashMap<String, f64>>,
) -> HashMap<String, f64> {
    let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
    for map in maps {
        for (key, value) in map {
            if value.is_finite() {
                let entry = sums.entry(key.clone()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count.max(1) as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(tick: u64, satisfaction: f64) -> EconomyMetrics {
        EconomyMetrics {
            tick,
            avg_satisfaction: satisfaction,
            ..Default::default()
        }
    }

    #[test]
    fn latest_fine_reflects_single_record() {
        let mut store = MetricStore::new();
        let mut m = metrics(5, 80.0);
        m.net_flow = 3.5;
        m.net_flow_by_currency.insert("gold".into(), 3.5);
        store.record(m);

        let latest = store.latest(Resolution::Fine).unwrap();
        assert_eq!(latest.tick, 5);
        assert_eq!(latest.net_flow, 3.5);
        assert_eq!(latest.net_flow_by_currency["gold"], 3.5);
    }

    #[test]
    fn identical_snapshots_aggregate_to_themselves() {
        let mut store = MetricStore::with_windows(4, 60);
        for tick in 0..4 {
            let mut m = metrics(tick, 66.0);
            m.net_flow = 2.0;
            m.gini_coefficient = 0.3;
            m.population_by_role.insert("farmer".into(), 7.0);
            store.record(m);
        }
        let medium = store.latest(Resolution::Medium).unwrap();
        assert_eq!(medium.avg_satisfaction, 66.0);
        assert_eq!(medium.net_flow, 2.0);
        assert_eq!(medium.gini_coefficient, 0.3);
        assert_eq!(medium.population_by_role["farmer"], 7.0);
    }

    #[test]
    fn aggregation_skips_absent_map_keys() {
        let mut store = MetricStore::with_windows(2, 60);
        let mut a = metrics(0, 50.0);
        a.flow_by_system.insert("crafting".into(), 10.0);
        let b = metrics(1, 50.0); // no crafting entry at all
        store.record(a);
        store.record(b);

        let medium = store.latest(Resolution::Medium).unwrap();
        // Absent means skipped: mean over one observation, not (10+0)/2.
        assert_eq!(medium.flow_by_system["crafting"], 10.0);
    }

    #[test]
    fn aggregation_ignores_nan_scalars() {
        let mut store = MetricStore::with_windows(2, 60);
        let mut a = metrics(0, 50.0);
        a.event_completion_rate = f64::NAN;
        let mut b = metrics(1, 50.0);
        b.event_completion_rate = 0.8;
        store.record(a);
        store.record(b);

        let medium = store.latest(Resolution::Medium).unwrap();
        assert_eq!(medium.event_completion_rate, 0.8);
    }

    #[test]
    fn rings_stay_bounded() {
        let mut store = MetricStore::with_windows(1, 1);
        for tick in 0..500 {
            store.record(metrics(tick, 70.0));
        }
        assert_eq!(store.len(Resolution::Fine), RING_CAPACITY);
        assert_eq!(store.len(Resolution::Medium), RING_CAPACITY);
        assert_eq!(store.len(Resolution::Coarse), RING_CAPACITY);
    }

    #[test]
    fn query_filters_by_tick_range_and_yields_nan_for_bad_paths() {
        let mut store = MetricStore::new();
        for tick in 0..10 {
            let mut m = metrics(tick, 70.0);
            m.net_flow = tick as f64;
            store.record(m);
        }
        let points = store.query(&MetricQuery {
            metric: "netFlow".to_string(),
            resolution: None,
            from: Some(3),
            to: Some(5),
        });
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].value, 3.0);

        let bad = store.query(&MetricQuery {
            metric: "noSuch.path".to_string(),
            ..Default::default()
        });
        assert!(bad.iter().all(|p| p.value.is_nan()));
    }

    #[test]
    fn divergence_requires_both_horizons() {
        let mut store = MetricStore::with_windows(2, 2);
        assert!(!store.divergence_detected());
        store.record(metrics(0, 90.0));
        store.record(metrics(1, 90.0)); // coarse entry at satisfaction 90
        assert!(!store.divergence_detected());
        store.record(metrics(2, 40.0)); // fine now 40, coarse still 90
        assert!(store.divergence_detected());
    }

    #[test]
    fn recent_history_carries_health() {
        let mut store = MetricStore::new();
        let mut m = metrics(1, 40.0); // -25 health
        m.churn_rate = 0.2; // -15
        store.record(m);
        let history = store.recent_history(5);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].health, 60.0);
    }
}
