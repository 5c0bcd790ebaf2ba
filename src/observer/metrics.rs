//! The fully derived per-tick metrics record and its dotted-path resolver.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the engine knows about the economy at one tick, derived from the
/// host snapshot by the observer. Scalars exist in aggregate form plus
/// per-currency maps; principles prefer the per-currency form when currencies
/// are declared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EconomyMetrics {
    pub tick: u64,

    // Aggregate scalars
    pub total_supply: f64,
    pub net_flow: f64,
    pub velocity: f64,
    pub inflation_rate: f64,
    pub gini_coefficient: f64,
    pub mean_balance: f64,
    pub median_balance: f64,
    pub top10_pct_share: f64,
    pub mean_median_divergence: f64,
    pub avg_satisfaction: f64,
    pub churn_rate: f64,
    pub faucet_volume: f64,
    pub sink_volume: f64,
    pub tap_sink_ratio: f64,
    pub production_index: f64,
    pub capacity_usage: f64,
    pub anchor_ratio_drift: f64,
    pub arbitrage_index: f64,
    pub price_index: f64,
    pub extraction_ratio: f64,
    pub new_user_dependency: f64,
    pub gift_trade_ratio: f64,
    pub disposal_trade_ratio: f64,
    /// May be NaN to signal "not applicable"; principles must check.
    pub event_completion_rate: f64,
    pub content_drop_age: f64,
    pub blocked_agent_count: f64,
    pub total_agents: f64,

    // Per-currency versions of the flow/wealth scalars
    pub total_supply_by_currency: HashMap<String, f64>,
    pub net_flow_by_currency: HashMap<String, f64>,
    pub velocity_by_currency: HashMap<String, f64>,
    pub inflation_rate_by_currency: HashMap<String, f64>,
    pub gini_coefficient_by_currency: HashMap<String, f64>,
    pub mean_balance_by_currency: HashMap<String, f64>,
    pub median_balance_by_currency: HashMap<String, f64>,
    pub top10_pct_share_by_currency: HashMap<String, f64>,
    pub mean_median_divergence_by_currency: HashMap<String, f64>,
    pub faucet_volume_by_currency: HashMap<String, f64>,
    pub sink_volume_by_currency: HashMap<String, f64>,
    pub arbitrage_index_by_currency: HashMap<String, f64>,

    // Structural maps
    pub population_by_role: HashMap<String, f64>,
    pub role_shares: HashMap<String, f64>,
    pub supply_by_resource: HashMap<String, f64>,
    /// resource -> mean price across currencies
    pub prices: HashMap<String, f64>,
    /// currency -> resource -> price
    pub prices_by_currency: HashMap<String, HashMap<String, f64>>,
    /// currency -> pool name -> size
    pub pool_sizes_by_currency: HashMap<String, HashMap<String, f64>>,
    pub flow_by_system: HashMap<String, f64>,
    pub flow_by_source: HashMap<String, f64>,
    pub activity_by_system: HashMap<String, f64>,
    pub participants_by_system: HashMap<String, f64>,

    pub cyclical_peaks: Vec<f64>,
    pub cyclical_valleys: Vec<f64>,

    /// Host-supplied custom gauges, passed through verbatim.
    pub custom: HashMap<String, f64>,

    pub systems: Vec<String>,
    pub sources: Vec<String>,
    pub sinks: Vec<String>,
}

impl EconomyMetrics {
    /// Health score in [0, 100]. Thresholds here are fixed by contract, not
    /// tunable: satisfaction bands at 65/50, Gini at 0.45/0.60, net flow at
    /// 10/20, churn at 0.05.
    pub fn health(&self) -> f64 {
        let mut score: f64 = 100.0;
        if self.avg_satisfaction < 65.0 {
            score -= 15.0;
        }
        if self.avg_satisfaction < 50.0 {
            score -= 10.0;
        }
        if self.gini_coefficient > 0.45 {
            score -= 15.0;
        }
        if self.gini_coefficient > 0.60 {
            score -= 10.0;
        }
        if self.net_flow.abs() > 10.0 {
            score -= 15.0;
        }
        if self.net_flow.abs() > 20.0 {
            score -= 10.0;
        }
        if self.churn_rate > 0.05 {
            score -= 15.0;
        }
        score.clamp(0.0, 100.0)
    }

    /// Resolve a dotted metric path ("avgSatisfaction",
    /// "netFlowByCurrency.gold", "poolSizesByCurrency.main.gold"). Unresolved
    /// segments yield NaN rather than errors; the rollback loop treats that
    /// NaN as a fail-safe trigger.
    pub fn value_at_path(&self, path: &str) -> f64 {
        let mut segments = path.split('.');
        let head = match segments.next() {
            Some(h) if !h.is_empty() => h,
            _ => return f64::NAN,
        };
        let rest: Vec<&str> = segments.collect();

        if rest.is_empty() {
            return self.scalar(head).unwrap_or(f64::NAN);
        }

        if let Some(map) = self.flat_map(head) {
            return match rest.as_slice() {
                [key] => map.get(*key).copied().unwrap_or(f64::NAN),
                _ => f64::NAN,
            };
        }

        if let Some(nested) = self.nested_map(head) {
            return match rest.as_slice() {
                [outer, inner] => nested
                    .get(*outer)
                    .and_then(|m| m.get(*inner))
                    .copied()
                    .unwrap_or(f64::NAN),
                _ => f64::NAN,
            };
        }

        f64::NAN
    }

    fn scalar(&self, name: &str) -> Option<f64> {
        let v = match name {
            "tick" => self.tick as f64,
            "totalSupply" => self.total_supply,
            "netFlow" => self.net_flow,
            "velocity" => self.velocity,
            "inflationRate" => self.inflation_rate,
            "giniCoefficient" => self.gini_coefficient,
            "meanBalance" => self.mean_balance,
            "medianBalance" => self.median_balance,
            "top10PctShare" => self.top10_pct_share,
            "meanMedianDivergence" => self.mean_median_divergence,
            "avgSatisfaction" => self.avg_satisfaction,
            "churnRate" => self.churn_rate,
            "faucetVolume" => self.faucet_volume,
            "sinkVolume" => self.sink_volume,
            "tapSinkRatio" => self.tap_sink_ratio,
            "productionIndex" => self.production_index,
            "capacityUsage" => self.capacity_usage,
            "anchorRatioDrift" => self.anchor_ratio_drift,
            "arbitrageIndex" => self.arbitrage_index,
            "priceIndex" => self.price_index,
            "extractionRatio" => self.extraction_ratio,
            "newUserDependency" => self.new_user_dependency,
            "giftTradeRatio" => self.gift_trade_ratio,
            "disposalTradeRatio" => self.disposal_trade_ratio,
            "eventCompletionRate" => self.event_completion_rate,
            "contentDropAge" => self.content_drop_age,
            "blockedAgentCount" => self.blocked_agent_count,
            "totalAgents" => self.total_agents,
            "health" => self.health(),
            _ => return None,
        };
        Some(v)
    }

    fn flat_map(&self, name: &str) -> Option<&HashMap<String, f64>> {
        let m = match name {
            "totalSupplyByCurrency" => &self.total_supply_by_currency,
            "netFlowByCurrency" => &self.net_flow_by_currency,
            "velocityByCurrency" => &self.velocity_by_currency,
            "inflationRateByCurrency" => &self.inflation_rate_by_currency,
            "giniCoefficientByCurrency" => &self.gini_coefficient_by_currency,
            "meanBalanceByCurrency" => &self.mean_balance_by_currency,
            "medianBalanceByCurrency" => &self.median_balance_by_currency,
            "top10PctShareByCurrency" => &self.top10_pct_share_by_currency,
            "meanMedianDivergenceByCurrency" => &self.mean_median_divergence_by_currency,
            "faucetVolumeByCurrency" => &self.faucet_volume_by_currency,
            "sinkVolumeByCurrency" => &self.sink_volume_by_currency,
            "arbitrageIndexByCurrency" => &self.arbitrage_index_by_currency,
            "populationByRole" => &self.population_by_role,
            "roleShares" => &self.role_shares,
            "supplyByResource" => &self.supply_by_resource,
            "prices" => &self.prices,
            "flowBySystem" => &self.flow_by_system,
            "flowBySource" => &self.flow_by_source,
            "activityBySystem" => &self.activity_by_system,
            "participantsBySystem" => &self.participants_by_system,
            "custom" => &self.custom,
            _ => return None,
        };
        Some(m)
    }

    fn nested_map(&self, name: &str) -> Option<&HashMap<String, HashMap<String, f64>>> {
        match name {
            "pricesByCurrency" => Some(&self.prices_by_currency),
            "poolSizesByCurrency" => Some(&self.pool_sizes_by_currency),
            _ => None,
        }
    }

    /// Per-currency net flow, falling back to the aggregate.
    pub fn net_flow_for(&self, currency: &str) -> f64 {
        self.net_flow_by_currency
            .get(currency)
            .copied()
            .unwrap_or(self.net_flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EconomyMetrics {
        let mut m = EconomyMetrics {
            tick: 7,
            avg_satisfaction: 72.0,
            net_flow: 4.0,
            ..Default::default()
        };
        m.net_flow_by_currency.insert("gold".into(), 15.0);
        let mut pools = HashMap::new();
        pools.insert("bank".to_string(), 500.0);
        m.pool_sizes_by_currency.insert("gold".into(), pools);
        m.custom.insert("raidClears".into(), 3.0);
        m
    }

    #[test]
    fn resolves_scalars_and_maps() {
        let m = sample();
        assert_eq!(m.value_at_path("avgSatisfaction"), 72.0);
        assert_eq!(m.value_at_path("netFlowByCurrency.gold"), 15.0);
        assert_eq!(m.value_at_path("poolSizesByCurrency.gold.bank"), 500.0);
        assert_eq!(m.value_at_path("custom.raidClears"), 3.0);
    }

    #[test]
    fn unresolved_paths_yield_nan() {
        let m = sample();
        assert!(m.value_at_path("noSuchMetric").is_nan());
        assert!(m.value_at_path("netFlowByCurrency.gems").is_nan());
        assert!(m.value_at_path("poolSizesByCurrency.gold.vault").is_nan());
        assert!(m.value_at_path("poolSizesByCurrency.gold").is_nan());
        assert!(m.value_at_path("").is_nan());
    }

    #[test]
    fn health_score_bands() {
        let mut m = EconomyMetrics {
            avg_satisfaction: 80.0,
            ..Default::default()
        };
        assert_eq!(m.health(), 100.0);

        m.avg_satisfaction = 60.0; // -15
        m.gini_coefficient = 0.5; // -15
        m.net_flow = 12.0; // -15
        assert_eq!(m.health(), 55.0);

        m.avg_satisfaction = 40.0; // -25
        m.gini_coefficient = 0.7; // -25
        m.net_flow = -25.0; // -25
        m.churn_rate = 0.10; // -15
        assert_eq!(m.health(), 10.0);
    }
}
