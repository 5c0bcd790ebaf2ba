//! Tunable numeric bounds shared by every principle and pipeline stage.

use serde::{Deserialize, Serialize};

/// Flat record of tunable bounds. Constant for the lifetime of a run unless
/// reconfigured by the operator. All fields have conservative defaults so a
/// zero-config engine behaves sanely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    // Wealth distribution
    pub gini_warn: f64,
    pub gini_red: f64,
    pub top10_share_warn: f64,
    pub mean_median_divergence_warn: f64,

    // Currency flow
    pub net_flow_warn: f64,
    pub inflation_warn: f64,
    pub inflation_critical: f64,
    pub velocity_floor: f64,
    pub tap_sink_ratio_warn: f64,

    // Pools
    pub pool_cap_percent: f64,
    pub pool_operator_share: f64,
    pub pool_win_rate: f64,

    // Market
    pub arbitrage_index_warning: f64,
    pub arbitrage_index_critical: f64,
    pub price_volatility_warn: f64,
    pub anchor_drift_warn: f64,

    // Incentives
    pub extraction_ratio_warn: f64,
    pub gift_trade_ratio_warn: f64,
    pub disposal_trade_ratio_warn: f64,

    // Population & experience
    pub churn_warn: f64,
    pub satisfaction_floor: f64,
    pub blocked_agent_percent_warn: f64,
    pub new_user_dependency_warn: f64,
    pub replacement_rate_multiplier: f64,

    // Supply chain
    pub production_index_floor: f64,
    pub capacity_usage_critical: f64,

    // Operations
    pub event_completion_floor: f64,
    pub content_drop_age_max: f64,

    // Control loop discipline
    pub grace_period: u64,
    pub cooldown_ticks: u64,
    pub max_adjustment_percent: f64,
    pub complexity_budget_max: usize,

    // Simulation
    pub simulation_min_iterations: usize,
    pub simulation_forward_ticks: u64,

    // Tick processing deadline in milliseconds
    pub tick_deadline_ms: u64,

    /// Roles whose population drives faucet-style flow projections.
    pub dominant_roles: Option<Vec<String>>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            gini_warn: 0.45,
            gini_red: 0.60,
            top10_share_warn: 0.60,
            mean_median_divergence_warn: 0.50,

            net_flow_warn: 10.0,
            inflation_warn: 0.10,
            inflation_critical: 0.50,
            velocity_floor: 0.05,
            tap_sink_ratio_warn: 3.0,

            pool_cap_percent: 0.25,
            pool_operator_share: 0.30,
            pool_win_rate: 0.65,

            arbitrage_index_warning: 0.30,
            arbitrage_index_critical: 0.60,
            price_volatility_warn: 0.30,
            anchor_drift_warn: 0.25,

            extraction_ratio_warn: 0.70,
            gift_trade_ratio_warn: 0.40,
            disposal_trade_ratio_warn: 0.40,

            churn_warn: 0.05,
            satisfaction_floor: 45.0,
            blocked_agent_percent_warn: 0.10,
            new_user_dependency_warn: 0.50,
            replacement_rate_multiplier: 1.0,

            production_index_floor: 0.20,
            capacity_usage_critical: 0.90,

            event_completion_floor: 0.50,
            content_drop_age_max: 30.0,

            grace_period: 20,
            cooldown_ticks: 20,
            max_adjustment_percent: 0.15,
            complexity_budget_max: 3,

            simulation_min_iterations: 100,
            simulation_forward_ticks: 20,

            tick_deadline_ms: 10_000,

            dominant_roles: None,
        }
    }
}

impl Thresholds {
    /// Count of agents in dominant roles, falling back to total population
    /// when no dominant roles are configured.
    pub fn dominant_role_count(
        &self,
        population_by_role: &std::collections::HashMap<String, f64>,
        total_agents: f64,
    ) -> f64 {
        match &self.dominant_roles {
            Some(roles) if !roles.is_empty() => roles
                .iter()
                .filter_map(|r| population_by_role.get(r))
                .sum::<f64>()
                .max(1.0),
            _ => total_agents.max(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let t = Thresholds::default();
        assert!(t.gini_warn < t.gini_red);
        assert!(t.arbitrage_index_warning < t.arbitrage_index_critical);
        assert!(t.inflation_warn < t.inflation_critical);
        assert_eq!(t.simulation_min_iterations, 100);
        assert_eq!(t.max_adjustment_percent, 0.15);
    }

    #[test]
    fn dominant_role_count_falls_back_to_population() {
        let t = Thresholds::default();
        let pop = std::collections::HashMap::new();
        assert_eq!(t.dominant_role_count(&pop, 40.0), 40.0);

        let t = Thresholds {
            dominant_roles: Some(vec!["farmer".into()]),
            ..Default::default()
        };
        let mut pop = std::collections::HashMap::new();
        pop.insert("farmer".to_string(), 12.0);
        pop.insert("trader".to_string(), 5.0);
        assert_eq!(t.dominant_role_count(&pop, 40.0), 12.0);
    }
}
