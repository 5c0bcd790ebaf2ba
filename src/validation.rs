//! Snapshot validation: split problems into hard errors (reject the tick)
//! and warnings (process anyway, tell the host).

use crate::models::{EconomyState, EventKind};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a host snapshot. Only structurally unusable data is an error;
/// everything merely suspicious is a warning, because a stabilizer that
/// refuses to look at a sick economy helps nobody.
pub fn validate_state(state: &EconomyState) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (agent, balances) in &state.agent_balances {
        for (currency, amount) in balances {
            if !amount.is_finite() {
                report
                    .errors
                    .push(format!("non-finite balance for agent '{agent}' in '{currency}'"));
            } else if *amount < 0.0 {
                report
                    .warnings
                    .push(format!("negative balance for agent '{agent}' in '{currency}'"));
            }
            if !state.currencies.is_empty() && !state.currencies.contains(currency) {
                report.warnings.push(format!(
                    "agent '{agent}' holds undeclared currency '{currency}'"
                ));
            }
        }
    }

    if state.currencies.is_empty() && !state.agent_balances.is_empty() {
        report
            .warnings
            .push("agent balances present but no currencies declared".to_string());
    }

    for (currency, by_resource) in &state.market_prices {
        for (resource, price) in by_resource {
            if !price.is_finite() {
                report.errors.push(format!(
                    "non-finite price for resource '{resource}' in '{currency}'"
                ));
            }
        }
    }

    for (currency, pools) in &state.pool_sizes {
        for (pool, size) in pools {
            if !size.is_finite() {
                report
                    .errors
                    .push(format!("non-finite size for pool '{pool}' in '{currency}'"));
            }
        }
    }

    if let Some(satisfaction) = &state.agent_satisfaction {
        for (agent, value) in satisfaction {
            if !value.is_finite() || *value < 0.0 || *value > 100.0 {
                report.warnings.push(format!(
                    "satisfaction for agent '{agent}' outside [0, 100]: {value}"
                ));
            }
        }
    }

    if let Some(events) = &state.recent_transactions {
        for (i, event) in events.iter().enumerate() {
            if let Some(amount) = event.amount {
                if !amount.is_finite() {
                    report
                        .errors
                        .push(format!("event #{i} has a non-finite amount"));
                } else if amount < 0.0 {
                    report
                        .warnings
                        .push(format!("event #{i} has a negative amount"));
                }
            }
            if let Some(currency) = &event.currency {
                if !state.currencies.is_empty() && !state.currencies.contains(currency) {
                    report.warnings.push(format!(
                        "event #{i} references undeclared currency '{currency}'"
                    ));
                }
            } else if state.currencies.len() > 1
                && (event.kind.is_faucet() || event.kind.is_sink() || event.kind == EventKind::Trade)
            {
                report.warnings.push(format!(
                    "event #{i} carries no currency in a multi-currency economy; \
                     attributing to '{}'",
                    state.currencies[0]
                ));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EconomicEvent;

    #[test]
    fn clean_state_validates() {
        let mut state = EconomyState {
            currencies: vec!["gold".to_string()],
            ..Default::default()
        };
        state
            .agent_balances
            .entry("a".to_string())
            .or_default()
            .insert("gold".to_string(), 10.0);
        let report = validate_state(&state);
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn non_finite_balance_is_an_error() {
        let mut state = EconomyState::default();
        state
            .agent_balances
            .entry("a".to_string())
            .or_default()
            .insert("gold".to_string(), f64::NAN);
        assert!(!validate_state(&state).is_valid());
    }

    #[test]
    fn undeclared_currency_is_a_warning() {
        let mut state = EconomyState {
            currencies: vec!["gold".to_string()],
            ..Default::default()
        };
        state
            .agent_balances
            .entry("a".to_string())
            .or_default()
            .insert("gems".to_string(), 5.0);
        let report = validate_state(&state);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn currencyless_flow_event_warns_in_multi_currency_economy() {
        let state = EconomyState {
            currencies: vec!["gold".to_string(), "gems".to_string()],
            recent_transactions: Some(vec![EconomicEvent::new(EventKind::Mint, "sys")
                .with_amount(5.0)]),
            ..Default::default()
        };
        let report = validate_state(&state);
        assert!(report.is_valid());
        assert!(report.warnings[0].contains("attributing to 'gold'"));
    }
}
