//! Core economy data model.
//! Mission: Faithful, tolerant representation of the host's per-tick snapshot

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable snapshot of the host economy at one tick.
///
/// Supplied by the host on every `/tick` submission and never mutated by the
/// engine. Missing fields deserialize to empty collections; numeric holes are
/// handled downstream by the observer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EconomyState {
    pub tick: u64,
    pub currencies: Vec<String>,
    pub roles: Vec<String>,
    pub resources: Vec<String>,
    /// agent -> currency -> balance
    pub agent_balances: HashMap<String, HashMap<String, f64>>,
    /// agent -> role
    pub agent_roles: HashMap<String, String>,
    /// agent -> resource -> quantity
    pub agent_inventories: HashMap<String, HashMap<String, f64>>,
    /// agent -> satisfaction in [0, 100]
    pub agent_satisfaction: Option<HashMap<String, f64>>,
    /// currency -> resource -> price
    pub market_prices: HashMap<String, HashMap<String, f64>>,
    /// currency -> pool name -> size
    pub pool_sizes: HashMap<String, HashMap<String, f64>>,
    pub recent_transactions: Option<Vec<EconomicEvent>>,
    pub systems: Option<Vec<String>>,
    pub sources: Option<Vec<String>>,
    pub sinks: Option<Vec<String>>,
    /// Host-supplied gauges the engine cannot derive itself
    /// (eventCompletionRate, contentDropAge, capacityUsage, ...).
    pub custom: Option<HashMap<String, f64>>,
}

impl EconomyState {
    /// The currency flow events attribute to when they carry none.
    pub fn primary_currency(&self) -> Option<&str> {
        self.currencies.first().map(|c| c.as_str())
    }

    pub fn total_agents(&self) -> usize {
        let mut agents: std::collections::HashSet<&str> =
            self.agent_balances.keys().map(|s| s.as_str()).collect();
        agents.extend(self.agent_roles.keys().map(|s| s.as_str()));
        agents.extend(self.agent_inventories.keys().map(|s| s.as_str()));
        agents.len()
    }
}

/// The nine event kinds the engine understands. Bit-exact wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Trade,
    Mint,
    Burn,
    Transfer,
    Produce,
    Consume,
    RoleChange,
    Enter,
    Churn,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Trade => "trade",
            EventKind::Mint => "mint",
            EventKind::Burn => "burn",
            EventKind::Transfer => "transfer",
            EventKind::Produce => "produce",
            EventKind::Consume => "consume",
            EventKind::RoleChange => "role_change",
            EventKind::Enter => "enter",
            EventKind::Churn => "churn",
        }
    }

    /// Creates currency (counts toward faucet volume).
    pub fn is_faucet(&self) -> bool {
        matches!(self, EventKind::Mint | EventKind::Enter)
    }

    /// Destroys currency (counts toward sink volume).
    pub fn is_sink(&self) -> bool {
        matches!(self, EventKind::Burn | EventKind::Consume)
    }
}

/// One host-reported economic event. Flat record with a `type` discriminant;
/// payload fields are optional and kind-dependent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomicEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub source_or_sink: Option<String>,
}

impl EconomicEvent {
    pub fn new(kind: EventKind, actor: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: 0.0,
            actor: actor.into(),
            from: None,
            to: None,
            amount: None,
            currency: None,
            resource: None,
            system: None,
            source_or_sink: None,
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn amount_or_zero(&self) -> f64 {
        self.amount.filter(|a| a.is_finite()).unwrap_or(0.0)
    }
}

/// Scope qualifier shared by suggested actions, registered parameters and
/// adjustments. All fields optional; an empty scope matches anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParamScope {
    pub system: Option<String>,
    pub currency: Option<String>,
    pub tags: Vec<String>,
}

impl ParamScope {
    pub fn for_currency(currency: impl Into<String>) -> Self {
        Self {
            currency: Some(currency.into()),
            ..Default::default()
        }
    }

    pub fn for_system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_none() && self.currency.is_none() && self.tags.is_empty()
    }

    /// Stable key used by the planner's cooldown map. Tags are sorted so the
    /// same scope always canonicalizes identically.
    pub fn canonical_key(&self) -> String {
        let mut tags = self.tags.clone();
        tags.sort();
        format!(
            "{}|{}|{}",
            self.system.as_deref().unwrap_or(""),
            self.currency.as_deref().unwrap_or(""),
            tags.join(",")
        )
    }
}

/// One `setParam` call emitted toward the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub key: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ParamScope>,
}

/// Alert surfaced to the host for every diagnosed violation, applied or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub principle_id: String,
    pub principle_name: String,
    pub severity: f64,
    pub evidence: HashMap<String, serde_json::Value>,
    pub reasoning: String,
}

/// Engine operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Diagnose, plan and apply adjustments.
    Autonomous,
    /// Diagnose and plan, but never call the adapter.
    Advisor,
}

impl EngineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineMode::Autonomous => "autonomous",
            EngineMode::Advisor => "advisor",
        }
    }
}

impl std::str::FromStr for EngineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "autonomous" => Ok(EngineMode::Autonomous),
            "advisor" => Ok(EngineMode::Advisor),
            other => Err(format!("unknown engine mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_wire_names_are_bit_exact() {
        let kinds = [
            (EventKind::Trade, "trade"),
            (EventKind::Mint, "mint"),
            (EventKind::Burn, "burn"),
            (EventKind::Transfer, "transfer"),
            (EventKind::Produce, "produce"),
            (EventKind::Consume, "consume"),
            (EventKind::RoleChange, "role_change"),
            (EventKind::Enter, "enter"),
            (EventKind::Churn, "churn"),
        ];
        for (kind, name) in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{name}\""));
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn state_tolerates_missing_fields() {
        let state: EconomyState = serde_json::from_str(r#"{"tick": 3}"#).unwrap();
        assert_eq!(state.tick, 3);
        assert!(state.currencies.is_empty());
        assert!(state.agent_balances.is_empty());
    }

    #[test]
    fn scope_canonical_key_sorts_tags() {
        let a = ParamScope {
            system: Some("crafting".into()),
            currency: Some("gold".into()),
            tags: vec!["b".into(), "a".into()],
        };
        let b = ParamScope {
            system: Some("crafting".into()),
            currency: Some("gold".into()),
            tags: vec!["a".into(), "b".into()],
        };
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn faucet_and_sink_classification() {
        assert!(EventKind::Mint.is_faucet());
        assert!(EventKind::Enter.is_faucet());
        assert!(EventKind::Burn.is_sink());
        assert!(EventKind::Consume.is_sink());
        assert!(!EventKind::Trade.is_faucet());
        assert!(!EventKind::Transfer.is_sink());
    }
}
