//! Decision log - the engine's append-only memory of what it did and why.
//! Mission: Every pipeline outcome lands here, bounded, queryable

use crate::diagnoser::Diagnosis;
use crate::observer::EconomyMetrics;
use crate::planner::{ActionPlan, SkipReason};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Trim back to `max_entries` once the ring grows past this factor.
const TRIM_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionResult {
    Applied,
    RolledBack,
    ApplyFailed,
    SkippedGracePeriod,
    SkippedAdvisorMode,
    SkippedUnresolved,
    SkippedLocked,
    SkippedCooldown,
    SkippedBudget,
    SkippedSimulation,
    SkippedTimeout,
}

impl DecisionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionResult::Applied => "applied",
            DecisionResult::RolledBack => "rolled_back",
            DecisionResult::ApplyFailed => "apply_failed",
            DecisionResult::SkippedGracePeriod => "skipped_grace_period",
            DecisionResult::SkippedAdvisorMode => "skipped_advisor_mode",
            DecisionResult::SkippedUnresolved => "skipped_unresolved",
            DecisionResult::SkippedLocked => "skipped_locked",
            DecisionResult::SkippedCooldown => "skipped_cooldown",
            DecisionResult::SkippedBudget => "skipped_budget",
            DecisionResult::SkippedSimulation => "skipped_simulation",
            DecisionResult::SkippedTimeout => "skipped_timeout",
        }
    }
}

impl From<SkipReason> for DecisionResult {
    fn from(reason: SkipReason) -> Self {
        match reason {
            SkipReason::GracePeriod => DecisionResult::SkippedGracePeriod,
            SkipReason::UnresolvedParameter => DecisionResult::SkippedUnresolved,
            SkipReason::Locked => DecisionResult::SkippedLocked,
            SkipReason::Cooldown => DecisionResult::SkippedCooldown,
            SkipReason::Budget => DecisionResult::SkippedBudget,
            SkipReason::Simulation => DecisionResult::SkippedSimulation,
            SkipReason::Timeout => DecisionResult::SkippedTimeout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEntry {
    pub id: String,
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub diagnosis: Diagnosis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ActionPlan>,
    pub result: DecisionResult,
    pub reasoning: String,
    /// Metrics captured at the entry's own tick.
    pub metrics_snapshot: EconomyMetrics,
}

impl DecisionEntry {
    pub fn new(
        tick: u64,
        diagnosis: Diagnosis,
        plan: Option<ActionPlan>,
        result: DecisionResult,
        reasoning: impl Into<String>,
        metrics_snapshot: EconomyMetrics,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tick,
            timestamp: Utc::now(),
            diagnosis,
            plan,
            result,
            reasoning: reasoning.into(),
            metrics_snapshot,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionFilter {
    pub since: Option<u64>,
    pub until: Option<u64>,
    /// Principle id ("P12").
    pub issue: Option<String>,
    pub parameter: Option<String>,
    pub result: Option<DecisionResult>,
}

pub struct DecisionLog {
    entries: VecDeque<DecisionEntry>,
    max_entries: usize,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&mut self, entry: DecisionEntry) {
        self.entries.push_back(entry);
        let high_water = (self.max_entries as f64 * TRIM_FACTOR) as usize;
        if self.entries.len() > high_water {
            let drop = self.entries.len() - self.max_entries;
            self.entries.drain(..drop);
        }
    }

    pub fn query(&self, filter: &DecisionFilter) -> Vec<DecisionEntry> {
        self.entries
            .iter()
            .filter(|e| filter.since.map_or(true, |s| e.tick >= s))
            .filter(|e| filter.until.map_or(true, |u| e.tick <= u))
            .filter(|e| {
                filter
                    .issue
                    .as_ref()
                    .map_or(true, |id| e.diagnosis.principle_id == *id)
            })
            .filter(|e| {
                filter.parameter.as_ref().map_or(true, |p| {
                    e.plan.as_ref().map_or(false, |plan| plan.parameter == *p)
                })
            })
            .filter(|e| filter.result.map_or(true, |r| e.result == r))
            .cloned()
            .collect()
    }

    /// Newest first.
    pub fn latest(&self, n: usize) -> Vec<DecisionEntry> {
        self.entries.iter().rev().take(n).cloned().collect()
    }

    pub fn export(&self, format: &str) -> Result<String> {
        match format {
            "json" => {
                let all: Vec<&DecisionEntry> = self.entries.iter().collect();
                Ok(serde_json::to_string_pretty(&all)?)
            }
            "text" => {
                let mut out = String::new();
                for e in &self.entries {
                    out.push_str(&format!(
                        "[tick {}] {} {}: {}\n",
                        e.tick,
                        e.result.as_str(),
                        e.diagnosis.principle_id,
                        e.reasoning
                    ));
                }
                Ok(out)
            }
            other => bail!("unknown export format: {other}"),
        }
    }

    /// Restore from a JSON export, replacing current contents.
    pub fn import_json(&mut self, json: &str) -> Result<()> {
        let entries: Vec<DecisionEntry> = serde_json::from_str(json)?;
        self.entries = entries.into();
        Ok(())
    }
}

impl Default for DecisionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principles::{Category, Direction, SuggestedAction, Violation};

    fn entry(tick: u64, result: DecisionResult) -> DecisionEntry {
        DecisionEntry::new(
            tick,
            Diagnosis {
                principle_id: "P12".to_string(),
                principle_name: "Inflationary net flow".to_string(),
                category: Category::Currency,
                violation: Violation {
                    severity: 5.0,
                    confidence: 0.8,
                    estimated_lag: Some(5),
                    evidence: Default::default(),
                    suggested_action: SuggestedAction::new(
                        "cost",
                        Direction::Increase,
                        0.15,
                        "test",
                    ),
                },
                tick,
            },
            None,
            result,
            "test entry",
            EconomyMetrics {
                tick,
                ..Default::default()
            },
        )
    }

    #[test]
    fn result_wire_names() {
        assert_eq!(DecisionResult::Applied.as_str(), "applied");
        assert_eq!(DecisionResult::RolledBack.as_str(), "rolled_back");
        assert_eq!(
            DecisionResult::SkippedGracePeriod.as_str(),
            "skipped_grace_period"
        );
        assert_eq!(
            serde_json::to_string(&DecisionResult::SkippedCooldown).unwrap(),
            "\"skipped_cooldown\""
        );
    }

    #[test]
    fn ring_trims_at_one_and_a_half_capacity() {
        let mut log = DecisionLog::with_capacity(10);
        for tick in 0..16 {
            log.record(entry(tick, DecisionResult::Applied));
        }
        // 16 > 15 triggers a trim back to 10.
        assert_eq!(log.len(), 10);
        // Oldest entries went first.
        assert_eq!(log.latest(10).last().unwrap().tick, 6);
    }

    #[test]
    fn query_filters_compose() {
        let mut log = DecisionLog::new();
        log.record(entry(10, DecisionResult::Applied));
        log.record(entry(20, DecisionResult::SkippedCooldown));
        log.record(entry(30, DecisionResult::Applied));

        let applied = log.query(&DecisionFilter {
            result: Some(DecisionResult::Applied),
            since: Some(15),
            ..Default::default()
        });
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].tick, 30);

        let by_issue = log.query(&DecisionFilter {
            issue: Some("P12".to_string()),
            ..Default::default()
        });
        assert_eq!(by_issue.len(), 3);
    }

    #[test]
    fn latest_is_newest_first() {
        let mut log = DecisionLog::new();
        for tick in 0..5 {
            log.record(entry(tick, DecisionResult::Applied));
        }
        let latest = log.latest(2);
        assert_eq!(latest[0].tick, 4);
        assert_eq!(latest[1].tick, 3);
    }

    #[test]
    fn json_export_round_trips_in_order() {
        let mut log = DecisionLog::new();
        for tick in 0..4 {
            log.record(entry(tick, DecisionResult::Applied));
        }
        let json = log.export("json").unwrap();

        let mut restored = DecisionLog::new();
        restored.import_json(&json).unwrap();
        assert_eq!(restored.len(), 4);
        let original: Vec<u64> = log.latest(4).iter().map(|e| e.tick).collect();
        let roundtrip: Vec<u64> = restored.latest(4).iter().map(|e| e.tick).collect();
        assert_eq!(original, roundtrip);
        let ids_a: Vec<String> = log.latest(4).iter().map(|e| e.id.clone()).collect();
        let ids_b: Vec<String> = restored.latest(4).iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn text_export_mentions_result_and_principle() {
        let mut log = DecisionLog::new();
        log.record(entry(7, DecisionResult::SkippedBudget));
        let text = log.export("text").unwrap();
        assert!(text.contains("[tick 7]"));
        assert!(text.contains("skipped_budget"));
        assert!(text.contains("P12"));
    }
}
