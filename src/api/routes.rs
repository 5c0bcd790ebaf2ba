//! HTTP endpoints.
//!
//! Only transport-level problems (malformed JSON, oversized bodies, invalid
//! state) produce non-200 responses; everything the pipeline itself refuses
//! comes back as a 200 with empty adjustments and a logged decision.

use crate::api::AppState;
use crate::decision_log::{DecisionEntry, DecisionFilter};
use crate::diagnoser::Diagnosis;
use crate::models::{Adjustment, Alert, EconomicEvent, EconomyState, EngineMode};
use crate::validation::validate_state;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickRequest {
    pub state: EconomyState,
    #[serde(default)]
    pub events: Vec<EconomicEvent>,
    #[serde(default)]
    pub persona_distribution: Option<HashMap<String, f64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickResponse {
    pub adjustments: Vec<Adjustment>,
    pub alerts: Vec<Alert>,
    pub health: f64,
    pub tick: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_warnings: Option<Vec<String>>,
}

/// POST /tick - process one economy snapshot.
pub async fn post_tick(
    State(state): State<AppState>,
    Json(request): Json<TickRequest>,
) -> Result<Json<TickResponse>, (StatusCode, Json<Value>)> {
    let report = validate_state(&request.state);
    if !report.is_valid() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_state",
                "validationErrors": report.errors,
            })),
        ));
    }

    // Events may arrive in the body or embedded in the snapshot.
    let mut events = request.events;
    if let Some(embedded) = &request.state.recent_transactions {
        events.extend(embedded.iter().cloned());
    }

    state.adapter.put_state(request.state.clone());
    let outcome = {
        let mut engine = state.engine.lock().await;
        engine
            .process_tick(
                &request.state,
                &events,
                request.persona_distribution.as_ref(),
                state.adapter.as_ref(),
            )
            .await
    };
    // Anything the executor wrote this tick is already reflected in the
    // report's adjustments; drain the adapter so nothing leaks into the next
    // response.
    state.adapter.drain();

    Ok(Json(TickResponse {
        adjustments: outcome.adjustments,
        alerts: outcome.alerts,
        health: outcome.health,
        tick: outcome.tick,
        validation_warnings: (!report.warnings.is_empty()).then_some(report.warnings),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub health: f64,
    pub tick: u64,
    pub mode: EngineMode,
    pub active_plans: usize,
    pub uptime: u64,
}

/// GET /health - cheap status snapshot, no pipeline lock.
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.status.read().clone();
    Json(HealthResponse {
        health: status.health,
        tick: status.tick,
        mode: status.mode,
        active_plans: status.active_plans,
        uptime: state.uptime_secs(),
    })
}

#[derive(Debug, Deserialize)]
pub struct DecisionsQuery {
    pub limit: Option<usize>,
    pub since: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct DecisionsResponse {
    pub decisions: Vec<DecisionEntry>,
}

/// GET /decisions - recent decision entries, newest first.
pub async fn get_decisions(
    Query(params): Query<DecisionsQuery>,
    State(state): State<AppState>,
) -> Json<DecisionsResponse> {
    let limit = params.limit.unwrap_or(100);
    let log = state.decision_log.read();
    let decisions = match params.since {
        Some(since) => {
            let mut entries = log.query(&DecisionFilter {
                since: Some(since),
                ..Default::default()
            });
            entries.reverse(); // newest first, like latest()
            entries.truncate(limit);
            entries
        }
        None => log.latest(limit),
    };
    Json(DecisionsResponse { decisions })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstrainRequest {
    pub param: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigRequest {
    pub lock: Vec<String>,
    pub unlock: Vec<String>,
    pub constrain: Vec<ConstrainRequest>,
    pub mode: Option<EngineMode>,
}

/// POST /config - operator controls: locks, constraints, mode.
pub async fn post_config(
    State(state): State<AppState>,
    Json(request): Json<ConfigRequest>,
) -> Json<Value> {
    let mut engine = state.engine.lock().await;
    for key in &request.lock {
        engine.planner_mut().lock(key.clone());
        info!(key = %key, "parameter locked");
    }
    for key in &request.unlock {
        engine.planner_mut().unlock(key);
        info!(key = %key, "parameter unlocked");
    }
    for c in &request.constrain {
        engine.planner_mut().constrain(c.param.clone(), c.min, c.max);
    }
    if let Some(mode) = request.mode {
        engine.set_mode(mode);
    }
    Json(json!({ "ok": true, "mode": engine.mode() }))
}

#[derive(Debug, Serialize)]
pub struct PrincipleInfo {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct PrinciplesResponse {
    pub count: usize,
    pub principles: Vec<PrincipleInfo>,
}

/// GET /principles - the registered principle catalog.
pub async fn get_principles(State(state): State<AppState>) -> Json<PrinciplesResponse> {
    let engine = state.engine.lock().await;
    let principles: Vec<PrincipleInfo> = engine
        .principles()
        .iter()
        .map(|p| PrincipleInfo {
            id: p.id.to_string(),
            name: p.name.to_string(),
            category: p.category.as_str().to_string(),
            description: p.description.to_string(),
        })
        .collect();
    Json(PrinciplesResponse {
        count: principles.len(),
        principles,
    })
}

#[derive(Debug, Deserialize)]
pub struct DiagnoseRequest {
    pub state: EconomyState,
}

#[derive(Debug, Serialize)]
pub struct DiagnoseResponse {
    pub health: f64,
    pub diagnoses: Vec<Diagnosis>,
}

/// POST /diagnose - run the principle set against a snapshot with no side
/// effects on engine state.
pub async fn post_diagnose(
    State(state): State<AppState>,
    Json(request): Json<DiagnoseRequest>,
) -> Result<Json<DiagnoseResponse>, (StatusCode, Json<Value>)> {
    let report = validate_state(&request.state);
    if !report.is_valid() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_state",
                "validationErrors": report.errors,
            })),
        ));
    }
    let engine = state.engine.lock().await;
    let (health, diagnoses) = engine.diagnose_only(&request.state);
    Ok(Json(DiagnoseResponse { health, diagnoses }))
}
