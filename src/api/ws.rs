//! WebSocket endpoint: the same tick protocol as HTTP, upgraded on the same
//! port for hosts that want push-mode event ingestion.

use crate::api::routes::HealthResponse;
use crate::api::AppState;
use crate::models::{Adjustment, Alert, EconomicEvent, EconomyState};
use crate::validation::validate_state;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsInbound {
    Tick {
        state: EconomyState,
        #[serde(default)]
        events: Vec<EconomicEvent>,
    },
    Event {
        event: EconomicEvent,
    },
    Health,
    Diagnose {
        state: EconomyState,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsOutbound {
    TickResult {
        adjustments: Vec<Adjustment>,
        alerts: Vec<Alert>,
        health: f64,
    },
    ValidationError {
        validation: Vec<String>,
    },
    ValidationWarning {
        warning: Vec<String>,
    },
    HealthResult {
        #[serde(flatten)]
        status: HealthResponse,
    },
    DiagnoseResult {
        health: f64,
        diagnoses: serde_json::Value,
    },
    Error {
        error: String,
    },
}

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // Events pushed between ticks accumulate here and ride along with the
    // next tick submission.
    let mut pending_events: Vec<EconomicEvent> = Vec::new();

    while let Some(Ok(msg)) = socket.recv().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let inbound: WsInbound = match serde_json::from_str(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!(error = %e, "unparseable ws message");
                if send(&mut socket, &WsOutbound::Error {
                    error: format!("malformed message: {e}"),
                })
                .await
                .is_err()
                {
                    break;
                }
                continue;
            }
        };

        let responses = handle_message(inbound, &state, &mut pending_events).await;
        for outbound in responses {
            if send(&mut socket, &outbound).await.is_err() {
                return;
            }
        }
    }
    debug!("websocket closed");
}

async fn handle_message(
    inbound: WsInbound,
    state: &AppState,
    pending_events: &mut Vec<EconomicEvent>,
) -> Vec<WsOutbound> {
    match inbound {
        WsInbound::Event { event } => {
            pending_events.push(event);
            Vec::new()
        }
        WsInbound::Health => {
            let status = state.status.read().clone();
            vec![WsOutbound::HealthResult {
                status: HealthResponse {
                    health: status.health,
                    tick: status.tick,
                    mode: status.mode,
                    active_plans: status.active_plans,
                    uptime: state.uptime_secs(),
                },
            }]
        }
        WsInbound::Diagnose { state: snapshot } => {
            let report = validate_state(&snapshot);
            if !report.is_valid() {
                return vec![WsOutbound::ValidationError {
                    validation: report.errors,
                }];
            }
            let engine = state.engine.lock().await;
            let (health, diagnoses) = engine.diagnose_only(&snapshot);
            vec![WsOutbound::DiagnoseResult {
                health,
                diagnoses: serde_json::to_value(diagnoses).unwrap_or_default(),
            }]
        }
        WsInbound::Tick {
            state: snapshot,
            events,
        } => {
            let report = validate_state(&snapshot);
            if !report.is_valid() {
                return vec![WsOutbound::ValidationError {
                    validation: report.errors,
                }];
            }

            let mut all_events = std::mem::take(pending_events);
            all_events.extend(events);
            if let Some(embedded) = &snapshot.recent_transactions {
                all_events.extend(embedded.iter().cloned());
            }

            state.adapter.put_state(snapshot.clone());
            let outcome = {
                let mut engine = state.engine.lock().await;
                engine
                    .process_tick(&snapshot, &all_events, None, state.adapter.as_ref())
                    .await
            };
            state.adapter.drain();

            let mut responses = Vec::new();
            if !report.warnings.is_empty() {
                responses.push(WsOutbound::ValidationWarning {
                    warning: report.warnings,
                });
            }
            responses.push(WsOutbound::TickResult {
                adjustments: outcome.adjustments,
                alerts: outcome.alerts,
                health: outcome.health,
            });
            responses
        }
    }
}

async fn send(socket: &mut WebSocket, outbound: &WsOutbound) -> Result<(), ()> {
    let text = serde_json::to_string(outbound).unwrap_or_else(|e| {
        warn!(error = %e, "failed to serialize ws response");
        "{\"type\":\"error\",\"error\":\"serialization failure\"}".to_string()
    });
    socket.send(Message::Text(text)).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_messages_parse_by_type_tag() {
        let tick: WsInbound =
            serde_json::from_str(r#"{"type":"tick","state":{"tick":5}}"#).unwrap();
        assert!(matches!(tick, WsInbound::Tick { .. }));

        let health: WsInbound = serde_json::from_str(r#"{"type":"health"}"#).unwrap();
        assert!(matches!(health, WsInbound::Health));

        let event: WsInbound = serde_json::from_str(
            r#"{"type":"event","event":{"type":"mint","actor":"sys","amount":5}}"#,
        )
        .unwrap();
        assert!(matches!(event, WsInbound::Event { .. }));
    }

    #[test]
    fn outbound_tick_result_uses_contract_tag() {
        let out = WsOutbound::TickResult {
            adjustments: Vec::new(),
            alerts: Vec::new(),
            health: 92.0,
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"type\":\"tick_result\""));
        assert!(json.contains("\"health\":92.0"));
    }
}
