//! HTTP + WebSocket transport.
//! Mission: Thin request framing over the engine; all smarts stay inside

pub mod routes;
pub mod ws;

use crate::adapter::CollectingAdapter;
use crate::decision_log::DecisionLog;
use crate::engine::{Engine, EngineStatus};
use crate::metric_store::MetricStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Shared transport state. The engine sits behind one async mutex so tick
/// dispatch is serialized; the store handles and the status snapshot serve
/// read endpoints without touching the pipeline.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<Engine>>,
    pub adapter: Arc<CollectingAdapter>,
    pub decision_log: Arc<RwLock<DecisionLog>>,
    pub metric_store: Arc<RwLock<MetricStore>>,
    pub status: Arc<RwLock<EngineStatus>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        let decision_log = engine.decision_log();
        let metric_store = engine.metric_store();
        let status = engine.status_handle();
        Self {
            engine: Arc::new(Mutex::new(engine)),
            adapter: Arc::new(CollectingAdapter::new()),
            decision_log,
            metric_store,
            status,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
