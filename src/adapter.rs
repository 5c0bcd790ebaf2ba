//! Host adapter seam.
//!
//! The engine only ever touches the host through this trait: read a snapshot,
//! write a parameter. The HTTP/WS transport uses `CollectingAdapter`, which
//! records writes and hands them back to the host in the tick response.

use crate::models::{Adjustment, EconomyState, ParamScope};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

#[async_trait]
pub trait EconomyAdapter: Send + Sync {
    async fn get_state(&self) -> Result<EconomyState>;

    /// Must be idempotent from the host's perspective; the engine re-issues
    /// the original value on rollback.
    async fn set_param(&self, key: &str, value: f64, scope: Option<&ParamScope>) -> Result<()>;
}

/// Adapter for push-mode hosts: the state arrives with the request and
/// parameter writes are collected into the response instead of being pushed
/// anywhere.
#[derive(Default)]
pub struct CollectingAdapter {
    state: Mutex<EconomyState>,
    pending: Mutex<Vec<Adjustment>>,
}

impl CollectingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_state(&self, state: EconomyState) {
        *self.state.lock() = state;
    }

    /// Take everything written since the last drain.
    pub fn drain(&self) -> Vec<Adjustment> {
        std::mem::take(&mut *self.pending.lock())
    }
}

#[async_trait]
impl EconomyAdapter for CollectingAdapter {
    async fn get_state(&self) -> Result<EconomyState> {
        Ok(self.state.lock().clone())
    }

    async fn set_param(&self, key: &str, value: f64, scope: Option<&ParamScope>) -> Result<()> {
        self.pending.lock().push(Adjustment {
            key: key.to_string(),
            value,
            scope: scope.cloned(),
        });
        Ok(())
    }
}
