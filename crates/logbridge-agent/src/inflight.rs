//! Inflight request registry - absorbs duplicate delivery of log request
//! events from the at-least-once queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Mapping from request identifier to the session's cancellation handle.
/// At most one entry per identifier; presence means "already streaming".
/// No blocking work happens while the lock is held.
#[derive(Clone, Default)]
pub struct InflightLogs {
    inner: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl InflightLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry for `uuid`. Returns `None` if one already exists
    /// (duplicate dispatch); otherwise returns a guard whose drop removes
    /// the entry on every exit path, panics included.
    pub fn insert(&self, uuid: Uuid, cancel: CancellationToken) -> Option<InflightGuard> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&uuid) {
            return None;
        }
        map.insert(uuid, cancel);
        Some(InflightGuard {
            registry: self.clone(),
            uuid,
        })
    }

    /// Cancel the session for `uuid` if it is still running.
    pub fn cancel(&self, uuid: &Uuid) -> bool {
        let map = self.inner.lock().unwrap();
        match map.get(uuid) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.inner.lock().unwrap().contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes the inflight entry when dropped.
pub struct InflightGuard {
    registry: InflightLogs,
    uuid: Uuid,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if let Ok(mut map) = self.registry.inner.lock() {
            map.remove(&self.uuid);
        }
    }
}
