//! Concurrent-safe registry of live tunnel sessions.
//!
//! Sessions register themselves when they start and deregister on teardown.
//! The registry is observability only: each session still exclusively owns
//! its client socket and tunnel channel, and nothing here is on the data
//! path. Critical sections are short and never held across an await.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use umbra_proto::ProxyTarget;

use crate::session::SessionState;

/// Snapshot of one live session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub peer_addr: SocketAddr,
    pub state: SessionState,
    /// Resolved destination, once known.
    pub target: Option<ProxyTarget>,
}

/// Shared map of session id to [`SessionInfo`]. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, SessionInfo>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, info: SessionInfo) {
        let mut sessions = self.inner.lock().expect("registry lock poisoned");
        sessions.insert(info.session_id.clone(), info);
    }

    pub fn update_state(&self, session_id: &str, state: SessionState) {
        let mut sessions = self.inner.lock().expect("registry lock poisoned");
        if let Some(info) = sessions.get_mut(session_id) {
            info.state = state;
        }
    }

    pub fn set_target(&self, session_id: &str, target: ProxyTarget) {
        let mut sessions = self.inner.lock().expect("registry lock poisoned");
        if let Some(info) = sessions.get_mut(session_id) {
            info.target = Some(target);
        }
    }

    pub fn deregister(&self, session_id: &str) {
        let mut sessions = self.inner.lock().expect("registry lock poisoned");
        sessions.remove(session_id);
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all live session info, for diagnostics.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}
