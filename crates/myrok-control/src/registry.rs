//! Session registry: endpoint id -> live tunnel session

use dashmap::DashMap;
use myrok_proto::EndpointId;
use std::sync::Arc;
use tracing::{debug, info};

use crate::session::Session;

/// Registry of live tunnel sessions
///
/// Read by every proxied call, written when tunnels open and close.
pub struct SessionRegistry {
    sessions: Arc<DashMap<EndpointId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Register a session under a freshly generated endpoint id
    pub fn register(&self, endpoint_id: EndpointId, session: Arc<Session>) {
        debug!("Registering session {}", endpoint_id);
        self.sessions.insert(endpoint_id, session);
    }

    /// Look up the session serving `endpoint_id`
    pub fn lookup(&self, endpoint_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(endpoint_id)
            .map(|entry| entry.value().clone())
    }

    /// Remove a session; unknown ids are ignored
    pub fn unregister(&self, endpoint_id: &str) -> bool {
        let removed = self.sessions.remove(endpoint_id).is_some();
        if removed {
            debug!("Unregistered session {}", endpoint_id);
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of the registered endpoint ids
    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Shut every registered session down
    ///
    /// Sessions unregister themselves once their pump loops finish.
    pub fn shutdown_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();

        if !sessions.is_empty() {
            info!("Shutting down {} tunnel session(s)", sessions.len());
        }
        for session in &sessions {
            session.shutdown();
        }
        sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
