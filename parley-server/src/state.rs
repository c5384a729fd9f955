//! Process-wide server state shared by every connection task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use parley_core::{services::Collaborators, DiagnosticsSnapshot, SessionConfig};
use serde::Serialize;

use crate::settings::ServerSettings;

pub struct ServerState {
    pub settings: ServerSettings,
    pub session_config: SessionConfig,
    /// Shared by every session; collaborators are stateless per call.
    pub collaborators: Collaborators,
    next_session_id: AtomicU64,
    /// Open sessions keyed by id.
    connections: Mutex<HashMap<u64, SocketAddr>>,
    totals: Mutex<ServerTotals>,
}

/// Counters summed over closed sessions.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTotals {
    pub sessions_closed: usize,
    pub turns_completed: usize,
    pub turns_failed: usize,
    pub barge_ins: usize,
    pub malformed_messages: usize,
}

impl ServerState {
    pub fn new(settings: ServerSettings, collaborators: Collaborators) -> Arc<Self> {
        Arc::new(Self {
            session_config: settings.session_config(),
            settings,
            collaborators,
            next_session_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            totals: Mutex::new(ServerTotals::default()),
        })
    }

    /// Allocate a session id and record the peer. Returns the id and the
    /// number of open sessions including this one.
    pub fn register(&self, peer: SocketAddr) -> (u64, usize) {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.lock();
        connections.insert(id, peer);
        (id, connections.len())
    }

    pub fn unregister(&self, id: u64, snapshot: Option<&DiagnosticsSnapshot>) -> usize {
        if let Some(s) = snapshot {
            let mut totals = self.totals.lock();
            totals.sessions_closed += 1;
            totals.turns_completed += s.turns_completed;
            totals.turns_failed += s.turns_failed;
            totals.barge_ins += s.barge_ins;
            totals.malformed_messages += s.malformed_messages;
        }
        let mut connections = self.connections.lock();
        connections.remove(&id);
        connections.len()
    }

    pub fn open_connections(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn totals(&self) -> ServerTotals {
        self.totals.lock().clone()
    }
}
