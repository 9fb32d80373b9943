//! Server-wide shared state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use relay_core::Host;

/// Handed to every listener and client task. The host owns all mutable
/// chat state; the client registry only mirrors connection status for
/// diagnostics.
#[derive(Clone)]
pub struct ServerState {
    pub host: Host,
    clients: Arc<RwLock<HashMap<i64, String>>>,
}

impl ServerState {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn record_client_status(&self, client_id: i64, status: &str) {
        self.clients
            .write()
            .expect("client registry lock")
            .insert(client_id, status.to_owned());
    }

    pub fn remove_client(&self, client_id: i64) {
        self.clients
            .write()
            .expect("client registry lock")
            .remove(&client_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().expect("client registry lock").len()
    }
}
