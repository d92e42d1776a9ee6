use std::sync::{Arc, Mutex};

use axum::extract::ws::Message;
use imposter_game_common::{ServerEvent, WordBank};
use tracing::{debug, error};

use crate::directory::ConnectionDirectory;
use crate::registry::SessionRegistry;

pub type StateObj<T> = Arc<Mutex<T>>;

/// Shared server state: the registry and directory each behind their own
/// lock, plus the word bank (immutable after startup).
#[derive(Clone, Default)]
pub struct ServerState {
    pub registry: StateObj<SessionRegistry>,
    pub directory: StateObj<ConnectionDirectory>,
    pub words: Arc<WordBank>,
}

impl ServerState {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn encode(event: &ServerEvent) -> Option<Message> {
        match serde_json::to_string(event) {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                error!(error = %e, "failed to encode outbound event");
                None
            }
        }
    }

    /// Fire-and-forget unicast. A missing binding or closed handle drops
    /// the event; there is no retry or queueing for offline recipients.
    pub fn try_send(&self, player_id: &str, event: &ServerEvent) {
        let Some(sender) = self.directory.lock().unwrap().resolve(player_id) else {
            debug!(player_id, "dropping send to unbound player");
            return;
        };
        if let Some(message) = Self::encode(event) {
            if sender.send(message).is_err() {
                debug!(player_id, "dropping send to closed connection");
            }
        }
    }
}
