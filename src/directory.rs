//! Player-id to live-connection lookup. Bindings are weak: they address
//! sends and never own the player entity in a lobby.

use std::collections::HashMap;

use axum::extract::ws::Message;
use imposter_game_common::PlayerId;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub type ClientSender = UnboundedSender<Message>;

#[derive(Debug, Clone)]
struct Binding {
    conn_id: Uuid,
    sender: ClientSender,
}

#[derive(Default)]
pub struct ConnectionDirectory {
    bindings: HashMap<PlayerId, Binding>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Default::default()
    }

    /// Associate (or re-associate) a player with a connection. Overwriting
    /// is the reconnect path; there is no "already connected" error.
    pub fn bind(&mut self, player_id: PlayerId, conn_id: Uuid, sender: ClientSender) {
        self.bindings.insert(player_id, Binding { conn_id, sender });
    }

    pub fn unbind(&mut self, player_id: &str) {
        self.bindings.remove(player_id);
    }

    /// Remove the binding only if it still belongs to `conn_id`. A stale
    /// socket closing after the player rebound elsewhere must not unhook
    /// the fresh connection. Returns whether the binding was removed.
    pub fn unbind_if(&mut self, player_id: &str, conn_id: Uuid) -> bool {
        match self.bindings.get(player_id) {
            Some(binding) if binding.conn_id == conn_id => {
                self.bindings.remove(player_id);
                true
            }
            _ => false,
        }
    }

    pub fn resolve(&self, player_id: &str) -> Option<ClientSender> {
        self.bindings.get(player_id).map(|b| b.sender.clone())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
