//! Owns every live lobby, hands out collision-free codes, and evicts
//! lobbies past the retention window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use imposter_game_common::{GameSettings, Lobby, PlayerId};
use rand::Rng;

/// Confusable characters (0/O, 1/I) are excluded so codes survive being
/// read aloud.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 6;

/// Lobbies older than this are removed by the periodic sweep.
pub const RETENTION_SECS: i64 = 2 * 60 * 60;

/// Each lobby lives behind its own mutex: transitions for one lobby
/// serialize there, while unrelated lobbies never contend.
pub type SharedLobby = Arc<Mutex<Lobby>>;

#[derive(Default)]
pub struct SessionRegistry {
    lobbies: HashMap<String, SharedLobby>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Rejection-sample a code until it misses every live lobby.
    fn generate_code(&self, rng: &mut impl Rng) -> String {
        loop {
            let code: String = (0..CODE_LEN)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect();
            if !self.lobbies.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn create_lobby(
        &mut self,
        host_id: PlayerId,
        settings: GameSettings,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> (String, SharedLobby) {
        let code = self.generate_code(rng);
        let lobby = Arc::new(Mutex::new(Lobby::new(code.clone(), host_id, settings, now)));
        self.lobbies.insert(code.clone(), lobby.clone());
        (code, lobby)
    }

    /// Absent codes are a normal outcome, not an error.
    pub fn get(&self, code: &str) -> Option<SharedLobby> {
        self.lobbies.get(code).cloned()
    }

    /// Idempotent.
    pub fn delete(&mut self, code: &str) {
        self.lobbies.remove(code);
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Remove every lobby older than the retention window, returning the
    /// evicted codes. Driven by the scheduler task in `run`, not by the
    /// registry itself.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let cutoff = Duration::seconds(RETENTION_SECS);
        let expired: Vec<String> = self
            .lobbies
            .iter()
            .filter(|(_, lobby)| {
                let lobby = lobby.lock().unwrap();
                now - lobby.created_at > cutoff
            })
            .map(|(code, _)| code.clone())
            .collect();
        for code in &expired {
            self.lobbies.remove(code);
        }
        expired
    }
}
