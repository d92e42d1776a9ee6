//! The thin lobby replica each client keeps. Online it mutates only in
//! response to server events; in local single-device mode the same `apply`
//! path consumes events emitted by a `Lobby` owned in-process.

use std::collections::HashMap;

use crate::lobby::{GamePhase, LobbyEvent, LobbySnapshot};
use crate::player::{PlayerId, Role};
use crate::protocol::{ChatMessage, GameResults, ServerEvent};

pub type SubscriptionId = u64;

type Handler = Box<dyn FnMut(&ServerEvent) + Send>;

/// Dispatch table keyed by wire type, with explicit unsubscribe so a torn
/// down UI screen cannot leak handlers into a rebuilt mirror.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<&'static str, Vec<(SubscriptionId, Handler)>>,
    next_id: SubscriptionId,
}

impl EventBus {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn subscribe(
        &mut self,
        event_type: &'static str,
        handler: impl FnMut(&ServerEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = self.next_id;
        self.handlers
            .entry(event_type)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        for handlers in self.handlers.values_mut() {
            handlers.retain(|(handler_id, _)| *handler_id != id);
        }
    }

    pub fn emit(&mut self, event: &ServerEvent) {
        if let Some(handlers) = self.handlers.get_mut(event.type_name()) {
            for (_, handler) in handlers.iter_mut() {
                handler(event);
            }
        }
    }
}

pub struct SessionMirror {
    pub player_id: PlayerId,
    pub lobby: Option<LobbySnapshot>,
    /// Own assignment from the `GAME_STARTED` unicast; other players' roles
    /// are never known here until the results arrive.
    pub role: Option<Role>,
    pub word: Option<String>,
    pub first_speaker: Option<PlayerId>,
    pub results: Option<GameResults>,
    pub paused: bool,
    pub chat: Vec<ChatMessage>,
    pub last_error: Option<String>,
    bus: EventBus,
}

impl SessionMirror {
    pub fn new(player_id: impl Into<PlayerId>) -> Self {
        Self {
            player_id: player_id.into(),
            lobby: None,
            role: None,
            word: None,
            first_speaker: None,
            results: None,
            paused: false,
            chat: Vec::new(),
            last_error: None,
            bus: EventBus::new(),
        }
    }

    pub fn bus(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn is_host(&self) -> bool {
        self.lobby
            .as_ref()
            .is_some_and(|l| l.host_id == self.player_id)
    }

    pub fn phase(&self) -> Option<GamePhase> {
        self.lobby.as_ref().map(|l| l.phase)
    }

    /// Apply one server-originated event, then notify subscribers.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::LobbyCreated { lobby, .. } | ServerEvent::LobbyJoined { lobby } => {
                self.lobby = Some(lobby.clone());
            }
            ServerEvent::PlayerJoined { player } => {
                if let Some(lobby) = &mut self.lobby {
                    if !lobby.players.iter().any(|p| p.id == player.id) {
                        lobby.players.push(player.clone());
                    }
                }
            }
            ServerEvent::PlayerLeft { player_id } => {
                if let Some(lobby) = &mut self.lobby {
                    lobby.players.retain(|p| &p.id != player_id);
                }
            }
            ServerEvent::HostChanged { new_host_id } => {
                if let Some(lobby) = &mut self.lobby {
                    lobby.host_id = new_host_id.clone();
                }
            }
            ServerEvent::SettingsUpdated { settings } => {
                if let Some(lobby) = &mut self.lobby {
                    lobby.settings = settings.clone();
                }
            }
            ServerEvent::GameStarted { role, word, phase } => {
                self.role = Some(*role);
                self.word = word.clone();
                self.results = None;
                self.paused = false;
                self.first_speaker = None;
                if let Some(lobby) = &mut self.lobby {
                    lobby.phase = *phase;
                    for player in &mut lobby.players {
                        player.has_revealed = false;
                        player.has_voted = false;
                        player.votes.clear();
                        player.is_eliminated = false;
                    }
                }
            }
            ServerEvent::PlayerRevealed { player_id } => {
                if let Some(lobby) = &mut self.lobby {
                    if let Some(player) = lobby.players.iter_mut().find(|p| &p.id == player_id) {
                        player.has_revealed = true;
                    }
                }
            }
            ServerEvent::PhaseChanged {
                phase,
                first_speaker,
            } => {
                if let Some(lobby) = &mut self.lobby {
                    lobby.phase = *phase;
                }
                if first_speaker.is_some() {
                    self.first_speaker = first_speaker.clone();
                }
                if *phase == GamePhase::Setup {
                    // Round reset: forget everything round-scoped.
                    self.role = None;
                    self.word = None;
                    self.first_speaker = None;
                    self.results = None;
                    self.paused = false;
                    if let Some(lobby) = &mut self.lobby {
                        for player in &mut lobby.players {
                            player.has_revealed = false;
                            player.has_voted = false;
                            player.votes.clear();
                            player.is_eliminated = false;
                        }
                    }
                }
            }
            ServerEvent::VotingStarted { phase } => {
                if let Some(lobby) = &mut self.lobby {
                    lobby.phase = *phase;
                    for player in &mut lobby.players {
                        player.has_voted = false;
                        player.votes.clear();
                    }
                }
            }
            ServerEvent::VotesSubmitted { player_id } => {
                if let Some(lobby) = &mut self.lobby {
                    if let Some(player) = lobby.players.iter_mut().find(|p| &p.id == player_id) {
                        player.has_voted = true;
                    }
                }
            }
            ServerEvent::GameEnded { results } => {
                self.results = Some(results.clone());
                if let Some(lobby) = &mut self.lobby {
                    lobby.phase = GamePhase::Results;
                    for player in &mut lobby.players {
                        player.is_eliminated = results.eliminated.contains(&player.id);
                    }
                }
            }
            ServerEvent::GamePaused {} => self.paused = true,
            ServerEvent::GameResumed {} => self.paused = false,
            ServerEvent::ChatMessage(message) => self.chat.push(message.clone()),
            ServerEvent::Error { message } => self.last_error = Some(message.clone()),
            ServerEvent::Pong {} => {}
        }
        self.bus.emit(event);
    }

    /// Local-mode bridge: apply the slice of a transition's events this
    /// player would have received over the wire.
    pub fn apply_outcome(&mut self, events: &[LobbyEvent]) {
        for event in events {
            match event {
                LobbyEvent::Broadcast(ev) => self.apply(ev),
                LobbyEvent::BroadcastExcept(skip, ev) if *skip != self.player_id => self.apply(ev),
                LobbyEvent::Unicast(to, ev) if *to == self.player_id => self.apply(ev),
                _ => {}
            }
        }
    }
}
