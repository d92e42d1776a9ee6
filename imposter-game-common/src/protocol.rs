//! JSON wire protocol: `{ "type": "...", "payload": { ... } }` envelopes
//! exchanged over one persistent WebSocket per client.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lobby::{GamePhase, LobbySnapshot};
use crate::player::{Player, PlayerId, Role};
use crate::settings::{GameSettings, SettingsPatch};

/// Client-to-server intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientRequest {
    CreateLobby {
        host_id: PlayerId,
        #[serde(default)]
        settings: GameSettings,
    },
    JoinLobby {
        code: String,
        player: Player,
    },
    LeaveLobby {},
    UpdateSettings {
        settings: SettingsPatch,
    },
    StartGame {},
    PlayerRevealed {
        player_id: PlayerId,
    },
    StartVoting {},
    SubmitVotes {
        votes: Vec<PlayerId>,
    },
    PauseGame {},
    ResumeGame {},
    SendChat {
        message: String,
    },
    Ping {},
}

impl ClientRequest {
    /// Every envelope type the server understands. Envelopes with a `type`
    /// outside this list are logged and ignored rather than answered with an
    /// error.
    pub const TYPES: &'static [&'static str] = &[
        "CREATE_LOBBY",
        "JOIN_LOBBY",
        "LEAVE_LOBBY",
        "UPDATE_SETTINGS",
        "START_GAME",
        "PLAYER_REVEALED",
        "START_VOTING",
        "SUBMIT_VOTES",
        "PAUSE_GAME",
        "RESUME_GAME",
        "SEND_CHAT",
        "PING",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Crewmates,
    Imposters,
}

/// End-of-round bundle broadcast with `GAME_ENDED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResults {
    pub winner: Winner,
    pub imposters: Vec<PlayerId>,
    pub votes: HashMap<PlayerId, Vec<PlayerId>>,
    pub vote_counts: HashMap<PlayerId, u32>,
    pub eliminated: Vec<PlayerId>,
    pub word: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub player_id: PlayerId,
    pub player_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Server-to-client events. Most are broadcast to a lobby's roster;
/// `GAME_STARTED` is always unicast so a player only ever sees their own
/// role and word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    LobbyCreated {
        code: String,
        lobby: LobbySnapshot,
    },
    LobbyJoined {
        lobby: LobbySnapshot,
    },
    PlayerJoined {
        player: Player,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    HostChanged {
        new_host_id: PlayerId,
    },
    SettingsUpdated {
        settings: GameSettings,
    },
    GameStarted {
        role: Role,
        word: Option<String>,
        phase: GamePhase,
    },
    PlayerRevealed {
        player_id: PlayerId,
    },
    PhaseChanged {
        phase: GamePhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first_speaker: Option<PlayerId>,
    },
    VotingStarted {
        phase: GamePhase,
    },
    VotesSubmitted {
        player_id: PlayerId,
    },
    GameEnded {
        results: GameResults,
    },
    GamePaused {},
    GameResumed {},
    ChatMessage(ChatMessage),
    Error {
        message: String,
    },
    Pong {},
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Wire name of this event; also the key used by the mirror's event bus.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerEvent::LobbyCreated { .. } => "LOBBY_CREATED",
            ServerEvent::LobbyJoined { .. } => "LOBBY_JOINED",
            ServerEvent::PlayerJoined { .. } => "PLAYER_JOINED",
            ServerEvent::PlayerLeft { .. } => "PLAYER_LEFT",
            ServerEvent::HostChanged { .. } => "HOST_CHANGED",
            ServerEvent::SettingsUpdated { .. } => "SETTINGS_UPDATED",
            ServerEvent::GameStarted { .. } => "GAME_STARTED",
            ServerEvent::PlayerRevealed { .. } => "PLAYER_REVEALED",
            ServerEvent::PhaseChanged { .. } => "PHASE_CHANGED",
            ServerEvent::VotingStarted { .. } => "VOTING_STARTED",
            ServerEvent::VotesSubmitted { .. } => "VOTES_SUBMITTED",
            ServerEvent::GameEnded { .. } => "GAME_ENDED",
            ServerEvent::GamePaused {} => "GAME_PAUSED",
            ServerEvent::GameResumed {} => "GAME_RESUMED",
            ServerEvent::ChatMessage(_) => "CHAT_MESSAGE",
            ServerEvent::Error { .. } => "ERROR",
            ServerEvent::Pong {} => "PONG",
        }
    }
}
