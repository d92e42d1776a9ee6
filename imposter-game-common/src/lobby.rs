//! The per-lobby state machine. Every operation mutates the lobby and
//! returns the events to deliver, so the same code runs behind the server's
//! dispatcher and embedded in a single-device client.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::player::{Player, PlayerId, Role};
use crate::protocol::{GameResults, ServerEvent, Winner};
use crate::settings::{GameSettings, SettingsPatch};

pub const MIN_PLAYERS: usize = 2;

/// Fixed round lifecycle. `Results` is terminal for the round; only an
/// explicit `reset_round` returns the lobby to `Setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Setup,
    Revealing,
    Discussion,
    Voting,
    Results,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GamePhase::Setup => "setup",
            GamePhase::Revealing => "revealing",
            GamePhase::Discussion => "discussion",
            GamePhase::Voting => "voting",
            GamePhase::Results => "results",
        };
        f.write_str(name)
    }
}

/// Present only while a round is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
    pub imposters: Vec<PlayerId>,
    pub word: String,
    pub first_speaker: PlayerId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LobbyError {
    #[error("Game already in progress")]
    GameInProgress,
    #[error("Lobby is full")]
    LobbyFull,
    #[error("Only the host can do that")]
    NotHost,
    #[error("Player is not in this lobby")]
    UnknownPlayer,
    #[error("At least {MIN_PLAYERS} players are required to start")]
    NotEnoughPlayers,
    #[error("Not allowed while the lobby is in the {0} phase")]
    WrongPhase(GamePhase),
}

/// Fan-out shape for one outbound event. The state machine decides the
/// shape; whoever embeds it owns actual delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    Broadcast(ServerEvent),
    BroadcastExcept(PlayerId, ServerEvent),
    Unicast(PlayerId, ServerEvent),
}

/// The roster view sent to one player. Everyone else's role and word are
/// stripped so a mid-game snapshot can never leak an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySnapshot {
    pub code: String,
    pub host_id: PlayerId,
    pub players: Vec<Player>,
    pub settings: GameSettings,
    pub phase: GamePhase,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Lobby {
    pub code: String,
    pub host_id: PlayerId,
    /// Insertion order matters: the earliest remaining joiner inherits the
    /// host role, and is the first-speaker fallback.
    pub players: Vec<Player>,
    pub settings: GameSettings,
    pub phase: GamePhase,
    pub created_at: DateTime<Utc>,
    pub round: Option<RoundState>,
    pub votes: HashMap<PlayerId, Vec<PlayerId>>,
    pub revealed: HashSet<PlayerId>,
}

impl Lobby {
    pub fn new(
        code: impl Into<String>,
        host_id: impl Into<PlayerId>,
        settings: GameSettings,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            code: code.into(),
            host_id: host_id.into(),
            players: Vec::new(),
            settings,
            phase: GamePhase::Setup,
            created_at,
            round: None,
            votes: HashMap::new(),
            revealed: HashSet::new(),
        }
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }

    fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    fn require_host(&self, actor: &str) -> Result<(), LobbyError> {
        if self.host_id == actor {
            Ok(())
        } else {
            Err(LobbyError::NotHost)
        }
    }

    pub fn snapshot_for(&self, viewer: &str) -> LobbySnapshot {
        LobbySnapshot {
            code: self.code.clone(),
            host_id: self.host_id.clone(),
            players: self
                .players
                .iter()
                .map(|p| if p.id == viewer { p.clone() } else { p.redacted() })
                .collect(),
            settings: self.settings.clone(),
            phase: self.phase,
            created_at: self.created_at,
        }
    }

    /// Add a new player during setup. Game-assigned fields on the incoming
    /// player are ignored; only the server hands out roles.
    pub fn join(&mut self, player: Player) -> Result<Vec<LobbyEvent>, LobbyError> {
        if self.phase != GamePhase::Setup {
            return Err(LobbyError::GameInProgress);
        }
        if self.players.len() >= self.settings.max_players {
            return Err(LobbyError::LobbyFull);
        }
        let player = Player::new(player.id, player.name);
        let id = player.id.clone();
        self.players.push(player.clone());
        Ok(vec![
            LobbyEvent::Unicast(
                id.clone(),
                ServerEvent::LobbyJoined {
                    lobby: self.snapshot_for(&id),
                },
            ),
            LobbyEvent::BroadcastExcept(id, ServerEvent::PlayerJoined { player }),
        ])
    }

    /// Remove a player, whether they sent an explicit leave or their socket
    /// closed. An empty result with an empty roster means the caller must
    /// delete the lobby. A departure can also complete a pending reveal
    /// round or vote, so those checks run here too.
    pub fn remove_player(&mut self, player_id: &str) -> Result<Vec<LobbyEvent>, LobbyError> {
        if !self.contains(player_id) {
            return Err(LobbyError::UnknownPlayer);
        }
        self.players.retain(|p| p.id != player_id);
        self.votes.remove(player_id);
        self.revealed.remove(player_id);

        if self.players.is_empty() {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        if self.host_id == player_id {
            self.host_id = self.players[0].id.clone();
            events.push(LobbyEvent::Broadcast(ServerEvent::HostChanged {
                new_host_id: self.host_id.clone(),
            }));
        }
        events.push(LobbyEvent::Broadcast(ServerEvent::PlayerLeft {
            player_id: player_id.to_string(),
        }));

        match self.phase {
            GamePhase::Revealing => events.extend(self.advance_if_all_revealed()),
            GamePhase::Voting => events.extend(self.tally_if_all_voted()),
            _ => {}
        }
        Ok(events)
    }

    pub fn update_settings(
        &mut self,
        actor: &str,
        patch: SettingsPatch,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.require_host(actor)?;
        if self.phase != GamePhase::Setup {
            return Err(LobbyError::WrongPhase(self.phase));
        }
        self.settings.apply(patch);
        Ok(vec![LobbyEvent::Broadcast(ServerEvent::SettingsUpdated {
            settings: self.settings.clone(),
        })])
    }

    /// Start a round: assign roles with an unbiased shuffle, hand the word to
    /// everyone entitled to it, and move to `Revealing`. The word comes from
    /// the word-bank collaborator; `now` stamps `startedAt`.
    ///
    /// Role assignments leave only as per-player unicasts.
    pub fn start_game(
        &mut self,
        actor: &str,
        word: String,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.require_host(actor)?;
        if self.phase != GamePhase::Setup {
            return Err(LobbyError::WrongPhase(self.phase));
        }
        let roster = self.players.len();
        if roster < MIN_PLAYERS {
            return Err(LobbyError::NotEnoughPlayers);
        }

        let imposter_count = self.settings.imposter_count.min(roster);
        let all_imposters = imposter_count == roster;
        self.settings.is_special_mode = imposter_count == 0 || all_imposters;

        // Fisher-Yates, then the first k shuffled ids are the imposters.
        let mut ids: Vec<PlayerId> = self.players.iter().map(|p| p.id.clone()).collect();
        ids.shuffle(rng);
        let imposters: HashSet<PlayerId> = ids.into_iter().take(imposter_count).collect();

        let mut events = Vec::with_capacity(roster);
        for player in &mut self.players {
            let role = if imposters.contains(&player.id) {
                Role::Imposter
            } else {
                Role::Crewmate
            };
            player.clear_round_state();
            player.role = Some(role);
            // In the all-imposter mode there is no secret to keep, so the
            // word goes to everyone; otherwise imposters get nothing.
            player.word = if role == Role::Crewmate || all_imposters {
                Some(word.clone())
            } else {
                None
            };
            events.push(LobbyEvent::Unicast(
                player.id.clone(),
                ServerEvent::GameStarted {
                    role,
                    word: player.word.clone(),
                    phase: GamePhase::Revealing,
                },
            ));
        }

        let first_speaker = self.players[rng.gen_range(0..roster)].id.clone();
        self.round = Some(RoundState {
            imposters: self
                .players
                .iter()
                .filter(|p| p.is_imposter())
                .map(|p| p.id.clone())
                .collect(),
            word,
            first_speaker,
            started_at: now,
        });
        self.revealed.clear();
        self.votes.clear();
        self.phase = GamePhase::Revealing;
        Ok(events)
    }

    /// Record that a player has seen their role. Idempotent: the revealed
    /// set grows at most once per player, and the auto-advance to
    /// `Discussion` fires exactly once, when the set first covers the roster.
    pub fn reveal(&mut self, player_id: &str) -> Result<Vec<LobbyEvent>, LobbyError> {
        if self.phase != GamePhase::Revealing {
            return Err(LobbyError::WrongPhase(self.phase));
        }
        if !self.contains(player_id) {
            return Err(LobbyError::UnknownPlayer);
        }
        if self.revealed.insert(player_id.to_string()) {
            if let Some(player) = self.player_mut(player_id) {
                player.has_revealed = true;
            }
        }
        let mut events = vec![LobbyEvent::Broadcast(ServerEvent::PlayerRevealed {
            player_id: player_id.to_string(),
        })];
        events.extend(self.advance_if_all_revealed());
        Ok(events)
    }

    fn advance_if_all_revealed(&mut self) -> Vec<LobbyEvent> {
        if self.phase != GamePhase::Revealing
            || self.players.is_empty()
            || self.revealed.len() < self.players.len()
        {
            return Vec::new();
        }
        self.phase = GamePhase::Discussion;
        // Insertion order is the fallback if the chosen speaker left.
        let first_speaker = self
            .round
            .as_ref()
            .map(|r| r.first_speaker.clone())
            .filter(|id| self.contains(id))
            .or_else(|| self.players.first().map(|p| p.id.clone()));
        vec![LobbyEvent::Broadcast(ServerEvent::PhaseChanged {
            phase: GamePhase::Discussion,
            first_speaker,
        })]
    }

    pub fn start_voting(&mut self, actor: &str) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.require_host(actor)?;
        if self.phase != GamePhase::Discussion {
            return Err(LobbyError::WrongPhase(self.phase));
        }
        self.votes.clear();
        for player in &mut self.players {
            player.has_voted = false;
            player.votes.clear();
        }
        self.phase = GamePhase::Voting;
        Ok(vec![LobbyEvent::Broadcast(ServerEvent::VotingStarted {
            phase: GamePhase::Voting,
        })])
    }

    /// Record (or overwrite) the caller's full vote list. The acknowledgment
    /// carries identity only; vote contents stay secret until the tally.
    pub fn submit_votes(
        &mut self,
        actor: &str,
        targets: Vec<PlayerId>,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        if self.phase != GamePhase::Voting {
            return Err(LobbyError::WrongPhase(self.phase));
        }
        if !self.contains(actor) {
            return Err(LobbyError::UnknownPlayer);
        }
        self.votes.insert(actor.to_string(), targets.clone());
        if let Some(player) = self.player_mut(actor) {
            player.has_voted = true;
            player.votes = targets;
        }
        let mut events = vec![LobbyEvent::Broadcast(ServerEvent::VotesSubmitted {
            player_id: actor.to_string(),
        })];
        events.extend(self.tally_if_all_voted());
        Ok(events)
    }

    fn tally_if_all_voted(&mut self) -> Vec<LobbyEvent> {
        if self.phase != GamePhase::Voting
            || self.players.is_empty()
            || !self
                .players
                .iter()
                .all(|p| self.votes.contains_key(&p.id))
        {
            return Vec::new();
        }
        let results = self.tally();
        vec![LobbyEvent::Broadcast(ServerEvent::GameEnded { results })]
    }

    /// Count every cast vote, eliminate all targets tied at the maximum, and
    /// settle the winner. Special modes fix the winner regardless of votes.
    fn tally(&mut self) -> GameResults {
        let mut vote_counts: HashMap<PlayerId, u32> = HashMap::new();
        for targets in self.votes.values() {
            for target in targets {
                *vote_counts.entry(target.clone()).or_insert(0) += 1;
            }
        }
        let max_votes = vote_counts.values().copied().max().unwrap_or(0);
        let eliminated: Vec<PlayerId> = if max_votes == 0 {
            Vec::new()
        } else {
            self.players
                .iter()
                .filter(|p| vote_counts.get(&p.id) == Some(&max_votes))
                .map(|p| p.id.clone())
                .collect()
        };
        for player in &mut self.players {
            player.is_eliminated = eliminated.contains(&player.id);
        }

        let (imposters, word) = match &self.round {
            Some(round) => (round.imposters.clone(), round.word.clone()),
            None => (Vec::new(), String::new()),
        };
        let winner = if imposters.is_empty() {
            // Zero-imposter special mode: there is nobody to catch.
            Winner::Crewmates
        } else if self.settings.is_special_mode {
            // All-imposter special mode.
            Winner::Imposters
        } else if eliminated.iter().any(|id| imposters.contains(id)) {
            Winner::Crewmates
        } else {
            Winner::Imposters
        };

        self.phase = GamePhase::Results;
        GameResults {
            winner,
            imposters,
            votes: self.votes.clone(),
            vote_counts,
            eliminated,
            word,
        }
    }

    /// Host-only overlay signal; the phase does not change and transitions
    /// stay permitted while "paused".
    pub fn pause(&mut self, actor: &str) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.require_host(actor)?;
        Ok(vec![LobbyEvent::Broadcast(ServerEvent::GamePaused {})])
    }

    pub fn resume(&mut self, actor: &str) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.require_host(actor)?;
        Ok(vec![LobbyEvent::Broadcast(ServerEvent::GameResumed {})])
    }

    /// Explicit return to `Setup` after a round. Not an envelope type; the
    /// embedding application decides when a table plays again.
    pub fn reset_round(&mut self, actor: &str) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.require_host(actor)?;
        self.phase = GamePhase::Setup;
        self.round = None;
        self.votes.clear();
        self.revealed.clear();
        self.settings.is_special_mode = false;
        for player in &mut self.players {
            player.clear_round_state();
        }
        Ok(vec![LobbyEvent::Broadcast(ServerEvent::PhaseChanged {
            phase: GamePhase::Setup,
            first_speaker: None,
        })])
    }
}
