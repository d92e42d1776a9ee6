//! Resolves inbound envelopes to a lobby and player, invokes the state
//! machine, and fans the resulting events out to the right connections.

use chrono::Utc;
use imposter_game_common::{
    ChatMessage, ClientRequest, Lobby, LobbyError, LobbyEvent, PlayerId, ServerEvent,
};
use rand::thread_rng;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::directory::ClientSender;
use crate::state::ServerState;

/// Rejections on the dispatch path. Every one becomes a targeted `ERROR`
/// to the offending connection and leaves all state unchanged.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Lobby not found")]
    LobbyNotFound,
    #[error("Not in a lobby")]
    NoSession,
    #[error("No words available for the selected categories")]
    NoWords,
    #[error(transparent)]
    Lobby(#[from] LobbyError),
}

/// What this connection last bound to. Envelopes after `CREATE_LOBBY` /
/// `JOIN_LOBBY` are resolved against it.
#[derive(Debug)]
pub struct SessionContext {
    pub conn_id: Uuid,
    pub player_id: Option<PlayerId>,
    pub lobby_code: Option<String>,
}

impl SessionContext {
    pub fn new(conn_id: Uuid) -> Self {
        Self {
            conn_id,
            player_id: None,
            lobby_code: None,
        }
    }

    fn session(&self) -> Result<(PlayerId, String), DispatchError> {
        match (&self.player_id, &self.lobby_code) {
            (Some(player_id), Some(code)) => Ok((player_id.clone(), code.clone())),
            _ => Err(DispatchError::NoSession),
        }
    }
}

/// Reply on this connection directly, independent of any directory binding.
fn reply(tx: &ClientSender, event: &ServerEvent) {
    if let Some(message) = ServerState::encode(event) {
        let _ = tx.send(message);
    }
}

/// Deliver a transition's events to the lobby's (post-transition) roster.
fn deliver(state: &ServerState, roster: &[PlayerId], events: &[LobbyEvent]) {
    for event in events {
        match event {
            LobbyEvent::Broadcast(ev) => {
                for id in roster {
                    state.try_send(id, ev);
                }
            }
            LobbyEvent::BroadcastExcept(skip, ev) => {
                for id in roster.iter().filter(|id| *id != skip) {
                    state.try_send(id, ev);
                }
            }
            LobbyEvent::Unicast(to, ev) => state.try_send(to, ev),
        }
    }
}

pub fn handle_request(
    state: &ServerState,
    ctx: &mut SessionContext,
    tx: &ClientSender,
    request: ClientRequest,
) {
    if let Err(err) = dispatch(state, ctx, tx, request) {
        reply(tx, &ServerEvent::error(err.to_string()));
    }
}

fn dispatch(
    state: &ServerState,
    ctx: &mut SessionContext,
    tx: &ClientSender,
    request: ClientRequest,
) -> Result<(), DispatchError> {
    match request {
        ClientRequest::Ping {} => {
            reply(tx, &ServerEvent::Pong {});
            Ok(())
        }
        ClientRequest::CreateLobby { host_id, settings } => {
            let (code, lobby) = state.registry.lock().unwrap().create_lobby(
                host_id.clone(),
                settings,
                Utc::now(),
                &mut thread_rng(),
            );
            state
                .directory
                .lock()
                .unwrap()
                .bind(host_id.clone(), ctx.conn_id, tx.clone());
            ctx.player_id = Some(host_id.clone());
            ctx.lobby_code = Some(code.clone());
            let snapshot = lobby.lock().unwrap().snapshot_for(&host_id);
            info!(%code, host = %host_id, "lobby created");
            reply(
                tx,
                &ServerEvent::LobbyCreated {
                    code,
                    lobby: snapshot,
                },
            );
            Ok(())
        }
        ClientRequest::JoinLobby { code, player } => {
            let shared = state
                .registry
                .lock()
                .unwrap()
                .get(&code)
                .ok_or(DispatchError::LobbyNotFound)?;
            let mut lobby = shared.lock().unwrap();
            if lobby.contains(&player.id) {
                // Reconnect: rebind the transport and resync, no roster
                // mutation, allowed in any phase.
                state
                    .directory
                    .lock()
                    .unwrap()
                    .bind(player.id.clone(), ctx.conn_id, tx.clone());
                ctx.player_id = Some(player.id.clone());
                ctx.lobby_code = Some(code.clone());
                info!(%code, player = %player.id, "player rebound");
                reply(
                    tx,
                    &ServerEvent::LobbyJoined {
                        lobby: lobby.snapshot_for(&player.id),
                    },
                );
                return Ok(());
            }
            let player_id = player.id.clone();
            let events = lobby.join(player)?;
            state
                .directory
                .lock()
                .unwrap()
                .bind(player_id.clone(), ctx.conn_id, tx.clone());
            ctx.player_id = Some(player_id.clone());
            ctx.lobby_code = Some(code.clone());
            let roster = roster_of(&lobby);
            drop(lobby);
            info!(%code, player = %player_id, "player joined");
            deliver(state, &roster, &events);
            Ok(())
        }
        ClientRequest::LeaveLobby {} => {
            let (player_id, code) = ctx.session()?;
            state.directory.lock().unwrap().unbind(&player_id);
            remove_from_lobby(state, &player_id, &code);
            info!(%code, player = %player_id, "player left");
            ctx.player_id = None;
            ctx.lobby_code = None;
            Ok(())
        }
        ClientRequest::UpdateSettings { settings } => with_lobby(state, ctx, |lobby, actor| {
            lobby.update_settings(actor, settings)
        }),
        ClientRequest::StartGame {} => {
            let (player_id, code) = ctx.session()?;
            let shared = state
                .registry
                .lock()
                .unwrap()
                .get(&code)
                .ok_or(DispatchError::LobbyNotFound)?;
            let mut lobby = shared.lock().unwrap();
            let word = state
                .words
                .random_word(&lobby.settings.selected_categories, &mut thread_rng())
                .ok_or(DispatchError::NoWords)?;
            let events = lobby.start_game(&player_id, word, Utc::now(), &mut thread_rng())?;
            let roster = roster_of(&lobby);
            drop(lobby);
            info!(%code, "game started");
            deliver(state, &roster, &events);
            Ok(())
        }
        ClientRequest::PlayerRevealed { player_id } => {
            with_lobby(state, ctx, |lobby, _| lobby.reveal(&player_id))
        }
        ClientRequest::StartVoting {} => {
            with_lobby(state, ctx, |lobby, actor| lobby.start_voting(actor))
        }
        ClientRequest::SubmitVotes { votes } => with_lobby(state, ctx, |lobby, actor| {
            lobby.submit_votes(actor, votes)
        }),
        ClientRequest::PauseGame {} => with_lobby(state, ctx, |lobby, actor| lobby.pause(actor)),
        ClientRequest::ResumeGame {} => with_lobby(state, ctx, |lobby, actor| lobby.resume(actor)),
        ClientRequest::SendChat { message } => {
            let (player_id, code) = ctx.session()?;
            let shared = state
                .registry
                .lock()
                .unwrap()
                .get(&code)
                .ok_or(DispatchError::LobbyNotFound)?;
            let lobby = shared.lock().unwrap();
            let player_name = lobby
                .players
                .iter()
                .find(|p| p.id == player_id)
                .map(|p| p.name.clone())
                .ok_or(LobbyError::UnknownPlayer)?;
            let roster = roster_of(&lobby);
            drop(lobby);
            let event = ServerEvent::ChatMessage(ChatMessage {
                player_id,
                player_name,
                message,
                timestamp: Utc::now(),
            });
            for id in &roster {
                state.try_send(id, &event);
            }
            Ok(())
        }
    }
}

/// Transport closure funnels into the same leave transition as an explicit
/// `LEAVE_LOBBY`. If this connection was already superseded by a rebind,
/// the close is a no-op.
pub fn handle_disconnect(state: &ServerState, ctx: &SessionContext) {
    let Ok((player_id, code)) = ctx.session() else {
        return;
    };
    if !state
        .directory
        .lock()
        .unwrap()
        .unbind_if(&player_id, ctx.conn_id)
    {
        return;
    }
    info!(%code, player = %player_id, "player disconnected");
    remove_from_lobby(state, &player_id, &code);
}

fn roster_of(lobby: &Lobby) -> Vec<PlayerId> {
    lobby.players.iter().map(|p| p.id.clone()).collect()
}

/// Run one serialized operation against the connection's lobby, delivering
/// its events on success.
fn with_lobby<F>(state: &ServerState, ctx: &SessionContext, op: F) -> Result<(), DispatchError>
where
    F: FnOnce(&mut Lobby, &str) -> Result<Vec<LobbyEvent>, LobbyError>,
{
    let (player_id, code) = ctx.session()?;
    let shared = state
        .registry
        .lock()
        .unwrap()
        .get(&code)
        .ok_or(DispatchError::LobbyNotFound)?;
    let mut lobby = shared.lock().unwrap();
    let events = op(&mut lobby, &player_id)?;
    let roster = roster_of(&lobby);
    drop(lobby);
    deliver(state, &roster, &events);
    Ok(())
}

fn remove_from_lobby(state: &ServerState, player_id: &str, code: &str) {
    let Some(shared) = state.registry.lock().unwrap().get(code) else {
        return;
    };
    let mut lobby = shared.lock().unwrap();
    match lobby.remove_player(player_id) {
        Ok(events) => {
            if lobby.players.is_empty() {
                drop(lobby);
                state.registry.lock().unwrap().delete(code);
                info!(%code, "lobby deleted (empty)");
            } else {
                let roster = roster_of(&lobby);
                drop(lobby);
                deliver(state, &roster, &events);
            }
        }
        // Already gone; a duplicate leave has nothing left to do.
        Err(_) => {}
    }
}
