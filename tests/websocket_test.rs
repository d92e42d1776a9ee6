use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use serial_test::serial;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_app() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    tokio::spawn(async move {
        imposter_server::run(addr).await.unwrap();
    });
    sleep(Duration::from_millis(100)).await;
    addr
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect");
    stream
}

async fn send(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Read frames until one of the wanted type arrives.
async fn recv_type(ws: &mut WsStream, wanted: &str) -> Value {
    timeout(Duration::from_secs(2), async {
        while let Some(msg) = ws.next().await {
            if let Ok(Message::Text(text)) = msg {
                let parsed: Value = serde_json::from_str(&text).unwrap();
                if parsed["type"] == wanted {
                    return parsed;
                }
            }
        }
        panic!("connection closed while waiting for {wanted}");
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {wanted}"))
}

/// Read exactly the next text frame.
async fn recv_next(ws: &mut WsStream) -> Value {
    timeout(Duration::from_secs(2), async {
        while let Some(msg) = ws.next().await {
            if let Ok(Message::Text(text)) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
        panic!("connection closed");
    })
    .await
    .expect("timed out waiting for a frame")
}

async fn create_lobby(ws: &mut WsStream, host_id: &str) -> String {
    send(
        ws,
        json!({ "type": "CREATE_LOBBY", "payload": { "hostId": host_id, "settings": {} } }),
    )
    .await;
    let created = recv_type(ws, "LOBBY_CREATED").await;
    created["payload"]["code"].as_str().unwrap().to_string()
}

async fn join_lobby(ws: &mut WsStream, code: &str, id: &str, name: &str) {
    send(
        ws,
        json!({
            "type": "JOIN_LOBBY",
            "payload": { "code": code, "player": { "id": id, "name": name } }
        }),
    )
    .await;
    recv_type(ws, "LOBBY_JOINED").await;
}

#[tokio::test]
#[serial]
async fn create_lobby_returns_a_confusable_free_code() {
    let addr = spawn_app().await;
    let mut host = connect(addr).await;

    send(
        &mut host,
        json!({ "type": "CREATE_LOBBY", "payload": { "hostId": "host-1", "settings": {} } }),
    )
    .await;
    let created = recv_type(&mut host, "LOBBY_CREATED").await;
    let code = created["payload"]["code"].as_str().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code
        .chars()
        .all(|c| "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".contains(c)));
    assert_eq!(created["payload"]["lobby"]["hostId"], "host-1");
    assert_eq!(created["payload"]["lobby"]["phase"], "setup");
}

#[tokio::test]
#[serial]
async fn full_round_over_real_sockets() {
    let addr = spawn_app().await;
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    let code = create_lobby(&mut host, "a").await;
    join_lobby(&mut host, &code, "a", "Ann").await;
    join_lobby(&mut guest, &code, "b", "Ben").await;

    // Existing roster members hear about the newcomer.
    let joined = recv_type(&mut host, "PLAYER_JOINED").await;
    assert_eq!(joined["payload"]["player"]["id"], "b");

    // Roles arrive as individually-addressed messages.
    send(&mut host, json!({ "type": "START_GAME", "payload": {} })).await;
    let started_a = recv_type(&mut host, "GAME_STARTED").await;
    let started_b = recv_type(&mut guest, "GAME_STARTED").await;
    let role_a = started_a["payload"]["role"].as_str().unwrap().to_string();
    let role_b = started_b["payload"]["role"].as_str().unwrap().to_string();
    let mut roles = vec![role_a.clone(), role_b.clone()];
    roles.sort();
    assert_eq!(roles, ["crewmate", "imposter"]);
    for (started, role) in [(&started_a, &role_a), (&started_b, &role_b)] {
        if role == "imposter" {
            assert!(started["payload"]["word"].is_null());
        } else {
            assert!(!started["payload"]["word"].as_str().unwrap().is_empty());
        }
    }

    // Everyone reveals; the phase advances on its own.
    send(
        &mut host,
        json!({ "type": "PLAYER_REVEALED", "payload": { "playerId": "a" } }),
    )
    .await;
    send(
        &mut guest,
        json!({ "type": "PLAYER_REVEALED", "payload": { "playerId": "b" } }),
    )
    .await;
    let phase = recv_type(&mut guest, "PHASE_CHANGED").await;
    assert_eq!(phase["payload"]["phase"], "discussion");
    recv_type(&mut host, "PHASE_CHANGED").await;

    send(&mut host, json!({ "type": "START_VOTING", "payload": {} })).await;
    recv_type(&mut host, "VOTING_STARTED").await;
    recv_type(&mut guest, "VOTING_STARTED").await;

    send(
        &mut host,
        json!({ "type": "SUBMIT_VOTES", "payload": { "votes": ["b"] } }),
    )
    .await;
    // The acknowledgment carries the voter's identity only.
    let ack = recv_type(&mut guest, "VOTES_SUBMITTED").await;
    assert_eq!(ack["payload"]["playerId"], "a");
    assert!(ack["payload"].get("votes").is_none());

    send(
        &mut guest,
        json!({ "type": "SUBMIT_VOTES", "payload": { "votes": ["a"] } }),
    )
    .await;

    for ws in [&mut host, &mut guest] {
        let ended = recv_type(ws, "GAME_ENDED").await;
        let results = &ended["payload"]["results"];
        assert_eq!(results["voteCounts"]["a"], 1);
        assert_eq!(results["voteCounts"]["b"], 1);
        // 1-1 tie: both eliminated, which takes the imposter down.
        assert_eq!(results["eliminated"].as_array().unwrap().len(), 2);
        assert_eq!(results["winner"], "crewmates");
        assert!(!results["word"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
#[serial]
async fn non_host_operations_are_rejected() {
    let addr = spawn_app().await;
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    let code = create_lobby(&mut host, "a").await;
    join_lobby(&mut host, &code, "a", "Ann").await;
    join_lobby(&mut guest, &code, "b", "Ben").await;

    send(&mut guest, json!({ "type": "START_GAME", "payload": {} })).await;
    let error = recv_type(&mut guest, "ERROR").await;
    assert_eq!(error["payload"]["message"], "Only the host can do that");

    send(
        &mut guest,
        json!({ "type": "UPDATE_SETTINGS", "payload": { "settings": { "imposterCount": 4 } } }),
    )
    .await;
    let error = recv_type(&mut guest, "ERROR").await;
    assert_eq!(error["payload"]["message"], "Only the host can do that");

    // The host's settings update goes through and reaches everyone.
    send(
        &mut host,
        json!({ "type": "UPDATE_SETTINGS", "payload": { "settings": { "imposterCount": 2 } } }),
    )
    .await;
    let updated = recv_type(&mut guest, "SETTINGS_UPDATED").await;
    assert_eq!(updated["payload"]["settings"]["imposterCount"], 2);
}

#[tokio::test]
#[serial]
async fn join_is_rejected_once_the_game_started() {
    let addr = spawn_app().await;
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    let code = create_lobby(&mut host, "a").await;
    join_lobby(&mut host, &code, "a", "Ann").await;
    join_lobby(&mut guest, &code, "b", "Ben").await;
    send(&mut host, json!({ "type": "START_GAME", "payload": {} })).await;
    recv_type(&mut host, "GAME_STARTED").await;

    let mut late = connect(addr).await;
    send(
        &mut late,
        json!({
            "type": "JOIN_LOBBY",
            "payload": { "code": code, "player": { "id": "c", "name": "Cam" } }
        }),
    )
    .await;
    let error = recv_type(&mut late, "ERROR").await;
    assert_eq!(error["payload"]["message"], "Game already in progress");
}

#[tokio::test]
#[serial]
async fn joining_an_unknown_code_fails() {
    let addr = spawn_app().await;
    let mut ws = connect(addr).await;
    send(
        &mut ws,
        json!({
            "type": "JOIN_LOBBY",
            "payload": { "code": "ZZZZZZ", "player": { "id": "x", "name": "Xan" } }
        }),
    )
    .await;
    let error = recv_type(&mut ws, "ERROR").await;
    assert_eq!(error["payload"]["message"], "Lobby not found");
}

#[tokio::test]
#[serial]
async fn unknown_envelope_types_are_ignored() {
    let addr = spawn_app().await;
    let mut ws = connect(addr).await;

    send(&mut ws, json!({ "type": "DO_A_DANCE", "payload": {} })).await;
    send(&mut ws, json!({ "type": "PING", "payload": {} })).await;

    // No ERROR for the unknown type; the very next frame is the pong.
    let frame = recv_next(&mut ws).await;
    assert_eq!(frame["type"], "PONG");
}

#[tokio::test]
#[serial]
async fn malformed_json_gets_an_error_but_keeps_the_connection() {
    let addr = spawn_app().await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("this is not json".into()))
        .await
        .unwrap();
    let error = recv_type(&mut ws, "ERROR").await;
    assert_eq!(error["payload"]["message"], "Malformed message");

    send(&mut ws, json!({ "type": "PING", "payload": {} })).await;
    recv_type(&mut ws, "PONG").await;
}

#[tokio::test]
#[serial]
async fn leaving_host_hands_off_to_the_earliest_joiner() {
    let addr = spawn_app().await;
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    let code = create_lobby(&mut host, "a").await;
    join_lobby(&mut host, &code, "a", "Ann").await;
    join_lobby(&mut guest, &code, "b", "Ben").await;
    recv_type(&mut host, "PLAYER_JOINED").await;

    send(&mut host, json!({ "type": "LEAVE_LOBBY", "payload": {} })).await;
    let changed = recv_type(&mut guest, "HOST_CHANGED").await;
    assert_eq!(changed["payload"]["newHostId"], "b");
    let left = recv_type(&mut guest, "PLAYER_LEFT").await;
    assert_eq!(left["payload"]["playerId"], "a");
}

#[tokio::test]
#[serial]
async fn disconnect_funnels_into_the_same_leave_transition() {
    let addr = spawn_app().await;
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    let code = create_lobby(&mut host, "a").await;
    join_lobby(&mut host, &code, "a", "Ann").await;
    join_lobby(&mut guest, &code, "b", "Ben").await;
    recv_type(&mut host, "PLAYER_JOINED").await;

    host.close(None).await.unwrap();
    let changed = recv_type(&mut guest, "HOST_CHANGED").await;
    assert_eq!(changed["payload"]["newHostId"], "b");
}

#[tokio::test]
#[serial]
async fn reconnect_rebinds_without_a_phantom_leave() {
    let addr = spawn_app().await;
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    let code = create_lobby(&mut host, "a").await;
    join_lobby(&mut host, &code, "a", "Ann").await;
    join_lobby(&mut guest, &code, "b", "Ben").await;
    recv_type(&mut host, "PLAYER_JOINED").await;

    // The guest opens a fresh socket and rejoins under the same id: a
    // rebind, not a new player.
    let mut guest2 = connect(addr).await;
    send(
        &mut guest2,
        json!({
            "type": "JOIN_LOBBY",
            "payload": { "code": code, "player": { "id": "b", "name": "Ben" } }
        }),
    )
    .await;
    let rejoined = recv_type(&mut guest2, "LOBBY_JOINED").await;
    assert_eq!(
        rejoined["payload"]["lobby"]["players"]
            .as_array()
            .unwrap()
            .len(),
        2
    );

    // The superseded socket closing must not kick the rebound player.
    guest.close(None).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/lobby/{}", addr, code))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["playerCount"], 2);

    // And the fresh socket still receives lobby traffic.
    send(
        &mut host,
        json!({ "type": "SEND_CHAT", "payload": { "message": "welcome back" } }),
    )
    .await;
    let chat = recv_type(&mut guest2, "CHAT_MESSAGE").await;
    assert_eq!(chat["payload"]["message"], "welcome back");
}

#[tokio::test]
#[serial]
async fn chat_reaches_the_whole_lobby() {
    let addr = spawn_app().await;
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    let code = create_lobby(&mut host, "a").await;
    join_lobby(&mut host, &code, "a", "Ann").await;
    join_lobby(&mut guest, &code, "b", "Ben").await;

    send(
        &mut host,
        json!({ "type": "SEND_CHAT", "payload": { "message": "hello" } }),
    )
    .await;
    for ws in [&mut host, &mut guest] {
        let chat = recv_type(ws, "CHAT_MESSAGE").await;
        assert_eq!(chat["payload"]["playerId"], "a");
        assert_eq!(chat["payload"]["playerName"], "Ann");
        assert_eq!(chat["payload"]["message"], "hello");
        assert!(chat["payload"]["timestamp"].is_string());
    }
}

#[tokio::test]
#[serial]
async fn lobby_is_deleted_when_the_last_player_leaves() {
    let addr = spawn_app().await;
    let mut host = connect(addr).await;

    let code = create_lobby(&mut host, "a").await;
    join_lobby(&mut host, &code, "a", "Ann").await;
    send(&mut host, json!({ "type": "LEAVE_LOBBY", "payload": {} })).await;
    sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/lobby/{}", addr, code))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}
