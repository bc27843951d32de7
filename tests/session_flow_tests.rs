//! End-to-end session flows exercised through the public router and hub.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

use marbleparty::room::{InMemoryRoomStore, RoomStore};
use marbleparty::shared::AppState;
use marbleparty::websockets::{ClientRole, NoMapBlueprints, ServerMessage, SessionHub};

struct TestServer {
    store: Arc<InMemoryRoomStore>,
    hub: Arc<SessionHub>,
    app: Router,
}

fn server_with_ttls(room_ttl: Duration, participant_ttl: Duration) -> TestServer {
    let store = Arc::new(InMemoryRoomStore::new(room_ttl, participant_ttl));
    let hub = Arc::new(SessionHub::new(store.clone(), Arc::new(NoMapBlueprints)));
    let app = marbleparty::app_router(AppState::new(store.clone(), hub.clone()));
    TestServer { store, hub, app }
}

fn server() -> TestServer {
    server_with_ttls(Duration::from_secs(3600), Duration::from_secs(60))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> ServerMessage {
    let text = rx.try_recv().expect("expected a broadcast frame");
    serde_json::from_str(&text).expect("broadcast frame should parse")
}

#[tokio::test]
async fn test_full_session_from_creation_to_race() {
    let server = server();

    // Host creates a room over HTTP
    let (status, created) = send(&server.app, post_json("/api/rooms", "{}".to_string())).await;
    assert_eq!(status, StatusCode::CREATED);
    let room_id = created["roomId"].as_str().unwrap().to_string();
    let room_code = created["roomCode"].as_str().unwrap().to_string();
    let host_key = created["hostKey"].as_str().unwrap().to_string();

    // Host binds a socket
    let (host_tx, mut host_rx) = mpsc::unbounded_channel();
    let host = server
        .hub
        .handle_join(
            server.hub.next_connection_id().await,
            host_tx,
            &room_id,
            ClientRole::Host,
            &host_key,
        )
        .await
        .expect("host key from creation should bind");
    match recv(&mut host_rx) {
        ServerMessage::RoomState {
            participant_count, ..
        } => assert_eq!(participant_count, 0),
        other => panic!("unexpected message: {other:?}"),
    }

    // Kim joins by code; the host's socket sees the count change
    let (status, kim) = send(
        &server.app,
        post_json(
            "/api/rooms/join",
            format!(r#"{{"roomCode":"{room_code}","displayName":"Kim"}}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let kim_id = kim["participantId"].as_str().unwrap().to_string();
    let kim_token = kim["displayToken"].as_str().unwrap().to_string();
    match recv(&mut host_rx) {
        ServerMessage::RoomState {
            participant_count,
            ready_count,
        } => {
            assert_eq!(participant_count, 1);
            assert_eq!(ready_count, 0);
        }
        other => panic!("unexpected message: {other:?}"),
    }

    // Kim readies up
    let mut ready = post_json(
        &format!("/api/rooms/{room_id}/participants/{kim_id}/ready"),
        r#"{"isReady":true}"#.to_string(),
    );
    ready.headers_mut().insert(
        "authorization",
        format!("Bearer {kim_token}").parse().unwrap(),
    );
    let (status, _) = send(&server.app, ready).await;
    assert_eq!(status, StatusCode::OK);
    match recv(&mut host_rx) {
        ServerMessage::RoomState {
            participant_count,
            ready_count,
        } => {
            assert_eq!(participant_count, 1);
            assert_eq!(ready_count, 1);
        }
        other => panic!("unexpected message: {other:?}"),
    }

    // Lee joins and binds a participant socket
    let (_, lee) = send(
        &server.app,
        post_json(
            "/api/rooms/join",
            format!(r#"{{"roomCode":"{room_code}","displayName":"Lee"}}"#),
        ),
    )
    .await;
    let lee_id = lee["participantId"].as_str().unwrap().to_string();
    let lee_token = lee["displayToken"].as_str().unwrap().to_string();
    recv(&mut host_rx); // count 2

    let (lee_tx, mut lee_rx) = mpsc::unbounded_channel();
    let lee_binding = server
        .hub
        .handle_join(
            server.hub.next_connection_id().await,
            lee_tx,
            &room_id,
            ClientRole::Participant,
            &lee_token,
        )
        .await
        .expect("fresh display token should bind");
    recv(&mut host_rx);
    match recv(&mut lee_rx) {
        ServerMessage::RoomState {
            participant_count,
            ready_count,
        } => {
            assert_eq!(participant_count, 2);
            assert_eq!(ready_count, 1);
        }
        other => panic!("unexpected message: {other:?}"),
    }

    // Room status over HTTP agrees with the broadcasts
    let (status, state) = send(&server.app, get(&format!("/api/rooms/{room_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["status"], "waiting");
    assert_eq!(state["participantCount"], 2);
    assert_eq!(state["readyCount"], 1);

    // Host starts the race; both sockets receive the same assignment
    server
        .hub
        .handle_start_game(&host, vec!["Kim".to_string(), "Lee".to_string()], None)
        .await;
    for rx in [&mut host_rx, &mut lee_rx] {
        match recv(rx) {
            ServerMessage::GameStarted {
                candidates,
                assignments,
                ..
            } => {
                assert_eq!(candidates, vec!["Kim", "Lee"]);
                assert_eq!(assignments[&kim_id].obstacle_id, 0);
                assert_eq!(assignments[&lee_id].obstacle_id, 1);
                assert_eq!(assignments[&lee_id].nickname, "Lee");
                assert_ne!(assignments[&kim_id].color, assignments[&lee_id].color);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    let (_, state) = send(&server.app, get(&format!("/api/rooms/{room_id}"))).await;
    assert_eq!(state["status"], "playing");

    // Lee taps; everyone sees the obstacle event with Lee's slot
    server
        .hub
        .handle_obstacle_action(&lee_binding, Some("tap".to_string()))
        .await;
    for rx in [&mut host_rx, &mut lee_rx] {
        match recv(rx) {
            ServerMessage::ObstacleAction {
                participant_id,
                obstacle_id,
                action,
                ..
            } => {
                assert_eq!(participant_id, lee_id);
                assert_eq!(obstacle_id, 1);
                assert_eq!(action, "tap");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    // Host tears the room down; the code stops resolving
    let close = Request::builder()
        .method("DELETE")
        .uri(format!("/api/rooms/{room_id}"))
        .header("x-host-key", &host_key)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&server.app, close).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &server.app,
        post_json(
            "/api/rooms/join",
            format!(r#"{{"roomCode":"{room_code}","displayName":"Late"}}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_room_vanishes_without_sweep() {
    let server = server_with_ttls(Duration::from_millis(30), Duration::from_secs(60));

    let (_, created) = send(&server.app, post_json("/api/rooms", "{}".to_string())).await;
    let room_id = created["roomId"].as_str().unwrap().to_string();
    let room_code = created["roomCode"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(60)).await;

    // No sweep task is running in this test, yet every surface 404s
    let (status, _) = send(&server.app, get(&format!("/api/rooms/{room_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &server.app,
        post_json(
            "/api/rooms/join",
            format!(r#"{{"roomCode":"{room_code}","displayName":"Kim"}}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stale_participant_expires_but_room_survives() {
    let server = server_with_ttls(Duration::from_secs(3600), Duration::from_millis(20));

    let (_, created) = send(&server.app, post_json("/api/rooms", "{}".to_string())).await;
    let room_id = created["roomId"].as_str().unwrap().to_string();
    let room_code = created["roomCode"].as_str().unwrap().to_string();

    let (_, kim) = send(
        &server.app,
        post_json(
            "/api/rooms/join",
            format!(r#"{{"roomCode":"{room_code}","displayName":"Kim"}}"#),
        ),
    )
    .await;
    let kim_token = kim["displayToken"].as_str().unwrap().to_string();

    // Kim keeps heartbeating while the TTL elapses twice over
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        server.store.touch_participant(&room_id, &kim_token).await;
    }
    assert_eq!(server.store.cleanup_participants().await, 0);

    // Then goes quiet
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(server.store.cleanup_participants().await, 1);

    let (status, state) = send(&server.app, get(&format!("/api/rooms/{room_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["participantCount"], 0);
}

#[tokio::test]
async fn test_leave_then_token_is_dead() {
    let server = server();

    let (_, created) = send(&server.app, post_json("/api/rooms", "{}".to_string())).await;
    let room_id = created["roomId"].as_str().unwrap().to_string();
    let room_code = created["roomCode"].as_str().unwrap().to_string();

    let (_, kim) = send(
        &server.app,
        post_json(
            "/api/rooms/join",
            format!(r#"{{"roomCode":"{room_code}","displayName":"Kim"}}"#),
        ),
    )
    .await;
    let kim_token = kim["displayToken"].as_str().unwrap().to_string();

    let mut leave = post_json(&format!("/api/rooms/{room_id}/leave"), String::new());
    leave.headers_mut().insert(
        "authorization",
        format!("Bearer {kim_token}").parse().unwrap(),
    );
    let (status, _) = send(&server.app, leave).await;
    assert_eq!(status, StatusCode::OK);

    // The token no longer authenticates anything
    let mut leave_again = post_json(&format!("/api/rooms/{room_id}/leave"), String::new());
    leave_again.headers_mut().insert(
        "authorization",
        format!("Bearer {kim_token}").parse().unwrap(),
    );
    let (status, _) = send(&server.app, leave_again).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (hub_tx, _hub_rx) = mpsc::unbounded_channel();
    let binding = server
        .hub
        .handle_join(
            server.hub.next_connection_id().await,
            hub_tx,
            &room_id,
            ClientRole::Participant,
            &kim_token,
        )
        .await;
    assert!(binding.is_none());
}
