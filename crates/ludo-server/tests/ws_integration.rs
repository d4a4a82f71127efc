#[allow(dead_code)]
mod common;

use common::{
    TestServer, ws_connect, ws_connect_and_join, ws_read_until_ack, ws_read_until_closed,
    ws_send_event, ws_try_read_raw, wait_for,
};
use futures::SinkExt;
use ludo_core::net::messages::{AckResult, ServerMessage};
use ludo_core::scoring::{CaptureOutcome, CaptureSide, MoveOutcome};
use ludo_core::test_helpers::{capture_data, join_data, move_data};
use ludo_server::config::ServerConfig;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

fn scores_of(msg: &ServerMessage) -> Vec<(String, u32)> {
    match msg {
        ServerMessage::Scores(s) => s.scores.iter().map(|(k, &v)| (k.clone(), v)).collect(),
        other => panic!("Expected Scores, got: {other:?}"),
    }
}

#[tokio::test]
async fn join_acks_with_room_scores() {
    let server = TestServer::new().await;
    let mut stream = ws_connect(&server.ws_url("p1", "Alice")).await;

    ws_send_event(&mut stream, "join", 42, join_data("r1", "p1", "Alice", &["a", "b"])).await;
    let (broadcasts, ack) = ws_read_until_ack(&mut stream).await;

    assert!(ack.success);
    assert_eq!(ack.ack, Some(42));
    assert_eq!(ack.scores.unwrap()["p1"], 0);
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(scores_of(&broadcasts[0]), vec![("p1".to_string(), 0)]);
}

#[tokio::test]
async fn two_player_game_flow() {
    let server = TestServer::new().await;
    let (mut alice, _) = ws_connect_and_join(&server, "r1", "p1", &["a", "b"]).await;
    let (mut bob, _) = ws_connect_and_join(&server, "r1", "p2", &["x"]).await;

    ws_send_event(&mut alice, "move", 2, move_data("r1", "p1", "a", 6)).await;
    let (seen, _) = ws_read_until_ack(&mut alice).await;
    // Bob's join broadcast comes first.
    assert_eq!(
        scores_of(&seen[0]),
        vec![("p1".to_string(), 0), ("p2".to_string(), 0)]
    );
    assert_eq!(
        scores_of(&seen[1]),
        vec![("p1".to_string(), 8), ("p2".to_string(), 0)]
    );
    match &seen[2] {
        ServerMessage::MoveAck(m) => {
            assert_eq!(m.player_id, "p1");
            assert_eq!(m.pawn_id, "a");
            assert_eq!(m.steps, 6);
            assert_eq!(m.bonus, 2);
            assert_eq!(m.player_total, 8);
        },
        other => panic!("Expected MoveAck, got: {other:?}"),
    }

    ws_send_event(&mut bob, "move", 2, move_data("r1", "p2", "x", 5)).await;
    let (seen, ack) = ws_read_until_ack(&mut bob).await;
    assert_eq!(
        ack.result,
        Some(AckResult::Move(MoveOutcome {
            pawn_score: 5,
            player_total: 5,
            bonus: 0,
        }))
    );
    // Alice's move broadcasts, then Bob's own.
    assert_eq!(seen.len(), 4);
    assert_eq!(
        scores_of(&seen[2]),
        vec![("p1".to_string(), 8), ("p2".to_string(), 5)]
    );

    ws_send_event(
        &mut alice,
        "capture",
        3,
        capture_data("r1", ("p1", "a"), ("p2", "x")),
    )
    .await;
    let (seen, ack) = ws_read_until_ack(&mut alice).await;
    let expected = CaptureOutcome {
        striker: CaptureSide {
            pawn_score: 13,
            total: 13,
        },
        victim: CaptureSide {
            pawn_score: 0,
            total: 0,
        },
        combo_bonus: 0,
    };
    assert_eq!(ack.ack, Some(3));
    assert_eq!(ack.result, Some(AckResult::Capture(expected)));
    // Bob's move (scores + moveAck), then the capture (scores + captureAck).
    assert_eq!(seen.len(), 4);
    assert_eq!(
        scores_of(&seen[2]),
        vec![("p1".to_string(), 13), ("p2".to_string(), 0)]
    );
    match &seen[3] {
        ServerMessage::CaptureAck(c) => {
            assert_eq!(c.striker.player_id, "p1");
            assert_eq!(c.victim.pawn_id, "x");
            assert_eq!(c.result, expected);
        },
        other => panic!("Expected CaptureAck, got: {other:?}"),
    }

    assert_eq!(server.state.scoring.pawn_score("r1", "p2", "x"), Some(0));
}

#[tokio::test]
async fn second_capture_in_window_earns_combo() {
    let server = TestServer::new().await;
    let (mut alice, _) = ws_connect_and_join(&server, "r1", "p1", &["a"]).await;
    let (_bob, _) = ws_connect_and_join(&server, "r1", "p2", &["x", "y"]).await;

    ws_send_event(&mut alice, "capture", 2, capture_data("r1", ("p1", "a"), ("p2", "x"))).await;
    let (_, first) = ws_read_until_ack(&mut alice).await;
    ws_send_event(&mut alice, "capture", 3, capture_data("r1", ("p1", "a"), ("p2", "y"))).await;
    let (_, second) = ws_read_until_ack(&mut alice).await;

    let combo = |ack: &ludo_core::net::messages::AckMsg| match ack.result {
        Some(AckResult::Capture(c)) => c.combo_bonus,
        ref other => panic!("Expected capture result, got: {other:?}"),
    };
    assert_eq!(combo(&first), 0);
    assert_eq!(combo(&second), 5);
    assert_eq!(server.state.scoring.combo_streak("r1", "p1"), 2);
}

#[tokio::test]
async fn invalid_move_is_rejected_without_broadcast() {
    let server = TestServer::new().await;
    let (mut alice, _) = ws_connect_and_join(&server, "r1", "p1", &["a"]).await;
    let (mut bob, _) = ws_connect_and_join(&server, "r1", "p2", &["x"]).await;
    // Drain Bob's join broadcast from Alice's stream.
    assert!(ws_try_read_raw(&mut alice, 500).await.is_some());

    for steps in [0, 7] {
        ws_send_event(&mut alice, "move", 9, move_data("r1", "p1", "a", steps)).await;
        let (seen, ack) = ws_read_until_ack(&mut alice).await;
        assert!(seen.is_empty());
        assert!(!ack.success);
        assert_eq!(ack.ack, Some(9));
        assert!(
            ack.error.as_deref().unwrap().starts_with("Validation failed: "),
            "{ack:?}"
        );
    }

    assert!(ws_try_read_raw(&mut bob, 200).await.is_none());
    assert_eq!(server.state.scoring.pawn_score("r1", "p1", "a"), Some(0));
}

#[tokio::test]
async fn malformed_payload_reports_every_violation() {
    let server = TestServer::new().await;
    let mut stream = ws_connect(&server.ws_url("p1", "Alice")).await;

    ws_send_event(
        &mut stream,
        "move",
        1,
        json!({"roomId": "r1", "steps": "six"}),
    )
    .await;
    let (_, ack) = ws_read_until_ack(&mut stream).await;
    let error = ack.error.unwrap();
    assert!(error.contains("playerId is required"), "{error}");
    assert!(error.contains("pawnId is required"), "{error}");
    assert!(error.contains("steps must be an integer"), "{error}");
}

#[tokio::test]
async fn move_into_foreign_room_is_unauthorized() {
    let server = TestServer::new().await;
    let (mut alice, _) = ws_connect_and_join(&server, "r1", "p1", &["a"]).await;
    let (mut carol, _) = ws_connect_and_join(&server, "r2", "p3", &["z"]).await;

    ws_send_event(&mut alice, "move", 5, move_data("r2", "p3", "z", 4)).await;
    let (_, ack) = ws_read_until_ack(&mut alice).await;
    assert!(!ack.success);
    assert_eq!(
        ack.error.as_deref(),
        Some("Connection not authorized for room r2")
    );

    assert!(ws_try_read_raw(&mut carol, 200).await.is_none());
    assert_eq!(server.state.scoring.pawn_score("r2", "p3", "z"), Some(0));
}

#[tokio::test]
async fn handshake_without_identity_is_refused() {
    let server = TestServer::new().await;
    let url = format!("ws://{}/ws?playerId=p1", server.addr);

    match tokio_tungstenite::connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
            assert_eq!(resp.status(), 401);
        },
        Ok(_) => panic!("Expected handshake rejection"),
        Err(e) => panic!("Expected HTTP 401, got: {e}"),
    }
}

#[tokio::test]
async fn undecodable_frames_are_dropped() {
    let server = TestServer::new().await;
    let (mut alice, _) = ws_connect_and_join(&server, "r1", "p1", &["a"]).await;

    alice
        .send(Message::Binary(vec![0xFF, 0x00].into()))
        .await
        .unwrap();
    alice.send(Message::Text("hello".into())).await.unwrap();
    assert!(ws_try_read_raw(&mut alice, 200).await.is_none());

    // The connection is still usable afterwards.
    ws_send_event(&mut alice, "move", 2, move_data("r1", "p1", "a", 3)).await;
    let (_, ack) = ws_read_until_ack(&mut alice).await;
    assert!(ack.success);
}

#[tokio::test]
async fn events_over_budget_get_failure_ack() {
    let mut config = ServerConfig::default();
    config.limits.ws_rate_burst = 2;
    config.limits.ws_rate_limit_per_sec = 0.01;
    let server = TestServer::from_config(config).await;
    let (mut alice, _) = ws_connect_and_join(&server, "r1", "p1", &["a"]).await;

    ws_send_event(&mut alice, "move", 2, move_data("r1", "p1", "a", 3)).await;
    let (_, ack) = ws_read_until_ack(&mut alice).await;
    assert!(ack.success);

    ws_send_event(&mut alice, "move", 3, move_data("r1", "p1", "a", 4)).await;
    let (seen, ack) = ws_read_until_ack(&mut alice).await;
    assert!(seen.is_empty());
    assert!(!ack.success);
    assert_eq!(ack.ack, Some(3));
    assert_eq!(ack.error.as_deref(), Some("Rate limited"));
    assert_eq!(server.state.scoring.pawn_score("r1", "p1", "a"), Some(3));
}

#[tokio::test]
async fn close_cleans_up_session() {
    let server = TestServer::new().await;
    let (mut alice, _) = ws_connect_and_join(&server, "r1", "p1", &["a"]).await;
    wait_for(&server.state, |s| s.total_connections == 1).await;

    alice.close(None).await.unwrap();
    wait_for(&server.state, |s| s.total_connections == 0 && s.total_players == 0).await;
    assert_eq!(server.state.hub.read().await.subscriber_count("r1"), 0);

    // Scores outlive the connection.
    assert_eq!(server.state.scoring.get_scores("r1")["p1"], 0);
}

#[tokio::test]
async fn forced_disconnect_notifies_each_connection() {
    let server = TestServer::new().await;
    let (mut first, _) = ws_connect_and_join(&server, "r1", "p1", &["a"]).await;
    let (mut second, _) = ws_connect_and_join(&server, "r1", "p1", &["a"]).await;
    let (mut bob, _) = ws_connect_and_join(&server, "r1", "p2", &["x"]).await;
    assert!(server.state.sessions.read().await.has_duplicate_connections("p1"));

    let closed = server
        .state
        .sessions
        .read()
        .await
        .disconnect_player("p1", "duplicate connection");
    assert_eq!(closed, 2);

    for stream in [&mut first, &mut second] {
        let seen = ws_read_until_closed(stream).await;
        let notice = seen
            .iter()
            .find_map(|m| match m {
                ServerMessage::AuthDisconnect(d) => Some(d.reason.clone()),
                _ => None,
            })
            .expect("AuthDisconnect before close");
        assert_eq!(notice, "duplicate connection");
    }

    wait_for(&server.state, |s| s.total_connections == 1).await;
    assert!(server.state.sessions.read().await.player_connections("p1").is_empty());

    // Bob's connection is untouched.
    ws_send_event(&mut bob, "move", 2, move_data("r1", "p2", "x", 1)).await;
    let (_, ack) = ws_read_until_ack(&mut bob).await;
    assert!(ack.success);
}
