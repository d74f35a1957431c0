//! End-to-end bridge behavior over in-memory duplex channels.
//!
//! Two sessions attached to the two ends of a `duplex_pair` form a complete
//! bridge; these tests drive the public API on both sides and, where a
//! misbehaving peer is needed, speak raw frames on one end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use webwire_core::{
    duplex_pair, BridgeSession, BridgeSide, CallError, ErrorKind, SessionState,
    DEFAULT_FRAME_CAPACITY,
};

fn attached_pair() -> (Arc<BridgeSession>, Arc<BridgeSession>) {
    let (left, right) = duplex_pair(DEFAULT_FRAME_CAPACITY);
    (
        BridgeSession::attach(BridgeSide::new(), left),
        BridgeSession::attach(BridgeSide::new(), right),
    )
}

// ── Calls ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_exposed_function_answers_a_remote_call() {
    // Arrange
    let (backend, frontend) = attached_pair();
    backend.expose_fn("add", |args| {
        let a = args[0].as_i64().ok_or("args[0] is not an integer")?;
        let b = args[1].as_i64().ok_or("args[1] is not an integer")?;
        Ok(json!(a + b))
    });

    // Act
    let result = frontend.call("add", vec![json!(2), json!(3)]).await;

    // Assert
    assert_eq!(result.unwrap(), json!(5));
}

#[tokio::test]
async fn test_call_to_unexposed_name_fails_with_name_not_found() {
    let (_backend, frontend) = attached_pair();

    let result = frontend.call("missing_fn", vec![]).await;

    match result {
        Err(CallError::Remote { kind, message }) => {
            assert_eq!(kind, ErrorKind::NameNotFound);
            assert!(message.contains("missing_fn"), "message was: {message}");
        }
        other => panic!("expected NameNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failing_handler_reports_its_message_and_session_survives() {
    let (backend, frontend) = attached_pair();
    backend.expose_fn("explode", |_| Err("boom".to_string()));
    backend.expose_fn("ping", |_| Ok(json!("pong")));

    let failure = frontend.call("explode", vec![]).await;
    match failure {
        Err(CallError::Remote { kind, message }) => {
            assert_eq!(kind, ErrorKind::Handler);
            assert_eq!(message, "boom");
        }
        other => panic!("expected Handler failure, got {other:?}"),
    }

    // A handler failure is a normal result; the session stays usable.
    assert_eq!(frontend.state(), SessionState::Open);
    assert_eq!(frontend.call("ping", vec![]).await.unwrap(), json!("pong"));
}

#[tokio::test]
async fn test_panicking_handler_still_fails_the_call() {
    // Arrange
    let (backend, frontend) = attached_pair();
    backend.expose_fn("panics", |_| panic!("handler bug"));
    backend.expose_fn("ping", |_| Ok(json!("pong")));

    // Act
    let result = frontend.call("panics", vec![]).await;

    // Assert: the caller gets a structured failure, never a hang.
    match result {
        Err(CallError::Remote { kind, message }) => {
            assert_eq!(kind, ErrorKind::Handler);
            assert!(message.contains("panicked"), "message was: {message}");
        }
        other => panic!("expected Handler failure, got {other:?}"),
    }

    // The panic took out only its own invocation.
    assert_eq!(frontend.state(), SessionState::Open);
    assert_eq!(frontend.call("ping", vec![]).await.unwrap(), json!("pong"));
}

#[tokio::test]
async fn test_concurrent_calls_resolve_independently_of_reply_order() {
    // Arrange: one slow handler, one fast. Replies arrive out of issue order.
    let (backend, frontend) = attached_pair();
    backend.expose(
        "slow",
        Arc::new(|_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(json!("slow-result"))
            })
        }),
    );
    backend.expose_fn("fast", |_| Ok(json!("fast-result")));

    let order = Arc::new(Mutex::new(Vec::new()));

    // Act: issue slow before fast, record completion order.
    let slow_order = Arc::clone(&order);
    let slow_session = Arc::clone(&frontend);
    let slow = tokio::spawn(async move {
        let value = slow_session.call("slow", vec![]).await.unwrap();
        slow_order.lock().unwrap().push("slow");
        value
    });
    let fast_order = Arc::clone(&order);
    let fast_session = Arc::clone(&frontend);
    let fast = tokio::spawn(async move {
        let value = fast_session.call("fast", vec![]).await.unwrap();
        fast_order.lock().unwrap().push("fast");
        value
    });

    // Assert: each call gets its own reply, and fast finished first.
    assert_eq!(slow.await.unwrap(), json!("slow-result"));
    assert_eq!(fast.await.unwrap(), json!("fast-result"));
    assert_eq!(order.lock().unwrap().clone(), vec!["fast", "slow"]);
}

#[tokio::test]
async fn test_value_domain_survives_a_full_round_trip() {
    let (backend, frontend) = attached_pair();
    backend.expose_fn("echo", |args| Ok(args.into_iter().next().unwrap()));

    let value = json!({
        "null": null,
        "bool": false,
        "int": -7,
        "float": 2.25,
        "string": "héllo",
        "list": [1, [2, [3]]],
        "map": {"k": {"deeper": true}}
    });
    let echoed = frontend.call("echo", vec![value.clone()]).await.unwrap();

    assert_eq!(echoed, value);
}

// ── Registration semantics ────────────────────────────────────────────────────

#[tokio::test]
async fn test_reexposing_a_name_serves_the_latest_handler() {
    let (backend, frontend) = attached_pair();
    backend.expose_fn("version", |_| Ok(json!(1)));
    backend.expose_fn("version", |_| Ok(json!(2)));

    let result = frontend.call("version", vec![]).await.unwrap();

    assert_eq!(result, json!(2));
}

// ── Events ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_event_reaches_subscribers_in_registration_order() {
    // Arrange: two subscribers on the backend side.
    let (backend, frontend) = attached_pair();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::channel(4);

    for label in ["first", "second"] {
        let log = Arc::clone(&log);
        let notify_tx = notify_tx.clone();
        backend.on_event(
            "tick",
            Arc::new(move |payload| {
                log.lock().unwrap().push(format!("{label}:{payload}"));
                let _ = notify_tx.try_send(());
                Ok(())
            }),
        );
    }

    // Act
    frontend.emit("tick", json!({"n": 1})).await.unwrap();

    // Assert: wait for both deliveries, then check order.
    notify_rx.recv().await.unwrap();
    notify_rx.recv().await.unwrap();
    let seen = log.lock().unwrap().clone();
    assert_eq!(seen, vec![r#"first:{"n":1}"#, r#"second:{"n":1}"#]);
}

#[tokio::test]
async fn test_events_arrive_in_emission_order() {
    let (backend, frontend) = attached_pair();
    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::channel(4);
    backend.on_event(
        "step",
        Arc::new(move |payload| {
            let _ = seen_tx.try_send(payload.clone());
            Ok(())
        }),
    );

    frontend.emit("step", json!(1)).await.unwrap();
    frontend.emit("step", json!(2)).await.unwrap();
    frontend.emit("step", json!(3)).await.unwrap();

    assert_eq!(seen_rx.recv().await.unwrap(), json!(1));
    assert_eq!(seen_rx.recv().await.unwrap(), json!(2));
    assert_eq!(seen_rx.recv().await.unwrap(), json!(3));
}

#[tokio::test]
async fn test_emit_also_runs_local_subscribers() {
    let (_backend, frontend) = attached_pair();
    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::channel(1);
    frontend.on_event(
        "local-tick",
        Arc::new(move |payload| {
            let _ = notify_tx.try_send(payload.clone());
            Ok(())
        }),
    );

    frontend.emit("local-tick", json!(42)).await.unwrap();

    assert_eq!(notify_rx.recv().await.unwrap(), json!(42));
}

// ── Misbehaving peers ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_result_frames_resolve_the_call_once() {
    // Arrange: a session on one end, raw frames on the other.
    let (left, mut raw) = duplex_pair(DEFAULT_FRAME_CAPACITY);
    let session = BridgeSession::attach(BridgeSide::new(), left);

    let call_session = Arc::clone(&session);
    let call = tokio::spawn(async move { call_session.call("f", vec![]).await });

    // Read the Invoke frame and extract its id.
    let invoke_frame = raw.rx.recv().await.unwrap();
    let invoke: Value = serde_json::from_str(&invoke_frame).unwrap();
    assert_eq!(invoke["type"], "Invoke");
    let id = invoke["id"].as_u64().unwrap();

    // Act: reply twice with different values.
    let first = json!({"type": "Result", "id": id, "value": "first"});
    let second = json!({"type": "Result", "id": id, "value": "second"});
    raw.tx.send(first.to_string()).await.unwrap();
    raw.tx.send(second.to_string()).await.unwrap();

    // Assert: only the first reply is observed, the duplicate is ignored,
    // and the session is still open.
    assert_eq!(call.await.unwrap().unwrap(), json!("first"));
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test]
async fn test_malformed_frame_is_skipped_and_the_session_continues() {
    let (left, mut raw) = duplex_pair(DEFAULT_FRAME_CAPACITY);
    let side = BridgeSide::new();
    side.registry
        .expose_fn("ping", |_| Ok(json!("pong")));
    let _session = BridgeSession::attach(side, left);

    // A garbage frame followed by a well-formed Invoke.
    raw.tx.send("{not json".to_string()).await.unwrap();
    let invoke = json!({"type": "Invoke", "id": 0, "name": "ping", "args": []});
    raw.tx.send(invoke.to_string()).await.unwrap();

    // The Invoke after the garbage still gets its reply.
    let reply_frame = raw.rx.recv().await.unwrap();
    let reply: Value = serde_json::from_str(&reply_frame).unwrap();
    assert_eq!(reply["type"], "Result");
    assert_eq!(reply["id"], json!(0));
    assert_eq!(reply["value"], json!("pong"));
}

// ── Teardown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_close_fails_every_pending_call_with_connection_closed() {
    // Arrange: a handler that never completes.
    let (backend, frontend) = attached_pair();
    backend.expose(
        "hang",
        Arc::new(|_| Box::pin(std::future::pending())),
    );

    let a_session = Arc::clone(&frontend);
    let call_a = tokio::spawn(async move { a_session.call("hang", vec![]).await });
    let b_session = Arc::clone(&frontend);
    let call_b = tokio::spawn(async move { b_session.call("hang", vec![]).await });

    // Let both Invokes reach the wire before closing.
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Act
    frontend.close().await;
    frontend.wait_closed().await;

    // Assert
    assert_eq!(call_a.await.unwrap(), Err(CallError::ConnectionClosed));
    assert_eq!(call_b.await.unwrap(), Err(CallError::ConnectionClosed));
    assert_eq!(frontend.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_registrations_survive_reattach_but_pending_calls_do_not() {
    // Arrange: a backend side whose registry outlives the first channel.
    let backend_side = BridgeSide::new();
    backend_side
        .registry
        .expose_fn("add", |args| {
            let a = args[0].as_i64().ok_or("not an integer")?;
            let b = args[1].as_i64().ok_or("not an integer")?;
            Ok(json!(a + b))
        });
    backend_side.registry.expose(
        "hang",
        Arc::new(|_| Box::pin(std::future::pending())),
    );

    let (left, right) = duplex_pair(DEFAULT_FRAME_CAPACITY);
    let backend_one = BridgeSession::attach(backend_side.clone(), left);
    let frontend_one = BridgeSession::attach(BridgeSide::new(), right);

    // A call left pending on the first session.
    let pending_session = Arc::clone(&frontend_one);
    let pending = tokio::spawn(async move { pending_session.call("hang", vec![]).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Act: the first channel dies; a new session reattaches to the same side.
    frontend_one.close().await;
    backend_one.wait_closed().await;

    let (left, right) = duplex_pair(DEFAULT_FRAME_CAPACITY);
    let _backend_two = BridgeSession::attach(backend_side.clone(), left);
    let frontend_two = BridgeSession::attach(BridgeSide::new(), right);

    // Assert: the old pending call was rejected, and the surviving registry
    // answers over the new channel without re-exposing anything.
    assert_eq!(pending.await.unwrap(), Err(CallError::ConnectionClosed));
    let sum = frontend_two.call("add", vec![json!(20), json!(22)]).await;
    assert_eq!(sum.unwrap(), json!(42));
}
