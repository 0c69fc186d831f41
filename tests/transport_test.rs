//! Transport-level integration tests against a scripted mock server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use common::{ok, refused_address, rpc_err, MockServer, Responder};
use electrum_spv::network::{ElectrumTransport, RawNotification, TransportEvent, TransportState};
use electrum_spv::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn scripted_responder() -> Responder {
    Arc::new(|id, method, _params| match method {
        "server.version" => Some(ok(id, json!(["MockElectrum 1.0"]))),
        "blockchain.address.subscribe" => Some(ok(id, json!(null))),
        "test.fail" => Some(rpc_err(id, json!({"code": -5, "message": "nope"}))),
        _ => None,
    })
}

async fn running_transport(
    server: &MockServer,
) -> (ElectrumTransport, mpsc::UnboundedReceiver<TransportEvent>) {
    let transport = ElectrumTransport::new(server.address(), CONNECT_TIMEOUT, None);
    let mut events = transport.state_changes();
    transport.start();
    assert_eq!(events.recv().await, Some(TransportEvent::Running));
    assert_eq!(transport.state(), TransportState::Running);
    (transport, events)
}

#[tokio::test]
async fn call_resolves_with_result() {
    let server = MockServer::start(scripted_responder()).await;
    let (transport, _events) = running_transport(&server).await;

    let result = transport.call("server.version", vec![]).await.unwrap();
    assert_eq!(result, json!(["MockElectrum 1.0"]));
}

#[tokio::test]
async fn call_surfaces_rpc_error() {
    let server = MockServer::start(scripted_responder()).await;
    let (transport, _events) = running_transport(&server).await;

    let error = transport.call("test.fail", vec![]).await.unwrap_err();
    match error {
        TransportError::Rpc(payload) => assert_eq!(payload["code"], json!(-5)),
        other => panic!("expected rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn pending_calls_fail_on_disconnect() {
    let server = MockServer::start(scripted_responder()).await;
    let (transport, mut events) = running_transport(&server).await;
    let transport = Arc::new(transport);

    let first = tokio::spawn({
        let transport = transport.clone();
        async move { transport.call("test.hang", vec![]).await }
    });
    let second = tokio::spawn({
        let transport = transport.clone();
        async move { transport.call("test.hang", vec![]).await }
    });
    // Let both requests reach the server before the cut.
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.close_current().await;

    assert!(matches!(first.await.unwrap(), Err(TransportError::Disconnected)));
    assert!(matches!(second.await.unwrap(), Err(TransportError::Disconnected)));
    assert_eq!(
        events.recv().await,
        Some(TransportEvent::Terminated {
            from: TransportState::Running
        })
    );
    assert_eq!(transport.state(), TransportState::Terminated);
}

#[tokio::test]
async fn unmatched_response_is_dropped() {
    let server = MockServer::start(scripted_responder()).await;
    let (transport, _events) = running_transport(&server).await;

    server.send_line(r#"{"id": 999, "result": "stale"}"#).await;

    let result = transport.call("server.version", vec![]).await.unwrap();
    assert_eq!(result, json!(["MockElectrum 1.0"]));
}

#[tokio::test]
async fn malformed_frame_is_tolerated() {
    let server = MockServer::start(scripted_responder()).await;
    let (transport, _events) = running_transport(&server).await;

    server.send_line("this is not json").await;
    server.send_line(r#"{"params": []}"#).await;

    let result = transport.call("server.version", vec![]).await.unwrap();
    assert_eq!(result, json!(["MockElectrum 1.0"]));
    assert_eq!(transport.state(), TransportState::Running);
}

#[tokio::test]
async fn notifications_dispatch_to_handler_in_order() {
    let server = MockServer::start(scripted_responder()).await;
    let (transport, _events) = running_transport(&server).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = Box::new(move |note: RawNotification| {
        let status = note.params.get(1).and_then(Value::as_str).map(str::to_string);
        tx.send(status).unwrap();
    });

    let reply = transport
        .subscribe("blockchain.address.subscribe", vec![json!("X")], handler)
        .await
        .unwrap();
    // The initial reply resolves the future, not the handler.
    assert_eq!(reply, json!(null));
    assert!(rx.try_recv().is_err());

    for status in ["s1", "s2", "s3"] {
        server.notify("blockchain.address.subscribe", json!(["X", status])).await;
    }

    for expected in ["s1", "s2", "s3"] {
        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(got.as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn unsubscribe_drops_later_notifications() {
    let server = MockServer::start(scripted_responder()).await;
    let (transport, _events) = running_transport(&server).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = Box::new(move |note: RawNotification| {
        tx.send(note.params).unwrap();
    });
    transport
        .subscribe("blockchain.address.subscribe", vec![json!("X")], handler)
        .await
        .unwrap();

    transport.unsubscribe("blockchain.address.subscribe", "X");
    // Commands are processed in order, so this round trip proves the
    // unsubscribe has been applied before the notification goes out.
    transport.call("server.version", vec![]).await.unwrap();

    server.notify("blockchain.address.subscribe", json!(["X", "s1"])).await;
    transport.call("server.version", vec![]).await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn stop_terminates_and_is_idempotent() {
    let server = MockServer::start(scripted_responder()).await;
    let (transport, mut events) = running_transport(&server).await;

    transport.stop();
    assert_eq!(
        events.recv().await,
        Some(TransportEvent::Terminated {
            from: TransportState::Stopping
        })
    );
    assert_eq!(transport.state(), TransportState::Terminated);

    transport.stop();
    assert_eq!(transport.state(), TransportState::Terminated);
}

#[tokio::test]
async fn refused_connection_terminates_from_starting() {
    let address = refused_address().await;
    let transport = ElectrumTransport::new(address, CONNECT_TIMEOUT, None);
    let mut events = transport.state_changes();
    transport.start();

    assert_eq!(
        events.recv().await,
        Some(TransportEvent::Terminated {
            from: TransportState::Starting
        })
    );
    assert_eq!(transport.state(), TransportState::Terminated);
}

#[tokio::test]
async fn call_made_before_termination_of_failed_connect_fails() {
    let address = refused_address().await;
    let transport = ElectrumTransport::new(address, CONNECT_TIMEOUT, None);
    transport.start();

    let error = transport.call("server.version", vec![]).await.unwrap_err();
    assert!(matches!(error, TransportError::Disconnected));
}

#[tokio::test]
async fn call_timeout_fails_only_that_call() {
    let server = MockServer::start(scripted_responder()).await;
    let transport = ElectrumTransport::new(
        server.address(),
        CONNECT_TIMEOUT,
        Some(Duration::from_millis(100)),
    );
    let mut events = transport.state_changes();
    transport.start();
    assert_eq!(events.recv().await, Some(TransportEvent::Running));

    let error = transport.call("test.hang", vec![]).await.unwrap_err();
    assert!(matches!(error, TransportError::Timeout));

    // The run is unaffected.
    assert_eq!(transport.state(), TransportState::Running);
    let result = transport.call("server.version", vec![]).await.unwrap();
    assert_eq!(result, json!(["MockElectrum 1.0"]));
}
