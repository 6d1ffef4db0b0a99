//! End-to-end calls between two endpoints over an in-memory pipe.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use wirecall_protocol::{Envelope, EnvelopeCodec, JsonRegistry, Payload};
use wirecall_rpc::{Endpoint, ReplyContext, RpcError};
use wirecall_session::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Echo {
    text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fail {
    reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ping;

fn registry() -> Arc<JsonRegistry> {
    let mut registry = JsonRegistry::new();
    registry
        .register::<Echo>("test.Echo")
        .register::<Fail>("test.Fail")
        .register::<Ping>("test.Ping");
    Arc::new(registry)
}

struct Pair {
    client: Arc<Endpoint<Payload>>,
    client_session: Session<Envelope<Payload>>,
    server_session: Session<Envelope<Payload>>,
}

fn connect() -> Pair {
    let registry = registry();
    let (a, b) = tokio::io::duplex(64 * 1024);

    let client_session = Session::new(a, EnvelopeCodec::new(registry.clone()));
    let server_session = Session::new(b, EnvelopeCodec::new(registry));

    let server = Arc::new(Endpoint::<Payload>::new());
    server
        .server()
        .register("test.Echo", |data: Payload, ctx: ReplyContext<Payload>| {
            let _ = ctx.reply_ok(data);
        });
    server
        .server()
        .register("test.Fail", |data: Payload, ctx: ReplyContext<Payload>| {
            let reason = data
                .downcast_ref::<Fail>()
                .map(|f| f.reason.clone())
                .unwrap_or_default();
            let _ = ctx.reply_err(reason);
        });
    server.attach(&server_session).unwrap();

    let client = Arc::new(Endpoint::<Payload>::new());
    client.attach(&client_session).unwrap();

    Pair {
        client,
        client_session,
        server_session,
    }
}

#[tokio::test]
async fn test_echo_roundtrip() {
    let pair = connect();
    let request = Echo {
        text: "hello".to_string(),
    };

    let reply = pair
        .client
        .client()
        .call(
            &pair.client_session,
            "test.Echo",
            Payload::new(request.clone()),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

    assert_eq!(reply.downcast::<Echo>().unwrap(), request);
    assert_eq!(pair.client.client().pending_count(), 0);
}

#[tokio::test]
async fn test_many_calls_in_flight() {
    let pair = connect();
    let client = pair.client.client().clone();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let client = client.clone();
            let session = pair.client_session.clone();
            tokio::spawn(async move {
                let reply = client
                    .call(
                        &session,
                        "test.Echo",
                        Payload::new(Echo {
                            text: format!("msg-{}", i),
                        }),
                        Duration::from_secs(2),
                    )
                    .await
                    .unwrap();
                assert_eq!(reply.downcast_ref::<Echo>().unwrap().text, format!("msg-{}", i));
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_remote_error() {
    let pair = connect();

    let result = pair
        .client
        .client()
        .call(
            &pair.client_session,
            "test.Fail",
            Payload::new(Fail {
                reason: "boom".to_string(),
            }),
            Duration::from_secs(2),
        )
        .await;

    assert!(matches!(result, Err(RpcError::Remote(text)) if text == "boom"));
}

#[tokio::test]
async fn test_unhandled_method_times_out() {
    let pair = connect();

    let result = pair
        .client
        .client()
        .call(
            &pair.client_session,
            "test.Ping",
            Payload::new(Ping),
            Duration::from_millis(100),
        )
        .await;

    assert!(matches!(result, Err(RpcError::Timeout)));
    assert_eq!(pair.client.client().pending_count(), 0);
}

#[tokio::test]
async fn test_peer_close_closes_session() {
    let pair = connect();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = parking_lot::Mutex::new(Some(tx));
    pair.server_session.set_close_callback(move |reason| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(reason.to_string());
        }
    });

    pair.client_session.close("done");

    let reason = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .unwrap()
        .unwrap();
    assert!(!reason.is_empty());
    assert!(pair.server_session.is_closed());
}
