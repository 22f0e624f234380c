//! End-to-end tests over real WebSocket connections.

use collabcanvas_server::{ServerConfig, serve};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a server on a free port, return its WebSocket URL.
async fn start_test_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve(listener, ServerConfig::default(), std::future::pending())
            .await
            .unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn connect(url: &str) -> Client {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Client, json: &str) {
    ws.send(Message::text(json)).await.unwrap();
}

/// Read frames until one of type `kind` arrives, returning it together with
/// the types skipped on the way.
async fn next_of_type(ws: &mut Client, kind: &str) -> (Value, Vec<String>) {
    let mut skipped = Vec::new();
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
            .unwrap()
            .unwrap();
        let Ok(text) = msg.to_text() else { continue };
        if text.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(text).unwrap();
        let ty = value["type"].as_str().unwrap().to_string();
        if ty == kind {
            return (value, skipped);
        }
        skipped.push(ty);
    }
}

#[tokio::test]
async fn test_join_receives_history() {
    let url = start_test_server().await;

    let mut alice = connect(&url).await;
    let (init, _) = next_of_type(&mut alice, "initCanvas").await;
    assert!(init["events"].as_array().unwrap().is_empty());

    send(
        &mut alice,
        r##"{"type":"start","strokeId":"s1","tool":"brush","color":"#ff0000","stroke":3,"xNorm":0.1,"yNorm":0.1}"##,
    )
    .await;
    send(
        &mut alice,
        r#"{"type":"draw","strokeId":"s1","xNorm":0.2,"yNorm":0.2}"#,
    )
    .await;
    // Round-trip through the hub so both events are stored before bob joins.
    send(&mut alice, r#"{"type":"requestInit"}"#).await;
    next_of_type(&mut alice, "initCanvas").await;

    let mut bob = connect(&url).await;
    let (init, _) = next_of_type(&mut bob, "initCanvas").await;
    let events = init["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["type"], "start");
    assert_eq!(events[0]["color"], "#ff0000");
    assert_eq!(events[1]["type"], "draw");
    assert_eq!(events[0]["seq"], events[1]["seq"]);
}

#[tokio::test]
async fn test_relay_reaches_others_but_not_sender() {
    let url = start_test_server().await;

    let mut alice = connect(&url).await;
    next_of_type(&mut alice, "initCanvas").await;
    let mut bob = connect(&url).await;
    next_of_type(&mut bob, "initCanvas").await;

    send(
        &mut alice,
        r#"{"type":"shape","shape":"rect","xNorm":0.1,"yNorm":0.1,"wNorm":0.2,"hNorm":0.2}"#,
    )
    .await;

    let (relayed, _) = next_of_type(&mut bob, "shape").await;
    assert_eq!(relayed["seq"], 1);
    assert!(relayed["id"].is_string());

    // The relay would be queued for alice before this replay.
    send(&mut alice, r#"{"type":"requestInit"}"#).await;
    let (init, skipped) = next_of_type(&mut alice, "initCanvas").await;
    assert!(!skipped.iter().any(|t| t == "shape"));
    assert_eq!(init["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_undo_replays_to_everyone() {
    let url = start_test_server().await;

    let mut alice = connect(&url).await;
    next_of_type(&mut alice, "initCanvas").await;
    let mut bob = connect(&url).await;
    next_of_type(&mut bob, "initCanvas").await;

    send(
        &mut alice,
        r#"{"type":"text","text":"hello","xNorm":0.5,"yNorm":0.5}"#,
    )
    .await;
    next_of_type(&mut bob, "text").await;

    send(&mut bob, r#"{"type":"undo"}"#).await;
    for ws in [&mut alice, &mut bob] {
        let (init, _) = next_of_type(ws, "initCanvas").await;
        assert!(init["events"].as_array().unwrap().is_empty());
    }

    send(&mut bob, r#"{"type":"redo"}"#).await;
    for ws in [&mut alice, &mut bob] {
        let (init, _) = next_of_type(ws, "initCanvas").await;
        let events = init["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["text"], "hello");
    }
}

#[tokio::test]
async fn test_disconnect_is_announced() {
    let url = start_test_server().await;

    let mut alice = connect(&url).await;
    next_of_type(&mut alice, "initCanvas").await;
    let mut bob = connect(&url).await;
    next_of_type(&mut bob, "initCanvas").await;

    let (users, _) = next_of_type(&mut alice, "userList").await;
    // Alice's first userList only listed herself; the second lists both.
    let users = if users["users"].as_object().unwrap().len() == 1 {
        next_of_type(&mut alice, "userList").await.0
    } else {
        users
    };
    assert_eq!(users["users"].as_object().unwrap().len(), 2);

    bob.close(None).await.unwrap();
    let (gone, _) = next_of_type(&mut alice, "userDisconnected").await;
    assert!(gone["id"].is_string());
}

#[tokio::test]
async fn test_health() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve(listener, ServerConfig::default(), std::future::pending())
            .await
            .unwrap();
    });

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("ok"));
}
