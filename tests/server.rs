mod common;
use common::{eventually, patiently, serve, test_mux, TestClient};

use serde_json::json;
use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};
use tcpchat::{Connect, Proto, Request, ServerConfig, DEADLINE_EXCEEDED};

#[tokio::test]
async fn request_response() {
    let server = serve(test_mux()).await;
    let addr = server.local_addr();

    let resp = TestClient::call(addr, &Request::new("GET", "/ping")).await;
    assert_eq!(resp.status_code(), 200);
    assert_eq!(resp.status(), "pong");
    assert_eq!(resp.header()["Content-Length"], 0);

    let resp = TestClient::call(addr, &Request::new("GET", "/echo/hi/123")).await;
    assert_eq!(resp.body(), "hi,123");
    assert_eq!(resp.header()["Content-Length"], 6);

    server.shutdown().await;
}

#[tokio::test]
async fn wire_defaults() {
    let server = serve(test_mux()).await;

    let mut client = TestClient::connect(server.local_addr()).await;
    client.send_raw(r#"{"method":"GET","url":"/ping"}"#).await;
    let resp = client.recv_json().await;
    assert_eq!(
        resp,
        json!({"status": "pong", "status_code": 200, "header": {"Content-Length": 0}, "body": ""})
    );
    // one request per connection
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn unmatched_route_gets_no_response() {
    let server = serve(test_mux()).await;

    let mut client = TestClient::connect(server.local_addr()).await;
    client.send(&Request::new("POST", "/ping")).await;
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn malformed_request_is_rejected() {
    let server = serve(test_mux()).await;

    let mut client = TestClient::connect(server.local_addr()).await;
    client.send_raw(r#"{"url":"/ping"}"#).await;
    let resp = client.recv_response().await;
    assert_eq!(resp.status_code(), 400);
    assert_eq!(resp.status(), "malformed request");

    // not json at all
    let mut client = TestClient::connect(server.local_addr()).await;
    client.send_raw("ping").await;
    let resp = client.recv_response().await;
    assert_eq!(resp.status_code(), 400);
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn slow_handler_times_out() {
    let server = serve(test_mux()).await;

    let resp = TestClient::call(server.local_addr(), &Request::new("GET", "/slow")).await;
    assert_eq!(resp.status_code(), 502);
    assert_eq!(resp.status(), DEADLINE_EXCEEDED);
}

#[tokio::test]
async fn streaming_session() {
    let server = serve(test_mux()).await;
    let addr = server.local_addr();

    let (mut client, ack) = TestClient::stream(addr, "GET", "/stream", &json!({})).await;
    assert_eq!(ack.status(), "streaming");

    // outlives the request/response deadline
    tokio::time::sleep(common::TEST_TIMEOUT * 2).await;
    for i in 0..3 {
        client.send_json(&json!({"n": i})).await;
        assert_eq!(client.recv_json().await, json!({"n": i}));
    }

    // the streaming proto is required
    let resp = TestClient::call(addr, &Request::new("GET", "/stream")).await;
    assert_eq!(resp.status_code(), 400);

    // no upgrade on a request/response call
    let req = Request::new("GET", "/ping").with_proto(Proto::Streaming);
    let resp = TestClient::call(addr, &req).await;
    assert_eq!(resp.status(), "pong");
}

#[tokio::test]
async fn shutdown_ends_idle_sessions() {
    let server = serve(test_mux()).await;
    let addr = server.local_addr();
    let (mut client, _) = TestClient::stream(addr, "GET", "/stream", &json!({})).await;
    eventually(|| server.active_connections() == 1).await;

    patiently(server.shutdown()).await;
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn drain_waits_for_sessions() {
    let server = serve(test_mux()).await;
    let addr = server.local_addr();
    let (mut client, _) = TestClient::stream(addr, "GET", "/stream", &json!({})).await;

    let drain = tokio::spawn(server.drain());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!drain.is_finished());

    // the open session is still served
    client.send_json(&json!("still here")).await;
    assert_eq!(client.recv_json().await, json!("still here"));

    drop(client);
    patiently(drain).await.unwrap();
}

#[tokio::test]
async fn connection_limit() {
    let config = ServerConfig {
        addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        max_connections: Some(1),
        max_frame_len: tcpchat::DEFAULT_MAX_FRAME_LEN,
    };
    let server = config.serve(test_mux()).await.unwrap();
    let addr = server.local_addr();

    let (first, _) = TestClient::stream(addr, "GET", "/stream", &json!({})).await;

    let waiting = tokio::spawn(async move {
        TestClient::call(addr, &Request::new("GET", "/ping")).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiting.is_finished());

    drop(first);
    let resp = patiently(waiting).await.unwrap();
    assert_eq!(resp.status(), "pong");
}

#[tokio::test]
async fn oversized_frame_drops_connection() {
    let config = ServerConfig {
        addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        max_connections: None,
        max_frame_len: 64,
    };
    let server = config.serve(test_mux()).await.unwrap();

    let mut client = TestClient::connect(server.local_addr()).await;
    let body = "x".repeat(128);
    client.send(&Request::new("GET", "/ping").with_body(body)).await;
    assert!(client.is_closed().await);
}
