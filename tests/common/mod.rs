#![allow(dead_code)]

use bytes::Bytes;
use serde_json::Value;
use std::{
    future::Future,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};
use tcpchat::{
    http::StatusCode, Connect, Connection, Mux, Proto, Request, Response, ServerShutdown,
    TimeoutLayer,
};

/// Deadline applied to request/response calls of the test mux.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(50);

/// How long a test waits for the server before failing.
const PATIENCE: Duration = Duration::from_secs(5);

/// Instantiate a mux for testing.
pub fn test_mux() -> Mux {
    Mux::new()
        .layer(TimeoutLayer::new(TEST_TIMEOUT))
        .route("GET", "/ping", || async { Response::ok("pong") })
        .route("GET", "/echo/{a}/{b}", |req: Request| async move {
            Response::ok("OK").with_body(req.matches().join(","))
        })
        .route("GET", "/slow", || async {
            tokio::time::sleep(TEST_TIMEOUT * 4).await;
            Response::ok("too late")
        })
        .route("GET", "/stream", |req: Request| async move {
            if !req.proto().is_streaming() {
                return Response::with_status(StatusCode::BAD_REQUEST, "streaming only");
            }
            Response::ok("streaming").on_upgrade(|mut conn: Connection| async move {
                while let Ok(frame) = conn.read_frame().await {
                    if conn.write_frame(frame).await.is_err() {
                        break;
                    }
                }
            })
        })
}

/// Serve a mux on an ephemeral loopback port.
pub async fn serve(mux: Mux) -> ServerShutdown {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
        .serve(mux)
        .await
        .unwrap()
}

/// Fail the test if `fut` does not resolve in time.
pub async fn patiently<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(PATIENCE, fut)
        .await
        .expect("timed out waiting for the server")
}

/// Poll `cond` until it holds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    patiently(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// A client connection to a test server.
pub struct TestClient {
    pub conn: Connection,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            conn: Connection::connect(addr).await.unwrap(),
        }
    }

    /// Connect, send one request, and read its response.
    pub async fn call(addr: SocketAddr, req: &Request) -> Response {
        let mut client = Self::connect(addr).await;
        client.send(req).await;
        client.recv_response().await
    }

    /// Connect and open a streaming session, returning the client and the
    /// handshake response.
    pub async fn stream(
        addr: SocketAddr,
        method: &str,
        url: &str,
        body: &Value,
    ) -> (Self, Response) {
        let req = Request::new(method, url)
            .with_proto(Proto::Streaming)
            .with_body(body.to_string());
        let mut client = Self::connect(addr).await;
        client.send(&req).await;
        let resp = client.recv_response().await;
        (client, resp)
    }

    pub async fn send(&mut self, req: &Request) {
        self.conn.write_request(req).await.unwrap();
    }

    pub async fn send_raw(&mut self, frame: &'static str) {
        self.conn
            .write_frame(Bytes::from_static(frame.as_bytes()))
            .await
            .unwrap();
    }

    pub async fn send_json(&mut self, value: &Value) {
        self.conn
            .write_frame(serde_json::to_vec(value).unwrap().into())
            .await
            .unwrap();
    }

    pub async fn recv_response(&mut self) -> Response {
        patiently(self.conn.read_response()).await.unwrap()
    }

    pub async fn recv_json(&mut self) -> Value {
        let frame = patiently(self.conn.read_frame()).await.unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    /// True if the server closes the connection without sending a frame.
    pub async fn is_closed(&mut self) -> bool {
        matches!(patiently(self.conn.read_frame()).await, Err(err) if err.is_eof())
    }
}
