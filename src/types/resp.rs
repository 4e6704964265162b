use crate::Connection;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::StatusCode;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Header carrying the byte length of the body. Always computed at
/// serialization time.
pub(crate) const CONTENT_LENGTH: &str = "Content-Length";

/// A hook that takes over a connection after the response has been written.
///
/// Only honored for [`Proto::Streaming`] requests.
///
/// [`Proto::Streaming`]: crate::Proto::Streaming
pub type OnUpgrade = Box<dyn FnOnce(Connection) -> BoxFuture<'static, ()> + Send + Sync>;

/// A response to a single request.
///
/// For request/response calls, the response returned by the handler is
/// written exactly once. For streaming calls, a handler may attach an
/// [`OnUpgrade`] hook with [`Response::on_upgrade`]. The response is then
/// written as the session acknowledgement and the hook receives the
/// connection.
pub struct Response {
    status_code: u16,
    status: String,
    header: Map<String, Value>,
    body: String,
    upgrade: Option<OnUpgrade>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status_code", &self.status_code)
            .field("status", &self.status)
            .field("header", &self.header)
            .field("body", &self.body)
            .field("upgrade", &self.upgrade.is_some())
            .finish()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    status: String,
    status_code: u16,
    #[serde(default)]
    header: Map<String, Value>,
    #[serde(default)]
    body: String,
}

impl Response {
    /// A response with `code` and its canonical reason as the status.
    pub fn new(code: StatusCode) -> Self {
        Self::with_status(code, code.canonical_reason().unwrap_or_default())
    }

    /// A response with `code` and a custom status message.
    pub fn with_status(code: StatusCode, status: impl Into<String>) -> Self {
        Self {
            status_code: code.as_u16(),
            status: status.into(),
            header: Map::new(),
            body: String::new(),
            upgrade: None,
        }
    }

    /// A `200` response with a custom status message.
    pub fn ok(status: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, status)
    }

    /// Decode a response frame.
    pub fn decode(frame: &[u8]) -> serde_json::Result<Self> {
        let wire: WireResponse = serde_json::from_slice(frame)?;
        Ok(Self {
            status_code: wire.status_code,
            status: wire.status,
            header: wire.header,
            body: wire.body,
            upgrade: None,
        })
    }

    /// Serialize the response into a frame.
    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Into::into)
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the body to the JSON serialization of `body`.
    pub fn with_json_body<T: Serialize + ?Sized>(self, body: &T) -> serde_json::Result<Self> {
        Ok(self.with_body(serde_json::to_string(body)?))
    }

    /// Set a header value. A `Content-Length` set here is ignored on the
    /// wire.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    /// Attach an upgrade hook.
    pub fn on_upgrade<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.upgrade = Some(Box::new(move |conn| Box::pin(f(conn))));
        self
    }

    /// Remove the upgrade hook, if any.
    pub fn take_upgrade(&mut self) -> Option<OnUpgrade> {
        self.upgrade.take()
    }

    /// True if an upgrade hook is attached.
    pub const fn has_upgrade(&self) -> bool {
        self.upgrade.is_some()
    }

    /// Replace the status code and message.
    pub fn set_status(&mut self, code: StatusCode, status: impl Into<String>) {
        self.status_code = code.as_u16();
        self.status = status.into();
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// The numeric status code.
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// The status message.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// True for `2xx` codes.
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }

    /// The headers. `Content-Length` is only present here on decoded
    /// responses.
    pub const fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// Mutable access to the headers.
    pub fn header_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.header
    }

    /// The body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Deserialize the body as JSON.
    pub fn deserialize_body<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }

    /// The byte length of the body, as written to `Content-Length`.
    pub fn content_length(&self) -> usize {
        self.body.len()
    }
}

/// Writes the caller's headers with `Content-Length` replaced by the actual
/// body length.
struct HeaderWithLength<'a> {
    header: &'a Map<String, Value>,
    len: usize,
}

impl Serialize for HeaderWithLength<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        for (k, v) in self.header.iter().filter(|(k, _)| *k != CONTENT_LENGTH) {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry(CONTENT_LENGTH, &self.len)?;
        map.end()
    }
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("status", &self.status)?;
        map.serialize_entry("status_code", &self.status_code)?;
        map.serialize_entry(
            "header",
            &HeaderWithLength {
                header: &self.header,
                len: self.content_length(),
            },
        )?;
        map.serialize_entry("body", &self.body)?;
        map.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_length_is_derived() {
        let resp = Response::ok("fine")
            .with_header(CONTENT_LENGTH, 9000)
            .with_header("x-trace", "abc")
            .with_body("héllo");

        let wire: Value = serde_json::from_slice(&resp.to_bytes().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({
                "status": "fine",
                "status_code": 200,
                "header": {"x-trace": "abc", "Content-Length": 6},
                "body": "héllo",
            })
        );
    }

    #[test]
    fn encode_then_decode() {
        let resp = Response::with_status(StatusCode::UNAUTHORIZED, "token expired")
            .with_body("{\"reason\":\"old\"}");
        let back = Response::decode(&resp.to_bytes().unwrap()).unwrap();

        assert_eq!(back.status(), "token expired");
        assert_eq!(back.status_code(), 401);
        assert_eq!(back.body(), resp.body());
        assert_eq!(back.header()[CONTENT_LENGTH], json!(resp.body().len()));
        assert!(!back.is_success());
    }

    #[test]
    fn empty_body_has_zero_length() {
        let wire: Value = serde_json::from_slice(&Response::default().to_bytes().unwrap()).unwrap();
        assert_eq!(wire["status"], "OK");
        assert_eq!(wire["header"][CONTENT_LENGTH], 0);
    }

    #[test]
    fn upgrade_hook_is_taken_once() {
        let mut resp = Response::ok("ready").on_upgrade(|_conn| async {});
        assert!(resp.has_upgrade());
        assert!(resp.take_upgrade().is_some());
        assert!(resp.take_upgrade().is_none());
        assert!(format!("{resp:?}").contains("upgrade: false"));
    }
}
