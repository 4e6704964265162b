use crate::{router::Pattern, types::RequestError, HandlerCtx};
use bytes::Bytes;
use serde::{de::DeserializeOwned, ser::SerializeMap, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{borrow::Cow, collections::HashMap, sync::Arc};

/// How a request uses its connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Proto {
    /// One request, one response, then the connection closes. Any wire value
    /// other than `"ws"` selects this.
    #[default]
    RequestResponse,
    /// The connection is upgraded into a long-lived session. Wire value
    /// `"ws"`.
    Streaming,
}

impl Proto {
    /// The wire value of the protocol.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequestResponse => "http",
            Self::Streaming => "ws",
        }
    }

    /// Parse a wire value. Unknown values fall back to request/response.
    pub fn from_wire(s: &str) -> Self {
        if s == "ws" {
            Self::Streaming
        } else {
            Self::RequestResponse
        }
    }

    /// True for [`Proto::Streaming`].
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

impl std::fmt::Display for Proto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Proto {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Proto {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Cow::<'de, str>::deserialize(deserializer)?;
        Ok(Self::from_wire(&s))
    }
}

/// The shape of a request frame on the wire.
#[derive(Deserialize)]
struct WireRequest {
    method: String,
    url: String,
    #[serde(default)]
    proto: Option<Proto>,
    #[serde(default)]
    header: Option<Map<String, Value>>,
    #[serde(default)]
    body: Option<String>,
}

/// A decoded request frame.
///
/// The routing fields ([`Request::pattern`] and [`Request::matches`]) are
/// filled in by the [`Mux`] once the request has been matched, and are empty
/// before that.
///
/// [`Mux`]: crate::Mux
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    url: String,
    proto: Proto,
    header: Map<String, Value>,
    body: String,

    ctx: HandlerCtx,

    pattern: Option<Arc<Pattern>>,
    matches: Vec<String>,
}

impl Request {
    /// Create a request/response request with no headers and an empty body.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            proto: Proto::default(),
            header: Map::new(),
            body: String::new(),
            ctx: HandlerCtx::default(),
            pattern: None,
            matches: Vec::new(),
        }
    }

    /// Decode a request from a frame.
    pub fn decode(frame: &[u8]) -> Result<Self, RequestError> {
        let wire: WireRequest = serde_json::from_slice(frame)?;
        if wire.method.is_empty() {
            return Err(RequestError::EmptyMethod);
        }

        let mut req = Self::new(wire.method, wire.url);
        req.proto = wire.proto.unwrap_or_default();
        req.header = wire.header.unwrap_or_default();
        req.body = wire.body.unwrap_or_default();
        Ok(req)
    }

    /// Serialize the request into a frame.
    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Into::into)
    }

    /// Set the protocol.
    pub fn with_proto(mut self, proto: Proto) -> Self {
        self.proto = proto;
        self
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

    /// Set a header value.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    /// Replace the request context.
    pub fn with_ctx(mut self, ctx: HandlerCtx) -> Self {
        self.ctx = ctx;
        self
    }

    /// Record the routing result.
    pub(crate) fn set_route(&mut self, pattern: Arc<Pattern>, matches: Vec<String>) {
        self.pattern = Some(pattern);
        self.matches = matches;
    }

    /// The request method, e.g. `GET`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request url.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request protocol.
    pub const fn proto(&self) -> Proto {
        self.proto
    }

    /// The request headers.
    pub const fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// The request body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Deserialize the body as JSON.
    pub fn deserialize_body<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }

    /// The request context.
    pub const fn ctx(&self) -> &HandlerCtx {
        &self.ctx
    }

    /// Mutable access to the request context, used by middleware.
    pub fn ctx_mut(&mut self) -> &mut HandlerCtx {
        &mut self.ctx
    }

    /// The pattern this request was routed by, if any.
    pub fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_deref()
    }

    /// Values captured by wildcard segments, in the order they appear in the
    /// url.
    pub fn matches(&self) -> &[String] {
        &self.matches
    }

    fn named_matches(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pattern
            .iter()
            .flat_map(|p| p.wildcards())
            .zip(self.matches.iter().map(String::as_str))
    }

    /// Get the value captured by the wildcard `name`. Returns an empty string
    /// if the pattern has no such wildcard.
    pub fn param(&self, name: &str) -> &str {
        self.named_matches()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .unwrap_or_default()
    }

    /// All captured wildcard values, keyed by wildcard name.
    pub fn params(&self) -> HashMap<String, String> {
        self.named_matches()
            .map(|(n, v)| (n.to_owned(), v.to_owned()))
            .collect()
    }
}

impl Serialize for Request {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("method", &self.method)?;
        map.serialize_entry("url", &self.url)?;
        map.serialize_entry("proto", &self.proto)?;
        map.serialize_entry("header", &self.header)?;
        map.serialize_entry("body", &self.body)?;
        map.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_full_frame() {
        let frame = json!({
            "method": "GET",
            "url": "/api/v1/chatting",
            "proto": "ws",
            "header": {"session": 3},
            "body": "{\"id\":\"x\"}",
        })
        .to_string();

        let req = Request::decode(frame.as_bytes()).unwrap();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.url(), "/api/v1/chatting");
        assert_eq!(req.proto(), Proto::Streaming);
        assert_eq!(req.header()["session"], json!(3));
        assert_eq!(req.body(), "{\"id\":\"x\"}");
        assert!(req.pattern().is_none());
    }

    #[test]
    fn decode_defaults() {
        let req = Request::decode(br#"{"method":"POST","url":"/a","proto":"tcp"}"#).unwrap();
        assert_eq!(req.proto(), Proto::RequestResponse);
        assert!(req.header().is_empty());
        assert_eq!(req.body(), "");

        let req = Request::decode(br#"{"method":"POST","url":"/a","header":null}"#).unwrap();
        assert!(req.header().is_empty());
    }

    #[test]
    fn decode_errors() {
        assert!(matches!(
            Request::decode(b"not json"),
            Err(RequestError::InvalidJson(_))
        ));
        assert!(matches!(
            Request::decode(br#"{"url":"/a"}"#),
            Err(RequestError::InvalidJson(_))
        ));
        assert!(matches!(
            Request::decode(br#"{"method":"","url":"/a"}"#),
            Err(RequestError::EmptyMethod)
        ));
    }

    #[test]
    fn params_follow_wildcards() {
        let pattern = Arc::new(Pattern::parse("POST", "/{a}/{b}/article/").unwrap());
        let mut req = Request::new("POST", "/hi/123/article");
        req.set_route(pattern, vec!["hi".into(), "123".into()]);

        assert_eq!(req.param("a"), "hi");
        assert_eq!(req.param("b"), "123");
        assert_eq!(req.param("article"), "");
        assert_eq!(req.param("missing"), "");

        let params = req.params();
        assert_eq!(params.len(), 2);
        assert_eq!(params["a"], "hi");
        assert_eq!(params["b"], "123");
    }

    #[test]
    fn unrouted_params_are_empty() {
        let req = Request::new("GET", "/x");
        assert_eq!(req.param("id"), "");
        assert!(req.params().is_empty());
    }

    #[test]
    fn serialized_request_decodes() {
        let req = Request::new("GET", "/api/v1/user/5")
            .with_proto(Proto::Streaming)
            .with_header("k", "v")
            .with_body("hello");
        let back = Request::decode(&req.to_bytes().unwrap()).unwrap();
        assert_eq!(back.method(), "GET");
        assert_eq!(back.url(), "/api/v1/user/5");
        assert_eq!(back.proto(), Proto::Streaming);
        assert_eq!(back.header()["k"], json!("v"));
        assert_eq!(back.body(), "hello");
    }
}
