//! Events fanned out by the [`EventBus`].
//!
//! Clients send and receive events as a [`PublicEvent`] envelope,
//! `{"type": .., "payload": ..}`. Inbound envelopes are converted into a
//! typed [`Event`] by dispatching on `type`. Only known types are accepted.
//!
//! [`EventBus`]: crate::EventBus

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

/// Wire tag of [`EventKind::NewMessage`].
pub const NEW_MESSAGE_EVENT: &str = "NewMessageEvent";

/// Errors converting between wire envelopes and [`Event`]s.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The envelope's `type` is not a known event type.
    #[error("unknown event type: {0}")]
    UnknownType(String),
    /// The envelope or payload does not have the expected shape.
    #[error("invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The known event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A chat message was created.
    NewMessage,
}

impl EventKind {
    /// The wire tag.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NewMessage => NEW_MESSAGE_EVENT,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            NEW_MESSAGE_EVENT => Ok(Self::NewMessage),
            other => Err(EventError::UnknownType(other.to_owned())),
        }
    }
}

/// Kinds of chat message. Serialized as its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageKind {
    /// A conversation was created.
    CreateConversation = 0,
    /// A user was added to a conversation.
    AddingUser = 1,
    /// Text written by a user.
    UserText = 2,
}

impl TryFrom<u8> for MessageKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::CreateConversation),
            1 => Ok(Self::AddingUser),
            2 => Ok(Self::UserText),
            other => Err(format!("invalid message kind {other}")),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        kind as u8
    }
}

/// Payload of a [`EventKind::NewMessage`] event.
///
/// Inbound, `id` and the timestamps are ignored. They are assigned when the
/// message is persisted, and the published event carries the stored values.
/// Timestamps are milliseconds since the unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Id assigned by the message store.
    #[serde(default)]
    pub id: String,
    /// Id of the sending user.
    pub sender_id: i64,
    /// The kind of message.
    pub message_kind: MessageKind,
    /// The message text.
    pub message: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: i64,
    /// Last update time.
    #[serde(default)]
    pub updated_at: i64,
}

/// The payload of an [`Event`], one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// See [`NewMessage`].
    NewMessage(NewMessage),
}

impl EventPayload {
    /// The kind of this payload.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::NewMessage(_) => EventKind::NewMessage,
        }
    }

    fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Self::NewMessage(msg) => serde_json::to_value(msg),
        }
    }
}

/// An event as published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Unique id of the event.
    pub id: Uuid,
    /// When the event was created.
    pub timestamp: SystemTime,
    /// The typed payload.
    pub payload: EventPayload,
}

impl Event {
    /// Create an event with a fresh id and the current time.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: SystemTime::now(),
            payload,
        }
    }

    /// The kind of the event, used to select subscribers.
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Project the event back to its wire envelope.
    pub fn to_public(&self) -> serde_json::Result<PublicEvent> {
        Ok(PublicEvent {
            kind: self.kind().as_str().to_owned(),
            payload: self.payload.to_value()?,
        })
    }

    /// Serialize the wire envelope into a frame.
    pub fn to_frame(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(&self.to_public()?).map(Into::into)
    }
}

impl TryFrom<PublicEvent> for Event {
    type Error = EventError;

    fn try_from(public: PublicEvent) -> Result<Self, Self::Error> {
        let payload = match public.kind.parse()? {
            EventKind::NewMessage => {
                EventPayload::NewMessage(serde_json::from_value(public.payload)?)
            }
        };
        Ok(Self::new(payload))
    }
}

/// The wire envelope of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicEvent {
    /// Event type tag, e.g. `NewMessageEvent`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl PublicEvent {
    /// Decode an envelope from a frame.
    pub fn decode(frame: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(frame).map_err(Into::into)
    }
}

/// Milliseconds since the unix epoch. Times before the epoch map to 0.
pub(crate) fn unix_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_message_from_envelope() {
        let public = PublicEvent::decode(
            json!({
                "type": "NewMessageEvent",
                "payload": {
                    "id": "client-chosen",
                    "sender_id": 4,
                    "message_kind": 2,
                    "message": "hi",
                }
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        let event = Event::try_from(public).unwrap();
        assert_eq!(event.kind(), EventKind::NewMessage);
        let EventPayload::NewMessage(msg) = &event.payload;
        assert_eq!(msg.sender_id, 4);
        assert_eq!(msg.message_kind, MessageKind::UserText);
        assert_eq!(msg.message, "hi");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let public = PublicEvent {
            kind: "DeleteEverythingEvent".into(),
            payload: json!({}),
        };
        assert!(matches!(
            Event::try_from(public),
            Err(EventError::UnknownType(t)) if t == "DeleteEverythingEvent"
        ));
    }

    #[test]
    fn bad_payload_is_rejected() {
        let public = PublicEvent {
            kind: NEW_MESSAGE_EVENT.into(),
            payload: json!({"sender_id": 1, "message_kind": 9, "message": "x"}),
        };
        assert!(matches!(Event::try_from(public), Err(EventError::Payload(_))));

        assert!(PublicEvent::decode(b"{\"payload\":{}}").is_err());
    }

    #[test]
    fn public_projection() {
        let event = Event::new(EventPayload::NewMessage(NewMessage {
            id: "abc".into(),
            sender_id: 1,
            message_kind: MessageKind::CreateConversation,
            message: "made".into(),
            created_at: 10,
            updated_at: 11,
        }));

        let wire: Value = serde_json::from_slice(&event.to_frame().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "NewMessageEvent",
                "payload": {
                    "id": "abc",
                    "sender_id": 1,
                    "message_kind": 0,
                    "message": "made",
                    "created_at": 10,
                    "updated_at": 11,
                }
            })
        );
    }

    #[test]
    fn event_kind_parses() {
        assert_eq!("NewMessageEvent".parse::<EventKind>().unwrap(), EventKind::NewMessage);
        assert_eq!(EventKind::NewMessage.to_string(), NEW_MESSAGE_EVENT);
        assert!("NewMessage".parse::<EventKind>().is_err());
    }
}
