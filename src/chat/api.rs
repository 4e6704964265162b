use super::{session::ChatSession, ChatState};
use crate::{
    AuthService, Credentials, Message, MessageStore, PublicUser, Request, Response, Token,
    UserStore,
};
use chrono::DateTime;
use http::StatusCode;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::info;

const SUCCESSFUL_SIGN_UP: &str = "successful sign up";
const SUCCESSFUL_SIGN_IN: &str = "successful sign in";

/// Status of an empty history page.
pub const NO_MORE_MESSAGES: &str = "no more messages";
/// Status when chatting is requested without the streaming protocol or
/// without a token.
pub const PROTO_NOT_SUPPORTED: &str = "not supported protocol";
/// Status of the chatting handshake acknowledgement.
pub const READY_FOR_MESSAGES: &str = "ready for messages";
/// Status when a token is rejected on a chat or history call.
pub const TOKEN_EXPIRED: &str = "token expired";

#[derive(Serialize)]
struct AuthData<'a> {
    auth_token: Token,
    user: &'a PublicUser,
}

#[derive(Deserialize)]
struct HistoryQuery {
    auth_token: Token,
    #[serde(deserialize_with = "millis_or_rfc3339")]
    timestamp: i64,
    limit: usize,
}

/// Unix milliseconds, or an RFC 3339 string as sent by browser clients.
fn millis_or_rfc3339<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Millis(i64),
        Text(String),
    }

    match Timestamp::deserialize(deserializer)? {
        Timestamp::Millis(millis) => Ok(millis),
        Timestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|time| time.timestamp_millis())
            .map_err(de::Error::custom),
    }
}

#[derive(Serialize)]
struct History<'a> {
    messages: &'a [Message],
}

fn bad_request(err: impl fmt::Display) -> Response {
    Response::with_status(StatusCode::BAD_REQUEST, err.to_string())
}

fn unauthorized() -> Response {
    Response::with_status(StatusCode::UNAUTHORIZED, TOKEN_EXPIRED)
}

fn json<T: Serialize>(resp: Response, body: &T) -> Result<Response, Response> {
    resp.with_json_body(body)
        .map_err(|err| Response::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

pub(super) async fn sign_up<S: AuthService>(
    state: ChatState<S>,
    req: Request,
) -> Result<Response, Response> {
    let creds: Credentials = req.deserialize_body().map_err(bad_request)?;
    let user = state.store.sign_up(&creds).await?;
    info!(user_id = user.id, login = %user.login, "signed up");
    Ok(Response::ok(SUCCESSFUL_SIGN_UP))
}

pub(super) async fn sign_in<S: AuthService>(
    state: ChatState<S>,
    req: Request,
) -> Result<Response, Response> {
    let creds: Credentials = req.deserialize_body().map_err(bad_request)?;
    let (auth_token, user) = state.store.sign_in(&creds).await?;
    json(
        Response::ok(SUCCESSFUL_SIGN_IN),
        &AuthData {
            auth_token,
            user: &user,
        },
    )
}

pub(super) async fn sign_in_token<S: AuthService + UserStore>(
    state: ChatState<S>,
    req: Request,
) -> Result<Response, Response> {
    let token: Token = req.deserialize_body().map_err(bad_request)?;
    state.store.validate_token(token).await?;
    let user = state.store.user_by_id(token.user_id).await?;
    json(Response::ok(SUCCESSFUL_SIGN_IN), &user)
}

pub(super) async fn messages<S: AuthService + MessageStore>(
    state: ChatState<S>,
    req: Request,
) -> Result<Response, Response> {
    let query: HistoryQuery = req.deserialize_body().map_err(bad_request)?;
    state
        .store
        .validate_token(query.auth_token)
        .await
        .map_err(|_| unauthorized())?;

    let messages = state
        .store
        .messages_before(query.timestamp, query.limit)
        .await?;
    let resp = if messages.is_empty() {
        Response::ok(NO_MORE_MESSAGES)
    } else {
        Response::new(StatusCode::OK)
    };
    json(resp, &History { messages: &messages })
}

pub(super) async fn member<S: UserStore>(
    state: ChatState<S>,
    req: Request,
) -> Result<Response, Response> {
    let id: i64 = req
        .param("id")
        .parse()
        .map_err(|_| bad_request("invalid user id"))?;
    let user = state.store.user_by_id(id).await?;
    json(Response::new(StatusCode::OK), &user)
}

pub(super) async fn members<S: UserStore>(state: ChatState<S>) -> Result<Response, Response> {
    let users = state.store.users().await?;
    json(Response::new(StatusCode::OK), &users)
}

pub(super) async fn chatting<S: AuthService + MessageStore + Clone>(
    state: ChatState<S>,
    req: Request,
) -> Result<Response, Response> {
    let not_supported = || Response::with_status(StatusCode::BAD_REQUEST, PROTO_NOT_SUPPORTED);

    if !req.proto().is_streaming() {
        return Err(not_supported());
    }
    let token: Token = req.deserialize_body().map_err(|_| not_supported())?;
    state
        .store
        .validate_token(token)
        .await
        .map_err(|_| unauthorized())?;

    let session = ChatSession::new(state, token, req.ctx().clone());
    Ok(Response::ok(READY_FOR_MESSAGES).on_upgrade(move |conn| session.run(conn)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{EventBus, MemoryStore, Proto};
    use serde_json::{json, Value};

    fn state() -> ChatState<MemoryStore> {
        ChatState::new(MemoryStore::new(), EventBus::new())
    }

    fn body(value: Value) -> Request {
        Request::new("POST", "/").with_body(value.to_string())
    }

    async fn signed_in(state: &ChatState<MemoryStore>) -> Token {
        let creds = json!({"login": "ann", "password": "pw"});
        sign_up(state.clone(), body(creds.clone())).await.unwrap();
        let resp = sign_in(state.clone(), body(creds)).await.unwrap();
        let data: Value = resp.deserialize_body().unwrap();
        serde_json::from_value(data["auth_token"].clone()).unwrap()
    }

    #[tokio::test]
    async fn account_flow() {
        let state = state();
        let creds = json!({"login": "ann", "password": "pw"});

        let resp = sign_up(state.clone(), body(creds.clone())).await.unwrap();
        assert_eq!(resp.status(), SUCCESSFUL_SIGN_UP);

        let err = sign_up(state.clone(), body(creds.clone())).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.status(), "user login already exists");

        let err = sign_up(state.clone(), body(json!({"login": 1}))).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let resp = sign_in(state.clone(), body(creds)).await.unwrap();
        assert_eq!(resp.status(), SUCCESSFUL_SIGN_IN);
        let data: Value = resp.deserialize_body().unwrap();
        assert_eq!(data["user"]["login"], "ann");
        assert!(data["user"].get("password_hash").is_none());

        let err = sign_in(state.clone(), body(json!({"login": "bob", "password": "pw"})))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let err = sign_in(state, body(json!({"login": "ann", "password": "x"})))
            .await
            .unwrap_err();
        assert_eq!(err.status(), "invalid password");
    }

    #[tokio::test]
    async fn token_sign_in() {
        let state = state();
        let token = signed_in(&state).await;

        let resp = sign_in_token(state.clone(), body(json!(token))).await.unwrap();
        let user: PublicUser = resp.deserialize_body().unwrap();
        assert_eq!(user.id, token.user_id);

        let forged = json!({"id": uuid::Uuid::new_v4(), "user_id": token.user_id});
        let err = sign_in_token(state, body(forged)).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn empty_history() {
        let state = state();
        let token = signed_in(&state).await;

        let query = json!({"auth_token": token, "timestamp": i64::MAX, "limit": 10});
        let resp = messages(state.clone(), body(query)).await.unwrap();
        assert_eq!(resp.status(), NO_MORE_MESSAGES);
        assert_eq!(resp.body(), r#"{"messages":[]}"#);

        let stale = json!({
            "auth_token": {"id": uuid::Uuid::nil(), "user_id": 1},
            "timestamp": 0,
            "limit": 1,
        });
        let err = messages(state, body(stale)).await.unwrap_err();
        assert_eq!(err.status(), TOKEN_EXPIRED);
    }

    #[tokio::test]
    async fn history_accepts_rfc3339() {
        let state = state();
        let token = signed_in(&state).await;
        let message = Message {
            id: uuid::Uuid::nil(),
            sender_id: token.user_id,
            message_kind: crate::MessageKind::UserText,
            message: "hi".into(),
            // 2024-01-01T00:00:00Z
            created_at: 1_704_067_200_000,
            updated_at: 1_704_067_200_000,
        };
        state.store().create_message(message).await.unwrap();

        let query = |timestamp: &str| {
            body(json!({"auth_token": token, "timestamp": timestamp, "limit": 10}))
        };

        let resp = messages(state.clone(), query("2024-01-01T00:00:00.001Z")).await.unwrap();
        let history: Value = resp.deserialize_body().unwrap();
        assert_eq!(history["messages"][0]["message"], "hi");

        // strictly before, and offsets are honored
        let resp = messages(state.clone(), query("2024-01-01T01:00:00+01:00")).await.unwrap();
        assert_eq!(resp.status(), NO_MORE_MESSAGES);

        let err = messages(state, query("yesterday")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn member_lookups() {
        let state = state();
        let token = signed_in(&state).await;

        let lookup = |id: &str| {
            let pattern = crate::Pattern::parse("GET", super::super::MEMBER).unwrap();
            let mut req = Request::new("GET", format!("/api/v1/member/{id}"));
            req.set_route(std::sync::Arc::new(pattern), vec![id.to_owned()]);
            req
        };

        let resp = member(state.clone(), lookup(&token.user_id.to_string())).await.unwrap();
        let user: PublicUser = resp.deserialize_body().unwrap();
        assert_eq!(user.login, "ann");

        let err = member(state.clone(), lookup("2")).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        let err = member(state.clone(), lookup("ann")).await.unwrap_err();
        assert_eq!(err.status(), "invalid user id");

        let resp = members(state).await.unwrap();
        let users: Vec<PublicUser> = resp.deserialize_body().unwrap();
        assert_eq!(users, [user]);
    }

    #[tokio::test]
    async fn chatting_handshake() {
        let state = state();
        let token = signed_in(&state).await;

        let err = chatting(state.clone(), body(json!(token))).await.unwrap_err();
        assert_eq!(err.status(), PROTO_NOT_SUPPORTED);

        let streaming = |v: Value| body(v).with_proto(Proto::Streaming);

        let err = chatting(state.clone(), streaming(json!("nope"))).await.unwrap_err();
        assert_eq!(err.status(), PROTO_NOT_SUPPORTED);

        let forged = json!({"id": uuid::Uuid::new_v4(), "user_id": 1});
        let err = chatting(state.clone(), streaming(forged)).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.status(), TOKEN_EXPIRED);

        let resp = chatting(state.clone(), streaming(json!(token))).await.unwrap();
        assert_eq!(resp.status(), READY_FOR_MESSAGES);
        assert!(resp.has_upgrade());
        // subscribing happens in the session, after the ack is written
        assert_eq!(state.bus().subscriber_count(crate::EventKind::NewMessage), 0);
    }
}
