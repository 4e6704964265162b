//! Collaborators of the chat routes: authentication, users and messages.
//!
//! The routes depend only on the [`AuthService`], [`UserStore`] and
//! [`MessageStore`] traits. [`MemoryStore`] implements all three in process
//! and is what the binary and the tests run against.

use crate::{MessageKind, Response};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use http::StatusCode;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    future::{ready, Future},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::time::Instant;
use uuid::Uuid;

/// How long a token stays valid after sign in.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Errors returned by the collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A user with this login exists.
    #[error("user login already exists")]
    AlreadyExists,
    /// The password does not match.
    #[error("invalid password")]
    InvalidPassword,
    /// The token is unknown, expired, or belongs to another user.
    #[error("invalid token")]
    InvalidToken,
    /// Any other failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for Response {
    fn from(err: StoreError) -> Self {
        let code = match err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::AlreadyExists | StoreError::InvalidPassword => StatusCode::BAD_REQUEST,
            StoreError::InvalidToken => StatusCode::UNAUTHORIZED,
            StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Response::with_status(code, err.to_string())
    }
}

/// Login and password, as sent to sign up and sign in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Unique login.
    pub login: String,
    /// Plain text password.
    pub password: String,
}

/// The user fields safe to send to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    /// Numeric user id.
    pub id: i64,
    /// Unique login.
    pub login: String,
    /// Display name, initially the login.
    pub name: String,
    /// Display color, `#rrggbb`.
    pub color: String,
}

/// An authorization token issued by [`AuthService::sign_in`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Token id.
    pub id: Uuid,
    /// The user the token was issued to.
    pub user_id: i64,
}

/// A persisted chat message. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Id assigned on creation.
    pub id: Uuid,
    /// Sending user.
    pub sender_id: i64,
    /// The kind of message.
    pub message_kind: MessageKind,
    /// The message text.
    pub message: String,
    /// Creation time.
    pub created_at: i64,
    /// Last update time.
    pub updated_at: i64,
}

/// Account creation and token issue.
pub trait AuthService: Send + Sync + 'static {
    /// Create a user. Fails with [`StoreError::AlreadyExists`] if the login
    /// is taken.
    fn sign_up(
        &self,
        creds: &Credentials,
    ) -> impl Future<Output = Result<PublicUser, StoreError>> + Send;

    /// Check the password and issue a fresh token.
    fn sign_in(
        &self,
        creds: &Credentials,
    ) -> impl Future<Output = Result<(Token, PublicUser), StoreError>> + Send;

    /// Check that the token was issued, has not expired, and matches its
    /// user. A token that exists but does not match is revoked.
    fn validate_token(&self, token: Token) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// User lookups.
pub trait UserStore: Send + Sync + 'static {
    /// Find a user by id.
    fn user_by_id(&self, id: i64) -> impl Future<Output = Result<PublicUser, StoreError>> + Send;

    /// Every user, in id order.
    fn users(&self) -> impl Future<Output = Result<Vec<PublicUser>, StoreError>> + Send;
}

/// Message persistence.
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a message, returning its assigned id. The id in `message` is
    /// ignored.
    fn create_message(
        &self,
        message: Message,
    ) -> impl Future<Output = Result<Uuid, StoreError>> + Send;

    /// At most `limit` messages created strictly before `before`, newest
    /// first.
    fn messages_before(
        &self,
        before: i64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;
}

#[derive(Debug)]
struct StoredUser {
    public: PublicUser,
    /// PHC string, salt included.
    password_hash: String,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<StoredUser>,
    logins: HashMap<String, i64>,
    tokens: HashMap<Uuid, (Token, Instant)>,
    messages: Vec<Message>,
}

impl Tables {
    fn user(&self, id: i64) -> Option<&StoredUser> {
        let idx = usize::try_from(id).ok()?.checked_sub(1)?;
        self.users.get(idx)
    }

    fn user_by_login(&self, login: &str) -> Option<&StoredUser> {
        self.logins.get(login).and_then(|id| self.user(*id))
    }

    fn drop_expired_tokens(&mut self, now: Instant) {
        self.tokens.retain(|_, (_, expires)| *expires > now);
    }
}

/// In-memory implementation of every collaborator. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    token_ttl: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with the default token lifetime.
    pub fn new() -> Self {
        Self::with_token_ttl(DEFAULT_TOKEN_TTL)
    }

    /// Create an empty store whose tokens expire after `token_ttl`.
    pub fn with_token_ttl(token_ttl: Duration) -> Self {
        Self {
            tables: Default::default(),
            token_ttl,
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_user(&self, creds: &Credentials) -> Result<PublicUser, StoreError> {
        if self.tables().logins.contains_key(&creds.login) {
            return Err(StoreError::AlreadyExists);
        }
        // hashing is slow, keep it outside the lock
        let password_hash = hash_password(&creds.password)?;

        let mut tables = self.tables();
        if tables.logins.contains_key(&creds.login) {
            return Err(StoreError::AlreadyExists);
        }
        let id = i64::try_from(tables.users.len() + 1)
            .map_err(|_| StoreError::Internal("user ids exhausted".into()))?;
        let public = PublicUser {
            id,
            login: creds.login.clone(),
            name: creds.login.clone(),
            color: random_color(),
        };

        tables.logins.insert(creds.login.clone(), id);
        tables.users.push(StoredUser {
            public: public.clone(),
            password_hash,
        });
        Ok(public)
    }

    fn issue_token(&self, creds: &Credentials) -> Result<(Token, PublicUser), StoreError> {
        let (public, password_hash) = self
            .tables()
            .user_by_login(&creds.login)
            .map(|user| (user.public.clone(), user.password_hash.clone()))
            .ok_or(StoreError::NotFound("user"))?;

        verify_password(&password_hash, &creds.password)?;

        let token = Token {
            id: Uuid::new_v4(),
            user_id: public.id,
        };
        let now = Instant::now();
        let mut tables = self.tables();
        tables.drop_expired_tokens(now);
        tables.tokens.insert(token.id, (token, now + self.token_ttl));
        Ok((token, public))
    }

    /// Number of live and not yet swept tokens.
    #[cfg(test)]
    fn token_count(&self) -> usize {
        self.tables().tokens.len()
    }

    fn check_token(&self, token: Token) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let Some((issued, expires)) = tables.tokens.get(&token.id).copied() else {
            return Err(StoreError::InvalidToken);
        };

        if expires <= Instant::now() || issued != token {
            tables.tokens.remove(&token.id);
            return Err(StoreError::InvalidToken);
        }
        Ok(())
    }

    fn find_user(&self, id: i64) -> Result<PublicUser, StoreError> {
        self.tables()
            .user(id)
            .map(|user| user.public.clone())
            .ok_or(StoreError::NotFound("user"))
    }

    fn all_users(&self) -> Vec<PublicUser> {
        self.tables()
            .users
            .iter()
            .map(|user| user.public.clone())
            .collect()
    }

    fn insert_message(&self, mut message: Message) -> Uuid {
        message.id = Uuid::new_v4();
        let id = message.id;
        self.tables().messages.push(message);
        id
    }

    fn select_messages(&self, before: i64, limit: usize) -> Vec<Message> {
        let tables = self.tables();
        let mut found: Vec<_> = tables
            .messages
            .iter()
            // later insertions first among equal timestamps
            .rev()
            .filter(|m| m.created_at < before)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        found
    }
}

impl AuthService for MemoryStore {
    fn sign_up(
        &self,
        creds: &Credentials,
    ) -> impl Future<Output = Result<PublicUser, StoreError>> + Send {
        ready(self.create_user(creds))
    }

    fn sign_in(
        &self,
        creds: &Credentials,
    ) -> impl Future<Output = Result<(Token, PublicUser), StoreError>> + Send {
        ready(self.issue_token(creds))
    }

    fn validate_token(
        &self,
        token: Token,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        ready(self.check_token(token))
    }
}

impl UserStore for MemoryStore {
    fn user_by_id(&self, id: i64) -> impl Future<Output = Result<PublicUser, StoreError>> + Send {
        ready(self.find_user(id))
    }

    fn users(&self) -> impl Future<Output = Result<Vec<PublicUser>, StoreError>> + Send {
        ready(Ok(self.all_users()))
    }
}

impl MessageStore for MemoryStore {
    fn create_message(
        &self,
        message: Message,
    ) -> impl Future<Output = Result<Uuid, StoreError>> + Send {
        ready(Ok(self.insert_message(message)))
    }

    fn messages_before(
        &self,
        before: i64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send {
        ready(Ok(self.select_messages(before, limit)))
    }
}

fn internal(err: argon2::password_hash::Error) -> StoreError {
    StoreError::Internal(err.to_string())
}

fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt_bytes: [u8; 16] = rand::thread_rng().gen();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(internal)?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(internal)?;
    Ok(hash.to_string())
}

fn verify_password(password_hash: &str, password: &str) -> Result<(), StoreError> {
    let parsed = PasswordHash::new(password_hash).map_err(internal)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(()),
        Err(argon2::password_hash::Error::Password) => Err(StoreError::InvalidPassword),
        Err(err) => Err(internal(err)),
    }
}

fn random_color() -> String {
    let [r, g, b]: [u8; 3] = rand::thread_rng().gen();
    format!("#{r:02x}{g:02x}{b:02x}")
}
