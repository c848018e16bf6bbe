//! Typed client for the data API.
//!
//! Wraps an [`HttpTransport`] and classifies every outcome into one of:
//!
//! - success (with a parsed body where one is expected),
//! - a negative signal (`Ok(false)` / `Ok(None)`) for the detection queries
//!   where a non-2xx status simply means "not there yet",
//! - a [`BackendError`] for everything that was expected to succeed.
//!
//! Calls are single-shot. Retrying is the polling engine's business.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::protocol::{
    CreationStamp, GameId, GameList, GameRecord, InviteList, Resource, find_game_for,
};
use crate::transport::{HttpTransport, Method, RawResponse, TransportError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The operation a request was part of, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CheckUser,
    CreateUser,
    CheckInvite,
    CreateInvite,
    DeleteInvite,
    ListInvites,
    ListGames,
    CreateGame,
    ListApps,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CheckUser => "check user",
            Self::CreateUser => "create user",
            Self::CheckInvite => "check invite",
            Self::CreateInvite => "create invite",
            Self::DeleteInvite => "delete invite",
            Self::ListInvites => "list invites",
            Self::ListGames => "list games",
            Self::CreateGame => "create game",
            Self::ListApps => "list apps",
        })
    }
}

/// Failures of calls that were expected to succeed.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The server answered with a non-2xx status.
    #[error("{op} failed: {path} returned HTTP {status}")]
    Request {
        op: Operation,
        path: String,
        status: u16,
    },

    /// The server answered 2xx but the body was not the JSON we expected.
    #[error("{op}: malformed response from {path}: {source}")]
    Malformed {
        op: Operation,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// No response at all.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The request body could not be serialized.
    #[error("{op}: could not encode request body: {source}")]
    Encode {
        op: Operation,
        #[source]
        source: serde_json::Error,
    },
}

impl BackendError {
    /// The HTTP status, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Parse a successful response body.
pub fn parse_body<T: DeserializeOwned>(
    op: Operation,
    path: &str,
    response: &RawResponse,
) -> Result<T, BackendError> {
    serde_json::from_str(&response.body).map_err(|source| BackendError::Malformed {
        op,
        path: path.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// BackendClient
// ---------------------------------------------------------------------------

/// Typed wrapper over the user, invite and game resources.
pub struct BackendClient<T> {
    transport: T,
}

impl<T: HttpTransport> BackendClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -- users -------------------------------------------------------------

    /// `GET user/{name}`: a 2xx means the user exists.
    pub async fn user_exists(&self, name: &str) -> Result<bool, BackendError> {
        self.exists(Operation::CheckUser, Resource::User(name)).await
    }

    /// `POST user/{name}` with a creation timestamp.
    pub async fn create_user(&self, name: &str) -> Result<(), BackendError> {
        self.post(Operation::CreateUser, Resource::User(name), &CreationStamp::now()).await
    }

    // -- invites -----------------------------------------------------------

    /// `GET game-invites/{name}`: a 2xx means `name` has an open invite.
    pub async fn invite_exists(&self, name: &str) -> Result<bool, BackendError> {
        self.exists(Operation::CheckInvite, Resource::Invite(name)).await
    }

    /// `POST game-invites/{name}` with a creation timestamp.
    pub async fn create_invite(&self, name: &str) -> Result<(), BackendError> {
        self.post(
            Operation::CreateInvite,
            Resource::Invite(name),
            &CreationStamp::now(),
        )
        .await
    }

    /// `DELETE game-invites/{name}`.
    pub async fn delete_invite(&self, name: &str) -> Result<(), BackendError> {
        let path = Resource::Invite(name).path();
        let response = self.transport.request(Method::Delete, &path, None).await?;
        expect_success(Operation::DeleteInvite, &path, &response)
    }

    /// `GET game-invites/`: every open invite keyed by inviter.
    pub async fn list_invites(&self) -> Result<InviteList, BackendError> {
        self.get_json(Operation::ListInvites, Resource::Invites).await
    }

    // -- games -------------------------------------------------------------

    /// `GET game/`: every game keyed by id.
    pub async fn list_games(&self) -> Result<GameList, BackendError> {
        self.get_json(Operation::ListGames, Resource::Games).await
    }

    /// `POST game/{opponent}` with the full game record.
    pub async fn create_game(
        &self,
        opponent: &str,
        game: &GameRecord,
    ) -> Result<(), BackendError> {
        self.post(Operation::CreateGame, Resource::Game(opponent), game).await
    }

    /// The id of a game `user` plays in, if any.
    ///
    /// A non-2xx listing (no games directory yet, for instance) counts as
    /// "no game" and is only logged.
    pub async fn active_game_for(&self, user: &str) -> Result<Option<GameId>, BackendError> {
        match self.list_games().await {
            Ok(games) => Ok(find_game_for(&games, user).cloned()),
            Err(BackendError::Request { status, .. }) => {
                tracing::debug!(status, "Game listing unavailable; treating as no game");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // -- private -----------------------------------------------------------

    async fn exists(&self, op: Operation, resource: Resource<'_>) -> Result<bool, BackendError> {
        let path = resource.path();
        let response = self.transport.request(Method::Get, &path, None).await?;
        if !response.is_success() {
            tracing::debug!(%op, path = %path, status = response.status, "Not found");
        }
        Ok(response.is_success())
    }

    async fn post<B: Serialize>(
        &self,
        op: Operation,
        resource: Resource<'_>,
        body: &B,
    ) -> Result<(), BackendError> {
        let path = resource.path();
        let body =
            serde_json::to_value(body).map_err(|source| BackendError::Encode { op, source })?;
        let response = self.transport.request(Method::Post, &path, Some(&body)).await?;
        expect_success(op, &path, &response)
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        op: Operation,
        resource: Resource<'_>,
    ) -> Result<R, BackendError> {
        let path = resource.path();
        let response = self.transport.request(Method::Get, &path, None).await?;
        expect_success(op, &path, &response)?;
        parse_body(op, &path, &response)
    }
}

fn expect_success(op: Operation, path: &str, response: &RawResponse) -> Result<(), BackendError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(BackendError::Request {
            op,
            path: path.to_string(),
            status: response.status,
        })
    }
}
