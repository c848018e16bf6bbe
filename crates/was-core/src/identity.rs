//! Session identity persistence and verification.
//!
//! The current user's name is remembered in a query-parameter store so that a
//! reload (or a shared link) resumes the same session. These helpers live
//! outside the state machine because they operate purely on a [`ParamStore`]
//! and a [`BackendClient`].

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::backend::{BackendClient, BackendError};
use crate::page::IdentityAction;
use crate::protocol::validate_username;
use crate::transport::HttpTransport;

/// Query parameter holding the logged-in user.
pub const USER_PARAM: &str = "user";

/// Query parameter holding the opponent while a join is in progress.
pub const OPPONENT_PARAM: &str = "opponent";

// ---------------------------------------------------------------------------
// Parameter store trait
// ---------------------------------------------------------------------------

/// Abstraction over the query-parameter store so identity handling stays
/// platform-agnostic.
///
/// Implementations live in the platform crate (a `Url` query string on
/// native, the location bar on web). Writes must be visible to the next read.
pub trait ParamStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// In-process [`ParamStore`].
#[derive(Debug, Default)]
pub struct MemoryParams {
    params: RefCell<BTreeMap<String, String>>,
}

impl MemoryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seed, e.g. `MemoryParams::new().with("user", "alice")`.
    pub fn with(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }
}

impl ParamStore for MemoryParams {
    fn get(&self, key: &str) -> Option<String> {
        self.params.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.params
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }
}

// ---------------------------------------------------------------------------
// Identity helpers
// ---------------------------------------------------------------------------

/// The persisted user name, if any. An empty parameter counts as absent.
pub fn get_identity<S: ParamStore + ?Sized>(store: &S) -> Option<String> {
    store.get(USER_PARAM).filter(|name| !name.is_empty())
}

/// Persist `name` as the current user.
pub fn set_identity<S: ParamStore + ?Sized>(store: &S, name: &str) {
    store.set(USER_PARAM, name);
}

/// Result of looking at the persisted identity on startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No user parameter: go to manual entry.
    Absent,
    /// A name was persisted but could not be verified: manual entry,
    /// pre-filled with it.
    Unverified(String),
    /// The persisted user exists server-side: skip the name page.
    Verified(String),
}

/// Read the persisted user and verify it exists server-side.
///
/// Any verification failure (unknown user, invalid name, no connection) falls
/// back to [`Resolution::Unverified`].
pub async fn resolve_identity<T, S>(store: &S, backend: &BackendClient<T>) -> Resolution
where
    T: HttpTransport,
    S: ParamStore + ?Sized,
{
    let Some(name) = get_identity(store) else {
        return Resolution::Absent;
    };
    if let Err(reason) = validate_username(&name) {
        tracing::warn!(user = %name, reason = %reason, "Persisted user name is invalid");
        return Resolution::Unverified(name);
    }
    match backend.user_exists(&name).await {
        Ok(true) => Resolution::Verified(name),
        Ok(false) => Resolution::Unverified(name),
        Err(e) => {
            tracing::warn!(user = %name, error = %e, "Could not verify persisted user");
            Resolution::Unverified(name)
        }
    }
}

/// Create `name` server-side. Does not persist it; see [`set_identity`].
pub async fn create_identity<T: HttpTransport>(
    backend: &BackendClient<T>,
    name: &str,
) -> Result<(), BackendError> {
    backend.create_user(name).await
}

/// Which affordance the name page should offer for `name`.
///
/// Re-queried on every edit; nothing is cached.
pub async fn check_name<T: HttpTransport>(
    backend: &BackendClient<T>,
    name: &str,
) -> Result<IdentityAction, BackendError> {
    if validate_username(name).is_err() {
        return Ok(IdentityAction::Invalid);
    }
    Ok(if backend.user_exists(name).await? {
        IdentityAction::Login
    } else {
        IdentityAction::Create
    })
}
