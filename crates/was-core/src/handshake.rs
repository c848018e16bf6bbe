//! The session handshake state machine.
//!
//! Drives a client from "who are you?" to "you are in game X":
//!
//! ```text
//! Identify ──login/create──▶ SelectOrCreateGame ──join──▶ GameActive
//!                              │      ▲                      ▲
//!                       new game│      │cancel                │ game seen
//!                              ▼      │                      │
//!                            WaitForOpponent ────────────────┘
//! ```
//!
//! Apps without games stop at [`HandshakeState::LoggedIn`] right after login.
//!
//! Every method takes `&self`. Quick transitions (`start`, `login`, `create`,
//! `new_game`, `join_game`, `cancel_wait`, `enter_lobby`) return the new state
//! once their requests are done. The two long-running polls
//! ([`Handshake::watch_lobby`] and [`Handshake::wait_for_opponent`]) run until
//! they observe a remote change or are cancelled, so a frontend races them
//! against user input on the same task:
//!
//! ```ignore
//! tokio::select! {
//!     state = machine.wait_for_opponent() => { /* GameActive or cancelled */ }
//!     Some(line) = input.next_line() => { machine.cancel_wait().await?; }
//! }
//! ```

use std::cell::RefCell;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{BackendClient, BackendError};
use crate::identity::{self, OPPONENT_PARAM, ParamStore, Resolution};
use crate::page::{GameFactory, IdentityAction, Page, PageRenderer};
use crate::polling::{CancelToken, DEFAULT_POLL_INTERVAL, PollOutcome, Timer, poll_until};
#[cfg(feature = "native")]
use crate::polling::TokioTimer;
use crate::protocol::{GameId, GameRecord, InviteList, validate_username};
use crate::transport::HttpTransport;

// ---------------------------------------------------------------------------
// States and errors
// ---------------------------------------------------------------------------

/// Where the client is in the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Name entry. Initial state.
    Identify,
    /// Logged in; browsing open invites.
    SelectOrCreateGame,
    /// Our invite is open; waiting for someone to join it.
    WaitForOpponent,
    /// A game including us exists. Terminal.
    GameActive(GameId),
    /// Logged in to an app without games. Terminal.
    LoggedIn,
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GameActive(_) | Self::LoggedIn)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identify => f.write_str("identify"),
            Self::SelectOrCreateGame => f.write_str("select-or-create-game"),
            Self::WaitForOpponent => f.write_str("wait-for-opponent"),
            Self::GameActive(id) => write!(f, "game-active({id})"),
            Self::LoggedIn => f.write_str("logged-in"),
        }
    }
}

/// Errors surfaced by handshake actions.
///
/// Negative detection results ("no invite yet", "no game yet") are never
/// errors; they drive transitions instead.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// A request that should have succeeded did not.
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("invalid user name '{name}': {reason}")]
    InvalidUsername { name: String, reason: String },

    /// Login was attempted for a name the server does not know.
    #[error("user '{0}' does not exist")]
    UnknownUser(String),

    /// The action needs a logged-in user.
    #[error("no user is logged in")]
    NoIdentity,

    /// A poll loop is already running on this machine.
    #[error("a poll loop is already active")]
    AlreadyPolling,

    #[error("cannot {action} in state {state}")]
    InvalidState {
        action: &'static str,
        state: HandshakeState,
    },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Delay between two checks of the lobby or wait polls.
    pub poll_interval: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// What a lobby check found.
enum LobbyExit {
    Game(GameId),
    OwnInvite,
}

/// Owns the backend client, the parameter store, the renderer and the
/// handshake state. Not `Send`: drive it from one task.
pub struct Handshake<T, S, R, K> {
    backend: BackendClient<T>,
    params: S,
    renderer: R,
    timer: K,
    factory: Option<Box<dyn GameFactory>>,
    config: HandshakeConfig,
    state: RefCell<HandshakeState>,
    user: RefCell<Option<String>>,
    poll: RefCell<Option<CancelToken>>,
}

#[cfg(feature = "native")]
impl<T, S, R> Handshake<T, S, R, TokioTimer>
where
    T: HttpTransport,
    S: ParamStore,
    R: PageRenderer,
{
    /// Create a machine that sleeps with tokio.
    pub fn new(transport: T, params: S, renderer: R) -> Self {
        Self::with_timer(transport, params, renderer, TokioTimer)
    }
}

impl<T, S, R, K> Handshake<T, S, R, K>
where
    T: HttpTransport,
    S: ParamStore,
    R: PageRenderer,
    K: Timer,
{
    pub fn with_timer(transport: T, params: S, renderer: R, timer: K) -> Self {
        Self {
            backend: BackendClient::new(transport),
            params,
            renderer,
            timer,
            factory: None,
            config: HandshakeConfig::default(),
            state: RefCell::new(HandshakeState::Identify),
            user: RefCell::new(None),
            poll: RefCell::new(None),
        }
    }

    /// Make this a two-player app. Without a factory, login ends the
    /// handshake in [`HandshakeState::LoggedIn`].
    #[must_use]
    pub fn with_game_factory<F: GameFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: HandshakeConfig) -> Self {
        self.config = config;
        self
    }

    // -- accessors ---------------------------------------------------------

    pub fn state(&self) -> HandshakeState {
        self.state.borrow().clone()
    }

    /// The logged-in user, set once per session.
    pub fn user(&self) -> Option<String> {
        self.user.borrow().clone()
    }

    pub fn backend(&self) -> &BackendClient<T> {
        &self.backend
    }

    pub fn params(&self) -> &S {
        &self.params
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Handle to the running poll loop's cancellation flag, if one is active.
    pub fn cancel_handle(&self) -> Option<CancelToken> {
        self.poll.borrow().clone()
    }

    // -- Identify ----------------------------------------------------------

    /// Enter the handshake: show the name page and try the persisted identity.
    pub async fn start(&self) -> Result<HandshakeState, HandshakeError> {
        self.require("start", |s| matches!(s, HandshakeState::Identify))?;
        self.renderer.show_page(Page::Name);

        match identity::resolve_identity(&self.params, &self.backend).await {
            Resolution::Verified(name) => {
                tracing::info!(user = %name, "Resumed persisted identity");
                self.complete_login(name).await
            }
            Resolution::Unverified(name) => {
                // Pre-fill the name and offer whatever fits it. A failed
                // check was already reported.
                self.name_edited(&name).await.ok();
                Ok(self.state())
            }
            Resolution::Absent => Ok(self.state()),
        }
    }

    /// The name field changed: re-check existence and toggle Login/Create.
    pub async fn name_edited(&self, name: &str) -> Result<IdentityAction, HandshakeError> {
        self.require("edit name", |s| matches!(s, HandshakeState::Identify))?;
        match identity::check_name(&self.backend, name).await {
            Ok(action) => {
                self.renderer.show_identity_action(name, action);
                Ok(action)
            }
            Err(e) => self.fail("check name", e.into()),
        }
    }

    /// Log in as an existing user.
    pub async fn login(&self, name: &str) -> Result<HandshakeState, HandshakeError> {
        self.require("log in", |s| matches!(s, HandshakeState::Identify))?;
        if let Err(e) = self.validate(name) {
            return self.fail("log in", e);
        }
        match self.backend.user_exists(name).await {
            Ok(true) => self.complete_login(name.to_string()).await,
            Ok(false) => {
                self.renderer.show_identity_action(name, IdentityAction::Create);
                self.fail("log in", HandshakeError::UnknownUser(name.to_string()))
            }
            Err(e) => self.fail("log in", e.into()),
        }
    }

    /// Create a new user and log in as it.
    pub async fn create(&self, name: &str) -> Result<HandshakeState, HandshakeError> {
        self.require("create user", |s| matches!(s, HandshakeState::Identify))?;
        if let Err(e) = self.validate(name) {
            return self.fail("create user", e);
        }
        if let Err(e) = identity::create_identity(&self.backend, name).await {
            return self.fail("create user", e.into());
        }
        tracing::info!(user = %name, "Created user");
        self.complete_login(name.to_string()).await
    }

    // -- SelectOrCreateGame ------------------------------------------------

    /// Show the lobby and run one check: an existing game wins, then our own
    /// open invite, otherwise the open invites are listed.
    pub async fn enter_lobby(&self) -> Result<HandshakeState, HandshakeError> {
        self.require("enter lobby", |s| {
            matches!(s, HandshakeState::SelectOrCreateGame)
        })?;
        self.show_lobby().await
    }

    /// Repeat the lobby check every poll interval until a game including us
    /// appears, our own invite appears, or the loop is cancelled.
    ///
    /// A check that cannot reach the server is logged and retried on the
    /// next tick; any other failure ends the watch with that error.
    /// [`new_game`] and [`join_game`] cancel a running watch.
    ///
    /// [`new_game`]: Self::new_game
    /// [`join_game`]: Self::join_game
    pub async fn watch_lobby(&self) -> Result<HandshakeState, HandshakeError> {
        self.require("watch lobby", |s| {
            matches!(s, HandshakeState::SelectOrCreateGame)
        })?;
        let user = self.current_user()?;
        let guard = self.begin_poll()?;

        // `enter_lobby` just ran a check; the watch continues one interval later.
        self.timer.sleep(self.config.poll_interval).await;
        let user = user.as_str();
        let outcome = poll_until(
            || async move {
                match self.lobby_check(user).await {
                    Ok(exit) => exit.map(Ok),
                    Err(HandshakeError::Backend(BackendError::Transport(e))) => {
                        tracing::warn!(user = %user, error = %e, "Lobby check failed; retrying");
                        None
                    }
                    Err(e) => Some(Err(e)),
                }
            },
            self.config.poll_interval,
            guard.token(),
            &self.timer,
        )
        .await;
        drop(guard);

        match outcome {
            PollOutcome::Resolved(Ok(exit)) => Ok(self.apply_lobby_exit(exit)),
            PollOutcome::Resolved(Err(e)) => self.fail("watch lobby", e),
            PollOutcome::Cancelled => Ok(self.state()),
        }
    }

    /// Open an invite under our own name. The lobby then moves us to
    /// [`HandshakeState::WaitForOpponent`].
    pub async fn new_game(&self) -> Result<HandshakeState, HandshakeError> {
        self.require("create a game", |s| {
            matches!(s, HandshakeState::SelectOrCreateGame)
        })?;
        let user = self.current_user()?;
        self.stop_polling();

        if let Err(e) = self.backend.create_invite(&user).await {
            return self.fail("create a game", e.into());
        }
        tracing::info!(user = %user, "Opened game invite");
        self.show_lobby().await
    }

    /// Consume `inviter`'s invite and start a game against them.
    ///
    /// The game is only created once the invite was deleted; if either
    /// request fails the machine stays in the lobby.
    pub async fn join_game(&self, inviter: &str) -> Result<HandshakeState, HandshakeError> {
        self.require("join a game", |s| {
            matches!(s, HandshakeState::SelectOrCreateGame)
        })?;
        let user = self.current_user()?;
        if let Err(e) = self.validate(inviter) {
            return self.fail("join a game", e);
        }
        if inviter == user {
            return self.fail(
                "join a game",
                HandshakeError::InvalidUsername {
                    name: inviter.to_string(),
                    reason: "cannot join your own invite".to_string(),
                },
            );
        }
        self.stop_polling();

        if let Err(e) = self.backend.delete_invite(inviter).await {
            return self.fail("join a game", e.into());
        }
        self.params.set(OPPONENT_PARAM, inviter);

        let state = self
            .factory
            .as_ref()
            .map(|factory| factory.new_game(&user, inviter))
            .unwrap_or_default();
        let game = GameRecord::new(&user, inviter, state);
        if let Err(e) = self.backend.create_game(inviter, &game).await {
            return self.fail("join a game", e.into());
        }
        tracing::info!(user = %user, opponent = %inviter, "Joined game");
        Ok(self.activate_game(inviter.to_string()))
    }

    // -- WaitForOpponent ---------------------------------------------------

    /// Poll the game listing until a game including us appears or the wait
    /// is cancelled.
    ///
    /// A listing that cannot reach the server is logged and retried on the
    /// next tick; a malformed listing ends the wait with an error. Returns
    /// the state at the end of the loop: [`HandshakeState::GameActive`] when
    /// a game was seen, otherwise whatever the cancelling action left behind.
    pub async fn wait_for_opponent(&self) -> Result<HandshakeState, HandshakeError> {
        self.require("wait for an opponent", |s| {
            matches!(s, HandshakeState::WaitForOpponent)
        })?;
        let user = self.current_user()?;
        let guard = self.begin_poll()?;

        let user = user.as_str();
        let outcome = poll_until(
            || async move {
                match self.backend.active_game_for(user).await {
                    Ok(game) => game.map(Ok),
                    Err(BackendError::Transport(e)) => {
                        tracing::warn!(user = %user, error = %e, "Game check failed; retrying");
                        None
                    }
                    Err(e) => Some(Err(e)),
                }
            },
            self.config.poll_interval,
            guard.token(),
            &self.timer,
        )
        .await;
        drop(guard);

        match outcome {
            PollOutcome::Resolved(Ok(game)) => Ok(self.activate_game(game)),
            PollOutcome::Resolved(Err(e)) => self.fail("wait for an opponent", e.into()),
            PollOutcome::Cancelled => {
                tracing::info!(user = %user, "Stopped waiting for an opponent");
                Ok(self.state())
            }
        }
    }

    /// Withdraw our invite and go back to the lobby.
    ///
    /// The wait poll is only cancelled once the invite is gone; if the
    /// delete fails we keep waiting.
    pub async fn cancel_wait(&self) -> Result<HandshakeState, HandshakeError> {
        self.require("cancel the invite", |s| {
            matches!(s, HandshakeState::WaitForOpponent)
        })?;
        let user = self.current_user()?;

        if let Err(e) = self.backend.delete_invite(&user).await {
            return self.fail("cancel the invite", e.into());
        }
        self.stop_polling();
        tracing::info!(user = %user, "Cancelled game invite");
        self.set_state(HandshakeState::SelectOrCreateGame);
        self.show_lobby().await
    }

    // -- private: transitions ----------------------------------------------

    async fn complete_login(&self, name: String) -> Result<HandshakeState, HandshakeError> {
        identity::set_identity(&self.params, &name);
        tracing::info!(user = %name, "Logged in");
        *self.user.borrow_mut() = Some(name);

        if self.factory.is_none() {
            self.set_state(HandshakeState::LoggedIn);
            self.renderer.show_page(Page::App);
            self.renderer.show_app(None);
            return Ok(self.state());
        }
        self.set_state(HandshakeState::SelectOrCreateGame);
        self.show_lobby().await
    }

    async fn show_lobby(&self) -> Result<HandshakeState, HandshakeError> {
        let user = self.current_user()?;
        self.set_state(HandshakeState::SelectOrCreateGame);
        self.renderer.show_page(Page::GameSelect);

        match self.lobby_check(&user).await {
            Ok(Some(exit)) => Ok(self.apply_lobby_exit(exit)),
            Ok(None) => Ok(self.state()),
            Err(e) => self.fail("enter lobby", e),
        }
    }

    /// One lobby check. `None` means "stay in the lobby".
    async fn lobby_check(&self, user: &str) -> Result<Option<LobbyExit>, HandshakeError> {
        if let Some(game) = self.backend.active_game_for(user).await? {
            return Ok(Some(LobbyExit::Game(game)));
        }
        if self.backend.invite_exists(user).await? {
            return Ok(Some(LobbyExit::OwnInvite));
        }
        let invites = match self.backend.list_invites().await {
            Ok(mut invites) => {
                invites.remove(user);
                invites
            }
            // Nobody has posted an invite yet: the directory does not exist.
            Err(BackendError::Request { status, .. }) => {
                tracing::debug!(status, "Invite listing unavailable; showing none");
                InviteList::new()
            }
            Err(e) => return Err(e.into()),
        };
        self.renderer.show_invites(&invites);
        Ok(None)
    }

    fn apply_lobby_exit(&self, exit: LobbyExit) -> HandshakeState {
        match exit {
            LobbyExit::Game(game) => self.activate_game(game),
            LobbyExit::OwnInvite => {
                self.set_state(HandshakeState::WaitForOpponent);
                self.renderer.show_page(Page::GameWait);
                self.state()
            }
        }
    }

    fn activate_game(&self, game: GameId) -> HandshakeState {
        self.set_state(HandshakeState::GameActive(game.clone()));
        self.renderer.show_page(Page::App);
        self.renderer.show_app(Some(&game));
        self.state()
    }

    fn set_state(&self, next: HandshakeState) {
        let mut state = self.state.borrow_mut();
        if *state != next {
            tracing::info!(from = %state, to = %next, "Handshake transition");
            *state = next;
        }
    }

    // -- private: helpers --------------------------------------------------

    fn require(
        &self,
        action: &'static str,
        allowed: impl Fn(&HandshakeState) -> bool,
    ) -> Result<(), HandshakeError> {
        let state = self.state.borrow();
        if allowed(&state) {
            Ok(())
        } else {
            Err(HandshakeError::InvalidState {
                action,
                state: state.clone(),
            })
        }
    }

    fn current_user(&self) -> Result<String, HandshakeError> {
        self.user.borrow().clone().ok_or(HandshakeError::NoIdentity)
    }

    fn validate(&self, name: &str) -> Result<(), HandshakeError> {
        validate_username(name).map_err(|reason| HandshakeError::InvalidUsername {
            name: name.to_string(),
            reason,
        })
    }

    /// Log and report a failed user action; the state is left as it was.
    fn fail<V>(&self, action: &'static str, error: HandshakeError) -> Result<V, HandshakeError> {
        tracing::warn!(action, state = %self.state.borrow(), error = %error, "Action failed");
        self.renderer.report_error(&error);
        Err(error)
    }

    /// Claim the single poll slot.
    fn begin_poll(&self) -> Result<PollGuard<'_>, HandshakeError> {
        let mut slot = self.poll.borrow_mut();
        if slot.as_ref().is_some_and(|active| !active.is_cancelled()) {
            return Err(HandshakeError::AlreadyPolling);
        }
        let token = CancelToken::new();
        *slot = Some(token.clone());
        Ok(PollGuard {
            slot: &self.poll,
            token,
        })
    }

    /// Cancel the running poll loop, if any.
    fn stop_polling(&self) {
        if let Some(token) = self.poll.borrow_mut().take() {
            token.cancel();
        }
    }
}

/// Releases the poll slot when a poll loop ends, including when its future
/// is dropped mid-flight.
struct PollGuard<'a> {
    slot: &'a RefCell<Option<CancelToken>>,
    token: CancelToken,
}

impl PollGuard<'_> {
    fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.borrow_mut();
        if slot.as_ref().is_some_and(|t| t.same_as(&self.token)) {
            *slot = None;
        }
    }
}
