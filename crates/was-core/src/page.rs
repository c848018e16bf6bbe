//! Collaborator interfaces the handshake drives.
//!
//! The state machine never draws anything itself. It tells a
//! [`PageRenderer`] which logical page to show and what to put on it, and asks
//! a [`GameFactory`] for the initial application state of a new game.

use serde_json::{Map, Value};

use crate::handshake::HandshakeError;
use crate::protocol::{GameId, InviteList};

/// The logical pages of the handshake. Exactly one is shown at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    /// User name entry with a login or create affordance.
    Name,
    /// Open invites plus a "new game" action.
    GameSelect,
    /// Waiting for someone to join our invite, with a cancel action.
    GameWait,
    /// The application's own page; the handshake is over.
    App,
}

/// Which affordance the name page should offer for the entered name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityAction {
    /// The user exists: offer "Login".
    Login,
    /// The user does not exist: offer "Create user".
    Create,
    /// The name cannot be used at all; offer neither.
    Invalid,
}

/// Shows pages on behalf of the handshake.
///
/// Methods take `&self`; renderers that keep state use interior mutability.
pub trait PageRenderer {
    /// Hide every page except `page`.
    fn show_page(&self, page: Page);

    /// Fill the name field with `name` and offer `action`.
    fn show_identity_action(&self, name: &str, action: IdentityAction);

    /// Replace the displayed list of joinable invites.
    fn show_invites(&self, invites: &InviteList);

    /// Hand over to the application. `game` is `None` for apps without games.
    fn show_app(&self, game: Option<&GameId>);

    /// A user action failed; the user stays on the current page.
    fn report_error(&self, _error: &HandshakeError) {}
}

/// Builds the application-defined state of a freshly joined game.
///
/// The returned map must not worry about `players`: the handshake always sets
/// it to `[user, opponent]`.
pub trait GameFactory {
    fn new_game(&self, user: &str, opponent: &str) -> Map<String, Value>;
}

impl<F> GameFactory for F
where
    F: Fn(&str, &str) -> Map<String, Value>,
{
    fn new_game(&self, user: &str, opponent: &str) -> Map<String, Value> {
        self(user, opponent)
    }
}
