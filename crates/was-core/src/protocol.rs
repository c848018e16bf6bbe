//! Wire types and resource paths for the data API.
//!
//! Every resource lives under a per-application base URL
//! (`{origin}/data/{app}`); the paths rendered by [`Resource::path`] are
//! relative to it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of a game record. A joiner's game is keyed by the inviter's name.
pub type GameId = String;

/// Inviter name → pending invite.
pub type InviteList = BTreeMap<String, InviteRecord>;

/// Game id → game record.
pub type GameList = BTreeMap<GameId, GameRecord>;

/// Characters escaped in a name segment: the URL path set plus `/` and `%`,
/// so a name always stays a single, literal segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// The resources the handshake touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    /// `user/{name}`
    User(&'a str),
    /// `game-invites/{name}`
    Invite(&'a str),
    /// `game-invites/` (listing)
    Invites,
    /// `game/` (listing)
    Games,
    /// `game/{opponent}`
    Game(&'a str),
}

impl Resource<'_> {
    /// Path relative to the application's data base URL, with the name
    /// segment percent-encoded.
    pub fn path(&self) -> String {
        match self {
            Self::User(name) => format!("user/{}", encode(name)),
            Self::Invite(name) => format!("game-invites/{}", encode(name)),
            Self::Invites => "game-invites/".to_string(),
            Self::Games => "game/".to_string(),
            Self::Game(opponent) => format!("game/{}", encode(opponent)),
        }
    }
}

impl fmt::Display for Resource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Body posted when creating a user or an invite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationStamp {
    pub creation_date: String,
}

impl CreationStamp {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            creation_date: time.to_rfc3339(),
        }
    }
}

/// A pending invite as returned by the invite listing.
///
/// Other clients write the timestamp in whatever format they like, so it is
/// kept as an opaque string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InviteRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

/// A started game.
///
/// Only `players` is interpreted here; everything else belongs to the
/// application and is carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameRecord {
    #[serde(default)]
    pub players: Vec<String>,
    #[serde(flatten)]
    pub state: Map<String, Value>,
}

impl GameRecord {
    /// Build the record a joiner posts: `players` is always `[user, opponent]`,
    /// whatever the application state says.
    pub fn new(user: &str, opponent: &str, mut state: Map<String, Value>) -> Self {
        state.remove("players");
        Self {
            players: vec![user.to_string(), opponent.to_string()],
            state,
        }
    }

    pub fn has_player(&self, name: &str) -> bool {
        self.players.iter().any(|p| p == name)
    }
}

/// Find the first game (in key order) that lists `user` as a player.
pub fn find_game_for<'a>(games: &'a GameList, user: &str) -> Option<&'a GameId> {
    games
        .iter()
        .find(|(_, game)| game.has_player(user))
        .map(|(id, _)| id)
}

/// One entry of the service's application listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppInfo {
    pub path: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Username validation
// ---------------------------------------------------------------------------

/// Validate a username.
///
/// Any text the server can store as a file name is accepted; it is
/// percent-encoded on the way out. That rules out empty names, `.` and `..`,
/// `/` and control characters.
pub fn validate_username(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("User name cannot be empty".to_string());
    }
    if name == "." || name == ".." {
        return Err("User name cannot be '.' or '..'".to_string());
    }
    if name.contains('/') {
        return Err("User name cannot contain '/'".to_string());
    }
    if name.chars().any(char::is_control) {
        return Err("User name cannot contain control characters".to_string());
    }
    Ok(())
}

fn encode(name: &str) -> String {
    utf8_percent_encode(name, SEGMENT).to_string()
}
