//! In-memory stand-ins for the data API and the page renderer.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value, json};

use crate::handshake::HandshakeError;
use crate::page::{IdentityAction, Page, PageRenderer};
use crate::protocol::{GameId, InviteList};
use crate::transport::{HttpTransport, Method, RawResponse, TransportError};

// ---------------------------------------------------------------------------
// FakeServer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ServerState {
    /// `dir/name` → JSON document.
    records: BTreeMap<String, Value>,
    /// Directories that have been written to at least once.
    dirs: BTreeSet<String>,
    /// Forced responses, consulted before the records.
    overrides: HashMap<(Method, String), (u16, String)>,
    offline: bool,
    latency: Option<Duration>,
    log: Vec<(Method, String)>,
}

/// Emulates the data API: documents are stored per `dir/name`, a directory
/// listing returns every document in it, and a directory that was never
/// written answers 404.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document directly, bypassing the request log.
    pub fn insert(&self, path: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        let (dir, _) = split(path);
        state.dirs.insert(dir.to_string());
        state.records.insert(path.to_string(), value);
    }

    pub fn record(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().records.get(path).cloned()
    }

    /// Answer `method path` with `status` and a canned error message.
    pub fn fail(&self, method: Method, path: &str, status: u16) {
        self.respond(method, path, status, r#"{"message": "forced failure"}"#);
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .overrides
            .insert((method, path.to_string()), (status, body.to_string()));
    }

    pub fn go_offline(&self) {
        self.state.lock().unwrap().offline = true;
    }

    /// Delay every response by `latency` (tokio time).
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = Some(latency);
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }

    fn handle(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, TransportError> {
        // Records are keyed by the decoded name, like files on the server.
        let path = percent_decode_str(path).decode_utf8_lossy().into_owned();
        let path = path.as_str();
        let mut state = self.state.lock().unwrap();
        state.log.push((method, path.to_string()));
        if state.offline {
            return Err(TransportError::Io("connection refused".to_string()));
        }
        if let Some((status, body)) = state.overrides.get(&(method, path.to_string())) {
            return Ok(RawResponse::new(*status, body.clone()));
        }

        let (dir, name) = split(path);
        match (method, name) {
            (Method::Get, "") => {
                if !state.dirs.contains(dir) {
                    return Ok(not_found());
                }
                let listing: Map<String, Value> = state
                    .records
                    .iter()
                    .filter_map(|(key, value)| {
                        let (d, n) = split(key);
                        (d == dir).then(|| (n.to_string(), value.clone()))
                    })
                    .collect();
                Ok(RawResponse::new(200, Value::Object(listing).to_string()))
            }
            (Method::Get, _) => Ok(match state.records.get(path) {
                Some(value) => RawResponse::new(200, value.to_string()),
                None => not_found(),
            }),
            (Method::Post, "") => Ok(RawResponse::new(
                403,
                message("POST to directory not allowed"),
            )),
            (Method::Post, _) => {
                state.dirs.insert(dir.to_string());
                state
                    .records
                    .insert(path.to_string(), body.cloned().unwrap_or(Value::Null));
                Ok(RawResponse::new(200, message("JSON post successfull")))
            }
            (Method::Delete, _) => Ok(match state.records.remove(path) {
                Some(_) => RawResponse::new(200, message("Deleted")),
                None => not_found(),
            }),
        }
    }
}

impl HttpTransport for FakeServer {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
        let latency = self.state.lock().unwrap().latency;
        let result = self.handle(method, path, body);
        async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            result
        }
    }
}

fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

fn message(text: &str) -> String {
    json!({ "message": text }).to_string()
}

fn not_found() -> RawResponse {
    RawResponse::new(404, message("no such file or directory"))
}

// ---------------------------------------------------------------------------
// RecordingRenderer
// ---------------------------------------------------------------------------

/// Everything the handshake asked the renderer to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Page(Page),
    IdentityAction(String, IdentityAction),
    Invites(Vec<String>),
    App(Option<GameId>),
    Error(String),
}

#[derive(Default)]
pub struct RecordingRenderer {
    events: RefCell<Vec<Rendered>>,
}

impl RecordingRenderer {
    pub fn events(&self) -> Vec<Rendered> {
        self.events.borrow().clone()
    }

    pub fn last_page(&self) -> Option<Page> {
        self.events.borrow().iter().rev().find_map(|e| match e {
            Rendered::Page(page) => Some(*page),
            _ => None,
        })
    }

    pub fn apps(&self) -> Vec<Option<GameId>> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Rendered::App(game) => Some(game.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Rendered::Error(_)))
            .count()
    }

    fn push(&self, event: Rendered) {
        self.events.borrow_mut().push(event);
    }
}

impl PageRenderer for RecordingRenderer {
    fn show_page(&self, page: Page) {
        self.push(Rendered::Page(page));
    }

    fn show_identity_action(&self, name: &str, action: IdentityAction) {
        self.push(Rendered::IdentityAction(name.to_string(), action));
    }

    fn show_invites(&self, invites: &InviteList) {
        self.push(Rendered::Invites(invites.keys().cloned().collect()));
    }

    fn show_app(&self, game: Option<&GameId>) {
        self.push(Rendered::App(game.cloned()));
    }

    fn report_error(&self, error: &HandshakeError) {
        self.push(Rendered::Error(error.to_string()));
    }
}
