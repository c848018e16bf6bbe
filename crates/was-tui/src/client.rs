//! Client orchestrator: wires the HTTP transport, the URL parameter store and
//! the terminal renderer into a handshake, then drives it from stdin.
//!
//! While the lobby or the wait page is shown, the poll loop races the next
//! input line. Whichever finishes first wins; a dropped poll releases its
//! slot, so the command that follows can start a new one.

use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use was_client::{ClientConfig, ReqwestTransport, UrlParams};
use was_core::handshake::{Handshake, HandshakeConfig, HandshakeError, HandshakeState};
use was_core::identity::set_identity;
use was_core::polling::TokioTimer;

use crate::term::{self, TerminalRenderer};

type Machine = Handshake<ReqwestTransport, UrlParams, TerminalRenderer, TokioTimer>;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A bare word on the name page.
    Name(String),
    Login(Option<String>),
    Create(Option<String>),
    New,
    Join(String),
    Cancel,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Command::Empty;
    };
    let arg = words.next().map(str::to_string);
    match (head, arg) {
        ("login", name) => Command::Login(name),
        ("create", name) => Command::Create(name),
        ("new", None) => Command::New,
        ("join", Some(name)) => Command::Join(name),
        ("join", None) => Command::Unknown(line.trim().to_string()),
        ("cancel", None) => Command::Cancel,
        ("help" | "?", None) => Command::Help,
        ("quit" | "exit" | "q", None) => Command::Quit,
        (name, None) => Command::Name(name.to_string()),
        _ => Command::Unknown(line.trim().to_string()),
    }
}

/// Initial state of a game started from the terminal: the joiner moves first.
fn new_game_state(user: &str, _opponent: &str) -> Map<String, Value> {
    let mut state = Map::new();
    state.insert("turn".to_string(), json!(user));
    state
}

/// Run the handshake until a game starts, the user quits, or stdin closes.
pub async fn start_client(
    config: &ClientConfig,
    user: Option<&str>,
    user_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = ReqwestTransport::new(&config.data_url())?;
    let params = UrlParams::parse(&config.page_url())?;
    if let Some(user) = user {
        set_identity(&params, user);
    }

    let mut machine = Handshake::new(transport, params, TerminalRenderer::default())
        .with_config(HandshakeConfig {
            poll_interval: config.poll_interval,
        });
    if !user_only {
        machine = machine.with_game_factory(new_game_state);
    }

    machine.start().await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    run_event_loop(&machine, &mut lines).await?;

    if machine.user().is_some() {
        println!("Resume this session at {}", machine.params().url());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn run_event_loop<B>(
    machine: &Machine,
    lines: &mut Lines<B>,
) -> Result<(), Box<dyn std::error::Error>>
where
    B: AsyncBufRead + Unpin,
{
    loop {
        let state = machine.state();
        if state.is_terminal() {
            return Ok(());
        }
        term::print_prompt(&state);

        let line = match state {
            HandshakeState::SelectOrCreateGame | HandshakeState::WaitForOpponent => {
                tokio::select! {
                    polled = poll(machine, &state) => {
                        polled?;
                        continue;
                    }
                    line = lines.next_line() => line?,
                }
            }
            _ => lines.next_line().await?,
        };

        let Some(line) = line else {
            return Ok(());
        };
        if !handle_command(machine, parse_command(&line)).await {
            return Ok(());
        }
    }
}

/// The long-running poll for pages that watch the server.
async fn poll(machine: &Machine, state: &HandshakeState) -> Result<HandshakeState, HandshakeError> {
    match state {
        HandshakeState::WaitForOpponent => machine.wait_for_opponent().await,
        _ => machine.watch_lobby().await,
    }
}

/// Apply one command. Returns `false` when the user wants to leave.
async fn handle_command(machine: &Machine, command: Command) -> bool {
    let result = match command {
        Command::Quit => return false,
        Command::Empty => return true,
        Command::Help => {
            term::print_help();
            return true;
        }
        Command::Unknown(line) => {
            println!("  Unknown command '{line}'; type `help`.");
            return true;
        }
        Command::Name(name) => machine.name_edited(&name).await.map(|_| ()),
        Command::Login(name) => match name.or_else(|| machine.renderer().pending_name()) {
            Some(name) => machine.login(&name).await.map(|_| ()),
            None => {
                println!("  Type your name first.");
                return true;
            }
        },
        Command::Create(name) => match name.or_else(|| machine.renderer().pending_name()) {
            Some(name) => machine.create(&name).await.map(|_| ()),
            None => {
                println!("  Type your name first.");
                return true;
            }
        },
        Command::New => machine.new_game().await.map(|_| ()),
        Command::Join(inviter) => machine.join_game(&inviter).await.map(|_| ()),
        Command::Cancel => machine.cancel_wait().await.map(|_| ()),
    };

    // Backend failures were already shown by the renderer.
    if let Err(e @ (HandshakeError::InvalidState { .. } | HandshakeError::AlreadyPolling)) =
        result
    {
        term::print_error(&e);
    }
    true
}
