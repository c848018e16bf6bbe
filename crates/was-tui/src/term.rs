//! Plain-text rendering of the handshake pages.
//!
//! One page at a time is printed as a header plus the commands it accepts.
//! Colours come from `crossterm` and degrade to plain text when stdout is not
//! a terminal.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crossterm::style::Stylize;
use was_core::handshake::{HandshakeError, HandshakeState};
use was_core::page::{IdentityAction, Page, PageRenderer};
use was_core::protocol::{AppInfo, GameId, InviteList};

/// [`PageRenderer`] that prints to stdout.
#[derive(Default)]
pub struct TerminalRenderer {
    /// Last name shown on the name page; `login`/`create` act on it.
    pending_name: RefCell<Option<String>>,
    /// Last invite list printed. The lobby poll re-sends it every tick.
    invites: RefCell<Option<Vec<String>>>,
}

impl TerminalRenderer {
    pub fn pending_name(&self) -> Option<String> {
        self.pending_name.borrow().clone()
    }
}

impl PageRenderer for TerminalRenderer {
    fn show_page(&self, page: Page) {
        let (title, hint) = match page {
            Page::Name => ("Who are you?", "type your name, then `login` or `create`"),
            Page::GameSelect => ("Lobby", "`new` opens a game, `join <name>` joins one"),
            Page::GameWait => ("Waiting for an opponent", "`cancel` withdraws your invite"),
            Page::App => ("Game", ""),
        };
        // A fresh lobby always prints its invites again.
        self.invites.borrow_mut().take();

        println!();
        println!("{}", title.bold().cyan());
        if !hint.is_empty() {
            println!("  {}", hint.dark_grey());
        }
    }

    fn show_identity_action(&self, name: &str, action: IdentityAction) {
        *self.pending_name.borrow_mut() = Some(name.to_string());
        match action {
            IdentityAction::Login => println!("  {} is known: type `login`", name.bold()),
            IdentityAction::Create => println!("  {} is free: type `create`", name.bold()),
            IdentityAction::Invalid => println!("  {} is not a valid name", name.bold().red()),
        }
    }

    fn show_invites(&self, invites: &InviteList) {
        let names: Vec<String> = invites.keys().cloned().collect();
        if self.invites.borrow().as_ref() == Some(&names) {
            return;
        }
        if names.is_empty() {
            println!("  {}", "No open games yet.".dark_grey());
        } else {
            println!("  Open games:");
            for name in &names {
                println!("    join {}", name.as_str().green());
            }
        }
        *self.invites.borrow_mut() = Some(names);
    }

    fn show_app(&self, game: Option<&GameId>) {
        match game {
            Some(id) => println!("  Game {} has started.", id.as_str().bold().green()),
            None => println!("  {}", "Logged in.".green()),
        }
    }

    fn report_error(&self, error: &HandshakeError) {
        print_error(error);
    }
}

pub fn print_error(error: &HandshakeError) {
    eprintln!("  {} {}", "error:".red().bold(), error);
}

/// Prompt for the next command in `state`.
pub fn print_prompt(state: &HandshakeState) {
    println!("{}", format!("[{state}] >").dark_grey());
}

pub fn print_help() {
    println!("  <name>        check a user name");
    println!("  login [name]  log in as an existing user");
    println!("  create [name] create a user and log in");
    println!("  new           open a game");
    println!("  join <name>   join someone's game");
    println!("  cancel        withdraw your open game");
    println!("  quit          leave");
}

pub fn print_apps(apps: &BTreeMap<String, AppInfo>) {
    if apps.is_empty() {
        println!("No apps.");
        return;
    }
    for (dir, app) in apps {
        println!("{:<20} {} ({})", dir.as_str().bold(), app.name, app.path);
    }
}
