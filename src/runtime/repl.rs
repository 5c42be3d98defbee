use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    constants::SESSION_TITLE_PREVIEW_CHARS,
    conversation::{ConversationEvent, ConversationOrchestrator, Message, Role, SendOutcome},
    session::{Session, SessionId},
    utils::ErrorKind,
};

/// Slash commands understood by the REPL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    New,
    Sessions,
    Switch(String),
    Delete(String),
    History,
    Help,
    Quit,
    Unknown(String),
}

impl ReplCommand {
    /// Parse a line starting with `/`; anything else is chat input
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::to_string);

        let command = match (name, arg) {
            ("new", _) => Self::New,
            ("sessions" | "ls", _) => Self::Sessions,
            ("switch", Some(id)) => Self::Switch(id),
            ("delete", Some(id)) => Self::Delete(id),
            ("history", _) => Self::History,
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit" | "q", _) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        };
        Some(command)
    }
}

/// Truncate a title for one-line listings
pub fn preview(title: &str) -> String {
    if title.chars().count() <= SESSION_TITLE_PREVIEW_CHARS {
        return title.to_string();
    }
    let cut: String = title.chars().take(SESSION_TITLE_PREVIEW_CHARS - 3).collect();
    format!("{}...", cut)
}

/// Render one message for the terminal
pub fn format_message(message: &Message, show_timestamps: bool) -> String {
    let stamp = if show_timestamps {
        let stamp = format!("[{}] ", message.timestamp.format("%H:%M:%S"));
        stamp.as_str().dimmed().to_string()
    } else {
        String::new()
    };

    let body = match (&message.role, &message.error) {
        (_, Some(tag)) => {
            let label = format!("[{}]", tag.kind.label());
            let label = match tag.kind {
                ErrorKind::Cancelled => label.as_str().yellow(),
                _ => label.as_str().red(),
            };
            format!("{} {}", label, message.text().as_str().red())
        }
        (Role::User, None) => format!("{} {}", "you:".cyan().bold(), message.text()),
        (Role::Assistant, None) => format!("{} {}", "assistant:".green().bold(), message.text()),
    };
    format!("{}{}", stamp, body)
}

fn format_session(session: &Session, active: Option<&SessionId>) -> String {
    let marker = if active == Some(&session.id) { "*" } else { " " };
    let created = session
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {}  {}  {}",
        marker,
        session.id.as_str().bold(),
        created.as_str().dimmed(),
        preview(&session.display_name())
    )
}

/// Line-based chat surface over the orchestrator
pub struct Repl {
    orchestrator: Arc<ConversationOrchestrator>,
    events: UnboundedReceiver<ConversationEvent>,
    show_timestamps: bool,
}

impl Repl {
    pub fn new(orchestrator: Arc<ConversationOrchestrator>, show_timestamps: bool) -> Self {
        let events = orchestrator.subscribe();
        Self {
            orchestrator,
            events,
            show_timestamps,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        println!(
            "{} {}",
            "threadline".cyan().bold(),
            "- type /help for commands, Ctrl-C cancels a reply".dimmed()
        );
        self.print_history();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{} ", ">".cyan().bold());
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            match ReplCommand::parse(&line) {
                Some(ReplCommand::Quit) => break,
                Some(command) => self.handle_command(command).await,
                None => self.chat(&line).await?,
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: ReplCommand) {
        let orchestrator = self.orchestrator.clone();
        let result = match command {
            ReplCommand::New => orchestrator.create_session().await.map(|session| {
                println!("Created session {}", session.id.as_str().green());
            }),
            ReplCommand::Sessions => orchestrator.list_sessions().await.map(|sessions| {
                if sessions.is_empty() {
                    println!("No sessions yet.");
                }
                let active = orchestrator.active_session();
                for session in &sessions {
                    println!("{}", format_session(session, active.as_ref()));
                }
            }),
            ReplCommand::Switch(id) => {
                let id = SessionId::new(id);
                orchestrator.select_session(&id);
                let loaded = orchestrator.load_history().await;
                loaded.map(|_| {
                    println!("Switched to {}", id.as_str().green());
                    self.print_history();
                })
            }
            ReplCommand::Delete(id) => {
                let id = SessionId::new(id);
                orchestrator.delete_session(&id).await.map(|_| {
                    println!("Deleted {}", id);
                    if let Some(active) = orchestrator.active_session() {
                        println!("Active session is now {}", active.as_str().green());
                    }
                })
            }
            ReplCommand::History => {
                self.print_history();
                Ok(())
            }
            ReplCommand::Help => {
                print_help();
                Ok(())
            }
            ReplCommand::Quit => Ok(()),
            ReplCommand::Unknown(line) => {
                println!("Unknown command: {} (try /help)", line);
                Ok(())
            }
        };

        if let Err(e) = result {
            let label = format!("[{}]", e.kind().label());
            println!("{} {}", label.as_str().red(), e.user_message().as_str().red());
        }
    }

    async fn chat(&mut self, text: &str) -> Result<()> {
        // Events from earlier turns or session changes are stale now
        while self.events.try_recv().is_ok() {}

        let orchestrator = self.orchestrator.clone();
        let cancel = CancellationToken::new();
        let send = orchestrator.send_with_cancel(text, cancel.clone());
        tokio::pin!(send);

        let mut printed = 0;
        let outcome = loop {
            tokio::select! {
                outcome = &mut send => break outcome,
                Some(event) = self.events.recv() => {
                    if let ConversationEvent::Partial { text, errored: false, .. } = event {
                        if printed == 0 {
                            print!("{} ", "assistant:".green().bold());
                        }
                        if let Some(fresh) = text.get(printed..) {
                            print!("{}", fresh);
                            std::io::stdout().flush()?;
                        }
                        printed = text.len();
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    debug!("cancelling in-flight send");
                    cancel.cancel();
                }
            }
        };

        if printed > 0 {
            println!();
        }
        match outcome {
            SendOutcome::Empty => {}
            SendOutcome::Busy => println!("{}", "A reply is still in flight.".yellow()),
            SendOutcome::Replied(report) => {
                debug!(path = %report.path(), polls = report.polls, "reply settled");
                // Streamed text was already printed; the settled text may differ
                if let Some(reply) = self.orchestrator.snapshot().messages().last() {
                    if printed == 0 || reply.text().len() != printed {
                        println!("{}", format_message(reply, self.show_timestamps));
                    }
                }
            }
            SendOutcome::Failed(_) => {
                if let Some(reply) = self.orchestrator.snapshot().messages().last() {
                    println!("{}", format_message(reply, self.show_timestamps));
                }
            }
        }
        Ok(())
    }

    fn print_history(&self) {
        for message in self.orchestrator.snapshot().messages() {
            println!("{}", format_message(message, self.show_timestamps));
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /new            start a new session");
    println!("  /sessions       list sessions");
    println!("  /switch <id>    open a session and load its history");
    println!("  /delete <id>    delete a session");
    println!("  /history        show the current conversation");
    println!("  /quit           exit");
}
