//! Parley - terminal chat client.
//!
//! Lines typed on stdin are sent as chat; a few slash commands control the
//! session. Server traffic and local notices are printed as they arrive.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use parley_client::{
    ChatClient, FileStore, Notice, Preferences, SessionConfig, SessionEvent, Theme,
};
use parley_shared::{highlight_mentions, ChatMessage, Segment};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  /connect <url> <nickname>   connect (http(s):// is rewritten to ws(s)://)
  /disconnect                 close the connection
  /nick <nickname>            change nickname
  /who                        list participants
  /servers                    recently used servers
  /theme                      toggle light/dark colours
  /quit                       exit";

#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Terminal client for a WebSocket chat room")]
struct Args {
    /// Server address, e.g. ws://localhost:8765
    #[arg(long, env = "PARLEY_URL")]
    url: Option<String>,

    /// Nickname to join with
    #[arg(long, short, env = "PARLEY_NICKNAME")]
    nickname: Option<String>,

    /// Directory for saved preferences (defaults to the platform config dir)
    #[arg(long, env = "PARLEY_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parley=info,parley_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = match args.config_dir {
        Some(dir) => Some(FileStore::new(dir)),
        None => FileStore::default_location(),
    };
    // The session persists connection details; the UI keeps its own view for the theme.
    let mut ui_prefs = store
        .clone()
        .map(Preferences::new)
        .unwrap_or_else(Preferences::in_memory);

    let url = args.url.or_else(|| ui_prefs.last_url());
    let nickname = args.nickname.or_else(|| ui_prefs.nickname());
    let mut renderer = Renderer {
        theme: ui_prefs.theme(),
    };

    let client = ChatClient::spawn(SessionConfig::from_env(), store.map(Preferences::new));
    let mut events = client.subscribe();

    println!("{HELP}");
    match (url, nickname) {
        (Some(url), Some(nickname)) => {
            // Failures are reported through the event stream.
            let _ = client.connect(url, nickname).await;
        }
        _ => println!("* use /connect <url> <nickname> to join a room"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&client, &mut ui_prefs, &mut renderer, &line).await {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => renderer.render(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "terminal fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let _ = client.disconnect();
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_line(
    client: &ChatClient,
    prefs: &mut Preferences,
    renderer: &mut Renderer,
    line: &str,
) -> bool {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("/quit") => return false,
        Some("/connect") => match (words.next(), words.next()) {
            (Some(url), Some(nickname)) => {
                let _ = client.connect(url, nickname).await;
            }
            _ => println!("* usage: /connect <url> <nickname>"),
        },
        Some("/disconnect") => {
            let _ = client.disconnect();
        }
        Some("/who") => {
            let snapshot = client.snapshot();
            println!(
                "* {} ({} online): {}",
                snapshot.state,
                snapshot.roster.len(),
                snapshot.roster.join(", ")
            );
        }
        Some("/servers") => {
            let recent = prefs.recent_servers();
            if recent.is_empty() {
                println!("* no recent servers");
            }
            for (i, url) in recent.iter().enumerate() {
                println!("* {}. {url}", i + 1);
            }
        }
        Some("/theme") => {
            renderer.theme = renderer.theme.toggle();
            prefs.set_theme(renderer.theme);
            println!("* theme: {:?}", renderer.theme);
        }
        Some("/help") => println!("{HELP}"),
        _ => {
            // `/nick`, chat and errors are all reported as session events.
            let _ = client.submit(line).await;
        }
    }
    true
}

struct Renderer {
    theme: Theme,
}

impl Renderer {
    const BOLD: &'static str = "\x1b[1m";
    const RESET: &'static str = "\x1b[0m";

    fn accent(&self) -> &'static str {
        match self.theme {
            Theme::Light => "\x1b[34m",
            Theme::Dark => "\x1b[36m",
        }
    }

    fn render(&self, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged { state } => println!("* [{state}]"),
            SessionEvent::IdentityChanged { nickname } => println!("* you are {nickname}"),
            SessionEvent::Chat { message, own } => println!("{}", self.chat_line(message, *own)),
            SessionEvent::System(notice) => {
                println!("{}* {}", stamp(notice.sent_at()), notice.content)
            }
            SessionEvent::Unrecognized { raw } => println!("Server: {raw}"),
            SessionEvent::RosterChanged { users } => {
                println!("* {} online: {}", users.len(), users.join(", "))
            }
            SessionEvent::TypingChanged { typing } if !typing.is_empty() => {
                println!("* {} typing...", typing.join(", "))
            }
            SessionEvent::TypingChanged { .. } => {}
            // A line-based terminal reports neither focus nor keystrokes, so the
            // session stays unfocused and every mention rings the bell.
            SessionEvent::NotificationRequested { sender, .. } => {
                println!("\x07* {sender} mentioned you")
            }
            SessionEvent::Notice(notice) => self.notice(notice),
        }
    }

    fn chat_line(&self, message: &ChatMessage, own: bool) -> String {
        let mut line = stamp(message.sent_at());
        if own {
            line.push_str(self.accent());
        }
        line.push_str(&format!("<{}>{} ", message.sender, Self::RESET));
        for segment in highlight_mentions(&message.content) {
            match segment {
                Segment::Text(text) => line.push_str(text),
                Segment::Mention(name) => {
                    line.push_str(&format!("{}@{name}{}", Self::BOLD, Self::RESET))
                }
            }
        }
        line
    }

    fn notice(&self, notice: &Notice) {
        if notice.is_error() {
            println!("! {notice}");
        } else {
            println!("* {notice}");
        }
    }
}

fn stamp(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map(|at| format!("[{}] ", at.with_timezone(&Local).format("%H:%M:%S")))
        .unwrap_or_default()
}
