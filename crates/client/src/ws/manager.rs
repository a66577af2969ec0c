//! The session façade used by the UI.
//!
//! [`ChatClient`] is a cheap, cloneable handle. All session state lives in a
//! single driver task that owns the [`SessionMachine`]; user actions,
//! socket events and timer deadlines are handled there one at a time, so the
//! machine never needs a lock.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::Instant;

use super::connection::{ConnectionState, SocketEvent, Transport, WsTransport};
use crate::compose::Submission;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::{Notice, SessionEvent, SessionMachine, SessionSnapshot};
use crate::storage::Preferences;

type Reply = oneshot::Sender<Result<(), SessionError>>;

enum Command {
    Connect {
        url: String,
        nickname: String,
        reply: Reply,
    },
    Disconnect,
    SendChat {
        text: String,
        reply: Reply,
    },
    SetNickname {
        nickname: String,
        reply: Reply,
    },
    Submit {
        input: String,
        reply: Reply,
    },
    LocalInput,
    SetFocused(bool),
    VisibilityRegained,
}

/// Handle to a running chat session.
#[derive(Clone)]
pub struct ChatClient {
    commands: UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl ChatClient {
    /// Start a session backed by real WebSockets.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: SessionConfig, prefs: Option<Preferences>) -> Self {
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        Self::with_transport(config, prefs, WsTransport::new(socket_tx), socket_rx)
    }

    /// Start a session over any transport that reports into `socket_events`.
    pub fn with_transport<T>(
        config: SessionConfig,
        prefs: Option<Preferences>,
        transport: T,
        socket_events: UnboundedReceiver<SocketEvent>,
    ) -> Self
    where
        T: Transport + Send + 'static,
    {
        let machine = SessionMachine::new(transport, &config);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (snapshot_tx, snapshot) = watch::channel(machine.snapshot());

        let driver = Driver {
            machine,
            prefs,
            events: events.clone(),
            snapshot: snapshot_tx,
        };
        tokio::spawn(driver.run(command_rx, socket_events));

        Self {
            commands,
            events,
            snapshot,
        }
    }

    /// Connect as `nickname`, replacing any current connection.
    ///
    /// Resolves once the attempt has started; watch for
    /// [`SessionEvent::StateChanged`] to learn when it is open.
    pub async fn connect(
        &self,
        url: impl Into<String>,
        nickname: impl Into<String>,
    ) -> Result<(), SessionError> {
        let (url, nickname) = (url.into(), nickname.into());
        self.request(|reply| Command::Connect {
            url,
            nickname,
            reply,
        })
        .await
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| Command::SendChat { text, reply }).await
    }

    pub async fn set_nickname(&self, nickname: impl Into<String>) -> Result<(), SessionError> {
        let nickname = nickname.into();
        self.request(|reply| Command::SetNickname { nickname, reply })
            .await
    }

    /// Handle a compose-box submission: `/nick <name>` renames, anything
    /// else is sent as chat.
    pub async fn submit(&self, input: impl Into<String>) -> Result<(), SessionError> {
        let input = input.into();
        self.request(|reply| Command::Submit { input, reply }).await
    }

    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.send(Command::Disconnect)
    }

    /// The compose box changed.
    pub fn local_input(&self) -> Result<(), SessionError> {
        self.send(Command::LocalInput)
    }

    /// Mentions only request a notification while unfocused.
    pub fn set_focused(&self, focused: bool) -> Result<(), SessionError> {
        self.send(Command::SetFocused(focused))
    }

    pub fn visibility_regained(&self) -> Result<(), SessionError> {
        self.send(Command::VisibilityRegained)
    }

    /// Events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that wakes whenever the snapshot changes.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Closed)
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response.await.map_err(|_| SessionError::Closed)?
    }
}

/// Owns the session; the only place it is mutated.
struct Driver<T> {
    machine: SessionMachine<T>,
    prefs: Option<Preferences>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl<T: Transport> Driver<T> {
    async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command>,
        mut sockets: UnboundedReceiver<SocketEvent>,
    ) {
        tracing::debug!("session driver started");
        loop {
            let deadline = self.machine.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        // Every handle is gone.
                        self.machine.disconnect();
                        self.flush();
                        break;
                    }
                },
                Some(event) = sockets.recv() => {
                    self.machine.handle_socket(event, Instant::now());
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.machine.tick(Instant::now());
                }
            }
            self.flush();
        }
        tracing::debug!("session driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                url,
                nickname,
                reply,
            } => {
                let _ = reply.send(self.machine.connect(&url, &nickname));
            }
            Command::Disconnect => self.machine.disconnect(),
            Command::SendChat { text, reply } => {
                let _ = reply.send(self.machine.send_chat(&text));
            }
            Command::SetNickname { nickname, reply } => {
                let _ = reply.send(self.machine.set_nickname(&nickname));
            }
            Command::Submit { input, reply } => {
                let result = match Submission::parse(&input) {
                    Submission::Rename(nickname) => self.machine.set_nickname(nickname),
                    Submission::RenameUsage => {
                        self.publish(SessionEvent::Notice(Notice::NicknameUsage));
                        Ok(())
                    }
                    Submission::Chat(text) => self.machine.send_chat(text),
                    Submission::Empty => Ok(()),
                };
                let _ = reply.send(result);
            }
            Command::LocalInput => self.machine.on_local_input(Instant::now()),
            Command::SetFocused(focused) => self.machine.set_focused(focused),
            Command::VisibilityRegained => self.machine.visibility_regained(),
        }
    }

    /// Re-project, persist and broadcast after each handled input.
    ///
    /// The snapshot is updated first so subscribers reacting to an event
    /// already see the state it produced.
    fn flush(&mut self) {
        let snapshot = self.machine.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        for event in self.machine.drain_events() {
            self.persist(&event);
            self.publish(event);
        }
    }

    fn persist(&mut self, event: &SessionEvent) {
        let Some(prefs) = self.prefs.as_mut() else {
            return;
        };
        match event {
            SessionEvent::Notice(Notice::Connected { url }) => {
                if let Some(nickname) = self.machine.nickname() {
                    prefs.remember_connection(url, nickname);
                }
            }
            SessionEvent::IdentityChanged { nickname } => {
                prefs.set_nickname(nickname);
            }
            _ => {}
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
