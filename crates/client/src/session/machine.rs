//! The session state machine.
//!
//! [`SessionMachine`] owns everything about one logical chat session: the
//! connection state, the generation of the current socket, the local
//! nickname, the roster, typing peers, and the typing and reconnect timers.
//! It performs no I/O of its own. Callers feed it user actions, socket
//! events and clock ticks; it drives its [`Transport`] and queues
//! [`SessionEvent`]s for subscribers.
//!
//! ```text
//!  Idle ──connect──▶ Connecting ──opened──▶ Connected
//!   ▲                   │   ▲                  │
//!   │                error  └──connect/retry───┤
//!   │                   ▼                      │ close
//!   └──(never)──── Errored ──close──▶ Closed ◀─┘
//! ```

use parley_shared::{decode, encode, InboundEvent, OutboundIntent};
use tokio::time::Instant;
use url::Url;

use super::events::{Notice, SessionEvent, SessionSnapshot};
use super::reconnect::ReconnectPolicy;
use super::typing::TypingDebouncer;
use crate::config::SessionConfig;
use crate::error::{SessionError, ValidationError};
use crate::stores::{ParticipantRoster, TypingSet};
use crate::ws::{ConnectionState, Generation, SocketEvent, SocketEventKind, Transport};

/// Where the session connects, and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// The address as the user entered it.
    pub url: String,
    /// `url` with `http`/`https` rewritten to `ws`/`wss`.
    pub ws_url: String,
    pub nickname: String,
}

impl ConnectTarget {
    pub fn new(url: &str, nickname: &str) -> Result<Self, ValidationError> {
        let ws_url = normalize_ws_url(url)?;
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(ValidationError::EmptyNickname);
        }
        Ok(Self {
            url: url.trim().to_string(),
            ws_url,
            nickname: nickname.to_string(),
        })
    }
}

/// Rewrite an `http(s)://` address to `ws(s)://` and check it parses.
pub fn normalize_ws_url(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }

    let rewritten = if let Some(rest) = raw.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = raw.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        raw.to_string()
    };

    let parsed = Url::parse(&rewritten).map_err(|e| ValidationError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(ValidationError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme `{}`", parsed.scheme()),
        });
    }
    Ok(rewritten)
}

pub struct SessionMachine<T> {
    transport: T,
    state: ConnectionState,
    generation: Generation,
    target: Option<ConnectTarget>,
    nickname: Option<String>,
    roster: ParticipantRoster,
    typing_peers: TypingSet,
    typing: TypingDebouncer,
    reconnect: ReconnectPolicy,
    /// Cleared by a manual disconnect, set again by `connect`.
    auto_reconnect: bool,
    focused: bool,
    events: Vec<SessionEvent>,
}

impl<T: Transport> SessionMachine<T> {
    pub fn new(transport: T, config: &SessionConfig) -> Self {
        Self {
            transport,
            state: ConnectionState::Idle,
            generation: Generation::default(),
            target: None,
            nickname: None,
            roster: ParticipantRoster::default(),
            typing_peers: TypingSet::default(),
            typing: TypingDebouncer::new(config.typing_quiet_period),
            reconnect: ReconnectPolicy::new(config.reconnect.clone()),
            auto_reconnect: false,
            focused: false,
            events: Vec::new(),
        }
    }

    // ── User actions ────────────────────────────────────────────────

    /// Start a fresh connection, superseding any live socket.
    pub fn connect(&mut self, url: &str, nickname: &str) -> Result<(), SessionError> {
        let target = match ConnectTarget::new(url, nickname) {
            Ok(target) => target,
            Err(e) => {
                tracing::info!(error = %e, "connect rejected");
                self.notice(Notice::Validation(e.clone()));
                return Err(e.into());
            }
        };

        self.reconnect.cancel();
        self.auto_reconnect = true;
        self.open(target);
        Ok(())
    }

    /// Close the session on the user's request. No retry follows.
    pub fn disconnect(&mut self) {
        self.auto_reconnect = false;
        self.reconnect.cancel();

        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Errored
        ) {
            return;
        }

        if self.state.is_connected() {
            if let Some(stop) = self.typing.force_stop() {
                self.send_or_log(stop);
            }
        }
        self.typing.reset();

        let generation = self.generation;
        tracing::info!(%generation, "disconnecting");
        self.transport.close(generation);
        // The close event for this socket is now stale.
        self.generation = generation.next();

        self.clear_presence();
        self.set_state(ConnectionState::Closed);
        self.notice(Notice::Disconnected);
    }

    /// Send a chat line. Blank text is ignored.
    pub fn send_chat(&mut self, text: &str) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        if !self.state.is_connected() {
            self.notice(Notice::NotConnected);
            return Err(SessionError::NotConnected);
        }

        if let Some(stop) = self.typing.force_stop() {
            self.send_intent(stop)?;
        }
        self.send_intent(OutboundIntent::chat(text))
    }

    /// Rename locally, and on the server when connected.
    pub fn set_nickname(&mut self, nickname: &str) -> Result<(), SessionError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            let e = ValidationError::EmptyNickname;
            self.notice(Notice::Validation(e.clone()));
            return Err(e.into());
        }

        if let Some(target) = self.target.as_mut() {
            target.nickname = nickname.to_string();
        }
        self.set_identity(nickname);

        if !self.state.is_connected() {
            self.typing.reset();
            self.notice(Notice::NicknameLocalOnly {
                nickname: nickname.to_string(),
            });
            return Ok(());
        }

        if let Some(stop) = self.typing.force_stop() {
            self.send_intent(stop)?;
        }
        self.send_intent(OutboundIntent::set_nickname(nickname))?;
        self.notice(Notice::NicknameChanged {
            nickname: nickname.to_string(),
        });
        Ok(())
    }

    /// The compose box changed.
    pub fn on_local_input(&mut self, now: Instant) {
        if !self.state.is_connected() {
            return;
        }
        if let Some(start) = self.typing.on_local_input(now) {
            self.send_or_log(start);
        }
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    /// The app came back to the foreground.
    pub fn visibility_regained(&mut self) {
        if !self.auto_reconnect || !self.reconnect.on_visibility_regained(self.state) {
            return;
        }
        if let Some(target) = self.target.clone() {
            tracing::info!(url = %target.ws_url, "visible again, reconnecting now");
            self.open(target);
        }
    }

    // ── Socket and clock ────────────────────────────────────────────

    pub fn handle_socket(&mut self, event: SocketEvent, now: Instant) {
        if event.generation != self.generation {
            tracing::debug!(
                event_generation = %event.generation,
                current = %self.generation,
                kind = ?event.kind,
                "discarding event from superseded socket"
            );
            return;
        }

        match event.kind {
            SocketEventKind::Opened => self.on_opened(),
            SocketEventKind::Frame(bytes) => self.on_frame(&bytes),
            SocketEventKind::Error(reason) => self.on_error(reason),
            SocketEventKind::Closed { clean } => self.on_closed(clean, now),
        }
    }

    /// Fire whichever timers are due.
    pub fn tick(&mut self, now: Instant) {
        if let Some(stop) = self.typing.poll(now) {
            if self.state.is_connected() {
                self.send_or_log(stop);
            }
        }

        if self.reconnect.poll(now) && !self.state.is_connected() {
            if let Some(target) = self.target.clone() {
                tracing::info!(
                    attempt = self.reconnect.attempts(),
                    url = %target.ws_url,
                    "retrying connection"
                );
                self.open(target);
            }
        }
    }

    /// The earliest instant at which [`Self::tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.typing.deadline(), self.reconnect.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Apply one decoded server frame.
    pub fn apply_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::UserList { users } => {
                if self.roster.replace(users) {
                    self.emit(SessionEvent::RosterChanged {
                        users: self.roster.users().to_vec(),
                    });
                }
                if self.typing_peers.prune(&self.roster) {
                    self.emit_typing();
                }
            }
            InboundEvent::Chat(message) => {
                let own = self.nickname.as_deref() == Some(message.sender.as_str());
                let mentioned = self
                    .nickname
                    .as_deref()
                    .is_some_and(|nickname| message.mentions(nickname));
                let notify = mentioned && !self.focused;
                let (sender, content) = (message.sender.clone(), message.content.clone());

                self.emit(SessionEvent::Chat { message, own });
                if notify {
                    self.emit(SessionEvent::NotificationRequested { sender, content });
                }
            }
            InboundEvent::System(notice) => {
                if let Some(nickname) = notice.welcome_nickname().map(str::to_string) {
                    if let Some(target) = self.target.as_mut() {
                        target.nickname = nickname.clone();
                    }
                    self.set_identity(&nickname);
                }
                self.emit(SessionEvent::System(notice));
            }
            InboundEvent::UserTyping { nickname } => {
                if self.nickname.as_deref() != Some(nickname.as_str())
                    && self.typing_peers.insert(&nickname)
                {
                    self.emit_typing();
                }
            }
            InboundEvent::UserStoppedTyping { nickname } => {
                if self.typing_peers.remove(&nickname) {
                    self.emit_typing();
                }
            }
            InboundEvent::Unrecognized { raw } => {
                self.emit(SessionEvent::Unrecognized { raw });
            }
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn target(&self) -> Option<&ConnectTarget> {
        self.target.as_ref()
    }

    pub fn roster(&self) -> &ParticipantRoster {
        &self.roster
    }

    pub fn typing_peers(&self) -> &TypingSet {
        &self.typing_peers
    }

    pub fn is_typing(&self) -> bool {
        self.typing.is_typing()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_active()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            generation: self.generation,
            nickname: self.nickname.clone(),
            roster: self.roster.users().to_vec(),
            typing: self.typing_peers.to_vec(),
        }
    }

    /// Take the events queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn open(&mut self, target: ConnectTarget) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Errored
        ) {
            tracing::debug!(generation = %self.generation, "closing superseded socket");
            self.transport.close(self.generation);
            self.clear_presence();
        }
        self.typing.reset();

        self.generation = self.generation.next();
        tracing::info!(generation = %self.generation, url = %target.ws_url, "connecting");
        self.transport.open(self.generation, &target.ws_url);
        self.target = Some(target);
        self.set_state(ConnectionState::Connecting);
    }

    fn on_opened(&mut self) {
        if self.state != ConnectionState::Connecting {
            tracing::warn!(state = %self.state, "socket opened in unexpected state");
            return;
        }
        let Some(target) = self.target.clone() else {
            return;
        };

        self.reconnect.on_connected();
        self.set_state(ConnectionState::Connected);
        self.set_identity(&target.nickname);
        self.notice(Notice::Connected { url: target.url });
        self.send_or_log(OutboundIntent::set_nickname(target.nickname));
    }

    fn on_frame(&mut self, bytes: &[u8]) {
        let event = match decode(bytes) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable frame, showing it verbatim");
                InboundEvent::Unrecognized {
                    raw: String::from_utf8_lossy(bytes).into_owned(),
                }
            }
        };
        if let InboundEvent::Unrecognized { raw } = &event {
            tracing::debug!(frame = %raw, "unrecognized frame");
        }
        self.apply_inbound(event);
    }

    fn on_error(&mut self, reason: String) {
        if !self.state.is_live() {
            return;
        }
        tracing::error!(generation = %self.generation, %reason, "transport error");
        self.set_state(ConnectionState::Errored);
        self.notice(Notice::TransportError { reason });
        self.transport.close(self.generation);
    }

    fn on_closed(&mut self, clean: bool, now: Instant) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Errored
        ) {
            return;
        }
        tracing::info!(generation = %self.generation, clean, "connection closed");

        self.transport.close(self.generation);
        self.typing.reset();
        self.clear_presence();
        self.set_state(ConnectionState::Closed);
        self.notice(Notice::Disconnected);

        if self.auto_reconnect {
            self.reconnect.on_disconnected(clean, now);
        }
    }

    fn send_intent(&mut self, intent: OutboundIntent) -> Result<(), SessionError> {
        let frame = encode(&intent)?;
        tracing::debug!(generation = %self.generation, %frame, "sending");
        self.transport.send(self.generation, frame)?;
        Ok(())
    }

    fn send_or_log(&mut self, intent: OutboundIntent) {
        let kind = intent.kind();
        if let Err(e) = self.send_intent(intent) {
            tracing::warn!(kind, error = %e, "failed to send frame");
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = %self.state, to = %state, "state change");
        self.state = state;
        self.emit(SessionEvent::StateChanged { state });
    }

    fn set_identity(&mut self, nickname: &str) {
        if self.nickname.as_deref() == Some(nickname) {
            return;
        }
        self.nickname = Some(nickname.to_string());
        self.emit(SessionEvent::IdentityChanged {
            nickname: nickname.to_string(),
        });
        if self.typing_peers.remove(nickname) {
            self.emit_typing();
        }
    }

    fn clear_presence(&mut self) {
        if self.roster.clear() {
            self.emit(SessionEvent::RosterChanged { users: Vec::new() });
        }
        if self.typing_peers.clear() {
            self.emit_typing();
        }
    }

    fn emit_typing(&mut self) {
        self.emit(SessionEvent::TypingChanged {
            typing: self.typing_peers.to_vec(),
        });
    }

    fn notice(&mut self, notice: Notice) {
        self.emit(SessionEvent::Notice(notice));
    }

    fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::{Call, FakeTransport};
    use crate::ws::ReconnectConfig;
    use std::time::Duration;

    const RETRY: Duration = Duration::from_millis(5000);
    const QUIET: Duration = Duration::from_millis(2000);

    fn machine() -> (SessionMachine<FakeTransport>, FakeTransport) {
        let transport = FakeTransport::default();
        let machine = SessionMachine::new(transport.clone(), &SessionConfig::default());
        (machine, transport)
    }

    /// Connect and let the socket open.
    fn connected(nickname: &str) -> (SessionMachine<FakeTransport>, FakeTransport, Generation) {
        let (mut m, t) = machine();
        m.connect("ws://host:1/chat", nickname).unwrap();
        let generation = open(&mut m, &t);
        m.drain_events();
        (m, t, generation)
    }

    fn open(m: &mut SessionMachine<FakeTransport>, t: &FakeTransport) -> Generation {
        let generation = t.last_opened();
        m.handle_socket(SocketEvent::new(generation, SocketEventKind::Opened), Instant::now());
        generation
    }

    fn frame(m: &mut SessionMachine<FakeTransport>, generation: Generation, json: &str) {
        m.handle_socket(
            SocketEvent::new(generation, SocketEventKind::Frame(json.as_bytes().to_vec())),
            Instant::now(),
        );
    }

    fn server_drop(
        m: &mut SessionMachine<FakeTransport>,
        t: &FakeTransport,
        generation: Generation,
        now: Instant,
    ) {
        t.drop_socket(generation);
        m.handle_socket(
            SocketEvent::new(generation, SocketEventKind::Closed { clean: true }),
            now,
        );
    }

    fn notices(events: &[SessionEvent]) -> Vec<Notice> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Notice(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn roster_and_typing_scenario() {
        let (mut m, t) = machine();
        m.connect("ws://host:1/chat", "Alice").unwrap();
        assert_eq!(m.state(), ConnectionState::Connecting);
        let g = open(&mut m, &t);

        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.nickname(), Some("Alice"));
        assert_eq!(
            t.sent_frames(),
            vec![r#"{"type":"set_nickname","nickname":"Alice"}"#.to_string()]
        );

        frame(&mut m, g, r#"{"type":"user_list","users":["Alice","Bob"]}"#);
        assert_eq!(m.roster().users(), ["Alice", "Bob"]);
        assert_eq!(m.roster().len(), 2);

        frame(&mut m, g, r#"{"type":"user_typing","nickname":"Bob"}"#);
        assert_eq!(m.typing_peers().to_vec(), vec!["Bob"]);

        m.drain_events();
        frame(&mut m, g, r#"{"type":"user_list","users":["Alice"]}"#);
        assert!(m.typing_peers().is_empty());
        assert_eq!(
            m.drain_events(),
            vec![
                SessionEvent::RosterChanged {
                    users: vec!["Alice".into()]
                },
                SessionEvent::TypingChanged { typing: vec![] },
            ]
        );
    }

    #[test]
    fn malformed_frame_is_shown_verbatim() {
        let (mut m, _t, g) = connected("Alice");
        frame(&mut m, g, r#"{"type":"user_list","users":["Alice"]}"#);
        let before = m.snapshot();
        m.drain_events();

        frame(&mut m, g, "not json");

        assert_eq!(m.snapshot(), before);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(
            m.drain_events(),
            vec![SessionEvent::Unrecognized {
                raw: "not json".into()
            }]
        );
    }

    #[test]
    fn invalid_utf8_frame_falls_back_to_lossy_text() {
        let (mut m, _t, g) = connected("Alice");
        m.handle_socket(
            SocketEvent::new(g, SocketEventKind::Frame(vec![b'h', b'i', 0xff])),
            Instant::now(),
        );
        assert_eq!(
            m.drain_events(),
            vec![SessionEvent::Unrecognized {
                raw: "hi\u{fffd}".into()
            }]
        );
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn connect_rejects_empty_input_without_state_change() {
        let (mut m, t) = machine();

        assert_eq!(
            m.connect("", "Alice"),
            Err(SessionError::Validation(ValidationError::EmptyUrl))
        );
        assert_eq!(
            m.connect("ws://host:1", "  "),
            Err(SessionError::Validation(ValidationError::EmptyNickname))
        );
        assert!(matches!(
            m.connect("ftp://host", "Alice"),
            Err(SessionError::Validation(ValidationError::InvalidUrl { .. }))
        ));

        assert_eq!(m.state(), ConnectionState::Idle);
        assert!(t.calls().is_empty());
        let events = m.drain_events();
        assert_eq!(notices(&events).len(), 3);
        assert!(notices(&events).iter().all(Notice::is_error));
    }

    #[test]
    fn http_schemes_are_rewritten() {
        assert_eq!(normalize_ws_url("http://host:8765/ws").unwrap(), "ws://host:8765/ws");
        assert_eq!(normalize_ws_url(" https://chat.example ").unwrap(), "wss://chat.example");
        assert_eq!(normalize_ws_url("wss://chat.example/ws").unwrap(), "wss://chat.example/ws");
        assert!(normalize_ws_url("not a url").is_err());

        let (mut m, t) = machine();
        m.connect("https://chat.example/ws", "Alice").unwrap();
        assert_eq!(
            t.calls(),
            vec![Call::Open {
                generation: m.generation(),
                url: "wss://chat.example/ws".into()
            }]
        );
        assert_eq!(m.target().unwrap().url, "https://chat.example/ws");
    }

    #[test]
    fn reconnect_supersedes_the_live_socket() {
        let (mut m, t, first) = connected("Alice");
        frame(&mut m, first, r#"{"type":"user_list","users":["Alice","Bob"]}"#);

        m.connect("ws://other:2", "Alice").unwrap();
        let second = t.last_opened();
        assert!(second > first);
        assert_eq!(t.open_count(), 1);
        assert_eq!(t.max_open(), 1);
        assert!(t.calls().contains(&Call::Close { generation: first }));
        assert!(m.roster().is_empty());

        // The old socket's late callbacks change nothing.
        let now = Instant::now();
        m.handle_socket(SocketEvent::new(first, SocketEventKind::Error("gone".into())), now);
        m.handle_socket(SocketEvent::new(first, SocketEventKind::Closed { clean: false }), now);
        frame(&mut m, first, r#"{"type":"user_list","users":["Mallory"]}"#);
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(m.roster().is_empty());
        assert!(!m.reconnect_pending());

        m.handle_socket(SocketEvent::new(second, SocketEventKind::Opened), now);
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn repeated_connects_never_leak_sockets() {
        let (mut m, t) = machine();
        for i in 0..5 {
            m.connect("ws://host:1", "Alice").unwrap();
            if i % 2 == 0 {
                open(&mut m, &t);
            }
        }
        assert_eq!(t.max_open(), 1);
        assert_eq!(t.open_count(), 1);
        assert_eq!(t.opened().len(), 5);
    }

    #[test]
    fn chat_requires_a_connection() {
        let (mut m, t) = machine();
        assert_eq!(m.send_chat("hello"), Err(SessionError::NotConnected));
        assert_eq!(notices(&m.drain_events()), vec![Notice::NotConnected]);
        assert!(t.sent_frames().is_empty());

        m.connect("ws://host:1", "Alice").unwrap();
        assert_eq!(m.send_chat("still connecting"), Err(SessionError::NotConnected));
    }

    #[test]
    fn blank_chat_is_ignored() {
        let (mut m, t, _g) = connected("Alice");
        t.clear();
        assert_eq!(m.send_chat("   "), Ok(()));
        assert!(t.sent_frames().is_empty());
    }

    #[test]
    fn chat_stops_typing_first() {
        let (mut m, t, _g) = connected("Alice");
        m.on_local_input(Instant::now());
        m.send_chat("hi @Bob").unwrap();

        assert_eq!(
            t.sent_types(),
            vec!["set_nickname", "typing_start", "typing_stop", "chat"]
        );
        assert_eq!(
            t.sent_frames().last().unwrap(),
            r#"{"type":"chat","content":"hi @Bob","mentions":["Bob"]}"#
        );
        assert!(!m.is_typing());
        assert_eq!(m.next_deadline(), None);
    }

    #[test]
    fn typing_stops_after_quiet_period() {
        let (mut m, t, _g) = connected("Alice");
        let start = Instant::now();
        for i in 0..5 {
            m.on_local_input(start + Duration::from_millis(i * 300));
        }
        let last = start + Duration::from_millis(4 * 300);
        assert_eq!(m.next_deadline(), Some(last + QUIET));

        m.tick(last + QUIET - Duration::from_millis(1));
        assert_eq!(t.sent_types(), vec!["set_nickname", "typing_start"]);

        m.tick(last + QUIET);
        assert_eq!(
            t.sent_types(),
            vec!["set_nickname", "typing_start", "typing_stop"]
        );
        assert_eq!(m.next_deadline(), None);
    }

    #[test]
    fn typing_is_ignored_while_offline() {
        let (mut m, t) = machine();
        m.on_local_input(Instant::now());
        assert!(!m.is_typing());
        assert!(t.calls().is_empty());
    }

    #[test]
    fn rename_while_connected_is_sent() {
        let (mut m, t, _g) = connected("Alice");
        m.on_local_input(Instant::now());
        m.set_nickname("Alicia").unwrap();

        assert_eq!(m.nickname(), Some("Alicia"));
        assert_eq!(
            t.sent_types(),
            vec!["set_nickname", "typing_start", "typing_stop", "set_nickname"]
        );
        let events = m.drain_events();
        assert!(events.contains(&SessionEvent::IdentityChanged {
            nickname: "Alicia".into()
        }));
        assert_eq!(
            notices(&events),
            vec![Notice::NicknameChanged {
                nickname: "Alicia".into()
            }]
        );
    }

    #[test]
    fn rename_while_offline_is_local_and_used_on_reconnect() {
        let (mut m, t, g) = connected("Alice");
        let now = Instant::now();
        server_drop(&mut m, &t, g, now);
        m.drain_events();
        t.clear();

        m.set_nickname("Alicia").unwrap();
        assert!(t.sent_frames().is_empty());
        assert_eq!(
            notices(&m.drain_events()),
            vec![Notice::NicknameLocalOnly {
                nickname: "Alicia".into()
            }]
        );

        m.tick(now + RETRY);
        open(&mut m, &t);
        assert_eq!(
            t.sent_frames(),
            vec![r#"{"type":"set_nickname","nickname":"Alicia"}"#.to_string()]
        );
    }

    #[test]
    fn empty_rename_is_rejected() {
        let (mut m, t, _g) = connected("Alice");
        t.clear();
        assert!(m.set_nickname(" ").is_err());
        assert_eq!(m.nickname(), Some("Alice"));
        assert!(t.sent_frames().is_empty());
    }

    #[test]
    fn retries_every_interval_until_connected() {
        let (mut m, t, g) = connected("Alice");
        let start = Instant::now();
        server_drop(&mut m, &t, g, start);
        assert_eq!(m.state(), ConnectionState::Closed);
        assert!(m.reconnect_pending());
        assert_eq!(m.next_deadline(), Some(start + RETRY));

        m.tick(start + RETRY - Duration::from_millis(1));
        assert_eq!(t.opened().len(), 1);

        // First retry fails outright.
        m.tick(start + RETRY);
        let retry = t.last_opened();
        assert_eq!(t.opened().len(), 2);
        assert_eq!(m.state(), ConnectionState::Connecting);
        m.handle_socket(
            SocketEvent::new(retry, SocketEventKind::Error("refused".into())),
            start + RETRY,
        );
        assert_eq!(m.state(), ConnectionState::Errored);
        m.handle_socket(
            SocketEvent::new(retry, SocketEventKind::Closed { clean: false }),
            start + RETRY,
        );
        assert_eq!(m.state(), ConnectionState::Closed);
        assert_eq!(m.next_deadline(), Some(start + RETRY * 2));

        // Second retry succeeds with the last url and nickname.
        m.tick(start + RETRY * 2);
        assert_eq!(t.opened().len(), 3);
        assert!(t.calls().contains(&Call::Open {
            generation: t.last_opened(),
            url: "ws://host:1/chat".into()
        }));
        open(&mut m, &t);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert!(!m.reconnect_pending());

        m.tick(start + RETRY * 10);
        assert_eq!(t.opened().len(), 3);
        assert_eq!(t.max_open(), 1);
    }

    #[test]
    fn manual_connect_cancels_pending_retry() {
        let (mut m, t, g) = connected("Alice");
        let now = Instant::now();
        server_drop(&mut m, &t, g, now);
        assert!(m.reconnect_pending());

        m.connect("ws://host:1/chat", "Alice").unwrap();
        assert!(!m.reconnect_pending());
        m.tick(now + RETRY);
        assert_eq!(t.opened().len(), 2);
    }

    #[test]
    fn errored_transitions_through_to_closed_and_retries() {
        let (mut m, t, g) = connected("Alice");
        let now = Instant::now();
        m.handle_socket(SocketEvent::new(g, SocketEventKind::Error("reset".into())), now);
        assert_eq!(m.state(), ConnectionState::Errored);
        assert!(t.calls().contains(&Call::Close { generation: g }));

        m.handle_socket(SocketEvent::new(g, SocketEventKind::Closed { clean: false }), now);
        assert_eq!(m.state(), ConnectionState::Closed);
        assert!(m.reconnect_pending());

        let events = m.drain_events();
        assert_eq!(
            events
                .iter()
                .filter_map(|e| match e {
                    SessionEvent::StateChanged { state } => Some(*state),
                    _ => None,
                })
                .collect::<Vec<_>>(),
            vec![ConnectionState::Errored, ConnectionState::Closed]
        );
        assert_eq!(
            notices(&events),
            vec![
                Notice::TransportError {
                    reason: "reset".into()
                },
                Notice::Disconnected
            ]
        );
    }

    #[test]
    fn manual_disconnect_stops_typing_and_does_not_retry() {
        let (mut m, t, g) = connected("Alice");
        let now = Instant::now();
        m.on_local_input(now);
        m.disconnect();

        assert_eq!(
            t.calls()[t.calls().len() - 2..],
            [
                Call::Send {
                    generation: g,
                    frame: r#"{"type":"typing_stop"}"#.into()
                },
                Call::Close { generation: g },
            ]
        );
        assert_eq!(m.state(), ConnectionState::Closed);

        // The socket's own close arrives afterwards and is ignored.
        m.handle_socket(SocketEvent::new(g, SocketEventKind::Closed { clean: true }), now);
        assert!(!m.reconnect_pending());
        m.tick(now + RETRY * 3);
        m.visibility_regained();
        assert_eq!(t.opened().len(), 1);
        assert_eq!(m.next_deadline(), None);
    }

    #[test]
    fn visibility_regained_reconnects_immediately() {
        let (mut m, t, g) = connected("Alice");
        m.visibility_regained();
        assert_eq!(t.opened().len(), 1);

        let now = Instant::now();
        server_drop(&mut m, &t, g, now);
        assert!(m.reconnect_pending());

        m.visibility_regained();
        assert_eq!(t.opened().len(), 2);
        assert!(!m.reconnect_pending());
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn visibility_before_any_connect_does_nothing() {
        let (mut m, t) = machine();
        m.visibility_regained();
        assert!(t.calls().is_empty());
        assert_eq!(m.state(), ConnectionState::Idle);
    }

    #[test]
    fn bounded_reconnect_config_gives_up() {
        let transport = FakeTransport::default();
        let config = SessionConfig {
            reconnect: ReconnectConfig {
                max_attempts: 1,
                ..ReconnectConfig::default()
            },
            ..SessionConfig::default()
        };
        let mut m = SessionMachine::new(transport.clone(), &config);
        m.connect("ws://host:1", "Alice").unwrap();
        let g = open(&mut m, &transport);
        let now = Instant::now();
        server_drop(&mut m, &transport, g, now);

        m.tick(now + RETRY);
        let retry = transport.last_opened();
        server_drop(&mut m, &transport, retry, now + RETRY);
        assert!(!m.reconnect_pending());
        m.tick(now + RETRY * 5);
        assert_eq!(transport.opened().len(), 2);
    }

    #[test]
    fn mentions_request_notification_only_when_unfocused() {
        let (mut m, _t, g) = connected("Alice");
        let mention = r#"{"type":"chat","sender":"Bob","content":"hi @Alice","timestamp":"2024-05-01T12:00:00Z","mentions":["Alice"]}"#;

        frame(&mut m, g, mention);
        let events = m.drain_events();
        assert!(matches!(&events[0], SessionEvent::Chat { own: false, .. }));
        assert_eq!(
            events[1],
            SessionEvent::NotificationRequested {
                sender: "Bob".into(),
                content: "hi @Alice".into()
            }
        );

        m.set_focused(true);
        frame(&mut m, g, mention);
        assert_eq!(m.drain_events().len(), 1);

        m.set_focused(false);
        frame(&mut m, g, r#"{"type":"chat","sender":"Bob","content":"hi @Carol","mentions":["Carol"]}"#);
        assert_eq!(m.drain_events().len(), 1);
    }

    #[test]
    fn own_messages_are_flagged() {
        let (mut m, _t, g) = connected("Alice");
        frame(&mut m, g, r#"{"type":"chat","sender":"Alice","content":"me"}"#);
        assert!(matches!(
            m.drain_events().as_slice(),
            [SessionEvent::Chat { own: true, .. }]
        ));
    }

    #[test]
    fn own_typing_is_never_tracked() {
        let (mut m, _t, g) = connected("Alice");
        frame(&mut m, g, r#"{"type":"user_typing","nickname":"Alice"}"#);
        assert!(m.typing_peers().is_empty());
        assert!(m.drain_events().is_empty());

        frame(&mut m, g, r#"{"type":"user_typing","nickname":"Bob"}"#);
        frame(&mut m, g, r#"{"type":"user_stopped_typing","nickname":"Bob"}"#);
        assert!(m.typing_peers().is_empty());
        assert_eq!(m.drain_events().len(), 2);
    }

    #[test]
    fn welcome_line_confirms_identity() {
        let (mut m, _t, g) = connected("Alice");
        frame(&mut m, g, r#"{"type":"user_typing","nickname":"Alice2"}"#);
        frame(
            &mut m,
            g,
            r#"{"type":"system","content":"환영합니다, Alice2님!","timestamp":"2024-05-01T12:00:00Z"}"#,
        );
        assert_eq!(m.nickname(), Some("Alice2"));
        assert_eq!(m.target().unwrap().nickname, "Alice2");
        assert!(m.typing_peers().is_empty());
    }

    #[test]
    fn fresh_connect_cancels_typing_timer() {
        let (mut m, _t, _g) = connected("Alice");
        m.on_local_input(Instant::now());
        assert!(m.next_deadline().is_some());

        m.connect("ws://host:1/chat", "Alice").unwrap();
        assert!(!m.is_typing());
        assert_eq!(m.next_deadline(), None);
    }

    #[test]
    fn close_clears_presence() {
        let (mut m, t, g) = connected("Alice");
        frame(&mut m, g, r#"{"type":"user_list","users":["Alice","Bob"]}"#);
        frame(&mut m, g, r#"{"type":"user_typing","nickname":"Bob"}"#);
        server_drop(&mut m, &t, g, Instant::now());
        assert!(m.roster().is_empty());
        assert!(m.typing_peers().is_empty());
        assert_eq!(m.nickname(), Some("Alice"));
    }
}
