//! Native WebSocket transport using tokio-tungstenite.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Generation, SocketEvent, SocketEventKind, Transport};
use crate::error::TransportError;

enum Outgoing {
    Frame(String),
    Close,
}

/// Writer side of the one live socket.
struct Link {
    generation: Generation,
    outgoing: UnboundedSender<Outgoing>,
}

/// Opens one tokio task per connection attempt and reports back over `events`.
pub struct WsTransport {
    events: UnboundedSender<SocketEvent>,
    link: Option<Link>,
}

impl WsTransport {
    pub fn new(events: UnboundedSender<SocketEvent>) -> Self {
        Self { events, link: None }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, generation: Generation, url: &str) {
        if let Some(previous) = self.link.take() {
            tracing::debug!(generation = %previous.generation, "closing superseded socket");
            let _ = previous.outgoing.send(Outgoing::Close);
        }

        let (outgoing, receiver) = mpsc::unbounded_channel();
        self.link = Some(Link {
            generation,
            outgoing,
        });

        tokio::spawn(run_socket(
            generation,
            url.to_string(),
            receiver,
            self.events.clone(),
        ));
    }

    fn send(&mut self, generation: Generation, frame: String) -> Result<(), TransportError> {
        let link = self
            .link
            .as_ref()
            .filter(|link| link.generation == generation)
            .ok_or(TransportError::NotOpen(generation))?;
        link.outgoing
            .send(Outgoing::Frame(frame))
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn close(&mut self, generation: Generation) {
        if self
            .link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
        {
            if let Some(link) = self.link.take() {
                let _ = link.outgoing.send(Outgoing::Close);
            }
        }
    }
}

/// Drive one socket from connect to close.
async fn run_socket(
    generation: Generation,
    url: String,
    mut outgoing: UnboundedReceiver<Outgoing>,
    events: UnboundedSender<SocketEvent>,
) {
    let emit = |kind: SocketEventKind| {
        // The driver is gone; nothing left to tell.
        let _ = events.send(SocketEvent::new(generation, kind));
    };

    // A close requested mid-handshake drops the pending connection with it.
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = wait_for_close(&mut outgoing) => {
            tracing::info!(%generation, %url, "WebSocket connect abandoned");
            emit(SocketEventKind::Closed { clean: true });
            return;
        }
    };
    let ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            tracing::error!(%generation, %url, error = %e, "WebSocket connect failed");
            emit(SocketEventKind::Error(e.to_string()));
            emit(SocketEventKind::Closed { clean: false });
            return;
        }
    };

    tracing::info!(%generation, %url, "WebSocket connected");
    emit(SocketEventKind::Opened);

    let (mut write, mut read) = ws_stream.split();

    let clean = loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(%generation, frame = %text.as_str(), "WebSocket received");
                    emit(SocketEventKind::Frame(text.as_str().as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    emit(SocketEventKind::Frame(data.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(%generation, ?frame, "WebSocket received close frame");
                    break true;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite.
                }
                Some(Err(e)) => {
                    tracing::error!(%generation, error = %e, "WebSocket read error");
                    emit(SocketEventKind::Error(e.to_string()));
                    break false;
                }
                None => break true,
            },
            out = outgoing.recv() => match out {
                Some(Outgoing::Frame(json)) => {
                    tracing::debug!(%generation, frame = %json, "WebSocket sending");
                    if let Err(e) = write.send(Message::Text(json.into())).await {
                        tracing::error!(%generation, error = %e, "WebSocket send failed");
                        emit(SocketEventKind::Error(e.to_string()));
                        break false;
                    }
                }
                Some(Outgoing::Close) | None => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(%generation, error = %e, "close frame not delivered");
                    }
                    break true;
                }
            },
        }
    };

    tracing::info!(%generation, clean, "WebSocket closed");
    emit(SocketEventKind::Closed { clean });
}

/// Resolves once the session asks this socket to close, or drops it.
async fn wait_for_close(outgoing: &mut UnboundedReceiver<Outgoing>) {
    while let Some(Outgoing::Frame(_)) = outgoing.recv().await {
        tracing::debug!("dropping frame queued before the socket opened");
    }
}
