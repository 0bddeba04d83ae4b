//! WebSocket transport.
//!
//! Each link is backed by one spawned task that owns the socket, forwarding
//! outbound frames and translating socket messages into [`LinkEvent`]s.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{Link, LinkEvent, Outbound, RemoteEnd, Transport, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use crate::error::TransportError;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Transport over `ws://` and `wss://` URLs.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        let (socket, _response) = connect_async(endpoint)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(endpoint, "websocket handshake complete");

        let (link, remote) = Link::pair();
        tokio::spawn(run_socket(socket, remote));
        Ok(link)
    }
}

async fn run_socket(socket: Socket, remote: RemoteEnd) {
    let RemoteEnd {
        outbound: mut out_rx,
        inbound: events,
    } = remote;
    let (mut write, mut read) = socket.split();

    let (code, reason) = loop {
        tokio::select! {
            outbound = out_rx.recv() => {
                let (code, reason) = match outbound {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            break fail(&events, e);
                        }
                        continue;
                    }
                    Some(Outbound::Close { code, reason }) => (code, reason),
                    // The manager dropped the link.
                    None => (NORMAL_CLOSURE, String::new()),
                };
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.clone().into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    debug!(error = %e, "close frame not delivered");
                }
                break (code, reason);
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(LinkEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        let _ = events.send(LinkEvent::Frame(text));
                    }
                    Err(_) => warn!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((NORMAL_CLOSURE, String::new()));
                }
                // Ping/pong is answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => break fail(&events, e),
                None => break (ABNORMAL_CLOSURE, "stream ended".to_string()),
            },
        }
    };

    let _ = events.send(LinkEvent::Closed { code, reason });
}

/// Report a socket error and produce the abnormal close that follows it.
fn fail(
    events: &tokio::sync::mpsc::UnboundedSender<LinkEvent>,
    error: tokio_tungstenite::tungstenite::Error,
) -> (u16, String) {
    let error = TransportError::Io(error.to_string());
    let _ = events.send(LinkEvent::Error(error.to_string()));
    (ABNORMAL_CLOSURE, error.to_string())
}
