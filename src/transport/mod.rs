//! Transport abstraction for the telemetry feed.
//!
//! A [`Transport`] opens a [`Link`]: a pair of channels carrying UTF-8 text
//! frames to and from the remote end. The connection manager only ever sees
//! links, so the WebSocket implementation and the in-memory test transport
//! are interchangeable.

mod websocket;

pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Close code for a normal, requested shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the link dropped without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Frames sent towards the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Events delivered from the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Frame(String),
    /// A transport error. A `Closed` event always follows.
    Error(String),
    Closed { code: u16, reason: String },
}

/// An open connection, as seen by the connection manager.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// The far side of a [`Link`], driven by a transport's I/O task.
#[derive(Debug)]
pub struct RemoteEnd {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub inbound: mpsc::UnboundedSender<LinkEvent>,
}

impl Link {
    /// Create a connected link/remote pair.
    pub fn pair() -> (Link, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Link {
                outbound: out_tx,
                inbound: in_rx,
            },
            RemoteEnd {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }

    /// Queue a text frame. Returns `false` if the link has gone away.
    pub fn send_text(&self, text: String) -> bool {
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    /// Ask the remote end to close.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Something that can open links to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a link to `endpoint`. Resolves once the connection is open.
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError>;
}
