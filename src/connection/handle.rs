//! Handle for driving a running connection manager.

use tokio::sync::{mpsc, oneshot, watch};
use valvewatch_types::{CanonicalReading, ConnectionMetrics, ConnectionState};

use crate::data::WindowStats;
use crate::error::{EndpointError, Stopped};
use crate::events::DebugEvent;

/// Requests processed by the connection manager's task.
#[derive(Debug)]
pub(crate) enum Command {
    Reconnect,
    Close,
    Send {
        text: String,
        reply: oneshot::Sender<bool>,
    },
    AddEndpoint {
        url: String,
        reply: oneshot::Sender<Result<(), EndpointError>>,
    },
    SwitchEndpoint {
        reply: oneshot::Sender<bool>,
    },
    SetAutoReconnect(bool),
    SetAlertsEnabled(bool),
    ClearData,
    Window {
        reply: oneshot::Sender<WindowView>,
    },
    DebugLog {
        reply: oneshot::Sender<Vec<DebugEvent>>,
    },
    Shutdown,
}

/// Contents of the display window at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowView {
    /// Readings oldest first.
    pub readings: Vec<CanonicalReading>,
    pub stats: Option<WindowStats>,
}

/// A cheap, cloneable handle to a running connection manager.
///
/// Obtain one from [`ConnectionManager::spawn`](super::ConnectionManager::spawn).
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use valvewatch::{ClientConfig, ConnectionManager, NullConsumer, WebSocketTransport};
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = ClientConfig::load(None)?;
/// let (handle, task) = ConnectionManager::spawn(
///     config,
///     Arc::new(WebSocketTransport::new()),
///     Box::new(NullConsumer),
/// );
///
/// println!("state: {}", handle.state().label());
/// handle.shutdown()?;
/// task.await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) state: watch::Receiver<ConnectionState>,
    pub(crate) metrics: watch::Receiver<ConnectionMetrics>,
}

impl ConnectionHandle {
    fn command(&self, command: Command) -> Result<(), Stopped> {
        self.commands.send(command).map_err(|_| Stopped)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, Stopped> {
        let (reply, response) = oneshot::channel();
        self.command(build(reply))?;
        response.await.map_err(|_| Stopped)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Latest published metrics.
    pub fn metrics(&self) -> ConnectionMetrics {
        self.metrics.borrow().clone()
    }

    /// A receiver that is notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn watch_metrics(&self) -> watch::Receiver<ConnectionMetrics> {
        self.metrics.clone()
    }

    /// Reset the attempt counter and connect now.
    pub fn reconnect(&self) -> Result<(), Stopped> {
        self.command(Command::Reconnect)
    }

    /// Close the connection without scheduling a reconnect.
    pub fn close(&self) -> Result<(), Stopped> {
        self.command(Command::Close)
    }

    /// Send a text frame. Resolves to `false` when the link is not open.
    pub async fn send(&self, text: impl Into<String>) -> Result<bool, Stopped> {
        let text = text.into();
        self.request(|reply| Command::Send { text, reply }).await
    }

    /// Add an endpoint, select it and reconnect to it shortly after.
    pub async fn add_endpoint(&self, url: impl Into<String>) -> Result<(), EndpointError> {
        let url = url.into();
        self.request(|reply| Command::AddEndpoint { url, reply }).await?
    }

    /// Move to the next endpoint and reconnect. Resolves to `false` when
    /// there is no other endpoint to move to.
    pub async fn switch_endpoint(&self) -> Result<bool, Stopped> {
        self.request(|reply| Command::SwitchEndpoint { reply }).await
    }

    pub fn set_auto_reconnect(&self, enabled: bool) -> Result<(), Stopped> {
        self.command(Command::SetAutoReconnect(enabled))
    }

    pub fn set_alerts_enabled(&self, enabled: bool) -> Result<(), Stopped> {
        self.command(Command::SetAlertsEnabled(enabled))
    }

    /// Drop queued and displayed readings.
    pub fn clear_data(&self) -> Result<(), Stopped> {
        self.command(Command::ClearData)
    }

    pub async fn window(&self) -> Result<WindowView, Stopped> {
        self.request(|reply| Command::Window { reply }).await
    }

    /// Retained diagnostic events, newest first.
    pub async fn debug_log(&self) -> Result<Vec<DebugEvent>, Stopped> {
        self.request(|reply| Command::DebugLog { reply }).await
    }

    /// Cancel every timer, flush, close the link and stop the task.
    pub fn shutdown(&self) -> Result<(), Stopped> {
        self.command(Command::Shutdown)
    }
}
