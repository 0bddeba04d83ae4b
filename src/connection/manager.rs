//! The connection manager task.
//!
//! One task owns the link, the pipeline, the endpoint list, the attempt
//! counter and every timer. Commands, timer reports, connect results and
//! link events are all handled one at a time from a single `select!` loop,
//! so none of that state needs a lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use valvewatch_types::{ConnectionMetrics, ConnectionState, EventCategory};

use super::backoff::Backoff;
use super::endpoints::EndpointList;
use super::handle::{Command, ConnectionHandle, WindowView};
use super::scheduler::{Fired, Scheduler, Task};
use crate::config::ClientConfig;
use crate::consumer::Consumer;
use crate::data::AlertEvent;
use crate::error::{EndpointError, TransportError};
use crate::events::DebugLog;
use crate::pipeline::{Flushed, Ingest, Pipeline};
use crate::transport::{Link, LinkEvent, Transport, ABNORMAL_CLOSURE, NORMAL_CLOSURE};

/// Quiet period before an alert is echoed to the log.
const ALERT_ECHO_DELAY: Duration = Duration::from_secs(10);

/// Frame text kept in decode-failure diagnostics.
const FRAME_PREVIEW: usize = 200;

/// Result of one spawned connect attempt.
#[derive(Debug)]
struct ConnectOutcome {
    attempt: u64,
    result: Result<Link, TransportError>,
}

/// One unit of work for the manager loop.
enum Step {
    Command(Option<Command>),
    Timer(Fired),
    Connected(ConnectOutcome),
    Link(LinkEvent),
}

pub struct ConnectionManager {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    consumer: Box<dyn Consumer>,
    pipeline: Pipeline,
    endpoints: EndpointList,
    backoff: Backoff,
    scheduler: Scheduler,
    timers: mpsc::UnboundedReceiver<Fired>,
    commands: mpsc::UnboundedReceiver<Command>,
    outcomes_tx: mpsc::UnboundedSender<ConnectOutcome>,
    outcomes: mpsc::UnboundedReceiver<ConnectOutcome>,
    connect_task: Option<JoinHandle<()>>,
    connect_seq: u64,
    link: Option<Link>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    metrics_tx: watch::Sender<ConnectionMetrics>,
    attempts: u32,
    auto_reconnect: bool,
    last_ping: Option<Instant>,
    pending_echo: Option<AlertEvent>,
    running: bool,
}

impl ConnectionManager {
    /// Start a connection manager on the current tokio runtime.
    ///
    /// The manager connects immediately. It stops when
    /// [`ConnectionHandle::shutdown`] is called or every handle is dropped.
    pub fn spawn(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        consumer: Box<dyn Consumer>,
    ) -> (ConnectionHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (metrics_tx, metrics_rx) = watch::channel(ConnectionMetrics::default());
        let (outcomes_tx, outcomes) = mpsc::unbounded_channel();
        let (scheduler, timers) = Scheduler::new();

        let manager = Self {
            pipeline: Pipeline::new(&config),
            endpoints: EndpointList::new(config.endpoints.clone(), config.endpoint_rotation),
            backoff: Backoff::from_config(&config.reconnect),
            auto_reconnect: config.auto_reconnect,
            config,
            transport,
            consumer,
            scheduler,
            timers,
            commands,
            outcomes_tx,
            outcomes,
            connect_task: None,
            connect_seq: 0,
            link: None,
            state: ConnectionState::Disconnected,
            state_tx,
            metrics_tx,
            attempts: 0,
            last_ping: None,
            pending_echo: None,
            running: true,
        };

        let handle = ConnectionHandle {
            commands: commands_tx,
            state: state_rx,
            metrics: metrics_rx,
        };
        (handle, tokio::spawn(manager.run()))
    }

    async fn run(mut self) {
        self.scheduler.every(Task::BatchFlush, self.config.batch_interval());
        let data = json!({
            "endpoints": self.endpoints.urls(),
            "coilPolicy": self.config.coil.policy,
            "autoReconnect": self.auto_reconnect,
        });
        self.log()
            .info_with(EventCategory::Config, "Client started", data);
        self.connect();
        self.publish();

        while self.running {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(fired) = self.timers.recv() => Step::Timer(fired),
                Some(outcome) = self.outcomes.recv() => Step::Connected(outcome),
                event = next_link_event(&mut self.link) => Step::Link(event),
            };

            match step {
                Step::Command(Some(command)) => self.on_command(command),
                Step::Command(None) => self.shutdown(),
                Step::Timer(fired) => {
                    if self.scheduler.accept(fired) {
                        self.on_timer(fired.task);
                    }
                }
                Step::Connected(outcome) => self.on_connect_outcome(outcome),
                Step::Link(event) => self.on_link_event(event),
            }
            self.publish();
        }

        tracing::debug!("connection manager stopped");
    }

    fn log(&mut self) -> &mut DebugLog {
        self.pipeline.log_mut()
    }

    fn publish(&mut self) {
        for event in self.pipeline.log_mut().take_unpublished() {
            self.consumer.on_debug_log(&event);
        }
        let snapshot = self.pipeline.metrics().snapshot(std_now());
        self.metrics_tx.send_if_modified(|current| {
            let changed = *current != snapshot;
            *current = snapshot;
            changed
        });
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.state_tx.send_replace(state);
        self.consumer.on_status_change(state);
    }

    fn max_attempts(&self) -> u32 {
        self.config.reconnect.max_attempts
    }

    fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
        self.pipeline.metrics_mut().set_reconnect_attempts(attempts);
    }

    // Lifecycle

    fn connect(&mut self) {
        if self.attempts >= self.max_attempts() {
            let data = json!({
                "attempts": self.attempts,
                "endpoint": self.endpoints.current(),
            });
            self.log().critical(
                EventCategory::Connection,
                "Maximum reconnect attempts reached",
                data,
            );
            self.fail_over(self.config.failover.from_connect_ms);
            return;
        }

        self.teardown();
        let endpoint = self.endpoints.current().to_string();
        self.pipeline.metrics_mut().set_active_endpoint(&endpoint);
        self.set_state(ConnectionState::Connecting);

        let data = json!({
            "endpoint": endpoint,
            "index": self.endpoints.index(),
            "attempt": self.attempts + 1,
            "maxAttempts": self.max_attempts(),
        });
        self.log()
            .info_with(EventCategory::Connection, "Connecting", data);

        self.connect_seq += 1;
        let attempt = self.connect_seq;
        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes_tx.clone();
        self.connect_task = Some(tokio::spawn(async move {
            let result = transport.connect(&endpoint).await;
            let _ = outcomes.send(ConnectOutcome { attempt, result });
        }));
        self.scheduler
            .once(Task::ConnectTimeout, self.config.connection_timeout());
    }

    /// Drop the current link and every connection timer.
    fn teardown(&mut self) {
        self.scheduler.cancel_many(Task::CONNECTION);
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        if let Some(link) = self.link.take() {
            link.close(NORMAL_CLOSURE, "Reconnecting");
        }
        self.last_ping = None;
        self.pipeline.metrics_mut().mark_disconnected();
    }

    /// Move to the next endpoint and retry after `delay_ms`.
    fn fail_over(&mut self, delay_ms: u64) -> bool {
        let from = self.endpoints.current().to_string();
        if !self.endpoints.rotate() {
            let data = json!({
                "endpoint": from,
                "rotation": self.config.endpoint_rotation,
                "endpoints": self.endpoints.len(),
            });
            self.log().critical(
                EventCategory::Connection,
                "All endpoints exhausted; staying disconnected until a manual reconnect",
                data,
            );
            self.set_state(ConnectionState::Disconnected);
            return false;
        }

        self.set_attempts(0);
        let to = self.endpoints.current().to_string();
        self.pipeline.metrics_mut().set_active_endpoint(&to);
        let data = json!({
            "from": from,
            "to": to,
            "index": self.endpoints.index(),
            "failures": self.endpoints.failures(&from),
            "delayMs": delay_ms,
        });
        self.log()
            .warn(EventCategory::Config, "Failing over to next endpoint", data);
        self.scheduler
            .once(Task::Reconnect, Duration::from_millis(delay_ms));
        self.set_state(ConnectionState::ReconnectScheduled);
        true
    }

    fn on_connect_outcome(&mut self, outcome: ConnectOutcome) {
        if outcome.attempt != self.connect_seq || self.state != ConnectionState::Connecting {
            if let Ok(link) = outcome.result {
                link.close(NORMAL_CLOSURE, "Superseded connection");
            }
            return;
        }
        self.connect_task = None;

        match outcome.result {
            Ok(link) => {
                self.link = Some(link);
                self.on_open();
            }
            Err(e) => {
                let reason = e.to_string();
                self.on_error(&reason);
                self.on_close(ABNORMAL_CLOSURE, &reason);
            }
        }
    }

    fn on_open(&mut self) {
        self.scheduler.cancel(Task::ConnectTimeout);
        self.set_attempts(0);
        self.endpoints.mark_open();
        self.pipeline.metrics_mut().mark_connected(std_now());
        self.set_state(ConnectionState::Open);

        let data = json!({
            "endpoint": self.endpoints.current(),
            "index": self.endpoints.index(),
        });
        self.log()
            .info_with(EventCategory::Connection, "Connected", data);

        self.scheduler
            .every(Task::Heartbeat, self.config.heartbeat_interval());
        self.scheduler
            .every(Task::MetricsSample, self.config.performance_throttle());
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Frame(text) => self.on_message(&text),
            LinkEvent::Error(error) => self.on_error(&error),
            LinkEvent::Closed { code, reason } => {
                self.link = None;
                self.on_close(code, &reason);
            }
        }
    }

    fn on_message(&mut self, text: &str) {
        let envelope: Value = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                let preview: String = text.chars().take(FRAME_PREVIEW).collect();
                self.log().warn(
                    EventCategory::Error,
                    "Failed to decode frame",
                    json!({ "error": e.to_string(), "frame": preview }),
                );
                return;
            }
        };

        if envelope.get("type").and_then(Value::as_str) == Some("pong") {
            self.on_pong();
            return;
        }

        let outcome = self.pipeline.ingest(&envelope, std_now(), now_ms());
        if let Ingest::Queued {
            coil_hold: Some(hold),
        } = outcome
        {
            self.scheduler.once(Task::CoilCommit, hold);
        }

        if self.pipeline.needs_relief() {
            let queued = self.pipeline.queued();
            self.log().warn(
                EventCategory::Performance,
                "Queue high-water mark reached; flushing early",
                json!({ "queued": queued }),
            );
            self.flush();
        }
    }

    /// Heartbeat replies never reach the pipeline. Latency is only recorded
    /// against an outstanding ping.
    fn on_pong(&mut self) {
        let Some(sent) = self.last_ping.take() else {
            self.log()
                .info(EventCategory::Heartbeat, "Pong received with no ping outstanding");
            return;
        };
        let latency_ms = sent.elapsed().as_millis() as u64;
        self.pipeline.metrics_mut().record_latency(latency_ms);
        self.log().info_with(
            EventCategory::Heartbeat,
            "Pong received",
            json!({ "latencyMs": latency_ms }),
        );
    }

    fn on_error(&mut self, error: &str) {
        let data = json!({ "error": error, "endpoint": self.endpoints.current() });
        self.log()
            .error(EventCategory::Connection, "Transport error", data);
        self.set_state(ConnectionState::Disconnected);
    }

    fn on_close(&mut self, code: u16, reason: &str) {
        self.teardown();
        self.set_state(ConnectionState::Disconnected);
        let data = json!({
            "code": code,
            "reason": if reason.is_empty() { "unknown" } else { reason },
            "endpoint": self.endpoints.current(),
        });
        self.log()
            .info_with(EventCategory::Connection, "Disconnected", data);

        self.flush();

        if !self.auto_reconnect {
            self.log().info(
                EventCategory::Connection,
                "Auto-reconnect disabled; staying disconnected",
            );
            return;
        }

        if self.attempts < self.max_attempts() {
            let delay = self.backoff.delay(self.attempts);
            self.set_attempts(self.attempts + 1);
            let data = json!({
                "attempt": self.attempts,
                "maxAttempts": self.max_attempts(),
                "delayMs": delay.as_millis() as u64,
                "endpoint": self.endpoints.current(),
            });
            self.log()
                .info_with(EventCategory::Connection, "Reconnect scheduled", data);
            self.scheduler.once(Task::Reconnect, delay);
            self.set_state(ConnectionState::ReconnectScheduled);
        } else {
            let data = json!({
                "attempts": self.attempts,
                "endpoint": self.endpoints.current(),
            });
            self.log().critical(
                EventCategory::Connection,
                "Reconnect attempts exhausted",
                data,
            );
            self.fail_over(self.config.failover.from_close_ms);
        }
    }

    fn flush(&mut self) {
        let Some(Flushed { readings, alerts }) = self.pipeline.flush(now_ms()) else {
            return;
        };

        self.consumer.on_batch(&readings);
        for alert in &alerts {
            self.consumer.on_alert(alert);
        }
        if let Some(last) = alerts.last() {
            self.pending_echo = Some(last.clone());
            self.scheduler.once(Task::AlertEcho, ALERT_ECHO_DELAY);
        }
    }

    // Timers

    fn on_timer(&mut self, task: Task) {
        match task {
            Task::Heartbeat => self.send_ping(),
            Task::ConnectTimeout => self.on_connect_timeout(),
            Task::Reconnect => self.connect(),
            Task::MetricsSample => {
                self.pipeline.sample_memory();
                if self.pipeline.needs_relief() {
                    self.flush();
                }
            }
            Task::BatchFlush => self.flush(),
            Task::CoilCommit => {
                self.pipeline.commit_coil(std_now());
            }
            Task::AlertEcho => {
                if let Some(alert) = self.pending_echo.take() {
                    tracing::warn!(
                        severity = alert.severity.as_str(),
                        device = %alert.device_id,
                        "alert: {}",
                        alert.summary()
                    );
                }
            }
        }
    }

    fn send_ping(&mut self) {
        let Some(link) = self.link.as_ref().filter(|_| self.state.is_open()) else {
            return;
        };
        let timestamp = now_ms();
        let ping = json!({ "type": "ping", "timestamp": timestamp }).to_string();

        if link.send_text(ping) {
            self.last_ping = Some(Instant::now());
            self.log().info_with(
                EventCategory::Heartbeat,
                "Ping sent",
                json!({ "timestamp": timestamp }),
            );
        } else {
            self.log().warn(
                EventCategory::Heartbeat,
                "Ping could not be sent",
                json!({ "timestamp": timestamp }),
            );
        }
    }

    fn on_connect_timeout(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        let timeout_ms = self.config.connection_timeout_ms;
        let data = json!({ "timeoutMs": timeout_ms, "endpoint": self.endpoints.current() });
        self.log()
            .error(EventCategory::Connection, "Connection timed out", data);
        self.on_close(ABNORMAL_CLOSURE, "Connection timeout");
    }

    // Commands

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Reconnect => {
                self.log()
                    .info(EventCategory::Connection, "Manual reconnect requested");
                self.set_attempts(0);
                self.endpoints.reset_rotations();
                self.connect();
            }
            Command::Close => self.close(),
            Command::Send { text, reply } => {
                let _ = reply.send(self.send(text));
            }
            Command::AddEndpoint { url, reply } => {
                let _ = reply.send(self.add_endpoint(&url));
            }
            Command::SwitchEndpoint { reply } => {
                let _ = reply.send(self.switch_endpoint());
            }
            Command::SetAutoReconnect(enabled) => {
                self.auto_reconnect = enabled;
                self.log().info(
                    EventCategory::Config,
                    format!("Auto-reconnect {}", if enabled { "enabled" } else { "disabled" }),
                );
            }
            Command::SetAlertsEnabled(enabled) => self.pipeline.set_alerts_enabled(enabled),
            Command::ClearData => self.pipeline.clear_data(),
            Command::Window { reply } => {
                let window = self.pipeline.window();
                let _ = reply.send(WindowView {
                    readings: window.snapshot(),
                    stats: window.stats(),
                });
            }
            Command::DebugLog { reply } => {
                let _ = reply.send(self.pipeline.log().newest_first());
            }
            Command::Shutdown => self.shutdown(),
        }
    }

    fn send(&mut self, text: String) -> bool {
        let sent = match self.link.as_ref() {
            Some(link) if self.state.is_open() => link.send_text(text),
            _ => false,
        };
        if !sent {
            let state = self.state.label();
            self.log().warn(
                EventCategory::Connection,
                "Cannot send: connection is not open",
                json!({ "state": state }),
            );
        }
        sent
    }

    /// Close on request. No reconnect follows.
    fn close(&mut self) {
        self.log()
            .info(EventCategory::Connection, "Manual disconnect");
        self.set_state(ConnectionState::Closing);
        if let Some(link) = self.link.take() {
            link.close(NORMAL_CLOSURE, "Manual disconnect");
        }
        self.teardown();
        self.flush();
        self.set_state(ConnectionState::Disconnected);
    }

    fn add_endpoint(&mut self, url: &str) -> Result<(), EndpointError> {
        if let Err(e) = self.endpoints.add(url) {
            self.log().warn(
                EventCategory::Config,
                "Endpoint rejected",
                json!({ "url": url, "error": e.to_string() }),
            );
            return Err(e);
        }

        let url = self.endpoints.current().to_string();
        if let Err(e) = self.config.persist_endpoint(&url) {
            self.log().error(
                EventCategory::Config,
                "Failed to persist endpoint",
                json!({ "url": url, "error": e.to_string() }),
            );
        }
        self.log()
            .info_with(EventCategory::Config, "Endpoint added", json!({ "url": url }));
        self.restart_on_current();
        Ok(())
    }

    fn switch_endpoint(&mut self) -> bool {
        let from = self.endpoints.current().to_string();
        if !self.endpoints.switch_next() {
            self.log().warn(
                EventCategory::Config,
                "No other endpoint to switch to",
                json!({ "endpoint": from }),
            );
            return false;
        }
        let data = json!({
            "from": from,
            "to": self.endpoints.current(),
            "index": self.endpoints.index(),
        });
        self.log()
            .info_with(EventCategory::Config, "Switching endpoint", data);
        self.restart_on_current();
        true
    }

    /// Close and reconnect to the selected endpoint after a short pause.
    fn restart_on_current(&mut self) {
        self.teardown();
        self.set_attempts(0);
        let endpoint = self.endpoints.current().to_string();
        self.pipeline.metrics_mut().set_active_endpoint(&endpoint);
        self.set_state(ConnectionState::Disconnected);
        self.scheduler.once(
            Task::Reconnect,
            Duration::from_millis(self.config.failover.endpoint_change_ms),
        );
        self.set_state(ConnectionState::ReconnectScheduled);
    }

    fn shutdown(&mut self) {
        self.scheduler.cancel_all();
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.flush();
        if let Some(link) = self.link.take() {
            link.close(NORMAL_CLOSURE, "Client shutdown");
        }
        self.pipeline.metrics_mut().mark_disconnected();
        self.log()
            .info(EventCategory::Connection, "Client stopped");
        self.set_state(ConnectionState::Disconnected);
        self.running = false;
    }
}

/// Next event from the link, or never when there is none.
async fn next_link_event(link: &mut Option<Link>) -> LinkEvent {
    match link {
        Some(link) => link.inbound.recv().await.unwrap_or(LinkEvent::Closed {
            code: ABNORMAL_CLOSURE,
            reason: "link dropped".to_string(),
        }),
        None => std::future::pending().await,
    }
}

fn std_now() -> std::time::Instant {
    Instant::now().into_std()
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
