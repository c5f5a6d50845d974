//! Operator session management
//!
//! At most one operator session exists at a time. The manager owns its
//! record, routes inbound channel messages to the [`TeleopHandler`], publishes
//! the session's frame relays into [`VideoSinks`] once the transport is up,
//! and forwards operator status events to the retained `control` channel.
//! Everything the session owns is released when the transport reports
//! `failed` or `closed`, or when the session breaks protocol.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::channel::{decode_message, ChannelLabel, ChannelMessage, TeleopHandler};
use super::signaling::{ConnectionState, SessionState};
use crate::error::{AppError, Result};
use crate::events::StatusBus;
use crate::video::{FrameReceiver, FrameRelay, StreamId, VideoSinks};

/// Outbound text channel toward the operator UI
#[async_trait]
pub trait StatusChannel: Send + Sync {
    async fn send_text(&self, text: String) -> Result<()>;
}

/// The transport carrying a session, closed when the session breaks protocol
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn close(&self);
}

/// Snapshot of the current session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub state: SessionState,
    pub created_at: Instant,
    pub status_channel: bool,
}

/// What a newly opened session hands to the transport layer
#[derive(Debug)]
pub struct SessionHandle {
    session_id: String,
    receivers: Vec<(StreamId, FrameReceiver)>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// One receiver per stream in [`StreamId::ALL`] order
    pub fn into_receivers(self) -> Vec<(StreamId, FrameReceiver)> {
        self.receivers
    }
}

struct SessionRecord {
    id: String,
    state: SessionState,
    created_at: Instant,
    relays: Vec<Arc<FrameRelay>>,
    status_channel: Option<Arc<dyn StatusChannel>>,
    forwarder: Option<JoinHandle<()>>,
    transport: Option<Arc<dyn SessionTransport>>,
}

/// Single-operator session manager
pub struct SessionManager {
    handler: Arc<dyn TeleopHandler>,
    sinks: Arc<VideoSinks>,
    status: StatusBus,
    current: Mutex<Option<SessionRecord>>,
}

impl SessionManager {
    pub fn new(handler: Arc<dyn TeleopHandler>, sinks: Arc<VideoSinks>, status: StatusBus) -> Self {
        Self {
            handler,
            sinks,
            status,
            current: Mutex::new(None),
        }
    }

    /// Create the session record and its relays. Fails with
    /// [`AppError::Busy`] while another session is negotiating or connected;
    /// the existing session is left untouched.
    pub fn open_session(&self) -> Result<SessionHandle> {
        let mut current = self.current.lock();
        if let Some(record) = current.as_ref() {
            if record.state.is_active() {
                warn!(
                    "Rejecting offer, session {} is {}",
                    record.id, record.state
                );
                return Err(AppError::Busy);
            }
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let mut relays = Vec::with_capacity(StreamId::ALL.len());
        let mut receivers = Vec::with_capacity(StreamId::ALL.len());
        for stream in StreamId::ALL {
            let (relay, rx) = FrameRelay::channel(stream);
            relays.push(relay);
            receivers.push((stream, rx));
        }

        *current = Some(SessionRecord {
            id: session_id.clone(),
            state: SessionState::Negotiating,
            created_at: Instant::now(),
            relays,
            status_channel: None,
            forwarder: None,
            transport: None,
        });

        info!("Session created: {}", session_id);
        Ok(SessionHandle {
            session_id,
            receivers,
        })
    }

    /// Register the transport so protocol violations can close it
    pub fn bind_transport(&self, session_id: &str, transport: Arc<dyn SessionTransport>) {
        if let Some(record) = self.current.lock().as_mut().filter(|r| r.id == session_id) {
            record.transport = Some(transport);
        }
    }

    /// Transport state change for `session_id`
    pub fn on_connection_state(&self, session_id: &str, state: ConnectionState) {
        match state {
            ConnectionState::Connected => self.mark_connected(session_id),
            ConnectionState::Failed => self.teardown(session_id, SessionState::Failed),
            ConnectionState::Closed => self.teardown(session_id, SessionState::Closed),
            other => debug!("Session {} transport {}", session_id, other),
        }
    }

    fn mark_connected(&self, session_id: &str) {
        let mut current = self.current.lock();
        let Some(record) = current.as_mut().filter(|r| r.id == session_id) else {
            return;
        };
        if record.state != SessionState::Negotiating {
            return;
        }

        record.state = SessionState::Connected;
        for relay in &record.relays {
            self.sinks.attach(relay.clone());
        }
        info!("Session {} connected, video sinks attached", session_id);
    }

    /// A data channel was opened by the operator. The `control` channel is
    /// retained for status messages. An unknown label fails the session.
    pub fn on_channel_open(
        &self,
        session_id: &str,
        label: &str,
        channel: Arc<dyn StatusChannel>,
    ) -> Result<ChannelLabel> {
        info!("Session {} channel({}) created by remote party", session_id, label);

        let label = match label.parse::<ChannelLabel>() {
            Ok(label) => label,
            Err(e) => {
                self.fail_session(session_id, &e);
                return Err(e);
            }
        };

        if label == ChannelLabel::Control {
            let mut current = self.current.lock();
            if let Some(record) = current.as_mut().filter(|r| r.id == session_id) {
                if let Some(old) = record.forwarder.take() {
                    old.abort();
                }
                record.forwarder = Some(self.spawn_status_forwarder(session_id, channel.clone()));
                record.status_channel = Some(channel);
            }
        }

        Ok(label)
    }

    /// Decode and dispatch one inbound message. A malformed payload fails
    /// the session.
    pub fn on_channel_message(&self, session_id: &str, label: ChannelLabel, data: &[u8]) {
        if !self.is_current(session_id) {
            debug!("Ignoring {} message for stale session {}", label, session_id);
            return;
        }

        match decode_message(label, data) {
            Ok(ChannelMessage::Hand(observation)) => self.handler.on_hand(observation),
            Ok(ChannelMessage::Pedal(values)) => self.handler.on_pedal(values),
            Ok(ChannelMessage::Control(token)) => self.handler.on_control(&token),
            Err(e) => self.fail_session(session_id, &e),
        }
    }

    /// Close `session_id` on request
    pub fn close_session(&self, session_id: &str) {
        self.teardown(session_id, SessionState::Closed);
    }

    /// Mark `session_id` errored, release it and close its transport
    pub fn fail_session(&self, session_id: &str, error: &AppError) {
        warn!("Session {} failed: {}", session_id, error);
        self.teardown(session_id, SessionState::Failed);
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.current.lock().as_ref().map(|r| SessionInfo {
            session_id: r.id.clone(),
            state: r.state,
            created_at: r.created_at,
            status_channel: r.status_channel.is_some(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|r| r.state.is_active())
    }

    fn is_current(&self, session_id: &str) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|r| r.id == session_id && r.state.is_active())
    }

    fn teardown(&self, session_id: &str, final_state: SessionState) {
        let record = {
            let mut current = self.current.lock();
            match current.as_ref() {
                Some(r) if r.id == session_id => current.take(),
                _ => None,
            }
        };
        let Some(mut record) = record else {
            return;
        };
        record.state = final_state;

        for relay in &record.relays {
            if self
                .sinks
                .relay(relay.stream())
                .is_some_and(|attached| Arc::ptr_eq(&attached, relay))
            {
                self.sinks.detach(relay.stream());
            }
            relay.close();
        }

        if let Some(forwarder) = record.forwarder.take() {
            forwarder.abort();
        }
        record.status_channel = None;

        if final_state == SessionState::Failed {
            if let Some(transport) = record.transport.take() {
                tokio::spawn(async move { transport.close().await });
            }
        }

        info!("Session {} {}, resources released", session_id, final_state);
        self.handler.on_session_closed();
    }

    fn spawn_status_forwarder(
        &self,
        session_id: &str,
        channel: Arc<dyn StatusChannel>,
    ) -> JoinHandle<()> {
        let mut rx = self.status.subscribe();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = channel.send_text(event.to_wire()).await {
                            debug!("Session {} status send failed: {}", session_id, e);
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Session {} status channel lagged by {} messages", session_id, n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
