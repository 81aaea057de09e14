//! Single-client sync server.
//!
//! One listener is kept for the life of the server and at most one client
//! session exists at a time. Every call is non-blocking; waits are bounded
//! loops of short pauses.

pub mod error;
pub mod request;
pub mod session;
pub mod socket;

use std::{fmt, time::Duration};

use error::NetError;
use request::Request;
use session::{Session, Wait};
use socket::{Listener, Network};
use tracing::{error, info, span, warn, Level};

use crate::{config::TransportConfig, pacer::Pacer, snapshot::Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Init,
    Listening,
    /// listening, no client
    Idle,
    Connected,
    AwaitingRequest,
    Responding,
    AwaitingAck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Accepted,
    /// a client already holds the session, listener left untouched
    Busy,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    NoSession,
    Disconnected,
    TimedOut,
    Ignored,
    Synced { bytes: usize, acked: bool },
    EncodeFailed,
    ReceiveFailed(NetError),
    SendFailed(NetError),
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSession => write!(f, "No client"),
            Self::Disconnected => write!(f, "Client disconnected"),
            Self::TimedOut => write!(f, "Timeout waiting for request"),
            Self::Ignored => write!(f, "Unknown request"),
            Self::Synced { acked: true, .. } => write!(f, "Sync completed successfully!"),
            Self::Synced { bytes, .. } => write!(f, "Sent {bytes} bytes, no acknowledgement"),
            Self::EncodeFailed => write!(f, "Failed to build response"),
            Self::ReceiveFailed(e) | Self::SendFailed(e) => write!(f, "{e}"),
        }
    }
}

type ConnOf<N> = <<N as Network>::Listener as Listener>::Conn;

pub struct SyncServer<N: Network> {
    net: N,
    cfg: TransportConfig,
    listener: Option<N::Listener>,
    session: Option<Session<ConnOf<N>>>,
    state: TransportState,
    last_error: Option<String>,
    response: Vec<u8>,
}

impl<N: Network> SyncServer<N> {
    pub fn new(net: N, cfg: TransportConfig) -> Self {
        Self {
            net,
            response: vec![0; cfg.max_message_size],
            cfg,
            listener: None,
            session: None,
            state: TransportState::Init,
            last_error: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn port(&self) -> u16 {
        self.cfg.port
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn record(&mut self, e: &NetError) {
        self.last_error = Some(e.to_string());
    }

    /// Binds the listener. Does nothing if already listening.
    pub fn start(&mut self) -> Result<(), NetError> {
        let span = span!(Level::INFO, "SyncServer", port = self.cfg.port);
        let _enter = span.enter();

        if self.listener.is_some() {
            return Ok(());
        }

        self.state = TransportState::Listening;
        match self.net.listen(self.cfg.port) {
            Ok(listener) => {
                self.listener = Some(listener);
                self.state = TransportState::Idle;
                info!("listening on port {}", self.cfg.port);
                Ok(())
            }
            Err(e) => {
                error!("{e}");
                self.record(&e);
                self.state = TransportState::Init;
                Err(e)
            }
        }
    }

    /// Closes the client (if any) and the listener.
    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            info!("closed client");
        }
        if self.listener.take().is_some() {
            info!("stopped listening");
        }
        self.state = TransportState::Init;
    }

    pub fn poll_accept(&mut self) -> Result<Accept, NetError> {
        if self.session.is_some() {
            return Ok(Accept::Busy);
        }
        let Some(listener) = self.listener.as_mut() else {
            return Err(NetError::NotListening);
        };

        match listener.accept() {
            Ok(Some(conn)) => {
                self.session = Some(Session::new(conn, self.cfg.max_request_size));
                self.state = TransportState::Connected;
                info!("client connected");
                Ok(Accept::Accepted)
            }
            Ok(None) => Ok(Accept::Idle),
            Err(e) => {
                warn!("{e}");
                self.record(&e);
                Err(e)
            }
        }
    }

    /// Runs the connected client's session to completion and closes it.
    pub fn serve(&mut self, snapshot: &Snapshot, pacer: &mut impl Pacer) -> SessionOutcome {
        let span = span!(Level::INFO, "SyncSession");
        let _enter = span.enter();

        let Some(mut session) = self.session.take() else {
            return SessionOutcome::NoSession;
        };

        let outcome = self.run(&mut session, snapshot, pacer);
        drop(session);
        self.state = if self.listener.is_some() {
            TransportState::Idle
        } else {
            TransportState::Init
        };

        match &outcome {
            SessionOutcome::ReceiveFailed(e) | SessionOutcome::SendFailed(e) => {
                error!("{e}");
                self.record(e);
            }
            SessionOutcome::EncodeFailed => error!("{outcome}"),
            SessionOutcome::TimedOut | SessionOutcome::Ignored => warn!("{outcome}"),
            _ => info!("{outcome}"),
        }
        outcome
    }

    fn run(
        &mut self,
        session: &mut Session<ConnOf<N>>,
        snapshot: &Snapshot,
        pacer: &mut impl Pacer,
    ) -> SessionOutcome {
        let poll = self.cfg.poll_interval();

        self.state = TransportState::AwaitingRequest;
        let timeout = Duration::from_millis(self.cfg.request_timeout_ms);
        match session.wait_message(timeout, poll, pacer) {
            Ok(Wait::Got(Request::Sync)) => info!("sync request received"),
            Ok(Wait::Got(_)) => {
                let shown = String::from_utf8_lossy(session.received());
                warn!("unknown request: {:.50}", shown);
                return SessionOutcome::Ignored;
            }
            Ok(Wait::TimedOut) => return SessionOutcome::TimedOut,
            Ok(Wait::Disconnected) => return SessionOutcome::Disconnected,
            Err(e) => return SessionOutcome::ReceiveFailed(e),
        }

        self.state = TransportState::Responding;
        self.response.fill(0);
        let len = snapshot.encode(&mut self.response);
        info!("JSON: {len} bytes");
        if len == 0 {
            return SessionOutcome::EncodeFailed;
        }
        let bytes = match session.send_all(&self.response[..len], &self.cfg, pacer) {
            Ok(n) => n,
            Err(e) => return SessionOutcome::SendFailed(e),
        };

        self.state = TransportState::AwaitingAck;
        let timeout = Duration::from_millis(self.cfg.ack_timeout_ms);
        let acked = match session.wait_message(timeout, poll, pacer) {
            Ok(Wait::Got(Request::Ack)) => true,
            Ok(_) => false,
            Err(e) => {
                warn!("waiting for ack: {e}");
                false
            }
        };
        SessionOutcome::Synced { bytes, acked }
    }
}
