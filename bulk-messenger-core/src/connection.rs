//! Messaging session supervision
//!
//! [`ConnectionMonitor`] turns the raw [`GatewayEvent`] stream of a gateway
//! into a single observable [`ConnectionState`] and operator notifications.
//! The send controller only reads the state through a `watch` receiver, which
//! is how a run notices that the session went away.
//!
//! ## Failure Tracking
//!
//! Authentication failures and sessions that drop before becoming ready are
//! counted. From [`FAILURE_WARNING_THRESHOLD`] consecutive failures on, every
//! further failure suggests resetting the stored session. A session that
//! reaches `Ready` clears the counter.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::gateway::{GatewayEvent, MessagingGateway, SessionCredentials};
use crate::notification::{Notification, NotificationLevel, NotificationSink};

/// Default number of pairing QRs shown before warning about an unscanned code
pub const DEFAULT_MAX_QR_RETRIES: u32 = 5;

/// Consecutive failures from which a session reset is suggested
pub const FAILURE_WARNING_THRESHOLD: u32 = 3;

/// Observable state of the messaging session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// A pairing QR is displayed and waiting for a scan
    AwaitingScan { attempt: u32 },
    LoadingSession { percent: u8 },
    Authenticated,
    Ready,
}

impl ConnectionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// Whether a session exists or is being established
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("Disconnected"),
            ConnectionState::Connecting => f.write_str("Connecting..."),
            ConnectionState::AwaitingScan { .. } => f.write_str("Waiting for QR code scan"),
            ConnectionState::LoadingSession { percent } => write!(f, "Loading... {}%", percent),
            ConnectionState::Authenticated => f.write_str("Authenticated"),
            ConnectionState::Ready => f.write_str("Connected"),
        }
    }
}

/// Connection-related messages for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotice {
    Connecting,
    AlreadyConnected,
    NotConnected,
    QrIssued { attempt: u32, max: u32, payload: String },
    QrRetriesExhausted { max: u32 },
    LoadingSession { percent: u8, message: Option<String> },
    Authenticated,
    AuthFailure { reason: String },
    Ready,
    Disconnected { reason: String },
    RepeatedFailures { count: u32 },
}

impl ConnectionNotice {
    pub fn level(&self) -> NotificationLevel {
        match self {
            ConnectionNotice::Authenticated | ConnectionNotice::Ready => NotificationLevel::Success,
            ConnectionNotice::AlreadyConnected
            | ConnectionNotice::NotConnected
            | ConnectionNotice::QrRetriesExhausted { .. }
            | ConnectionNotice::Disconnected { .. }
            | ConnectionNotice::RepeatedFailures { .. } => NotificationLevel::Warning,
            ConnectionNotice::AuthFailure { .. } => NotificationLevel::Error,
            _ => NotificationLevel::Info,
        }
    }
}

impl fmt::Display for ConnectionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionNotice::Connecting => f.write_str("Initializing WhatsApp client..."),
            ConnectionNotice::AlreadyConnected => {
                f.write_str("Already connected or connecting, disconnect first")
            }
            ConnectionNotice::NotConnected => f.write_str("Not connected"),
            ConnectionNotice::QrIssued { attempt, max, .. } => write!(
                f,
                "QR code received ({}/{}), scan it with WhatsApp on your phone",
                attempt, max
            ),
            ConnectionNotice::QrRetriesExhausted { max } => write!(
                f,
                "QR code was shown {} times without a scan, reconnect to try again",
                max
            ),
            ConnectionNotice::LoadingSession { percent, message } => match message {
                Some(message) => write!(f, "Loading session: {}% {}", percent, message),
                None => write!(f, "Loading session: {}%", percent),
            },
            ConnectionNotice::Authenticated => f.write_str("WhatsApp authenticated"),
            ConnectionNotice::AuthFailure { reason } => {
                write!(f, "Authentication failed: {}", reason)
            }
            ConnectionNotice::Ready => f.write_str("WhatsApp client is ready"),
            ConnectionNotice::Disconnected { reason } => {
                write!(f, "WhatsApp disconnected: {}", reason)
            }
            ConnectionNotice::RepeatedFailures { count } => write!(
                f,
                "{} consecutive connection failures, consider resetting the saved session",
                count
            ),
        }
    }
}

#[derive(Debug, Default)]
struct FailureTracker {
    qr_attempts: u32,
    consecutive_failures: u32,
}

/// Tracks the messaging session and publishes its state
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct ConnectionMonitor {
    state_tx: Arc<watch::Sender<ConnectionState>>,
    tracker: Arc<Mutex<FailureTracker>>,
    sink: Arc<dyn NotificationSink>,
    max_qr_retries: u32,
}

impl ConnectionMonitor {
    pub fn new(sink: Arc<dyn NotificationSink>, max_qr_retries: u32) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state_tx: Arc::new(state_tx),
            tracker: Arc::new(Mutex::new(FailureTracker::default())),
            sink,
            max_qr_retries,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.tracker
            .lock()
            .map(|t| t.consecutive_failures)
            .unwrap_or_default()
    }

    /// Start a session on `gateway`
    ///
    /// Returns `Ok(false)` without touching the gateway when a session is
    /// already active or being established.
    pub async fn connect(
        &self,
        gateway: Arc<dyn MessagingGateway>,
        credentials: &SessionCredentials,
    ) -> Result<bool> {
        if self.state().is_active() {
            self.notify(ConnectionNotice::AlreadyConnected);
            return Ok(false);
        }

        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.qr_attempts = 0;
        }
        self.state_tx.send_replace(ConnectionState::Connecting);
        self.notify(ConnectionNotice::Connecting);
        info!("Connecting {} gateway with {}", gateway.name(), credentials);

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let monitor = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                monitor.apply(event);
            }
            debug!("Gateway event stream closed");
        });

        if let Err(e) = gateway.connect(credentials, events_tx).await {
            warn!("Failed to connect {} gateway: {}", gateway.name(), e);
            self.state_tx.send_replace(ConnectionState::Disconnected);
            self.notify(ConnectionNotice::Disconnected {
                reason: e.to_string(),
            });
            self.record_failure();
            return Err(e.into());
        }
        Ok(true)
    }

    /// End the session; a no-op with a warning when nothing is connected
    pub async fn disconnect(&self, gateway: &dyn MessagingGateway) -> Result<()> {
        if !self.state().is_active() {
            self.notify(ConnectionNotice::NotConnected);
            return Ok(());
        }

        let result = gateway.disconnect().await;
        if self.state_tx.send_replace(ConnectionState::Disconnected) != ConnectionState::Disconnected
        {
            self.notify(ConnectionNotice::Disconnected {
                reason: "disconnected by user".to_string(),
            });
        }
        result.map_err(Into::into)
    }

    /// Wait until the session is ready, or fail once it drops
    pub async fn wait_until_ready(&self) -> std::result::Result<(), GatewayError> {
        let mut rx = self.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Disconnected => {
                    return Err(GatewayError::Disconnected(
                        "session ended before becoming ready".to_string(),
                    ))
                }
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(GatewayError::NotConnected);
            }
        }
    }

    /// Fold one gateway event into the state
    pub fn apply(&self, event: GatewayEvent) {
        debug!("Gateway event: {}", event.name());
        match event {
            GatewayEvent::QrIssued { payload } => {
                let attempt = self
                    .tracker
                    .lock()
                    .map(|mut t| {
                        t.qr_attempts += 1;
                        t.qr_attempts
                    })
                    .unwrap_or(1);
                self.state_tx
                    .send_replace(ConnectionState::AwaitingScan { attempt });
                self.notify(ConnectionNotice::QrIssued {
                    attempt,
                    max: self.max_qr_retries,
                    payload,
                });
                if attempt >= self.max_qr_retries {
                    self.notify(ConnectionNotice::QrRetriesExhausted {
                        max: self.max_qr_retries,
                    });
                }
            }
            GatewayEvent::LoadingSession { percent, message } => {
                self.state_tx
                    .send_replace(ConnectionState::LoadingSession { percent });
                self.notify(ConnectionNotice::LoadingSession { percent, message });
            }
            GatewayEvent::Authenticated => {
                self.state_tx.send_replace(ConnectionState::Authenticated);
                self.notify(ConnectionNotice::Authenticated);
            }
            GatewayEvent::AuthFailure { reason } => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                self.notify(ConnectionNotice::AuthFailure { reason });
                self.record_failure();
            }
            GatewayEvent::Ready => {
                if let Ok(mut tracker) = self.tracker.lock() {
                    tracker.consecutive_failures = 0;
                }
                self.state_tx.send_replace(ConnectionState::Ready);
                self.notify(ConnectionNotice::Ready);
            }
            GatewayEvent::Disconnected { reason } => {
                let previous = self.state_tx.send_replace(ConnectionState::Disconnected);
                match previous {
                    ConnectionState::Disconnected => {
                        debug!("Ignoring disconnect while already disconnected: {}", reason)
                    }
                    ConnectionState::Ready | ConnectionState::Authenticated => {
                        self.notify(ConnectionNotice::Disconnected { reason });
                    }
                    _ => {
                        self.notify(ConnectionNotice::Disconnected { reason });
                        self.record_failure();
                    }
                }
            }
        }
    }

    fn record_failure(&self) {
        let count = match self.tracker.lock() {
            Ok(mut tracker) => {
                tracker.consecutive_failures += 1;
                tracker.consecutive_failures
            }
            Err(_) => return,
        };
        if count >= FAILURE_WARNING_THRESHOLD {
            self.notify(ConnectionNotice::RepeatedFailures { count });
        }
    }

    fn notify(&self, notice: ConnectionNotice) {
        self.sink.notify(Notification::connection(notice));
    }
}
