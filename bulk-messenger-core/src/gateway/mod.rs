//! Messaging gateway abstraction
//!
//! A gateway owns the authenticated session with the messaging service. The
//! send controller only ever talks to it through [`MessagingGateway`], so the
//! HTTP bridge, the dry-run gateway and test doubles are interchangeable.
//!
//! ## Session Lifecycle
//!
//! `connect` starts the session and returns once the attempt is under way.
//! Progress is reported asynchronously as [`GatewayEvent`]s on the channel
//! passed to `connect`:
//!
//! ```text
//! QrIssued* -> Authenticated -> Ready -> ... -> Disconnected
//!     \-> AuthFailure
//! ```
//!
//! A resumed session may skip `QrIssued` entirely and report
//! `LoadingSession` progress instead.

pub mod bridge;
pub mod dry_run;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::contact::ChatAddress;
use crate::content::Content;
use crate::error::GatewayError;

pub use bridge::{BridgeConfig, BridgeGateway};
pub use dry_run::DryRunGateway;

/// Result type for gateway requests
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Channel a gateway reports lifecycle events on
pub type EventSender = mpsc::UnboundedSender<GatewayEvent>;

/// Session lifecycle events emitted by a gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A pairing code to be shown as a QR code and scanned from the phone
    QrIssued { payload: String },
    /// A stored session is being restored
    LoadingSession { percent: u8, message: Option<String> },
    Authenticated,
    AuthFailure { reason: String },
    /// The session can send messages
    Ready,
    Disconnected { reason: String },
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::QrIssued { .. } => "qr",
            GatewayEvent::LoadingSession { .. } => "loading_screen",
            GatewayEvent::Authenticated => "authenticated",
            GatewayEvent::AuthFailure { .. } => "auth_failure",
            GatewayEvent::Ready => "ready",
            GatewayEvent::Disconnected { .. } => "disconnected",
        }
    }
}

/// Identifies a persisted session on the gateway side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub session_id: String,
}

impl SessionCredentials {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

impl Default for SessionCredentials {
    fn default() -> Self {
        Self::new("bulk-sender")
    }
}

impl fmt::Display for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.session_id)
    }
}

/// An authenticated messaging session able to deliver content to addresses
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Begin connecting; lifecycle events are reported on `events`
    async fn connect(
        &self,
        credentials: &SessionCredentials,
        events: EventSender,
    ) -> GatewayResult<()>;

    /// End the session locally; the persisted session stays usable
    async fn disconnect(&self) -> GatewayResult<()>;

    /// Whether `address` has an account on the service
    async fn is_registered(&self, address: &ChatAddress) -> GatewayResult<bool>;

    /// Deliver one content unit
    async fn send_content(&self, address: &ChatAddress, content: &Content) -> GatewayResult<()>;
}
