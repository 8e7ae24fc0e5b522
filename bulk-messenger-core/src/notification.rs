//! Operator notifications
//!
//! Everything the run loop and the connection monitor want a human to see is
//! emitted as a [`Notification`] through a [`NotificationSink`]. Sinks are
//! fire-and-forget so emitting never blocks a send.
//!
//! ## Provided Sinks
//!
//! - [`TracingSink`]: logs through `tracing` at a level matching the notification
//! - [`ChannelSink`]: forwards into an unbounded channel for a UI to consume
//! - [`FanoutSink`]: delivers to several sinks

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::connection::ConnectionNotice;
use crate::contact::ChatAddress;
use crate::content::ContentKind;
use crate::controller::{RunPhase, RunSummary};
use crate::error::PreconditionError;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// What a pacing delay precedes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    BeforeDocument,
    NextContact,
}

/// Progress of a send run
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started { total: usize },
    StartRejected { reason: PreconditionError },
    ContactStarted { index: usize, total: usize, address: ChatAddress },
    Registered { index: usize, address: ChatAddress },
    NotRegistered { index: usize, address: ChatAddress },
    RegistrationFailed { index: usize, address: ChatAddress, error: String },
    UnitSent { index: usize, address: ChatAddress, kind: ContentKind },
    UnitFailed { index: usize, address: ChatAddress, kind: ContentKind, error: String },
    Waiting { delay: Duration, reason: WaitReason },
    Paused { cursor: usize, total: usize },
    Resumed { cursor: usize, total: usize },
    Stopped { cursor: usize, total: usize },
    /// The session stopped being ready in the middle of a run
    SessionLost { cursor: usize, total: usize },
    Completed { summary: RunSummary },
    /// A pause, resume or stop request that did not apply in the current phase
    ControlIgnored { request: &'static str, phase: RunPhase },
}

impl RunEvent {
    pub fn level(&self) -> NotificationLevel {
        match self {
            RunEvent::UnitSent { .. } | RunEvent::Completed { .. } => NotificationLevel::Success,
            RunEvent::NotRegistered { .. }
            | RunEvent::StartRejected { .. }
            | RunEvent::Stopped { .. }
            | RunEvent::ControlIgnored { .. } => NotificationLevel::Warning,
            RunEvent::RegistrationFailed { .. }
            | RunEvent::UnitFailed { .. }
            | RunEvent::SessionLost { .. } => NotificationLevel::Error,
            _ => NotificationLevel::Info,
        }
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEvent::Started { total } => {
                write!(f, "Starting to send messages to {} contacts", total)
            }
            RunEvent::StartRejected { reason } => write!(f, "Cannot start: {}", reason),
            RunEvent::ContactStarted {
                index,
                total,
                address,
            } => write!(f, "Processing contact {} of {}: {}", index + 1, total, address),
            RunEvent::Registered { address, .. } => {
                write!(f, "{} is registered on WhatsApp", address)
            }
            RunEvent::NotRegistered { address, .. } => {
                write!(f, "{} is not registered on WhatsApp, skipping", address)
            }
            RunEvent::RegistrationFailed { address, error, .. } => {
                write!(f, "Failed to check {}: {}", address, error)
            }
            RunEvent::UnitSent { address, kind, .. } => write!(f, "Sent {} to {}", kind, address),
            RunEvent::UnitFailed {
                address,
                kind,
                error,
                ..
            } => write!(f, "Failed to send {} to {}: {}", kind, address, error),
            RunEvent::Waiting { delay, reason } => {
                let target = match reason {
                    WaitReason::BeforeDocument => "sending document",
                    WaitReason::NextContact => "next contact",
                };
                write!(
                    f,
                    "Waiting {:.1} seconds before {}...",
                    delay.as_secs_f64(),
                    target
                )
            }
            RunEvent::Paused { cursor, total } => write!(f, "Paused ({} of {})", cursor, total),
            RunEvent::Resumed { cursor, total } => {
                write!(f, "Resumed ({} of {})", cursor, total)
            }
            RunEvent::Stopped { cursor, total } => write!(f, "Stopped ({} of {})", cursor, total),
            RunEvent::SessionLost { cursor, total } => write!(
                f,
                "Messaging session lost, stopped at {} of {}",
                cursor, total
            ),
            RunEvent::Completed { summary } => write!(
                f,
                "All messages sent successfully! ({} sent, {} not on WhatsApp, {} failed)",
                summary.sent, summary.not_on_service, summary.failed
            ),
            RunEvent::ControlIgnored { request, phase } => {
                write!(f, "Cannot {} while {}", request, phase)
            }
        }
    }
}

/// Origin of a notification
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    Run(RunEvent),
    Connection(ConnectionNotice),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Run(event) => write!(f, "{}", event),
            Subject::Connection(notice) => write!(f, "{}", notice),
        }
    }
}

/// A timestamped, leveled message for the operator
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub subject: Subject,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn run(event: RunEvent) -> Self {
        Self {
            level: event.level(),
            subject: Subject::Run(event),
            at: Utc::now(),
        }
    }

    pub fn connection(notice: ConnectionNotice) -> Self {
        Self {
            level: notice.level(),
            subject: Subject::Connection(notice),
            at: Utc::now(),
        }
    }

    pub fn message(&self) -> String {
        self.subject.to_string()
    }

    pub fn as_run(&self) -> Option<&RunEvent> {
        match &self.subject {
            Subject::Run(event) => Some(event),
            Subject::Connection(_) => None,
        }
    }
}

/// Receives notifications
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs notifications through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        let message = notification.message();
        match notification.level {
            NotificationLevel::Info => info!("{}", message),
            NotificationLevel::Success => info!(success = true, "{}", message),
            NotificationLevel::Warning => warn!("{}", message),
            NotificationLevel::Error => error!("{}", message),
        }
    }
}

/// Forwards notifications into a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        // a closed receiver means nobody is watching anymore
        let _ = self.tx.send(notification);
    }
}

/// Delivers every notification to each wrapped sink in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, notification: Notification) {
        for sink in &self.sinks {
            sink.notify(notification.clone());
        }
    }
}
