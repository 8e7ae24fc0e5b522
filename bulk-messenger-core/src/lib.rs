//! Bulk Messenger Core
//!
//! Sends an image (or text), a caption and a document to every number in a
//! contact sheet through a linked whatsapp-web session, pacing each send with
//! randomized delays and allowing the run to be paused, resumed and stopped.
//!
//! ## Building Blocks
//!
//! - [`source`]: reads the contact sheet
//! - [`gateway`]: the messaging session ([`MessagingGateway`])
//! - [`connection`]: supervises the session ([`ConnectionMonitor`])
//! - [`controller`]: runs the paced send loop ([`SendController`])
//! - [`notification`]: operator-facing notifications

pub mod connection;
pub mod contact;
pub mod content;
pub mod controller;
pub mod delay;
pub mod gateway;
pub mod notification;
pub mod source;

mod error;

#[cfg(test)]
pub mod test_utils;

pub use connection::{ConnectionMonitor, ConnectionNotice, ConnectionState};
pub use contact::{AddressPolicy, ChatAddress, Contact, ContactList, ContactStatus, DeliveryReport};
pub use content::{Content, ContentKind, MediaFile};
pub use controller::{RunOptions, RunPhase, RunSnapshot, RunSummary, SendController};
pub use delay::{next_delay_millis, DelayBounds};
pub use error::{Error, GatewayError, PreconditionError, Result, SourceReadError};
pub use gateway::{
    BridgeConfig, BridgeGateway, DryRunGateway, GatewayEvent, MessagingGateway,
    SessionCredentials,
};
pub use notification::{
    ChannelSink, FanoutSink, Notification, NotificationLevel, NotificationSink, RunEvent,
    Subject, TracingSink,
};
