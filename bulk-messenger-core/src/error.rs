//! Error handling for the bulk messenger
//!
//! Errors are split by the layer that produces them so callers can react
//! precisely, and all of them convert into the crate-wide [`Error`] with `?`.
//!
//! ## Error Families
//!
//! - [`PreconditionError`]: a run could not start (nothing has been sent)
//! - [`GatewayError`]: the messaging gateway rejected or failed a request
//! - [`SourceReadError`]: the contact sheet could not be read
//!
//! ## Example
//!
//! ```rust
//! use bulk_messenger_core::{Error, PreconditionError};
//!
//! let error: Error = PreconditionError::NoContacts.into();
//! assert!(error.requires_user_action());
//! assert_eq!(error.user_message(), "No contacts loaded. Load a contact sheet first.");
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::controller::RunPhase;

/// Result type for bulk messenger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a run refuses to start
///
/// These are returned by `SendController::start` before any contact is
/// touched, so the contact list and cursor are left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Messaging gateway is not ready")]
    GatewayNotReady,

    #[error("No contacts loaded")]
    NoContacts,

    #[error("Image sending is enabled but no image was provided")]
    MissingImage,

    #[error("Document sending is enabled but no document was provided")]
    MissingDocument,

    /// Image and document are both off and the caption is empty
    #[error("Nothing to send: enable an image, a document or a text caption")]
    NothingToSend,

    #[error("Invalid delay bounds: minimum {min}s exceeds maximum {max}s")]
    InvalidDelayBounds { min: u64, max: u64 },

    #[error("A run is already {0}")]
    AlreadyRunning(RunPhase),

    /// A stopped run is still finishing its in-flight contact
    #[error("The previous run is still finishing its current contact")]
    PreviousRunDraining,
}

/// Failures reported by a messaging gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Gateway session is not connected")]
    NotConnected,

    #[error("Gateway request timed out: {0}")]
    Timeout(String),

    /// The gateway answered with a non-success status
    #[error("Gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("Gateway disconnected: {0}")]
    Disconnected(String),
}

impl GatewayError {
    /// Whether the same request could succeed if issued again later
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Transport(_))
    }
}

/// Failures while reading a contact sheet
#[derive(Error, Debug)]
pub enum SourceReadError {
    #[error("Contact file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read contact file {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("Unsupported contact file format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Contact file has no worksheet")]
    NoWorksheet,

    #[error("Contact file has no '{0}' column")]
    MissingColumn(String),
}

/// Errors that can occur anywhere in the bulk messenger
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    SourceRead(#[from] SourceReadError),

    /// A media file selected for sending could not be loaded
    #[error("Media file {} unavailable: {reason}", .path.display())]
    MediaUnavailable { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Check if this error is recoverable (a retry might succeed)
    ///
    /// ```rust
    /// use bulk_messenger_core::{Error, GatewayError};
    ///
    /// let error = Error::Gateway(GatewayError::Timeout("send".to_string()));
    /// assert!(error.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Gateway(e) => e.is_transient(),
            Error::Precondition(PreconditionError::PreviousRunDraining) => true,
            _ => false,
        }
    }

    /// Check if this error can only be resolved by the operator
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::Precondition(_)
                | Error::SourceRead(_)
                | Error::MediaUnavailable { .. }
                | Error::Configuration(_)
                | Error::Gateway(GatewayError::NotConnected)
                | Error::Gateway(GatewayError::Disconnected(_))
        ) && !self.is_recoverable()
    }

    /// Get a short, actionable message suitable for an operator
    pub fn user_message(&self) -> String {
        match self {
            Error::Precondition(e) => match e {
                PreconditionError::GatewayNotReady => {
                    "Messaging gateway is not ready. Connect and scan the QR code first."
                        .to_string()
                }
                PreconditionError::NoContacts => {
                    "No contacts loaded. Load a contact sheet first.".to_string()
                }
                PreconditionError::MissingImage => {
                    "Please select an image or disable image sending.".to_string()
                }
                PreconditionError::MissingDocument => {
                    "Please select a document or disable document sending.".to_string()
                }
                PreconditionError::NothingToSend => {
                    "Nothing to send. Enable an image, a document or enter a message.".to_string()
                }
                PreconditionError::InvalidDelayBounds { min, max } => format!(
                    "Minimum delay ({}s) must not exceed maximum delay ({}s).",
                    min, max
                ),
                PreconditionError::AlreadyRunning(phase) => {
                    format!("A run is already {}. Stop it before starting another.", phase)
                }
                PreconditionError::PreviousRunDraining => {
                    "The previous run is finishing its current contact. Try again shortly."
                        .to_string()
                }
            },
            Error::Gateway(GatewayError::NotConnected) => {
                "Not connected to the messaging service. Connect first.".to_string()
            }
            Error::Gateway(GatewayError::Timeout(msg)) => {
                format!("Messaging service timed out: {}. Check your network.", msg)
            }
            Error::Gateway(GatewayError::Disconnected(reason)) => {
                format!("Disconnected from the messaging service: {}.", reason)
            }
            Error::Gateway(e) => format!("Messaging service error: {}.", e),
            Error::SourceRead(SourceReadError::MissingColumn(name)) => format!(
                "The contact sheet needs a column headed '{}'.",
                name
            ),
            Error::SourceRead(e) => format!("{}.", e),
            Error::MediaUnavailable { path, .. } => {
                format!("Could not read {}. Pick another file.", path.display())
            }
            Error::Configuration(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            Error::InvalidState(msg) => format!("Invalid state: {}.", msg),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PreconditionError::InvalidDelayBounds { min: 9, max: 2 };
        assert_eq!(
            error.to_string(),
            "Invalid delay bounds: minimum 9s exceeds maximum 2s"
        );

        let error = PreconditionError::AlreadyRunning(RunPhase::Paused);
        assert_eq!(error.to_string(), "A run is already paused");

        let error = GatewayError::Rejected {
            status: 401,
            body: "unauthorized".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Gateway rejected request (401): unauthorized"
        );
    }

    #[test]
    fn test_precondition_is_transparent() {
        let error: Error = PreconditionError::MissingImage.into();
        assert_eq!(
            error.to_string(),
            "Image sending is enabled but no image was provided"
        );
        assert!(error.requires_user_action());
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_gateway_classification() {
        let timeout: Error = GatewayError::Timeout("check".into()).into();
        assert!(timeout.is_recoverable());
        assert!(!timeout.requires_user_action());

        let rejected: Error = GatewayError::Rejected {
            status: 400,
            body: String::new(),
        }
        .into();
        assert!(!rejected.is_recoverable());

        let lost: Error = GatewayError::Disconnected("logged out".into()).into();
        assert!(lost.requires_user_action());
    }

    #[test]
    fn test_draining_is_recoverable() {
        let error: Error = PreconditionError::PreviousRunDraining.into();
        assert!(error.is_recoverable());
        assert!(!error.requires_user_action());
    }

    #[test]
    fn test_configuration_needs_operator() {
        let error = Error::Configuration("api_url is empty".into());
        assert!(error.requires_user_action());
        assert_eq!(
            error.user_message(),
            "Configuration error: api_url is empty. Check your settings."
        );
    }

    #[test]
    fn test_missing_column_message() {
        let error: Error = SourceReadError::MissingColumn("Number".into()).into();
        assert_eq!(
            error.user_message(),
            "The contact sheet needs a column headed 'Number'."
        );
    }
}
