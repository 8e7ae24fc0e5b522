//! Centralized Error Handling
//!
//! Logs core errors at a level matching their classification and tells the
//! operator what to do when an error needs their attention.

use bulk_messenger_core::Error;
use tracing::{error, warn};

/// Classifies errors for logging and operator messages
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandler;

impl ErrorHandler {
    pub fn new() -> Self {
        Self
    }

    /// Log `error` and print an operator message when one is needed
    ///
    /// Returns whether the error is recoverable, so callers can decide to
    /// retry.
    pub fn handle_error(&self, error: &Error, context: &str) -> bool {
        if error.is_recoverable() {
            warn!("Recoverable error {}: {}", context, error);
        } else if error.requires_user_action() {
            warn!("User action required {}: {}", context, error);
        } else {
            error!("Critical error {}: {}", context, error);
        }

        if let Some(message) = self.operator_message(error) {
            eprintln!("{}", message);
        }

        error.is_recoverable()
    }

    /// Message for the operator, if the error needs one
    pub fn operator_message(&self, error: &Error) -> Option<String> {
        error
            .requires_user_action()
            .then(|| format!("⚠ {}", error.user_message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulk_messenger_core::{GatewayError, PreconditionError, SourceReadError};

    #[test]
    fn test_error_classification() {
        let handler = ErrorHandler::new();

        let timeout = Error::Gateway(GatewayError::Timeout("send".to_string()));
        assert!(handler.handle_error(&timeout, "sending"));

        let missing = Error::Precondition(PreconditionError::MissingImage);
        assert!(!handler.handle_error(&missing, "starting run"));
    }

    #[test]
    fn test_operator_messages() {
        let handler = ErrorHandler::new();

        let column = Error::SourceRead(SourceReadError::MissingColumn("Number".to_string()));
        let message = handler.operator_message(&column).unwrap();
        assert!(message.contains("'Number'"));

        let not_ready = Error::Precondition(PreconditionError::GatewayNotReady);
        assert!(handler
            .operator_message(&not_ready)
            .unwrap()
            .contains("QR code"));
    }

    #[test]
    fn test_recoverable_errors_stay_quiet() {
        let handler = ErrorHandler::new();
        let transport = Error::Gateway(GatewayError::Transport("reset".to_string()));
        assert!(handler.operator_message(&transport).is_none());
    }
}
