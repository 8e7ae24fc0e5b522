//! Terminal front end
//!
//! Prints notifications (with the pairing QR code drawn in the terminal) and
//! turns typed commands into pause, resume and stop requests.

use anyhow::{anyhow, Result};
use bulk_messenger_core::{
    ConnectionNotice, Notification, NotificationLevel, RunSnapshot, SendController, Subject,
};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A command typed while a run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Stop,
    Status,
    Help,
}

impl ControlCommand {
    /// Parse a typed line; accepts full names and first letters
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Some(Self::Pause),
            "r" | "resume" => Some(Self::Resume),
            "s" | "stop" => Some(Self::Stop),
            "?" | "status" => Some(Self::Status),
            "h" | "help" => Some(Self::Help),
            _ => None,
        }
    }
}

const CONTROL_HELP: &str = "Commands: [p]ause, [r]esume, [s]top, status (?), [h]elp";

/// Render a pairing payload as a terminal QR code
pub fn render_pairing_qr(payload: &str) -> Result<String> {
    let payload = payload.trim();
    if payload.is_empty() {
        anyhow::bail!("QR payload is empty");
    }

    let qr = qrcode::QrCode::new(payload.as_bytes())
        .map_err(|err| anyhow!("Failed to encode pairing QR payload: {err}"))?;

    Ok(qr
        .render::<qrcode::render::unicode::Dense1x2>()
        .quiet_zone(true)
        .build())
}

/// One printable line for a notification
pub fn format_notification(notification: &Notification) -> String {
    let marker = match notification.level {
        NotificationLevel::Info => "•",
        NotificationLevel::Success => "✓",
        NotificationLevel::Warning => "!",
        NotificationLevel::Error => "✗",
    };
    format!(
        "[{}] {} {}",
        notification.at.with_timezone(&chrono::Local).format("%H:%M:%S"),
        marker,
        notification.message()
    )
}

/// Print notifications until every sender is dropped
pub fn spawn_renderer(mut rx: mpsc::UnboundedReceiver<Notification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            println!("{}", format_notification(&notification));

            if let Subject::Connection(ConnectionNotice::QrIssued { payload, .. }) =
                &notification.subject
            {
                match render_pairing_qr(payload) {
                    Ok(qr) => println!("{}", qr),
                    Err(e) => warn!("Cannot draw QR code: {}", e),
                }
            }
        }
        debug!("Notification stream closed");
    })
}

/// Print a one-line status and the running totals of a run
pub fn print_status(snapshot: &RunSnapshot) {
    println!(
        "{} [{}%] sent: {}, not on WhatsApp: {}, failed: {}, remaining: {}",
        snapshot.status_line(),
        snapshot.progress_percent(),
        snapshot.summary.sent,
        snapshot.summary.not_on_service,
        snapshot.summary.failed,
        snapshot.summary.remaining
    );
}

/// Apply one command to the controller
pub async fn apply_command(controller: &SendController, command: ControlCommand) {
    match command {
        ControlCommand::Pause => {
            controller.pause().await;
        }
        ControlCommand::Resume => {
            controller.resume().await;
        }
        ControlCommand::Stop => {
            controller.stop().await;
        }
        ControlCommand::Status => print_status(&controller.snapshot().await),
        ControlCommand::Help => println!("{}", CONTROL_HELP),
    }
}

/// Read commands from stdin and apply them until input ends
pub fn spawn_control_input(controller: Arc<SendController>) -> JoinHandle<()> {
    tokio::spawn(async move {
        println!("{}", CONTROL_HELP);
        let mut lines = BufReader::new(io::stdin()).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match ControlCommand::parse(&line) {
                Some(command) => apply_command(&controller, command).await,
                None => println!("Unknown command '{}'. {}", line.trim(), CONTROL_HELP),
            }
        }
        debug!("Control input closed");
    })
}
