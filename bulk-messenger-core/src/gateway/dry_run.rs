//! Gateway that logs instead of sending
//!
//! Useful to rehearse a run (contact sheet, captions, pacing) without a
//! linked phone. Every address counts as registered.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use super::{EventSender, GatewayEvent, GatewayResult, MessagingGateway, SessionCredentials};
use crate::contact::ChatAddress;
use crate::content::Content;
use crate::error::GatewayError;

#[derive(Debug, Default)]
pub struct DryRunGateway {
    connected: AtomicBool,
    units_sent: AtomicUsize,
    events: Mutex<Option<EventSender>>,
}

impl DryRunGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content units accepted since creation
    pub fn units_sent(&self) -> usize {
        self.units_sent.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> GatewayResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }
}

#[async_trait]
impl MessagingGateway for DryRunGateway {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn connect(
        &self,
        credentials: &SessionCredentials,
        events: EventSender,
    ) -> GatewayResult<()> {
        info!("[dry-run] Opening {}", credentials);
        self.connected.store(true, Ordering::SeqCst);

        let _ = events.send(GatewayEvent::Authenticated);
        let _ = events.send(GatewayEvent::Ready);

        if let Ok(mut slot) = self.events.lock() {
            *slot = Some(events);
        }
        Ok(())
    }

    async fn disconnect(&self) -> GatewayResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        let sender = self.events.lock().ok().and_then(|mut slot| slot.take());
        if let Some(events) = sender {
            let _ = events.send(GatewayEvent::Disconnected {
                reason: "session closed".to_string(),
            });
        }
        Ok(())
    }

    async fn is_registered(&self, address: &ChatAddress) -> GatewayResult<bool> {
        self.ensure_connected()?;
        info!("[dry-run] Assuming {} is registered", address);
        Ok(true)
    }

    async fn send_content(&self, address: &ChatAddress, content: &Content) -> GatewayResult<()> {
        self.ensure_connected()?;
        match content.media() {
            Some(media) => info!(
                "[dry-run] Would send {} '{}' ({} bytes) to {}",
                content.kind(),
                media.file_name(),
                media.len(),
                address
            ),
            None => info!(
                "[dry-run] Would send text ({} chars) to {}",
                content.text().chars().count(),
                address
            ),
        }
        self.units_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
