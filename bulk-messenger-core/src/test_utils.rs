//! Test doubles shared by the unit tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::time::Instant;

use crate::connection::ConnectionState;
use crate::contact::ChatAddress;
use crate::content::{Content, ContentKind};
use crate::error::GatewayError;
use crate::gateway::{
    EventSender, GatewayEvent, GatewayResult, MessagingGateway, SessionCredentials,
};

/// A request seen by [`ScriptedGateway`], keyed by address digits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    IsRegistered(String),
    Send(String, ContentKind),
}

struct GateInner {
    permits: Semaphore,
    entered: Notify,
}

/// Holds every gateway call until released
pub struct Gate {
    inner: Arc<GateInner>,
}

impl Gate {
    /// Resolves once a call has entered the gateway
    pub async fn entered(&self) {
        self.inner.entered.notified().await;
    }

    /// Let `calls` more gateway calls through
    pub fn release(&self, calls: usize) {
        self.inner.permits.add_permits(calls);
    }
}

/// Gateway with scripted answers that records every call
#[derive(Default)]
pub struct ScriptedGateway {
    unregistered: HashSet<String>,
    failing_registration: HashSet<String>,
    failing_sends: HashSet<(String, ContentKind)>,
    calls: Mutex<Vec<(GatewayCall, Instant)>>,
    gate: Option<Arc<GateInner>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unregistered(mut self, digits: &str) -> Self {
        self.unregistered.insert(digits.to_string());
        self
    }

    pub fn failing_registration(mut self, digits: &str) -> Self {
        self.failing_registration.insert(digits.to_string());
        self
    }

    pub fn failing_send(mut self, digits: &str, kind: ContentKind) -> Self {
        self.failing_sends.insert((digits.to_string(), kind));
        self
    }

    pub fn gated(mut self) -> (Self, Gate) {
        let inner = Arc::new(GateInner {
            permits: Semaphore::new(0),
            entered: Notify::new(),
        });
        self.gate = Some(inner.clone());
        (self, Gate { inner })
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    async fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push((call, Instant::now()));
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            if let Ok(permit) = gate.permits.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl MessagingGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(
        &self,
        _credentials: &SessionCredentials,
        events: EventSender,
    ) -> GatewayResult<()> {
        let _ = events.send(GatewayEvent::Authenticated);
        let _ = events.send(GatewayEvent::Ready);
        Ok(())
    }

    async fn disconnect(&self) -> GatewayResult<()> {
        Ok(())
    }

    async fn is_registered(&self, address: &ChatAddress) -> GatewayResult<bool> {
        let digits = address.digits().to_string();
        self.record(GatewayCall::IsRegistered(digits.clone())).await;
        if self.failing_registration.contains(&digits) {
            return Err(GatewayError::Timeout("isRegisteredUser".to_string()));
        }
        Ok(!self.unregistered.contains(&digits))
    }

    async fn send_content(&self, address: &ChatAddress, content: &Content) -> GatewayResult<()> {
        let digits = address.digits().to_string();
        let kind = content.kind();
        self.record(GatewayCall::Send(digits.clone(), kind)).await;
        if self.failing_sends.contains(&(digits, kind)) {
            return Err(GatewayError::Rejected {
                status: 500,
                body: "media upload failed".to_string(),
            });
        }
        Ok(())
    }
}

/// A connection watch that already reports `Ready`
pub fn ready_connection() -> (
    watch::Sender<ConnectionState>,
    watch::Receiver<ConnectionState>,
) {
    watch::channel(ConnectionState::Ready)
}
