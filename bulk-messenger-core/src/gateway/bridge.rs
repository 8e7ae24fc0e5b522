//! HTTP bridge gateway
//!
//! Drives a whatsapp-web bridge exposing an Evolution-API style REST surface:
//!
//! | Operation         | Request                                   |
//! |-------------------|-------------------------------------------|
//! | pair / resume     | `GET  instance/connect/{instance}`        |
//! | session state     | `GET  instance/connectionState/{instance}`|
//! | registration      | `POST chat/whatsappNumbers/{instance}`    |
//! | image / document  | `POST message/sendMedia/{instance}`       |
//! | text              | `POST message/sendText/{instance}`        |
//!
//! Every request carries the `apikey` header. The session id from
//! [`SessionCredentials`] is used as the instance name, so each session keeps
//! its own pairing on the bridge.
//!
//! After `connect`, a watcher task polls the session state. It reports
//! `Authenticated` and `Ready` when the instance opens, refreshes the pairing
//! QR while nobody has scanned it, and reports `Disconnected` when the session
//! closes or the bridge stops answering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{EventSender, GatewayEvent, GatewayResult, MessagingGateway, SessionCredentials};
use crate::contact::ChatAddress;
use crate::content::Content;
use crate::error::GatewayError;

/// A fresh pairing QR is requested after this long without a scan
const QR_REFRESH_INTERVAL: Duration = Duration::from_secs(45);

/// Consecutive failed state polls before the session is declared lost
const MAX_POLL_ERRORS: u32 = 3;

/// Longest response body kept in an error
const MAX_ERROR_BODY: usize = 500;

/// Bridge connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Base URL of the bridge, e.g. `http://localhost:8080`
    pub api_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    /// Interval between session state polls
    pub poll_interval: Duration,
    /// Pairing QRs issued before giving up on a scan
    pub max_qr_retries: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            max_qr_retries: 5,
        }
    }
}

/// Session state as reported by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstanceState {
    Open,
    Connecting,
    Closed,
}

/// Request helper bound to one instance
#[derive(Clone)]
struct BridgeApi {
    client: reqwest::Client,
    config: BridgeConfig,
    instance: String,
}

impl BridgeApi {
    fn endpoint(&self, path: &str) -> String {
        endpoint(&self.config.api_url, path, &self.instance)
    }

    async fn get(&self, path: &str) -> GatewayResult<Value> {
        let response = self
            .client
            .get(self.endpoint(path))
            .header("apikey", &self.config.api_key)
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> GatewayResult<Value> {
        let response = self
            .client
            .post(self.endpoint(path))
            .header("apikey", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }

    /// Ask the bridge to open the instance; yields a pairing code when a scan is needed
    async fn request_pairing(&self) -> GatewayResult<Option<String>> {
        let response = self.get("instance/connect").await?;
        Ok(extract_pairing_code(&response))
    }

    async fn state(&self) -> GatewayResult<InstanceState> {
        let response = self.get("instance/connectionState").await?;
        parse_instance_state(&response).ok_or_else(|| {
            GatewayError::InvalidResponse(format!("no connection state in {}", response))
        })
    }
}

struct ActiveSession {
    api: BridgeApi,
    events: EventSender,
    watcher: JoinHandle<()>,
}

/// Gateway backed by an HTTP whatsapp-web bridge
pub struct BridgeGateway {
    client: reqwest::Client,
    config: BridgeConfig,
    connected: Arc<AtomicBool>,
    session: Mutex<Option<ActiveSession>>,
}

impl BridgeGateway {
    pub fn new(config: BridgeConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            connected: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        })
    }

    fn active_api(&self) -> GatewayResult<BridgeApi> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(GatewayError::NotConnected);
        }
        self.session
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|s| s.api.clone()))
            .ok_or(GatewayError::NotConnected)
    }

    fn take_session(&self) -> Option<ActiveSession> {
        self.session.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl MessagingGateway for BridgeGateway {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn connect(
        &self,
        credentials: &SessionCredentials,
        events: EventSender,
    ) -> GatewayResult<()> {
        if let Some(previous) = self.take_session() {
            previous.watcher.abort();
        }
        self.connected.store(false, Ordering::SeqCst);

        let api = BridgeApi {
            client: self.client.clone(),
            config: self.config.clone(),
            instance: credentials.session_id.clone(),
        };

        info!(
            "[bridge] Connecting instance '{}' at {}",
            api.instance, api.config.api_url
        );

        let pairing = api.request_pairing().await?;
        let issued = match pairing {
            Some(code) => {
                info!("[bridge] Pairing code received, waiting for scan");
                let _ = events.send(GatewayEvent::QrIssued { payload: code });
                1
            }
            None => {
                let _ = events.send(GatewayEvent::LoadingSession {
                    percent: 0,
                    message: Some("Restoring saved session".to_string()),
                });
                0
            }
        };

        let watcher = tokio::spawn(watch_session(
            api.clone(),
            self.connected.clone(),
            events.clone(),
            issued,
        ));

        if let Ok(mut slot) = self.session.lock() {
            *slot = Some(ActiveSession {
                api,
                events,
                watcher,
            });
        }
        Ok(())
    }

    async fn disconnect(&self) -> GatewayResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(session) = self.take_session() {
            session.watcher.abort();
            info!("[bridge] Released instance '{}'", session.api.instance);
            let _ = session.events.send(GatewayEvent::Disconnected {
                reason: "disconnected by user".to_string(),
            });
        }
        Ok(())
    }

    async fn is_registered(&self, address: &ChatAddress) -> GatewayResult<bool> {
        let api = self.active_api()?;
        let response = api
            .post(
                "chat/whatsappNumbers",
                &json!({ "numbers": [address.digits()] }),
            )
            .await?;
        parse_registration(&response, address)
    }

    async fn send_content(&self, address: &ChatAddress, content: &Content) -> GatewayResult<()> {
        let api = self.active_api()?;
        let (path, body) = send_request(address, content);
        debug!("[bridge] {} {} to {}", path, content.kind(), address);
        api.post(path, &body).await?;
        Ok(())
    }
}

impl Drop for BridgeGateway {
    fn drop(&mut self) {
        if let Some(session) = self.take_session() {
            session.watcher.abort();
        }
    }
}

async fn watch_session(
    api: BridgeApi,
    connected: Arc<AtomicBool>,
    events: EventSender,
    mut qr_issued: u32,
) {
    let mut last_qr = Instant::now();
    let mut poll_errors = 0u32;
    let mut ticker = tokio::time::interval(api.config.poll_interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if events.is_closed() {
            debug!("[bridge] Event receiver dropped, stopping watcher");
            break;
        }

        let state = match api.state().await {
            Ok(state) => {
                poll_errors = 0;
                state
            }
            Err(e) => {
                poll_errors += 1;
                warn!(
                    "[bridge] Session state check failed ({}/{}): {}",
                    poll_errors, MAX_POLL_ERRORS, e
                );
                if poll_errors >= MAX_POLL_ERRORS {
                    connected.store(false, Ordering::SeqCst);
                    let _ = events.send(GatewayEvent::Disconnected {
                        reason: e.to_string(),
                    });
                    break;
                }
                continue;
            }
        };

        let was_open = connected.load(Ordering::SeqCst);
        match state {
            InstanceState::Open if !was_open => {
                connected.store(true, Ordering::SeqCst);
                info!("[bridge] Instance '{}' is open", api.instance);
                let _ = events.send(GatewayEvent::Authenticated);
                let _ = events.send(GatewayEvent::Ready);
            }
            InstanceState::Open => {}
            _ if was_open => {
                connected.store(false, Ordering::SeqCst);
                warn!("[bridge] Instance '{}' closed ({:?})", api.instance, state);
                let _ = events.send(GatewayEvent::Disconnected {
                    reason: "session closed by the messaging service".to_string(),
                });
                break;
            }
            _ => {
                if last_qr.elapsed() < QR_REFRESH_INTERVAL {
                    continue;
                }
                if qr_issued >= api.config.max_qr_retries {
                    let _ = events.send(GatewayEvent::Disconnected {
                        reason: "pairing code was not scanned".to_string(),
                    });
                    break;
                }
                match api.request_pairing().await {
                    Ok(Some(code)) => {
                        qr_issued += 1;
                        last_qr = Instant::now();
                        let _ = events.send(GatewayEvent::QrIssued { payload: code });
                    }
                    Ok(None) => last_qr = Instant::now(),
                    Err(e) => warn!("[bridge] Failed to refresh pairing code: {}", e),
                }
            }
        }
    }
}

fn endpoint(api_url: &str, path: &str, instance: &str) -> String {
    format!("{}/{}/{}", api_url.trim_end_matches('/'), path, instance)
}

fn request_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout(error.to_string())
    } else {
        GatewayError::Transport(error.to_string())
    }
}

async fn read_json(response: reqwest::Response) -> GatewayResult<Value> {
    let status = response.status();
    let text = response.text().await.map_err(request_error)?;

    if !status.is_success() {
        let body: String = text.chars().take(MAX_ERROR_BODY).collect();
        return Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

/// Pull the raw pairing string out of a connect response
///
/// Accepts `{"code": ..}`, `{"qrcode": {"code": ..}}` and `{"qrcode": ".."}`.
/// Rendered data-URL images are ignored; the terminal renders from the code.
pub(crate) fn extract_pairing_code(response: &Value) -> Option<String> {
    response["code"]
        .as_str()
        .or_else(|| response["qrcode"]["code"].as_str())
        .or_else(|| {
            response["qrcode"]
                .as_str()
                .filter(|s| !s.starts_with("data:"))
        })
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

/// Accepts `{"instance": {"state": ..}}` and `{"state": ..}`
pub(crate) fn parse_instance_state(response: &Value) -> Option<InstanceState> {
    let state = response["instance"]["state"]
        .as_str()
        .or_else(|| response["state"].as_str())?;
    Some(match state {
        "open" => InstanceState::Open,
        "connecting" => InstanceState::Connecting,
        _ => InstanceState::Closed,
    })
}

/// Read the `exists` flag for `address` from a `whatsappNumbers` response
pub(crate) fn parse_registration(response: &Value, address: &ChatAddress) -> GatewayResult<bool> {
    let entries = response.as_array().ok_or_else(|| {
        GatewayError::InvalidResponse("registration check did not return a list".to_string())
    })?;

    let entry = entries
        .iter()
        .find(|entry| {
            entry["number"].as_str() == Some(address.digits())
                || entry["jid"]
                    .as_str()
                    .is_some_and(|jid| jid.starts_with(address.digits()))
        })
        .or_else(|| entries.first())
        .ok_or_else(|| {
            GatewayError::InvalidResponse("registration check returned no entries".to_string())
        })?;

    entry["exists"].as_bool().ok_or_else(|| {
        GatewayError::InvalidResponse("registration entry has no 'exists' flag".to_string())
    })
}

/// Endpoint and JSON body for one content unit
pub(crate) fn send_request(address: &ChatAddress, content: &Content) -> (&'static str, Value) {
    match content {
        Content::Text { body } => (
            "message/sendText",
            json!({
                "number": address.digits(),
                "text": body,
            }),
        ),
        Content::Image { media, caption } | Content::Document { media, caption } => (
            "message/sendMedia",
            json!({
                "number": address.digits(),
                "mediatype": content.kind().as_str(),
                "mimetype": media.mime_type(),
                "caption": caption,
                "media": media.to_base64(),
                "fileName": media.file_name(),
            }),
        ),
    }
}
