//! Paced, pausable bulk send runs
//!
//! [`SendController`] walks an ordered contact list and, for each contact:
//!
//! 1. checks the number is registered on the messaging service
//!    (unregistered contacts are skipped as `NotOnService`),
//! 2. sends the image with its caption, or the caption alone as text,
//! 3. waits a randomized content delay and sends the document,
//! 4. marks the contact and waits a randomized contact delay before the next.
//!
//! Any gateway failure marks the contact `Failed`, skips its remaining units
//! and waits the flat failure delay instead. The run never aborts on a
//! per-contact failure.
//!
//! ## Control
//!
//! The phase is the single source of truth for pause and stop:
//!
//! ```text
//! Idle -> Running <-> Paused
//!           |           |
//!           v           v
//!       Completed    Stopped
//! ```
//!
//! Pause and stop are observed at contact boundaries only; the contact in
//! flight always finishes. Stop also cuts a pending pacing delay short.
//! A stop that arrives during the last contact still ends the run `Stopped`
//! (with the cursor at the end), while a pause there ends it `Completed`.
//! Pause, resume and stop requests that do not apply to the current phase
//! are ignored with a warning notification.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bulk_messenger_core::{
//!     ConnectionMonitor, ContactList, DryRunGateway, MessagingGateway, RunOptions,
//!     SendController, SessionCredentials, TracingSink,
//! };
//!
//! # async fn example() -> bulk_messenger_core::Result<()> {
//! let sink = Arc::new(TracingSink);
//! let gateway: Arc<dyn MessagingGateway> = Arc::new(DryRunGateway::new());
//! let monitor = ConnectionMonitor::new(sink.clone(), 5);
//! monitor.connect(gateway.clone(), &SessionCredentials::default()).await?;
//! monitor.wait_until_ready().await?;
//!
//! let controller = SendController::new(gateway, monitor.subscribe(), sink);
//! let contacts = ContactList::from_numbers(["9876543210"]);
//! let options = RunOptions {
//!     send_image: false,
//!     send_document: false,
//!     caption: "Hello!".to_string(),
//!     ..RunOptions::default()
//! };
//! controller.start(contacts.into_vec(), options).await?;
//! controller.wait_until_finished().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connection::ConnectionState;
use crate::contact::{AddressPolicy, ChatAddress, Contact, ContactStatus};
use crate::content::{Content, MediaFile};
use crate::delay::{DelayBounds, DEFAULT_CONTACT_DELAY, DEFAULT_CONTENT_DELAY, FAILURE_FALLBACK_DELAY};
use crate::error::{GatewayError, PreconditionError};
use crate::gateway::MessagingGateway;
use crate::notification::{Notification, NotificationSink, RunEvent, WaitReason};

/// Lifecycle phase of a send run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
}

impl RunPhase {
    /// Running or paused
    pub fn is_active(self) -> bool {
        matches!(self, RunPhase::Running | RunPhase::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Stopped | RunPhase::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Paused => "paused",
            RunPhase::Stopped => "stopped",
            RunPhase::Completed => "completed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to send and how to pace it
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub send_image: bool,
    pub send_document: bool,
    pub image: Option<MediaFile>,
    pub document: Option<MediaFile>,
    /// Image caption, or the whole message when no image is sent
    pub caption: String,
    pub document_caption: String,
    /// Between the units sent to one contact
    pub content_delay: DelayBounds,
    /// Between two contacts
    pub contact_delay: DelayBounds,
    /// After a contact that failed
    pub failure_delay: Duration,
    pub address_policy: AddressPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            send_image: true,
            send_document: true,
            image: None,
            document: None,
            caption: String::new(),
            document_caption: String::new(),
            content_delay: DEFAULT_CONTENT_DELAY,
            contact_delay: DEFAULT_CONTACT_DELAY,
            failure_delay: FAILURE_FALLBACK_DELAY,
            address_policy: AddressPolicy::default(),
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<(), PreconditionError> {
        if self.send_image && self.image.is_none() {
            return Err(PreconditionError::MissingImage);
        }
        if self.send_document && self.document.is_none() {
            return Err(PreconditionError::MissingDocument);
        }
        if !self.send_image && !self.send_document && self.caption.trim().is_empty() {
            return Err(PreconditionError::NothingToSend);
        }
        self.content_delay.validate()?;
        self.contact_delay.validate()?;
        Ok(())
    }

    /// First unit for each contact: captioned image, or the caption as text
    fn primary_content(&self) -> Option<Content> {
        match (&self.image, self.send_image) {
            (Some(media), true) => Some(Content::Image {
                media: media.clone(),
                caption: self.caption.clone(),
            }),
            _ if !self.caption.trim().is_empty() => Some(Content::Text {
                body: self.caption.clone(),
            }),
            _ => None,
        }
    }

    fn document_content(&self) -> Option<Content> {
        match (&self.document, self.send_document) {
            (Some(media), true) => Some(Content::Document {
                media: media.clone(),
                caption: self.document_caption.clone(),
            }),
            _ => None,
        }
    }
}

/// Per-status contact counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub sent: usize,
    pub not_on_service: usize,
    pub failed: usize,
    /// Pending or processing
    pub remaining: usize,
}

impl RunSummary {
    pub fn from_contacts<'a>(contacts: impl IntoIterator<Item = &'a Contact>) -> Self {
        contacts
            .into_iter()
            .fold(Self::default(), |mut summary, contact| {
                match contact.status() {
                    ContactStatus::Sent => summary.sent += 1,
                    ContactStatus::NotOnService => summary.not_on_service += 1,
                    ContactStatus::Failed => summary.failed += 1,
                    ContactStatus::Pending | ContactStatus::Processing => summary.remaining += 1,
                }
                summary
            })
    }
}

/// Point-in-time view of a run for status displays
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub phase: RunPhase,
    /// Contacts fully processed
    pub cursor: usize,
    pub total: usize,
    pub summary: RunSummary,
    pub contacts: Vec<Contact>,
}

impl RunSnapshot {
    pub fn progress_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.cursor * 100) / self.total).min(100) as u8
    }

    pub fn status_line(&self) -> String {
        match self.phase {
            RunPhase::Idle => "Ready".to_string(),
            RunPhase::Running => format!(
                "Processing contact {} of {}",
                (self.cursor + 1).min(self.total),
                self.total
            ),
            RunPhase::Paused => format!("Paused ({} of {})", self.cursor, self.total),
            RunPhase::Stopped => format!("Stopped ({} of {})", self.cursor, self.total),
            RunPhase::Completed => format!("Completed ({} of {})", self.cursor, self.total),
        }
    }
}

#[derive(Default)]
struct RunState {
    contacts: Vec<Contact>,
    cursor: usize,
}

/// Drives send runs against a messaging gateway
pub struct SendController {
    gateway: Arc<dyn MessagingGateway>,
    connection: watch::Receiver<ConnectionState>,
    sink: Arc<dyn NotificationSink>,
    phase: Arc<watch::Sender<RunPhase>>,
    state: Arc<RwLock<RunState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SendController {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        connection: watch::Receiver<ConnectionState>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            gateway,
            connection,
            sink,
            phase: Arc::new(phase),
            state: Arc::new(RwLock::new(RunState::default())),
            task: Mutex::new(None),
        }
    }

    /// Start a run over `contacts`
    ///
    /// Contacts are reset to `Pending` and the cursor to zero. Nothing is
    /// changed when a precondition fails.
    pub async fn start(
        &self,
        contacts: Vec<Contact>,
        options: RunOptions,
    ) -> Result<(), PreconditionError> {
        let mut task = self.task.lock().await;

        let result = self.check_start(&task, &contacts, &options);
        if let Err(reason) = result {
            self.notify(RunEvent::StartRejected {
                reason: reason.clone(),
            });
            return Err(reason);
        }

        let total = contacts.len();
        {
            let mut state = self.state.write().await;
            state.contacts = contacts.into_iter().map(Contact::reset).collect();
            state.cursor = 0;
        }
        self.phase.send_replace(RunPhase::Running);

        info!("Starting send run over {} contacts", total);
        self.notify(RunEvent::Started { total });

        let run = RunLoop {
            gateway: self.gateway.clone(),
            connection: self.connection.clone(),
            sink: self.sink.clone(),
            phase: self.phase.clone(),
            state: self.state.clone(),
            primary: options.primary_content(),
            document: options.document_content(),
            options: Arc::new(options),
            total,
        };
        *task = Some(tokio::spawn(run.run()));
        Ok(())
    }

    fn check_start(
        &self,
        task: &Option<JoinHandle<()>>,
        contacts: &[Contact],
        options: &RunOptions,
    ) -> Result<(), PreconditionError> {
        let phase = *self.phase.borrow();
        if phase.is_active() {
            return Err(PreconditionError::AlreadyRunning(phase));
        }
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(PreconditionError::PreviousRunDraining);
        }
        if !self.connection.borrow().is_ready() {
            return Err(PreconditionError::GatewayNotReady);
        }
        if contacts.is_empty() {
            return Err(PreconditionError::NoContacts);
        }
        options.validate()
    }

    /// Pause after the contact in flight; returns whether the request applied
    pub async fn pause(&self) -> bool {
        self.transition("pause", RunPhase::Paused, |phase| phase == RunPhase::Running)
            .await
    }

    /// Continue a paused run from its cursor
    pub async fn resume(&self) -> bool {
        self.transition("resume", RunPhase::Running, |phase| phase == RunPhase::Paused)
            .await
    }

    /// Stop the run after the contact in flight
    pub async fn stop(&self) -> bool {
        self.transition("stop", RunPhase::Stopped, RunPhase::is_active)
            .await
    }

    async fn transition(
        &self,
        request: &'static str,
        target: RunPhase,
        allowed: impl Fn(RunPhase) -> bool,
    ) -> bool {
        let mut from = RunPhase::Idle;
        let applied = self.phase.send_if_modified(|phase| {
            from = *phase;
            if allowed(*phase) {
                *phase = target;
                true
            } else {
                false
            }
        });

        if !applied {
            self.notify(RunEvent::ControlIgnored {
                request,
                phase: from,
            });
            return false;
        }

        let (cursor, total) = {
            let state = self.state.read().await;
            (state.cursor, state.contacts.len())
        };
        info!("Run {} -> {} at {} of {}", from, target, cursor, total);
        self.notify(match target {
            RunPhase::Paused => RunEvent::Paused { cursor, total },
            RunPhase::Running => RunEvent::Resumed { cursor, total },
            _ => RunEvent::Stopped { cursor, total },
        });
        true
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes
    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        let phase = self.phase();
        let state = self.state.read().await;
        RunSnapshot {
            phase,
            cursor: state.cursor,
            total: state.contacts.len(),
            summary: RunSummary::from_contacts(&state.contacts),
            contacts: state.contacts.clone(),
        }
    }

    /// Wait for the current run to reach a terminal phase and its task to exit
    pub async fn wait_until_finished(&self) -> RunPhase {
        let mut rx = self.phase.subscribe();
        let phase = wait_for_phase(&mut rx, |phase| !phase.is_active()).await;

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!("Run task ended abnormally: {}", e);
            }
        }
        phase.unwrap_or(RunPhase::Idle)
    }

    fn notify(&self, event: RunEvent) {
        self.sink.notify(Notification::run(event));
    }
}

impl Drop for SendController {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

/// Wait until `accept` holds for the current phase
async fn wait_for_phase(
    rx: &mut watch::Receiver<RunPhase>,
    accept: impl Fn(RunPhase) -> bool,
) -> Option<RunPhase> {
    loop {
        let phase = *rx.borrow_and_update();
        if accept(phase) {
            return Some(phase);
        }
        if rx.changed().await.is_err() {
            return None;
        }
    }
}

/// State owned by one spawned run
struct RunLoop {
    gateway: Arc<dyn MessagingGateway>,
    connection: watch::Receiver<ConnectionState>,
    sink: Arc<dyn NotificationSink>,
    phase: Arc<watch::Sender<RunPhase>>,
    state: Arc<RwLock<RunState>>,
    options: Arc<RunOptions>,
    primary: Option<Content>,
    document: Option<Content>,
    total: usize,
}

impl RunLoop {
    async fn run(self) {
        let mut phase_rx = self.phase.subscribe();

        loop {
            let phase = match wait_for_phase(&mut phase_rx, |p| p != RunPhase::Paused).await {
                Some(phase) => phase,
                None => break,
            };
            if phase != RunPhase::Running {
                debug!("Run loop exiting in phase {}", phase);
                break;
            }

            let cursor = self.state.read().await.cursor;
            if !self.connection.borrow().is_ready() {
                let stopped = self.phase.send_if_modified(|p| {
                    if p.is_active() {
                        *p = RunPhase::Stopped;
                        true
                    } else {
                        false
                    }
                });
                if stopped {
                    self.notify(RunEvent::SessionLost {
                        cursor,
                        total: self.total,
                    });
                }
                break;
            }

            let status = self.process(cursor).await;

            let cursor = {
                let mut state = self.state.write().await;
                state.cursor += 1;
                state.cursor
            };
            if cursor >= self.total {
                self.complete().await;
                break;
            }

            if *self.phase.borrow() == RunPhase::Running {
                let delay = match status {
                    ContactStatus::Failed => self.options.failure_delay,
                    _ => self.options.contact_delay.sample(),
                };
                self.notify(RunEvent::Waiting {
                    delay,
                    reason: WaitReason::NextContact,
                });
                self.pace(delay, &mut phase_rx).await;
            }
        }
    }

    /// Process the contact at `index` and return its final status
    async fn process(&self, index: usize) -> ContactStatus {
        let address = {
            let mut state = self.state.write().await;
            let contact = &mut state.contacts[index];
            contact.transition(ContactStatus::Processing);
            contact.address(&self.options.address_policy)
        };
        self.notify(RunEvent::ContactStarted {
            index,
            total: self.total,
            address: address.clone(),
        });

        let status = self.deliver(index, &address).await;

        let mut state = self.state.write().await;
        state.contacts[index].transition(status);
        status
    }

    async fn deliver(&self, index: usize, address: &ChatAddress) -> ContactStatus {
        match self.gateway.is_registered(address).await {
            Ok(true) => self.notify(RunEvent::Registered {
                index,
                address: address.clone(),
            }),
            Ok(false) => {
                self.notify(RunEvent::NotRegistered {
                    index,
                    address: address.clone(),
                });
                return ContactStatus::NotOnService;
            }
            Err(e) => {
                self.record_error(index, &e).await;
                self.notify(RunEvent::RegistrationFailed {
                    index,
                    address: address.clone(),
                    error: e.to_string(),
                });
                return ContactStatus::Failed;
            }
        }

        let mut sent_any = false;
        if let Some(content) = &self.primary {
            if self.send(index, address, content).await.is_err() {
                return ContactStatus::Failed;
            }
            sent_any = true;
        }

        if let Some(content) = &self.document {
            if sent_any {
                let delay = self.options.content_delay.sample();
                self.notify(RunEvent::Waiting {
                    delay,
                    reason: WaitReason::BeforeDocument,
                });
                tokio::time::sleep(delay).await;
            }
            if self.send(index, address, content).await.is_err() {
                return ContactStatus::Failed;
            }
        }

        ContactStatus::Sent
    }

    async fn send(
        &self,
        index: usize,
        address: &ChatAddress,
        content: &Content,
    ) -> Result<(), GatewayError> {
        let kind = content.kind();
        match self.gateway.send_content(address, content).await {
            Ok(()) => {
                self.state.write().await.contacts[index].record_delivery(kind);
                self.notify(RunEvent::UnitSent {
                    index,
                    address: address.clone(),
                    kind,
                });
                Ok(())
            }
            Err(e) => {
                self.record_error(index, &e).await;
                self.notify(RunEvent::UnitFailed {
                    index,
                    address: address.clone(),
                    kind,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn record_error(&self, index: usize, error: &GatewayError) {
        self.state.write().await.contacts[index].record_error(error.to_string());
    }

    /// Sleep for `delay`, returning early if the run is stopped
    async fn pace(&self, delay: Duration, phase_rx: &mut watch::Receiver<RunPhase>) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_for_phase(phase_rx, |p| p == RunPhase::Stopped) => {
                debug!("Pacing delay cut short by stop");
            }
        }
    }

    async fn complete(&self) {
        let summary = {
            let state = self.state.read().await;
            RunSummary::from_contacts(&state.contacts)
        };
        let completed = self.phase.send_if_modified(|p| {
            if p.is_active() {
                *p = RunPhase::Completed;
                true
            } else {
                false
            }
        });
        if completed {
            info!(
                "Run completed: {} sent, {} not on service, {} failed",
                summary.sent, summary.not_on_service, summary.failed
            );
            self.notify(RunEvent::Completed { summary });
        }
    }

    fn notify(&self, event: RunEvent) {
        self.sink.notify(Notification::run(event));
    }
}
