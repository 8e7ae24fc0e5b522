//! Sender Configuration
//!
//! Persistent settings for the bulk messenger, stored as TOML. Every field has
//! a default, so a partial file (or none at all) loads.

use anyhow::{Context, Result};
use bulk_messenger_core::{AddressPolicy, BridgeConfig, DelayBounds, Error, SessionCredentials};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Sender configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Messaging gateway connection
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Pacing between sends
    #[serde(default)]
    pub delays: DelayConfig,

    /// Phone number normalization
    #[serde(default)]
    pub addressing: AddressingConfig,

    /// Message content defaults
    #[serde(default)]
    pub message: MessageConfig,

    /// Files used by the last run
    #[serde(default)]
    pub files: RecentFiles,

    /// Where this configuration is saved
    #[serde(skip)]
    pub path: PathBuf,
}

/// Which gateway implementation to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// HTTP whatsapp-web bridge
    #[default]
    Bridge,
    /// Log every send without contacting anyone
    DryRun,
}

/// Messaging gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Base URL of the bridge
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Value of the `apikey` header
    #[serde(default)]
    pub api_key: String,

    /// Saved session; also the bridge instance name
    #[serde(default = "default_session_id")]
    pub session_id: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// QR codes shown before warning that nobody scanned
    #[serde(default = "default_max_qr_retries")]
    pub max_qr_retries: u32,
}

/// Delay configuration, in whole seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Between the image and the document sent to one contact
    #[serde(default = "default_content_min")]
    pub content_min_secs: u64,

    #[serde(default = "default_content_max")]
    pub content_max_secs: u64,

    /// Between two contacts
    #[serde(default = "default_contact_min")]
    pub contact_min_secs: u64,

    #[serde(default = "default_contact_max")]
    pub contact_max_secs: u64,

    /// After a contact that failed
    #[serde(default = "default_failure_delay")]
    pub failure_delay_secs: u64,
}

/// Address normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressingConfig {
    /// Country code added to national numbers, without `+`
    #[serde(default = "default_country_code")]
    pub country_code: String,

    #[serde(default = "default_national_number_length")]
    pub national_number_length: usize,
}

/// Message content defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Image caption, or the text message when no image is sent
    #[serde(default)]
    pub caption: String,

    #[serde(default = "default_document_caption")]
    pub document_caption: String,

    #[serde(default = "default_true")]
    pub send_image: bool,

    #[serde(default = "default_true")]
    pub send_document: bool,
}

/// Last-used files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentFiles {
    #[serde(default)]
    pub contacts: Option<PathBuf>,

    #[serde(default)]
    pub image: Option<PathBuf>,

    #[serde(default)]
    pub document: Option<PathBuf>,
}

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_session_id() -> String {
    SessionCredentials::default().session_id
}

fn default_request_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    2
}

fn default_max_qr_retries() -> u32 {
    bulk_messenger_core::connection::DEFAULT_MAX_QR_RETRIES
}

fn default_content_min() -> u64 {
    2
}

fn default_content_max() -> u64 {
    5
}

fn default_contact_min() -> u64 {
    5
}

fn default_contact_max() -> u64 {
    10
}

fn default_failure_delay() -> u64 {
    3
}

fn default_country_code() -> String {
    bulk_messenger_core::contact::DEFAULT_COUNTRY_CODE.to_string()
}

fn default_national_number_length() -> usize {
    bulk_messenger_core::contact::DEFAULT_NATIONAL_NUMBER_LENGTH
}

fn default_document_caption() -> String {
    "📄 Our Services Brochure".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            api_url: default_api_url(),
            api_key: String::new(),
            session_id: default_session_id(),
            request_timeout_secs: default_request_timeout(),
            poll_interval_secs: default_poll_interval(),
            max_qr_retries: default_max_qr_retries(),
        }
    }
}

impl GatewayConfig {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            max_qr_retries: self.max_qr_retries,
        }
    }

    pub fn credentials(&self) -> SessionCredentials {
        SessionCredentials::new(self.session_id.clone())
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            content_min_secs: default_content_min(),
            content_max_secs: default_content_max(),
            contact_min_secs: default_contact_min(),
            contact_max_secs: default_contact_max(),
            failure_delay_secs: default_failure_delay(),
        }
    }
}

impl DelayConfig {
    /// Bounds between units; validated when a run starts
    pub fn content(&self) -> DelayBounds {
        DelayBounds {
            min_secs: self.content_min_secs,
            max_secs: self.content_max_secs,
        }
    }

    pub fn contact(&self) -> DelayBounds {
        DelayBounds {
            min_secs: self.contact_min_secs,
            max_secs: self.contact_max_secs,
        }
    }

    pub fn failure(&self) -> Duration {
        Duration::from_secs(self.failure_delay_secs)
    }
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
            national_number_length: default_national_number_length(),
        }
    }
}

impl AddressingConfig {
    pub fn policy(&self) -> AddressPolicy {
        AddressPolicy {
            country_code: self
                .country_code
                .trim_start_matches('+')
                .to_string(),
            national_number_length: self.national_number_length,
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            caption: String::new(),
            document_caption: default_document_caption(),
            send_image: true,
            send_document: true,
        }
    }
}

impl Config {
    /// Default location: `<config_dir>/bulk-messenger/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("bulk-messenger")
            .join(CONFIG_FILE_NAME)
    }

    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from `path`, creating a default file if missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.path = path.to_path_buf();
            Ok(config)
        } else {
            let config = Config {
                path: path.to_path_buf(),
                ..Config::default()
            };
            config.save()?;
            tracing::info!("Created default configuration at {}", path.display());
            Ok(config)
        }
    }

    /// Save configuration to the file it was loaded from
    pub fn save(&self) -> Result<()> {
        let path = if self.path.as_os_str().is_empty() {
            Self::default_path()
        } else {
            self.path.clone()
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Check the settings a run on `backend` depends on
    ///
    /// Delay bounds are left to the run's own start checks.
    pub fn validate(&self, backend: Backend) -> bulk_messenger_core::Result<()> {
        let invalid = |msg: &str| -> bulk_messenger_core::Result<()> {
            Err(Error::Configuration(msg.to_string()))
        };

        if backend == Backend::Bridge && self.gateway.api_url.trim().is_empty() {
            return invalid("gateway.api_url is empty");
        }
        if self.gateway.session_id.trim().is_empty() {
            return invalid("gateway.session_id is empty");
        }
        let country_code = self.addressing.country_code.trim_start_matches('+');
        if country_code.is_empty() || !country_code.bytes().all(|b| b.is_ascii_digit()) {
            return invalid("addressing.country_code must be digits");
        }
        if self.addressing.national_number_length == 0 {
            return invalid("addressing.national_number_length must be positive");
        }
        Ok(())
    }

    /// Remember the files of a run that started successfully
    pub fn remember_files(
        &mut self,
        contacts: &Path,
        image: Option<&Path>,
        document: Option<&Path>,
    ) {
        self.files.contacts = Some(contacts.to_path_buf());
        if let Some(image) = image {
            self.files.image = Some(image.to_path_buf());
        }
        if let Some(document) = document {
            self.files.document = Some(document.to_path_buf());
        }
    }

    /// Configuration as TOML, with the API key masked unless `show_sensitive`
    pub fn to_display_toml(&self, show_sensitive: bool) -> Result<String> {
        let mut shown = self.clone();
        if !show_sensitive && !shown.gateway.api_key.is_empty() {
            shown.gateway.api_key = "********".to_string();
        }
        toml::to_string_pretty(&shown).context("Failed to serialize config")
    }
}
