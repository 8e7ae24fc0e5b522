mod config;
mod console;
mod diagnostics;
mod error_handler;

use anyhow::{Context, Result};
use bulk_messenger_core::{
    source, BridgeGateway, ChannelSink, ConnectionMonitor, ContactList, ContactStatus,
    DryRunGateway, Error, FanoutSink, MediaFile, MessagingGateway, NotificationSink, RunOptions,
    RunPhase, SendController, SessionCredentials, TracingSink,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use config::{Backend, Config};
use diagnostics::{format_bytes, BuildInfo, Cli, Command, SendArgs};
use error_handler::ErrorHandler;

/// Time given to the renderer to print the last notifications
const RENDER_FLUSH_TIMEOUT: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    diagnostics::init_logging(&cli)?;

    match cli.command {
        Command::Version { verbose } => {
            println!("{}", BuildInfo::get().summary(verbose));
            Ok(())
        }
        Command::Config { show_sensitive } => {
            let config = load_config(cli.config.as_deref())?;
            println!("# {}", config.path.display());
            println!("{}", config.to_display_toml(show_sensitive)?);
            Ok(())
        }
        Command::Contacts { contacts } => {
            let config = load_config(cli.config.as_deref())?;
            list_contacts(&config, contacts)
        }
        Command::Send(args) => {
            let mut config = load_config(cli.config.as_deref())?;
            send(&mut config, args, cli.json_logs).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")
}

fn contacts_path(config: &Config, given: Option<PathBuf>) -> Result<PathBuf> {
    given
        .or_else(|| config.files.contacts.clone())
        .context("No contact sheet given. Pass --contacts <FILE>.")
}

fn load_contacts(path: &Path, handler: &ErrorHandler) -> Result<ContactList> {
    source::load(path).map_err(|e| {
        let error = Error::from(e);
        handler.handle_error(&error, "loading contacts");
        anyhow::Error::new(error)
    })
}

fn list_contacts(config: &Config, given: Option<PathBuf>) -> Result<()> {
    let path = contacts_path(config, given)?;
    let contacts = load_contacts(&path, &ErrorHandler::new())?;
    let policy = config.addressing.policy();

    println!("{} contacts in {}", contacts.len(), path.display());
    for (index, contact) in contacts.iter().enumerate() {
        println!(
            "{:>4}  {:<20} {}",
            index + 1,
            contact.raw_number(),
            contact.address(&policy)
        );
    }
    Ok(())
}

/// Load a media file when its content is enabled
async fn load_media(
    enabled: bool,
    path: Option<&Path>,
    handler: &ErrorHandler,
) -> Result<Option<MediaFile>> {
    let Some(path) = path.filter(|_| enabled) else {
        return Ok(None);
    };
    match MediaFile::from_path(path).await {
        Ok(media) => {
            info!(
                "Loaded {} ({}, {})",
                media.file_name(),
                media.mime_type(),
                format_bytes(media.len() as u64)
            );
            Ok(Some(media))
        }
        Err(e) => {
            handler.handle_error(&e, "loading media");
            Err(e.into())
        }
    }
}

async fn send(config: &mut Config, args: SendArgs, json_logs: bool) -> Result<()> {
    let handler = ErrorHandler::new();

    let backend = if args.dry_run {
        Backend::DryRun
    } else {
        config.gateway.backend
    };
    if let Err(e) = config.validate(backend) {
        handler.handle_error(&e, "checking configuration");
        return Err(e.into());
    }

    let contacts_file = contacts_path(config, args.contacts)?;
    let contacts = load_contacts(&contacts_file, &handler)?;

    let send_image = config.message.send_image && !args.no_image;
    let send_document = config.message.send_document && !args.no_document;
    let image_file = args.image.or_else(|| config.files.image.clone());
    let document_file = args.document.or_else(|| config.files.document.clone());

    let options = RunOptions {
        send_image,
        send_document,
        image: load_media(send_image, image_file.as_deref(), &handler).await?,
        document: load_media(send_document, document_file.as_deref(), &handler).await?,
        caption: args.caption.unwrap_or_else(|| config.message.caption.clone()),
        document_caption: args
            .document_caption
            .unwrap_or_else(|| config.message.document_caption.clone()),
        content_delay: config.delays.content(),
        contact_delay: config.delays.contact(),
        failure_delay: config.delays.failure(),
        address_policy: config.addressing.policy(),
    };

    // Reject bad options before asking anyone to scan a QR code
    if let Err(reason) = options.validate() {
        let error = Error::from(reason);
        handler.handle_error(&error, "preparing run");
        return Err(error.into());
    }

    let (channel_sink, notifications) = ChannelSink::new();
    let mut sink = FanoutSink::default().with(Arc::new(channel_sink));
    if json_logs {
        sink = sink.with(Arc::new(TracingSink));
    }
    let sink: Arc<dyn NotificationSink> = Arc::new(sink);
    let renderer = console::spawn_renderer(notifications);

    let gateway: Arc<dyn MessagingGateway> = match backend {
        Backend::DryRun => Arc::new(DryRunGateway::new()),
        Backend::Bridge => {
            let bridge = BridgeGateway::new(config.gateway.bridge_config())
                .context("Failed to create bridge gateway")?;
            Arc::new(bridge)
        }
    };
    let credentials = args
        .session
        .map(SessionCredentials::new)
        .unwrap_or_else(|| config.gateway.credentials());

    let monitor = ConnectionMonitor::new(sink.clone(), config.gateway.max_qr_retries);
    monitor.connect(gateway.clone(), &credentials).await?;

    let ready = tokio::select! {
        ready = monitor.wait_until_ready() => ready.map_err(Error::from),
        _ = tokio::signal::ctrl_c() => Err(Error::invalid_state("interrupted while connecting")),
    };
    if let Err(e) = ready {
        handler.handle_error(&e, "connecting");
        shutdown(&monitor, gateway.as_ref(), &handler).await;
        return Err(e.into());
    }

    let controller = Arc::new(SendController::new(
        gateway.clone(),
        monitor.subscribe(),
        sink.clone(),
    ));
    if let Err(reason) = controller.start(contacts.into_vec(), options).await {
        let error = Error::from(reason);
        handler.handle_error(&error, "starting run");
        shutdown(&monitor, gateway.as_ref(), &handler).await;
        return Err(error.into());
    }

    config.remember_files(
        &contacts_file,
        image_file.as_deref().filter(|_| send_image),
        document_file.as_deref().filter(|_| send_document),
    );
    if let Err(e) = config.save() {
        warn!("Failed to remember selected files: {:#}", e);
    }

    let input = console::spawn_control_input(controller.clone());
    let phase = tokio::select! {
        phase = controller.wait_until_finished() => phase,
        _ = tokio::signal::ctrl_c() => {
            println!("Stopping after the current contact...");
            controller.stop().await;
            controller.wait_until_finished().await
        }
    };
    input.abort();

    let snapshot = controller.snapshot().await;
    console::print_status(&snapshot);
    for contact in snapshot
        .contacts
        .iter()
        .filter(|c| c.status() == ContactStatus::Failed)
    {
        println!(
            "  {}: {}",
            contact.raw_number(),
            contact.report().error.as_deref().unwrap_or("failed")
        );
    }

    shutdown(&monitor, gateway.as_ref(), &handler).await;
    drop(controller);
    drop(monitor);
    drop(sink);
    let _ = tokio::time::timeout(RENDER_FLUSH_TIMEOUT, renderer).await;

    if phase != RunPhase::Completed {
        info!("Run ended while {}", phase);
    }
    Ok(())
}

async fn shutdown(
    monitor: &ConnectionMonitor,
    gateway: &dyn MessagingGateway,
    handler: &ErrorHandler,
) {
    if let Err(e) = monitor.disconnect(gateway).await {
        handler.handle_error(&e, "disconnecting");
    }
}
