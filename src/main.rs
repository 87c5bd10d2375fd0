//! guardian-daemon: voice-triggered emergency alert daemon
//!
//! While the voice trigger feature is enabled and listening is on, the
//! daemon records short audio segments, transcribes each one and looks
//! for trigger words. A match escalates to the selected emergency
//! contact with the current location, then listening switches off until
//! the user turns it back on.
//!
//! Clients drive the feature over a Unix socket:
//! - feature and listening toggles, contact selection, focus loss
//! - trigger word edits (persisted in the data directory)
//! - status queries and state event subscriptions

mod capture;
mod classify;
mod config;
mod contact;
mod controller;
mod cycle;
mod escalation;
mod events;
mod ipc;
mod lexicon;
mod lifecycle;
mod location;
mod notify;
mod permission;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::capture::SilentDevice;
use crate::classify::{Classifier, DisabledClassifier, HttpClassifier};
use crate::config::Config;
use crate::controller::{Collaborators, ControllerHandle, FeatureController};
use crate::events::{Audience, StateEvent};
use crate::ipc::Server;
use crate::lexicon::LexiconStore;
use crate::lifecycle::ShutdownSignal;
use crate::location::FixedLocation;
use crate::notify::EventNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "guardian-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.data_dir, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Controller -> IPC subscribers and the log below
    let (event_tx, _) = broadcast::channel::<StateEvent>(64);
    let mut log_rx = event_tx.subscribe();
    // IPC clients subscribed to those events
    let audience = Audience::default();
    // IPC clients -> controller
    let (command_tx, command_rx) = mpsc::channel(32);

    let store = LexiconStore::new(config.triggers_path());
    let lexicon = store.load_or(&config.trigger_words);
    info!(words = lexicon.len(), "trigger lexicon loaded");

    let classifier: Arc<dyn Classifier> = match &config.classifier_url {
        Some(url) => {
            let http = HttpClassifier::new(url.as_str(), config.classify_timeout)?;
            info!(endpoint = http.endpoint(), "classification endpoint configured");
            Arc::new(http)
        }
        None => {
            warn!("GUARDIAN_CLASSIFIER_URL not set, transcription disabled");
            Arc::new(DisabledClassifier)
        }
    };

    let collaborators = Collaborators {
        device: Arc::new(SilentDevice::new()),
        classifier,
        locator: Arc::new(FixedLocation::new(config.fixed_location)),
        notifier: Arc::new(EventNotifier::new(event_tx.clone(), audience.clone())),
    };

    let controller = FeatureController::new(
        collaborators,
        config.settings(),
        lexicon,
        event_tx.clone(),
    )
    .with_store(store);
    let controller_task = tokio::spawn(controller.run(command_rx));
    let handle = ControllerHandle::new(command_tx);

    let server = Server::new(&config.socket_path, handle.clone(), event_tx.clone(), audience)?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) => info!(%event, "state event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "state event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("state event log exited");
        }

        result = shutdown.wait() => match result {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(?e, "failed to install signal handlers"),
        },
    }

    info!("shutting down...");

    if let Err(e) = handle.teardown().await {
        warn!(?e, "controller already stopped");
    }
    if let Err(e) = controller_task.await {
        error!(?e, "controller task failed");
    }
    server.shutdown().await;

    info!("guardian-daemon stopped");

    Ok(())
}
