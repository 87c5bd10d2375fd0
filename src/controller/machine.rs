//! Core feature controller implementation
//!
//! Owns the gates, the contact snapshot and the analysis cycle, and
//! serializes every transition through one task: user toggles, focus
//! loss, cycle signals and escalation reports all arrive as messages, so
//! a pending tick can never race a concurrent disable.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::gate::GateState;
use super::handle::{Command, TriggerUpdate};
use crate::capture::{AudioDevice, CaptureError};
use crate::classify::Classifier;
use crate::contact::EmergencyContact;
use crate::cycle::{AnalysisCycle, CycleSignal, CycleState, CycleTiming};
use crate::escalation::{EscalationPipeline, EscalationReport};
use crate::events::{StateEvent, StopReason};
use crate::lexicon::{LexiconError, LexiconStore, TriggerLexicon, TriggerWord};
use crate::location::LocationProvider;
use crate::notify::Notifier;

/// External services the controller drives
pub struct Collaborators {
    pub device: Arc<dyn AudioDevice>,
    pub classifier: Arc<dyn Classifier>,
    pub locator: Arc<dyn LocationProvider>,
    pub notifier: Arc<dyn Notifier>,
}

/// Timing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub timing: CycleTiming,
    pub location_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timing: CycleTiming::default(),
            location_timeout: Duration::from_secs(15),
        }
    }
}

/// Why a request to start listening was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListeningError {
    #[error("voice trigger feature is disabled")]
    FeatureDisabled,

    #[error("set an emergency contact before enabling voice trigger")]
    MissingContact,

    #[error("microphone permission is required for voice trigger")]
    PermissionDenied,

    #[error("an emergency alert is still being sent")]
    EscalationInProgress,

    #[error("failed to start capture: {0}")]
    Capture(CaptureError),
}

impl ListeningError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ListeningError::FeatureDisabled => "feature_disabled",
            ListeningError::MissingContact => "missing_contact",
            ListeningError::PermissionDenied => "permission_denied",
            ListeningError::EscalationInProgress => "escalation_in_progress",
            ListeningError::Capture(_) => "capture_failed",
        }
    }
}

/// Snapshot of everything the presentation layer shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub feature_enabled: bool,
    pub listening: bool,
    pub cycle: CycleState,
    pub contact: Option<EmergencyContact>,
    pub trigger_words: Vec<TriggerWord>,
    pub escalating: bool,
    pub uptime_secs: u64,
}

/// Escalation task spawned for a run
struct InFlightEscalation {
    run_id: u64,
    task: JoinHandle<()>,
}

/// The voice trigger state machine
pub struct FeatureController {
    gate: GateState,
    contact: Option<Arc<EmergencyContact>>,
    lexicon: Arc<RwLock<TriggerLexicon>>,
    store: Option<LexiconStore>,
    cycle: AnalysisCycle,
    pipeline: EscalationPipeline,
    event_tx: broadcast::Sender<StateEvent>,
    signal_rx: mpsc::Receiver<CycleSignal>,
    report_tx: mpsc::Sender<(u64, EscalationReport)>,
    report_rx: mpsc::Receiver<(u64, EscalationReport)>,
    escalation: Option<InFlightEscalation>,
    started_at: Instant,
}

impl FeatureController {
    pub fn new(
        collaborators: Collaborators,
        settings: Settings,
        lexicon: TriggerLexicon,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        let lexicon = Arc::new(RwLock::new(lexicon));
        let (signal_tx, signal_rx) = mpsc::channel(16);
        let (report_tx, report_rx) = mpsc::channel(4);

        let cycle = AnalysisCycle::new(
            collaborators.device,
            collaborators.classifier,
            Arc::clone(&lexicon),
            settings.timing,
            event_tx.clone(),
            signal_tx,
        );
        let pipeline = EscalationPipeline::new(
            collaborators.locator,
            collaborators.notifier,
            settings.location_timeout,
        );

        Self {
            gate: GateState::default(),
            contact: None,
            lexicon,
            store: None,
            cycle,
            pipeline,
            event_tx,
            signal_rx,
            report_tx,
            report_rx,
            escalation: None,
            started_at: Instant::now(),
        }
    }

    /// Persist lexicon edits to `store`
    pub fn with_store(mut self, store: LexiconStore) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn status(&self) -> ControllerStatus {
        ControllerStatus {
            feature_enabled: self.gate.feature_enabled(),
            listening: self.gate.listening(),
            cycle: self.cycle.state(),
            contact: self.contact.as_deref().cloned(),
            trigger_words: self.lexicon.read().await.words().to_vec(),
            escalating: self.escalation.is_some(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    /// Run the controller, processing commands until teardown
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("feature controller started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.teardown().await;
                        break;
                    };
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
                Some(signal) = self.signal_rx.recv() => {
                    self.handle_cycle_signal(signal).await;
                }
                Some((run_id, report)) = self.report_rx.recv() => {
                    self.finish_escalation(run_id, report).await;
                }
            }
        }

        info!("feature controller stopped");
    }

    /// Apply one command; `Break` once the controller has been torn down
    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::SetFeature { enabled, reply } => {
                let _ = reply.send(self.toggle_feature(enabled).await);
            }
            Command::SetListening { enabled, reply } => {
                let _ = reply.send(self.toggle_listening(enabled).await);
            }
            Command::SelectContact { contact, reply } => {
                self.select_contact(contact);
                let _ = reply.send(());
            }
            Command::FocusLost { reply } => {
                self.focus_lost().await;
                let _ = reply.send(self.gate);
            }
            Command::AddTrigger { word, reply } => {
                let _ = reply.send(self.add_trigger(&word).await);
            }
            Command::RemoveTrigger { word, reply } => {
                let _ = reply.send(self.remove_trigger(&word).await);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status().await);
            }
            Command::Teardown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Switch the whole feature on or off
    ///
    /// Enabling never starts capture by itself.
    pub async fn toggle_feature(&mut self, enabled: bool) -> GateState {
        if enabled {
            self.gate.enable_feature();
        } else {
            self.stop_listening(StopReason::FeatureDisabled).await;
            self.gate.disable_feature();
        }

        info!(enabled, "voice trigger feature toggled");
        self.emit(StateEvent::FeatureToggled { enabled });
        self.gate
    }

    /// Start or stop listening
    pub async fn toggle_listening(&mut self, enabled: bool) -> Result<GateState, ListeningError> {
        if !enabled {
            self.stop_listening(StopReason::User).await;
            return Ok(self.gate);
        }

        if !self.gate.feature_enabled() {
            debug!("listening refused, feature disabled");
            return Err(ListeningError::FeatureDisabled);
        }
        if self.contact.is_none() {
            warn!("listening refused, no emergency contact selected");
            return Err(ListeningError::MissingContact);
        }
        if self.escalation.is_some() {
            warn!("listening refused, escalation in progress");
            return Err(ListeningError::EscalationInProgress);
        }
        if self.gate.listening() {
            return Ok(self.gate);
        }

        match self.cycle.start().await {
            Ok(run_id) => {
                self.gate.start_listening();
                info!(run_id, "listening started");
                self.emit(StateEvent::ListeningStarted { run_id });
                Ok(self.gate)
            }
            Err(CaptureError::PermissionDenied) => {
                warn!("microphone permission denied, listening stays off");
                Err(ListeningError::PermissionDenied)
            }
            Err(e) => {
                error!(error = %e, "failed to start analysis cycle");
                Err(ListeningError::Capture(e))
            }
        }
    }

    /// Replace the contact snapshot wholesale
    pub fn select_contact(&mut self, contact: EmergencyContact) {
        info!(contact_id = contact.id(), contact = %contact, "emergency contact selected");
        self.emit(StateEvent::ContactSelected {
            contact: contact.clone(),
        });
        self.contact = Some(Arc::new(contact));
    }

    /// The presentation layer lost focus; same as switching listening off
    pub async fn focus_lost(&mut self) {
        self.stop_listening(StopReason::FocusLost).await;
    }

    pub async fn add_trigger(&mut self, raw: &str) -> Result<TriggerUpdate, LexiconError> {
        let (changed, snapshot) = {
            let mut lexicon = self.lexicon.write().await;
            let changed = lexicon.add(raw)?;
            (changed, lexicon.clone())
        };
        if changed {
            self.lexicon_changed(&snapshot).await;
        }
        Ok(TriggerUpdate {
            changed,
            words: snapshot.words().to_vec(),
        })
    }

    pub async fn remove_trigger(&mut self, raw: &str) -> TriggerUpdate {
        let (changed, snapshot) = {
            let mut lexicon = self.lexicon.write().await;
            let changed = lexicon.remove(raw);
            (changed, lexicon.clone())
        };
        if changed {
            self.lexicon_changed(&snapshot).await;
        }
        TriggerUpdate {
            changed,
            words: snapshot.words().to_vec(),
        }
    }

    /// Stop all activity, then wait for an escalation in flight
    ///
    /// The wait is bounded by the location and notify ceilings, so an
    /// alert that was already triggered still goes out before shutdown.
    pub async fn teardown(&mut self) {
        self.stop_listening(StopReason::Teardown).await;

        let Some(escalation) = self.escalation.take() else {
            return;
        };
        let run_id = escalation.run_id;
        info!(run_id, "waiting for escalation before teardown");
        if let Err(e) = escalation.task.await {
            error!(run_id, error = %e, "escalation task failed");
            return;
        }
        while let Ok((run_id, report)) = self.report_rx.try_recv() {
            self.finish_escalation(run_id, report).await;
        }
    }

    async fn stop_listening(&mut self, reason: StopReason) {
        if self.cycle.is_running() {
            self.cycle.stop().await;
        }
        if self.gate.stop_listening() {
            info!(%reason, "listening stopped");
            self.emit(StateEvent::ListeningStopped { reason });
        }
    }

    async fn handle_cycle_signal(&mut self, signal: CycleSignal) {
        if self.cycle.run_id() != Some(signal.run_id()) || !self.gate.listening() {
            debug!(run_id = signal.run_id(), "dropping signal from stale run");
            return;
        }

        match signal {
            CycleSignal::Triggered {
                run_id, trigger, ..
            } => self.begin_escalation(run_id, trigger).await,
            CycleSignal::Aborted { run_id, error } => {
                error!(run_id, error = %error, "analysis cycle aborted");
                self.stop_listening(StopReason::Aborted).await;
            }
        }
    }

    async fn begin_escalation(&mut self, run_id: u64, trigger: TriggerWord) {
        let Some(contact) = self.contact.clone() else {
            error!(run_id, "trigger detected without a contact snapshot");
            self.stop_listening(StopReason::Aborted).await;
            return;
        };

        self.emit(StateEvent::EscalationStarted);

        let pipeline = self.pipeline.clone();
        let report_tx = self.report_tx.clone();
        let task = tokio::spawn(async move {
            let report = pipeline.run(trigger, contact).await;
            if report_tx.send((run_id, report)).await.is_err() {
                debug!(run_id, "controller gone before escalation finished");
            }
        });
        self.escalation = Some(InFlightEscalation { run_id, task });
    }

    async fn finish_escalation(&mut self, run_id: u64, report: EscalationReport) {
        if self.escalation.as_ref().map(|e| e.run_id) == Some(run_id) {
            self.escalation = None;
        }

        info!(
            run_id,
            contact = %report.alert.contact,
            located = report.position.is_some(),
            delivered = report.delivered,
            "escalation report received"
        );
        self.emit(StateEvent::EscalationComplete {
            delivered: report.delivered,
            duration_ms: report.duration.as_millis() as u64,
        });

        if self.cycle.run_id() == Some(run_id) {
            self.stop_listening(StopReason::Escalated).await;
        }
    }

    /// Persist and announce an edit; the cycle's lock is already released
    async fn lexicon_changed(&self, lexicon: &TriggerLexicon) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(lexicon).await {
                warn!(error = %e, "failed to persist trigger lexicon");
            }
        }
        self.emit(StateEvent::LexiconChanged {
            words: lexicon.words().to_vec(),
        });
    }

    fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }
}
