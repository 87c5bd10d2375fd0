//! Analysis cycle
//!
//! Drives the capture -> classify -> recapture loop for one listening run.
//! Each run lives in its own task; the task owns the capture session for
//! the run's duration and gives it back when the run ends, so at most one
//! segment can ever be open.

mod tick;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::capture::{AudioDevice, CaptureError, CaptureSession};
use crate::classify::Classifier;
use crate::events::StateEvent;
use crate::lexicon::{TriggerLexicon, TriggerWord};

use tick::TickLoop;

/// Phase of the analysis cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Not running, no segment open
    #[default]
    Idle,
    /// A segment is recording
    Capturing,
    /// The last segment is with the classifier
    Classifying,
    /// A trigger was detected; waiting for escalation to finish
    Suspended,
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleState::Idle => write!(f, "Idle"),
            CycleState::Capturing => write!(f, "Capturing"),
            CycleState::Classifying => write!(f, "Classifying"),
            CycleState::Suspended => write!(f, "Suspended"),
        }
    }
}

/// Signals sent from a running cycle to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum CycleSignal {
    /// A trigger was found; the run is suspended
    Triggered {
        run_id: u64,
        segment_id: u64,
        trigger: TriggerWord,
    },
    /// The capture device failed; the run has ended
    Aborted { run_id: u64, error: CaptureError },
}

impl CycleSignal {
    pub fn run_id(&self) -> u64 {
        match self {
            CycleSignal::Triggered { run_id, .. } | CycleSignal::Aborted { run_id, .. } => *run_id,
        }
    }
}

/// Tick period and classification ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub period: Duration,
    pub classify_timeout: Duration,
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5),
            classify_timeout: Duration::from_secs(10),
        }
    }
}

/// A run in flight
struct RunningCycle {
    run_id: u64,
    cancel: CancellationToken,
    task: JoinHandle<CaptureSession>,
}

/// Periodic capture/classify scheduler
pub struct AnalysisCycle {
    device: Arc<dyn AudioDevice>,
    classifier: Arc<dyn Classifier>,
    lexicon: Arc<RwLock<TriggerLexicon>>,
    timing: CycleTiming,
    event_tx: broadcast::Sender<StateEvent>,
    signal_tx: mpsc::Sender<CycleSignal>,
    state_tx: Arc<watch::Sender<CycleState>>,
    /// Session parked here between runs
    session: Option<CaptureSession>,
    running: Option<RunningCycle>,
    next_run_id: u64,
}

impl AnalysisCycle {
    pub fn new(
        device: Arc<dyn AudioDevice>,
        classifier: Arc<dyn Classifier>,
        lexicon: Arc<RwLock<TriggerLexicon>>,
        timing: CycleTiming,
        event_tx: broadcast::Sender<StateEvent>,
        signal_tx: mpsc::Sender<CycleSignal>,
    ) -> Self {
        let (state_tx, _) = watch::channel(CycleState::Idle);
        Self {
            session: Some(CaptureSession::new(Arc::clone(&device))),
            device,
            classifier,
            lexicon,
            timing,
            event_tx,
            signal_tx,
            state_tx: Arc::new(state_tx),
            running: None,
            next_run_id: 1,
        }
    }

    pub fn state(&self) -> CycleState {
        *self.state_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Id of the current run, if any
    pub fn run_id(&self) -> Option<u64> {
        self.running.as_ref().map(|r| r.run_id)
    }

    /// Open the first segment and start ticking
    ///
    /// Idempotent while a run is active. On failure no segment is left
    /// open and the cycle stays idle.
    pub async fn start(&mut self) -> Result<u64, CaptureError> {
        if let Some(running) = &self.running {
            debug!(run_id = running.run_id, "analysis cycle already running");
            return Ok(running.run_id);
        }

        let mut session = self.take_session();
        // Permission may have been revoked since the last run
        session.forget_permission();
        let segment_id = match session.open().await {
            Ok(id) => id,
            Err(e) => {
                self.session = Some(session);
                return Err(e);
            }
        };

        let run_id = self.next_run_id;
        self.next_run_id += 1;
        self.state_tx.send_replace(CycleState::Capturing);

        let cancel = CancellationToken::new();
        let ticker = TickLoop {
            run_id,
            session,
            classifier: Arc::clone(&self.classifier),
            lexicon: Arc::clone(&self.lexicon),
            timing: self.timing,
            event_tx: self.event_tx.clone(),
            signal_tx: self.signal_tx.clone(),
            state_tx: Arc::clone(&self.state_tx),
            cancel: cancel.clone(),
        };

        info!(run_id, segment_id, period = ?self.timing.period, "analysis cycle started");
        self.running = Some(RunningCycle {
            run_id,
            cancel,
            task: tokio::spawn(ticker.run()),
        });
        Ok(run_id)
    }

    /// Cancel the run and wait for its task to hand the session back
    ///
    /// An open segment is closed and discarded without classification.
    /// A classification already submitted is allowed to finish (bounded
    /// by the classify timeout) and its result is dropped.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            self.state_tx.send_replace(CycleState::Idle);
            return;
        };

        running.cancel.cancel();
        match running.task.await {
            Ok(mut session) => {
                if session.is_open() {
                    match session.close().await {
                        Ok(Some(segment)) => segment.release(),
                        Ok(None) => {}
                        Err(e) => error!(error = %e, "failed to close segment on stop"),
                    }
                }
                self.session = Some(session);
            }
            Err(e) => {
                error!(run_id = running.run_id, error = %e, "analysis task failed");
            }
        }

        self.state_tx.send_replace(CycleState::Idle);
        info!(run_id = running.run_id, "analysis cycle stopped");
    }

    fn take_session(&mut self) -> CaptureSession {
        self.session
            .take()
            .unwrap_or_else(|| CaptureSession::new(Arc::clone(&self.device)))
    }
}

#[cfg(test)]
mod tests;
