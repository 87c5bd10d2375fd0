//! The tick task behind a running analysis cycle

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CycleSignal, CycleState, CycleTiming};
use crate::capture::{CaptureError, CaptureSession};
use crate::classify::{classify_within, Classifier};
use crate::events::StateEvent;
use crate::lexicon::TriggerLexicon;

/// How a tick ended
enum TickOutcome {
    /// Next segment is open; wait for the next period
    Continue,
    /// Cancellation observed; nothing further may happen
    Cancelled,
    /// Trigger found; the run stays suspended
    Triggered,
    /// Device failure; the run is over
    Aborted,
}

pub(super) struct TickLoop {
    pub(super) run_id: u64,
    pub(super) session: CaptureSession,
    pub(super) classifier: Arc<dyn Classifier>,
    pub(super) lexicon: Arc<RwLock<TriggerLexicon>>,
    pub(super) timing: CycleTiming,
    pub(super) event_tx: broadcast::Sender<StateEvent>,
    pub(super) signal_tx: mpsc::Sender<CycleSignal>,
    pub(super) state_tx: Arc<watch::Sender<CycleState>>,
    pub(super) cancel: CancellationToken,
}

impl TickLoop {
    /// Tick until cancelled, triggered or aborted, then return the session
    ///
    /// The timer is re-armed only after a tick completes, so ticks never
    /// overlap however long classification takes.
    pub(super) async fn run(mut self) -> CaptureSession {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.discard_open_segment().await;
                    break;
                }
                _ = sleep(self.timing.period) => {}
            }

            match self.tick().await {
                TickOutcome::Continue => continue,
                TickOutcome::Triggered => return self.session,
                TickOutcome::Cancelled | TickOutcome::Aborted => break,
            }
        }

        self.state_tx.send_replace(CycleState::Idle);
        debug!(run_id = self.run_id, "tick loop exited");
        self.session
    }

    async fn tick(&mut self) -> TickOutcome {
        let run_id = self.run_id;

        // 1. close the current segment
        let segment = match self.session.close().await {
            Ok(Some(segment)) => segment,
            Ok(None) => {
                return self
                    .abort(CaptureError::Device("no open segment at tick".to_string()))
                    .await
            }
            Err(e) => return self.abort(e).await,
        };
        let segment_id = segment.id();
        let _ = self.event_tx.send(StateEvent::SegmentCaptured { segment_id });

        if self.cancel.is_cancelled() {
            debug!(run_id, segment_id, "cycle stopped before classification, discarding segment");
            segment.release();
            return TickOutcome::Cancelled;
        }

        // 2. classify under the ceiling
        self.state_tx.send_replace(CycleState::Classifying);
        let result =
            classify_within(self.classifier.as_ref(), &segment, self.timing.classify_timeout).await;
        segment.release();

        let text = match result {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(run_id, segment_id, error = %e, "classification failed, treating as no match");
                let _ = self.event_tx.send(StateEvent::ClassificationFailed {
                    segment_id,
                    reason: e.to_string(),
                });
                None
            }
        };

        if self.cancel.is_cancelled() {
            debug!(run_id, segment_id, "cycle stopped during classification, discarding result");
            return TickOutcome::Cancelled;
        }

        // 3. look the transcript up
        let hit = match &text {
            Some(text) => self.lexicon.read().await.matches(text).cloned(),
            None => None,
        };

        // 4a. escalate
        if let Some(trigger) = hit {
            info!(run_id, segment_id, %trigger, "trigger detected");
            self.state_tx.send_replace(CycleState::Suspended);
            let _ = self.event_tx.send(StateEvent::TriggerDetected {
                word: trigger.clone(),
            });
            let signal = CycleSignal::Triggered {
                run_id,
                segment_id,
                trigger,
            };
            if self.signal_tx.send(signal).await.is_err() {
                warn!(run_id, "cycle owner gone, trigger dropped");
            }
            return TickOutcome::Triggered;
        }

        // 4b. recapture
        match self.session.open().await {
            Ok(next_id) => {
                debug!(run_id, segment_id = next_id, "next segment opened");
                self.state_tx.send_replace(CycleState::Capturing);
                TickOutcome::Continue
            }
            Err(e) => self.abort(e).await,
        }
    }

    async fn abort(&mut self, error: CaptureError) -> TickOutcome {
        error!(run_id = self.run_id, error = %error, "capture failed, aborting cycle");
        let signal = CycleSignal::Aborted {
            run_id: self.run_id,
            error,
        };
        if self.signal_tx.send(signal).await.is_err() {
            warn!(run_id = self.run_id, "cycle owner gone");
        }
        TickOutcome::Aborted
    }

    async fn discard_open_segment(&mut self) {
        match self.session.close().await {
            Ok(Some(segment)) => {
                debug!(run_id = self.run_id, segment_id = segment.id(), "discarding open segment");
                segment.release();
            }
            Ok(None) => {}
            Err(e) => warn!(run_id = self.run_id, error = %e, "failed to close segment on cancel"),
        }
    }
}
