//! Events module for controller and cycle transitions
//!
//! Provides structured event types broadcast to subscribers for gate
//! changes, capture ticks, detections and escalation progress.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::contact::EmergencyContact;
use crate::lexicon::TriggerWord;

/// Why listening ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Listening switched off by the user
    User,
    /// The presentation layer lost focus
    FocusLost,
    /// The whole feature was switched off
    FeatureDisabled,
    /// A trigger was detected and escalation finished
    Escalated,
    /// The capture device failed mid-cycle
    Aborted,
    /// The daemon is shutting down
    Teardown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StopReason::User => "user",
            StopReason::FocusLost => "focus_lost",
            StopReason::FeatureDisabled => "feature_disabled",
            StopReason::Escalated => "escalated",
            StopReason::Aborted => "aborted",
            StopReason::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Events emitted by the controller and the analysis cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Feature gate switched
    FeatureToggled { enabled: bool },

    /// A listening run began
    ListeningStarted { run_id: u64 },

    /// Listening ended
    ListeningStopped { reason: StopReason },

    /// A capture segment was closed and queued for classification
    SegmentCaptured { segment_id: u64 },

    /// The classification service failed; the tick counts as no match
    ClassificationFailed { segment_id: u64, reason: String },

    /// A trigger word was found in a classified segment
    TriggerDetected { word: TriggerWord },

    /// Escalation pipeline entered
    EscalationStarted,

    /// Alert handed to the notifier
    AlertRaised {
        message: String,
        announcement: String,
        contact: EmergencyContact,
    },

    /// Escalation pipeline finished
    EscalationComplete {
        /// Whether the notifier accepted the alert
        delivered: bool,
        /// Time spent in the pipeline
        duration_ms: u64,
    },

    /// A new emergency contact snapshot was selected
    ContactSelected { contact: EmergencyContact },

    /// The trigger lexicon changed
    LexiconChanged { words: Vec<TriggerWord> },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::FeatureToggled { enabled } => write!(f, "FEATURE_TOGGLED ({})", enabled),
            StateEvent::ListeningStarted { run_id } => write!(f, "LISTENING_STARTED (run {})", run_id),
            StateEvent::ListeningStopped { reason } => write!(f, "LISTENING_STOPPED ({})", reason),
            StateEvent::SegmentCaptured { segment_id } => {
                write!(f, "SEGMENT_CAPTURED (#{})", segment_id)
            }
            StateEvent::ClassificationFailed { segment_id, .. } => {
                write!(f, "CLASSIFICATION_FAILED (#{})", segment_id)
            }
            StateEvent::TriggerDetected { word } => write!(f, "TRIGGER_DETECTED ({})", word),
            StateEvent::EscalationStarted => write!(f, "ESCALATION_STARTED"),
            StateEvent::AlertRaised { contact, .. } => write!(f, "ALERT_RAISED ({})", contact),
            StateEvent::EscalationComplete { delivered, duration_ms } => {
                write!(f, "ESCALATION_COMPLETE (delivered={}, {}ms)", delivered, duration_ms)
            }
            StateEvent::ContactSelected { contact } => write!(f, "CONTACT_SELECTED ({})", contact),
            StateEvent::LexiconChanged { words } => write!(f, "LEXICON_CHANGED ({} words)", words.len()),
        }
    }
}

/// Number of presentation clients currently receiving pushed events
///
/// Internal receivers on the event bus (the daemon's own log loop) are not
/// counted, so a zero here means no user could have seen an event.
#[derive(Debug, Clone, Default)]
pub struct Audience(Arc<AtomicUsize>);

impl Audience {
    /// Count one more client until the returned seat is dropped
    pub fn join(&self) -> AudienceSeat {
        self.0.fetch_add(1, Ordering::SeqCst);
        AudienceSeat(Arc::clone(&self.0))
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A subscribed client's place in the [`Audience`]
#[derive(Debug)]
pub struct AudienceSeat(Arc<AtomicUsize>);

impl Drop for AudienceSeat {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
