//! Escalation pipeline
//!
//! Every path through `run` produces a report: a denied or slow location
//! becomes the placeholder text, a failed or slow notifier becomes
//! `delivered = false`. The controller turns the report into its
//! completion transition.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use super::template::{compose_message, location_text, ANNOUNCEMENT};
use crate::contact::EmergencyContact;
use crate::lexicon::TriggerWord;
use crate::location::{Coordinates, LocationError, LocationProvider};
use crate::notify::{Alert, Notifier};

/// Upper bound on the notifier hand-off
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one escalation
#[derive(Debug, Clone)]
pub struct EscalationReport {
    pub alert: Alert,
    pub position: Option<Coordinates>,
    pub delivered: bool,
    pub duration: Duration,
}

/// Locate, compose and notify
#[derive(Clone)]
pub struct EscalationPipeline {
    locator: Arc<dyn LocationProvider>,
    notifier: Arc<dyn Notifier>,
    location_timeout: Duration,
}

impl EscalationPipeline {
    pub fn new(
        locator: Arc<dyn LocationProvider>,
        notifier: Arc<dyn Notifier>,
        location_timeout: Duration,
    ) -> Self {
        Self {
            locator,
            notifier,
            location_timeout,
        }
    }

    /// Run the escalation for `trigger`, alerting `contact`
    ///
    /// The caller has already suspended the analysis cycle.
    pub async fn run(&self, trigger: TriggerWord, contact: Arc<EmergencyContact>) -> EscalationReport {
        let started = Instant::now();
        info!(%trigger, contact = %contact, "escalation started");

        let position = match self.locate().await {
            Ok(position) => Some(position),
            Err(e) => {
                warn!(error = %e, "location unavailable, using placeholder");
                None
            }
        };

        let alert = Alert {
            trigger,
            message: compose_message(&location_text(position)),
            announcement: ANNOUNCEMENT.to_string(),
            contact: EmergencyContact::clone(&contact),
        };

        let delivered = match timeout(NOTIFY_TIMEOUT, self.notifier.notify(&alert)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "alert notification failed");
                false
            }
            Err(_) => {
                warn!(timeout = ?NOTIFY_TIMEOUT, "alert notification timed out");
                false
            }
        };

        let duration = started.elapsed();
        info!(delivered, duration_ms = duration.as_millis() as u64, "escalation finished");

        EscalationReport {
            alert,
            position,
            delivered,
            duration,
        }
    }

    async fn locate(&self) -> Result<Coordinates, LocationError> {
        let request = async {
            if !self.locator.request_permission().await.is_granted() {
                return Err(LocationError::PermissionDenied);
            }
            self.locator.current_position().await
        };

        match timeout(self.location_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout(self.location_timeout)),
        }
    }
}
