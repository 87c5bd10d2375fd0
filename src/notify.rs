//! Notification seam
//!
//! The notifier announces the alert on the device and shows the user what
//! would be sent to their contact. The pipeline only logs its outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::contact::EmergencyContact;
use crate::events::{Audience, StateEvent};
use crate::lexicon::TriggerWord;

/// A composed emergency alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Word that caused the escalation
    pub trigger: TriggerWord,
    /// Message body for the contact
    pub message: String,
    /// Text spoken on the device
    pub announcement: String,
    /// Recipient snapshot
    pub contact: EmergencyContact,
}

impl Alert {
    /// User-visible confirmation of what would be sent
    pub fn confirmation(&self) -> String {
        format!(
            "Emergency message \"{}\" would be sent to {}",
            self.message, self.contact
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// Announcement and confirmation collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Notifier that publishes the alert to event subscribers
///
/// Subscribed presentation clients speak the announcement and show the
/// confirmation. With no client in the audience nobody saw the alert,
/// which counts as a failed delivery.
pub struct EventNotifier {
    event_tx: broadcast::Sender<StateEvent>,
    audience: Audience,
}

impl EventNotifier {
    pub fn new(event_tx: broadcast::Sender<StateEvent>, audience: Audience) -> Self {
        Self { event_tx, audience }
    }
}

#[async_trait]
impl Notifier for EventNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        info!(
            contact = alert.contact.name(),
            announcement = %alert.announcement,
            "{}",
            alert.confirmation()
        );

        let event = StateEvent::AlertRaised {
            message: alert.message.clone(),
            announcement: alert.announcement.clone(),
            contact: alert.contact.clone(),
        };
        let receivers = self.event_tx.send(event).unwrap_or(0);
        let clients = self.audience.count();
        debug!(receivers, clients, "alert published");

        if clients == 0 {
            return Err(NotifyError::Delivery("no client subscribed".to_string()));
        }
        Ok(())
    }
}
