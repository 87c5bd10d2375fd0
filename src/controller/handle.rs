//! Command channel into the controller actor

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::gate::GateState;
use super::machine::{ControllerStatus, ListeningError};
use crate::contact::EmergencyContact;
use crate::lexicon::{LexiconError, TriggerWord};

/// Requests processed by the controller, one at a time
#[derive(Debug)]
pub enum Command {
    SetFeature {
        enabled: bool,
        reply: oneshot::Sender<GateState>,
    },
    SetListening {
        enabled: bool,
        reply: oneshot::Sender<Result<GateState, ListeningError>>,
    },
    SelectContact {
        contact: EmergencyContact,
        reply: oneshot::Sender<()>,
    },
    FocusLost {
        reply: oneshot::Sender<GateState>,
    },
    AddTrigger {
        word: String,
        reply: oneshot::Sender<Result<TriggerUpdate, LexiconError>>,
    },
    RemoveTrigger {
        word: String,
        reply: oneshot::Sender<TriggerUpdate>,
    },
    Status {
        reply: oneshot::Sender<ControllerStatus>,
    },
    Teardown {
        reply: oneshot::Sender<()>,
    },
}

/// Result of a lexicon edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerUpdate {
    /// Whether the lexicon actually changed
    pub changed: bool,
    /// Lexicon contents after the edit
    pub words: Vec<TriggerWord>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("feature controller is not running")]
    Stopped,
}

/// Cloneable front end to a running `FeatureController`
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Command>,
}

impl ControllerHandle {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ControllerError::Stopped)?;
        rx.await.map_err(|_| ControllerError::Stopped)
    }

    pub async fn set_feature(&self, enabled: bool) -> Result<GateState, ControllerError> {
        self.request(|reply| Command::SetFeature { enabled, reply }).await
    }

    pub async fn set_listening(
        &self,
        enabled: bool,
    ) -> Result<Result<GateState, ListeningError>, ControllerError> {
        self.request(|reply| Command::SetListening { enabled, reply }).await
    }

    pub async fn select_contact(&self, contact: EmergencyContact) -> Result<(), ControllerError> {
        self.request(|reply| Command::SelectContact { contact, reply }).await
    }

    /// The presentation layer navigated away
    pub async fn focus_lost(&self) -> Result<GateState, ControllerError> {
        self.request(|reply| Command::FocusLost { reply }).await
    }

    pub async fn add_trigger(
        &self,
        word: impl Into<String>,
    ) -> Result<Result<TriggerUpdate, LexiconError>, ControllerError> {
        let word = word.into();
        self.request(|reply| Command::AddTrigger { word, reply }).await
    }

    pub async fn remove_trigger(
        &self,
        word: impl Into<String>,
    ) -> Result<TriggerUpdate, ControllerError> {
        let word = word.into();
        self.request(|reply| Command::RemoveTrigger { word, reply }).await
    }

    pub async fn status(&self) -> Result<ControllerStatus, ControllerError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Stop everything and end the actor
    pub async fn teardown(&self) -> Result<(), ControllerError> {
        self.request(|reply| Command::Teardown { reply }).await
    }
}
