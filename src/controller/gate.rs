//! Feature and listening gates

use serde::{Deserialize, Serialize};

/// The two user-facing switches
///
/// Fields are only changed through the transition methods, which keep
/// `listening` implying `feature_enabled`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateState {
    feature_enabled: bool,
    listening: bool,
}

impl GateState {
    pub fn feature_enabled(&self) -> bool {
        self.feature_enabled
    }

    pub fn listening(&self) -> bool {
        self.listening
    }

    pub(super) fn enable_feature(&mut self) {
        self.feature_enabled = true;
    }

    /// Switch the feature off, forcing listening off with it
    pub(super) fn disable_feature(&mut self) {
        self.feature_enabled = false;
        self.listening = false;
    }

    /// Returns false, changing nothing, when the feature is disabled
    pub(super) fn start_listening(&mut self) -> bool {
        if !self.feature_enabled {
            return false;
        }
        self.listening = true;
        true
    }

    /// Returns whether listening was on
    pub(super) fn stop_listening(&mut self) -> bool {
        std::mem::replace(&mut self.listening, false)
    }
}
