//! Emergency contact snapshot
//!
//! The contact store lives outside the daemon; the controller only ever
//! holds the most recent selection as an immutable snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A contact selected to receive emergency alerts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    id: String,
    name: String,
    phone: String,
}

impl EmergencyContact {
    /// Contacts normally arrive deserialized from the presentation layer
    #[cfg(test)]
    pub fn new(id: impl Into<String>, name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phone: phone.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EmergencyContact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.phone)
    }
}
