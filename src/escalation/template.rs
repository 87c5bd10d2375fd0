//! Fixed alert template

use crate::location::Coordinates;

/// Spoken on the device when an alert goes out
pub const ANNOUNCEMENT: &str = "SOS triggered! Sending emergency alert.";

/// Substituted when no position could be acquired
pub const LOCATION_PLACEHOLDER: &str = "Unable to share my location";

pub fn location_text(position: Option<Coordinates>) -> String {
    match position {
        Some(position) => format!("My current location: {}", position.map_url()),
        None => LOCATION_PLACEHOLDER.to_string(),
    }
}

pub fn compose_message(location_text: &str) -> String {
    format!("I'm in danger, I need help! {}", location_text)
}
