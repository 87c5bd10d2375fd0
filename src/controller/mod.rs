//! Feature controller module
//!
//! Provides the top-level state machine over two gates:
//! - feature enabled: the voice trigger feature is switched on
//! - listening: an analysis cycle is running (implies feature enabled)
//!
//! The controller runs as an actor; callers drive it through a
//! `ControllerHandle`.

mod gate;
mod handle;
mod machine;

pub use gate::GateState;
pub use handle::{ControllerError, ControllerHandle, TriggerUpdate};
pub use machine::{Collaborators, ControllerStatus, FeatureController, ListeningError, Settings};
