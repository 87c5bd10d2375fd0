//! Trigger lexicon module
//!
//! Provides the mutable set of trigger phrases that escalate when they
//! appear in a classified capture segment, plus JSON persistence so
//! user-added phrases survive a restart.

mod store;
mod words;

pub use store::LexiconStore;
pub use words::{LexiconError, TriggerLexicon, TriggerWord, DEFAULT_TRIGGERS};
