//! Escalation module
//!
//! Runs once per detected trigger: locate, compose, notify, report.

mod pipeline;
pub mod template;

pub use pipeline::{EscalationPipeline, EscalationReport};
