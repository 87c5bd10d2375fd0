//! Configuration loading and management
//!
//! Defaults overridable through `GUARDIAN_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::controller::Settings;
use crate::cycle::CycleTiming;
use crate::lexicon::DEFAULT_TRIGGERS;
use crate::location::Coordinates;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Length of one capture segment
    pub analysis_period: Duration,

    /// Ceiling on one classification request
    pub classify_timeout: Duration,

    /// Ceiling on acquiring a position during escalation
    pub location_timeout: Duration,

    /// Transcription sidecar endpoint; classification is disabled without it
    pub classifier_url: Option<String>,

    /// Position reported during escalation, if any
    pub fixed_location: Option<Coordinates>,

    /// Lexicon used when nothing has been saved yet
    pub trigger_words: Vec<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match lookup("GUARDIAN_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").context("HOME is not set")?;
                PathBuf::from(home).join(".local").join("share").join("guardian")
            }
        };

        let socket_path = lookup("GUARDIAN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let analysis_period = millis(&lookup, "GUARDIAN_PERIOD_MS", 5_000)?;
        let classify_timeout = millis(&lookup, "GUARDIAN_CLASSIFY_TIMEOUT_MS", 10_000)?;
        let location_timeout = millis(&lookup, "GUARDIAN_LOCATION_TIMEOUT_MS", 15_000)?;

        let classifier_url = lookup("GUARDIAN_CLASSIFIER_URL").filter(|url| !url.trim().is_empty());

        let fixed_location = lookup("GUARDIAN_LOCATION")
            .map(|raw| raw.parse::<Coordinates>())
            .transpose()
            .context("invalid GUARDIAN_LOCATION")?;

        let trigger_words = match lookup("GUARDIAN_TRIGGERS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_TRIGGERS.iter().map(|w| w.to_string()).collect(),
        };

        Ok(Self {
            socket_path,
            data_dir,
            analysis_period,
            classify_timeout,
            location_timeout,
            classifier_url,
            fixed_location,
            trigger_words,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Where the trigger lexicon is persisted
    pub fn triggers_path(&self) -> PathBuf {
        self.data_dir.join("triggers.json")
    }

    pub fn settings(&self) -> Settings {
        Settings {
            timing: CycleTiming {
                period: self.analysis_period,
                classify_timeout: self.classify_timeout,
            },
            location_timeout: self.location_timeout,
        }
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let ms = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a number of milliseconds"))?,
        None => default,
    };
    if ms == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}
