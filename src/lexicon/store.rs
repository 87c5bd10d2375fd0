//! JSON persistence for the trigger lexicon

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info, warn};

use super::words::TriggerLexicon;

/// Reads and writes the lexicon as a JSON array of words
#[derive(Debug, Clone)]
pub struct LexiconStore {
    path: PathBuf,
}

impl LexiconStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the saved lexicon, falling back to `defaults`
    ///
    /// A missing file is normal on first start. An unreadable or corrupt
    /// file is logged and replaced by the defaults.
    pub fn load_or(&self, defaults: &[String]) -> TriggerLexicon {
        match self.load() {
            Ok(Some(lexicon)) => {
                info!(path = ?self.path, words = lexicon.len(), "trigger lexicon loaded");
                lexicon
            }
            Ok(None) => {
                debug!(path = ?self.path, "no saved lexicon, using defaults");
                TriggerLexicon::from_words(defaults)
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "saved lexicon unusable, using defaults");
                TriggerLexicon::from_words(defaults)
            }
        }
    }

    fn load(&self) -> Result<Option<TriggerLexicon>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path).context("failed to read lexicon file")?;
        let words: Vec<String> =
            serde_json::from_str(&raw).context("failed to parse lexicon file")?;
        Ok(Some(TriggerLexicon::from_words(words)))
    }

    /// Persist the lexicon, replacing the previous file atomically
    pub async fn save(&self, lexicon: &TriggerLexicon) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("failed to create lexicon directory")?;
        }

        let words: Vec<&str> = lexicon.words().iter().map(|w| w.as_str()).collect();
        let json = serde_json::to_vec_pretty(&words)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await.context("failed to write lexicon file")?;
        fs::rename(&tmp, &self.path)
            .await
            .context("failed to replace lexicon file")?;

        debug!(path = ?self.path, words = words.len(), "trigger lexicon saved");
        Ok(())
    }
}
