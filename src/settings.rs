use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunable knobs for the playback core. The defaults are what the bot
/// ships with; operators can persist overrides as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Directory holding one snapshot file per tenant.
    pub session_dir: PathBuf,
    pub default_volume: u16,
    /// Similarity at or above which a recommendation counts as a repeat.
    pub dedup_threshold: f64,
    pub play_history_cap: usize,
    pub autoplay_history_cap: usize,
    /// Tracks fetched when autoplay tops up a low queue.
    pub autoplay_batch: usize,
    /// Tracks fetched when autoplay is first enabled.
    pub autoplay_seed_batch: usize,
    /// Queue size at or below which autoplay tops up.
    pub low_water_mark: usize,
    /// Snapshots older than this are rejected on restore.
    pub staleness_secs: u64,
    /// How long an idle session lingers after its queue ends.
    pub inactivity_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from("data/sessions"),
            default_volume: 50,
            dedup_threshold: 0.75,
            play_history_cap: 50,
            autoplay_history_cap: 100,
            autoplay_batch: 15,
            autoplay_seed_batch: 20,
            low_water_mark: 1,
            staleness_secs: 300,
            inactivity_secs: 30,
        }
    }
}

impl Settings {
    pub fn load(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings = serde_json::from_str(&content)
            .context("Failed to parse settings JSON")?;
        Ok(settings)
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings dir: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn inactivity(&self) -> Duration {
        Duration::from_secs(self.inactivity_secs)
    }
}
