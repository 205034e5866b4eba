// Persistent render settings: sample rate, volume, song length defaults.
// Stored as JSON in <config_dir>/phosphor/render.json

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::player::SidPlayer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Linear output volume multiplier.
    pub volume: f64,
    /// Song length in seconds used for the end-of-song callback.
    /// 0 = disabled.
    pub default_song_length_secs: u32,
    /// How long the renderer runs when no song length is known.
    pub render_seconds: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            volume: 1.0,
            default_song_length_secs: 0,
            render_seconds: 120,
        }
    }
}

impl PlayerConfig {
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("render.json"))
    }

    /// Load config from disk, or return defaults if not found / invalid.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Cannot read config {}: {e}", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(cfg) => cfg.sanitized(path),
            Err(e) => {
                log::warn!("Ignoring invalid config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Replace values the player cannot run with by their defaults.
    fn sanitized(mut self, path: &Path) -> Self {
        if self.sample_rate == 0 {
            let fallback = Self::default().sample_rate;
            log::warn!("{}: sample_rate 0 is unusable, using {fallback}", path.display());
            self.sample_rate = fallback;
        }
        self
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path().ok_or("No config directory available")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Cannot create {}: {e}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| format!("Cannot encode config: {e}"))?;
        std::fs::write(path, json).map_err(|e| format!("Cannot save config: {e}"))?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// A player set up with these settings.
    pub fn player(&self) -> SidPlayer {
        let mut player = SidPlayer::new(self.sample_rate as f64);
        player.set_volume(self.volume);
        player
    }
}

fn config_dir() -> Option<PathBuf> {
    // macOS:   ~/Library/Application Support/phosphor/
    // Linux:   ~/.config/phosphor/
    // Windows: %APPDATA%/phosphor/

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("phosphor"),
        )
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").ok()?;
        Some(PathBuf::from(appdata).join("phosphor"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config").join("phosphor"))
    }
}
