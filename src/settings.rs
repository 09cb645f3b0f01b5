use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{session::SessionLimits, timer::DEFAULT_MAX_MINUTES};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub default_minutes: u64,
    pub presets: Vec<u64>,
    /// Cap for a run including extensions.
    pub max_minutes: u64,
    /// Cap for a typed duration.
    pub max_custom_minutes: u64,
    pub volume: f32,
    pub sound_enabled: bool,
    pub api_base_url: Option<String>,
    pub exclude_break_from_totals: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            default_minutes: 25,
            presets: vec![5, 15, 25, 45, 60],
            max_minutes: DEFAULT_MAX_MINUTES,
            max_custom_minutes: 120,
            volume: 0.5,
            sound_enabled: true,
            api_base_url: None,
            exclude_break_from_totals: false,
        }
    }
}

impl UserSettings {
    pub fn limits(&self) -> SessionLimits {
        SessionLimits {
            duration_seconds: self.default_minutes.saturating_mul(60),
            max_minutes: self.max_minutes,
            max_custom_minutes: self.max_custom_minutes,
        }
    }

    /// Longest duration the default may hold.
    fn default_minutes_cap(&self) -> u64 {
        self.max_custom_minutes.min(self.max_minutes).max(1)
    }

    /// Pulls hand-edited values back into range.
    fn clamped(mut self) -> Self {
        self.default_minutes = self.default_minutes.clamp(1, self.default_minutes_cap());
        self.volume = if self.volume.is_nan() {
            0.0
        } else {
            self.volume.clamp(0.0, 1.0)
        };
        self
    }

    /// A flag or environment value wins over the file.
    pub fn api_base_url<'a>(&'a self, override_url: Option<&'a str>) -> Option<&'a str> {
        override_url
            .or(self.api_base_url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("timespent"))
        .ok_or_else(|| anyhow!("could not determine a data directory, pass --data-dir"))
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            let loaded: UserSettings = serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("ignoring malformed settings at {}: {err}", path.display());
                UserSettings::default()
            });
            let clamped = loaded.clone().clamped();
            if clamped != loaded {
                warn!(
                    "settings at {} were out of range and have been clamped",
                    path.display()
                );
            }
            clamped
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn update(&self, change: impl FnOnce(&mut UserSettings)) -> Result<()> {
        let mut guard = self.write();
        change(&mut guard);
        self.persist(&guard)
    }

    /// Returns the stored value after clamping.
    pub fn set_volume(&self, volume: f32) -> Result<f32> {
        let mut stored = volume;
        self.update(|settings| {
            settings.volume = volume;
            *settings = settings.clone().clamped();
            stored = settings.volume;
        })?;
        Ok(stored)
    }

    /// Returns the stored value after clamping.
    pub fn set_default_minutes(&self, minutes: u64) -> Result<u64> {
        let mut stored = minutes;
        self.update(|settings| {
            stored = minutes.clamp(1, settings.default_minutes_cap());
            settings.default_minutes = stored;
        })?;
        Ok(stored)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
