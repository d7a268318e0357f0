//! Per-group notification opt-in, persisted next to the config file
//!
//! Values are stored as strings. Only `"true"` and `"false"` count as a
//! choice; anything else reads as "not asked yet".

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default)]
    groups: BTreeMap<String, String>,
}

impl NotificationPreferences {
    fn path() -> Result<PathBuf> {
        Ok(super::config_dir()?.join("preferences.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).context("Failed to read preferences file")?;
        toml::from_str(&content).context("Failed to parse preferences file")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize preferences")?;
        super::write_private(path, &content)
    }

    /// The recorded choice for a group, if any.
    pub fn get(&self, group_id: &str) -> Option<bool> {
        match self.groups.get(group_id).map(String::as_str) {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }

    pub fn set(&mut self, group_id: &str, wants_notifications: bool) {
        self.groups
            .insert(group_id.to_string(), wants_notifications.to_string());
    }

    /// Whether the user still has to be asked about this group.
    pub fn needs_prompt(&self, group_id: &str) -> bool {
        self.get(group_id).is_none()
    }
}
