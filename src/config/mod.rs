//! Configuration and credential storage

mod preferences;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::StoredSession;
use crate::feed::{FeedOptions, PagingPolicy, DEFAULT_PAGE_SIZE};

pub use preferences::NotificationPreferences;

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL (e.g. https://chat.example.com/api)
    pub backend_url: Option<String>,
    /// Messages per live window and per backfill page
    pub page_size: Option<usize>,
    /// How the feed decides there is nothing older to pull
    pub paging: Option<PagingPolicy>,
    /// Signed-in identity and bearer token
    pub session: Option<StoredSession>,
}

/// Config directory path
pub(crate) fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "groupchat", "groupchat")
        .context("Could not determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Write a file holding credentials or preferences, readable by the owner only.
pub(crate) fn write_private(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("Failed to create config directory")?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).context("Failed to set config permissions")?;
    }

    Ok(())
}

impl Config {
    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_private(path, &content)
    }

    /// Feed settings, falling back to defaults for anything unset.
    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            page_size: self.page_size.filter(|n| *n > 0).unwrap_or(DEFAULT_PAGE_SIZE),
            paging: self.paging.unwrap_or_default(),
        }
    }

    pub fn clear_session(&mut self) {
        self.session = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::StoredToken;

    pub(crate) fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("groupchat-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load_from(&temp_path("config.toml")).unwrap();
        assert!(config.backend_url.is_none());
        assert_eq!(config.feed_options(), FeedOptions::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("config.toml");
        let config = Config {
            backend_url: Some("https://chat.example.com".to_string()),
            page_size: Some(25),
            paging: Some(PagingPolicy::PageMultiple),
            session: Some(StoredSession {
                user_id: "u1".to_string(),
                display_name: "Ada".to_string(),
                avatar_url: None,
                token: StoredToken::new("tok".to_string(), Some(3600)),
            }),
        };
        config.save_to(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("paging = \"page-multiple\""));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.backend_url, config.backend_url);
        assert_eq!(
            loaded.feed_options(),
            FeedOptions {
                page_size: 25,
                paging: PagingPolicy::PageMultiple
            }
        );
        assert_eq!(loaded.session.unwrap().display_name, "Ada");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_zero_page_size_falls_back() {
        let config = Config {
            page_size: Some(0),
            ..Config::default()
        };
        assert_eq!(config.feed_options().page_size, DEFAULT_PAGE_SIZE);
    }
}
