//! The signed-in user, built once at startup and passed to whoever needs it

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::StoredToken;
use crate::config::Config;
use crate::models::SenderIdentity;

/// Session as persisted in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub token: StoredToken,
}

/// Identity of the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_url,
        }
    }

    /// Load the stored session, refusing expired tokens.
    pub fn from_config(config: &Config) -> Result<Self> {
        let stored = config
            .session
            .as_ref()
            .context("Not logged in. Run 'groupchat login' first.")?;
        if stored.token.is_expired() {
            bail!("Session token expired. Run 'groupchat login'.");
        }
        Ok(Self::new(
            stored.user_id.clone(),
            stored.display_name.clone(),
            stored.avatar_url.clone(),
        ))
    }

    /// Identity snapshot copied into every message this user sends.
    pub fn sender(&self) -> SenderIdentity {
        SenderIdentity {
            sender_id: self.user_id.clone(),
            sender_name: self.display_name.clone(),
            sender_avatar: self.avatar_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(token: StoredToken) -> Config {
        Config {
            session: Some(StoredSession {
                user_id: "u1".to_string(),
                display_name: "Ada".to_string(),
                avatar_url: Some("https://example.com/ada.png".to_string()),
                token,
            }),
            ..Config::default()
        }
    }

    #[test]
    fn test_from_config() {
        let config = config_with(StoredToken::new("tok".to_string(), Some(3600)));
        let session = Session::from_config(&config).unwrap();
        assert_eq!(session.user_id, "u1");

        let sender = session.sender();
        assert_eq!(sender.sender_id, "u1");
        assert_eq!(sender.sender_name, "Ada");
        assert_eq!(sender.sender_avatar.as_deref(), Some("https://example.com/ada.png"));
    }

    #[test]
    fn test_from_config_rejects_expired_or_missing() {
        let expired = config_with(StoredToken::new("tok".to_string(), Some(10)));
        assert!(Session::from_config(&expired).is_err());
        assert!(Session::from_config(&Config::default()).is_err());
    }
}
