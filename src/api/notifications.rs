//! Notification opt-in per group

use anyhow::{bail, Result};

use crate::config::NotificationPreferences;

pub fn notifications(group_id: &str, set: Option<&str>) -> Result<()> {
    let mut prefs = NotificationPreferences::load()?;

    if let Some(value) = set {
        let enabled = match value {
            "on" => true,
            "off" => false,
            other => bail!("Invalid value '{}': use 'on' or 'off'", other),
        };
        prefs.set(group_id, enabled);
        prefs.save()?;
        tracing::info!("Notification preference for {} saved", group_id);
    }

    let label = match prefs.get(group_id) {
        Some(true) => "on",
        Some(false) => "off",
        None => "not set",
    };
    println!("Notifications for {}: {}", group_id, label);
    Ok(())
}
