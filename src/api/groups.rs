//! Group listing

use anyhow::{Context as _, Result};

use super::Context;
use crate::alerts;
use crate::store::DocumentStore;

pub async fn list_groups() -> Result<()> {
    let ctx = Context::load()?;
    let groups = ctx
        .store
        .list_groups()
        .await
        .context(alerts::FETCH_GROUPS_FAILED)?;

    println!("\nChat Groups:");
    println!("{:-<60}", "");

    if groups.is_empty() {
        println!("  (no groups found)");
        return Ok(());
    }

    for group in &groups {
        println!("{}", group.name);
        println!("  ID:   {}", group.id);
        if !group.description.is_empty() {
            println!("  {}", group.description);
        }
        if let Some(at) = group.last_message_at {
            println!("  Last: {}", at.format("%Y-%m-%d %H:%M"));
        }
        println!();
    }

    Ok(())
}
