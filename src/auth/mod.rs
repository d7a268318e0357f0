//! Sign-in state
//!
//! Tokens are issued by the backend's identity provider; this module only
//! records them together with the identity they belong to.

pub mod session;
pub mod tokens;

use anyhow::{bail, Result};

use crate::config::Config;

pub use session::{Session, StoredSession};
pub use tokens::StoredToken;

/// What `login` records.
pub struct LoginArgs {
    pub backend_url: String,
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub token: String,
    pub expires_in: Option<u64>,
}

/// Store backend URL, identity and token.
pub async fn login(args: LoginArgs) -> Result<()> {
    // Validate the URL before persisting it.
    crate::store::RestStore::new(&args.backend_url, args.token.clone())?;
    if args.user_id.trim().is_empty() || args.display_name.trim().is_empty() {
        bail!("User id and display name must not be empty");
    }

    let mut config = Config::load()?;
    config.backend_url = Some(args.backend_url);
    config.session = Some(StoredSession {
        user_id: args.user_id,
        display_name: args.display_name,
        avatar_url: args.avatar_url,
        token: StoredToken::new(args.token, args.expires_in),
    });
    config.save()?;
    println!("Login saved.");
    Ok(())
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_session();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth status
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    println!(
        "Backend:     {}",
        config.backend_url.as_deref().unwrap_or("(none)")
    );

    match config.session {
        Some(ref session) => {
            println!("User:        {} ({})", session.display_name, session.user_id);
            if session.token.is_expired() {
                println!("Token:       expired");
            } else {
                println!("Token:       valid");
            }
            if let Some(exp) = session.token.expires_at {
                println!("  expires_at: {}", exp);
            }
        }
        None => {
            println!("User:        none");
            println!("\nRun 'groupchat login' to sign in.");
        }
    }

    let options = config.feed_options();
    println!("Page size:   {}", options.page_size);
    println!("Paging:      {:?}", options.paging);

    Ok(())
}
