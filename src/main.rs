//! groupchat - Lightweight realtime group chat client
//!
//! Follows chat groups live from the terminal, with history paging,
//! text and image sending, and per-group notification opt-in.

mod alerts;
mod api;
mod auth;
mod compose;
mod config;
mod feed;
mod functions;
mod models;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "groupchat")]
#[command(about = "Lightweight terminal client for realtime group chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Save backend, identity and access token
    Login {
        /// Backend base URL
        #[arg(long)]
        backend: String,

        /// Your user ID
        #[arg(long)]
        user_id: String,

        /// Name shown on your messages
        #[arg(long)]
        name: String,

        /// Avatar URL shown on your messages
        #[arg(long)]
        avatar: Option<String>,

        /// Access token issued by the identity provider
        #[arg(long)]
        token: String,

        /// Token lifetime in seconds
        #[arg(long)]
        expires_in: Option<u64>,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// List chat groups, most recently active first
    Groups,

    /// Read messages from a group
    Read {
        /// Group ID (from `groups` output)
        group_id: String,

        /// Number of pages to load, newest first
        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// Send a message
    Send {
        /// Group ID (from `groups` output)
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,
    },

    /// Upload an image and send it
    SendImage {
        /// Group ID (from `groups` output)
        #[arg(short, long)]
        to: String,

        /// Image file
        path: String,
    },

    /// Follow a group live until Ctrl-C
    Watch {
        /// Group ID (from `groups` output)
        group_id: String,
    },

    /// Get/set notification opt-in for a group
    Notifications {
        /// Group ID (from `groups` output)
        group_id: String,

        /// New value: on, off
        #[arg(short, long)]
        set: Option<String>,
    },

    /// Run an offline demo against the in-process backend
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Login {
            backend,
            user_id,
            name,
            avatar,
            token,
            expires_in,
        } => {
            auth::login(auth::LoginArgs {
                backend_url: backend,
                user_id,
                display_name: name,
                avatar_url: avatar,
                token,
                expires_in,
            })
            .await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Groups => {
            tracing::info!("Fetching groups...");
            api::list_groups().await?;
        }
        Commands::Read { group_id, pages } => {
            api::read_messages(&group_id, pages).await?;
        }
        Commands::Send { to, message } => {
            tracing::info!("Sending message...");
            api::send_message(&to, &message).await?;
        }
        Commands::SendImage { to, path } => {
            api::send_image(&to, &path).await?;
        }
        Commands::Watch { group_id } => {
            api::watch(&group_id).await?;
        }
        Commands::Notifications { group_id, set } => {
            api::notifications(&group_id, set.as_deref()).await?;
        }
        Commands::Demo => {
            api::demo().await?;
        }
    }

    Ok(())
}
