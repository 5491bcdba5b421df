//! TabStash CLI - save, list and sync tab groups from a terminal.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tabstash_core::sync::OfflineRemote;
#[cfg(feature = "sync")]
use tabstash_core::sync::HttpRemoteStore;
use tabstash_core::{
    ensure_data_dir, get_config_path, get_default_store_path, LoadResult, RemoteStore, SaveSync,
    Session, SqliteStore, StaticSession, SyncConfig, TabDraft, TabGroup, TabStash,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const ENV_USER_ID: &str = "TABSTASH_USER_ID";
const ENV_ACCESS_TOKEN: &str = "TABSTASH_ACCESS_TOKEN";

/// TabStash CLI - local-first tab groups with encrypted sync
#[derive(Parser)]
#[command(name = "tabstash")]
#[command(about = "Local-first tab groups with end-to-end encrypted sync", long_about = None)]
struct Cli {
    /// Path to the sync configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the local store
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save URLs as a new tab group
    Save {
        /// Group name
        #[arg(long)]
        name: String,

        /// Mark the group as an automatic save
        #[arg(long)]
        auto: bool,

        /// URLs to save (the URL doubles as the title)
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// List stored groups
    List {
        /// Refresh from the remote store first
        #[arg(long)]
        pull: bool,
    },

    /// Rename a group
    Rename { group_id: String, name: String },

    /// Delete a group
    Delete { group_id: String },

    /// Delete a single tab from a group
    DeleteTab { group_id: String, tab_id: String },

    /// Move a tab to another group
    Move {
        tab_id: String,
        from_group_id: String,
        to_group_id: String,
    },

    /// Print a group's URLs for reopening
    Restore { group_id: String },

    /// Replay queued remote writes
    Flush,

    /// Show sync health
    Status,

    /// Forget the cached encryption key for the current user
    SignOut,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(get_config_path);
    let config = SyncConfig::load_with_env(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let db_path = match cli.database.clone() {
        Some(path) => path,
        None => {
            ensure_data_dir()?;
            get_default_store_path()
        }
    };
    let store = Arc::new(SqliteStore::open(&db_path)?);

    let sessions = Arc::new(session_from_env());
    let remote = remote_store(&config, sessions.clone())?;
    let stash = TabStash::new(store, remote, sessions, &config);

    match cli.command {
        Commands::Save { name, auto, urls } => {
            let drafts = urls.into_iter().map(|url| TabDraft::new(url.clone(), url)).collect();
            let report = stash.save_tabs(&name, drafts, auto).await?;
            println!("Saved group {} ({} tabs)", report.group.id, report.group.tabs.len());
            print_sync(&report.sync);
        }
        Commands::List { pull } => {
            let groups = if pull {
                match stash.load_groups().await? {
                    LoadResult::Applied(groups) => groups,
                    LoadResult::Stale => bail!("load was superseded"),
                }
            } else {
                stash.records().list_groups().await?
            };
            for group in &groups {
                print_group(group);
            }
            if groups.is_empty() {
                println!("No saved groups");
            }
        }
        Commands::Rename { group_id, name } => {
            let report = stash.rename_group(&group_id, &name).await?;
            println!("Renamed {} to {:?}", report.group.id, report.group.name);
            print_sync(&report.sync);
        }
        Commands::Delete { group_id } => match stash.delete_group(&group_id).await? {
            Some(group) => println!("Deleted {:?}", group.name),
            None => bail!("no group {}", group_id),
        },
        Commands::DeleteTab { group_id, tab_id } => {
            match stash.delete_tab(&group_id, &tab_id).await? {
                Some(tab) => println!("Deleted {}", tab.url),
                None => bail!("no tab {} in group {}", tab_id, group_id),
            }
        }
        Commands::Move {
            tab_id,
            from_group_id,
            to_group_id,
        } => match stash.move_tab(&tab_id, &from_group_id, &to_group_id).await? {
            Some((_, target)) => println!("Moved to {:?}", target.name),
            None => bail!("tab {} could not be moved", tab_id),
        },
        Commands::Restore { group_id } => {
            let group = stash.restore_group(&group_id).await?;
            for tab in group.sorted_tabs() {
                println!("{}", tab.url);
            }
        }
        Commands::Flush => {
            let report = stash.flush().await?;
            println!(
                "Flushed: {} succeeded, {} failed, {} dropped",
                report.succeeded, report.failed, report.dropped
            );
        }
        Commands::Status => {
            let queued = stash.engine().queue().size().await?;
            println!("{} ({} queued)", stash.sync_status().await?, queued);
        }
        Commands::SignOut => {
            stash.sign_out().await?;
            println!("Cached key cleared");
        }
    }

    Ok(())
}

fn session_from_env() -> StaticSession {
    match (std::env::var(ENV_USER_ID), std::env::var(ENV_ACCESS_TOKEN)) {
        (Ok(user_id), Ok(token)) if !user_id.is_empty() => {
            info!(user_id = %user_id, "Using session from environment");
            StaticSession::signed_in(Session::new(user_id, token))
        }
        _ => StaticSession::signed_out(),
    }
}

#[cfg(feature = "sync")]
fn remote_store(config: &SyncConfig, sessions: Arc<StaticSession>) -> Result<Arc<dyn RemoteStore>> {
    if !config.sync_configured() {
        return Ok(Arc::new(OfflineRemote));
    }
    let remote = HttpRemoteStore::new(
        config.require_remote_url()?,
        config.api_key.as_deref().unwrap_or_default(),
        config.request_timeout(),
        sessions,
    )?;
    Ok(Arc::new(remote))
}

#[cfg(not(feature = "sync"))]
fn remote_store(_config: &SyncConfig, _sessions: Arc<StaticSession>) -> Result<Arc<dyn RemoteStore>> {
    Ok(Arc::new(OfflineRemote))
}

fn print_group(group: &TabGroup) {
    let kind = if group.is_auto_save { " [auto]" } else { "" };
    println!(
        "{}  {}{}  ({} tabs, updated {})",
        group.id,
        group.name,
        kind,
        group.tabs.len(),
        group.updated_at.format("%Y-%m-%d %H:%M")
    );
    for tab in group.sorted_tabs() {
        println!("    {}  {}", tab.id, tab.title);
    }
}

fn print_sync(sync: &SaveSync) {
    match sync {
        SaveSync::Skipped => println!("Sync: skipped"),
        SaveSync::Blocked => println!("Sync: blocked by save throttle"),
        SaveSync::Pushed(outcome) => println!("Sync: {:?}", outcome),
        SaveSync::CapacityExceeded(message) => println!("Sync: capacity exceeded ({})", message),
    }
}
