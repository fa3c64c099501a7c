//! `labtrack daemon` — background sync daemon lifecycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Subcommand;

use labtrack_daemon::paths::socket_path;
use labtrack_daemon::{request_status, request_stop, start_blocking, DaemonError};
use labtrack_remote::{Client, MemoryStore, StaticCredentialProvider};
use labtrack_sync::SyncConfig;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (flag scheduler + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        DaemonCommand::Start => {
            // In-memory document backend for development installs. A wire
            // driver slots in here once one exists; the runtime only sees
            // the DocumentStore trait.
            let config = SyncConfig::load_at(&home).context("failed to load sync config")?;
            let store = MemoryStore::new();
            store.mkdir_all(&config.active_root);
            store.mkdir_all(&config.archive_root);
            store.mkdir_all(&config.sales_root);
            store.put_file(&config.template_path, b"documentation template");

            let client = Client::new(
                StaticCredentialProvider::new("dev-token", Utc::now() + Duration::days(365)),
                store,
            );
            start_blocking(&home, Arc::new(client)).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
    }

    Ok(())
}
