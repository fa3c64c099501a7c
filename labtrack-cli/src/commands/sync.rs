//! `labtrack sync` — drive pending synchronization work through the daemon.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use labtrack_daemon::DaemonError;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Sync a single opportunity instead of everything flagged.
    #[arg(long)]
    pub opportunity: Option<String>,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        match labtrack_daemon::request_sync(&home, self.opportunity) {
            Ok(data) => {
                print_summaries(&data);
                Ok(())
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                bail!(
                    "{} daemon is not running; start it with `labtrack daemon start`",
                    "✗".red()
                );
            }
            Err(err) => Err(err).context("sync request failed"),
        }
    }
}

/// Print the task summaries the daemon returns. Targeted requests answer
/// with one summary object, `sync` with no opportunity answers with an array.
pub(crate) fn print_summaries(data: &serde_json::Value) {
    let tasks: Vec<&serde_json::Value> = match data {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(_) => vec![data],
        _ => Vec::new(),
    };
    if tasks.is_empty() {
        println!("{} nothing to sync", "✓".green());
        return;
    }
    for task in tasks {
        let opportunity = task
            .get("opportunity")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        let kind = task.get("task").and_then(|v| v.as_str()).unwrap_or("?");
        let detail = task.get("detail").and_then(|v| v.as_str()).unwrap_or("");
        println!("{} {opportunity} {kind}: {detail}", "✓".green());
    }
}
