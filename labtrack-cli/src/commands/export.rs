//! `labtrack export` — CSV documentation snapshot, via the daemon.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use labtrack_daemon::DaemonError;

use super::sync::print_summaries;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Opportunity number to export.
    pub opportunity: String,
}

impl ExportArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        match labtrack_daemon::request_export(&home, self.opportunity) {
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
            Err(err) => Err(err).context("export request failed"),
        }
    }
}
