//! `labtrack archive` — move an opportunity's remote folder to the archive.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use labtrack_daemon::DaemonError;

use super::sync::print_summaries;

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Opportunity number to archive.
    pub opportunity: String,
}

impl ArchiveArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        match labtrack_daemon::request_archive(&home, self.opportunity) {
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
            Err(err) => Err(err).context("archive request failed"),
        }
    }
}
