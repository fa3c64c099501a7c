//! LabTrack — lab sample tracking with remote documentation sync.
//!
//! # Usage
//!
//! ```text
//! labtrack opportunity add <number> --customer <name> --rsm <name> [--description <text>]
//! labtrack opportunity update <number> [--customer ...] [--rsm ...] [--description ...]
//! labtrack opportunity list
//! labtrack opportunity show <number>
//! labtrack sample add <opportunity> [--quantity N] [--received YYYY-MM-DD]
//! labtrack sample delete <opportunity> <id>
//! labtrack sample locate <opportunity> <id> --location <name> | --clear
//! labtrack sample audit <opportunity> <id>
//! labtrack sample list [--opportunity <number>] [--due]
//! labtrack sync [--opportunity <number>]
//! labtrack export <opportunity>
//! labtrack archive <opportunity>
//! labtrack status [--json]
//! labtrack daemon start|stop|status
//! ```

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    archive::ArchiveArgs, daemon::DaemonCommand, export::ExportArgs, opportunity::OpportunityCommand,
    sample::SampleCommand, status::StatusArgs, sync::SyncArgs,
};
use labtrack_core::types::StorageLocation;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "labtrack",
    version,
    about = "Track lab samples and keep remote documentation folders in sync",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage opportunities (customer/project groupings).
    Opportunity {
        #[command(subcommand)]
        command: OpportunityCommand,
    },

    /// Manage samples under an opportunity.
    Sample {
        #[command(subcommand)]
        command: SampleCommand,
    },

    /// Run pending synchronization work through the daemon.
    Sync(SyncArgs),

    /// Export a CSV documentation snapshot to the sales folder.
    Export(ExportArgs),

    /// Archive an opportunity's remote folder.
    Archive(ArchiveArgs),

    /// Show opportunities, samples, and synchronization flags.
    Status(StatusArgs),

    /// Manage the LabTrack background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared StorageLocation argument — parsed from CLI strings
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `StorageLocation` from CLI args.
#[derive(Debug, Clone)]
pub struct LocationArg(pub StorageLocation);

impl FromStr for LocationArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Same folding on both sides so "walk-in-fridge" matches the
        // hyphenated display name "Walk-in Fridge".
        fn fold(s: &str) -> String {
            s.to_ascii_lowercase().replace(['-', '_'], " ")
        }
        let normalized = fold(s);
        for location in StorageLocation::ALL {
            if fold(location.as_str()) == normalized {
                return Ok(Self(location));
            }
        }
        let known: Vec<&str> = StorageLocation::ALL.iter().map(|l| l.as_str()).collect();
        Err(format!(
            "unknown storage location '{s}'; expected one of: {}",
            known.join(", ")
        ))
    }
}

impl fmt::Display for LocationArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<LocationArg> for StorageLocation {
    fn from(l: LocationArg) -> Self {
        l.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Opportunity { command } => commands::opportunity::run(command),
        Commands::Sample { command } => commands::sample::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Export(args) => args.run(),
        Commands::Archive(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_arg_accepts_dashes_and_case() {
        let parsed: LocationArg = "walk-in-fridge".parse().expect("parse");
        assert_eq!(parsed.0, StorageLocation::WalkInFridge);

        let parsed: LocationArg = "Test Lab Freezer".parse().expect("parse");
        assert_eq!(parsed.0, StorageLocation::TestLabFreezer);

        let parsed: LocationArg = "WALK_IN_FREEZER".parse().expect("parse");
        assert_eq!(parsed.0, StorageLocation::WalkInFreezer);

        assert!("garage".parse::<LocationArg>().is_err());
    }
}
