//! `labtrack sample` — sample CRUD, storage locations, audits.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;

use labtrack_core::store::{self, SyncTrigger};
use labtrack_core::types::{OpportunityNumber, SampleId};

use crate::LocationArg;

#[derive(Subcommand, Debug)]
pub enum SampleCommand {
    /// Create samples under an opportunity (one id per unit).
    Add(AddArgs),
    /// Delete a sample, retiring its id.
    Delete(DeleteArgs),
    /// Assign or clear a sample's storage location.
    Locate(LocateArgs),
    /// Record a completed audit for a sample.
    Audit(AuditArgs),
    /// List samples, optionally only those with audits due.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Opportunity number the samples belong to.
    pub opportunity: String,

    /// How many samples to create.
    #[arg(long, default_value_t = 1)]
    pub quantity: u32,

    /// Customer name (defaults from the opportunity when it exists).
    #[arg(long)]
    pub customer: Option<String>,

    /// Regional sales manager.
    #[arg(long)]
    pub rsm: Option<String>,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Date received, YYYY-MM-DD (defaults to today).
    #[arg(long)]
    pub received: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub opportunity: String,
    pub id: u16,
}

#[derive(Args, Debug)]
pub struct LocateArgs {
    pub opportunity: String,
    pub id: u16,

    /// Storage location name, e.g. "test-lab-fridge".
    #[arg(long, conflicts_with = "clear")]
    pub location: Option<LocationArg>,

    /// Remove the storage location assignment.
    #[arg(long)]
    pub clear: bool,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    pub opportunity: String,
    pub id: u16,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter to one opportunity.
    #[arg(long)]
    pub opportunity: Option<String>,

    /// Show only samples whose audit is due on or before today.
    #[arg(long)]
    pub due: bool,
}

pub fn run(command: SampleCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        SampleCommand::Add(args) => {
            let number = OpportunityNumber::from(args.opportunity.clone());
            // Customer and RSM fall back to the opportunity record; for a
            // brand-new opportunity they must be given explicitly.
            let (customer, rsm) = match store::load_record_at(&home, &number) {
                Ok(record) => (
                    args.customer.unwrap_or(record.opportunity.customer),
                    args.rsm.unwrap_or(record.opportunity.rsm),
                ),
                Err(_) => match (args.customer, args.rsm) {
                    (Some(customer), Some(rsm)) => (customer, rsm),
                    _ => bail!(
                        "opportunity '{number}' does not exist yet; pass --customer and --rsm"
                    ),
                },
            };
            let received = args.received.unwrap_or_else(|| Utc::now().date_naive());

            let batch = store::add_samples_at(
                &home,
                &number,
                args.quantity,
                &customer,
                &rsm,
                &args.description,
                received,
            )
            .context("failed to create samples")?;

            let ids: Vec<String> = batch.created.iter().map(|id| id.to_string()).collect();
            println!(
                "{} created {} sample(s) under '{number}': {}",
                "✓".green(),
                batch.created.len(),
                ids.join(", ")
            );
            print_triggers(&batch.triggers);
        }
        SampleCommand::Delete(args) => {
            let number = OpportunityNumber::from(args.opportunity);
            let triggers = store::delete_sample_at(&home, &number, SampleId(args.id))
                .context("failed to delete sample")?;
            println!("{} sample {} deleted (id retired)", "✓".green(), args.id);
            print_triggers(&triggers);
        }
        SampleCommand::Locate(args) => {
            let number = OpportunityNumber::from(args.opportunity);
            let location = match (&args.location, args.clear) {
                (Some(location), false) => Some(location.0),
                (None, true) => None,
                _ => bail!("pass either --location <name> or --clear"),
            };
            store::set_storage_location_at(
                &home,
                &number,
                SampleId(args.id),
                location,
                Utc::now().date_naive(),
            )
            .context("failed to set storage location")?;
            match location {
                Some(location) => println!(
                    "{} sample {} stored at {}",
                    "✓".green(),
                    args.id,
                    location.as_str()
                ),
                None => println!("{} sample {} location cleared", "✓".green(), args.id),
            }
        }
        SampleCommand::Audit(args) => {
            let number = OpportunityNumber::from(args.opportunity);
            let today = Utc::now().date_naive();
            store::record_audit_at(&home, &number, SampleId(args.id), today)
                .context("failed to record audit")?;
            println!("{} audit recorded for sample {}", "✓".green(), args.id);
        }
        SampleCommand::List(args) => {
            let today = Utc::now().date_naive();
            let mut records = store::list_records_at(&home).context("failed to list samples")?;
            if let Some(filter) = args.opportunity.as_ref() {
                records.retain(|r| r.opportunity.opportunity_number.0 == *filter);
            }

            let mut shown = 0usize;
            for record in &records {
                for sample in &record.samples {
                    let due = sample.audit_due_date.map(|d| d <= today).unwrap_or(false);
                    if args.due && !due {
                        continue;
                    }
                    shown += 1;
                    let location = sample
                        .storage_location
                        .map(|l| l.as_str().to_string())
                        .unwrap_or_else(|| "unassigned".to_string());
                    let due_mark = if due {
                        format!("  {}", "[audit due]".red())
                    } else {
                        String::new()
                    };
                    println!(
                        "{}  {}  received {}  {}{due_mark}",
                        sample.unique_id,
                        sample.opportunity_number,
                        sample.date_received,
                        location
                    );
                }
            }
            if shown == 0 {
                println!("no samples{}", if args.due { " with audits due" } else { "" });
            }
        }
    }

    Ok(())
}

fn print_triggers(triggers: &[SyncTrigger]) {
    for trigger in triggers {
        let hint = match trigger {
            SyncTrigger::EnsureFolder => "remote folder provisioning queued",
            SyncTrigger::SyncSampleIds => "id column sync queued",
            SyncTrigger::ArchiveFolder => "folder archive queued (last sample removed)",
        };
        println!("  {hint}");
    }
}
