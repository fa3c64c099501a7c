//! `labtrack opportunity` — opportunity CRUD.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use labtrack_core::store;
use labtrack_core::types::OpportunityNumber;

#[derive(Subcommand, Debug)]
pub enum OpportunityCommand {
    /// Register a new opportunity.
    Add(AddArgs),
    /// Update descriptive fields on an existing opportunity.
    Update(UpdateArgs),
    /// List registered opportunities.
    List,
    /// Show one opportunity with its samples.
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Opportunity number (the immutable key).
    pub number: String,

    #[arg(long)]
    pub customer: String,

    /// Regional sales manager.
    #[arg(long)]
    pub rsm: String,

    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub number: String,

    #[arg(long)]
    pub customer: Option<String>,

    #[arg(long)]
    pub rsm: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub number: String,
}

pub fn run(command: OpportunityCommand) -> Result<()> {
    match command {
        OpportunityCommand::Add(args) => {
            let number = OpportunityNumber::from(args.number);
            let record =
                store::create_opportunity(number, &args.customer, &args.rsm, &args.description)
                    .context("failed to create opportunity")?;
            println!(
                "{} opportunity '{}' for {}",
                "✓".green(),
                record.opportunity.opportunity_number,
                record.opportunity.customer
            );
            if record.opportunity.new {
                println!("  remote folder will be provisioned on the next sync pass");
            }
        }
        OpportunityCommand::Update(args) => {
            let number = OpportunityNumber::from(args.number);
            let changed = store::update_opportunity_fields_at(
                &home()?,
                &number,
                args.customer.as_deref(),
                args.rsm.as_deref(),
                args.description.as_deref(),
            )
            .context("failed to update opportunity")?;
            if changed {
                println!(
                    "{} opportunity '{number}' updated; remote metadata refresh queued",
                    "✓".green()
                );
            } else {
                println!("opportunity '{number}' unchanged");
            }
        }
        OpportunityCommand::List => {
            let records = store::list_records().context("failed to list opportunities")?;
            if records.is_empty() {
                println!("No opportunities registered. Run `labtrack opportunity add` first.");
                return Ok(());
            }
            for record in records {
                let opp = &record.opportunity;
                let flags = flag_marks(opp.new, opp.needs_update);
                println!(
                    "{}  {}  {} sample(s){flags}",
                    opp.opportunity_number, opp.customer, record.samples.len()
                );
            }
        }
        OpportunityCommand::Show(args) => {
            let number = OpportunityNumber::from(args.number);
            let record = store::load_record(&number).context("opportunity not found")?;
            let opp = &record.opportunity;

            println!("opportunity: {}", opp.opportunity_number);
            println!("customer:    {}", opp.customer);
            println!("rsm:         {}", opp.rsm);
            if !opp.description.is_empty() {
                println!("description: {}", opp.description);
            }
            match &opp.remote_folder_ref {
                Some(folder) => println!("folder:      {}", folder.url),
                None => println!("folder:      {}", "not provisioned".yellow()),
            }
            println!(
                "flags:       new={} needs_update={}",
                opp.new, opp.needs_update
            );
            println!("exports:     {}", opp.export_count);

            if record.samples.is_empty() {
                println!("samples:     none");
            } else {
                println!("samples:");
                for sample in &record.samples {
                    let location = sample
                        .storage_location
                        .map(|l| l.as_str().to_string())
                        .unwrap_or_else(|| "unassigned".to_string());
                    println!(
                        "  {}  received {}  {}",
                        sample.unique_id, sample.date_received, location
                    );
                }
            }
        }
    }

    Ok(())
}

fn flag_marks(new: bool, needs_update: bool) -> String {
    let mut marks = String::new();
    if new {
        marks.push_str(&format!("  {}", "[new]".yellow()));
    }
    if needs_update {
        marks.push_str(&format!("  {}", "[needs sync]".yellow()));
    }
    marks
}

fn home() -> Result<std::path::PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}
