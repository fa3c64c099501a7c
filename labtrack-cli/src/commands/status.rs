//! `labtrack status` — synchronization and audit visibility.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use labtrack_core::store;
use labtrack_core::types::OpportunityRecord;

/// Arguments for `labtrack status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter to a specific opportunity.
    #[arg(long)]
    pub opportunity: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;

        let mut records = store::list_records_at(&home)
            .context("failed to load opportunity records — run `labtrack opportunity add` first")?;
        if let Some(filter) = self.opportunity.as_ref() {
            records.retain(|record| record.opportunity.opportunity_number.0 == *filter);
        }

        let report = build_report(&records, Utc::now().date_naive());
        if self.json {
            print_json(report)?;
            return Ok(());
        }

        print_table(report);
        Ok(())
    }
}

/// Derived synchronization state for one opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncSignal {
    /// Remote folder exists and no flags are set.
    Current,
    /// Remote folder exists but the id column is out of date.
    NeedsSync,
    /// No remote folder yet; provisioning is pending.
    NotProvisioned,
}

#[derive(Debug, Clone)]
struct OpportunityStatus {
    opportunity: String,
    customer: String,
    signal: SyncSignal,
    samples: usize,
    audits_due: usize,
    exports: u32,
    folder_url: Option<String>,
}

#[derive(Debug, Clone)]
struct StatusReport {
    pending_count: usize,
    audits_due_count: usize,
    opportunities: Vec<OpportunityStatus>,
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    opportunities: Vec<OpportunityStatusJson>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    opportunities: usize,
    pending_sync: usize,
    audits_due: usize,
}

#[derive(Serialize)]
struct OpportunityStatusJson {
    opportunity: String,
    customer: String,
    status: String,
    samples: usize,
    audits_due: usize,
    exports: u32,
    folder_url: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "opportunity")]
    opportunity: String,
    #[tabled(rename = "customer")]
    customer: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "samples")]
    samples: usize,
    #[tabled(rename = "audits due")]
    audits_due: usize,
    #[tabled(rename = "exports")]
    exports: u32,
}

fn build_report(records: &[OpportunityRecord], today: NaiveDate) -> StatusReport {
    let mut rows = Vec::new();
    for record in records {
        let opp = &record.opportunity;
        let signal = if opp.new || opp.remote_folder_ref.is_none() {
            SyncSignal::NotProvisioned
        } else if opp.needs_update {
            SyncSignal::NeedsSync
        } else {
            SyncSignal::Current
        };
        let audits_due = record
            .samples
            .iter()
            .filter(|sample| sample.audit_due_date.map(|d| d <= today).unwrap_or(false))
            .count();

        rows.push(OpportunityStatus {
            opportunity: opp.opportunity_number.0.clone(),
            customer: opp.customer.clone(),
            signal,
            samples: record.samples.len(),
            audits_due,
            exports: opp.export_count,
            folder_url: opp.remote_folder_ref.as_ref().map(|f| f.url.clone()),
        });
    }

    let pending_count = rows
        .iter()
        .filter(|row| row.signal != SyncSignal::Current)
        .count();
    let audits_due_count = rows.iter().map(|row| row.audits_due).sum();

    StatusReport {
        pending_count,
        audits_due_count,
        opportunities: rows,
    }
}

fn print_json(report: StatusReport) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            opportunities: report.opportunities.len(),
            pending_sync: report.pending_count,
            audits_due: report.audits_due_count,
        },
        opportunities: report
            .opportunities
            .into_iter()
            .map(|row| OpportunityStatusJson {
                opportunity: row.opportunity,
                customer: row.customer,
                status: signal_key(row.signal).to_string(),
                samples: row.samples,
                audits_due: row.audits_due,
                exports: row.exports,
                folder_url: row.folder_url,
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(report: StatusReport) {
    println!(
        "LabTrack v{} | {} opportunities | {} pending sync | {} audits due",
        env!("CARGO_PKG_VERSION"),
        report.opportunities.len(),
        report.pending_count,
        report.audits_due_count,
    );

    if report.opportunities.is_empty() {
        println!("No opportunities registered.");
        return;
    }

    println!(
        "Indicators: {} CURRENT  {} NEEDS SYNC  {} NOT PROVISIONED",
        signal_indicator(SyncSignal::Current),
        signal_indicator(SyncSignal::NeedsSync),
        signal_indicator(SyncSignal::NotProvisioned),
    );

    let table_rows: Vec<StatusTableRow> = report
        .opportunities
        .iter()
        .map(|row| StatusTableRow {
            opportunity: format!("{} {}", signal_indicator(row.signal), row.opportunity),
            customer: row.customer.clone(),
            status: signal_label(row.signal).to_string(),
            samples: row.samples,
            audits_due: row.audits_due,
            exports: row.exports,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if report.pending_count > 0 {
        println!("Run 'labtrack sync' to push pending changes.");
    }
}

fn signal_key(signal: SyncSignal) -> &'static str {
    match signal {
        SyncSignal::Current => "current",
        SyncSignal::NeedsSync => "needs_sync",
        SyncSignal::NotProvisioned => "not_provisioned",
    }
}

fn signal_label(signal: SyncSignal) -> &'static str {
    match signal {
        SyncSignal::Current => "CURRENT",
        SyncSignal::NeedsSync => "NEEDS SYNC",
        SyncSignal::NotProvisioned => "NOT PROVISIONED",
    }
}

fn signal_indicator(signal: SyncSignal) -> String {
    match signal {
        SyncSignal::Current => "■".green().bold().to_string(),
        SyncSignal::NeedsSync => "■".yellow().bold().to_string(),
        SyncSignal::NotProvisioned => "■".bright_black().bold().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use labtrack_core::types::{
        Opportunity, OpportunityNumber, OpportunityRecord, RemoteFolderRef, Sample, SampleId,
    };

    fn record(new: bool, needs_update: bool, with_ref: bool) -> OpportunityRecord {
        let now = Utc::now();
        let number = OpportunityNumber::from("7001");
        OpportunityRecord {
            opportunity: Opportunity {
                opportunity_number: number.clone(),
                customer: "Acme Foods".to_string(),
                rsm: "Pat Doe".to_string(),
                description: String::new(),
                new,
                needs_update,
                remote_folder_ref: with_ref.then(|| RemoteFolderRef {
                    id: "item-1".to_string(),
                    url: "https://docs.example/Opportunities/7001".to_string(),
                }),
                export_count: 0,
                last_export_at: None,
                created_at: now,
                updated_at: now,
            },
            samples: vec![Sample {
                unique_id: SampleId(1001),
                opportunity_number: number,
                customer: "Acme Foods".to_string(),
                rsm: "Pat Doe".to_string(),
                description: String::new(),
                quantity: 1,
                date_received: NaiveDate::from_ymd_opt(2025, 1, 10).expect("date"),
                storage_location: None,
                audit_due_date: Some(NaiveDate::from_ymd_opt(2025, 2, 1).expect("date")),
                last_audit_date: None,
                audit: false,
            }],
        }
    }

    #[test]
    fn report_classifies_flags() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        let records = vec![
            record(true, false, false),
            record(false, true, true),
            record(false, false, true),
        ];
        let report = build_report(&records, today);

        assert_eq!(report.opportunities[0].signal, SyncSignal::NotProvisioned);
        assert_eq!(report.opportunities[1].signal, SyncSignal::NeedsSync);
        assert_eq!(report.opportunities[2].signal, SyncSignal::Current);
        assert_eq!(report.pending_count, 2);
        // Every fixture sample has a due date before today.
        assert_eq!(report.audits_due_count, 3);
    }
}
