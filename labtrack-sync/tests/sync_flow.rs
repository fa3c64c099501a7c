//! End-to-end synchronization flows against the in-memory document store.

use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use tempfile::TempDir;

use labtrack_core::store;
use labtrack_core::types::{
    Opportunity, OpportunityNumber, OpportunityRecord, RemoteFolderRef, Sample, SampleId,
};
use labtrack_core::StateTracker;
use labtrack_remote::{Client, MemoryStore, RemoteError, StaticCredentialProvider};
use labtrack_sync::{ArchiveOutcome, RetryPolicy, SyncConfig, SyncError, Synchronizer};

type TestClient = Client<StaticCredentialProvider, MemoryStore>;

fn client() -> TestClient {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = MemoryStore::new();
    store.mkdir_all("/Opportunities");
    store.mkdir_all("/Templates");
    store.put_file("/Templates/Documentation_Template.xlsx", b"template");
    Client::new(
        StaticCredentialProvider::new("tok", Utc::now() + Duration::hours(1)),
        store,
    )
}

fn number() -> OpportunityNumber {
    OpportunityNumber::from("7001")
}

fn received() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).expect("date")
}

fn sample(id: u16) -> Sample {
    Sample {
        unique_id: SampleId(id),
        opportunity_number: number(),
        customer: "Acme Foods".into(),
        rsm: "Pat Doe".into(),
        description: "Case packer trial".into(),
        quantity: 1,
        date_received: received(),
        storage_location: None,
        audit_due_date: None,
        last_audit_date: None,
        audit: false,
    }
}

/// Record in the provisioned state: folder exists remotely, flags clear.
fn provisioned_record(ids: &[u16]) -> OpportunityRecord {
    let now = Utc::now();
    OpportunityRecord {
        opportunity: Opportunity {
            opportunity_number: number(),
            customer: "Acme Foods".into(),
            rsm: "Pat Doe".into(),
            description: "Case packer trial".into(),
            remote_folder_ref: Some(RemoteFolderRef {
                id: "item-folder".into(),
                url: "https://docs.example/Opportunities/7001".into(),
            }),
            new: false,
            needs_update: true,
            export_count: 0,
            last_export_at: None,
            created_at: now,
            updated_at: now,
        },
        samples: ids.iter().copied().map(sample).collect(),
    }
}

fn synchronizer<'a>(client: &'a TestClient, home: &TempDir) -> Synchronizer<'a> {
    Synchronizer::new(
        client,
        StateTracker::new_at(home.path()),
        SyncConfig::default(),
    )
}

#[test]
fn new_opportunity_is_provisioned_end_to_end() {
    let home = TempDir::new().expect("home");
    let client = client();

    store::create_opportunity_at(home.path(), number(), "Acme Foods", "Pat Doe", "Trial")
        .expect("create");
    let sync = synchronizer(&client, &home);
    let folder_ref = sync.ensure_folder_and_template(&number()).expect("ensure");

    let api = client.api();
    assert!(api.exists("/Opportunities/7001"));
    assert!(api.exists("/Opportunities/7001/Samples"));
    let doc = "/Opportunities/7001/Samples/Documentation_7001.xlsx";
    assert!(api.exists(doc));

    // Metadata cells B1-B4: customer, RSM, number, description.
    assert_eq!(api.cell(doc, "Sheet1", 1, 2), Some(json!("Acme Foods")));
    assert_eq!(api.cell(doc, "Sheet1", 2, 2), Some(json!("Pat Doe")));
    assert_eq!(api.cell(doc, "Sheet1", 3, 2), Some(json!("7001")));
    assert_eq!(api.cell(doc, "Sheet1", 4, 2), Some(json!("Trial")));

    assert!(folder_ref.url.contains("link=view"));
    let record = store::load_record_at(home.path(), &number()).expect("load");
    assert!(!record.opportunity.new);
    assert_eq!(record.opportunity.remote_folder_ref, Some(folder_ref));
}

#[test]
fn provisioning_is_idempotent() {
    let home = TempDir::new().expect("home");
    let client = client();
    store::create_opportunity_at(home.path(), number(), "Acme Foods", "Pat Doe", "Trial")
        .expect("create");
    let sync = synchronizer(&client, &home);

    let first = sync.ensure_folder_and_template(&number()).expect("first");
    let second = sync.ensure_folder_and_template(&number()).expect("second");
    assert_eq!(first.id, second.id);
}

#[test]
fn id_column_reconciliation_blanks_and_appends() {
    let home = TempDir::new().expect("home");
    let client = client();
    let api = client.api();

    // Sheet holds {1001, 1002, 1004} at rows 8-10; records want {1001, 1003}.
    store::save_record_at(home.path(), &provisioned_record(&[1001, 1003])).expect("save");
    api.mkdir_all("/Opportunities/7001/Samples");
    let doc = "/Opportunities/7001/Samples/Documentation_7001.xlsx";
    api.put_file(doc, b"workbook");
    {
        use labtrack_remote::{CredentialProvider, DocumentApi};
        let cred = StaticCredentialProvider::new("tok", Utc::now() + Duration::hours(1))
            .acquire()
            .expect("cred");
        api.write_range(
            &cred,
            doc,
            "Sheet1",
            "A8:A10",
            &vec![vec![json!(1001)], vec![json!(1002)], vec![json!(1004)]],
        )
        .expect("seed");
    }

    let sync = synchronizer(&client, &home);
    let plan = sync.sync_sample_ids(&number()).expect("sync");

    assert_eq!(plan.blank_rows, vec![9, 10]);
    assert_eq!(plan.appends, vec![(11, SampleId(1003))]);

    // Rows 9-10 are blank, not compacted; 1003 landed at row 11 with its
    // received date alongside.
    assert_eq!(api.cell(doc, "Sheet1", 8, 1), Some(json!(1001)));
    assert_eq!(api.cell(doc, "Sheet1", 9, 1), None);
    assert_eq!(api.cell(doc, "Sheet1", 10, 1), None);
    assert_eq!(api.cell(doc, "Sheet1", 11, 1), Some(json!(1003)));
    assert_eq!(api.cell(doc, "Sheet1", 11, 2), Some(json!("2025-03-10")));

    let record = store::load_record_at(home.path(), &number()).expect("load");
    assert!(!record.opportunity.needs_update);
}

#[test]
fn sync_before_provisioning_is_rejected() {
    let home = TempDir::new().expect("home");
    let client = client();
    store::create_opportunity_at(home.path(), number(), "Acme Foods", "Pat Doe", "Trial")
        .expect("create");

    let sync = synchronizer(&client, &home);
    let err = sync.sync_sample_ids(&number()).unwrap_err();
    assert!(matches!(err, SyncError::FolderNotProvisioned { .. }));
}

#[test]
fn archive_round_trip_restores_workbook_contents() {
    let home = TempDir::new().expect("home");
    let client = client();
    store::create_opportunity_at(home.path(), number(), "Acme Foods", "Pat Doe", "Trial")
        .expect("create");
    let sync = synchronizer(&client, &home);
    sync.ensure_folder_and_template(&number()).expect("ensure");

    let outcome = sync.archive_opportunity(&number()).expect("archive");
    assert_eq!(outcome, ArchiveOutcome::Archived);
    let api = client.api();
    assert!(!api.exists("/Opportunities/7001"));
    assert!(api.exists("/_Archive/7001/Samples/Documentation_7001.xlsx"));

    let record = store::load_record_at(home.path(), &number()).expect("load");
    assert!(record.opportunity.new, "archived opportunity re-flags as new");
    assert!(record.opportunity.remote_folder_ref.is_none());

    // A later provisioning pass restores the archived folder, metadata
    // cells intact, rather than starting from the blank template.
    sync.ensure_folder_and_template(&number()).expect("restore");
    assert!(api.exists("/Opportunities/7001/Samples/Documentation_7001.xlsx"));
    assert!(!api.exists("/_Archive/7001"));
}

#[test]
fn archiving_twice_reports_already_archived() {
    let home = TempDir::new().expect("home");
    let client = client();
    store::create_opportunity_at(home.path(), number(), "Acme Foods", "Pat Doe", "Trial")
        .expect("create");
    let sync = synchronizer(&client, &home);
    sync.ensure_folder_and_template(&number()).expect("ensure");

    assert_eq!(
        sync.archive_opportunity(&number()).expect("first"),
        ArchiveOutcome::Archived
    );
    assert_eq!(
        sync.archive_opportunity(&number()).expect("second"),
        ArchiveOutcome::AlreadyArchived
    );
}

#[test]
fn export_uploads_snapshot_and_bumps_bookkeeping() {
    let home = TempDir::new().expect("home");
    let client = client();
    store::save_record_at(home.path(), &provisioned_record(&[1005, 1001])).expect("save");
    let sync = synchronizer(&client, &home);

    let name = sync
        .export_documentation(&number(), received())
        .expect("export");
    assert_eq!(name, "Samples_7001_2025-03-10.csv");

    let bytes = client
        .api()
        .file_content("/Sales/Samples_7001_2025-03-10.csv")
        .expect("uploaded");
    let text = String::from_utf8(bytes).expect("utf8");
    assert!(text.starts_with("Sample ID,"));
    assert!(text.contains("\n1001,7001,"));

    let record = store::load_record_at(home.path(), &number()).expect("load");
    assert_eq!(record.opportunity.export_count, 1);
    assert!(record.opportunity.last_export_at.is_some());

    // Same-day re-export overwrites the snapshot and still counts.
    sync.export_documentation(&number(), received()).expect("again");
    let record = store::load_record_at(home.path(), &number()).expect("load");
    assert_eq!(record.opportunity.export_count, 2);
}

#[test]
fn failed_remote_pass_leaves_flags_set() {
    let home = TempDir::new().expect("home");
    let client = client();
    store::create_opportunity_at(home.path(), number(), "Acme Foods", "Pat Doe", "Trial")
        .expect("create");
    client.api().fail_next(RemoteError::Transient {
        message: "connection reset".into(),
    });

    let sync = synchronizer(&client, &home);
    sync.ensure_folder_and_template(&number()).unwrap_err();

    let record = store::load_record_at(home.path(), &number()).expect("load");
    assert!(record.opportunity.new, "failure must not clear the flag");
}

#[test]
fn retry_policy_recovers_a_flaky_provisioning_pass() {
    let home = TempDir::new().expect("home");
    let client = client();
    store::create_opportunity_at(home.path(), number(), "Acme Foods", "Pat Doe", "Trial")
        .expect("create");
    client.api().fail_next(RemoteError::Transient {
        message: "connection reset".into(),
    });

    let sync = synchronizer(&client, &home);
    let policy = RetryPolicy {
        jitter: 0.0,
        ..RetryPolicy::default()
    };
    let mut delays = Vec::new();
    policy
        .run("ensure_folder", |d| delays.push(d), || {
            sync.ensure_folder_and_template(&number())
        })
        .expect("second attempt succeeds");

    assert_eq!(delays.len(), 1);
    let record = store::load_record_at(home.path(), &number()).expect("load");
    assert!(!record.opportunity.new);
}
