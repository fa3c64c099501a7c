use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use labtrack_core::{store, types::OpportunityNumber, StateTracker};
use labtrack_remote::DocumentStore;
use labtrack_sync::{RetryPolicy, SyncConfig, Synchronizer};

use crate::error::{io_err, DaemonError};
use crate::paths::{opportunities_root, run_dir, socket_path, SCAN_INTERVAL};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::queue::{SingleFlightQueue, Task, TaskKind};

/// Per-opportunity last-successful-task timestamps (Unix seconds).
pub type TaskTimestamps = HashMap<String, u64>;

struct TaskJob {
    task: Task,
    source: &'static str,
    respond_to: Option<oneshot::Sender<Result<TaskSummary, String>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub opportunity: String,
    pub task: String,
    pub source: String,
    pub detail: String,
    pub duration_ms: u128,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, remote: Arc<dyn DocumentStore>) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), remote))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf, remote: Arc<dyn DocumentStore>) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let config = SyncConfig::load_at(&home)?;
    let tracker = StateTracker::new_at(&home);
    let timestamps: Arc<RwLock<TaskTimestamps>> = Arc::new(RwLock::new(HashMap::new()));
    let started_at_unix = unix_seconds_now();

    let (task_tx, task_rx) = mpsc::channel::<TaskJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let task_tx = task_tx.clone();
        tokio::spawn(async move {
            let result = scheduler_task(home, task_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let remote = remote.clone();
        let tracker = tracker.clone();
        let config = config.clone();
        let timestamps = timestamps.clone();
        tokio::spawn(async move {
            let result = task_processor_task(
                home,
                remote,
                tracker,
                config,
                timestamps,
                task_rx,
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let task_tx = task_tx.clone();
        let timestamps = timestamps.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                timestamps,
                task_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (scheduler_result, processor_result, socket_result, signal_result) = tokio::join!(
        scheduler_handle,
        processor_handle,
        socket_handle,
        signal_handle
    );

    handle_join("scheduler", scheduler_result)?;
    handle_join("task_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Periodic flag scan: every record whose `new` or `needs_update` flag is
/// set gets its task enqueued, and emptied records get their folder
/// archived. Terminal failures leave flags set, so the next scan naturally
/// re-enqueues the work.
async fn scheduler_task(
    home: PathBuf,
    task_tx: mpsc::Sender<TaskJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(SCAN_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let scan_home = home.clone();
                let tasks = tokio::task::spawn_blocking(move || scan_flags(&scan_home))
                    .await
                    .map_err(|err| DaemonError::Protocol(format!("flag scan join error: {err}")))?;
                let tasks = match tasks {
                    Ok(tasks) => tasks,
                    Err(err) => {
                        tracing::warn!(error = %err, "flag scan failed; will retry next cycle");
                        continue;
                    }
                };
                for task in tasks {
                    let job = TaskJob { task, source: "scheduler", respond_to: None };
                    if task_tx.send(job).await.is_err() {
                        return Err(DaemonError::ChannelClosed("task queue"));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Tasks for every record with a set synchronization flag. `EnsureFolder`
/// precedes `SyncSampleIds` for the same record so the queue runs them in
/// dependency order. A record whose last sample was deleted takes the
/// archive path instead: its remote folder is retired, and the record
/// stays settled until a new sample flags it again.
fn scan_flags(home: &Path) -> Result<Vec<Task>, DaemonError> {
    let mut tasks = Vec::new();
    for record in store::list_records_at(home)? {
        let number = record.opportunity.opportunity_number.clone();
        if record.samples.is_empty() {
            if record.opportunity.remote_folder_ref.is_some() {
                tasks.push(Task::new(number, TaskKind::ArchiveFolder));
            }
            continue;
        }
        if record.opportunity.new {
            tasks.push(Task::new(number.clone(), TaskKind::EnsureFolder));
        }
        if record.opportunity.needs_update {
            tasks.push(Task::new(number, TaskKind::SyncSampleIds));
        }
    }
    Ok(tasks)
}

#[allow(clippy::too_many_arguments)]
async fn task_processor_task(
    home: PathBuf,
    remote: Arc<dyn DocumentStore>,
    tracker: StateTracker,
    config: SyncConfig,
    timestamps: Arc<RwLock<TaskTimestamps>>,
    mut task_rx: mpsc::Receiver<TaskJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut queue = SingleFlightQueue::new();
    let mut waiters: HashMap<Task, Vec<oneshot::Sender<Result<TaskSummary, String>>>> =
        HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = task_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let fresh = queue.enqueue(job.task.clone());
                if !fresh {
                    tracing::debug!(
                        opportunity = %job.task.number,
                        task = job.task.kind.as_str(),
                        "coalesced duplicate task",
                    );
                }
                if let Some(tx) = job.respond_to {
                    waiters.entry(job.task.clone()).or_default().push(tx);
                }

                while let Some(task) = queue.next() {
                    let started = Instant::now();
                    let outcome = execute_task(
                        &home,
                        remote.clone(),
                        tracker.clone(),
                        config.clone(),
                        task.clone(),
                        job.source,
                        started,
                    )
                    .await?;
                    queue.complete(&task.number);

                    if outcome.is_ok() {
                        let mut ts = timestamps.write().await;
                        ts.insert(task.number.0.clone(), unix_seconds_now());
                    }
                    for tx in waiters.remove(&task).unwrap_or_default() {
                        let _ = tx.send(outcome.clone());
                    }
                }
            }
        }
    }

    Ok(())
}

async fn execute_task(
    home: &Path,
    remote: Arc<dyn DocumentStore>,
    tracker: StateTracker,
    config: SyncConfig,
    task: Task,
    source: &'static str,
    started: Instant,
) -> Result<Result<TaskSummary, String>, DaemonError> {
    let number = task.number.clone();
    let kind = task.kind;
    let home = home.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        run_task_blocking(&home, remote.as_ref(), tracker, config, &task)
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("task join error: {err}")))?;

    let outcome = match result {
        Ok(detail) => {
            let summary = TaskSummary {
                opportunity: number.0.clone(),
                task: kind.as_str().to_string(),
                source: source.to_string(),
                detail,
                duration_ms: started.elapsed().as_millis(),
            };
            tracing::info!(
                opportunity = %summary.opportunity,
                task = %summary.task,
                source = %summary.source,
                detail = %summary.detail,
                duration_ms = summary.duration_ms,
                "task completed",
            );
            Ok(summary)
        }
        Err(err) => {
            tracing::error!(
                opportunity = %number,
                task = kind.as_str(),
                error = %err,
                "task failed; flags stay set for the next cycle",
            );
            Err(err.to_string())
        }
    };
    Ok(outcome)
}

/// Run one task to completion with bounded retries. Returns a short detail
/// line for the summary.
fn run_task_blocking(
    home: &Path,
    remote: &dyn DocumentStore,
    tracker: StateTracker,
    config: SyncConfig,
    task: &Task,
) -> Result<String, DaemonError> {
    let sync = Synchronizer::new(remote, tracker, config);
    let policy = RetryPolicy::default();
    let number = &task.number;

    match task.kind {
        TaskKind::EnsureFolder => {
            let folder_ref = policy
                .run_blocking("ensure_folder", || sync.ensure_folder_and_template(number))?;
            Ok(format!("folder ready: {}", folder_ref.url))
        }
        TaskKind::SyncSampleIds => {
            // A record can be flagged both new and needs_update (samples
            // added before first provisioning). Provision first.
            let record = store::load_record_at(home, number)?;
            if record.opportunity.new {
                policy.run_blocking("ensure_folder", || sync.ensure_folder_and_template(number))?;
            }
            let plan = policy.run_blocking("sync_sample_ids", || sync.sync_sample_ids(number))?;
            Ok(format!(
                "{} blanked, {} appended",
                plan.blank_rows.len(),
                plan.appends.len()
            ))
        }
        TaskKind::ExportDocumentation => {
            let today = Utc::now().date_naive();
            let name = policy.run_blocking("export_documentation", || {
                sync.export_documentation(number, today)
            })?;
            Ok(format!("uploaded {name}"))
        }
        TaskKind::ArchiveFolder => {
            let outcome =
                policy.run_blocking("archive_folder", || sync.archive_opportunity(number))?;
            Ok(format!("{outcome:?}"))
        }
    }
}

async fn socket_server_task(
    home: PathBuf,
    timestamps: Arc<RwLock<TaskTimestamps>>,
    task_tx: mpsc::Sender<TaskJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let run = run_dir(&home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let timestamps = timestamps.clone();
                let task_tx = task_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        timestamps,
                        task_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    timestamps: Arc<RwLock<TaskTimestamps>>,
    task_tx: mpsc::Sender<TaskJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        let opportunity = request.opportunity.clone();

        let response = match cmd.as_str() {
            "status" => {
                match build_status_payload(&home, timestamps.clone(), started_at_unix).await {
                    Ok(payload) => DaemonResponse::ok(payload),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "sync" => match opportunity {
                Some(number) => {
                    let task = Task::new(OpportunityNumber::from(number), TaskKind::SyncSampleIds);
                    match enqueue_task(&task_tx, task, "socket").await {
                        Ok(summary) => DaemonResponse::ok(json!(summary)),
                        Err(err) => DaemonResponse::error(err.to_string()),
                    }
                }
                None => match sync_all_flagged(&home, &task_tx).await {
                    Ok(summaries) => DaemonResponse::ok(json!(summaries)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                },
            },
            "export" => match opportunity {
                Some(number) => {
                    let task =
                        Task::new(OpportunityNumber::from(number), TaskKind::ExportDocumentation);
                    match enqueue_task(&task_tx, task, "socket").await {
                        Ok(summary) => DaemonResponse::ok(json!(summary)),
                        Err(err) => DaemonResponse::error(err.to_string()),
                    }
                }
                None => DaemonResponse::error("export requires an opportunity number"),
            },
            "archive" => match opportunity {
                Some(number) => {
                    let task = Task::new(OpportunityNumber::from(number), TaskKind::ArchiveFolder);
                    match enqueue_task(&task_tx, task, "socket").await {
                        Ok(summary) => DaemonResponse::ok(json!(summary)),
                        Err(err) => DaemonResponse::error(err.to_string()),
                    }
                }
                None => DaemonResponse::error("archive requires an opportunity number"),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn sync_all_flagged(
    home: &Path,
    task_tx: &mpsc::Sender<TaskJob>,
) -> Result<Vec<TaskSummary>, DaemonError> {
    let scan_home = home.to_path_buf();
    let tasks = tokio::task::spawn_blocking(move || scan_flags(&scan_home))
        .await
        .map_err(|err| DaemonError::Protocol(format!("flag scan join error: {err}")))??;

    let mut summaries = Vec::new();
    for task in tasks {
        summaries.push(enqueue_task(task_tx, task, "socket").await?);
    }
    Ok(summaries)
}

async fn build_status_payload(
    home: &Path,
    timestamps: Arc<RwLock<TaskTimestamps>>,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    let scan_home = home.to_path_buf();
    let records = tokio::task::spawn_blocking(move || store::list_records_at(&scan_home))
        .await
        .map_err(|err| DaemonError::Protocol(format!("status scan join error: {err}")))??;

    let ts_snapshot: TaskTimestamps = {
        let ts = timestamps.read().await;
        ts.clone()
    };

    let opportunities: Vec<Value> = records
        .iter()
        .map(|record| {
            let number = &record.opportunity.opportunity_number.0;
            json!({
                "opportunity_number": number,
                "new": record.opportunity.new,
                "needs_update": record.opportunity.needs_update,
                "samples": record.samples.len(),
                "export_count": record.opportunity.export_count,
                "last_task_at_unix": ts_snapshot.get(number).copied().unwrap_or(0),
            })
        })
        .collect();

    let last_task_at_unix = ts_snapshot.values().copied().max().unwrap_or(0);
    let flagged = records
        .iter()
        .filter(|r| r.opportunity.new || r.opportunity.needs_update)
        .count();

    Ok(json!({
        "running": true,
        "label": crate::paths::DAEMON_LABEL,
        "started_at_unix": started_at_unix,
        "last_task_at_unix": last_task_at_unix,
        "flagged": flagged,
        "opportunities": opportunities,
        "socket": socket_path(home).display().to_string(),
        "records_root": opportunities_root(home).display().to_string(),
    }))
}

async fn enqueue_task(
    task_tx: &mpsc::Sender<TaskJob>,
    task: Task,
    source: &'static str,
) -> Result<TaskSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    task_tx
        .send(TaskJob {
            task,
            source,
            respond_to: Some(tx),
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("task queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("task response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let records = opportunities_root(home);
    if !records.exists() {
        fs::create_dir_all(&records).map_err(|e| io_err(&records, e))?;
    }
    let run = run_dir(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration as ChronoDuration, NaiveDate};
    use labtrack_remote::{Client, MemoryStore, StaticCredentialProvider};
    use tempfile::TempDir;
    use tokio::sync::{broadcast, mpsc};

    fn seeded_remote() -> Arc<dyn DocumentStore> {
        let api = MemoryStore::new();
        api.mkdir_all("/Opportunities");
        api.mkdir_all("/Templates");
        api.put_file("/Templates/Documentation_Template.xlsx", b"template");
        Arc::new(Client::new(
            StaticCredentialProvider::new("tok", Utc::now() + ChronoDuration::hours(1)),
            api,
        ))
    }

    fn seed_record(home: &Path, quantity: u32) -> OpportunityNumber {
        let number = OpportunityNumber::from("7001");
        store::add_samples_at(
            home,
            &number,
            quantity,
            "Acme Foods",
            "Pat Doe",
            "Case packer trial",
            NaiveDate::from_ymd_opt(2025, 3, 10).expect("date"),
        )
        .expect("seed");
        number
    }

    #[test]
    fn flag_scan_orders_provisioning_before_id_sync() {
        let home = TempDir::new().expect("home");
        let number = seed_record(home.path(), 2);

        let tasks = scan_flags(home.path()).expect("scan");
        assert_eq!(
            tasks,
            vec![
                Task::new(number.clone(), TaskKind::EnsureFolder),
                Task::new(number, TaskKind::SyncSampleIds),
            ]
        );
    }

    #[test]
    fn flag_scan_skips_settled_records() {
        let home = TempDir::new().expect("home");
        let number = seed_record(home.path(), 1);

        let mut record = store::load_record_at(home.path(), &number).expect("load");
        record.opportunity.new = false;
        record.opportunity.needs_update = false;
        record.opportunity.remote_folder_ref = Some(labtrack_core::RemoteFolderRef {
            id: "item-1".into(),
            url: "https://docs.example/7001".into(),
        });
        store::save_record_at(home.path(), &record).expect("save");

        assert!(scan_flags(home.path()).expect("scan").is_empty());
    }

    #[test]
    fn flag_scan_archives_emptied_provisioned_records() {
        let home = TempDir::new().expect("home");
        let number = seed_record(home.path(), 1);

        let mut record = store::load_record_at(home.path(), &number).expect("load");
        record.opportunity.new = false;
        record.opportunity.needs_update = false;
        record.opportunity.remote_folder_ref = Some(labtrack_core::RemoteFolderRef {
            id: "item-1".into(),
            url: "https://docs.example/7001".into(),
        });
        store::save_record_at(home.path(), &record).expect("save");

        let id = record.samples[0].unique_id;
        store::delete_sample_at(home.path(), &number, id).expect("delete");

        let tasks = scan_flags(home.path()).expect("scan");
        assert_eq!(tasks, vec![Task::new(number, TaskKind::ArchiveFolder)]);
    }

    #[test]
    fn flag_scan_leaves_unprovisioned_empty_records_alone() {
        // The state an archived (or never-sampled) record rests in: no
        // samples, no folder reference. Nothing to do until a sample shows up.
        let home = TempDir::new().expect("home");
        let number = OpportunityNumber::from("7001");
        store::create_opportunity_at(home.path(), number, "Acme Foods", "Pat Doe", "Trial")
            .expect("create");

        assert!(scan_flags(home.path()).expect("scan").is_empty());
    }

    #[tokio::test]
    async fn archive_task_settles_emptied_record() {
        let home = TempDir::new().expect("home");
        let number = seed_record(home.path(), 1);
        let remote = seeded_remote();

        let run = |task: Task| {
            let home = home.path().to_path_buf();
            let remote = remote.clone();
            tokio::task::spawn_blocking(move || {
                run_task_blocking(
                    &home,
                    remote.as_ref(),
                    StateTracker::new_at(&home),
                    SyncConfig::default(),
                    &task,
                )
            })
        };

        run(Task::new(number.clone(), TaskKind::SyncSampleIds))
            .await
            .expect("join")
            .expect("provision and sync");

        let record = store::load_record_at(home.path(), &number).expect("load");
        store::delete_sample_at(home.path(), &number, record.samples[0].unique_id)
            .expect("delete");
        assert_eq!(
            scan_flags(home.path()).expect("scan"),
            vec![Task::new(number.clone(), TaskKind::ArchiveFolder)]
        );

        run(Task::new(number.clone(), TaskKind::ArchiveFolder))
            .await
            .expect("join")
            .expect("archive");

        let record = store::load_record_at(home.path(), &number).expect("load");
        assert!(record.opportunity.remote_folder_ref.is_none());
        assert!(record.opportunity.new);
        assert!(!record.opportunity.needs_update);
        // Settled: the next scan re-enqueues nothing.
        assert!(scan_flags(home.path()).expect("scan").is_empty());
    }

    #[tokio::test]
    async fn id_sync_task_provisions_new_records_first() {
        let home = TempDir::new().expect("home");
        let number = seed_record(home.path(), 2);
        let remote = seeded_remote();

        let detail = tokio::task::spawn_blocking({
            let home = home.path().to_path_buf();
            let remote = remote.clone();
            move || {
                run_task_blocking(
                    &home,
                    remote.as_ref(),
                    StateTracker::new_at(&home),
                    SyncConfig::default(),
                    &Task::new(number.clone(), TaskKind::SyncSampleIds),
                )
            }
        })
        .await
        .expect("join")
        .expect("task");

        assert_eq!(detail, "0 blanked, 2 appended");
        let record =
            store::load_record_at(home.path(), &OpportunityNumber::from("7001")).expect("load");
        assert!(!record.opportunity.new);
        assert!(!record.opportunity.needs_update);
        assert!(record.opportunity.remote_folder_ref.is_some());
    }

    #[tokio::test]
    async fn export_task_reports_uploaded_snapshot() {
        let home = TempDir::new().expect("home");
        let number = seed_record(home.path(), 1);
        let remote = seeded_remote();

        let detail = tokio::task::spawn_blocking({
            let home = home.path().to_path_buf();
            let remote = remote.clone();
            move || {
                run_task_blocking(
                    &home,
                    remote.as_ref(),
                    StateTracker::new_at(&home),
                    SyncConfig::default(),
                    &Task::new(number, TaskKind::ExportDocumentation),
                )
            }
        })
        .await
        .expect("join")
        .expect("task");

        assert!(detail.starts_with("uploaded Samples_7001_"));
    }

    #[tokio::test]
    async fn socket_protocol_status_and_stop_over_in_memory_channels() {
        let (request_tx, mut request_rx) = mpsc::channel::<Vec<u8>>(8);
        let (response_tx, mut response_rx) = mpsc::channel::<Vec<u8>>(8);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        tokio::spawn(async move {
            while let Some(bytes) = request_rx.recv().await {
                let line = String::from_utf8(bytes).expect("utf8");
                let request: DaemonRequest = serde_json::from_str(line.trim()).expect("request");
                let response = match request.cmd.as_str() {
                    "status" => DaemonResponse::ok(json!({"running": true})),
                    "stop" => {
                        let _ = shutdown_tx.send(());
                        DaemonResponse::ok(json!({"stopping": true}))
                    }
                    other => DaemonResponse::error(format!("unknown command '{other}'")),
                };
                let encoded = serde_json::to_vec(&response).expect("encode response");
                if response_tx.send(encoded).await.is_err() {
                    break;
                }
            }
        });

        request_tx
            .send(br#"{"cmd":"status"}"#.to_vec())
            .await
            .expect("send status request");
        let status_response = response_rx.recv().await.expect("status response");
        let status_json: serde_json::Value =
            serde_json::from_slice(&status_response).expect("decode status");
        assert_eq!(status_json["ok"], serde_json::Value::Bool(true));

        request_tx
            .send(br#"{"cmd":"stop"}"#.to_vec())
            .await
            .expect("send stop request");
        let stop_response = response_rx.recv().await.expect("stop response");
        let stop_json: serde_json::Value =
            serde_json::from_slice(&stop_response).expect("decode stop");
        assert_eq!(stop_json["ok"], serde_json::Value::Bool(true));

        shutdown_rx.recv().await.expect("shutdown signal");
    }

    #[tokio::test]
    async fn status_payload_reflects_flags_and_timestamps() {
        let home = TempDir::new().expect("home");
        seed_record(home.path(), 1);

        let ts_map: TaskTimestamps = [("7001".to_string(), 1_000_100u64)].into_iter().collect();
        let timestamps = Arc::new(RwLock::new(ts_map));

        let payload = build_status_payload(home.path(), timestamps, 1_000_000)
            .await
            .expect("payload");

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["last_task_at_unix"], json!(1_000_100u64));
        assert_eq!(payload["flagged"], json!(1));

        let opportunities = payload["opportunities"].as_array().expect("array");
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0]["opportunity_number"], json!("7001"));
        assert_eq!(opportunities[0]["new"], json!(true));
        assert_eq!(opportunities[0]["samples"], json!(1));
        assert_eq!(opportunities[0]["last_task_at_unix"], json!(1_000_100u64));
    }
}
