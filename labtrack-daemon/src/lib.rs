//! Daemon runtime: flag scheduler + task processor + socket server.

mod error;
pub mod paths;
pub mod protocol;
pub mod queue;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_archive, request_export, request_status, request_stop, request_sync, send_request,
    DaemonRequest, DaemonResponse,
};
pub use queue::{SingleFlightQueue, Task, TaskKind};
pub use runtime::{run, start_blocking, TaskSummary, TaskTimestamps};
