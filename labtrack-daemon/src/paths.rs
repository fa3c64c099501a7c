use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DAEMON_LABEL: &str = "dev.labtrack.daemon";

/// How often the scheduler rescans records for set synchronization flags.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(30);

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn labtrack_root(home: &Path) -> PathBuf {
    home.join(".labtrack")
}

pub fn opportunities_root(home: &Path) -> PathBuf {
    labtrack_root(home).join("opportunities")
}

pub fn run_dir(home: &Path) -> PathBuf {
    labtrack_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    labtrack_root(home).join(DAEMON_SOCKET)
}
