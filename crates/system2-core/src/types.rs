//! Types module - data structures for System2
//!
//! These types describe requests coming from the host and the records
//! flowing back to it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Longest accepted shell command, in bytes
pub const MAX_COMMAND_LENGTH: usize = 2048;
/// Longest accepted path, URL, host or post body, in bytes
pub const MAX_PATH_LENGTH: usize = 4096;
/// Longest accepted FTP user name or password, in bytes
pub const MAX_CREDENTIAL_LENGTH: usize = 128;
/// Longest accepted user agent, in bytes
pub const MAX_USER_AGENT_LENGTH: usize = 256;

/// Identifier assigned to a task when the host requests it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub uuid::Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a host-registered callback.
///
/// The host's registry owns the callback; a handle is only an identifier
/// and may be stale by the time a record is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(pub u64);

/// Opaque host value passed back unchanged with every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UserToken(pub i64);

/// Which operation produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Command,
    Download,
    FtpUpload,
    FtpDownload,
    Copy,
    PageFetch,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Command => write!(f, "command"),
            TaskKind::Download => write!(f, "download"),
            TaskKind::FtpUpload => write!(f, "ftp-upload"),
            TaskKind::FtpDownload => write!(f, "ftp-download"),
            TaskKind::Copy => write!(f, "copy"),
            TaskKind::PageFetch => write!(f, "page"),
        }
    }
}

/// Cumulative byte counters of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferCounters {
    pub download_total: u64,
    pub download_now: u64,
    pub upload_total: u64,
    pub upload_now: u64,
}

/// Outcome of one task execution or one progress checkpoint.
///
/// Exactly one record per task has `finished` set; it is always the last
/// one that task produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub callback: Option<CallbackHandle>,
    pub token: UserToken,
    pub finished: bool,
    pub status: i32,
    pub result_text: String,
    pub error_text: String,
    pub counters: TransferCounters,
}

/// Who a task reports to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTarget {
    pub id: TaskId,
    pub callback: Option<CallbackHandle>,
    pub progress: Option<CallbackHandle>,
    pub token: UserToken,
}

impl TaskTarget {
    pub fn new(callback: Option<CallbackHandle>, token: UserToken) -> Self {
        Self {
            id: TaskId::new(),
            callback,
            progress: None,
            token,
        }
    }

    pub fn with_progress(mut self, progress: Option<CallbackHandle>) -> Self {
        self.progress = progress;
        self
    }
}

/// Direction of an FTP transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpDirection {
    Upload,
    Download,
}

/// FTP server and credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl FtpEndpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Connection and file parameters of an FTP transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpRequest {
    pub direction: FtpDirection,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remote_path: String,
    pub local_path: PathBuf,
}

/// Output of a command run on the calling thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
    pub status: i32,
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Capacity of `result_text`, in bytes
    pub result_capacity: usize,
    /// Capacity of `error_text`, in bytes
    pub error_capacity: usize,
    pub connect_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    pub progress_interval_ms: u64,
    pub user_agent: String,
}

impl Settings {
    /// Connect timeout; zero is raised to one second
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    /// Read, write and overall request timeout; zero is raised to one second
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            result_capacity: 4096,
            error_capacity: 256,
            connect_timeout_secs: 30,
            transfer_timeout_secs: 600,
            progress_interval_ms: 100,
            user_agent: format!("system2/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
