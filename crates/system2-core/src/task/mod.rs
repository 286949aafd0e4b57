//! Tasks - one asynchronous unit of work per host request
//!
//! A task runs once, reports optional progress through its
//! [`ProgressReporter`], and ends by producing exactly one terminal
//! [`ResultRecord`]. Failures never escape a task; they become a nonzero
//! status and an error text in that record.

mod command;
mod copy;
mod ftp;
mod http;

pub use command::run_blocking;

use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::queue::ResultSender;
use crate::types::{
    FtpDirection, FtpRequest, ResultRecord, Settings, TaskKind, TaskTarget, TransferCounters,
};
use crate::utils::truncate_text;
use std::path::PathBuf;
use std::sync::Arc;

/// The operation a task performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Run a shell command and capture its standard output
    Command { command: String },
    /// Fetch a URL over HTTP into a local file
    Download { url: String, local_path: PathBuf },
    /// Put or get a file over FTP
    Ftp(FtpRequest),
    /// Copy a local file, creating missing directories
    Copy { source: PathBuf, destination: PathBuf },
    /// Fetch a URL into memory, POSTing `post_body` when it is not empty
    Page {
        url: String,
        post_body: String,
        user_agent: String,
    },
}

impl Operation {
    pub fn kind(&self) -> TaskKind {
        match self {
            Operation::Command { .. } => TaskKind::Command,
            Operation::Download { .. } => TaskKind::Download,
            Operation::Ftp(request) => match request.direction {
                FtpDirection::Upload => TaskKind::FtpUpload,
                FtpDirection::Download => TaskKind::FtpDownload,
            },
            Operation::Copy { .. } => TaskKind::Copy,
            Operation::Page { .. } => TaskKind::PageFetch,
        }
    }
}

/// A validated request together with the target its records go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub target: TaskTarget,
    pub operation: Operation,
}

/// Shared, read-only state every task runs against
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub settings: Arc<Settings>,
    pub client: reqwest::Client,
    pub results: ResultSender,
}

impl TaskContext {
    pub fn new(settings: Arc<Settings>, results: ResultSender) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.transfer_timeout())
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self {
            settings,
            client,
            results,
        })
    }
}

/// What a successful operation hands back
#[derive(Debug, Default)]
pub(crate) struct TaskOutput {
    pub text: String,
    pub error: String,
    pub status: i32,
    pub counters: TransferCounters,
}

impl Task {
    pub fn new(target: TaskTarget, operation: Operation) -> Self {
        Self { target, operation }
    }

    pub fn kind(&self) -> TaskKind {
        self.operation.kind()
    }

    /// Perform the operation and build the terminal record.
    ///
    /// Progress records are appended before this returns, so they always
    /// precede the terminal record in the queue.
    pub async fn run(self, ctx: &TaskContext) -> ResultRecord {
        let kind = self.kind();
        let reporter = ProgressReporter::for_task(&self.target, kind, &ctx.results);
        log::debug!("Task {} ({}) started", self.target.id, kind);

        let outcome = match self.operation {
            Operation::Command { command } => command::run(&command, &ctx.settings).await,
            Operation::Download { url, local_path } => {
                http::download(ctx, &url, &local_path, reporter).await
            }
            Operation::Ftp(request) => ftp::transfer(ctx, request, reporter).await,
            Operation::Copy {
                source,
                destination,
            } => copy::copy_file(&source, &destination).await,
            Operation::Page {
                url,
                post_body,
                user_agent,
            } => http::fetch_page(ctx, &url, &post_body, &user_agent).await,
        };

        let mut record = ResultRecord {
            task_id: self.target.id,
            kind,
            callback: self.target.callback,
            token: self.target.token,
            finished: true,
            status: 0,
            result_text: String::new(),
            error_text: String::new(),
            counters: TransferCounters::default(),
        };

        match outcome {
            Ok(output) => {
                log::debug!(
                    "Task {} ({}) finished with status {}",
                    self.target.id,
                    kind,
                    output.status
                );
                record.status = output.status;
                record.result_text = output.text;
                record.error_text = output.error;
                record.counters = output.counters;
            }
            Err(e) => {
                log::warn!("Task {} ({}) failed: {}", self.target.id, kind, e);
                record.status = e.status_code();
                record.error_text = e.to_string();
            }
        }

        if truncate_text(&mut record.result_text, ctx.settings.result_capacity) {
            log::debug!("Task {} result truncated", self.target.id);
        }
        truncate_text(&mut record.error_text, ctx.settings.error_capacity);
        record
    }
}
