//! System2 Core Library
//!
//! Lets a single-threaded host run commands, HTTP/FTP transfers, page
//! fetches and file copies without blocking, and receive the outcomes
//! later on its own thread. Work runs on background workers; results
//! travel through a queue that the host drains once per tick.

pub mod bridge;
pub mod dispatcher;
pub mod error;
pub mod progress;
pub mod queue;
pub mod service;
pub mod settings;
pub mod task;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use bridge::System2;
pub use dispatcher::{CallbackHost, CallbackRegistry, Delivery, DispatchSummary, FrameDispatcher};
pub use error::{Error, Result};
pub use progress::ProgressReporter;
pub use queue::{ResultQueue, ResultSender};
pub use service::{TaskCommand, TaskService};
pub use task::{Operation, Task, TaskContext};
pub use types::*;
pub use utils::{calculate_progress, format_bytes};
