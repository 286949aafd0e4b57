//! Task service - runs requested tasks off the host thread
//!
//! The service owns a tokio runtime on a dedicated thread. Every request
//! becomes its own spawned task; results only flow back through the
//! result queue.

use crate::error::Result;
use crate::queue::ResultSender;
use crate::task::{Task, TaskContext};
use crate::types::Settings;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::task::JoinSet;

/// Commands sent from the host to the service (via async channel)
#[derive(Debug)]
pub enum TaskCommand {
    /// Start a task
    Spawn(Task),
    /// Stop accepting work and wait for running tasks
    Shutdown,
}

/// Service that executes tasks on a background runtime
pub struct TaskService {
    runtime: tokio::runtime::Runtime,
    ctx: TaskContext,
}

impl TaskService {
    /// Create a service with the given settings, delivering into `results`
    pub fn new(settings: Arc<Settings>, results: ResultSender) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("system2-worker")
            .enable_all()
            .build()?;
        // The HTTP client has to be built inside a runtime context.
        let ctx = {
            let _guard = runtime.enter();
            TaskContext::new(settings, results)?
        };
        Ok(Self { runtime, ctx })
    }

    /// Spawn the service in a background thread.
    /// Takes the command receiver to process requests from the host
    pub fn spawn(
        self,
        cmd_receiver: async_channel::Receiver<TaskCommand>,
    ) -> std::io::Result<JoinHandle<()>> {
        let Self { runtime, ctx } = self;

        std::thread::Builder::new()
            .name("system2-service".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut running: JoinSet<()> = JoinSet::new();
                    log::info!("Task service started");

                    loop {
                        tokio::select! {
                            cmd_result = cmd_receiver.recv() => {
                                match cmd_result {
                                    Ok(TaskCommand::Spawn(task)) => {
                                        let ctx = ctx.clone();
                                        running.spawn(async move {
                                            let record = task.run(&ctx).await;
                                            ctx.results.append(record);
                                        });
                                    }
                                    Ok(TaskCommand::Shutdown) => {
                                        log::info!("Task service shutting down");
                                        break;
                                    }
                                    Err(_) => {
                                        log::warn!("Command channel closed");
                                        break;
                                    }
                                }
                            }

                            // Reap finished tasks so the set does not grow
                            Some(joined) = running.join_next(), if !running.is_empty() => {
                                if let Err(e) = joined {
                                    log::error!("Task worker failed: {}", e);
                                }
                            }
                        }
                    }

                    if !running.is_empty() {
                        log::info!("Waiting for {} running task(s)", running.len());
                    }
                    while let Some(joined) = running.join_next().await {
                        if let Err(e) = joined {
                            log::error!("Task worker failed: {}", e);
                        }
                    }
                    log::info!("Task service stopped");
                });
            })
    }
}
