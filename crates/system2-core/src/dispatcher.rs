//! Frame dispatcher - delivers queued records on the host thread
//!
//! The host calls [`FrameDispatcher::dispatch`] once per tick. Each call
//! drains the result queue and hands every record to the callback it
//! names, provided the host still considers that callback valid.

use crate::error::{Error, Result};
use crate::queue::{ResultQueue, ResultSender};
use crate::types::{CallbackHandle, ResultRecord, TaskId, TaskKind, TransferCounters, UserToken};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Arguments handed to a host callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery<'a> {
    /// Intermediate transfer counters
    Progress {
        task_id: TaskId,
        kind: TaskKind,
        counters: TransferCounters,
        token: UserToken,
    },
    /// Terminal outcome of a task
    Completed {
        task_id: TaskId,
        kind: TaskKind,
        result: &'a str,
        error: &'a str,
        status: i32,
        token: UserToken,
    },
}

impl<'a> Delivery<'a> {
    pub fn from_record(record: &'a ResultRecord) -> Self {
        if record.finished {
            Delivery::Completed {
                task_id: record.task_id,
                kind: record.kind,
                result: &record.result_text,
                error: &record.error_text,
                status: record.status,
                token: record.token,
            }
        } else {
            Delivery::Progress {
                task_id: record.task_id,
                kind: record.kind,
                counters: record.counters,
                token: record.token,
            }
        }
    }
}

/// Host side of delivery: validity checks and invocation
pub trait CallbackHost {
    /// Whether the callback may still be invoked
    fn is_valid(&self, handle: CallbackHandle) -> bool;

    /// Invoke the callback
    fn invoke(&mut self, handle: CallbackHandle, delivery: Delivery<'_>) -> Result<()>;
}

type BoxedCallback = Box<dyn FnMut(Delivery<'_>) -> Result<()>>;

/// Simple in-process callback registry
#[derive(Default)]
pub struct CallbackRegistry {
    next_id: u64,
    callbacks: HashMap<CallbackHandle, BoxedCallback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, callback: F) -> CallbackHandle
    where
        F: FnMut(Delivery<'_>) -> Result<()> + 'static,
    {
        self.next_id += 1;
        let handle = CallbackHandle(self.next_id);
        self.callbacks.insert(handle, Box::new(callback));
        handle
    }

    /// Drop a callback; records still addressed to it are discarded
    pub fn unregister(&mut self, handle: CallbackHandle) -> bool {
        self.callbacks.remove(&handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl CallbackHost for CallbackRegistry {
    fn is_valid(&self, handle: CallbackHandle) -> bool {
        self.callbacks.contains_key(&handle)
    }

    fn invoke(&mut self, handle: CallbackHandle, delivery: Delivery<'_>) -> Result<()> {
        let callback = self
            .callbacks
            .get_mut(&handle)
            .ok_or_else(|| Error::Callback(format!("unknown callback {}", handle.0)))?;
        callback(delivery)
    }
}

/// Counts for one dispatch pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub discarded: usize,
    pub failed: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.delivered + self.discarded + self.failed
    }
}

/// Drains the result queue into host callbacks
#[derive(Debug, Default)]
pub struct FrameDispatcher {
    queue: ResultQueue,
}

impl FrameDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer handle for tasks
    pub fn sender(&self) -> ResultSender {
        self.queue.sender()
    }

    /// Records waiting for the next tick
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Deliver everything queued so far, oldest first.
    ///
    /// Never blocks; returns immediately when the queue is empty. A failing
    /// or panicking callback does not stop delivery of later records.
    pub fn dispatch<H: CallbackHost + ?Sized>(&self, host: &mut H) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for record in self.queue.drain_all() {
            let Some(handle) = record.callback.filter(|h| host.is_valid(*h)) else {
                log::debug!(
                    "Discarding {} record for task {}: callback no longer valid",
                    record.kind,
                    record.task_id
                );
                summary.discarded += 1;
                continue;
            };

            let delivery = Delivery::from_record(&record);
            match catch_unwind(AssertUnwindSafe(|| host.invoke(handle, delivery))) {
                Ok(Ok(())) => summary.delivered += 1,
                Ok(Err(e)) => {
                    log::error!("Callback for task {} failed: {}", record.task_id, e);
                    summary.failed += 1;
                }
                Err(_) => {
                    log::error!("Callback for task {} panicked", record.task_id);
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}
