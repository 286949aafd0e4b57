//! Progress reporting from inside a running transfer

use crate::queue::ResultSender;
use crate::types::{CallbackHandle, ResultRecord, TaskKind, TaskTarget, TransferCounters};
use std::time::{Duration, Instant};

/// Emits non-terminal records for one task.
///
/// Called on the task's own worker; it only builds a record and appends
/// it, so it never blocks on I/O.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    target: TaskTarget,
    callback: CallbackHandle,
    kind: TaskKind,
    results: ResultSender,
}

impl ProgressReporter {
    /// Bind a reporter to a task. Returns `None` when the host did not ask
    /// for progress.
    pub fn for_task(target: &TaskTarget, kind: TaskKind, results: &ResultSender) -> Option<Self> {
        target.progress.map(|callback| Self {
            target: *target,
            callback,
            kind,
            results: results.clone(),
        })
    }

    pub fn report(&self, counters: TransferCounters) {
        self.results.append(ResultRecord {
            task_id: self.target.id,
            kind: self.kind,
            callback: Some(self.callback),
            token: self.target.token,
            finished: false,
            status: 0,
            result_text: String::new(),
            error_text: String::new(),
            counters,
        });
    }
}

/// Limits how often a transfer loop calls into its reporter
#[derive(Debug)]
pub struct ProgressPacer {
    reporter: Option<ProgressReporter>,
    interval: Duration,
    last: Option<Instant>,
    last_counters: Option<TransferCounters>,
}

impl ProgressPacer {
    pub fn new(reporter: Option<ProgressReporter>, interval: Duration) -> Self {
        Self {
            reporter,
            interval,
            last: None,
            last_counters: None,
        }
    }

    /// Report if the interval has elapsed since the previous report
    pub fn update(&mut self, counters: TransferCounters) {
        let due = self.last.map_or(true, |last| last.elapsed() >= self.interval);
        if due {
            self.emit(counters);
        }
    }

    /// Report final counters unless they were already the last ones sent
    pub fn finish(&mut self, counters: TransferCounters) {
        if self.last_counters != Some(counters) {
            self.emit(counters);
        }
    }

    fn emit(&mut self, counters: TransferCounters) {
        if let Some(reporter) = &self.reporter {
            reporter.report(counters);
            self.last = Some(Instant::now());
            self.last_counters = Some(counters);
        }
    }
}
