//! Result queue - carries records from worker tasks to the host thread
//!
//! Any number of producers append; exactly one consumer drains once per
//! host tick. The queue is unbounded so producers never wait on it.

use crate::types::ResultRecord;

/// Consumer side of the queue, owned by the frame dispatcher
#[derive(Debug)]
pub struct ResultQueue {
    sender: async_channel::Sender<ResultRecord>,
    receiver: async_channel::Receiver<ResultRecord>,
}

/// Producer side of the queue, cloned into every task
#[derive(Debug, Clone)]
pub struct ResultSender {
    sender: async_channel::Sender<ResultRecord>,
}

impl ResultQueue {
    pub fn new() -> Self {
        let (sender, receiver) = async_channel::unbounded();
        Self { sender, receiver }
    }

    /// Get a producer handle
    pub fn sender(&self) -> ResultSender {
        ResultSender {
            sender: self.sender.clone(),
        }
    }

    /// Detach every record queued so far, oldest first.
    ///
    /// The snapshot is bounded by the queue length observed on entry, so a
    /// burst of concurrent appends cannot keep the consumer here. Records
    /// appended after that point wait for the next drain.
    pub fn drain_all(&self) -> Vec<ResultRecord> {
        let pending = self.receiver.len();
        let mut records = Vec::with_capacity(pending);
        while records.len() < pending {
            match self.receiver.try_recv() {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
        }
        records
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for ResultQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSender {
    /// Hand a record over to the queue.
    ///
    /// Returns `false` if the consumer is gone; the record is dropped and no
    /// other producer is affected.
    pub fn append(&self, record: ResultRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(e) => {
                let record = e.into_inner();
                log::debug!(
                    "Result queue closed, dropping {} record for task {}",
                    record.kind,
                    record.task_id
                );
                false
            }
        }
    }
}
