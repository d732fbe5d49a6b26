//! Delayed-requeue scheduler for retried tasks.
//!
//! A single loop owns every not-yet-due retry: workers hand failed tasks
//! over an unbounded channel, the scheduler sleeps until the earliest
//! deadline and re-submits due tasks to the priority queues. One loop
//! instead of one sleeper per retry keeps fan-out bounded under high
//! failure rates, and an unbounded hand-off channel means workers never
//! block on retry scheduling.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::tasks::Task;

use super::TaskQueues;

struct PendingRetry {
    due: Instant,
    /// Tie-breaker so equal deadlines dequeue in arrival order.
    seq: u64,
    task: Task,
}

impl PartialEq for PendingRetry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for PendingRetry {}

impl PartialOrd for PendingRetry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingRetry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

/// Run until shutdown. Pending retries still held at shutdown are dropped,
/// like any other queued-but-unclaimed work.
pub(super) async fn run(
    mut retry_rx: mpsc::UnboundedReceiver<Task>,
    queues: TaskQueues,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut pending: BinaryHeap<Reverse<PendingRetry>> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        let next_due = pending.peek().map(|Reverse(entry)| entry.due);

        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                if !pending.is_empty() {
                    debug!(dropped = pending.len(), "retry scheduler stopping with pending retries");
                }
                break;
            }

            incoming = retry_rx.recv() => {
                match incoming {
                    Some(task) => {
                        let due = task.not_before.unwrap_or_else(Instant::now);
                        seq += 1;
                        pending.push(Reverse(PendingRetry { due, seq, task }));
                    }
                    None => break,
                }
            }

            _ = sleep_until_or_forever(next_due) => {
                if let Some(Reverse(entry)) = pending.pop() {
                    let task_id = entry.task.id.clone();
                    // A full target queue must not wedge the scheduler:
                    // keep the send interruptible by shutdown.
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            debug!(task_id, dropped = pending.len() + 1, "retry scheduler stopping with pending retries");
                            break;
                        }
                        sent = queues.send(entry.task) => {
                            if sent.is_err() {
                                warn!(task_id, "task queues closed, dropping due retry");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}
