//! Bounded worker pool with retry/backoff and graceful shutdown.
//!
//! A fixed set of workers pulls from two bounded FIFO queues (high
//! priority drained before normal), dispatches to the handler registered
//! for each task's kind, and publishes every attempt's outcome to a result
//! pipeline that invokes the success/failure callbacks. Retriable handler
//! failures are re-queued with exponential backoff through a single
//! delayed-requeue scheduler.
//!
//! Lifecycle: `new` → `start` → running → `shutdown(timeout)` → stopped.
//! The queues are in-memory only; work not yet claimed at shutdown (or
//! lost in a crash) is dropped, and the submitter only ever learns about
//! submission-time failures.

pub mod registry;
mod retry;

pub use registry::{HandlerError, HandlerRegistry, TaskHandler};

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::tasks::{backoff_delay, Task, TaskKind, TaskPriority, TaskResult};

/// Why a submission was rejected. A task is never silently dropped.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("queue full: submission timed out after {timeout:?}")]
    QueueTimeout { timeout: Duration },

    #[error("pool is shutting down")]
    ShuttingDown,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("pool already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

/// Async callback invoked by the result loop for each published result.
pub type ResultCallback = Arc<dyn Fn(TaskResult) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
pub struct ResultCallbacks {
    pub on_success: ResultCallback,
    pub on_failure: ResultCallback,
}

/// Bounded priority queues feeding the workers.
#[derive(Clone)]
pub(crate) struct TaskQueues {
    high: mpsc::Sender<Task>,
    normal: mpsc::Sender<Task>,
}

impl TaskQueues {
    fn sender_for(&self, priority: TaskPriority) -> &mpsc::Sender<Task> {
        match priority {
            TaskPriority::High => &self.high,
            TaskPriority::Normal => &self.normal,
        }
    }

    /// Enqueue, waiting for room. Errors only when the queues are closed.
    pub(crate) async fn send(&self, task: Task) -> Result<(), mpsc::error::SendError<Task>> {
        self.sender_for(task.priority).send(task).await
    }

    fn pending(&self) -> usize {
        (self.high.max_capacity() - self.high.capacity())
            + (self.normal.max_capacity() - self.normal.capacity())
    }
}

/// Non-authoritative snapshot of pool state; values may be stale
/// immediately after reading.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub pending_tasks: usize,
    pub pending_results: usize,
    pub registered_kinds: Vec<TaskKind>,
}

struct RunningLoops {
    workers: Vec<JoinHandle<()>>,
    retry: JoinHandle<()>,
    result: JoinHandle<()>,
}

/// Fixed-size worker pool over bounded in-memory queues.
pub struct WorkerPool {
    config: PoolConfig,
    registry: Arc<HandlerRegistry>,
    queues: TaskQueues,
    high_rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    normal_rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    result_tx: mpsc::Sender<TaskResult>,
    result_rx: Mutex<Option<mpsc::Receiver<TaskResult>>>,
    retry_tx: mpsc::UnboundedSender<Task>,
    retry_rx: Mutex<Option<mpsc::UnboundedReceiver<Task>>>,
    callbacks: Arc<RwLock<Option<ResultCallbacks>>>,
    shutdown_tx: broadcast::Sender<()>,
    result_stop_tx: broadcast::Sender<()>,
    state: RwLock<PoolState>,
    loops: Mutex<Option<RunningLoops>>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, registry: Arc<HandlerRegistry>) -> Self {
        let (high_tx, high_rx) = mpsc::channel(config.queue_capacity);
        let (normal_tx, normal_rx) = mpsc::channel(config.queue_capacity);
        // Result capacity matches the queues so a slow callback backs up
        // the result loop long before it can block workers.
        let (result_tx, result_rx) = mpsc::channel(config.queue_capacity);
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let (result_stop_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry,
            queues: TaskQueues {
                high: high_tx,
                normal: normal_tx,
            },
            high_rx: Arc::new(Mutex::new(high_rx)),
            normal_rx: Arc::new(Mutex::new(normal_rx)),
            result_tx,
            result_rx: Mutex::new(Some(result_rx)),
            retry_tx,
            retry_rx: Mutex::new(Some(retry_rx)),
            callbacks: Arc::new(RwLock::new(None)),
            shutdown_tx,
            result_stop_tx,
            state: RwLock::new(PoolState::Created),
            loops: Mutex::new(None),
        }
    }

    /// Install the result callbacks. May be called before or after
    /// `start`; results delivered while no callbacks are installed are
    /// logged and dropped.
    pub async fn set_callbacks(&self, on_success: ResultCallback, on_failure: ResultCallback) {
        *self.callbacks.write().await = Some(ResultCallbacks {
            on_success,
            on_failure,
        });
    }

    /// Associate a handler with a task kind; last registration wins.
    pub async fn register_handler(&self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        self.registry.register(kind, handler).await;
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        self.registry.clone()
    }

    /// Spawn the workers, the retry scheduler, and the result loop.
    pub async fn start(&self) -> Result<(), PoolError> {
        let mut state = self.state.write().await;
        if *state != PoolState::Created {
            return Err(PoolError::AlreadyStarted);
        }

        let result_rx = self
            .result_rx
            .lock()
            .await
            .take()
            .ok_or(PoolError::AlreadyStarted)?;
        let retry_rx = self
            .retry_rx
            .lock()
            .await
            .take()
            .ok_or(PoolError::AlreadyStarted)?;

        let mut workers = Vec::with_capacity(self.config.worker_count);
        for worker_id in 0..self.config.worker_count {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                self.config.clone(),
                self.registry.clone(),
                self.high_rx.clone(),
                self.normal_rx.clone(),
                self.result_tx.clone(),
                self.retry_tx.clone(),
                self.shutdown_tx.subscribe(),
            )));
        }

        let retry = tokio::spawn(retry::run(
            retry_rx,
            self.queues.clone(),
            self.shutdown_tx.subscribe(),
        ));
        let result = tokio::spawn(result_loop(
            result_rx,
            self.callbacks.clone(),
            self.result_stop_tx.subscribe(),
        ));

        *self.loops.lock().await = Some(RunningLoops {
            workers,
            retry,
            result,
        });
        *state = PoolState::Running;
        info!(
            workers = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            "worker pool started"
        );
        Ok(())
    }

    /// Enqueue a task, blocking up to the configured submission timeout.
    pub async fn submit(&self, task: Task) -> Result<(), SubmitError> {
        self.submit_with_timeout(task, self.config.submit_timeout)
            .await
    }

    /// Enqueue a task, blocking up to `timeout` for queue room.
    pub async fn submit_with_timeout(
        &self,
        task: Task,
        timeout: Duration,
    ) -> Result<(), SubmitError> {
        {
            let state = self.state.read().await;
            if matches!(*state, PoolState::ShuttingDown | PoolState::Stopped) {
                return Err(SubmitError::ShuttingDown);
            }
        }

        let sender = self.queues.sender_for(task.priority);
        match tokio::time::timeout(timeout, sender.send(task)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SubmitError::ShuttingDown),
            Err(_) => Err(SubmitError::QueueTimeout { timeout }),
        }
    }

    /// Signal every loop to stop and wait up to `timeout` for them.
    ///
    /// Returns whether shutdown was clean; a forced exit is reported, not
    /// escalated. After this returns, no further results reach the
    /// callbacks and `submit` fails with [`SubmitError::ShuttingDown`].
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        {
            let mut state = self.state.write().await;
            match *state {
                PoolState::Stopped => return true,
                PoolState::Created => {
                    *state = PoolState::Stopped;
                    return true;
                }
                PoolState::Running | PoolState::ShuttingDown => *state = PoolState::ShuttingDown,
            }
        }

        let _ = self.shutdown_tx.send(());
        let deadline = Instant::now() + timeout;
        let mut clean = true;

        if let Some(mut loops) = self.loops.lock().await.take() {
            for mut handle in loops.workers.drain(..) {
                if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                    handle.abort();
                    clean = false;
                }
            }
            let mut retry = loops.retry;
            if tokio::time::timeout_at(deadline, &mut retry).await.is_err() {
                retry.abort();
                clean = false;
            }

            // Workers are done (or aborted); let the result loop drain
            // whatever they published, then stop it.
            let _ = self.result_stop_tx.send(());
            let mut result = loops.result;
            if tokio::time::timeout_at(deadline, &mut result).await.is_err() {
                result.abort();
                clean = false;
            }
        }

        *self.state.write().await = PoolState::Stopped;
        if clean {
            info!("worker pool stopped");
        } else {
            warn!(?timeout, "worker pool shutdown forced after timeout");
        }
        clean
    }

    pub async fn stats(&self) -> PoolStats {
        PoolStats {
            worker_count: self.config.worker_count,
            queue_capacity: self.config.queue_capacity,
            pending_tasks: self.queues.pending(),
            pending_results: self.result_tx.max_capacity() - self.result_tx.capacity(),
            registered_kinds: self.registry.kinds().await,
        }
    }
}

/// Pull the next task, draining the high-priority queue first.
async fn next_task(
    high: &Mutex<mpsc::Receiver<Task>>,
    normal: &Mutex<mpsc::Receiver<Task>>,
) -> Option<Task> {
    if let Ok(task) = high.lock().await.try_recv() {
        return Some(task);
    }
    tokio::select! {
        biased;
        task = recv_from(high) => task,
        task = recv_from(normal) => task,
    }
}

async fn recv_from(rx: &Mutex<mpsc::Receiver<Task>>) -> Option<Task> {
    rx.lock().await.recv().await
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    config: PoolConfig,
    registry: Arc<HandlerRegistry>,
    high_rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    normal_rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    result_tx: mpsc::Sender<TaskResult>,
    retry_tx: mpsc::UnboundedSender<Task>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!(worker_id, "worker started");
    loop {
        let task = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            task = next_task(&high_rx, &normal_rx) => match task {
                Some(task) => task,
                None => break,
            },
        };

        // Delayed tasks wait out their not-before instant here, but obey
        // shutdown rather than finishing the wait.
        if let Some(not_before) = task.not_before {
            if not_before > Instant::now() {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep_until(not_before) => {}
                }
            }
        }

        let result = dispatch(task, &config, &registry, &retry_tx).await;
        if result_tx.send(result).await.is_err() {
            debug!(worker_id, "result pipeline closed");
        }
    }
    debug!(worker_id, "worker exited");
}

/// Run one attempt of a task and decide the retry path.
async fn dispatch(
    mut task: Task,
    config: &PoolConfig,
    registry: &HandlerRegistry,
    retry_tx: &mpsc::UnboundedSender<Task>,
) -> TaskResult {
    let started = Instant::now();
    let kind = task.kind();

    let Some(handler) = registry.get(kind).await else {
        warn!(task_id = %task.id, %kind, "no handler registered, failing task");
        return TaskResult::failure(
            &task,
            format!("no handler registered for task kind {kind}"),
            started.elapsed(),
        );
    };

    debug!(task_id = %task.id, %kind, retry = task.retry_count, "dispatching task");
    match handler.handle(&task).await {
        Ok(output) => {
            debug!(task_id = %task.id, %kind, "task succeeded");
            TaskResult::success(&task, output, started.elapsed())
        }
        Err(error) => {
            if error.is_retriable() && task.can_retry() {
                task.retry_count += 1;
                let delay = backoff_delay(task.retry_count, config.backoff_base, config.backoff_max);
                task.not_before = Some(Instant::now() + delay);
                info!(
                    task_id = %task.id,
                    %kind,
                    retry = task.retry_count,
                    max_retries = task.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "task failed, retry scheduled"
                );
                let failure = TaskResult::failure(&task, &error, started.elapsed());
                if retry_tx.send(task).is_err() {
                    warn!("retry scheduler unavailable, dropping retry");
                }
                failure
            } else {
                if error.is_retriable() {
                    warn!(task_id = %task.id, %kind, retries = task.retry_count, %error, "max retries exceeded");
                } else {
                    warn!(task_id = %task.id, %kind, %error, "task failed permanently");
                }
                TaskResult::failure(&task, &error, started.elapsed())
            }
        }
    }
}

/// Drain completed results and hand each to exactly one callback.
async fn result_loop(
    mut result_rx: mpsc::Receiver<TaskResult>,
    callbacks: Arc<RwLock<Option<ResultCallbacks>>>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.recv() => {
                // Workers have already been joined; deliver what they
                // left behind, then stop for good.
                while let Ok(result) = result_rx.try_recv() {
                    deliver(&callbacks, result).await;
                }
                break;
            }
            maybe = result_rx.recv() => match maybe {
                Some(result) => deliver(&callbacks, result).await,
                None => break,
            },
        }
    }
    debug!("result loop exited");
}

async fn deliver(callbacks: &RwLock<Option<ResultCallbacks>>, result: TaskResult) {
    let callback = {
        let guard = callbacks.read().await;
        match guard.as_ref() {
            Some(cbs) if result.success => cbs.on_success.clone(),
            Some(cbs) => cbs.on_failure.clone(),
            None => {
                debug!(task_id = %result.task_id, success = result.success, "result dropped, no callbacks installed");
                return;
            }
        }
    };
    callback(result).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskOutput, TaskPayload};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle(&self, task: &Task) -> Result<TaskOutput, HandlerError> {
            match &task.payload {
                TaskPayload::FeedbackText { problem_word, .. } => Ok(TaskOutput::FeedbackText {
                    text: problem_word.clone(),
                    from_cache: false,
                }),
                _ => Err(HandlerError::InvalidPayload("unexpected payload".into())),
            }
        }
    }

    fn small_pool(workers: usize, capacity: usize) -> WorkerPool {
        let config = PoolConfig {
            worker_count: workers,
            queue_capacity: capacity,
            submit_timeout: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(2),
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(100),
        };
        WorkerPool::new(config, Arc::new(HandlerRegistry::new()))
    }

    fn text_task(id: &str, priority: TaskPriority) -> Task {
        Task::new(
            id,
            TaskPayload::FeedbackText {
                evaluation_id: id.to_string(),
                score: 70,
                problem_word: id.to_string(),
                level: "A".to_string(),
                target_text: "text".to_string(),
            },
            priority,
            3,
        )
    }

    #[tokio::test]
    async fn high_priority_queue_is_drained_first() {
        let pool = small_pool(1, 16);
        pool.register_handler(TaskKind::GenerateFeedbackText, Arc::new(EchoHandler))
            .await;

        let (order_tx, mut order_rx) = mpsc::unbounded_channel::<String>();
        let success_tx = order_tx.clone();
        pool.set_callbacks(
            Arc::new(move |result| {
                let tx = success_tx.clone();
                Box::pin(async move {
                    let _ = tx.send(result.task_id);
                })
            }),
            Arc::new(move |result| {
                let tx = order_tx.clone();
                Box::pin(async move {
                    let _ = tx.send(result.task_id);
                })
            }),
        )
        .await;

        // Enqueue before starting so the single worker sees both queues
        // populated and must choose.
        pool.submit(text_task("normal-1", TaskPriority::Normal))
            .await
            .unwrap();
        pool.submit(text_task("high-1", TaskPriority::High))
            .await
            .unwrap();
        pool.start().await.unwrap();

        let first = order_rx.recv().await.unwrap();
        let second = order_rx.recv().await.unwrap();
        assert_eq!(first, "high-1");
        assert_eq!(second, "normal-1");

        pool.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let pool = small_pool(1, 4);
        pool.start().await.unwrap();
        assert!(matches!(pool.start().await, Err(PoolError::AlreadyStarted)));
        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let pool = small_pool(1, 4);
        pool.start().await.unwrap();
        assert!(pool.shutdown(Duration::from_secs(1)).await);

        let err = pool
            .submit(text_task("late", TaskPriority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::ShuttingDown));
    }

    #[tokio::test]
    async fn stats_snapshot_reflects_configuration() {
        let pool = small_pool(3, 8);
        pool.register_handler(TaskKind::GenerateFeedbackText, Arc::new(EchoHandler))
            .await;

        pool.submit(text_task("queued", TaskPriority::Normal))
            .await
            .unwrap();

        let stats = pool.stats().await;
        assert_eq!(stats.worker_count, 3);
        assert_eq!(stats.queue_capacity, 8);
        assert_eq!(stats.pending_tasks, 1);
        assert_eq!(stats.registered_kinds, vec![TaskKind::GenerateFeedbackText]);

        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn callbacks_missing_results_are_dropped_quietly() {
        let pool = small_pool(1, 4);
        pool.register_handler(TaskKind::GenerateFeedbackText, Arc::new(EchoHandler))
            .await;
        pool.start().await.unwrap();

        pool.submit(text_task("orphan", TaskPriority::High))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn worker_count_tasks_run_concurrently() {
        struct BlockingHandler(Arc<AtomicUsize>);

        #[async_trait]
        impl TaskHandler for BlockingHandler {
            async fn handle(&self, _task: &Task) -> Result<TaskOutput, HandlerError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(TaskOutput::FeedbackText {
                    text: String::new(),
                    from_cache: false,
                })
            }
        }

        let in_flight = Arc::new(AtomicUsize::new(0));
        let pool = small_pool(4, 16);
        pool.register_handler(
            TaskKind::GenerateFeedbackText,
            Arc::new(BlockingHandler(in_flight.clone())),
        )
        .await;
        pool.start().await.unwrap();

        for i in 0..4 {
            pool.submit(text_task(&format!("t{i}"), TaskPriority::Normal))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(in_flight.load(Ordering::SeqCst), 4);

        pool.shutdown(Duration::from_secs(2)).await;
    }
}
