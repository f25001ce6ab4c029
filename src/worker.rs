//! In-process task runner.
//!
//! Tasks are routed to one of three priority queues and executed by a pool
//! of Tokio tasks. Every step of a task's life is reported as a lifecycle
//! record on the [`WORKER_TRACE_TARGET`](crate::bridge::WORKER_TRACE_TARGET)
//! target, which the bridge layer maps to `worker.task` events.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, sleep, MissedTickBehavior};
use uuid::Uuid;

use crate::bridge::{TaskOutcome, WORKER_TRACE_TARGET};
use crate::hook::Handled;
use crate::tasks::USER_EXAMPLE;

/// Target the beat scheduler reports on.
pub const BEAT_TARGET: &str = "worker::beat";

/// Queues, highest priority last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskQueue {
    Low,
    Default,
    Urgent,
}

impl TaskQueue {
    /// Highest message priority the queue accepts.
    pub fn max_priority(&self) -> u8 {
        match self {
            TaskQueue::Low => 2,
            TaskQueue::Default => 5,
            TaskQueue::Urgent => 9,
        }
    }
}

/// Maps task names to queues; unrouted tasks go to the default queue.
#[derive(Debug, Clone)]
pub struct TaskRoutes {
    routes: HashMap<String, TaskQueue>,
    default_queue: TaskQueue,
}

impl Default for TaskRoutes {
    fn default() -> Self {
        Self::new(TaskQueue::Default)
    }
}

impl TaskRoutes {
    pub fn new(default_queue: TaskQueue) -> Self {
        Self {
            routes: HashMap::new(),
            default_queue,
        }
    }

    /// The stock routing table: `user.example` is urgent.
    pub fn defaults() -> Self {
        Self::default().route(USER_EXAMPLE, TaskQueue::Urgent)
    }

    pub fn route(mut self, task: impl Into<String>, queue: TaskQueue) -> Self {
        self.routes.insert(task.into(), queue);
        self
    }

    pub fn queue_for(&self, task: &str) -> TaskQueue {
        self.routes.get(task).copied().unwrap_or(self.default_queue)
    }
}

/// One unit of work on its way to a [`Task`].
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub id: String,
    pub name: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    /// Number of retries already attempted.
    pub retries: u32,
}

impl TaskRequest {
    pub fn new(name: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            args,
            kwargs,
            retries: 0,
        }
    }
}

/// Ways a task can end other than returning a value.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    #[error("retry requested: {0}")]
    Retry(String),

    #[error("task ignored")]
    Ignore,

    #[error("task rejected: {0}")]
    Reject(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn Error + Send + Sync>),
}

/// A named unit of background work.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// Execute the task.
    ///
    /// **Returns**
    /// - `Ok(value)`: reported as `success` with `value` as return value.
    /// - `Err(TaskError::Retry(..))`: retried after the configured delay
    ///   until the retry budget is spent, then reported as `failure`.
    /// - `Err(TaskError::Ignore)` / `Err(TaskError::Reject(..))`: reported
    ///   as `ignored` / `rejected`.
    /// - any other error: reported as `failure` with the error attached.
    async fn run(&self, request: &TaskRequest) -> Result<Value, TaskError>;
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, task: impl Task + 'static) -> Self {
        self.tasks.insert(task.name().to_string(), Arc::new(task));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }
}

/// Worker pool settings.
///
/// **Fields**
/// - `concurrency`: tasks executing at once. A free slot is claimed before
///   a request is taken, so higher-priority requests arriving meanwhile are
///   still served first.
/// - `max_retries`: retries allowed per request.
/// - `retry_delay`: pause between attempts.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SubmitError {
    #[error("worker has shut down")]
    Closed,
}

/// Submission side of a running [`Worker`].
///
/// The worker stops taking requests once every handle has been dropped and
/// the queues are drained.
#[derive(Clone)]
pub struct WorkerHandle {
    urgent: mpsc::UnboundedSender<TaskRequest>,
    default: mpsc::UnboundedSender<TaskRequest>,
    low: mpsc::UnboundedSender<TaskRequest>,
    routes: Arc<TaskRoutes>,
}

impl WorkerHandle {
    /// Queue a task by name and return its id.
    pub fn submit(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<String, SubmitError> {
        let request = TaskRequest::new(name, args, kwargs);
        let id = request.id.clone();
        self.send(request)?;
        Ok(id)
    }

    pub fn send(&self, request: TaskRequest) -> Result<(), SubmitError> {
        let queue = match self.routes.queue_for(&request.name) {
            TaskQueue::Urgent => &self.urgent,
            TaskQueue::Default => &self.default,
            TaskQueue::Low => &self.low,
        };
        queue.send(request).map_err(|_| SubmitError::Closed)
    }
}

pub struct Worker;

impl Worker {
    /// Spawn the dispatch loop on the current Tokio runtime.
    ///
    /// The returned [`JoinHandle`] completes once all handles are dropped,
    /// the queues are empty, and every in-flight task has finished.
    pub fn start(
        registry: TaskRegistry,
        routes: TaskRoutes,
        config: WorkerConfig,
    ) -> (WorkerHandle, JoinHandle<()>) {
        let (urgent_tx, mut urgent_rx) = mpsc::unbounded_channel();
        let (default_tx, mut default_rx) = mpsc::unbounded_channel();
        let (low_tx, mut low_rx) = mpsc::unbounded_channel();

        let handle = WorkerHandle {
            urgent: urgent_tx,
            default: default_tx,
            low: low_tx,
            routes: Arc::new(routes),
        };

        let config = Arc::new(config);
        let join = tokio::spawn(async move {
            let slots = Arc::new(Semaphore::new(config.concurrency.max(1)));
            let mut running = JoinSet::new();

            loop {
                let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                    break;
                };
                let request = tokio::select! {
                    biased;
                    Some(request) = urgent_rx.recv() => request,
                    Some(request) = default_rx.recv() => request,
                    Some(request) = low_rx.recv() => request,
                    else => break,
                };
                let task = registry.get(&request.name);
                running.spawn(execute(task, request, Arc::clone(&config), permit));
            }

            while running.join_next().await.is_some() {}
        });

        (handle, join)
    }
}

async fn execute(
    task: Option<Arc<dyn Task>>,
    mut request: TaskRequest,
    config: Arc<WorkerConfig>,
    _permit: OwnedSemaphorePermit,
) {
    lifecycle(TaskOutcome::Received, &request, None, &Value::Null, None);

    let Some(task) = task else {
        let err = TaskError::Reject(format!("unregistered task `{}`", request.name));
        lifecycle(TaskOutcome::Rejected, &request, None, &Value::Null, Some(&err));
        return;
    };

    loop {
        let started = Instant::now();
        let attempt = {
            let task = Arc::clone(&task);
            let request = request.clone();
            tokio::spawn(Handled::new(async move { task.run(&request).await })).await
        };
        let runtime = Some(started.elapsed().as_secs_f64());

        match attempt {
            Ok(Ok(value)) => {
                lifecycle(TaskOutcome::Success, &request, runtime, &value, None);
            }
            Ok(Err(err @ TaskError::Retry(_))) if request.retries < config.max_retries => {
                lifecycle(TaskOutcome::Retry, &request, runtime, &Value::Null, Some(&err));
                request.retries += 1;
                sleep(config.retry_delay).await;
                continue;
            }
            Ok(Err(TaskError::Ignore)) => {
                lifecycle(TaskOutcome::Ignored, &request, runtime, &Value::Null, None);
            }
            Ok(Err(err @ TaskError::Reject(_))) => {
                lifecycle(TaskOutcome::Rejected, &request, runtime, &Value::Null, Some(&err));
            }
            Ok(Err(err)) => {
                lifecycle(TaskOutcome::Failure, &request, runtime, &Value::Null, Some(&err));
            }
            Err(join_err) => {
                let err = TaskError::Failed(join_err.to_string());
                lifecycle(TaskOutcome::InternalError, &request, runtime, &Value::Null, Some(&err));
            }
        }
        return;
    }
}

/// Emit one lifecycle record for `request`.
fn lifecycle(
    outcome: TaskOutcome,
    request: &TaskRequest,
    runtime: Option<f64>,
    return_value: &Value,
    error: Option<&TaskError>,
) {
    let args = Value::Array(request.args.clone());
    let kwargs = Value::Object(request.kwargs.clone());
    let error = error.map(|err| err as &(dyn Error + 'static));

    macro_rules! emit {
        ($level:expr) => {
            tracing::event!(
                target: WORKER_TRACE_TARGET,
                $level,
                outcome = outcome.as_str(),
                task = request.name.as_str(),
                task_id = request.id.as_str(),
                args = %args,
                kwargs = %kwargs,
                runtime,
                return_value = %return_value,
                error,
                "Task {}[{}] {}",
                request.name,
                request.id,
                outcome.as_str(),
            )
        };
    }

    match outcome.severity() {
        crate::level::Severity::Error | crate::level::Severity::Critical => {
            emit!(tracing::Level::ERROR)
        }
        crate::level::Severity::Warning => emit!(tracing::Level::WARN),
        _ => emit!(tracing::Level::INFO),
    }
}

/// A periodic beat entry: submit `task` every `every`.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub name: String,
    pub task: String,
    pub every: Duration,
    pub args: Vec<Value>,
}

impl Schedule {
    pub fn every(name: impl Into<String>, task: impl Into<String>, every: Duration) -> Self {
        Self {
            name: name.into(),
            task: task.into(),
            every,
            args: Vec::new(),
        }
    }
}

/// The stock beat schedule: `user.example` every five seconds.
pub fn default_schedule() -> Vec<Schedule> {
    vec![Schedule::every("example", USER_EXAMPLE, Duration::from_secs(5))]
}

/// Periodic submitter.
pub struct Beat {
    handle: WorkerHandle,
    entries: Vec<Schedule>,
}

impl Beat {
    pub fn new(handle: WorkerHandle) -> Self {
        Self {
            handle,
            entries: Vec::new(),
        }
    }

    pub fn schedule(mut self, entry: Schedule) -> Self {
        self.entries.push(entry);
        self
    }

    /// Start one timer per entry. The first submission happens one period
    /// after start. Entries stop once the worker has shut down.
    pub fn spawn(self) -> JoinHandle<()> {
        let mut timers = JoinSet::new();
        for entry in self.entries {
            let handle = self.handle.clone();
            timers.spawn(async move {
                let period = entry.every.max(Duration::from_millis(1));
                let mut ticks = interval_at(tokio::time::Instant::now() + period, period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    tracing::info!(
                        target: BEAT_TARGET,
                        "Scheduler: Sending due task {} ({})",
                        entry.name,
                        entry.task
                    );
                    if handle.submit(&entry.task, entry.args.clone(), Map::new()).is_err() {
                        break;
                    }
                }
            });
        }
        tokio::spawn(async move { while timers.join_next().await.is_some() {} })
    }
}
