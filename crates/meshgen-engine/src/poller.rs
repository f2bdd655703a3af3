use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use meshgen_contracts::events::{EventPayload, EventWriter};
use meshgen_contracts::media::AsyncOperation;
use meshgen_contracts::GenerationError;
use serde_json::{json, Value};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 120;
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Anything that can refresh an operation by name.
pub trait OperationSource {
    fn check_operation(
        &self,
        operation: &AsyncOperation,
    ) -> Result<AsyncOperation, GenerationError>;

    /// Called once when polling stops before the operation finished.
    fn abandon_operation(&self, _operation: &AsyncOperation) {}
}

pub trait Sleep: Send + Sync {
    /// Waits for `duration`. Returns `false` when `cancel` fired first.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Blocks the current thread in short slices so cancellation is noticed
/// without waiting out the whole interval.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedOperation {
    pub operation: AsyncOperation,
    pub status_checks: u32,
    pub waited: Duration,
}

/// Drives a long-running operation to completion.
///
/// Every round sleeps one interval and then queries once; an operation that
/// is already done is returned without sleeping. A finished operation with
/// an error message fails with [`GenerationError::Operation`]. The loop gives
/// up with [`GenerationError::Timeout`] once `max_attempts` status checks
/// were spent or `max_wait` has elapsed. On timeout or cancellation the
/// source is told to abandon the operation.
pub fn await_completion<S: OperationSource + ?Sized>(
    source: &S,
    operation: AsyncOperation,
    policy: &PollPolicy,
    sleeper: &dyn Sleep,
    cancel: &CancelToken,
    events: &EventWriter,
) -> Result<CompletedOperation, GenerationError> {
    let started = Instant::now();
    let mut status_checks = 0u32;
    let mut operation = operation;
    loop {
        if operation.done {
            if let Some(message) = operation.failure() {
                return Err(GenerationError::Operation(message.to_string()));
            }
            return Ok(CompletedOperation {
                operation,
                status_checks,
                waited: started.elapsed(),
            });
        }
        if cancel.is_cancelled() {
            source.abandon_operation(&operation);
            return Err(GenerationError::Cancelled);
        }
        if status_checks >= policy.max_attempts || started.elapsed() >= policy.max_wait {
            source.abandon_operation(&operation);
            return Err(GenerationError::Timeout {
                attempts: status_checks,
                waited: started.elapsed(),
            });
        }
        if !sleeper.sleep(policy.interval, cancel) || cancel.is_cancelled() {
            source.abandon_operation(&operation);
            return Err(GenerationError::Cancelled);
        }

        status_checks += 1;
        operation = source.check_operation(&operation)?;
        events.record(
            "poll_attempt",
            poll_payload(&operation, status_checks, started.elapsed()),
        );
    }
}

fn poll_payload(operation: &AsyncOperation, attempt: u32, elapsed: Duration) -> EventPayload {
    let mut payload = EventPayload::new();
    payload.insert("operation".to_string(), Value::String(operation.name.clone()));
    payload.insert("attempt".to_string(), json!(attempt));
    payload.insert("done".to_string(), Value::Bool(operation.done));
    payload.insert(
        "elapsed_s".to_string(),
        json!((elapsed.as_secs_f64() * 1000.0).round() / 1000.0),
    );
    payload
}
