//! Back-end-independent request pipeline; correlation by id; bounded
//! result table.

mod command;
mod worker;

pub use command::{Command, CommandKind, CommandOutcome};

use crate::error::{CoreError, CoreResult};
use crate::transport::Backend;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const RESULT_TABLE_EVICTION_THRESHOLD: usize = 40;
const RESULT_TABLE_EVICTION_AGE: Duration = Duration::from_secs(180);
const GET_RESULT_TIMEOUT: Duration = Duration::from_secs(40);
const GET_RESULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One physical mount back-end's command pipeline. Commands enter the
/// hardware strictly in FIFO order, on a single dedicated worker; no other
/// code touches the serial transport.
pub struct CommandQueue {
    next_id: AtomicU64,
    sender: Mutex<Option<Sender<worker::WorkerMessage>>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    results: Arc<Mutex<HashMap<u64, Command>>>,
    running: Arc<AtomicBool>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sender: Mutex::new(None),
            worker_handle: Mutex::new(None),
            results: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Spin up the worker thread, taking ownership of `backend`. Gearing is
    /// applied upstream in the Tracking Engine, so only the transport
    /// capability is threaded through here.
    pub fn start(&self, backend: Box<dyn Backend>) {
        let (tx, rx) = mpsc::channel();
        let results = self.results.clone();

        let handle = std::thread::Builder::new()
            .name("mount-command-queue".into())
            .spawn(move || worker::run(backend, rx, results))
            .expect("failed to spawn command queue worker thread");

        *self.sender.lock().unwrap() = Some(tx);
        *self.worker_handle.lock().unwrap() = Some(handle);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Flag cancellation, join the worker, close the transport, drop the
    /// result table. Any outstanding `get_result` observes `is_running() ==
    /// false` on its very next poll.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(sender) = self.sender.lock().unwrap().take() {
            let _ = sender.send(worker::WorkerMessage::Stop);
        }
        if let Some(handle) = self.worker_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.results.lock().unwrap().clear();
    }

    /// Never blocks. Returns `QueueFailed` if the queue is stopped or the
    /// underlying device is not connected.
    pub fn enqueue(&self, id: u64, payload: CommandKind) -> CoreResult<()> {
        if !self.is_running() {
            return Err(CoreError::queue_failed("queue is not running"));
        }

        self.evict_stale_results();

        let sender_guard = self.sender.lock().unwrap();
        let sender = sender_guard
            .as_ref()
            .ok_or_else(|| CoreError::queue_failed("queue worker is not attached"))?;

        sender
            .send(worker::WorkerMessage::Execute(Command::new(id, payload)))
            .map_err(|_| CoreError::queue_failed("command queue worker has exited"))
    }

    /// Blocks the calling task up to 40s waiting for completion. On
    /// timeout, or if the queue stops while waiting, returns a command
    /// marked `successful = false` with a `QueueFailed` error; never panics.
    pub async fn get_result(&self, id: u64) -> Command {
        let deadline = tokio::time::Instant::now() + GET_RESULT_TIMEOUT;

        loop {
            if let Some(command) = self.results.lock().unwrap().remove(&id) {
                return command;
            }

            if !self.is_running() {
                let mut command = Command::new(id, CommandKind::GetSteps);
                command.fail_queue(CoreError::queue_failed("queue stopped while awaiting result"));
                return command;
            }

            if tokio::time::Instant::now() >= deadline {
                let mut command = Command::new(id, CommandKind::GetSteps);
                command.fail_queue(CoreError::Timeout(format!("get_result({id})")));
                return command;
            }

            tokio::time::sleep(GET_RESULT_POLL_INTERVAL).await;
        }
    }

    /// Before each enqueue, if the table holds >= 40 entries, every entry
    /// older than 180s is removed.
    fn evict_stale_results(&self) {
        let mut results = self.results.lock().unwrap();
        if results.len() < RESULT_TABLE_EVICTION_THRESHOLD {
            return;
        }

        let now = chrono::Utc::now();
        results.retain(|_, command| {
            let age = now.signed_duration_since(command.created_utc);
            age.to_std().unwrap_or(Duration::ZERO) < RESULT_TABLE_EVICTION_AGE
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SimulatorBackend;
    use crate::Snapshot;

    fn queue_with_simulator() -> CommandQueue {
        let queue = CommandQueue::new();
        let backend = Box::new(SimulatorBackend::new(Snapshot::default_for_tests()));
        queue.start(backend);
        queue
    }

    #[tokio::test]
    async fn enqueue_and_get_result_round_trip() {
        let queue = queue_with_simulator();
        let id = queue.next_id();
        queue
            .enqueue(id, CommandKind::GetPositionsDegrees)
            .unwrap();
        let command = queue.get_result(id).await;
        assert!(command.successful);
        assert!(matches!(command.result, Some(CommandOutcome::Positions(_))));
        queue.stop();
    }

    #[tokio::test]
    async fn get_result_after_stop_fails_fast() {
        let queue = queue_with_simulator();
        let id = queue.next_id();
        queue
            .enqueue(id, CommandKind::GetPositionsDegrees)
            .unwrap();
        queue.stop();

        let started = tokio::time::Instant::now();
        let command = queue.get_result(id).await;
        assert!(!command.successful);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn enqueue_after_stop_is_rejected() {
        let queue = queue_with_simulator();
        queue.stop();
        let id = queue.next_id();
        assert!(queue.enqueue(id, CommandKind::GetSteps).is_err());
    }

    #[tokio::test]
    async fn fire_and_forget_commands_execute_in_order() {
        let queue = queue_with_simulator();
        for _ in 0..5 {
            queue.enqueue(0, CommandKind::GetSteps).unwrap();
        }
        let id = queue.next_id();
        queue.enqueue(id, CommandKind::GetSteps).unwrap();
        let command = queue.get_result(id).await;
        assert!(command.successful);
        queue.stop();
    }
}
