use crate::queue::command::Command;
use crate::transport::Backend;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

pub(super) enum WorkerMessage {
    Execute(Command),
    Stop,
}

/// The single dedicated worker thread that owns the serial transport and
/// performs blocking I/O on it. Commands are executed strictly in the
/// order they arrive on `receiver`; nothing else ever touches `backend`.
pub(super) fn run(
    mut backend: Box<dyn Backend>,
    receiver: Receiver<WorkerMessage>,
    results: Arc<Mutex<HashMap<u64, Command>>>,
) {
    while let Ok(message) = receiver.recv() {
        match message {
            WorkerMessage::Stop => break,
            WorkerMessage::Execute(mut command) => {
                let outcome = backend.execute(&command.payload);
                command.complete(outcome);

                if command.wants_result() {
                    results.lock().unwrap().insert(command.id, command);
                }
            }
        }
    }
}
