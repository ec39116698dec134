//! Background task runners
//!
//! File I/O and index builds run off the owner thread on a sequenced
//! runner: tasks execute one at a time, in posting order.

use std::io;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait TaskRunner {
    fn post_task(&self, task: Task);
}

/// Runs tasks on one dedicated worker thread.
pub struct ThreadTaskRunner {
    sender: Option<UnboundedSender<Task>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadTaskRunner {
    pub fn new(name: &str) -> io::Result<Self> {
        let (sender, mut receiver) = unbounded_channel::<Task>();
        let worker = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Some(task) = receiver.blocking_recv() {
                task();
            }
        })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl TaskRunner for ThreadTaskRunner {
    fn post_task(&self, task: Task) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(task).is_err() {
            log::warn!("Background worker is gone, dropping task");
        }
    }
}

impl Drop for ThreadTaskRunner {
    /// Finishes the queued tasks, then stops the worker.
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Background worker panicked");
            }
        }
    }
}

/// Runs each task right away on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineTaskRunner;

impl TaskRunner for InlineTaskRunner {
    fn post_task(&self, task: Task) {
        task();
    }
}
