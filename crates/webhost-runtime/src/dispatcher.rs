//! [`Dispatcher`] – fire-and-forget "run this on the engine loop".
//!
//! Tasks travel over an unbounded Tokio channel that the engine loop drains,
//! so there is no dispatcher thread: the loop's own wake-up carries the work.
//! Tasks run in the order they were queued. Once shutdown begins every new
//! submission is dropped and [`Dispatcher::submit`] returns `false`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::trace;

use crate::engine::Engine;

/// A unit of work executed on the engine loop thread.
pub type Task = Box<dyn FnOnce(&mut dyn Engine) + Send + 'static>;

pub(crate) enum Message {
    Run(Task),
    Stop,
}

/// Cloneable handle for queueing tasks on the engine loop.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Message>,
    closed: Arc<AtomicBool>,
}

impl Dispatcher {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Queue `task` for the engine loop.
    ///
    /// Returns `false` when the loop is shutting down or gone; the task is
    /// dropped without running.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut dyn Engine) + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            trace!("engine loop shutting down, dropping task");
            return false;
        }
        self.tx.send(Message::Run(Box::new(task))).is_ok()
    }

    /// `true` once shutdown has begun or the loop has exited.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Refuse further tasks and ask the loop to stop after the ones already
    /// queued.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Message::Stop);
        }
    }
}
