//! Bounded task queue between I/O tasks and the update thread.
//!
//! Producers post with backpressure (`submit` waits when the queue is
//! full). The consumer never waits: it drains whatever is ready, up to a
//! per-tick cap, so a burst of requests cannot stall a tick.

use tokio::sync::mpsc;

/// The consuming side was dropped; the update thread is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task queue closed")]
pub struct QueueClosed;

/// Creates a task queue holding at most `capacity` pending tasks.
pub fn task_queue<T>(capacity: usize) -> (TaskSender<T>, TaskQueue<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TaskSender { tx }, TaskQueue { rx })
}

/// Producer handle. Cheap to clone.
pub struct TaskSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for TaskSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> TaskSender<T> {
    /// Posts a task, waiting for room if the queue is full.
    pub async fn submit(&self, task: T) -> Result<(), QueueClosed> {
        self.tx.send(task).await.map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the update thread.
pub struct TaskQueue<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> TaskQueue<T> {
    /// Takes up to `max` ready tasks without waiting.
    pub fn drain(&mut self, max: usize) -> Vec<T> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.rx.try_recv() {
                Ok(task) => out.push(task),
                Err(_) => break,
            }
        }
        out
    }

    /// Number of tasks waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Every sender is gone and nothing is left to drain.
    pub fn is_finished(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }

    /// Stops accepting new tasks; already queued ones can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
