//! Update clock and marshaling primitives for the worldlink host thread.
//!
//! The host world may only be touched from its own update thread. This
//! crate provides the three pieces that thread is built from:
//!
//! - [`TickScheduler`]: a fixed-rate clock with overrun handling and
//!   budget warnings.
//! - [`task_queue`]: a bounded, multi-producer queue that I/O tasks post
//!   work into and the update thread drains a bounded amount of per tick.
//! - [`Backlog`]: a FIFO of deferred work applied under a per-tick
//!   budget (block writes, for example).
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     let info = scheduler.wait_for_tick().await;
//!     for task in queue.drain(max_tasks) { task(&mut world); }
//!     backlog.drain_budget(max_writes, |w| world.apply(w));
//!     scheduler.record_tick_end();
//! }
//! ```

mod backlog;
mod queue;
mod scheduler;

pub use backlog::Backlog;
pub use queue::{QueueClosed, TaskQueue, TaskSender, task_queue};
pub use scheduler::{TickConfig, TickInfo, TickMetrics, TickPolicy, TickScheduler};
