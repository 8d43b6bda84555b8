//! The host update loop: a dedicated thread that owns the world.
//!
//! The world is moved into an OS thread named `host-update` running a
//! current-thread Tokio runtime. Every tick the loop
//!
//! 1. drains up to `max_tasks_per_tick` queued tasks,
//! 2. applies up to `max_writes_per_tick` pending block writes (FIFO),
//! 3. calls [`WorldHost::tick`].
//!
//! The network side only ever holds a [`HostHandle`]: a bounded task
//! sender plus a oneshot reply per request. This is the same actor
//! shape as a room actor, except the actor lives on its own thread so
//! its clock is never starved by I/O.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use tokio::sync::oneshot;
use worldlink_tick::{
    Backlog, TaskQueue, TaskSender, TickConfig, TickScheduler, task_queue,
};

use crate::{
    BlockWrite, HostConfig, HostError, HostInfo, StructureBuilder, StructureReport,
    WorldHost,
};

/// Name of the thread that owns the world.
pub const HOST_THREAD_NAME: &str = "host-update";

/// A structure build as submitted by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureRequest {
    pub world: String,
    pub size: i64,
    /// Requested `(x, z)` center; the world spawn when `None`.
    pub center: Option<(i32, i32)>,
    /// Empty the footprint before building.
    pub clear: bool,
}

enum HostTask {
    Command {
        command: String,
        reply: oneshot::Sender<bool>,
    },
    Build {
        request: StructureRequest,
        reply: oneshot::Sender<Result<StructureReport, HostError>>,
    },
    Info {
        reply: oneshot::Sender<HostInfo>,
    },
    Announce {
        message: String,
    },
    Shutdown,
}

/// Handle to the host update thread. Cheap to clone.
#[derive(Clone)]
pub struct HostHandle {
    tasks: TaskSender<HostTask>,
}

impl HostHandle {
    /// Runs a console instruction on the host thread.
    ///
    /// Resolves to the host's verdict once the instruction has run.
    pub async fn execute_command(&self, command: impl Into<String>) -> Result<bool, HostError> {
        let (reply, rx) = oneshot::channel();
        self.post(HostTask::Command {
            command: command.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| HostError::Unavailable)
    }

    /// Validates and queues a structure build.
    ///
    /// Returns as soon as the plan is queued on the host thread; the
    /// writes themselves land over the following ticks.
    pub async fn build_structure(
        &self,
        request: StructureRequest,
    ) -> Result<StructureReport, HostError> {
        // Cheap check on the caller's side; the host thread checks again.
        StructureBuilder::validate_size(request.size)?;
        let (reply, rx) = oneshot::channel();
        self.post(HostTask::Build { request, reply }).await?;
        rx.await.map_err(|_| HostError::Unavailable)?
    }

    pub async fn info(&self) -> Result<HostInfo, HostError> {
        let (reply, rx) = oneshot::channel();
        self.post(HostTask::Info { reply }).await?;
        rx.await.map_err(|_| HostError::Unavailable)
    }

    /// Shows a chat-style message in the world (fire-and-forget).
    pub async fn announce(&self, message: impl Into<String>) -> Result<(), HostError> {
        self.post(HostTask::Announce {
            message: message.into(),
        })
        .await
    }

    /// Asks the loop to finish pending writes and stop.
    pub async fn shutdown(&self) -> Result<(), HostError> {
        self.post(HostTask::Shutdown).await
    }

    /// `false` once the update thread has stopped.
    pub fn is_running(&self) -> bool {
        !self.tasks.is_closed()
    }

    async fn post(&self, task: HostTask) -> Result<(), HostError> {
        self.tasks
            .submit(task)
            .await
            .map_err(|_| HostError::Unavailable)
    }
}

/// Join handle for the host update thread.
pub struct HostThread {
    handle: JoinHandle<()>,
}

impl HostThread {
    /// Waits for the thread to exit. Call after [`HostHandle::shutdown`].
    pub fn join(self) -> Result<(), HostError> {
        self.handle.join().map_err(|_| HostError::Unavailable)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawns the host update thread.
pub struct HostLoop;

impl HostLoop {
    /// Moves `world` onto a new `host-update` thread and starts ticking.
    ///
    /// # Errors
    /// Fails if the runtime or the thread cannot be created.
    pub fn spawn<W: WorldHost>(
        world: W,
        config: HostConfig,
    ) -> io::Result<(HostHandle, HostThread)> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (tx, queue) = task_queue(config.queue_capacity);

        let actor = HostActor {
            world,
            queue,
            backlog: Backlog::new(),
            builder: StructureBuilder::new(config.floor_y),
            config,
        };

        let handle = std::thread::Builder::new()
            .name(HOST_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(actor.run()))?;

        Ok((HostHandle { tasks: tx }, HostThread { handle }))
    }
}

struct HostActor<W> {
    world: W,
    queue: TaskQueue<HostTask>,
    backlog: Backlog<BlockWrite>,
    builder: StructureBuilder,
    config: HostConfig,
}

impl<W: WorldHost> HostActor<W> {
    async fn run(mut self) {
        let mut scheduler = TickScheduler::new(TickConfig::with_rate(self.config.tick_rate_hz));
        tracing::info!(
            rate_hz = scheduler.tick_rate_hz(),
            floor_y = self.config.floor_y,
            "host update loop started"
        );

        let mut stopping = false;
        while !stopping {
            let info = scheduler.wait_for_tick().await;

            for task in self.queue.drain(self.config.max_tasks_per_tick) {
                if matches!(task, HostTask::Shutdown) {
                    stopping = true;
                    continue;
                }
                self.handle_guarded(task);
            }

            let world = &mut self.world;
            let applied = self
                .backlog
                .drain_budget(self.config.max_writes_per_tick, |w| {
                    world.set_block(&w.world, w.pos, w.block)
                });
            if applied > 0 {
                tracing::trace!(tick = info.tick, applied, pending = self.backlog.len(), "writes applied");
            }

            self.world.tick(info.tick);
            scheduler.record_tick_end();

            if self.queue.is_finished() {
                tracing::debug!("all host handles dropped");
                stopping = true;
            }
        }

        self.queue.close();
        if !self.backlog.is_empty() {
            tracing::info!(pending = self.backlog.len(), "flushing pending writes before stop");
            let world = &mut self.world;
            self.backlog
                .drain_budget(usize::MAX, |w| world.set_block(&w.world, w.pos, w.block));
        }
        tracing::info!("host update loop stopped");
    }

    /// Runs one task, keeping the loop alive if the world panics.
    ///
    /// A panicking task drops its reply sender, so the caller sees
    /// [`HostError::Unavailable`].
    fn handle_guarded(&mut self, task: HostTask) {
        if catch_unwind(AssertUnwindSafe(|| self.handle(task))).is_err() {
            tracing::error!("host task panicked");
        }
    }

    fn handle(&mut self, task: HostTask) {
        match task {
            HostTask::Command { command, reply } => {
                let accepted = self.world.dispatch_command(&command);
                tracing::debug!(%command, accepted, "command dispatched");
                let _ = reply.send(accepted);
            }
            HostTask::Build { request, reply } => {
                let _ = reply.send(self.build(request));
            }
            HostTask::Info { reply } => {
                let _ = reply.send(self.world.info());
            }
            HostTask::Announce { message } => {
                self.world.announce(&message);
            }
            HostTask::Shutdown => {}
        }
    }

    fn build(&mut self, request: StructureRequest) -> Result<StructureReport, HostError> {
        StructureBuilder::validate_size(request.size)?;
        if !self.world.world_exists(&request.world) {
            return Err(HostError::WorldNotFound(request.world));
        }
        let (center_x, center_z) = match request.center {
            Some(center) => center,
            None => self
                .world
                .spawn_point(&request.world)
                .ok_or_else(|| HostError::WorldNotFound(request.world.clone()))?,
        };

        let spec = self
            .builder
            .centered(&request.world, center_x, center_z, request.size)?;
        let plan = self.builder.plan(&spec, request.clear);
        tracing::info!(
            world = %spec.world,
            size = spec.size,
            center_x = plan.report.center_x,
            center_z = plan.report.center_z,
            writes = plan.writes.len(),
            clear = request.clear,
            "structure queued"
        );
        self.backlog.extend(plan.writes);
        Ok(plan.report)
    }
}
