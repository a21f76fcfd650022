//! The hosting runtime: pulls jobs from a source and runs the entrypoint for
//! each, one live session per room.

use crate::calls::{CallLog, CallRecord};
use agent_core::{AgentError, job::JobContext, room::Room, session::SessionState};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::{future::Future, sync::Arc};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

pub type EntrypointFn =
    Arc<dyn Fn(JobContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// What the worker runs for every accepted job.
#[derive(Clone)]
pub struct WorkerOptions {
    pub entrypoint: EntrypointFn,
}

impl WorkerOptions {
    pub fn new<F, Fut>(entrypoint: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            entrypoint: Arc::new(move |ctx| Box::pin(entrypoint(ctx))),
        }
    }
}

/// Where new connection signals come from.
#[async_trait]
pub trait JobSource: Send {
    /// The next job, or `None` once the source is exhausted.
    async fn next_job(&mut self) -> Option<JobContext>;
}

/// A job source fed through an in-process channel.
pub struct ChannelJobSource {
    rx: mpsc::Receiver<JobContext>,
}

#[async_trait]
impl JobSource for ChannelJobSource {
    async fn next_job(&mut self) -> Option<JobContext> {
        self.rx.recv().await
    }
}

/// Hands rooms to a [`ChannelJobSource`].
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::Sender<JobContext>,
}

/// A job that was handed to the worker.
pub struct DispatchedJob {
    pub job_id: String,
    pub state: watch::Receiver<SessionState>,
}

impl JobSender {
    /// Queues a job for `room` under a fresh job id.
    pub async fn dispatch(&self, room: Room) -> Result<DispatchedJob, AgentError> {
        self.dispatch_with_id(format!("job-{}", Uuid::new_v4()), room)
            .await
    }

    pub async fn dispatch_with_id(
        &self,
        job_id: impl Into<String>,
        room: Room,
    ) -> Result<DispatchedJob, AgentError> {
        let ctx = JobContext::new(job_id, room);
        let job = DispatchedJob {
            job_id: ctx.job_id().to_string(),
            state: ctx.state_sender().subscribe(),
        };
        self.tx
            .send(ctx)
            .await
            .map_err(|_| AgentError::Connection("worker is not accepting jobs".to_string()))?;
        Ok(job)
    }
}

pub fn job_channel(buffer: usize) -> (JobSender, ChannelJobSource) {
    let (tx, rx) = mpsc::channel(buffer);
    (JobSender { tx }, ChannelJobSource { rx })
}

/// Runs the entrypoint once per room.
#[derive(Clone)]
pub struct Worker {
    options: WorkerOptions,
    calls: CallLog,
}

impl Worker {
    pub fn new(options: WorkerOptions) -> Self {
        Self {
            options,
            calls: CallLog::default(),
        }
    }

    /// Pulls jobs until the source is exhausted, then waits for running
    /// sessions to finish.
    pub async fn run(&self, mut source: impl JobSource) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                job = source.next_job() => match job {
                    Some(ctx) => self.accept(ctx, &mut tasks),
                    None => break,
                },
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Job task did not complete");
                    }
                }
            }
        }

        info!("Job source closed. Waiting for running sessions...");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job task did not complete");
            }
        }
        info!("Worker stopped.");
    }

    fn accept(&self, ctx: JobContext, tasks: &mut JoinSet<()>) {
        let room = ctx.room_name().to_string();
        let state = ctx.state_sender();
        let Some(call) = self.calls.open(ctx.job_id(), &room, state.clone()) else {
            warn!(
                job_id = %ctx.job_id(),
                room = %room,
                "Room already has an agent session; ignoring duplicate job"
            );
            return;
        };

        let span = tracing::info_span!("job", job_id = %ctx.job_id(), room = %room);
        let entrypoint = self.options.entrypoint.clone();
        tasks.spawn(
            async move {
                // Released on return and on panic alike.
                let _call = call;
                info!("Job accepted");
                if let Err(e) = entrypoint(ctx).await {
                    if *state.borrow() != SessionState::Closed {
                        state.send_replace(SessionState::Failed);
                    }
                    error!("Agent session failed: {e:#}");
                }
            }
            .instrument(span),
        );
    }

    /// The state of the live session in `room`, if any.
    pub fn session_state(&self, room: &str) -> Option<SessionState> {
        self.calls.state(room)
    }

    pub fn active_rooms(&self) -> Vec<String> {
        self.calls.live_rooms()
    }

    /// Finished and live calls handled by this worker.
    pub fn call_records(&self) -> Vec<CallRecord> {
        self.calls.records()
    }
}
