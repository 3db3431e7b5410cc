//! Run lifecycle tracking and the serialized run queue.
//!
//! Triggering a daily run only enqueues it; a single background worker
//! drains the queue and executes runs one at a time, so two triggers
//! close together never interleave their agent calls. The registry is
//! the queryable record of every run this process has seen.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};
use uuid::Uuid;

use crate::models::StageKey;
use crate::pipeline::orchestrator::{PipelineOrchestrator, RunContext};
use crate::pipeline::state::WorkflowState;
use crate::pipeline::validate::StageFailure;

/// Queue capacity; beyond this, triggers are rejected rather than piled up.
pub const RUN_QUEUE_CAPACITY: usize = 16;

/// Most recent runs returned by the listing endpoint.
const RECENT_LIMIT: usize = 20;

/// Terminal runs kept in the registry; older ones are pruned on enqueue.
const MAX_RETAINED_RUNS: usize = 100;

/// Lifecycle state of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running { stage: StageKey },
    StageFailed { stage: StageKey, failure: StageFailure },
    Completed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StageFailed { .. } | Self::Completed)
    }
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: StageKey,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    pub duration_ms: u64,
}

/// Full queryable record of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunState,
    pub stages: Vec<StageReport>,
    pub state: WorkflowState,
    pub enqueued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// One-line view of a run for listings.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunState,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryInner {
    runs: HashMap<Uuid, RunReport>,
    order: Vec<Uuid>,
}

impl RegistryInner {
    /// Evict the oldest terminal runs above the retention cap. Queued
    /// and running entries are never evicted.
    fn prune(&mut self) {
        while self.order.len() > MAX_RETAINED_RUNS {
            let runs = &self.runs;
            let Some(pos) = self
                .order
                .iter()
                .position(|id| runs.get(id).map_or(true, |r| r.status.is_terminal()))
            else {
                break;
            };
            let evicted = self.order.remove(pos);
            self.runs.remove(&evicted);
        }
    }
}

/// In-memory store of run reports, shared between the worker and routes.
#[derive(Clone, Default)]
pub struct RunRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly enqueued run.
    pub async fn enqueue(&self, run_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.runs.insert(
            run_id,
            RunReport {
                run_id,
                status: RunState::Queued,
                stages: Vec::new(),
                state: WorkflowState::new(),
                enqueued_at: Utc::now(),
                started_at: None,
                ended_at: None,
            },
        );
        inner.order.push(run_id);
        inner.prune();
    }

    /// Mark the run as picked up by the worker.
    pub async fn mark_started(&self, run_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(report) = inner.runs.get_mut(&run_id) {
            report.started_at = Some(Utc::now());
        }
    }

    /// Record which stage the run is currently executing.
    pub async fn mark_running(&self, run_id: Uuid, stage: StageKey) {
        let mut inner = self.inner.write().await;
        if let Some(report) = inner.runs.get_mut(&run_id) {
            report.status = RunState::Running { stage };
        }
    }

    /// Record the terminal outcome of a run.
    pub async fn finish(
        &self,
        run_id: Uuid,
        status: RunState,
        stages: Vec<StageReport>,
        state: WorkflowState,
    ) {
        debug_assert!(status.is_terminal());
        let mut inner = self.inner.write().await;
        if let Some(report) = inner.runs.get_mut(&run_id) {
            report.status = status;
            report.stages = stages;
            report.state = state;
            report.ended_at = Some(Utc::now());
        }
    }

    /// Forget a run that never made it onto the queue.
    pub async fn remove(&self, run_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.runs.remove(&run_id);
        inner.order.retain(|id| *id != run_id);
    }

    pub async fn get(&self, run_id: Uuid) -> Option<RunReport> {
        self.inner.read().await.runs.get(&run_id).cloned()
    }

    /// Most recent runs, newest first.
    pub async fn recent(&self) -> Vec<RunSummary> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .rev()
            .take(RECENT_LIMIT)
            .filter_map(|id| inner.runs.get(id))
            .map(|report| RunSummary {
                run_id: report.run_id,
                status: report.status.clone(),
                enqueued_at: report.enqueued_at,
            })
            .collect()
    }
}

/// A queued request for one daily run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: Uuid,
    pub daily_message: String,
}

/// Create the bounded run queue.
pub fn run_queue() -> (mpsc::Sender<RunRequest>, mpsc::Receiver<RunRequest>) {
    mpsc::channel(RUN_QUEUE_CAPACITY)
}

/// Drain the run queue, executing runs strictly one at a time.
pub async fn run_worker(
    mut rx: mpsc::Receiver<RunRequest>,
    orchestrator: Arc<PipelineOrchestrator>,
    registry: RunRegistry,
) {
    info!("Run worker started");
    while let Some(request) = rx.recv().await {
        let ctx = RunContext {
            run_id: request.run_id,
            daily_message: request.daily_message,
        };
        info!(run_id = %ctx.run_id, "Run dequeued");
        if let Err(e) = orchestrator.run(&ctx, &registry).await {
            error!(run_id = %ctx.run_id, error = %e, "Run aborted unexpectedly");
        }
    }
    info!("Run worker stopped: queue closed");
}
