//! Pilot Advisor - the daily portfolio pipeline service.
//!
//! Runs a fixed five-stage agent workflow (portfolio snapshot, market
//! analysis, risk assessment, decision plan, execution summary) behind
//! a small HTTP API. Each stage's free-form agent reply is validated
//! into a typed record before the next stage sees it; the run stops at
//! the first stage that fails.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod agents;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod routes;
pub mod runs;
pub mod scheduler;

use std::sync::Arc;

use pilot_common::Config;
use tokio::sync::mpsc;
use tracing::info;

use crate::agents::{default_stages, AgentBridge};
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::runs::{run_queue, run_worker, RunRegistry, RunRequest};
use crate::scheduler::DailyScheduler;

pub use crate::routes::router;

/// Shared state behind the HTTP routes.
#[derive(Clone)]
pub struct AdvisorState {
    pub config: Arc<Config>,
    pub registry: RunRegistry,
    pub run_tx: mpsc::Sender<RunRequest>,
}

/// The assembled service: HTTP API, run worker, and scheduler.
pub struct AdvisorService;

impl AdvisorService {
    /// Wire everything up and serve until shutdown.
    pub async fn start(config: Config) -> anyhow::Result<()> {
        let config = Arc::new(config);

        let bridge = Arc::new(AgentBridge::new(&config.agents)?);
        let orchestrator = Arc::new(PipelineOrchestrator::new(default_stages(bridge)));
        let registry = RunRegistry::new();

        let (run_tx, run_rx) = run_queue();
        tokio::spawn(run_worker(run_rx, orchestrator, registry.clone()));

        if config.schedule.enabled {
            let scheduler = DailyScheduler::new(&config.schedule, config.trigger_url())?;
            tokio::spawn(scheduler.run());
        } else {
            info!("Built-in scheduler disabled");
        }

        let state = AdvisorState {
            config: config.clone(),
            registry,
            run_tx,
        };
        let app = routes::router(state);

        let address = config.bind_address();
        let listener = tokio::net::TcpListener::bind(&address).await?;
        info!(address = %address, "pilot-advisor listening");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
