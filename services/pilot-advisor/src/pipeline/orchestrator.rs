//! Fail-fast pipeline orchestration.
//!
//! The orchestrator walks the fixed stage sequence, validates each
//! stage's raw output into a typed record, threads the growing
//! [`WorkflowState`] into the next stage, and stops at the first
//! failure. Every transition is mirrored into the [`RunRegistry`] so
//! the run is observable while it executes.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{DecisionAction, StageKey, StageRecord};
use crate::pipeline::state::WorkflowState;
use crate::pipeline::validate::{validate_stage, StageFailure};
use crate::runs::{RunRegistry, RunState, StageReport};

/// Per-run inputs shared by every stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    /// The policy-derived instruction sent to each agent.
    pub daily_message: String,
}

/// One step of the daily pipeline.
///
/// A stage produces raw text (normally an agent reply); the
/// orchestrator owns extraction and validation, so implementations
/// never parse their own output.
#[async_trait]
pub trait Stage: Send + Sync {
    fn key(&self) -> StageKey;

    async fn run(&self, state: &WorkflowState, ctx: &RunContext) -> anyhow::Result<String>;
}

/// Executes stages in order, failing fast and reporting to the registry.
pub struct PipelineOrchestrator {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineOrchestrator {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_keys(&self) -> Vec<StageKey> {
        self.stages.iter().map(|s| s.key()).collect()
    }

    /// Execute one run to completion or first failure.
    ///
    /// The `Err` branch covers registry bookkeeping bugs only; stage
    /// and validation failures are terminal run states, not errors.
    pub async fn run(&self, ctx: &RunContext, registry: &RunRegistry) -> anyhow::Result<()> {
        registry.mark_started(ctx.run_id).await;
        info!(run_id = %ctx.run_id, stages = self.stages.len(), "Run started");
        let run_started = Instant::now();

        let mut state = WorkflowState::new();
        let mut reports: Vec<StageReport> = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let key = stage.key();
            registry.mark_running(ctx.run_id, key).await;
            info!(run_id = %ctx.run_id, stage = %key, "Stage started");
            let stage_started = Instant::now();

            let outcome = match stage.run(&state, ctx).await {
                Ok(raw_text) => validate_stage(key, &raw_text),
                Err(e) => Err(StageFailure::ExternalStage {
                    error: format!("{e:#}"),
                }),
            };
            let duration_ms = stage_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(record) => {
                    consumer_checks(ctx, &record);
                    state.insert(record)?;
                    info!(
                        run_id = %ctx.run_id,
                        stage = %key,
                        duration_ms,
                        "Stage completed"
                    );
                    reports.push(StageReport {
                        stage: key,
                        status: "ok",
                        failure: None,
                        duration_ms,
                    });
                }
                Err(failure) => {
                    error!(
                        run_id = %ctx.run_id,
                        stage = %key,
                        kind = failure.kind(),
                        duration_ms,
                        error = %failure,
                        "Stage failed, aborting run"
                    );
                    reports.push(StageReport {
                        stage: key,
                        status: "failed",
                        failure: Some(failure.clone()),
                        duration_ms,
                    });
                    registry
                        .finish(
                            ctx.run_id,
                            RunState::StageFailed {
                                stage: key,
                                failure,
                            },
                            reports,
                            state,
                        )
                        .await;
                    return Ok(());
                }
            }
        }

        info!(
            run_id = %ctx.run_id,
            duration_ms = run_started.elapsed().as_millis() as u64,
            "Run completed"
        );
        registry
            .finish(ctx.run_id, RunState::Completed, reports, state)
            .await;
        Ok(())
    }
}

/// Cross-field checks that downstream consumers care about but that do
/// not fail the run; mismatches are surfaced in logs only.
fn consumer_checks(ctx: &RunContext, record: &StageRecord) {
    match record {
        StageRecord::RiskAssessment(assessment) => {
            if assessment.is_over_drawdown_limit != assessment.derived_over_drawdown() {
                warn!(
                    run_id = %ctx.run_id,
                    current_drawdown = assessment.current_drawdown,
                    max_drawdown_limit = assessment.max_drawdown_limit,
                    reported = assessment.is_over_drawdown_limit,
                    "Drawdown flag disagrees with its derivation"
                );
            }
        }
        StageRecord::DecisionPlan(plan) => {
            if plan.decision_action == DecisionAction::Hold && !plan.trades.is_empty() {
                warn!(
                    run_id = %ctx.run_id,
                    trades = plan.trades.len(),
                    "HOLD decision carries trades"
                );
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Stage that replies with a canned text and records invocations.
    struct CannedStage {
        key: StageKey,
        reply: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Stage for CannedStage {
        fn key(&self) -> StageKey {
            self.key
        }

        async fn run(&self, _state: &WorkflowState, _ctx: &RunContext) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    /// Stage whose transport fails outright.
    struct BrokenStage {
        key: StageKey,
    }

    #[async_trait]
    impl Stage for BrokenStage {
        fn key(&self) -> StageKey {
            self.key
        }

        async fn run(&self, _state: &WorkflowState, _ctx: &RunContext) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn ctx() -> RunContext {
        RunContext {
            run_id: Uuid::new_v4(),
            daily_message: "run the daily workflow".into(),
        }
    }

    fn snapshot_reply() -> String {
        r#"```json
{"account_id": "DUO316496", "positions": [], "total_market_value": 0.0, "cash": 100.0}
```"#
            .to_string()
    }

    fn analysis_reply() -> String {
        r#"{"market_trend": "NEUTRAL", "positions_data": [], "market_summary": "calm"}"#.into()
    }

    #[tokio::test]
    async fn test_two_stage_run_completes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = PipelineOrchestrator::new(vec![
            Box::new(CannedStage {
                key: StageKey::PortfolioSnapshot,
                reply: snapshot_reply(),
                calls: calls.clone(),
            }),
            Box::new(CannedStage {
                key: StageKey::MarketAnalysis,
                reply: analysis_reply(),
                calls: calls.clone(),
            }),
        ]);
        let registry = RunRegistry::new();
        let ctx = ctx();
        registry.enqueue(ctx.run_id).await;

        orchestrator.run(&ctx, &registry).await.unwrap();

        let report = registry.get(ctx.run_id).await.unwrap();
        assert_eq!(report.status, RunState::Completed);
        assert_eq!(report.stages.len(), 2);
        assert!(report.stages.iter().all(|s| s.status == "ok"));
        assert_eq!(
            report.state.keys(),
            vec![StageKey::PortfolioSnapshot, StageKey::MarketAnalysis]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_later_stages() {
        let later_calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = PipelineOrchestrator::new(vec![
            Box::new(CannedStage {
                key: StageKey::PortfolioSnapshot,
                reply: "no data today, sorry".into(),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(CannedStage {
                key: StageKey::MarketAnalysis,
                reply: analysis_reply(),
                calls: later_calls.clone(),
            }),
        ]);
        let registry = RunRegistry::new();
        let ctx = ctx();
        registry.enqueue(ctx.run_id).await;

        orchestrator.run(&ctx, &registry).await.unwrap();

        let report = registry.get(ctx.run_id).await.unwrap();
        match &report.status {
            RunState::StageFailed { stage, failure } => {
                assert_eq!(*stage, StageKey::PortfolioSnapshot);
                assert_eq!(failure.kind(), "no_structure_found");
            }
            other => panic!("wrong status: {other:?}"),
        }
        assert_eq!(report.stages.len(), 1);
        assert!(report.state.is_empty());
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_external_stage() {
        let orchestrator = PipelineOrchestrator::new(vec![Box::new(BrokenStage {
            key: StageKey::PortfolioSnapshot,
        })]);
        let registry = RunRegistry::new();
        let ctx = ctx();
        registry.enqueue(ctx.run_id).await;

        orchestrator.run(&ctx, &registry).await.unwrap();

        let report = registry.get(ctx.run_id).await.unwrap();
        match &report.status {
            RunState::StageFailed { failure, .. } => {
                assert_eq!(failure.kind(), "external_stage");
                assert!(failure.to_string().contains("connection refused"));
            }
            other => panic!("wrong status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_partial_state_preserved_on_failure() {
        let orchestrator = PipelineOrchestrator::new(vec![
            Box::new(CannedStage {
                key: StageKey::PortfolioSnapshot,
                reply: snapshot_reply(),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(BrokenStage {
                key: StageKey::MarketAnalysis,
            }),
        ]);
        let registry = RunRegistry::new();
        let ctx = ctx();
        registry.enqueue(ctx.run_id).await;

        orchestrator.run(&ctx, &registry).await.unwrap();

        let report = registry.get(ctx.run_id).await.unwrap();
        assert!(matches!(report.status, RunState::StageFailed { .. }));
        assert_eq!(report.state.keys(), vec![StageKey::PortfolioSnapshot]);
        assert_eq!(
            report.state.portfolio_snapshot().unwrap().account_id,
            "DUO316496"
        );
    }
}
