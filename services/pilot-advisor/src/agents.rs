//! HTTP bridge to the agent service and the agent-backed stages.
//!
//! Each pipeline stage maps to one named agent on the shared agent
//! endpoint. The bridge owns the HTTP client, per-call timeout, and a
//! bounded retry loop for transient transport failures; agent replies
//! come back as free-form text for the validator to digest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pilot_common::config::AgentsConfig;
use pilot_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::StageKey;
use crate::pipeline::orchestrator::{RunContext, Stage};
use crate::pipeline::state::WorkflowState;

/// User identity sent with every agent call.
const BRIDGE_USER_ID: &str = "pilot-advisor";

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    user_id: &'a str,
    agent: &'a str,
    message: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    content: String,
}

/// Client for the agent service's chat API.
pub struct AgentBridge {
    client: reqwest::Client,
    endpoint: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AgentBridge {
    pub fn new(config: &AgentsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
        })
    }

    /// Send one message to a named agent, retrying transient failures.
    pub async fn chat(&self, agent: &str, message: &str) -> Result<String> {
        let url = format!("{}/api/v1/chat", self.endpoint);
        let request = AgentRequest {
            user_id: BRIDGE_USER_ID,
            agent,
            message,
            stream: false,
        };

        let mut last_error = Error::External(format!("agent '{agent}' unreachable"));
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Linear backoff between attempts
                tokio::time::sleep(self.retry_backoff * attempt).await;
                warn!(agent = %agent, attempt, "Retrying agent call");
            }

            match self.client.post(&url).json(&request).send().await {
                Ok(response) if response.status().is_success() => {
                    let body: AgentResponse = response
                        .json()
                        .await
                        .map_err(|e| Error::External(format!("agent reply decode: {e}")))?;
                    debug!(agent = %agent, chars = body.content.len(), "Agent replied");
                    return Ok(body.content);
                }
                Ok(response) => {
                    last_error = Error::External(format!(
                        "agent '{agent}' returned HTTP {}",
                        response.status()
                    ));
                }
                Err(e) if e.is_timeout() => {
                    last_error = Error::Timeout;
                }
                Err(e) => {
                    last_error = Error::External(format!("agent '{agent}' call failed: {e}"));
                }
            }
        }

        Err(last_error)
    }

    /// Probe the agent service's health endpoint.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// A pipeline stage backed by one named agent.
pub struct AgentStage {
    key: StageKey,
    agent: &'static str,
    bridge: Arc<AgentBridge>,
}

impl AgentStage {
    pub fn new(key: StageKey, agent: &'static str, bridge: Arc<AgentBridge>) -> Self {
        Self { key, agent, bridge }
    }

    /// Compose the message for this stage: the daily instruction plus
    /// the validated outputs of every earlier stage as JSON context.
    fn compose_message(&self, state: &WorkflowState, ctx: &RunContext) -> anyhow::Result<String> {
        if state.is_empty() {
            return Ok(ctx.daily_message.clone());
        }
        let context = serde_json::to_string_pretty(state)?;
        Ok(format!(
            "{}\n\nContext from earlier workflow steps:\n{}",
            ctx.daily_message, context
        ))
    }
}

#[async_trait]
impl Stage for AgentStage {
    fn key(&self) -> StageKey {
        self.key
    }

    async fn run(&self, state: &WorkflowState, ctx: &RunContext) -> anyhow::Result<String> {
        let message = self.compose_message(state, ctx)?;
        let reply = self.bridge.chat(self.agent, &message).await?;
        Ok(reply)
    }
}

/// The standard daily pipeline: one agent-backed stage per record type.
pub fn default_stages(bridge: Arc<AgentBridge>) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(AgentStage::new(
            StageKey::PortfolioSnapshot,
            "portfolio_reader",
            bridge.clone(),
        )),
        Box::new(AgentStage::new(
            StageKey::MarketAnalysis,
            "market_reader",
            bridge.clone(),
        )),
        Box::new(AgentStage::new(
            StageKey::RiskAssessment,
            "portfolio_evaluator",
            bridge.clone(),
        )),
        Box::new(AgentStage::new(
            StageKey::DecisionPlan,
            "decision_maker",
            bridge.clone(),
        )),
        Box::new(AgentStage::new(
            StageKey::ExecutionSummary,
            "order_executor",
            bridge,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bridge_for(server: &MockServer) -> AgentBridge {
        AgentBridge::new(&AgentsConfig {
            endpoint: server.uri(),
            timeout_secs: 5,
            max_retries: 2,
            retry_backoff_secs: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_chat_sends_expected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat"))
            .and(body_partial_json(serde_json::json!({
                "user_id": "pilot-advisor",
                "agent": "portfolio_reader",
                "stream": false
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"content": "hello there"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = bridge_for(&server)
            .chat("portfolio_reader", "fetch the portfolio")
            .await
            .unwrap();
        assert_eq!(reply, "hello there");
    }

    #[tokio::test]
    async fn test_chat_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"content": "recovered"})),
            )
            .mount(&server)
            .await;

        let reply = bridge_for(&server)
            .chat("market_reader", "read the market")
            .await
            .unwrap();
        assert_eq!(reply, "recovered");
    }

    #[tokio::test]
    async fn test_chat_gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3) // initial + 2 retries
            .mount(&server)
            .await;

        let err = bridge_for(&server)
            .chat("order_executor", "execute")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(bridge_for(&server).health_check().await);
    }

    #[tokio::test]
    async fn test_stage_message_includes_prior_state() {
        use crate::models::{PortfolioSnapshot, StageRecord};
        use chrono::Utc;
        use uuid::Uuid;

        let server = MockServer::start().await;
        let stage = AgentStage::new(
            StageKey::MarketAnalysis,
            "market_reader",
            Arc::new(bridge_for(&server)),
        );

        let mut state = WorkflowState::new();
        state
            .insert(StageRecord::PortfolioSnapshot(PortfolioSnapshot {
                account_id: "DUO316496".into(),
                timestamp: Utc::now(),
                positions: vec![],
                total_market_value: 0.0,
                cash: 100.0,
                buying_power: None,
                realized_pnl: None,
                unrealized_pnl: None,
            }))
            .unwrap();
        let ctx = RunContext {
            run_id: Uuid::new_v4(),
            daily_message: "run the daily workflow".into(),
        };

        let message = stage.compose_message(&state, &ctx).unwrap();
        assert!(message.starts_with("run the daily workflow"));
        assert!(message.contains("portfolio_snapshot"));
        assert!(message.contains("DUO316496"));
    }

    #[test]
    fn test_default_stage_order() {
        let bridge = Arc::new(
            AgentBridge::new(&AgentsConfig {
                endpoint: "http://127.0.0.1:4400".into(),
                timeout_secs: 1,
                max_retries: 0,
                retry_backoff_secs: 0,
            })
            .unwrap(),
        );
        let stages = default_stages(bridge);
        let keys: Vec<StageKey> = stages.iter().map(|s| s.key()).collect();
        assert_eq!(keys, StageKey::ALL.to_vec());
    }
}
