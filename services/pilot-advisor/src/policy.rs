//! Investment policy loading.
//!
//! The policy is a YAML file describing the investor profile and risk
//! limits. It is re-read at the start of every run as a pre-flight
//! check, so edits take effect on the next trigger without a restart,
//! and a broken policy file blocks the run before any agent is called.

use std::path::Path;

use pilot_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fallback risk tolerance when the policy omits it.
const DEFAULT_RISK_TOLERANCE: &str = "moderate";
/// Fallback risk limits, in percent.
const DEFAULT_MAX_DRAWDOWN: f64 = 15.0;
const DEFAULT_MAX_POSITION: f64 = 20.0;
const DEFAULT_STOP_LOSS: f64 = -10.0;
const DEFAULT_TAKE_PROFIT: f64 = 50.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestorProfile {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub risk_tolerance: Option<String>,
    #[serde(default)]
    pub investment_horizon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskManagement {
    #[serde(default)]
    pub max_drawdown_percent: Option<f64>,
    #[serde(default)]
    pub max_position_concentration_percent: Option<f64>,
    #[serde(default)]
    pub stop_loss_percent: Option<f64>,
    #[serde(default)]
    pub take_profit_percent: Option<f64>,
}

/// Parsed investment policy. Every section is optional; accessors fall
/// back to the documented defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestmentPolicy {
    #[serde(default)]
    pub policy_metadata: PolicyMetadata,
    #[serde(default)]
    pub investor_profile: InvestorProfile,
    #[serde(default)]
    pub risk_management: RiskManagement,
}

impl InvestmentPolicy {
    pub fn account_id(&self) -> &str {
        &self.investor_profile.account_id
    }

    pub fn risk_tolerance(&self) -> &str {
        self.investor_profile
            .risk_tolerance
            .as_deref()
            .unwrap_or(DEFAULT_RISK_TOLERANCE)
    }

    pub fn max_drawdown_percent(&self) -> f64 {
        self.risk_management
            .max_drawdown_percent
            .unwrap_or(DEFAULT_MAX_DRAWDOWN)
    }

    pub fn max_position_concentration_percent(&self) -> f64 {
        self.risk_management
            .max_position_concentration_percent
            .unwrap_or(DEFAULT_MAX_POSITION)
    }

    pub fn stop_loss_percent(&self) -> f64 {
        self.risk_management
            .stop_loss_percent
            .unwrap_or(DEFAULT_STOP_LOSS)
    }

    pub fn take_profit_percent(&self) -> f64 {
        self.risk_management
            .take_profit_percent
            .unwrap_or(DEFAULT_TAKE_PROFIT)
    }

    /// The instruction sent to every stage of the daily run.
    pub fn daily_workflow_message(&self) -> String {
        format!(
            "Execute the daily portfolio workflow for account {} under policy '{}'. \
             Risk tolerance {}, max drawdown {}%, max position concentration {}%, \
             stop loss {}%, take profit {}%.",
            self.account_id(),
            self.policy_metadata.name,
            self.risk_tolerance(),
            self.max_drawdown_percent(),
            self.max_position_concentration_percent(),
            self.stop_loss_percent(),
            self.take_profit_percent(),
        )
    }
}

/// Load and parse the policy file.
///
/// Both a missing file and a YAML parse failure are [`Error::PolicyLoad`],
/// which the trigger endpoint maps to a pre-flight rejection.
pub fn load_policy(path: impl AsRef<Path>) -> Result<InvestmentPolicy> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::PolicyLoad(format!("cannot read policy at {}: {e}", path.display()))
    })?;

    let policy: InvestmentPolicy = serde_yaml::from_str(&content).map_err(|e| {
        Error::PolicyLoad(format!("cannot parse policy at {}: {e}", path.display()))
    })?;

    info!(
        policy = %policy.policy_metadata.name,
        version = %policy.policy_metadata.version,
        account_id = %policy.account_id(),
        "Investment policy loaded"
    );
    Ok(policy)
}
