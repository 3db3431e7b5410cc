//! Typed records exchanged between pipeline stages.
//!
//! Each stage of the daily workflow produces one of these records. They
//! are decoded from untrusted agent output by the stage validator and
//! are immutable once validated. Field-level invariants live in
//! [`ValidateRecord`], which collects every violation instead of
//! stopping at the first one.

use chrono::{DateTime, Utc};
use pilot_common::ValidationError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Stage identity
// ============================================================================

/// Identity of a pipeline stage, in fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKey {
    PortfolioSnapshot,
    MarketAnalysis,
    RiskAssessment,
    DecisionPlan,
    ExecutionSummary,
}

impl StageKey {
    /// All stages in pipeline order.
    pub const ALL: [StageKey; 5] = [
        Self::PortfolioSnapshot,
        Self::MarketAnalysis,
        Self::RiskAssessment,
        Self::DecisionPlan,
        Self::ExecutionSummary,
    ];

    /// Stable string key, used in workflow state and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PortfolioSnapshot => "portfolio_snapshot",
            Self::MarketAnalysis => "market_analysis",
            Self::RiskAssessment => "risk_assessment",
            Self::DecisionPlan => "decision_plan",
            Self::ExecutionSummary => "execution_summary",
        }
    }

    /// Name of the record type this stage produces.
    pub fn record_type(&self) -> &'static str {
        match self {
            Self::PortfolioSnapshot => "PortfolioSnapshot",
            Self::MarketAnalysis => "MarketAnalysis",
            Self::RiskAssessment => "RiskAssessment",
            Self::DecisionPlan => "DecisionPlan",
            Self::ExecutionSummary => "ExecutionSummary",
        }
    }
}

impl std::fmt::Display for StageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Portfolio snapshot
// ============================================================================

/// Individual position in the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Stock ticker symbol (e.g. AAPL)
    pub symbol: String,
    /// Number of shares held; negative means short
    pub quantity: f64,
    /// Current market value in account currency
    pub market_value: f64,
    /// Average cost per share
    #[serde(default)]
    pub average_cost: Option<f64>,
    /// Unrealized profit/loss
    #[serde(default)]
    pub unrealized_pnl: Option<f64>,
    /// Unrealized PnL as a percentage
    #[serde(default)]
    pub unrealized_pnl_percent: Option<f64>,
    /// Sector classification
    #[serde(default)]
    pub sector: Option<String>,
}

/// Account holdings at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub account_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub positions: Vec<Position>,
    pub total_market_value: f64,
    pub cash: f64,
    #[serde(default)]
    pub buying_power: Option<f64>,
    #[serde(default)]
    pub realized_pnl: Option<f64>,
    #[serde(default)]
    pub unrealized_pnl: Option<f64>,
}

// ============================================================================
// Market analysis
// ============================================================================

/// Overall market trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketCondition {
    #[serde(rename = "BULL")]
    Bull,
    #[serde(rename = "BEAR")]
    Bear,
    #[serde(rename = "NEUTRAL")]
    Neutral,
}

/// Market data for a single position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionMarketData {
    pub symbol: String,
    pub current_price: f64,
    #[serde(default)]
    pub volatility_30d: Option<f64>,
    #[serde(default)]
    pub trend_30d: Option<f64>,
    #[serde(default)]
    pub trend_60d: Option<f64>,
    #[serde(default)]
    pub trend_90d: Option<f64>,
    #[serde(default)]
    pub sector: Option<String>,
}

/// Market and volatility read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub vix_level: Option<f64>,
    /// VIX interpretation (Low/Normal/High/Extreme)
    #[serde(default)]
    pub vix_interpretation: Option<String>,
    pub market_trend: MarketCondition,
    #[serde(default)]
    pub positions_data: Vec<PositionMarketData>,
    #[serde(default)]
    pub market_summary: String,
}

// ============================================================================
// Risk assessment
// ============================================================================

/// Risk level classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

/// Risk read for a single position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRisk {
    pub symbol: String,
    /// Position concentration as % of portfolio
    pub concentration_percent: f64,
    pub is_over_concentrated: bool,
    pub at_stop_loss: bool,
    pub at_take_profit: bool,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub recommendation: Option<String>,
}

/// Portfolio-level risk read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Current drawdown (%)
    pub current_drawdown: f64,
    /// Maximum allowed drawdown (%)
    pub max_drawdown_limit: f64,
    pub is_over_drawdown_limit: bool,
    #[serde(default)]
    pub total_exposure: f64,
    #[serde(default)]
    pub positions_risk: Vec<PositionRisk>,
    pub overall_risk_level: RiskLevel,
    #[serde(default)]
    pub risk_summary: String,
}

impl RiskAssessment {
    /// The drawdown flag the upstream generator should have derived.
    ///
    /// Consumer-checked: a mismatch is logged by the orchestrator, not
    /// rejected by the schema.
    pub fn derived_over_drawdown(&self) -> bool {
        self.current_drawdown > self.max_drawdown_limit
    }
}

// ============================================================================
// Decision plan
// ============================================================================

/// Overall decision action for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Hold,
    Reinforce,
    Rotate,
    CutLosers,
    Rebalance,
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// One order intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub action: TradeAction,
    /// Number of shares, strictly positive
    pub quantity: i64,
    /// Limit price; market order when absent
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub rationale: String,
}

/// Trading decision for the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPlan {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub decision_action: DecisionAction,
    pub rationale: String,
    #[serde(default)]
    pub trades: Vec<Trade>,
    #[serde(default)]
    pub expected_outcome: Option<String>,
    #[serde(default)]
    pub risk_considerations: Option<String>,
}

// ============================================================================
// Execution summary
// ============================================================================

/// Per-order execution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderOutcome {
    Submitted,
    Filled,
    Rejected,
    Failed,
}

/// Status of one submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: i64,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub order_id: Option<String>,
    pub status: OrderOutcome,
    #[serde(default)]
    pub message: String,
}

/// Post-trade report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub account_id: String,
    /// Overall status (COMPLETED/PARTIAL/NONE/FAILED)
    pub execution_status: String,
    #[serde(default)]
    pub orders: Vec<OrderStatus>,
    #[serde(default)]
    pub total_submitted: usize,
    #[serde(default)]
    pub total_successful: usize,
    #[serde(default)]
    pub total_failed: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub estimated_portfolio_value: Option<f64>,
}

// ============================================================================
// Tagged record union
// ============================================================================

/// A validated stage output, tagged by stage identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageRecord {
    PortfolioSnapshot(PortfolioSnapshot),
    MarketAnalysis(MarketAnalysis),
    RiskAssessment(RiskAssessment),
    DecisionPlan(DecisionPlan),
    ExecutionSummary(ExecutionSummary),
}

impl StageRecord {
    /// The stage this record belongs to.
    pub fn key(&self) -> StageKey {
        match self {
            Self::PortfolioSnapshot(_) => StageKey::PortfolioSnapshot,
            Self::MarketAnalysis(_) => StageKey::MarketAnalysis,
            Self::RiskAssessment(_) => StageKey::RiskAssessment,
            Self::DecisionPlan(_) => StageKey::DecisionPlan,
            Self::ExecutionSummary(_) => StageKey::ExecutionSummary,
        }
    }

    /// Name of the concrete record type.
    pub fn record_type(&self) -> &'static str {
        self.key().record_type()
    }
}

// ============================================================================
// Record invariants
// ============================================================================

/// Field-level invariant checks for a stage record.
///
/// Implementations push one [`ValidationError`] per violation; an empty
/// vec after `check` means the record is structurally sound.
pub trait ValidateRecord {
    fn check(&self, violations: &mut Vec<ValidationError>);
}

impl ValidateRecord for PortfolioSnapshot {
    fn check(&self, violations: &mut Vec<ValidationError>) {
        if self.account_id.is_empty() {
            violations.push(ValidationError::MissingField {
                field: "account_id".into(),
            });
        }
        if self.total_market_value < 0.0 {
            violations.push(ValidationError::InvalidValue {
                field: "total_market_value".into(),
                reason: format!("must be >= 0, got {}", self.total_market_value),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for (index, position) in self.positions.iter().enumerate() {
            if position.symbol.is_empty() {
                violations.push(ValidationError::InvalidValue {
                    field: format!("positions[{index}].symbol"),
                    reason: "must not be empty".into(),
                });
            } else if !seen.insert(position.symbol.as_str()) {
                violations.push(ValidationError::InvalidValue {
                    field: format!("positions[{index}].symbol"),
                    reason: format!("duplicate symbol '{}' in snapshot", position.symbol),
                });
            }
        }
    }
}

impl ValidateRecord for MarketAnalysis {
    fn check(&self, violations: &mut Vec<ValidationError>) {
        for (index, data) in self.positions_data.iter().enumerate() {
            if data.symbol.is_empty() {
                violations.push(ValidationError::InvalidValue {
                    field: format!("positions_data[{index}].symbol"),
                    reason: "must not be empty".into(),
                });
            }
        }
    }
}

impl ValidateRecord for RiskAssessment {
    fn check(&self, _violations: &mut Vec<ValidationError>) {
        // The drawdown derivation is consumer-checked (see orchestrator),
        // so nothing is hard-enforced beyond the schema shape.
    }
}

impl ValidateRecord for DecisionPlan {
    fn check(&self, violations: &mut Vec<ValidationError>) {
        for (index, trade) in self.trades.iter().enumerate() {
            if trade.symbol.is_empty() {
                violations.push(ValidationError::InvalidValue {
                    field: format!("trades[{index}].symbol"),
                    reason: "must not be empty".into(),
                });
            }
            if trade.quantity <= 0 {
                violations.push(ValidationError::InvalidValue {
                    field: format!("trades[{index}].quantity"),
                    reason: format!("must be strictly positive, got {}", trade.quantity),
                });
            }
        }
    }
}

impl ValidateRecord for ExecutionSummary {
    fn check(&self, violations: &mut Vec<ValidationError>) {
        if self.account_id.is_empty() {
            violations.push(ValidationError::MissingField {
                field: "account_id".into(),
            });
        }
        if self.total_submitted != self.orders.len() {
            violations.push(ValidationError::InvalidValue {
                field: "total_submitted".into(),
                reason: format!(
                    "must equal orders length {}, got {}",
                    self.orders.len(),
                    self.total_submitted
                ),
            });
        }
        // checked_add: both counts come from untrusted JSON
        let accounted = self.total_successful.checked_add(self.total_failed);
        if accounted.map_or(true, |sum| sum > self.total_submitted) {
            violations.push(ValidationError::InvalidValue {
                field: "total_successful".into(),
                reason: format!(
                    "successful ({}) + failed ({}) exceeds submitted ({})",
                    self.total_successful, self.total_failed, self.total_submitted
                ),
            });
        }
    }
}

impl ValidateRecord for StageRecord {
    fn check(&self, violations: &mut Vec<ValidationError>) {
        match self {
            Self::PortfolioSnapshot(r) => r.check(violations),
            Self::MarketAnalysis(r) => r.check(violations),
            Self::RiskAssessment(r) => r.check(violations),
            Self::DecisionPlan(r) => r.check(violations),
            Self::ExecutionSummary(r) => r.check(violations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn snapshot_fixture() -> PortfolioSnapshot {
        PortfolioSnapshot {
            account_id: "DUO316496".into(),
            timestamp: Utc::now(),
            positions: vec![
                Position {
                    symbol: "AAPL".into(),
                    quantity: 50.0,
                    market_value: 11_500.0,
                    average_cost: Some(180.0),
                    unrealized_pnl: Some(2_500.0),
                    unrealized_pnl_percent: Some(27.7),
                    sector: Some("Technology".into()),
                },
                Position {
                    symbol: "MSFT".into(),
                    quantity: -10.0,
                    market_value: -4_200.0,
                    average_cost: None,
                    unrealized_pnl: None,
                    unrealized_pnl_percent: None,
                    sector: None,
                },
            ],
            total_market_value: 7_300.0,
            cash: 20_000.0,
            buying_power: Some(40_000.0),
            realized_pnl: None,
            unrealized_pnl: Some(2_500.0),
        }
    }

    #[test]
    fn test_stage_key_order_and_names() {
        assert_eq!(StageKey::ALL.len(), 5);
        assert_eq!(StageKey::ALL[0], StageKey::PortfolioSnapshot);
        assert_eq!(StageKey::ALL[4], StageKey::ExecutionSummary);
        assert_eq!(StageKey::RiskAssessment.as_str(), "risk_assessment");
        assert_eq!(StageKey::DecisionPlan.record_type(), "DecisionPlan");
    }

    #[test]
    fn test_valid_snapshot_has_no_violations() {
        let mut violations = Vec::new();
        snapshot_fixture().check(&mut violations);
        assert!(violations.is_empty(), "unexpected: {violations:?}");
    }

    #[test]
    fn test_short_positions_allowed_but_duplicates_rejected() {
        let mut snapshot = snapshot_fixture();
        snapshot.positions[1].symbol = "AAPL".into();

        let mut violations = Vec::new();
        snapshot.check(&mut violations);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].to_string().contains("duplicate symbol"));
    }

    #[test]
    fn test_negative_total_market_value_rejected() {
        let mut snapshot = snapshot_fixture();
        snapshot.total_market_value = -1.0;

        let mut violations = Vec::new();
        snapshot.check(&mut violations);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_trade_quantity_must_be_positive() {
        let plan = DecisionPlan {
            timestamp: Utc::now(),
            decision_action: DecisionAction::Rebalance,
            rationale: "rebalance into winners".into(),
            trades: vec![Trade {
                symbol: "AAPL".into(),
                action: TradeAction::Buy,
                quantity: 0,
                limit_price: None,
                rationale: String::new(),
            }],
            expected_outcome: None,
            risk_considerations: None,
        };

        let mut violations = Vec::new();
        plan.check(&mut violations);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].to_string().contains("trades[0].quantity"));
    }

    #[test]
    fn test_execution_totals_invariants() {
        let summary = ExecutionSummary {
            timestamp: Utc::now(),
            account_id: "DUO316496".into(),
            execution_status: "PARTIAL".into(),
            orders: vec![OrderStatus {
                symbol: "AAPL".into(),
                action: TradeAction::Sell,
                quantity: 10,
                limit_price: None,
                order_id: Some("o-1".into()),
                status: OrderOutcome::Filled,
                message: "filled".into(),
            }],
            total_submitted: 1,
            total_successful: 1,
            total_failed: 1,
            errors: vec![],
            estimated_portfolio_value: None,
        };

        let mut violations = Vec::new();
        summary.check(&mut violations);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].to_string().contains("exceeds submitted"));
    }

    #[test]
    fn test_execution_totals_near_usize_max_rejected_without_panic() {
        let summary = ExecutionSummary {
            timestamp: Utc::now(),
            account_id: "DUO316496".into(),
            execution_status: "FAILED".into(),
            orders: vec![],
            total_submitted: 0,
            total_successful: usize::MAX,
            total_failed: 1,
            errors: vec![],
            estimated_portfolio_value: None,
        };

        let mut violations = Vec::new();
        summary.check(&mut violations);
        assert!(violations
            .iter()
            .any(|v| v.to_string().contains("exceeds submitted")));
    }

    #[test]
    fn test_enum_wire_format() {
        assert_eq!(
            serde_json::to_string(&MarketCondition::Bull).unwrap(),
            "\"BULL\""
        );
        assert_eq!(
            serde_json::to_string(&DecisionAction::CutLosers).unwrap(),
            "\"CUT_LOSERS\""
        );
        assert_eq!(serde_json::to_string(&RiskLevel::Moderate).unwrap(), "\"MODERATE\"");
        assert_eq!(serde_json::to_string(&OrderOutcome::Rejected).unwrap(), "\"REJECTED\"");

        let trend: MarketCondition = serde_json::from_str("\"NEUTRAL\"").unwrap();
        assert_eq!(trend, MarketCondition::Neutral);
    }

    #[test]
    fn test_drawdown_derivation_helper() {
        let assessment = RiskAssessment {
            timestamp: Utc::now(),
            current_drawdown: 18.0,
            max_drawdown_limit: 15.0,
            is_over_drawdown_limit: false,
            total_exposure: 100.0,
            positions_risk: vec![],
            overall_risk_level: RiskLevel::High,
            risk_summary: String::new(),
        };
        assert!(assessment.derived_over_drawdown());
        assert_ne!(assessment.is_over_drawdown_limit, assessment.derived_over_drawdown());
    }
}
