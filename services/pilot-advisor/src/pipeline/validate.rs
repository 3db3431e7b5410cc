//! Stage output validation.
//!
//! Takes the raw text an agent produced for a stage and turns it into a
//! typed [`StageRecord`], or a [`StageFailure`] explaining exactly what
//! went wrong. Failures carry a bounded preview of the offending text
//! so a run report stays readable even when an agent dumps pages of
//! prose.

use pilot_common::ValidationError;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::models::{
    DecisionPlan, ExecutionSummary, MarketAnalysis, PortfolioSnapshot, RiskAssessment, StageKey,
    StageRecord, ValidateRecord,
};
use crate::pipeline::extract::extract_payload;

/// Maximum characters of raw text carried in a failure preview.
pub const PREVIEW_LIMIT: usize = 500;

/// Why a stage's output was rejected.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    /// No fenced block, brace span, or parseable text was found.
    #[error("no JSON structure found in agent output")]
    NoStructureFound { preview: String },

    /// A candidate payload was located but is not valid JSON.
    #[error("agent output is not valid JSON: {error}")]
    MalformedPayload { error: String, preview: String },

    /// The JSON parsed but does not satisfy the record's schema.
    #[error("{record} schema violated ({} violation(s))", .violations.len())]
    SchemaViolation {
        record: &'static str,
        violations: Vec<ValidationError>,
    },

    /// The stage's agent call itself failed (transport, timeout).
    #[error("stage execution failed: {error}")]
    ExternalStage { error: String },
}

impl StageFailure {
    /// Short machine-readable discriminant for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoStructureFound { .. } => "no_structure_found",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::ExternalStage { .. } => "external_stage",
        }
    }
}

/// Bounded preview of raw agent text, on a char boundary.
fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_LIMIT {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(PREVIEW_LIMIT).collect();
        cut.push_str("...");
        cut
    }
}

/// Validate raw agent output into the typed record for `key`.
///
/// Runs the extract / parse / decode / invariant-check cascade and
/// classifies the first step that fails. Invariant checks collect every
/// violation instead of stopping at the first.
pub fn validate_stage(key: StageKey, raw_text: &str) -> Result<StageRecord, StageFailure> {
    let payload = extract_payload(raw_text).ok_or_else(|| StageFailure::NoStructureFound {
        preview: preview(raw_text),
    })?;

    let value: serde_json::Value =
        serde_json::from_str(&payload).map_err(|e| StageFailure::MalformedPayload {
            error: e.to_string(),
            preview: preview(&payload),
        })?;

    let record = decode_record(key, value).map_err(|e| StageFailure::SchemaViolation {
        record: key.record_type(),
        violations: vec![ValidationError::InvalidValue {
            field: key.record_type().to_string(),
            reason: e.to_string(),
        }],
    })?;

    let mut violations = Vec::new();
    record.check(&mut violations);
    if !violations.is_empty() {
        return Err(StageFailure::SchemaViolation {
            record: key.record_type(),
            violations,
        });
    }

    info!(
        stage = %key,
        record = record.record_type(),
        "Stage output validated"
    );
    Ok(record)
}

fn decode_record(key: StageKey, value: serde_json::Value) -> serde_json::Result<StageRecord> {
    Ok(match key {
        StageKey::PortfolioSnapshot => {
            StageRecord::PortfolioSnapshot(serde_json::from_value::<PortfolioSnapshot>(value)?)
        }
        StageKey::MarketAnalysis => {
            StageRecord::MarketAnalysis(serde_json::from_value::<MarketAnalysis>(value)?)
        }
        StageKey::RiskAssessment => {
            StageRecord::RiskAssessment(serde_json::from_value::<RiskAssessment>(value)?)
        }
        StageKey::DecisionPlan => {
            StageRecord::DecisionPlan(serde_json::from_value::<DecisionPlan>(value)?)
        }
        StageKey::ExecutionSummary => {
            StageRecord::ExecutionSummary(serde_json::from_value::<ExecutionSummary>(value)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_text() -> String {
        r#"Here is today's portfolio:
```json
{
    "account_id": "DUO316496",
    "positions": [
        {"symbol": "AAPL", "quantity": 50, "market_value": 11500.0}
    ],
    "total_market_value": 11500.0,
    "cash": 20000.0
}
```
Let me know if you need anything else."#
            .to_string()
    }

    #[test]
    fn test_valid_snapshot_decodes() {
        let record = validate_stage(StageKey::PortfolioSnapshot, &snapshot_text()).unwrap();
        match record {
            StageRecord::PortfolioSnapshot(snapshot) => {
                assert_eq!(snapshot.account_id, "DUO316496");
                assert_eq!(snapshot.positions.len(), 1);
                assert_eq!(snapshot.positions[0].quantity, 50.0);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_missing_timestamp_is_defaulted() {
        // snapshot_text carries no timestamp field
        let record = validate_stage(StageKey::PortfolioSnapshot, &snapshot_text()).unwrap();
        assert_eq!(record.key(), StageKey::PortfolioSnapshot);
    }

    #[test]
    fn test_prose_only_is_no_structure() {
        let failure =
            validate_stage(StageKey::MarketAnalysis, "Sorry, the data feed is down today.")
                .unwrap_err();
        assert!(matches!(failure, StageFailure::NoStructureFound { .. }));
        assert_eq!(failure.kind(), "no_structure_found");
    }

    #[test]
    fn test_malformed_json_reports_parse_error() {
        let failure =
            validate_stage(StageKey::DecisionPlan, "```json\n{\"decision_action\": }\n```")
                .unwrap_err();
        match failure {
            StageFailure::MalformedPayload { error, preview } => {
                assert!(!error.is_empty());
                assert!(preview.contains("decision_action"));
            }
            other => panic!("wrong failure: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_shape_is_schema_violation() {
        // Valid JSON, but a risk assessment is not a decision plan
        let failure = validate_stage(StageKey::DecisionPlan, "{\"current_drawdown\": 5.0}")
            .unwrap_err();
        match failure {
            StageFailure::SchemaViolation { record, violations } => {
                assert_eq!(record, "DecisionPlan");
                assert_eq!(violations.len(), 1);
            }
            other => panic!("wrong failure: {other:?}"),
        }
    }

    #[test]
    fn test_invariant_violations_are_collected() {
        let text = r#"{
            "decision_action": "REBALANCE",
            "rationale": "shift exposure",
            "trades": [
                {"symbol": "", "action": "BUY", "quantity": 0},
                {"symbol": "AAPL", "action": "SELL", "quantity": -5}
            ]
        }"#;
        let failure = validate_stage(StageKey::DecisionPlan, text).unwrap_err();
        match failure {
            StageFailure::SchemaViolation { record, violations } => {
                assert_eq!(record, "DecisionPlan");
                // empty symbol + zero quantity + negative quantity
                assert_eq!(violations.len(), 3);
            }
            other => panic!("wrong failure: {other:?}"),
        }
    }

    #[test]
    fn test_extreme_execution_totals_fail_as_values() {
        let text = format!(
            r#"{{
                "account_id": "DUO316496",
                "execution_status": "FAILED",
                "orders": [],
                "total_submitted": 0,
                "total_successful": {},
                "total_failed": 1
            }}"#,
            usize::MAX
        );
        let failure = validate_stage(StageKey::ExecutionSummary, &text).unwrap_err();
        match failure {
            StageFailure::SchemaViolation { record, violations } => {
                assert_eq!(record, "ExecutionSummary");
                assert!(!violations.is_empty());
            }
            other => panic!("wrong failure: {other:?}"),
        }
    }

    #[test]
    fn test_preview_is_bounded() {
        let long = "x".repeat(5 * PREVIEW_LIMIT);
        let failure = validate_stage(StageKey::ExecutionSummary, &long).unwrap_err();
        match failure {
            StageFailure::NoStructureFound { preview } => {
                assert_eq!(preview.chars().count(), PREVIEW_LIMIT + 3);
                assert!(preview.ends_with("..."));
            }
            other => panic!("wrong failure: {other:?}"),
        }
    }

    #[test]
    fn test_failure_serializes_with_kind_tag() {
        let failure = StageFailure::NoStructureFound {
            preview: "hello".into(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "no_structure_found");
        assert_eq!(json["preview"], "hello");
    }
}
