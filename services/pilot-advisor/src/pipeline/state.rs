//! Append-only workflow state threaded through the pipeline.
//!
//! Each stage reads the records produced by earlier stages and appends
//! exactly one record of its own. Entries are never replaced, so a run
//! report shows exactly what each stage saw.

use serde::ser::SerializeMap;
use serde::Serialize;

use crate::models::{
    DecisionPlan, ExecutionSummary, MarketAnalysis, PortfolioSnapshot, RiskAssessment, StageKey,
    StageRecord,
};

/// Accumulated validated outputs of the pipeline, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    entries: Vec<(StageKey, StageRecord)>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage's validated record.
    ///
    /// Returns an error when the stage already produced a record; the
    /// state is append-only and one-record-per-stage.
    pub fn insert(&mut self, record: StageRecord) -> anyhow::Result<()> {
        let key = record.key();
        if self.get(key).is_some() {
            anyhow::bail!("stage '{key}' already recorded its output");
        }
        self.entries.push((key, record));
        Ok(())
    }

    pub fn get(&self, key: StageKey) -> Option<&StageRecord> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, record)| record)
    }

    /// Keys present, in insertion order.
    pub fn keys(&self) -> Vec<StageKey> {
        self.entries.iter().map(|(key, _)| *key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn portfolio_snapshot(&self) -> Option<&PortfolioSnapshot> {
        match self.get(StageKey::PortfolioSnapshot)? {
            StageRecord::PortfolioSnapshot(record) => Some(record),
            _ => None,
        }
    }

    pub fn market_analysis(&self) -> Option<&MarketAnalysis> {
        match self.get(StageKey::MarketAnalysis)? {
            StageRecord::MarketAnalysis(record) => Some(record),
            _ => None,
        }
    }

    pub fn risk_assessment(&self) -> Option<&RiskAssessment> {
        match self.get(StageKey::RiskAssessment)? {
            StageRecord::RiskAssessment(record) => Some(record),
            _ => None,
        }
    }

    pub fn decision_plan(&self) -> Option<&DecisionPlan> {
        match self.get(StageKey::DecisionPlan)? {
            StageRecord::DecisionPlan(record) => Some(record),
            _ => None,
        }
    }

    pub fn execution_summary(&self) -> Option<&ExecutionSummary> {
        match self.get(StageKey::ExecutionSummary)? {
            StageRecord::ExecutionSummary(record) => Some(record),
            _ => None,
        }
    }
}

// Serialized as a map keyed by stage name, preserving pipeline order,
// so the state embeds cleanly in run reports and agent prompts.
impl Serialize for WorkflowState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, record) in &self.entries {
            map.serialize_entry(key.as_str(), record)?;
        }
        map.end()
    }
}
