use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Realized result of a decision. A pending decision has no outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionOutcome {
    Success,
    Failure,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Success => "SUCCESS",
            DecisionOutcome::Failure => "FAILURE",
        }
    }
}

impl std::fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for DecisionOutcome {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "SUCCESS" => Ok(DecisionOutcome::Success),
            "FAILURE" => Ok(DecisionOutcome::Failure),
            other => Err(format!("unknown decision outcome: {other}")),
        }
    }
}

/// One historical reasoning event made by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: i64,
    pub session_id: Option<Uuid>,
    pub decision_type: String,
    pub symbol: String,
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub tokens_used: Option<i32>,
    pub latency_ms: Option<i64>,
    /// `None` while the trade is still open
    pub outcome: Option<DecisionOutcome>,
    /// Only set together with `outcome`
    pub pnl: Option<Decimal>,
    /// Opaque market context; must contain an `indicators` object to be
    /// useful for similarity search
    pub context: Option<serde_json::Value>,
    pub agent_id: String,
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Some(DecisionOutcome::Success)
    }
}

/// Decision as submitted by an agent, before the store assigns an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDecision {
    pub session_id: Option<Uuid>,
    pub decision_type: String,
    pub symbol: String,
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub tokens_used: Option<i32>,
    pub latency_ms: Option<i64>,
    pub context: Option<serde_json::Value>,
    pub agent_id: String,
    pub confidence: Option<f64>,
}

impl NewDecision {
    /// Minimal decision for a symbol; remaining fields via struct update
    pub fn new(agent_id: &str, symbol: &str, decision_type: &str) -> Self {
        Self {
            session_id: None,
            decision_type: decision_type.to_string(),
            symbol: symbol.to_string(),
            prompt: String::new(),
            response: String::new(),
            model: String::new(),
            tokens_used: None,
            latency_ms: None,
            context: None,
            agent_id: agent_id.to_string(),
            confidence: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Reject input the store must never hold
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if self.agent_id.trim().is_empty() {
            return Err("agent_id must not be empty".to_string());
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(format!("confidence {c} outside [0, 1]"));
            }
        }
        Ok(())
    }

    pub fn into_record(self, id: i64, created_at: DateTime<Utc>) -> DecisionRecord {
        DecisionRecord {
            id,
            session_id: self.session_id,
            decision_type: self.decision_type,
            symbol: self.symbol,
            prompt: self.prompt,
            response: self.response,
            model: self.model,
            tokens_used: self.tokens_used,
            latency_ms: self.latency_ms,
            outcome: None,
            pnl: None,
            context: self.context,
            agent_id: self.agent_id,
            confidence: self.confidence,
            created_at,
        }
    }
}
