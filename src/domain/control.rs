use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Global trading switch derived from the latest control-state record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlState {
    /// Agents may act
    Running,
    /// Dispatch is halted
    Paused,
}

impl ControlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlState::Running => "RUNNING",
            ControlState::Paused => "PAUSED",
        }
    }

    pub fn from_paused(paused: bool) -> Self {
        if paused {
            ControlState::Paused
        } else {
            ControlState::Running
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the append-only pause/resume log.
///
/// Records are never updated; the row with the highest `id` is the current
/// state. `paused_by` holds the actor of the transition in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlStateRecord {
    pub id: i64,
    pub paused: bool,
    pub paused_at: Option<DateTime<Utc>>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub paused_by: Option<String>,
    pub pause_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ControlStateRecord {
    /// State reported when the log is empty. Never persisted.
    ///
    /// Fixed id and timestamp so repeated reads of an empty log compare equal.
    pub fn initial() -> Self {
        Self {
            id: 0,
            paused: false,
            paused_at: None,
            resumed_at: None,
            paused_by: None,
            pause_reason: None,
            created_at: DateTime::<Utc>::default(),
        }
    }

    pub fn state(&self) -> ControlState {
        ControlState::from_paused(self.paused)
    }

    /// Whether this record came from the store rather than `initial()`
    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }
}

/// A transition about to be appended to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewControlState {
    pub paused: bool,
    pub paused_at: Option<DateTime<Utc>>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub paused_by: Option<String>,
    pub pause_reason: Option<String>,
}

impl NewControlState {
    pub fn pause(actor: &str, reason: Option<&str>, at: DateTime<Utc>) -> Self {
        Self {
            paused: true,
            paused_at: Some(at),
            resumed_at: None,
            paused_by: Some(actor.to_string()),
            pause_reason: reason.map(str::to_string),
        }
    }

    pub fn resume(actor: &str, at: DateTime<Utc>) -> Self {
        Self {
            paused: false,
            paused_at: None,
            resumed_at: Some(at),
            paused_by: Some(actor.to_string()),
            pause_reason: None,
        }
    }

    /// Materialize the record once the store has assigned an id
    pub fn into_record(self, id: i64, created_at: DateTime<Utc>) -> ControlStateRecord {
        ControlStateRecord {
            id,
            paused: self.paused,
            paused_at: self.paused_at,
            resumed_at: self.resumed_at,
            paused_by: self.paused_by,
            pause_reason: self.pause_reason,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_record_is_running_and_stable() {
        let a = ControlStateRecord::initial();
        let b = ControlStateRecord::initial();
        assert_eq!(a, b);
        assert_eq!(a.state(), ControlState::Running);
        assert!(!a.is_persisted());
    }

    #[test]
    fn test_pause_and_resume_set_exactly_one_timestamp() {
        let now = Utc::now();
        let pause = NewControlState::pause("ops", Some("exchange halt"), now);
        assert!(pause.paused_at.is_some() && pause.resumed_at.is_none());
        assert_eq!(pause.pause_reason.as_deref(), Some("exchange halt"));

        let resume = NewControlState::resume("ops", now);
        assert!(resume.paused_at.is_none() && resume.resumed_at.is_some());
        assert!(!resume.paused);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ControlState::Paused.to_string(), "PAUSED");
        assert_eq!(ControlState::from_paused(false), ControlState::Running);
    }
}
