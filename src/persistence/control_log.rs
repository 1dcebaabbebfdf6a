use crate::domain::{ControlStateRecord, NewControlState};
use crate::error::Result;
use async_trait::async_trait;

/// Decides the next record from the locked current one.
///
/// Receives `None` when the log is empty. Returning an error aborts the
/// transition and nothing is written.
pub type TransitionPlanner =
    Box<dyn FnOnce(Option<&ControlStateRecord>) -> Result<NewControlState> + Send>;

/// Append-only log of pause/resume transitions
#[async_trait]
pub trait ControlStateStore: Send + Sync {
    /// Record with the highest id, if any. Takes no locks.
    async fn latest_state(&self) -> Result<Option<ControlStateRecord>>;

    /// Full history in ascending id order, optionally only the last `limit`
    async fn state_history(&self, limit: Option<i64>) -> Result<Vec<ControlStateRecord>>;

    /// Lock the log tail, hand the current record to `plan` and append its
    /// result, all in one atomic unit.
    ///
    /// The lock must be exclusive across processes and held from the read
    /// until the new record is committed or the attempt is rolled back.
    async fn append_transition(&self, plan: TransitionPlanner) -> Result<ControlStateRecord>;
}
