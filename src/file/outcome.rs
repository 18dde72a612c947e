//! Per-id results of batch operations.

use crate::tree::NodeId;
use crate::{FallcrateError, Result};

/// Outcome of an operation applied to several ids independently.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Ids processed successfully, in input order.
    pub succeeded: Vec<NodeId>,
    /// Ids that failed, with the reason.
    pub failed: Vec<(NodeId, FallcrateError)>,
}

impl BatchOutcome {
    /// Create an empty outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a success.
    pub fn success(&mut self, id: NodeId) {
        self.succeeded.push(id);
    }

    /// Record a failure.
    pub fn failure(&mut self, id: NodeId, error: FallcrateError) {
        self.failed.push((id, error));
    }

    /// Record the result of processing `id`.
    pub fn record<T>(&mut self, id: NodeId, result: Result<T>) {
        match result {
            Ok(_) => self.success(id),
            Err(e) => self.failure(id, e),
        }
    }

    /// Check if every id succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Collapse into a single result.
    ///
    /// No failures gives the succeeded ids. A lone failure with nothing
    /// else processed gives that error as is. Anything else is a
    /// [`FallcrateError::PartialFailure`] carrying one message per failed id.
    pub fn into_result(self) -> Result<Vec<NodeId>> {
        if self.failed.is_empty() {
            return Ok(self.succeeded);
        }
        let mut failed = self.failed;
        if self.succeeded.is_empty() && failed.len() == 1 {
            if let Some((_, error)) = failed.pop() {
                return Err(error);
            }
        }
        Err(FallcrateError::PartialFailure {
            succeeded: self.succeeded.len(),
            failed: failed.iter().map(|(_, e)| e.to_string()).collect(),
        })
    }
}
