//! Transaction context for the commit path
//!
//! One `TransactionContext` exists per attempted commit. It is created by the
//! store adapter when a transaction starts, passed explicitly into every
//! commit-path call, and consumed by the commit or rollback callback. There
//! is no lookup by thread: a context that was never created cannot be found.
//!
//! ## State machine
//!
//! ```text
//! Active --before_commit ok--> Prepared --after_commit--> Committed
//!   |                            |
//!   |                            +--after_rollback--> RolledBack
//!   +--before_commit failed--> Failed --after_rollback--> RolledBack
//!   +--after_rollback (store-initiated)--> RolledBack
//! ```

use std::fmt;
use std::time::{Duration, Instant};
use stratagraph_core::{SecurityContext, StrataError, StrataResult, TxnId};

/// Lifecycle state of a transaction context
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionStatus {
    /// Transaction is open, the commit hook has not run yet
    Active,
    /// Commit hook dispatched every event; store may commit
    Prepared,
    /// Commit hook captured a failure; store must roll back
    Failed,
    /// Store committed
    Committed,
    /// Store rolled back
    RolledBack,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Active => "Active",
            TransactionStatus::Prepared => "Prepared",
            TransactionStatus::Failed => "Failed",
            TransactionStatus::Committed => "Committed",
            TransactionStatus::RolledBack => "RolledBack",
        };
        write!(f, "{}", name)
    }
}

/// Per-commit state: identifier, security context and captured failure
#[derive(Debug)]
pub struct TransactionContext {
    txn_id: TxnId,
    security: SecurityContext,
    status: TransactionStatus,
    failure: Option<StrataError>,
    started_at: Instant,
}

impl TransactionContext {
    /// Create an active context
    pub fn new(txn_id: TxnId, security: SecurityContext) -> Self {
        Self {
            txn_id,
            security,
            status: TransactionStatus::Active,
            failure: None,
            started_at: Instant::now(),
        }
    }

    /// Transaction identifier
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Security context events are dispatched under
    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    /// Current lifecycle state
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Check if the commit hook has not run yet
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Time since the context was created
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Captured failure, if the commit hook failed
    pub fn failure(&self) -> Option<&StrataError> {
        self.failure.as_ref()
    }

    /// Fail with `InvalidTransactionState` unless in `expected` state
    pub fn ensure_status(&self, expected: TransactionStatus) -> StrataResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(StrataError::InvalidTransactionState {
                expected: expected.to_string(),
                actual: self.status.to_string(),
            })
        }
    }

    /// Transition `Active` → `Prepared`
    pub fn mark_prepared(&mut self) -> StrataResult<()> {
        self.ensure_status(TransactionStatus::Active)?;
        self.status = TransactionStatus::Prepared;
        Ok(())
    }

    /// Record the failure that forces a rollback
    ///
    /// Only the first failure is kept; it is terminal for this transaction.
    pub fn record_failure(&mut self, cause: StrataError) {
        if self.failure.is_none() {
            self.failure = Some(cause);
        }
        self.status = TransactionStatus::Failed;
    }

    /// Transition `Prepared` → `Committed`
    pub fn mark_committed(&mut self) -> StrataResult<()> {
        self.ensure_status(TransactionStatus::Prepared)?;
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Transition to `RolledBack`, handing back the captured failure
    pub fn mark_rolled_back(&mut self) -> StrataResult<Option<StrataError>> {
        match self.status {
            TransactionStatus::Committed | TransactionStatus::RolledBack => {
                Err(StrataError::InvalidTransactionState {
                    expected: "Active, Prepared or Failed".to_string(),
                    actual: self.status.to_string(),
                })
            }
            _ => {
                self.status = TransactionStatus::RolledBack;
                Ok(self.failure.take())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TransactionContext {
        TransactionContext::new(TxnId(1), SecurityContext::super_user())
    }

    #[test]
    fn test_new_context_is_active() {
        let ctx = ctx();
        assert!(ctx.is_active());
        assert_eq!(ctx.txn_id(), TxnId(1));
        assert!(ctx.failure().is_none());
    }

    #[test]
    fn test_commit_path() {
        let mut ctx = ctx();
        ctx.mark_prepared().unwrap();
        assert_eq!(ctx.status(), &TransactionStatus::Prepared);
        ctx.mark_committed().unwrap();
        assert_eq!(ctx.status(), &TransactionStatus::Committed);
    }

    #[test]
    fn test_cannot_prepare_twice() {
        let mut ctx = ctx();
        ctx.mark_prepared().unwrap();
        let err = ctx.mark_prepared().unwrap_err();
        assert!(err.is_programming_error());
    }

    #[test]
    fn test_commit_requires_prepared() {
        let mut ctx = ctx();
        assert!(matches!(
            ctx.mark_committed(),
            Err(StrataError::InvalidTransactionState { .. })
        ));
    }

    #[test]
    fn test_first_failure_is_kept() {
        let mut ctx = ctx();
        ctx.record_failure(StrataError::vetoed("first"));
        ctx.record_failure(StrataError::vetoed("second"));

        assert_eq!(ctx.status(), &TransactionStatus::Failed);
        assert_eq!(ctx.failure(), Some(&StrataError::vetoed("first")));

        let cause = ctx.mark_rolled_back().unwrap();
        assert_eq!(cause, Some(StrataError::vetoed("first")));
        assert_eq!(ctx.status(), &TransactionStatus::RolledBack);
    }

    #[test]
    fn test_store_initiated_rollback_has_no_cause() {
        let mut ctx = ctx();
        assert_eq!(ctx.mark_rolled_back().unwrap(), None);
    }

    #[test]
    fn test_cannot_roll_back_committed() {
        let mut ctx = ctx();
        ctx.mark_prepared().unwrap();
        ctx.mark_committed().unwrap();
        assert!(ctx.mark_rolled_back().is_err());
    }
}
