// src/transaction.rs
//! Wait-for-SEP transaction engine.
//!
//! A single optional record: start a wait for a specific SEP (row, col) with
//! a deadline, then poll. The parser hook resolves it to `Success`, the tick
//! hook to `Timeout`. At most one transaction is pending at a time.

use tracing::debug;

use crate::error::{MinitelError, MinitelResult};

/// Terminal state of a wait, plus `Pending` while it is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    Pending,
    Success,
    Timeout,
}

#[derive(Clone, Copy, Debug)]
struct PendingWait {
    row: u8,
    col: u8,
    start_ms: u32,
    timeout_ms: u32,
}

pub struct TransactionEngine {
    pending: Option<PendingWait>,
    last: Option<TransactionOutcome>,
}

impl TransactionEngine {
    pub fn new() -> Self {
        Self {
            pending: None,
            last: None,
        }
    }

    /// Arm a wait for SEP (row, col). `timeout_ms == 0` means no deadline.
    pub fn begin_wait_sep(
        &mut self,
        row: u8,
        col: u8,
        timeout_ms: u32,
        now_ms: u32,
    ) -> MinitelResult<()> {
        if self.pending.is_some() {
            return Err(MinitelError::TransactionPending);
        }
        self.pending = Some(PendingWait {
            row,
            col,
            start_ms: now_ms,
            timeout_ms,
        });
        self.last = Some(TransactionOutcome::Pending);
        debug!(row, col, timeout_ms, "transaction armed");
        Ok(())
    }

    /// Parser hook; returns true when this SEP resolved the wait.
    pub fn on_sep(&mut self, row: u8, col: u8) -> bool {
        match self.pending {
            Some(wait) if wait.row == row && wait.col == col => {
                self.pending = None;
                self.last = Some(TransactionOutcome::Success);
                debug!(row, col, "transaction acknowledged");
                true
            }
            _ => false,
        }
    }

    /// Tick hook; returns true when the deadline just elapsed.
    ///
    /// Comparison uses wrapping subtraction so a clock wrap mid-wait does
    /// not fire (or suppress) the deadline.
    pub fn check_timeout(&mut self, now_ms: u32) -> bool {
        match self.pending {
            Some(wait)
                if wait.timeout_ms > 0
                    && now_ms.wrapping_sub(wait.start_ms) > wait.timeout_ms =>
            {
                self.pending = None;
                self.last = Some(TransactionOutcome::Timeout);
                debug!(row = wait.row, col = wait.col, "transaction timed out");
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_active(&self) -> bool {
        self.pending.is_some()
    }

    /// `Pending` while a wait is armed, otherwise the last terminal outcome.
    pub fn last_outcome(&self) -> Option<TransactionOutcome> {
        self.last
    }
}

impl Default for TransactionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_sep_resolves_success() {
        let mut tx = TransactionEngine::new();
        tx.begin_wait_sep(5, 4, 1000, 0).unwrap();
        assert!(tx.is_active());
        assert!(!tx.on_sep(4, 1)); // wrong key
        assert!(tx.is_active());
        assert!(tx.on_sep(5, 4));
        assert!(!tx.is_active());
        assert_eq!(tx.last_outcome(), Some(TransactionOutcome::Success));
    }

    #[test]
    fn deadline_resolves_timeout() {
        let mut tx = TransactionEngine::new();
        tx.begin_wait_sep(5, 4, 200, 100).unwrap();
        assert!(!tx.check_timeout(250)); // 150 elapsed
        assert!(tx.check_timeout(301)); // 201 elapsed
        assert_eq!(tx.last_outcome(), Some(TransactionOutcome::Timeout));
    }

    #[test]
    fn zero_timeout_never_expires() {
        let mut tx = TransactionEngine::new();
        tx.begin_wait_sep(4, 1, 0, 0).unwrap();
        assert!(!tx.check_timeout(u32::MAX));
        assert!(tx.is_active());
    }

    #[test]
    fn second_begin_while_pending_fails() {
        let mut tx = TransactionEngine::new();
        tx.begin_wait_sep(5, 4, 100, 0).unwrap();
        assert_eq!(
            tx.begin_wait_sep(4, 1, 100, 0),
            Err(MinitelError::TransactionPending)
        );
    }

    #[test]
    fn deadline_tolerates_clock_wrap() {
        let mut tx = TransactionEngine::new();
        tx.begin_wait_sep(5, 4, 100, u32::MAX - 20).unwrap();
        // 21 ms elapsed across the wrap: not expired yet
        assert!(!tx.check_timeout(0));
        // 121 ms elapsed across the wrap: expired
        assert!(tx.check_timeout(100));
    }

    #[test]
    fn cancel_clears_pending_wait() {
        let mut tx = TransactionEngine::new();
        tx.begin_wait_sep(5, 4, 100, 0).unwrap();
        tx.cancel();
        assert!(!tx.is_active());
        assert!(!tx.on_sep(5, 4));
    }
}
