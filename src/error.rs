// src/error.rs
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MinitelError {
    #[error("timed out after {0} ms")]
    Timeout(u32),

    #[error("a transaction is already pending")]
    TransactionPending,

    #[error("line buffer capacity is zero")]
    EmptyLineBuffer,

    #[error("unexpected reply while reading the cursor position")]
    UnexpectedReply,
}

pub type MinitelResult<T> = Result<T, MinitelError>;
