//! Error types for the transaction engine
//!
//! `TxError` is what a Structural Mutator call, a commit or the queue worker
//! reports. `StoreError` is what the external collaborators (block index,
//! tree store, attribute-view store, parser) report; mutators translate it
//! into the `TxError` that matches the failing step.

use crate::tree::{BlockId, TreeError};
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, TxError>;

/// Error codes pushed to the UI alongside a failed transaction
pub mod code {
    pub const BLOCK_NOT_FOUND: u8 = 0;
    pub const DATA_SYNCING: u8 = 1;
    pub const WRITE_FAILED: u8 = 2;
    pub const ATTRIBUTE_VIEW: u8 = 3;
    pub const INVALID: u8 = 4;
}

/// Failure of a transaction or of one of its operations
#[derive(Debug, Error)]
pub enum TxError {
    /// Anchor or target id could not be resolved
    #[error("block not found [id={id}]")]
    BlockNotFound { id: BlockId },

    /// Storage is held by a concurrent bulk sync
    #[error("data is syncing, unable to lock tree of block [id={id}]")]
    DataSyncing { id: BlockId },

    /// Persisting a tree failed; fatal for the process
    #[error("write tree [root={id}] failed: {reason}")]
    WriteFailed { id: BlockId, reason: String },

    #[error("attribute view [id={av_id}] handling failed: {reason}")]
    AttributeViewHandlingFailed { av_id: String, reason: String },

    /// Payload could not be turned into a subtree
    #[error("invalid data payload for block [id={id}]: {reason}")]
    InvalidPayload { id: BlockId, reason: String },

    /// Move destination lies inside the moving subtree or folded run
    #[error("cannot move block [id={id}] to [{target}] inside itself")]
    InvalidMove { id: BlockId, target: BlockId },

    /// A handler panicked and the transaction was rolled back
    #[error("transaction panicked: {0}")]
    Panicked(String),
}

impl TxError {
    /// Numeric code reported to the UI
    pub fn code(&self) -> u8 {
        match self {
            TxError::BlockNotFound { .. } => code::BLOCK_NOT_FOUND,
            TxError::DataSyncing { .. } => code::DATA_SYNCING,
            TxError::WriteFailed { .. } => code::WRITE_FAILED,
            TxError::AttributeViewHandlingFailed { .. } => code::ATTRIBUTE_VIEW,
            TxError::InvalidPayload { .. } | TxError::InvalidMove { .. } | TxError::Panicked(_) => {
                code::INVALID
            }
        }
    }

    /// Whether the process must stop instead of continuing with diverged state
    pub fn is_fatal(&self) -> bool {
        matches!(self, TxError::WriteFailed { .. })
    }

    pub(crate) fn not_found(id: impl Into<BlockId>) -> Self {
        TxError::BlockNotFound { id: id.into() }
    }

    /// Map a load failure of the tree owning `id`
    pub(crate) fn from_load(id: &str, err: StoreError) -> Self {
        match err {
            StoreError::Locked(_) => TxError::DataSyncing { id: id.to_string() },
            _ => TxError::not_found(id),
        }
    }

    pub(crate) fn from_view(av_id: &str, err: StoreError) -> Self {
        TxError::AttributeViewHandlingFailed {
            av_id: av_id.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<TreeError> for TxError {
    fn from(err: TreeError) -> Self {
        match &err {
            TreeError::NotFound(id) => TxError::not_found(id.clone()),
            TreeError::DuplicateId(id) | TreeError::DetachRoot(id) | TreeError::NoParent(id) => {
                TxError::InvalidPayload {
                    id: id.clone(),
                    reason: err.to_string(),
                }
            }
            TreeError::MissingId => TxError::InvalidPayload {
                id: BlockId::new(),
                reason: err.to_string(),
            },
        }
    }
}

/// Failure reported by an external collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Held by a concurrent bulk sync
    #[error("locked by data sync: {0}")]
    Locked(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
