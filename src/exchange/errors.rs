use thiserror::Error;

use super::GroupKind;

/// Failures of a collective exchange.
///
/// None of these are recoverable: a misplaced block silently corrupts the
/// distributed transpose, so every variant aborts the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// A node issued a collective with a round identifier other than the one
    /// the group expects from it next.
    #[error("round mismatch on group `{group}`: node {node} issued round {found}, expected {expected}")]
    RoundMismatch {
        group: String,
        node: usize,
        expected: u64,
        found: u64,
    },

    /// The operation does not fit the group or the node's place in it.
    #[error("node {node} cannot {op} on {kind} group `{group}`")]
    WrongRole {
        group: String,
        node: usize,
        kind: GroupKind,
        op: &'static str,
    },

    /// Two nodes created the same group with different strategies.
    #[error("group `{group}` exists as {existing}, node {node} requested {requested}")]
    GroupMismatch {
        group: String,
        node: usize,
        existing: GroupKind,
        requested: GroupKind,
    },

    /// The group was never created on this fabric.
    #[error("group `{0}` does not exist")]
    UnknownGroup(String),

    /// A node handed over the wrong number of per-destination blocks.
    #[error("node {node} supplied {found} blocks to group `{group}`, expected {expected}")]
    BlockCount {
        group: String,
        node: usize,
        expected: usize,
        found: usize,
    },

    /// A received block does not have the size the partition geometry predicts.
    #[error("block from node {from_node} has {found} slots, expected {expected}")]
    BlockLength {
        from_node: usize,
        expected: usize,
        found: usize,
    },

    /// Another node aborted the run.
    #[error("exchange aborted: {reason}")]
    Aborted { reason: String },

    /// A thread panicked while holding the fabric lock.
    #[error("exchange fabric lock poisoned")]
    Poisoned,

    /// An exchange task panicked.
    #[error("exchange task on group `{0}` panicked")]
    TaskPanicked(String),
}
