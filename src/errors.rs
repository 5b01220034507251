//! Main error types for the distributed transform.

use thiserror::Error;

use crate::{
    exchange::errors::ExchangeError, geometry::GeometryError, parameters::errors::ConfigError,
};

/// Top-level error type for session and cluster operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FftError {
    /// The node count does not divide a required dimension, or the input rows
    /// do not have the expected shape.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// The session configuration could not be interpreted.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A collective exchange failed or the exchange protocol was violated.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// A node thread of a local cluster run panicked.
    #[error("node {0} panicked")]
    NodePanicked(usize),
}

impl FftError {
    /// Returns `true` when this node failed only because a peer aborted the run.
    #[must_use]
    pub const fn is_peer_abort(&self) -> bool {
        matches!(self, Self::Exchange(ExchangeError::Aborted { .. }))
    }
}
