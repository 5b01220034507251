//! Collective exchange groups used for the global transposes.
//!
//! A group is a named channel shared by all nodes. Every collective call on it
//! is tagged with a [`Round`]; each node must use rounds `1, 2, ...` in order
//! on every group it participates in.

use core::fmt::Display;

use serde::Serialize;

use crate::parameters::Strategy;

pub mod errors;
pub mod local;

use errors::ExchangeError;

/// Generation identifier of one global exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Round(u64);

impl Round {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session round counter. Starts at zero; the first exchange uses round 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundCounter(u64);

impl RoundCounter {
    /// Moves to the next round and returns it.
    pub const fn advance(&mut self) -> Round {
        self.0 += 1;
        Round(self.0)
    }

    /// The round in effect.
    #[must_use]
    pub const fn current(&self) -> Round {
        Round(self.0)
    }
}

/// What a group is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GroupKind {
    /// Pairwise scatter with a single source node.
    Scatter { root: usize },
    /// Every node sends one block to every node.
    AllToAll,
}

impl Display for GroupKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Scatter { root } => write!(f, "scatter(root {root})"),
            Self::AllToAll => f.write_str("all_to_all"),
        }
    }
}

/// Handle to a group created on a [`Communicator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeGroup {
    name: String,
    kind: GroupKind,
    num_sites: usize,
}

impl ExchangeGroup {
    #[must_use]
    pub const fn new(name: String, kind: GroupKind, num_sites: usize) -> Self {
        Self {
            name,
            kind,
            num_sites,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> GroupKind {
        self.kind
    }

    #[must_use]
    pub const fn num_sites(&self) -> usize {
        self.num_sites
    }

    /// Source node of a scatter group.
    #[must_use]
    pub const fn root(&self) -> Option<usize> {
        match self.kind {
            GroupKind::Scatter { root } => Some(root),
            GroupKind::AllToAll => None,
        }
    }
}

/// Name of the `index`-th group of a run.
#[must_use]
pub fn group_name(prefix: &str, index: usize) -> String {
    format!("{prefix}/{index}")
}

/// Inter-node communication as seen by one node.
///
/// The collective calls block until this node's part of the round is complete.
pub trait Communicator: Send + Sync {
    /// Index of this node in `0..num_nodes()`.
    fn rank(&self) -> usize;

    /// Number of nodes taking part in the run.
    fn num_nodes(&self) -> usize;

    /// Creates (or joins) the group `name`. All nodes must use the same kind.
    fn create_group(&self, name: &str, kind: GroupKind) -> Result<ExchangeGroup, ExchangeError>;

    /// Sends `blocks[j]` to node `j` through a scatter group rooted at this
    /// node and returns the block addressed to this node.
    fn scatter_to(
        &self,
        group: &ExchangeGroup,
        round: Round,
        blocks: Vec<Vec<f64>>,
    ) -> Result<Vec<f64>, ExchangeError>;

    /// Receives the block addressed to this node from the root of a scatter group.
    fn scatter_from(&self, group: &ExchangeGroup, round: Round) -> Result<Vec<f64>, ExchangeError>;

    /// Sends `blocks[j]` to node `j` and returns the blocks addressed to this
    /// node, indexed by source.
    fn all_to_all(
        &self,
        group: &ExchangeGroup,
        round: Round,
        blocks: Vec<Vec<f64>>,
    ) -> Result<Vec<Vec<f64>>, ExchangeError>;

    /// Aborts the run. Nodes blocked in, or later entering, a collective fail
    /// with [`ExchangeError::Aborted`].
    fn abort(&self, reason: &str);
}

/// The exchange groups of one session, for the selected strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// Group `i` is rooted at node `i`.
    Scatter(Vec<ExchangeGroup>),
    AllToAll(ExchangeGroup),
}

impl Exchange {
    /// Creates the groups `strategy` needs, named `{prefix}/{index}`.
    pub fn create<C: Communicator + ?Sized>(
        comm: &C,
        strategy: Strategy,
        prefix: &str,
    ) -> Result<Self, ExchangeError> {
        match strategy {
            Strategy::Scatter => (0..comm.num_nodes())
                .map(|root| {
                    comm.create_group(&group_name(prefix, root), GroupKind::Scatter { root })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Scatter),
            Strategy::AllToAll => comm
                .create_group(&group_name(prefix, 0), GroupKind::AllToAll)
                .map(Self::AllToAll),
        }
    }

    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        match self {
            Self::Scatter(_) => Strategy::Scatter,
            Self::AllToAll(_) => Strategy::AllToAll,
        }
    }

    #[must_use]
    pub fn groups(&self) -> &[ExchangeGroup] {
        match self {
            Self::Scatter(groups) => groups,
            Self::AllToAll(group) => core::slice::from_ref(group),
        }
    }
}
