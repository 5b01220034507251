//! Runs all nodes of a transform inside one process.

use core::fmt;
use std::thread;

use tracing::{info, instrument};

use crate::{
    errors::FftError,
    exchange::{Communicator, local::LocalComm},
    geometry::GeometryError,
    parameters::{FftConfig, Strategy},
    session::FftSession,
};

/// The rows one node holds after the transform.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub node: usize,
    pub strategy: Strategy,
    pub rows: Vec<Vec<f64>>,
}

/// Prints the rows as `(re im) ` pairs, one line per row, under a node header.
impl fmt::Display for NodeOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\nAlgorithm {}\nLocality {}\n", self.strategy, self.node)?;
        for row in &self.rows {
            writeln!(f)?;
            for pair in row.chunks_exact(2) {
                write!(f, "({} {}) ", pair[0], pair[1])?;
            }
        }
        writeln!(f)
    }
}

/// Aborts the fabric when a node thread unwinds, so its peers stop waiting.
struct AbortOnPanic<'a>(&'a LocalComm);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort("node panicked");
        }
    }
}

fn run_node(
    comm: LocalComm,
    rows: Vec<Vec<f64>>,
    config: &FftConfig,
) -> Result<NodeOutput, FftError> {
    let _guard = AbortOnPanic(&comm);
    let node = comm.rank();

    let session = FftSession::initialize(comm.clone(), rows, config)?;
    let strategy = session.strategy();
    let rows = session.run_transform()?;

    info!(node, rows = rows.len(), "node finished");
    Ok(NodeOutput {
        node,
        strategy,
        rows,
    })
}

/// Runs one session per entry of `inputs`, each on its own thread, over an
/// in-process fabric. `inputs[i]` are node `i`'s initial rows.
///
/// Returns the outputs in node order, or [`GeometryError::NoNodes`] when
/// `inputs` is empty. When nodes fail, the error of the first
/// node that failed on its own is returned rather than the aborts it caused on
/// its peers.
#[instrument(skip_all, fields(nodes = inputs.len(), config = %config))]
pub fn run_local(
    config: &FftConfig,
    inputs: Vec<Vec<Vec<f64>>>,
) -> Result<Vec<NodeOutput>, FftError> {
    if inputs.is_empty() {
        return Err(GeometryError::NoNodes.into());
    }
    let world = LocalComm::create_world(inputs.len());

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = world
            .into_iter()
            .zip(inputs)
            .map(|(comm, rows)| scope.spawn(move || run_node(comm, rows, config)))
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(node, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(FftError::NodePanicked(node)))
            })
            .collect()
    });

    // A node's own failure sorts before the aborts it triggered on its peers
    if let Some(err) = results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .min_by_key(|err| err.is_peer_abort())
    {
        return Err(err.clone());
    }

    results.into_iter().collect()
}

/// Concatenates the node outputs into the full `dim_x` row set.
#[must_use]
pub fn gather(outputs: Vec<NodeOutput>) -> Vec<Vec<f64>> {
    outputs.into_iter().flat_map(|output| output.rows).collect()
}
