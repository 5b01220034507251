//! Per-node orchestration of the distributed 2D transform.
//!
//! A session owns one node's rows and drives them through two passes:
//!
//! 1. real-to-complex transform of every local row, split into per-destination
//!    blocks, exchange, and transpose into `n_y_local` local columns;
//! 2. complex-to-complex transform of every local column, split, exchange,
//!    and transpose back into the original rows.
//!
//! Local work fans out on the rayon pool. Blocking exchange calls run on
//! scoped threads so that a node waiting for its peers never holds a rayon
//! worker. Each exchange thread transposes what it received as soon as its own
//! call completes; the end of each thread scope is the barrier before the
//! next pass.

use core::fmt;
use std::thread;

use itertools::izip;
use rayon::prelude::*;
use tracing::{debug, error, info_span, instrument};

use crate::{
    dft::{C2cPlan, DftPlanner, R2cPlan, RowTransform},
    errors::FftError,
    exchange::{
        Communicator, Exchange, ExchangeGroup, Round, RoundCounter, errors::ExchangeError,
    },
    geometry::PartitionGeometry,
    parameters::{FftConfig, Strategy},
    repack::{chunk_views, split_line, transpose_source},
    staging::StagingArena,
};


/// One node's share of a distributed transform.
///
/// Created by [`FftSession::initialize`] and consumed by
/// [`FftSession::run_transform`], so every session runs exactly one transform.
pub struct FftSession<C> {
    comm: C,
    pipeline: Pipeline,
}

/// Everything a session owns besides its communicator.
struct Pipeline {
    geometry: PartitionGeometry,
    exchange: Exchange,
    r2c: R2cPlan,
    c2c: C2cPlan,
    /// `n_x_local` rows of `row_len()` slots; input of pass 1 and output of pass 2.
    rows: Vec<Vec<f64>>,
    /// `n_y_local` columns of `column_len()` slots.
    columns: Vec<Vec<f64>>,
    arena: StagingArena,
    rounds: RoundCounter,
}

impl<C> fmt::Debug for FftSession<C>
where
    C: Communicator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftSession")
            .field("node", &self.comm.rank())
            .field("geometry", &self.pipeline.geometry)
            .field("strategy", &self.pipeline.exchange.strategy())
            .field("round", &self.pipeline.rounds.current())
            .finish_non_exhaustive()
    }
}

impl<C> FftSession<C>
where
    C: Communicator,
{
    /// Takes ownership of this node's rows and prepares the transform.
    ///
    /// `rows` are the node's `dim_x / N` consecutive global rows, each with
    /// `2 * (dim_y_real / 2 + 1)` slots of which the first `dim_y_real` hold the
    /// samples. On failure the run is aborted on every node before any
    /// exchange takes place.
    #[instrument(skip_all, fields(node = comm.rank(), nodes = comm.num_nodes(), config = %config))]
    pub fn initialize(comm: C, rows: Vec<Vec<f64>>, config: &FftConfig) -> Result<Self, FftError> {
        match Pipeline::prepare(&comm, rows, config) {
            Ok(pipeline) => Ok(Self { comm, pipeline }),
            Err(err) => Err(abort_run(&comm, err)),
        }
    }

    /// Runs both passes and returns this node's rows of the transformed array.
    ///
    /// Each row holds `dim_y_complex` interleaved `(re, im)` values. Blocks
    /// until every node has taken part in both exchanges.
    #[instrument(skip_all, fields(node = self.comm.rank(), strategy = %self.strategy()))]
    pub fn run_transform(self) -> Result<Vec<Vec<f64>>, FftError> {
        let Self { comm, pipeline } = self;
        pipeline.run(&comm).map_err(|err| abort_run(&comm, err))
    }

    #[must_use]
    pub const fn geometry(&self) -> &PartitionGeometry {
        &self.pipeline.geometry
    }

    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.pipeline.exchange.strategy()
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }
}

/// Reports `err` and aborts the run unless a peer already did.
fn abort_run<C: Communicator + ?Sized>(comm: &C, err: FftError) -> FftError {
    if !err.is_peer_abort() {
        error!(node = comm.rank(), %err, "transform failed");
        comm.abort(&err.to_string());
    }
    err
}

impl Pipeline {
    fn prepare<C: Communicator>(
        comm: &C,
        rows: Vec<Vec<f64>>,
        config: &FftConfig,
    ) -> Result<Self, FftError> {
        let strategy = config.strategy()?;
        let geometry = config.geometry(comm.num_nodes())?;
        geometry.check_rows(&rows)?;
        debug!(
            rows = ?geometry.x_partition(comm.rank()),
            columns = ?geometry.y_partition(comm.rank()),
            "partition"
        );

        let mut planner = DftPlanner::new(config.plan);
        let r2c = planner.plan_forward_r2c(geometry.dim_y_real());
        let c2c = planner.plan_forward_c2c(geometry.dim_x());

        let exchange = Exchange::create(comm, strategy, &config.group_prefix)?;
        debug!(groups = exchange.groups().len(), %strategy, "exchange groups ready");

        Ok(Self {
            geometry,
            exchange,
            r2c,
            c2c,
            rows,
            columns: vec![vec![0.0; geometry.column_len()]; geometry.n_y_local()],
            arena: StagingArena::new(geometry.num_nodes(), geometry.staging_block_len()),
            rounds: RoundCounter::default(),
        })
    }

    fn run<C: Communicator>(mut self, comm: &C) -> Result<Vec<Vec<f64>>, FftError> {
        let geometry = self.geometry;

        info_span!("r2c rows", rows = geometry.n_x_local()).in_scope(|| {
            transform_and_split(
                &mut self.rows,
                &self.r2c,
                &mut self.arena,
                geometry.y_block_len(),
            );
        });
        let round = self.rounds.advance();
        info_span!("exchange", %round).in_scope(|| {
            exchange_round(
                comm,
                &self.exchange,
                round,
                &mut self.arena,
                &mut self.columns,
                geometry.x_block_len(),
                geometry.y_block_len(),
            )
        })?;

        info_span!("c2c columns", columns = geometry.n_y_local()).in_scope(|| {
            transform_and_split(
                &mut self.columns,
                &self.c2c,
                &mut self.arena,
                geometry.x_block_len(),
            );
        });
        let round = self.rounds.advance();
        info_span!("exchange", %round).in_scope(|| {
            exchange_round(
                comm,
                &self.exchange,
                round,
                &mut self.arena,
                &mut self.rows,
                geometry.y_block_len(),
                geometry.x_block_len(),
            )
        })?;

        Ok(self.rows)
    }
}

/// Transforms every line in place and splits it into the staging blocks.
///
/// Line `r`'s chunk for node `j` lands in block `j` at offset `r * chunk_len`.
fn transform_and_split<T: RowTransform>(
    lines: &mut [Vec<f64>],
    plan: &T,
    arena: &mut StagingArena,
    chunk_len: usize,
) {
    let views = chunk_views(arena.blocks_mut(), chunk_len);
    debug_assert_eq!(views.len(), lines.len());

    lines
        .par_iter_mut()
        .zip(views)
        .for_each(|(line, mut targets)| {
            plan.execute_in_place(line);
            split_line(line, &mut targets);
        });
}

/// Sends the staging blocks, and transposes the received blocks into `targets`.
///
/// Source `i`'s block fills chunk `i` (of `target_chunk` slots) of every
/// target; its lines are `stride` slots long. The received blocks become the
/// new staging blocks.
fn exchange_round<C: Communicator>(
    comm: &C,
    exchange: &Exchange,
    round: Round,
    arena: &mut StagingArena,
    targets: &mut [Vec<f64>],
    target_chunk: usize,
    stride: usize,
) -> Result<(), FftError> {
    let outgoing = arena.take();
    let per_source = chunk_views(targets, target_chunk);

    let received = match exchange {
        Exchange::Scatter(groups) => {
            scatter_round(comm, groups, round, outgoing, per_source, arena, stride)?
        }
        Exchange::AllToAll(group) => {
            all_to_all_round(comm, group, round, outgoing, per_source, arena, stride)?
        }
    };

    arena.restore(received)?;
    Ok(())
}

/// One scatter per group, each on its own thread, each followed by the
/// transposes of the block it delivered.
fn scatter_round<C: Communicator>(
    comm: &C,
    groups: &[ExchangeGroup],
    round: Round,
    outgoing: Vec<Vec<f64>>,
    per_source: Vec<Vec<&mut [f64]>>,
    arena: &StagingArena,
    stride: usize,
) -> Result<Vec<Vec<f64>>, FftError> {
    let me = comm.rank();
    let mut outgoing = Some(outgoing);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = izip!(0.., groups, per_source)
            .map(|(from_node, group, mut views)| {
                // This node's own group carries its blocks to everyone
                let send = if group.root() == Some(me) {
                    outgoing.take()
                } else {
                    None
                };

                let handle = scope.spawn(move || -> Result<Vec<f64>, FftError> {
                    let block = match send {
                        Some(blocks) => comm.scatter_to(group, round, blocks),
                        None => comm.scatter_from(group, round),
                    }
                    .map_err(|err| abort_run(comm, err.into()))?;

                    arena
                        .check_received(from_node, &block)
                        .map_err(|err| abort_run(comm, err.into()))?;
                    transpose_source(&block, stride, &mut views);
                    Ok(block)
                });
                (group, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(group, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(ExchangeError::TaskPanicked(group.name().to_string()).into())
                })
            })
            .collect()
    });

    results.into_iter().collect()
}

/// A single all-to-all call, then the transposes of every received block.
fn all_to_all_round<C: Communicator>(
    comm: &C,
    group: &ExchangeGroup,
    round: Round,
    outgoing: Vec<Vec<f64>>,
    per_source: Vec<Vec<&mut [f64]>>,
    arena: &StagingArena,
    stride: usize,
) -> Result<Vec<Vec<f64>>, FftError> {
    let received = thread::scope(|scope| {
        scope
            .spawn(|| comm.all_to_all(group, round, outgoing))
            .join()
            .unwrap_or_else(|_| Err(ExchangeError::TaskPanicked(group.name().to_string())))
    })?;

    if received.len() != per_source.len() {
        return Err(ExchangeError::BlockCount {
            group: group.name().to_string(),
            node: comm.rank(),
            expected: per_source.len(),
            found: received.len(),
        }
        .into());
    }
    for (from_node, block) in received.iter().enumerate() {
        arena.check_received(from_node, block)?;
    }

    per_source
        .into_par_iter()
        .zip(&received)
        .for_each(|(mut views, block)| transpose_source(block, stride, &mut views));

    Ok(received)
}
