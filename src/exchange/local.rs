//! In-process exchange fabric.
//!
//! Every node of the run is a thread of the same process and holds a
//! [`LocalComm`] created by [`LocalComm::create_world`]. Blocks move between
//! nodes by ownership transfer through shared state guarded by a mutex; nodes
//! waiting for a peer sleep on a condition variable.

use std::{
    collections::HashMap,
    fmt, mem,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, warn};

use super::{Communicator, ExchangeGroup, GroupKind, Round, errors::ExchangeError};

/// Blocks deposited for one round of one group.
#[derive(Debug)]
struct RoundSlot {
    /// `deposits[src][dst]`; a row stays empty until `src` deposits.
    deposits: Vec<Vec<Option<Vec<f64>>>>,
    /// Number of sources that deposited.
    deposited: usize,
    /// Receive operations still to be served before the slot is dropped.
    collections_left: usize,
}

impl RoundSlot {
    fn new(num_sites: usize, collections_left: usize) -> Self {
        Self {
            deposits: vec![Vec::new(); num_sites],
            deposited: 0,
            collections_left,
        }
    }

    fn deposit(&mut self, from: usize, blocks: Vec<Option<Vec<f64>>>) {
        self.deposits[from] = blocks;
        self.deposited += 1;
    }

    /// Takes the block `from -> to` if it has been deposited.
    fn take(&mut self, from: usize, to: usize) -> Option<Vec<f64>> {
        self.deposits.get_mut(from)?.get_mut(to)?.take()
    }
}

#[derive(Debug)]
struct GroupState {
    kind: GroupKind,
    /// Next round expected from each node.
    next_round: Vec<u64>,
    rounds: HashMap<u64, RoundSlot>,
    /// Set once the group saw a protocol violation; every later call fails with it.
    failure: Option<ExchangeError>,
}

impl GroupState {
    fn new(kind: GroupKind, num_sites: usize) -> Self {
        Self {
            kind,
            next_round: vec![1; num_sites],
            rounds: HashMap::new(),
            failure: None,
        }
    }

    /// Records that `node` entered `round`, failing the group if the round is
    /// not the one expected from that node.
    fn claim_round(&mut self, group: &str, node: usize, round: Round) -> Result<(), ExchangeError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let expected = self.next_round[node];
        if round.value() != expected {
            let err = ExchangeError::RoundMismatch {
                group: group.to_string(),
                node,
                expected,
                found: round.value(),
            };
            self.failure = Some(err.clone());
            return Err(err);
        }
        self.next_round[node] += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FabricState {
    groups: HashMap<String, GroupState>,
    aborted: Option<String>,
}

impl FabricState {
    fn check_aborted(&self) -> Result<(), ExchangeError> {
        self.aborted.as_ref().map_or(Ok(()), |reason| {
            Err(ExchangeError::Aborted {
                reason: reason.clone(),
            })
        })
    }

    fn group_mut(&mut self, name: &str) -> Result<&mut GroupState, ExchangeError> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| ExchangeError::UnknownGroup(name.to_string()))
    }
}

#[derive(Debug)]
struct Fabric {
    num_nodes: usize,
    state: Mutex<FabricState>,
    changed: Condvar,
}

/// One node's endpoint on an in-process fabric.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    fabric: Arc<Fabric>,
}

impl fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("num_nodes", &self.fabric.num_nodes)
            .finish()
    }
}

impl LocalComm {
    /// Creates the endpoints of all `num_nodes` nodes of a run, in rank order.
    #[must_use]
    pub fn create_world(num_nodes: usize) -> Vec<Self> {
        let fabric = Arc::new(Fabric {
            num_nodes,
            state: Mutex::new(FabricState::default()),
            changed: Condvar::new(),
        });

        (0..num_nodes)
            .map(|rank| Self {
                rank,
                fabric: Arc::clone(&fabric),
            })
            .collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, FabricState>, ExchangeError> {
        self.fabric.state.lock().map_err(|_| ExchangeError::Poisoned)
    }

    /// Wakes every waiting node when `result` is an error, so that a failure
    /// recorded on a group reaches the peers blocked on it.
    fn notify_on_err<T>(&self, result: Result<T, ExchangeError>) -> Result<T, ExchangeError> {
        if result.is_err() {
            self.fabric.changed.notify_all();
        }
        result
    }

    /// Blocks until `poll` yields a value for `group`, the group fails, or the
    /// run is aborted.
    fn wait_for<T>(
        &self,
        mut state: MutexGuard<'_, FabricState>,
        group: &str,
        mut poll: impl FnMut(&mut GroupState) -> Option<T>,
    ) -> Result<T, ExchangeError> {
        loop {
            state.check_aborted()?;
            let slot = state.group_mut(group)?;
            if let Some(err) = &slot.failure {
                return Err(err.clone());
            }
            if let Some(value) = poll(slot) {
                self.fabric.changed.notify_all();
                return Ok(value);
            }
            state = self
                .fabric
                .changed
                .wait(state)
                .map_err(|_| ExchangeError::Poisoned)?;
        }
    }

    fn check_block_count(
        &self,
        group: &ExchangeGroup,
        blocks: &[Vec<f64>],
    ) -> Result<(), ExchangeError> {
        if blocks.len() == self.fabric.num_nodes {
            Ok(())
        } else {
            Err(ExchangeError::BlockCount {
                group: group.name().to_string(),
                node: self.rank,
                expected: self.fabric.num_nodes,
                found: blocks.len(),
            })
        }
    }

    fn wrong_role(&self, group: &ExchangeGroup, op: &'static str) -> ExchangeError {
        ExchangeError::WrongRole {
            group: group.name().to_string(),
            node: self.rank,
            kind: group.kind(),
            op,
        }
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_nodes(&self) -> usize {
        self.fabric.num_nodes
    }

    fn create_group(&self, name: &str, kind: GroupKind) -> Result<ExchangeGroup, ExchangeError> {
        let mut state = self.lock()?;
        state.check_aborted()?;

        let num_sites = self.fabric.num_nodes;
        let group = state
            .groups
            .entry(name.to_string())
            .or_insert_with(|| GroupState::new(kind, num_sites));

        if group.kind != kind {
            let err = ExchangeError::GroupMismatch {
                group: name.to_string(),
                node: self.rank,
                existing: group.kind,
                requested: kind,
            };
            group.failure = Some(err.clone());
            return self.notify_on_err(Err(err));
        }

        debug!(node = self.rank, group = name, %kind, "joined exchange group");
        Ok(ExchangeGroup::new(name.to_string(), kind, num_sites))
    }

    fn scatter_to(
        &self,
        group: &ExchangeGroup,
        round: Round,
        mut blocks: Vec<Vec<f64>>,
    ) -> Result<Vec<f64>, ExchangeError> {
        if group.root() != Some(self.rank) {
            return Err(self.wrong_role(group, "scatter_to"));
        }
        self.check_block_count(group, &blocks)?;

        let mut state = self.lock()?;
        state.check_aborted()?;
        let slot = state.group_mut(group.name())?;
        self.notify_on_err(slot.claim_round(group.name(), self.rank, round))?;

        let own = mem::take(&mut blocks[self.rank]);
        let num_sites = blocks.len();
        if num_sites > 1 {
            let mut pending = RoundSlot::new(num_sites, num_sites - 1);
            pending.deposit(
                self.rank,
                blocks
                    .into_iter()
                    .enumerate()
                    .map(|(to, block)| (to != self.rank).then_some(block))
                    .collect(),
            );
            slot.rounds.insert(round.value(), pending);
        }
        drop(state);

        self.fabric.changed.notify_all();
        Ok(own)
    }

    fn scatter_from(&self, group: &ExchangeGroup, round: Round) -> Result<Vec<f64>, ExchangeError> {
        let root = match group.root() {
            Some(root) if root != self.rank => root,
            _ => return Err(self.wrong_role(group, "scatter_from")),
        };

        let mut state = self.lock()?;
        state.check_aborted()?;
        let slot = state.group_mut(group.name())?;
        self.notify_on_err(slot.claim_round(group.name(), self.rank, round))?;

        let rank = self.rank;
        self.wait_for(state, group.name(), |slot| {
            let (block, done) = {
                let pending = slot.rounds.get_mut(&round.value())?;
                let block = pending.take(root, rank)?;
                pending.collections_left -= 1;
                (block, pending.collections_left == 0)
            };
            if done {
                slot.rounds.remove(&round.value());
            }
            Some(block)
        })
    }

    fn all_to_all(
        &self,
        group: &ExchangeGroup,
        round: Round,
        blocks: Vec<Vec<f64>>,
    ) -> Result<Vec<Vec<f64>>, ExchangeError> {
        if group.kind() != GroupKind::AllToAll {
            return Err(self.wrong_role(group, "all_to_all"));
        }
        self.check_block_count(group, &blocks)?;

        let mut state = self.lock()?;
        state.check_aborted()?;
        let slot = state.group_mut(group.name())?;
        self.notify_on_err(slot.claim_round(group.name(), self.rank, round))?;

        let num_sites = blocks.len();
        slot.rounds
            .entry(round.value())
            .or_insert_with(|| RoundSlot::new(num_sites, num_sites))
            .deposit(self.rank, blocks.into_iter().map(Some).collect());
        self.fabric.changed.notify_all();

        let rank = self.rank;
        self.wait_for(state, group.name(), |slot| {
            let (received, done) = {
                let pending = slot.rounds.get_mut(&round.value())?;
                if pending.deposited < num_sites {
                    return None;
                }
                let received = (0..num_sites)
                    .map(|from| pending.take(from, rank))
                    .collect::<Option<Vec<_>>>()?;
                pending.collections_left -= 1;
                (received, pending.collections_left == 0)
            };
            if done {
                slot.rounds.remove(&round.value());
            }
            Some(received)
        })
    }

    fn abort(&self, reason: &str) {
        let mut state = self
            .fabric
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.aborted.is_none() {
            warn!(node = self.rank, reason, "aborting exchange fabric");
            state.aborted = Some(format!("node {}: {reason}", self.rank));
        }
        drop(state);
        self.fabric.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    /// Runs `f` once per node on its own thread and returns the results in rank order.
    fn on_every_node<T: Send>(
        world: Vec<LocalComm>,
        f: impl Fn(LocalComm) -> T + Sync,
    ) -> Vec<T> {
        thread::scope(|scope| {
            let handles: Vec<_> = world
                .into_iter()
                .map(|comm| scope.spawn(|| f(comm)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    /// Block `from -> to` holds a single value identifying both ends.
    fn blocks_of(from: usize, num_nodes: usize) -> Vec<Vec<f64>> {
        (0..num_nodes)
            .map(|to| vec![(10 * from + to) as f64])
            .collect()
    }

    #[test]
    fn test_all_to_all_delivers_blocks_by_source() {
        let received = on_every_node(LocalComm::create_world(3), |comm| {
            let group = comm.create_group("a2a", GroupKind::AllToAll).unwrap();
            comm.all_to_all(&group, Round::new(1), blocks_of(comm.rank(), 3))
                .unwrap()
        });

        for (to, blocks) in received.iter().enumerate() {
            let expected: Vec<_> = (0..3).map(|from| vec![(10 * from + to) as f64]).collect();
            assert_eq!(blocks, &expected);
        }
    }

    #[test]
    fn test_scatter_round_delivers_every_block() {
        let received = on_every_node(LocalComm::create_world(3), |comm| {
            let groups: Vec<_> = (0..3)
                .map(|root| {
                    comm.create_group(&format!("s/{root}"), GroupKind::Scatter { root })
                        .unwrap()
                })
                .collect();

            // Every node takes part in every group, sourcing only its own
            groups
                .iter()
                .map(|group| {
                    if group.root() == Some(comm.rank()) {
                        comm.scatter_to(group, Round::new(1), blocks_of(comm.rank(), 3))
                    } else {
                        comm.scatter_from(group, Round::new(1))
                    }
                    .unwrap()
                })
                .collect::<Vec<_>>()
        });

        for (to, blocks) in received.iter().enumerate() {
            let expected: Vec<_> = (0..3).map(|from| vec![(10 * from + to) as f64]).collect();
            assert_eq!(blocks, &expected);
        }
    }

    #[test]
    fn test_consecutive_rounds_do_not_mix() {
        let received = on_every_node(LocalComm::create_world(2), |comm| {
            let group = comm.create_group("a2a", GroupKind::AllToAll).unwrap();
            (1..=3)
                .map(|round| {
                    let blocks = vec![vec![round as f64]; 2];
                    comm.all_to_all(&group, Round::new(round), blocks).unwrap()
                })
                .collect::<Vec<_>>()
        });

        for per_node in received {
            for (round, blocks) in (1..=3).zip(per_node) {
                assert_eq!(blocks, vec![vec![f64::from(round)]; 2]);
            }
        }
    }

    #[test]
    fn test_single_node_world() {
        let world = LocalComm::create_world(1);
        let comm = &world[0];

        let scatter = comm
            .create_group("s/0", GroupKind::Scatter { root: 0 })
            .unwrap();
        assert_eq!(
            comm.scatter_to(&scatter, Round::new(1), vec![vec![1.0, 2.0]]),
            Ok(vec![1.0, 2.0])
        );

        let a2a = comm.create_group("a2a", GroupKind::AllToAll).unwrap();
        assert_eq!(
            comm.all_to_all(&a2a, Round::new(1), vec![vec![3.0]]),
            Ok(vec![vec![3.0]])
        );
    }

    #[test]
    fn test_skipped_round_is_a_protocol_violation() {
        let world = LocalComm::create_world(1);
        let group = world[0].create_group("a2a", GroupKind::AllToAll).unwrap();

        let err = world[0]
            .all_to_all(&group, Round::new(2), vec![vec![0.0]])
            .unwrap_err();
        assert_eq!(
            err,
            ExchangeError::RoundMismatch {
                group: "a2a".into(),
                node: 0,
                expected: 1,
                found: 2,
            }
        );

        // The group stays failed
        assert_eq!(
            world[0].all_to_all(&group, Round::new(1), vec![vec![0.0]]),
            Err(err)
        );
    }

    #[test]
    fn test_round_mismatch_reaches_waiting_peer() {
        let results = on_every_node(LocalComm::create_world(2), |comm| {
            let group = comm.create_group("a2a", GroupKind::AllToAll).unwrap();
            // Node 1 is one generation ahead
            let round = Round::new(1 + comm.rank() as u64);
            comm.all_to_all(&group, round, vec![vec![0.0]; 2])
        });

        let expected = ExchangeError::RoundMismatch {
            group: "a2a".into(),
            node: 1,
            expected: 1,
            found: 2,
        };
        assert_eq!(results[1], Err(expected.clone()));
        // Node 0 either saw the failure while waiting or on entry
        assert_eq!(results[0], Err(expected));
    }

    #[test]
    fn test_wrong_roles_are_rejected() {
        let world = LocalComm::create_world(2);
        let group = world[1]
            .create_group("s/0", GroupKind::Scatter { root: 0 })
            .unwrap();

        // Only the root may source the group
        assert_eq!(
            world[1].scatter_to(&group, Round::new(1), vec![Vec::new(); 2]),
            Err(ExchangeError::WrongRole {
                group: "s/0".into(),
                node: 1,
                kind: GroupKind::Scatter { root: 0 },
                op: "scatter_to",
            })
        );
        // And the root never receives through it
        assert!(matches!(
            world[0].scatter_from(&group, Round::new(1)),
            Err(ExchangeError::WrongRole { node: 0, .. })
        ));
        // A scatter group is not an all-to-all group
        assert!(matches!(
            world[0].all_to_all(&group, Round::new(1), vec![Vec::new(); 2]),
            Err(ExchangeError::WrongRole {
                op: "all_to_all",
                ..
            })
        ));
    }

    #[test]
    fn test_block_count_is_checked() {
        let world = LocalComm::create_world(2);
        let group = world[0].create_group("a2a", GroupKind::AllToAll).unwrap();

        assert_eq!(
            world[0].all_to_all(&group, Round::new(1), vec![Vec::new(); 3]),
            Err(ExchangeError::BlockCount {
                group: "a2a".into(),
                node: 0,
                expected: 2,
                found: 3,
            })
        );
    }

    #[test]
    fn test_unknown_group() {
        let world = LocalComm::create_world(2);
        let group = ExchangeGroup::new("missing".into(), GroupKind::AllToAll, 2);

        assert_eq!(
            world[0].all_to_all(&group, Round::new(1), vec![Vec::new(); 2]),
            Err(ExchangeError::UnknownGroup("missing".into()))
        );
    }

    #[test]
    fn test_abort_wakes_blocked_receiver() {
        let results = on_every_node(LocalComm::create_world(2), |comm| {
            if comm.rank() == 0 {
                // Waits for a block node 1 never sends, unless the abort
                // already landed before the group was joined
                comm.create_group("s/1", GroupKind::Scatter { root: 1 })
                    .and_then(|group| comm.scatter_from(&group, Round::new(1)))
                    .map(|_| ())
            } else {
                comm.abort("configuration error");
                Ok(())
            }
        });

        assert_eq!(
            results[0],
            Err(ExchangeError::Aborted {
                reason: "node 1: configuration error".into()
            })
        );
        assert_eq!(results[1], Ok(()));
    }

    #[test]
    fn test_abort_blocks_later_group_creation() {
        let world = LocalComm::create_world(2);
        world[1].abort("bad input");

        assert!(matches!(
            world[0].create_group("a2a", GroupKind::AllToAll),
            Err(ExchangeError::Aborted { .. })
        ));
    }
}
