use std::collections::HashSet;

use rill_collections::SetQueue;
use rill_icfg::Icfg;
use thiserror::Error;

use crate::{DataflowResult, InterAnalysis};

/// A bounded solve exhausted its step budget before the worklist drained.
///
/// The partially computed facts are withheld: a store that has not converged
/// is not a sound analysis result and must not be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("data-flow analysis did not converge within {max_steps} worklist steps")]
pub struct NotConverged {
    pub max_steps: usize,
}

/// Run `analysis` over `icfg` to a fixpoint.
///
/// Entry nodes are seeded with [`InterAnalysis::boundary_fact`], every other
/// node with [`InterAnalysis::initial_fact`]. The worklist loop then
/// recomputes each pending node's in-fact as the meet over its incoming
/// edges (each edge transferred independently, multi-edges between the same
/// pair included), reruns the node transfer, and re-enqueues the node's
/// successors whenever its out-fact changed.
///
/// Does not return until the fixpoint is reached: an analysis whose lattice
/// has infinite ascending chains, or whose transfer functions are not
/// monotone, diverges here. Use [`solve_bounded`] to impose a ceiling.
pub fn solve<G, A>(icfg: &G, analysis: &A) -> DataflowResult<G::Node, A::Fact>
where
    G: Icfg,
    A: InterAnalysis<G::Node>,
{
    let (mut result, mut worklist) = seed(icfg, analysis);
    let mut steps = 0usize;
    while let Some(node) = worklist.pop() {
        step(icfg, analysis, &mut result, &mut worklist, node);
        steps += 1;
    }
    finalize(icfg, analysis, &mut result);
    tracing::debug!(steps, "data-flow fixpoint reached");
    result
}

/// [`solve`], but giving up after `max_steps` worklist pops.
///
/// This is the convergence ceiling for callers that cannot trust an analysis
/// to be monotone (user-supplied transfer functions, lattices of unknown
/// height). On a well-behaved analysis the result equals [`solve`]'s.
pub fn solve_bounded<G, A>(
    icfg: &G,
    analysis: &A,
    max_steps: usize,
) -> Result<DataflowResult<G::Node, A::Fact>, NotConverged>
where
    G: Icfg,
    A: InterAnalysis<G::Node>,
{
    let (mut result, mut worklist) = seed(icfg, analysis);
    let mut steps = 0usize;
    while !worklist.is_empty() {
        if steps == max_steps {
            tracing::debug!(max_steps, pending = worklist.len(), "step budget exhausted");
            return Err(NotConverged { max_steps });
        }
        let Some(node) = worklist.pop() else { break };
        step(icfg, analysis, &mut result, &mut worklist, node);
        steps += 1;
    }
    finalize(icfg, analysis, &mut result);
    tracing::debug!(steps, "data-flow fixpoint reached");
    Ok(result)
}

/// Seed out-facts and the worklist.
///
/// Entry nodes start from their fixed boundary fact and are left off the
/// worklist; they are only (re-)evaluated if some edge targets them and its
/// source changes.
fn seed<G, A>(icfg: &G, analysis: &A) -> (DataflowResult<G::Node, A::Fact>, SetQueue<G::Node>)
where
    G: Icfg,
    A: InterAnalysis<G::Node>,
{
    let entries: HashSet<G::Node> = icfg
        .entry_procs()
        .map(|proc| icfg.entry_node(proc))
        .collect();

    let mut result = DataflowResult::new();
    let mut worklist = SetQueue::new();
    let mut nodes = 0usize;
    for node in icfg.nodes() {
        let fact = if entries.contains(&node) {
            analysis.boundary_fact(node)
        } else {
            analysis.initial_fact()
        };
        result.set_out_fact(node, fact);
        worklist.push(node);
        nodes += 1;
    }
    for entry in &entries {
        worklist.remove(entry);
    }

    tracing::debug!(nodes, entries = entries.len(), "seeded data-flow worklist");
    (result, worklist)
}

/// Re-evaluate one node: meet over incoming edges, then node transfer.
fn step<G, A>(
    icfg: &G,
    analysis: &A,
    result: &mut DataflowResult<G::Node, A::Fact>,
    worklist: &mut SetQueue<G::Node>,
    node: G::Node,
) where
    G: Icfg,
    A: InterAnalysis<G::Node>,
{
    let mut acc = analysis.initial_fact();
    for edge in icfg.in_edges(node) {
        let source_out = result
            .out_fact(edge.source)
            .expect("out-facts are seeded for every node");
        let edge_fact = analysis.transfer_edge(edge, source_out);
        analysis.meet_into(edge_fact, &mut acc);
    }
    result.set_in_fact(node, acc);

    let (in_fact, out_fact) = result.transfer_slot(node);
    if analysis.transfer_node(node, in_fact, out_fact) {
        worklist.extend(icfg.successors(node));
    }
}

/// Fill in the in-facts of nodes the loop never popped.
///
/// Only entry nodes can end the loop without an in-fact (they are excluded
/// from the initial worklist). Their in-fact is the same meet over incoming
/// edges the loop would have computed, evaluated against the final out-facts;
/// their boundary out-fact is left untouched.
fn finalize<G, A>(icfg: &G, analysis: &A, result: &mut DataflowResult<G::Node, A::Fact>)
where
    G: Icfg,
    A: InterAnalysis<G::Node>,
{
    for node in icfg.nodes() {
        if result.in_fact(node).is_some() {
            continue;
        }
        let mut acc = analysis.initial_fact();
        for edge in icfg.in_edges(node) {
            let source_out = result
                .out_fact(edge.source)
                .expect("out-facts are seeded for every node");
            let edge_fact = analysis.transfer_edge(edge, source_out);
            analysis.meet_into(edge_fact, &mut acc);
        }
        result.set_in_fact(node, acc);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    use rill_icfg::{Edge, EdgeKind, IcfgBuilder, ProgramIcfg};

    use super::*;

    const CALL_TAG: u32 = 901;
    const RETURN_TAG: u32 = 902;
    const CALL_TO_RETURN_TAG: u32 = 903;

    /// May-analysis over sets of node ids: meet is union, the node transfer
    /// copies the in-fact to the out-fact, and interprocedural edges tag the
    /// flowing fact with their kind.
    struct Union;

    impl Union {
        fn tag(kind: EdgeKind) -> Option<u32> {
            match kind {
                EdgeKind::Normal => None,
                EdgeKind::Call => Some(CALL_TAG),
                EdgeKind::Return => Some(RETURN_TAG),
                EdgeKind::CallToReturn => Some(CALL_TO_RETURN_TAG),
            }
        }
    }

    impl InterAnalysis<u32> for Union {
        type Fact = BTreeSet<u32>;

        fn boundary_fact(&self, node: u32) -> Self::Fact {
            BTreeSet::from([node])
        }

        fn initial_fact(&self) -> Self::Fact {
            BTreeSet::new()
        }

        fn meet_into(&self, source: Self::Fact, acc: &mut Self::Fact) {
            acc.extend(source);
        }

        fn transfer_edge(&self, edge: &Edge<u32>, source_out: &Self::Fact) -> Self::Fact {
            let mut fact = source_out.clone();
            fact.extend(Self::tag(edge.kind));
            fact
        }

        fn transfer_node(&self, _node: u32, in_fact: &Self::Fact, out_fact: &mut Self::Fact) -> bool {
            let changed = out_fact != in_fact;
            if changed {
                *out_fact = in_fact.clone();
            }
            changed
        }
    }

    fn set(ids: impl IntoIterator<Item = u32>) -> BTreeSet<u32> {
        ids.into_iter().collect()
    }

    #[test]
    fn isolated_node_converges_in_one_pop() {
        let mut b: IcfgBuilder<&str, u32> = IcfgBuilder::new();
        b.add_node(1);
        let icfg = b.build();

        assert_eq!(
            solve_bounded(&icfg, &Union, 0).unwrap_err(),
            NotConverged { max_steps: 0 }
        );

        let result = solve_bounded(&icfg, &Union, 1).expect("one pop suffices");
        assert_eq!(result.in_fact(1), Some(&set([])));
        assert_eq!(result.out_fact(1), Some(&set([])));
    }

    #[test]
    fn boundary_fact_flows_to_successor() {
        let mut b = IcfgBuilder::new();
        b.add_entry("main", 0);
        b.add_edge(EdgeKind::Normal, 0, 1);
        let icfg = b.build();

        let result = solve(&icfg, &Union);
        assert_eq!(result.out_fact(0), Some(&set([0])));
        assert_eq!(result.in_fact(1), Some(&set([0])));
        assert_eq!(result.out_fact(1), Some(&set([0])));
        // The entry has no incoming edges, so its in-fact is the meet zero.
        assert_eq!(result.in_fact(0), Some(&set([])));
    }

    #[test]
    fn parallel_edges_both_reach_the_meet() {
        let mut b = IcfgBuilder::new();
        b.add_entry("main", 1);
        b.add_edge(EdgeKind::Call, 1, 2);
        b.add_edge(EdgeKind::CallToReturn, 1, 2);
        let icfg = b.build();

        let result = solve(&icfg, &Union);
        // One edge contributes the call tag, the other the call-to-return
        // tag; the in-fact of the target is their meet, not either one alone.
        assert_eq!(
            result.in_fact(2),
            Some(&set([1, CALL_TAG, CALL_TO_RETURN_TAG]))
        );
    }

    #[test]
    fn two_node_cycle_reaches_top_within_three_pops() {
        let mut b = IcfgBuilder::new();
        b.add_entry("main", 0);
        b.add_edge(EdgeKind::Normal, 0, 1);
        b.add_edge(EdgeKind::Normal, 1, 2);
        b.add_edge(EdgeKind::Normal, 2, 1);
        let icfg = b.build();

        // Per-node chains have height two ({} then {0}), so the cycle needs
        // one extra pop after both nodes first change: 1, 2, then 1 again.
        assert_eq!(
            solve_bounded(&icfg, &Union, 2).unwrap_err(),
            NotConverged { max_steps: 2 }
        );
        let result = solve_bounded(&icfg, &Union, 3).expect("cycle stabilizes in three pops");
        assert_eq!(result.out_fact(1), Some(&set([0])));
        assert_eq!(result.out_fact(2), Some(&set([0])));
    }

    #[test]
    fn entry_targeted_by_an_edge_is_reevaluated() {
        let mut b = IcfgBuilder::new();
        b.add_entry("main", 0);
        b.add_edge(EdgeKind::Normal, 0, 1);
        b.add_edge(EdgeKind::Normal, 1, 0);
        let icfg = b.build();

        let result = solve(&icfg, &Union);
        // Node 1's change re-enqueues the entry, whose in-fact is then
        // computed by the loop itself rather than left to finalization.
        assert_eq!(result.in_fact(0), Some(&set([0])));
        assert_eq!(result.out_fact(0), Some(&set([0])));
    }

    /// [`Union`] with a journal of every out-fact a node transfer produced.
    struct LoggingUnion {
        journal: RefCell<Vec<(u32, BTreeSet<u32>)>>,
    }

    impl InterAnalysis<u32> for LoggingUnion {
        type Fact = BTreeSet<u32>;

        fn boundary_fact(&self, node: u32) -> Self::Fact {
            Union.boundary_fact(node)
        }

        fn initial_fact(&self) -> Self::Fact {
            Union.initial_fact()
        }

        fn meet_into(&self, source: Self::Fact, acc: &mut Self::Fact) {
            Union.meet_into(source, acc);
        }

        fn transfer_edge(&self, edge: &Edge<u32>, source_out: &Self::Fact) -> Self::Fact {
            Union.transfer_edge(edge, source_out)
        }

        fn transfer_node(&self, node: u32, in_fact: &Self::Fact, out_fact: &mut Self::Fact) -> bool {
            let changed = Union.transfer_node(node, in_fact, out_fact);
            self.journal
                .borrow_mut()
                .push((node, out_fact.clone()));
            changed
        }
    }

    #[test]
    fn out_facts_grow_monotonically() {
        let mut b = IcfgBuilder::new();
        b.add_entry("main", 0);
        b.add_edge(EdgeKind::Normal, 0, 1);
        b.add_edge(EdgeKind::Normal, 1, 2);
        b.add_edge(EdgeKind::Normal, 2, 3);
        b.add_edge(EdgeKind::Normal, 3, 1);
        b.add_edge(EdgeKind::Call, 2, 4);
        b.add_edge(EdgeKind::Return, 4, 3);
        let icfg: ProgramIcfg<&str, u32> = b.build();

        let analysis = LoggingUnion {
            journal: RefCell::new(Vec::new()),
        };
        let _ = solve(&icfg, &analysis);

        let journal = analysis.journal.into_inner();
        for node in icfg.nodes() {
            let history: Vec<_> = journal
                .iter()
                .filter(|(logged, _)| *logged == node)
                .map(|(_, fact)| fact)
                .collect();
            for pair in history.windows(2) {
                assert!(
                    pair[0].is_subset(pair[1]),
                    "out-fact of node {node} shrank from {:?} to {:?}",
                    pair[0],
                    pair[1]
                );
            }
        }
    }
}
