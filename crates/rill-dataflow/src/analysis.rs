use rill_icfg::Edge;

/// The capability set a concrete analysis supplies to the solver.
///
/// The solver never inspects a `Fact`; it only creates facts through
/// [`InterAnalysis::boundary_fact`] / [`InterAnalysis::initial_fact`],
/// combines them with [`InterAnalysis::meet_into`], and transforms them with
/// the two transfer functions.
///
/// For the solver to terminate, the fact lattice must have finite height
/// along every chain reachable from the seeded facts, and `meet_into` /
/// `transfer_node` must be monotone. The solver does not check this; a
/// non-monotone analysis loops forever (see [`crate::solve_bounded`] for a
/// caller-imposed ceiling).
pub trait InterAnalysis<N> {
    type Fact;

    /// The fact holding at the out edge of a program entry node before any
    /// transfer runs (e.g. "parameters hold unknown values").
    fn boundary_fact(&self, node: N) -> Self::Fact;

    /// The lattice zero: seeded at every non-entry node and used as the
    /// accumulator base of the meet over incoming edges.
    fn initial_fact(&self) -> Self::Fact;

    /// Destructively merge `source` into `acc`.
    ///
    /// Must be associative, commutative, and idempotent; `source` is always a
    /// fact freshly produced by [`InterAnalysis::transfer_edge`], so the
    /// implementation may cannibalize it.
    fn meet_into(&self, source: Self::Fact, acc: &mut Self::Fact);

    /// The fact flowing along `edge`, given the current out-fact of the edge
    /// source. Pure; `source_out` is not modified.
    fn transfer_edge(&self, edge: &Edge<N>, source_out: &Self::Fact) -> Self::Fact;

    /// Recompute `out_fact` from `in_fact` in place, returning whether
    /// `out_fact` changed.
    fn transfer_node(&self, node: N, in_fact: &Self::Fact, out_fact: &mut Self::Fact) -> bool;
}
