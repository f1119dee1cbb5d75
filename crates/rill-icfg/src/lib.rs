//! Interprocedural control-flow graph (ICFG) abstraction.
//!
//! An ICFG spans every statement of every analyzed procedure. Its edges carry
//! both ordinary intraprocedural flow and the call/return plumbing between
//! procedures, so a whole-program data-flow analysis can run over it without
//! knowing how the graph was built.

mod graph;

pub use crate::graph::{IcfgBuilder, ProgramIcfg};

use std::hash::Hash;

/// How a fact is allowed to flow along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Intraprocedural flow between two statements of the same procedure.
    Normal,
    /// From a call site to the entry of the callee.
    Call,
    /// From an exit of the callee back to the statement after the call.
    Return,
    /// From a call site directly to the statement after the call, bypassing
    /// the callee (carries the caller-local part of the state).
    CallToReturn,
}

/// A directed ICFG edge.
///
/// Two nodes may be connected by several edges of different kinds (a call
/// site and its return site are linked by both a `Call`/`Return` pair and a
/// `CallToReturn` edge); every edge flows facts independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge<N> {
    pub kind: EdgeKind,
    pub source: N,
    pub target: N,
}

/// Read-only view of an interprocedural control-flow graph.
///
/// `Proc` identifies an analyzed procedure and is only used to enumerate the
/// program's entry points; `Node` identifies a single program point.
pub trait Icfg {
    type Proc;
    type Node: Copy + Eq + Hash;

    /// Every node in the graph, across all procedures.
    fn nodes(&self) -> impl Iterator<Item = Self::Node> + '_;

    /// The procedures the program starts in.
    fn entry_procs(&self) -> impl Iterator<Item = &Self::Proc> + '_;

    /// The designated entry node of an entry procedure.
    ///
    /// # Panics
    ///
    /// May panic if `proc` was not yielded by [`Icfg::entry_procs`].
    fn entry_node(&self, proc: &Self::Proc) -> Self::Node;

    /// The distinct source nodes of `node`'s incoming edges.
    fn predecessors(&self, node: Self::Node) -> impl Iterator<Item = Self::Node> + '_;

    /// The distinct target nodes of `node`'s outgoing edges.
    fn successors(&self, node: Self::Node) -> impl Iterator<Item = Self::Node> + '_;

    /// All edges ending at `node`, multi-edges included.
    fn in_edges(&self, node: Self::Node) -> impl Iterator<Item = &Edge<Self::Node>> + '_;
}
