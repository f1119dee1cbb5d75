//! Interprocedural data-flow analysis: the strategy interface, the per-node
//! fact store, and the worklist fixpoint solver.
//!
//! The solver is analysis-agnostic. A concrete analysis implements
//! [`InterAnalysis`] (lattice facts, meet, per-node and per-edge transfer
//! functions) against any graph implementing [`rill_icfg::Icfg`];
//! [`solve`] then drives the transfer functions to a fixpoint and returns the
//! stable in/out facts for every node.

mod analysis;
mod result;
mod solver;

pub use crate::analysis::InterAnalysis;
pub use crate::result::DataflowResult;
pub use crate::solver::{solve, solve_bounded, NotConverged};
