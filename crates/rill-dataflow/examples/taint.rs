//! Taint propagation over a two-procedure program.
//!
//! `main` reads untrusted input into `x` and calls `render(x)`; the call edge
//! binds the argument to the callee parameter, the call-to-return edge
//! carries the caller-local state across the call, and the return edge comes
//! back empty (nothing tainted is returned). Run with
//! `RUST_LOG=rill_dataflow=debug` to watch the solver converge.

use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use rill_dataflow::{solve_bounded, InterAnalysis};
use rill_icfg::{Edge, EdgeKind, Icfg, IcfgBuilder};

type Node = u32;
type Taint = BTreeSet<&'static str>;

#[derive(Debug, Clone, Copy)]
enum Stmt {
    Nop,
    /// `dst` receives untrusted input.
    Source { dst: &'static str },
    /// `dst = src`.
    Assign {
        dst: &'static str,
        src: &'static str,
    },
    /// `var` is cleaned and no longer tainted.
    Sanitize { var: &'static str },
}

struct TaintAnalysis {
    stmts: HashMap<Node, Stmt>,
    /// Argument-to-parameter bindings of each call edge.
    calls: HashMap<(Node, Node), (&'static str, &'static str)>,
}

impl InterAnalysis<Node> for TaintAnalysis {
    type Fact = Taint;

    fn boundary_fact(&self, _node: Node) -> Taint {
        Taint::new()
    }

    fn initial_fact(&self) -> Taint {
        Taint::new()
    }

    fn meet_into(&self, source: Taint, acc: &mut Taint) {
        acc.extend(source);
    }

    fn transfer_edge(&self, edge: &Edge<Node>, source_out: &Taint) -> Taint {
        match edge.kind {
            EdgeKind::Normal | EdgeKind::CallToReturn => source_out.clone(),
            EdgeKind::Call => {
                let (arg, param) = self.calls[&(edge.source, edge.target)];
                if source_out.contains(arg) {
                    Taint::from([param])
                } else {
                    Taint::new()
                }
            }
            // `render` returns nothing tainted.
            EdgeKind::Return => Taint::new(),
        }
    }

    fn transfer_node(&self, node: Node, in_fact: &Taint, out_fact: &mut Taint) -> bool {
        let mut next = in_fact.clone();
        match self.stmts.get(&node).copied().unwrap_or(Stmt::Nop) {
            Stmt::Nop => {}
            Stmt::Source { dst } => {
                next.insert(dst);
            }
            Stmt::Assign { dst, src } => {
                if next.contains(src) {
                    next.insert(dst);
                } else {
                    next.remove(dst);
                }
            }
            Stmt::Sanitize { var } => {
                next.remove(var);
            }
        }
        let changed = *out_fact != next;
        *out_fact = next;
        changed
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // main:              render(p):
    //   0 entry            10 entry
    //   1 x = input()      11 html = p
    //   2 render(x)        12 exit
    //   3 (return site)
    //   4 y = x
    //   5 sanitize y
    let mut b = IcfgBuilder::new();
    b.add_entry("main", 0);
    b.add_edge(EdgeKind::Normal, 0, 1);
    b.add_edge(EdgeKind::Normal, 1, 2);
    b.add_edge(EdgeKind::Call, 2, 10);
    b.add_edge(EdgeKind::Normal, 10, 11);
    b.add_edge(EdgeKind::Normal, 11, 12);
    b.add_edge(EdgeKind::Return, 12, 3);
    b.add_edge(EdgeKind::CallToReturn, 2, 3);
    b.add_edge(EdgeKind::Normal, 3, 4);
    b.add_edge(EdgeKind::Normal, 4, 5);
    let icfg = b.build();

    let analysis = TaintAnalysis {
        stmts: HashMap::from([
            (1, Stmt::Source { dst: "x" }),
            (4, Stmt::Assign { dst: "y", src: "x" }),
            (5, Stmt::Sanitize { var: "y" }),
            (11, Stmt::Assign { dst: "html", src: "p" }),
        ]),
        calls: HashMap::from([((2, 10), ("x", "p"))]),
    };

    let result =
        solve_bounded(&icfg, &analysis, 10_000).context("taint analysis did not stabilize")?;

    for node in icfg.nodes() {
        println!(
            "node {node:>2}: in={:?} out={:?}",
            result.in_fact(node).unwrap(),
            result.out_fact(node).unwrap(),
        );
    }
    Ok(())
}
