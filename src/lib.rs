//! MIND loop graphs: while loop construction and differentiation over a
//! cyclic dataflow graph.
//!
//! ```
//! use mind_loops::eval::Executor;
//! use mind_loops::graph::{Graph, GraphError, Output, Scope};
//! use mind_loops::ops;
//!
//! let mut graph = Graph::new();
//! let root = Scope::root();
//! let zero = ops::const_i32(&mut graph, &root, 0).unwrap();
//! let out = ops::build_while_loop(
//!     &mut graph,
//!     &root,
//!     &[zero],
//!     |g: &mut Graph, s: &Scope, xs: &[Output]| {
//!         let five = ops::const_i32(g, s, 5)?;
//!         ops::less(g, s, xs[0], five)
//!     },
//!     |g: &mut Graph, s: &Scope, xs: &[Output]| {
//!         let one = ops::const_i32(g, s, 1)?;
//!         Ok::<_, GraphError>(vec![ops::add(g, s, xs[0], one)?])
//!     },
//!     "count",
//!     false,
//! )
//! .unwrap();
//! let values = Executor::new(&graph).run(&out.outputs).unwrap();
//! assert_eq!(values[0].as_i64(), Some(5));
//! ```
pub mod eval;
pub mod graph;
pub mod ops;
pub mod shapes;
pub mod types;

#[cfg(feature = "autodiff")]
pub mod autodiff;
