//! Bayesian symbolic regression by reversible-jump MCMC.
//!
//! A [Chain] samples closed-form formulas from the posterior over expression
//! trees, balancing data fit (BIC, computed through a nonlinear
//! least-squares [Fitter]) against a prior that penalizes operator usage.
//! Three move families drive the walk: root replacement/pruning, long-range
//! relabeling, and elementary-tree replacement.
//!
//! ```
//! use conjecture::{Chain, Config, DataSet, Frame};
//!
//! let x = Frame::new().with_column("x", vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let y = vec![3.0, 5.0, 7.0, 9.0];
//!
//! let config = Config {
//!     variables: vec!["x".into()],
//!     parameters: vec!["a0".into(), "a1".into()],
//!     burnin: 100,
//!     samples: 10,
//!     thin: 5,
//!     write_files: false,
//!     verbose: false,
//!     ..Config::default()
//! };
//!
//! let mut chain = Chain::new(config, DataSet::new(x, y).unwrap()).unwrap();
//! chain.run().unwrap();
//! ```

pub mod chain;
pub mod config;
pub mod data;
mod eval;
pub mod fit;
pub mod ops;
pub mod random_provider;
pub mod trace;
pub mod tree;

use std::collections::BTreeMap;

use compact_str::CompactString;

pub use chain::Chain;
pub use config::Config;
pub use conjecture_error::{ConjectureError, ConjectureResult, ErrorCode, ResultExt};
pub use data::{DataSet, Frame};
pub use fit::{Fitter, LevenbergMarquardt};
pub use ops::{OpSet, Term, default_ops};
pub use trace::TraceSink;
pub use tree::{EtPattern, EtWeights, Node, NodeBag, NodeId, RrPattern, Tree};

/// Current numeric values of the named parameters, keyed by parameter name.
/// Every declared parameter always has an entry (default 1.0).
pub type ParValues = BTreeMap<CompactString, f64>;
