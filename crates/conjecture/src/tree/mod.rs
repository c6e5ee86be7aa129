pub mod bag;
pub mod moves;
pub mod node;
pub mod space;
#[allow(clippy::module_inception)]
pub mod tree;

pub use bag::NodeBag;
pub use moves::EtWeights;
pub use node::{Node, NodeId};
pub use space::{EtPattern, RrPattern};
pub use tree::Tree;
