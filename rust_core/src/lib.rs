pub mod autodiff;
pub mod diagnostics;
pub mod distributions;
pub mod error;
pub mod eval;
pub mod graph;
pub mod hmc;
pub mod number;
pub mod operator;
pub mod out_nodes;
pub mod progress;
pub mod proposer;
pub mod sampler;
pub mod state;
pub mod value;

pub use distributions::DistributionKind;
pub use error::{GraphError, Result};
pub use graph::{Graph, Node, NodeId, NodeKind};
pub use hmc::Hmc;
pub use operator::UnaryOp;
pub use out_nodes::{out_node_indices, out_nodes};
pub use proposer::{GlobalProposer, ProposerConfig, RandomWalk};
pub use sampler::{GlobalMH, InferConfig, StepOutcome};
pub use state::GlobalState;
pub use value::{AtomicType, AtomicValue};

// Future: multi-site and single-site proposers can share the driver by
// proposing over a subset of the latent nodes.
