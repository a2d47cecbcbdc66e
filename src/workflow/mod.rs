pub mod action_ctx;
pub mod block_flow;

pub use action_ctx::{ActionCtx, ActionKind};
pub use block_flow::{BlockFlow, FlowOutcome};
