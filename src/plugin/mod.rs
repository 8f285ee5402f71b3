//! Card definition module loading and the synthetic card it serves

pub mod abi;
pub mod card;
pub mod node;

pub use abi::{CardOps, NodeType, CARD_MODULE, CARD_OPS_SYMBOL, VIRTUAL_CARD};
pub use node::SndNode;
