mod base_node;
mod node_16;
mod node_256;
mod node_4;
mod node_48;
mod node_linear;
mod node_ptr;

pub(crate) use base_node::{BaseNode, Node, NodeType, MAX_KEY_LEN, MAX_PREFIX_LEN};
pub(crate) use node_16::Node16;
pub(crate) use node_256::Node256;
pub(crate) use node_4::Node4;
pub(crate) use node_48::Node48;
pub(crate) use node_linear::{NodeLinear, LINEAR_FANOUT};
pub(crate) use node_ptr::{NodePtr, PtrType};
