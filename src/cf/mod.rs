//! Control-flow abstractions and passes.
//!
//! Functions are trees of structured control-flow [`Node`](crate::Node)s
//! (`If`, `Loop`) with `Block`s as their leaves, and there is no flat list of
//! blocks anywhere: program order is always derived from the tree, see
//! [`next_block`]/[`prev_block`].

// NOTE(tilir) all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod linearize;
pub mod lower;

pub use linearize::{
    first_block_in, first_block_in_list, last_block_in, last_block_in_list, next_block,
    prev_block,
};
