//! Work Node Tree
//!
//! The persistent, mutable representation of what is currently rendered and
//! what is being computed. See [`FiberArena`] for the dual-buffer discipline.

mod arena;
mod node;

pub use arena::{Children, FiberArena};
pub use node::{Flags, MemoizedState, StateNode, WorkNode, WorkTag, MUTATION_MASK};

slotmap::new_key_type! {
    /// Generational handle to a work node in a [`FiberArena`].
    pub struct NodeId;
}
