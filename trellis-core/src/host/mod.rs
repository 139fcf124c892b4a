//! Host Adapter
//!
//! The reconciler never touches a concrete visual surface. Everything it
//! needs from the host environment goes through [`HostConfig`]: create
//! elements and text, attach them, move them, remove them, and update text
//! content. Host objects are addressed by opaque [`InstanceId`]s handed out
//! by the adapter.
//!
//! Creation happens during the render phase (detached objects are built
//! bottom-up off-tree). Every other call happens during commit.

mod memory;

pub use memory::{HostOp, HostSnapshot, MemoryHost};

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::element::Props;

/// Opaque handle to a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Generate a new process-unique id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for InstanceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The capability set a host environment provides to the reconciler.
pub trait HostConfig: Send {
    /// Create a detached element of the given type.
    fn create_instance(&mut self, type_name: &str) -> InstanceId;

    /// Create a detached text node.
    fn create_text_instance(&mut self, content: &str) -> InstanceId;

    /// Append `child` as the last child of `parent`.
    fn append_child(&mut self, parent: InstanceId, child: InstanceId);

    /// Insert `child` into `parent` immediately before `before`.
    fn insert_before(&mut self, parent: InstanceId, child: InstanceId, before: InstanceId);

    /// Detach `child` from `parent`.
    fn remove_child(&mut self, parent: InstanceId, child: InstanceId);

    /// Replace the content of a text node.
    fn commit_text_update(&mut self, instance: InstanceId, content: &str);

    /// Record the latest committed properties of an element.
    ///
    /// Nothing in reconciliation reads these back; an event layer does.
    fn attach_props(&mut self, instance: InstanceId, props: &Props);
}
