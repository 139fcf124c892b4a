//! Trellis Core
//!
//! This crate provides the reconciliation engine for the Trellis UI
//! framework. It implements:
//!
//! - Desired-tree descriptions (elements, text, fragments, components)
//! - A dual-buffer work-node tree with incremental, keyed diffing
//! - Local component state (hooks) with per-lane update queues
//! - Priority lanes, coalesced scheduling and preemption
//! - A commit phase that applies the minimal set of host mutations
//!
//! The host environment is abstract: anything implementing
//! [`host::HostConfig`] can be driven. An in-memory host is included.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `element`: immutable desired trees and property bags
//! - `fiber`: the work-node arena and the dual-buffer discipline
//! - `update`: lanes, update queues and their fold
//! - `hooks`: local state for components
//! - `render`: the begin/complete render phase and child diffing
//! - `commit`: applying a finished tree to the host
//! - `scheduler`: deferred work and coalescing
//! - `reconciler` / `root`: the per-root session and its public handle
//!
//! # Example
//!
//! ```rust
//! use trellis_core::element::{Component, Element, Node};
//! use trellis_core::host::MemoryHost;
//! use trellis_core::root::create_root;
//!
//! let counter = Component::new("Counter", |_props, hooks| {
//!     let (count, _set_count) = hooks.use_state(5)?;
//!     Ok(Element::host("span").with_child(Node::from(count)).into())
//! });
//!
//! let host = MemoryHost::new();
//! let container = host.create_container();
//! let root = create_root(container, host.clone());
//!
//! root.render(Element::component(&counter));
//! root.flush_sync();
//!
//! assert_eq!(host.markup(container), "<span>5</span>");
//! ```

mod commit;
pub mod config;
pub mod element;
pub mod error;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod reconciler;
mod render;
pub mod root;
pub mod scheduler;
pub mod update;

pub use config::ReconcilerConfig;
pub use element::{Component, Element, Handler, Node, PropValue, Props};
pub use error::{HookError, RenderError};
pub use hooks::{Hooks, SetState};
pub use host::{HostConfig, InstanceId, MemoryHost};
pub use reconciler::{Reconciler, RenderStats};
pub use root::{create_root, create_root_with_config, RootHandle};
pub use update::{Lane, Lanes};
