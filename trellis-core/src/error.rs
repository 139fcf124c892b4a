//! Render-phase errors.
//!
//! Errors raised while computing a work-in-progress tree. They never escape
//! the commit phase: commit-time invariant violations are logged and skipped
//! instead, since a half-applied commit has no recovery path.
//!
//! The work loop distinguishes two families:
//!
//! - **Usage errors** ([`HookError`]): a component called its hooks in a
//!   different order or number than on its previous render. The attempt is
//!   unrecoverable as rendered.
//! - **Transient failures** ([`RenderError::Component`]): a component
//!   reported that it could not produce output this time.
//!
//! Both abort the current attempt; neither is ever partially committed.

use thiserror::Error;

use crate::update::Lane;

/// A violation of the local-state calling discipline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// The component asked for more local-state cells than it did last render.
    #[error("component `{component}` called more hooks than on its previous render (hook #{index})")]
    ExtraHook { component: String, index: usize },

    /// The component returned before reading every cell it had last render.
    #[error("component `{component}` called {rendered} hooks but its previous render called {expected}")]
    MissingHooks {
        component: String,
        expected: usize,
        rendered: usize,
    },

    /// A cell was read back as a different state type than it was created with.
    #[error("hook #{index} of `{component}` was created as a different state type")]
    TypeMismatch { component: String, index: usize },
}

/// Failure of a single render attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Hook(#[from] HookError),

    /// A component could not produce its output.
    #[error("component `{component}` failed: {message}")]
    Component { component: String, message: String },

    /// The configured retry cap was hit without a successful attempt.
    #[error("render for lane {lane:?} gave up after {attempts} attempts")]
    RetriesExhausted { lane: Lane, attempts: u32 },
}

impl RenderError {
    /// Build a component failure.
    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether this is a hook-discipline violation rather than a transient failure.
    pub fn is_fatal_usage(&self) -> bool {
        matches!(self, Self::Hook(_))
    }
}
