//! The Callback Manager (§4.8): registers named completion callbacks and
//! dispatches either a named or an inline one after a `validate` call.
//!
//! Grounded on the teacher's `error_pipeline::Pipeline<T>` in `error.rs`: a
//! named, composable unit of "do something with a result" invoked by a
//! caller-supplied reference rather than inline at every call site. Here the
//! dispatch key is a name-or-closure sum type instead of a step list.

use crate::engine::ValidationResult;
use crate::error::EngineError;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

pub type Callback = Rc<dyn Fn(&ValidationResult)>;

/// The second argument to `validate`/`validateAsync`: absent, a registered
/// name, or an inline closure supplied at the call site.
#[derive(Clone)]
pub enum CallbackRef {
    Named(String),
    Inline(Callback),
}

impl fmt::Debug for CallbackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            CallbackRef::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

impl CallbackRef {
    pub fn named(name: impl Into<String>) -> Self {
        CallbackRef::Named(name.into())
    }

    pub fn inline(f: impl Fn(&ValidationResult) + 'static) -> Self {
        CallbackRef::Inline(Rc::new(f))
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct CallbackManagerMetrics {
    pub active_callbacks: usize,
}

/// Stores named callbacks; engine-scoped, so `RefCell` suffices (§5).
pub struct CallbackManager {
    registry: std::cell::RefCell<IndexMap<String, Callback>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        CallbackManager {
            registry: std::cell::RefCell::new(IndexMap::new()),
        }
    }

    pub fn register(&self, name: impl Into<String>, callback: impl Fn(&ValidationResult) + 'static) {
        self.registry.borrow_mut().insert(name.into(), Rc::new(callback));
    }

    /// Register an already-boxed callback, as `Engine::new` does for the
    /// `callbacks` constructor argument.
    pub fn register_rc(&self, name: impl Into<String>, callback: Callback) {
        self.registry.borrow_mut().insert(name.into(), callback);
    }

    /// Route `callback_ref` to its target and invoke it with `result`.
    /// `CallbackNotFound` surfaces when a named callback isn't registered;
    /// inline callbacks can't fail to resolve since they carry their own
    /// closure.
    pub fn dispatch(&self, callback_ref: &CallbackRef, result: &ValidationResult) -> Result<(), EngineError> {
        match callback_ref {
            CallbackRef::Named(name) => {
                let callback = self
                    .registry
                    .borrow()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EngineError::callback_not_found(name.clone()))?;
                callback(result);
                Ok(())
            }
            CallbackRef::Inline(callback) => {
                callback(result);
                Ok(())
            }
        }
    }

    pub fn active_callbacks(&self) -> usize {
        self.registry.borrow().len()
    }

    pub fn metrics(&self) -> CallbackManagerMetrics {
        CallbackManagerMetrics {
            active_callbacks: self.active_callbacks(),
        }
    }
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}
