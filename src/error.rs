//! The engine's error taxonomy (§7 of the design).
//!
//! Fatal kinds (`InvalidInput`, `UnknownHelper`, `InvalidRule`, `HelperNotFound`,
//! `CallbackNotFound`, `AsyncHelperInSync`) surface as `Err(EngineError)` from the
//! method that detected them. Data-quality kinds (`HelperFailure`, `TypeMismatch`)
//! never escape as errors — the [`crate::error_handler`] normalises them into
//! [`crate::compiler::Diagnostic`] values instead. This module only models the
//! fatal half; the accumulated half lives in `error_handler.rs`.

use log::Level;
use serde::Serialize;
use std::collections::BTreeMap;

pub type EngineResult<T> = Result<T, EngineError>;

/// Free-form context attached to an [`EngineError`], following the same
/// accreting-builder shape as a structured log record: callers narrow down
/// *which* rule/field/helper triggered the error without the enum itself
/// needing a field for every possible detail.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ErrorContext {
    #[must_use]
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One variant per row of the error-kind table; each carries the
/// [`ErrorContext`] that pinpoints what was being compiled or executed.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum EngineError {
    #[error("invalid input: record is not a mapping ({context:?})")]
    InvalidInput { context: ErrorContext },

    #[error("unknown helper '{}': {context:?}", context.op.as_deref().unwrap_or(""))]
    UnknownHelper { context: ErrorContext },

    #[error("invalid rule: {context:?}")]
    InvalidRule { context: ErrorContext },

    #[error("helper not found: {context:?}")]
    HelperNotFound { context: ErrorContext },

    #[error("callback not found: {context:?}")]
    CallbackNotFound { context: ErrorContext },

    #[error("synchronous validate encountered an async helper: {context:?}")]
    AsyncHelperInSync { context: ErrorContext },
}

impl EngineError {
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::InvalidInput {
            context: ErrorContext::default().with_detail(detail),
        }
    }

    pub fn unknown_helper(op: impl Into<String>) -> Self {
        Self::UnknownHelper {
            context: ErrorContext::default().with_op(op),
        }
    }

    pub fn invalid_rule(op: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidRule {
            context: ErrorContext::default().with_op(op).with_detail(detail),
        }
    }

    pub fn helper_not_found(name: impl Into<String>) -> Self {
        Self::HelperNotFound {
            context: ErrorContext::default().with_op(name),
        }
    }

    pub fn callback_not_found(name: impl Into<String>) -> Self {
        Self::CallbackNotFound {
            context: ErrorContext::default().with_detail(name.into()),
        }
    }

    pub fn async_helper_in_sync(op: impl Into<String>) -> Self {
        Self::AsyncHelperInSync {
            context: ErrorContext::default().with_op(op),
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            EngineError::InvalidInput { context }
            | EngineError::UnknownHelper { context }
            | EngineError::InvalidRule { context }
            | EngineError::HelperNotFound { context }
            | EngineError::CallbackNotFound { context }
            | EngineError::AsyncHelperInSync { context } => context,
        }
    }

    fn default_log_level(&self) -> Level {
        match self {
            EngineError::InvalidInput { .. } | EngineError::AsyncHelperInSync { .. } => {
                Level::Warn
            }
            _ => Level::Error,
        }
    }

    /// Emit this error through the `log` facade at its default severity.
    /// The engine never writes to stdout/stderr directly — the logger-sink
    /// interface of §6 is this method plus the `debug!`/`info!` calls made
    /// directly from the engine for non-error diagnostics.
    pub fn log(&self) {
        self.log_with_level(self.default_log_level());
    }

    pub fn log_with_level(&self, level: Level) {
        match level {
            Level::Error => log::error!(target: "validex::error", "{self}"),
            Level::Warn => log::warn!(target: "validex::error", "{self}"),
            Level::Info => log::info!(target: "validex::error", "{self}"),
            Level::Debug | Level::Trace => log::debug!(target: "validex::error", "{self}"),
        }
    }
}

/// Mirrors the teacher's `ServiceResultExt`: lets call sites attach context
/// or log-on-error without an explicit `match`.
pub trait EngineResultExt<T> {
    fn attach_context(self, builder: impl FnOnce(ErrorContext) -> ErrorContext) -> EngineResult<T>;
    fn log_on_error(self, level: Level) -> EngineResult<T>;
}

impl<T> EngineResultExt<T> for EngineResult<T> {
    fn attach_context(self, builder: impl FnOnce(ErrorContext) -> ErrorContext) -> EngineResult<T> {
        self.map_err(|err| match err {
            EngineError::InvalidInput { context } => EngineError::InvalidInput {
                context: builder(context),
            },
            EngineError::UnknownHelper { context } => EngineError::UnknownHelper {
                context: builder(context),
            },
            EngineError::InvalidRule { context } => EngineError::InvalidRule {
                context: builder(context),
            },
            EngineError::HelperNotFound { context } => EngineError::HelperNotFound {
                context: builder(context),
            },
            EngineError::CallbackNotFound { context } => EngineError::CallbackNotFound {
                context: builder(context),
            },
            EngineError::AsyncHelperInSync { context } => EngineError::AsyncHelperInSync {
                context: builder(context),
            },
        })
    }

    fn log_on_error(self, level: Level) -> EngineResult<T> {
        if let Err(err) = &self {
            err.log_with_level(level);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_helper_carries_op_in_context() {
        let err = EngineError::unknown_helper("frobnicate");
        assert_eq!(err.context().op.as_deref(), Some("frobnicate"));
    }

    #[test]
    fn attach_context_preserves_variant() {
        let result: EngineResult<()> = Err(EngineError::invalid_input("not a mapping"));
        let err = result
            .attach_context(|ctx| ctx.with_field("root"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
        assert_eq!(err.context().field.as_deref(), Some("root"));
        assert_eq!(err.context().detail.as_deref(), Some("not a mapping"));
    }
}
