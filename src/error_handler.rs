//! The Error Handler (§4, leaf component referenced throughout §7): turns a
//! failed resolver outcome into a structured [`crate::compiler::Diagnostic`]
//! and tracks how many of each accumulated-error kind it has normalised.
//!
//! Fatal kinds (`UnknownHelper`, `InvalidRule`, ...) never reach this module —
//! they're returned as `Err(EngineError)` straight from the compiler/registry.
//! This module only handles the two accumulated kinds from §7's policy table:
//! `HelperFailure` and `TypeMismatch`.

use crate::compiler::{CompiledRule, Diagnostic};
use indexmap::IndexMap;

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct ErrorHandlerMetrics {
    pub diagnostics_emitted: u64,
    pub type_mismatches: u64,
    pub helper_failures: u64,
}

/// Stateless beyond its own counters: every `validate` call routes its
/// resolver failures through one shared handler so `getMetrics()` can report
/// a running total across the engine's lifetime.
#[derive(Default)]
pub struct ErrorHandler {
    metrics: std::cell::RefCell<ErrorHandlerMetrics>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the [`Diagnostic`] for one failed rule. `cause` is the resolver's
    /// `Err(String)` payload, which helpers prefix with `"TypeMismatch: "`
    /// when the failure is a wrongly-shaped argument rather than an ordinary
    /// verdict of `false` (see `helpers::type_mismatch`).
    pub fn build_diagnostic(&self, rule: &CompiledRule, cause: Option<String>) -> Diagnostic {
        let is_type_mismatch = cause
            .as_deref()
            .map(|c| c.starts_with("TypeMismatch"))
            .unwrap_or(false);

        let mut metrics = self.metrics.borrow_mut();
        metrics.diagnostics_emitted += 1;
        if is_type_mismatch {
            metrics.type_mismatches += 1;
        } else {
            metrics.helper_failures += 1;
        }
        drop(metrics);

        let message = rule
            .message_template
            .clone()
            .unwrap_or_else(|| self.default_message(rule, cause.as_deref()));

        Diagnostic {
            op: rule.op.clone(),
            field: rule.field.clone(),
            message,
            params: rule.params_echo.clone(),
            cause,
        }
    }

    fn default_message(&self, rule: &CompiledRule, cause: Option<&str>) -> String {
        match cause {
            Some(cause) => format!("'{}' failed on field '{}': {}", rule.op, rule.field, cause),
            None => format!(
                "'{}' failed on field '{}' (expected {})",
                rule.op,
                rule.field,
                if rule.negative { "false" } else { "true" }
            ),
        }
    }

    pub fn metrics(&self) -> ErrorHandlerMetrics {
        *self.metrics.borrow()
    }

    pub fn clear(&self) {
        *self.metrics.borrow_mut() = ErrorHandlerMetrics::default();
    }
}

pub fn total_diagnostics(errors: &IndexMap<String, Vec<Diagnostic>>) -> usize {
    errors.values().map(Vec::len).sum()
}
