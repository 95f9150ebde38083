//! The interception chain: runs a method's aspects around one call.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Fault, InterceptError};
use crate::intercept::message::{CallMessage, ReturnMessage};
use crate::intercept::processor::AspectScope;
use crate::intercept::registry::AspectRegistry;

/// Dispatches calls through the aspects registered for their method.
///
/// For one invocation the chain:
///
/// 1. resolves the method's descriptors (ascending priority, stable),
/// 2. runs every `process_call` in that order,
/// 3. invokes `next`, capturing its fault into the return message,
/// 4. runs every `process_return` in the *same* order,
/// 5. raises whatever exception is left in the message, or returns the value.
///
/// The chain keeps no per-invocation state of its own and never yields; all
/// of the above runs on the caller's thread.
#[derive(Debug, Clone)]
pub struct Interceptor {
    registry: Arc<AspectRegistry>,
}

impl Interceptor {
    /// Interceptor dispatching through `registry`.
    pub fn new(registry: Arc<AspectRegistry>) -> Self {
        Self { registry }
    }

    /// The registry calls are resolved against.
    pub fn registry(&self) -> &AspectRegistry {
        &self.registry
    }

    /// Run `call` through the pipeline, with `next` standing in for the
    /// target body.
    ///
    /// Returns the target's value, or exactly one error: a hook fault or the
    /// exception remaining after post-call processing.
    pub fn dispatch<F>(&self, call: CallMessage, next: F) -> Result<Option<Value>, InterceptError>
    where
        F: FnOnce(&CallMessage) -> Result<Option<Value>, Fault>,
    {
        let ret = self.dispatch_message(call, next)?;
        ret.into_result().map_err(|fault| {
            tracing::debug!(error = %fault, "Propagating fault to caller");
            InterceptError::Raised(fault)
        })
    }

    /// Like [`dispatch`](Self::dispatch) but hands back the final
    /// [`ReturnMessage`] instead of converting it.
    ///
    /// Hook faults are still returned as errors, since they replace the
    /// message entirely.
    pub fn dispatch_message<F>(
        &self,
        call: CallMessage,
        next: F,
    ) -> Result<ReturnMessage, InterceptError>
    where
        F: FnOnce(&CallMessage) -> Result<Option<Value>, Fault>,
    {
        let Some(aspects) = self.registry.resolve(call.method()) else {
            tracing::trace!(method = %call.method(), "No aspects registered, calling target directly");
            let result = next(&call);
            return Ok(ReturnMessage::from_result(&call, result));
        };

        let _span = tracing::debug_span!(
            "intercept",
            method = %call.method(),
            invocation_id = %call.invocation_id(),
            aspects = aspects.len()
        )
        .entered();

        let mut scopes: Vec<AspectScope> = aspects.iter().map(|_| AspectScope::new()).collect();

        for (aspect, scope) in aspects.iter().zip(scopes.iter_mut()) {
            if let Err(source) = aspect.processor().process_call(&call, aspect, scope) {
                tracing::warn!(
                    aspect = aspect.name(),
                    priority = aspect.priority(),
                    "Pre-call hook failed, target not invoked: {}",
                    source
                );
                return Err(InterceptError::PreCall {
                    aspect: aspect.name().to_string(),
                    priority: aspect.priority(),
                    source,
                });
            }
        }

        let result = next(&call);
        let mut ret = ReturnMessage::from_result(&call, result);
        tracing::debug!(faulted = ret.is_fault(), "Target returned");

        for (aspect, scope) in aspects.iter().zip(scopes.iter_mut()) {
            if let Err(source) = aspect.processor().process_return(&mut ret, aspect, scope) {
                tracing::warn!(
                    aspect = aspect.name(),
                    priority = aspect.priority(),
                    "Post-call hook failed, skipping remaining hooks: {}",
                    source
                );
                return Err(InterceptError::PostCall {
                    aspect: aspect.name().to_string(),
                    priority: aspect.priority(),
                    source,
                });
            }
        }

        Ok(ret)
    }
}
