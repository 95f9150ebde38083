//! Method-call interception pipeline.
//!
//! Aspects (cross-cutting concerns such as exception policy enforcement and
//! call logging) are attached to methods through an explicit
//! [`AspectRegistry`]. An [`Interceptor`] runs every call of a registered
//! method through those aspects: pre-call hooks in ascending priority order,
//! then the target, then post-call hooks in the same order. Methods without
//! aspects go straight to the target.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use interpose::aspects::{LogProcessor, TracingLogSink, Verbosity};
//! use interpose::{AspectRegistry, CallMessage, Interceptor};
//!
//! let registry = AspectRegistry::builder()
//!     .aspect("Accounts::transfer", 1, || {
//!         LogProcessor::new(Verbosity::Full, Arc::new(TracingLogSink))
//!     })
//!     .build();
//! let interceptor = Interceptor::new(Arc::new(registry));
//!
//! let call = CallMessage::new("Accounts::transfer").with_arg("amount", &250);
//! let result = interceptor.dispatch(call, |call| {
//!     let amount = call.arg("amount").and_then(|v| v.as_i64()).unwrap_or_default();
//!     Ok(Some(serde_json::json!(amount * 2)))
//! });
//! ```

pub mod aspects;
pub mod config;
pub mod error;
pub mod intercept;

pub use config::{AspectKind, AspectSpec, Collaborators, InterceptConfig, MethodSpec};
pub use error::{ConfigError, Fault, InterceptError};
pub use intercept::{
    Argument, AspectDescriptor, AspectRegistry, AspectRegistryBuilder, AspectScope, CallMessage,
    Interceptor, MethodId, Processor, ProcessorFactory, ReturnMessage,
};
