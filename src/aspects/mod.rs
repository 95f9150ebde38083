//! Bundled aspects: exception policy enforcement and call logging.
//!
//! Both talk to host-supplied collaborators ([`ExceptionPolicyEvaluator`],
//! [`LogSink`]) and keep nothing invocation-specific on the shared processor.

pub mod exception;
pub mod logging;
pub mod recording;

pub use exception::{
    ExceptionHandlingProcessor, ExceptionPolicy, ExceptionPolicyEvaluator, PolicyVerdict,
    PostHandlingAction, StandardPolicyEvaluator,
};
pub use logging::{ASPECT_LOG_TARGET, LogProcessor, LogSink, TracingLogSink, Verbosity};
pub use recording::MemoryLogSink;
