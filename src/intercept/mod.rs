//! Interception core: messages, the processor contract, the registry and the
//! chain that ties them together.
//!
//! Aspects attached to a method run in ascending priority order, ties broken
//! by registration order. Post-call hooks run in the same order as pre-call
//! hooks, not reversed.

pub mod chain;
pub mod message;
pub mod processor;
pub mod registry;

pub use chain::Interceptor;
pub use message::{Argument, CallMessage, MethodId, ReturnMessage};
pub use processor::{AspectDescriptor, AspectScope, Processor};
pub use registry::{AspectRegistry, AspectRegistryBuilder, ProcessorFactory};
