//! Processor contract and aspect descriptors.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Fault;
use crate::intercept::message::{CallMessage, ReturnMessage};

/// The two hooks every aspect implements.
///
/// One processor instance serves every invocation of the method it is
/// attached to, possibly from many threads at once. Anything that lives for a
/// single invocation belongs in the [`AspectScope`], never in `self`.
pub trait Processor: Send + Sync {
    /// A short name for this aspect, used in logs and errors.
    fn name(&self) -> &str;

    /// Called before the target runs.
    ///
    /// Returning an error aborts the invocation: the target is not called and
    /// no post-call hook runs.
    fn process_call(
        &self,
        call: &CallMessage,
        aspect: &AspectDescriptor,
        scope: &mut AspectScope,
    ) -> Result<(), Fault>;

    /// Called after the target returned or faulted.
    ///
    /// May inspect or replace `ret`'s exception. Returning an error skips the
    /// remaining post-call hooks and supersedes the original outcome.
    fn process_return(
        &self,
        ret: &mut ReturnMessage,
        aspect: &AspectDescriptor,
        scope: &mut AspectScope,
    ) -> Result<(), Fault>;
}

/// One aspect attached to one method.
///
/// Created once, the first time the method's aspects are resolved, and shared
/// by every later invocation.
#[derive(Clone)]
pub struct AspectDescriptor {
    priority: i32,
    processor: Arc<dyn Processor>,
}

impl AspectDescriptor {
    /// Descriptor running `processor` at `priority`.
    pub fn new(priority: i32, processor: Arc<dyn Processor>) -> Self {
        Self {
            priority,
            processor,
        }
    }

    /// Sort key: lower runs first, in both phases.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The shared processor instance.
    pub fn processor(&self) -> &Arc<dyn Processor> {
        &self.processor
    }

    /// Name reported by the processor.
    pub fn name(&self) -> &str {
        self.processor.name()
    }
}

impl fmt::Debug for AspectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectDescriptor")
            .field("priority", &self.priority)
            .field("processor", &self.processor.name())
            .finish()
    }
}

/// Invocation-local state owned by one aspect.
///
/// The chain creates a fresh scope per aspect per invocation and hands the
/// same scope to that aspect's pre- and post-call hooks. Values are keyed by
/// type.
#[derive(Default)]
pub struct AspectScope {
    slots: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl AspectScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous value of the same type.
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.slots
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|prev| prev.downcast::<T>().ok())
            .map(|b| *b)
    }

    /// Borrow the value of type `T`, if one was stored.
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<T>())
    }

    /// Remove and return the value of type `T`.
    pub fn take<T: Any + Send>(&mut self) -> Option<T> {
        self.slots
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for AspectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectScope")
            .field("slots", &self.slots.len())
            .finish()
    }
}
