//! Explicit registry mapping methods to their aspects.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::intercept::message::MethodId;
use crate::intercept::processor::{AspectDescriptor, Processor};

/// Builds the processor for one descriptor.
pub type ProcessorFactory = Arc<dyn Fn() -> Arc<dyn Processor> + Send + Sync>;

struct Registration {
    priority: i32,
    factory: ProcessorFactory,
}

struct MethodAspects {
    registrations: Vec<Registration>,
    /// Published once; later reads never lock.
    resolved: OnceLock<Arc<[AspectDescriptor]>>,
}

impl MethodAspects {
    fn resolve(&self) -> Arc<[AspectDescriptor]> {
        Arc::clone(self.resolved.get_or_init(|| {
            let mut descriptors: Vec<AspectDescriptor> = self
                .registrations
                .iter()
                .map(|r| AspectDescriptor::new(r.priority, (r.factory)()))
                .collect();
            // Stable: equal priorities keep registration order.
            descriptors.sort_by_key(AspectDescriptor::priority);
            descriptors.into()
        }))
    }
}

/// Registry of interceptable methods and the aspects attached to each.
///
/// Registrations are fixed once built. Descriptors for a method are
/// constructed lazily on its first resolution, exactly once even under
/// concurrent first calls, and shared by every invocation after that.
pub struct AspectRegistry {
    methods: HashMap<MethodId, MethodAspects>,
}

impl AspectRegistry {
    /// Start collecting registrations.
    pub fn builder() -> AspectRegistryBuilder {
        AspectRegistryBuilder::default()
    }

    /// An empty registry: every method bypasses interception.
    pub fn empty() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Ordered descriptors for `method`, or `None` if it has no aspects.
    pub fn resolve(&self, method: &MethodId) -> Option<Arc<[AspectDescriptor]>> {
        self.methods.get(method).map(MethodAspects::resolve)
    }

    /// Whether `method` has any aspects registered.
    pub fn contains(&self, method: &MethodId) -> bool {
        self.methods.contains_key(method)
    }

    /// Registered methods, sorted by identifier.
    pub fn methods(&self) -> Vec<MethodId> {
        let mut methods: Vec<MethodId> = self.methods.keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for AspectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(&str, usize)> = self
            .methods
            .iter()
            .map(|(id, m)| (id.as_str(), m.registrations.len()))
            .collect();
        f.debug_struct("AspectRegistry")
            .field("methods", &counts)
            .finish()
    }
}

/// Collects `(method, priority, factory)` registrations.
#[derive(Default)]
pub struct AspectRegistryBuilder {
    methods: HashMap<MethodId, Vec<Registration>>,
}

impl AspectRegistryBuilder {
    /// Attach an aspect to `method`.
    ///
    /// `factory` runs once, when the method's aspects are first resolved.
    pub fn aspect<F, P>(self, method: impl Into<MethodId>, priority: i32, factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Processor + 'static,
    {
        self.aspect_factory(
            method,
            priority,
            Arc::new(move || Arc::new(factory()) as Arc<dyn Processor>),
        )
    }

    /// Attach an aspect using an already type-erased factory.
    pub fn aspect_factory(
        mut self,
        method: impl Into<MethodId>,
        priority: i32,
        factory: ProcessorFactory,
    ) -> Self {
        self.push(method.into(), priority, factory);
        self
    }

    pub(crate) fn push(&mut self, method: MethodId, priority: i32, factory: ProcessorFactory) {
        self.methods
            .entry(method)
            .or_default()
            .push(Registration { priority, factory });
    }

    /// Freeze the registrations into a registry.
    pub fn build(self) -> AspectRegistry {
        let methods = self
            .methods
            .into_iter()
            .map(|(id, registrations)| {
                (
                    id,
                    MethodAspects {
                        registrations,
                        resolved: OnceLock::new(),
                    },
                )
            })
            .collect();
        AspectRegistry { methods }
    }
}
