//! The build-once descriptor catalog.
//!
//! An external discovery mechanism enumerates implementations and registers
//! them through [`RegistryBuilder`] before any resolution happens; the built
//! [`OpRegistry`] is immutable and safe to consult from many threads.
//! Lookups never fail — an unknown name or capability yields an empty list,
//! so the matcher can report "no candidates" precisely.

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::OpDescriptor;
use crate::types::{TypeHierarchy, TypeKey};

/// Immutable catalog of every registered operation implementation.
#[derive(Debug, Default)]
pub struct OpRegistry {
    all: Vec<Arc<OpDescriptor>>,
    by_capability: HashMap<TypeKey, Vec<Arc<OpDescriptor>>>,
}

impl OpRegistry {
    /// Start collecting registrations.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            descriptors: Vec::new(),
        }
    }

    /// Every descriptor answering to `name`, either exactly or as an
    /// unqualified suffix of a namespaced name. Order is unspecified; ties
    /// are broken by the matcher, never by registration order.
    pub fn find_by_name(&self, name: &str) -> Vec<Arc<OpDescriptor>> {
        self.all
            .iter()
            .filter(|d| d.matches_name(name))
            .cloned()
            .collect()
    }

    /// Every descriptor whose capability is assignable to `capability`.
    pub fn find_by_capability(
        &self,
        capability: TypeKey,
        types: &TypeHierarchy,
    ) -> Vec<Arc<OpDescriptor>> {
        self.by_capability
            .iter()
            .filter(|(declared, _)| types.assignable(**declared, capability))
            .flat_map(|(_, descriptors)| descriptors.iter().cloned())
            .collect()
    }

    /// Whether `ty` denotes an operation capability: some registered
    /// descriptor provides it (directly or as a subcapability). Slots with a
    /// capability-typed declaration are filled by recursive resolution.
    pub fn is_capability(&self, ty: TypeKey, types: &TypeHierarchy) -> bool {
        self.by_capability
            .keys()
            .any(|declared| types.assignable(*declared, ty))
    }

    /// Sorted, deduplicated logical names of all registered operations.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .all
            .iter()
            .filter_map(|d| d.name().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Iterate over every registered descriptor.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<OpDescriptor>> {
        self.all.iter()
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Collects descriptors and freezes them into an [`OpRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<OpDescriptor>,
}

impl RegistryBuilder {
    /// Register one implementation. Called once per discovered descriptor,
    /// in any order.
    pub fn register(&mut self, descriptor: OpDescriptor) -> &mut Self {
        log::debug!(
            "registering op '{}' (capability {}, {} slots)",
            descriptor.display_name(),
            descriptor.capability(),
            descriptor.slots().len()
        );
        self.descriptors.push(descriptor);
        self
    }

    /// Freeze the catalog.
    pub fn build(self) -> OpRegistry {
        let mut all = Vec::with_capacity(self.descriptors.len());
        let mut by_capability: HashMap<TypeKey, Vec<Arc<OpDescriptor>>> = HashMap::new();
        for descriptor in self.descriptors {
            let descriptor = Arc::new(descriptor);
            by_capability
                .entry(descriptor.capability())
                .or_default()
                .push(Arc::clone(&descriptor));
            all.push(descriptor);
        }
        log::info!(
            "op registry built: {} descriptors, {} capabilities",
            all.len(),
            by_capability.len()
        );
        OpRegistry { all, by_capability }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParamSlot;
    use crate::errors::OpError;
    use crate::exec::Op;
    use crate::value::SlotValues;

    struct Mean;
    struct Sum;
    struct Stat;

    struct NoopOp;

    impl Op for NoopOp {
        fn run(&mut self) -> Result<SlotValues, OpError> {
            Ok(SlotValues::new())
        }
    }

    fn descriptor(name: &str, capability: TypeKey) -> OpDescriptor {
        OpDescriptor::builder(capability)
            .name(name)
            .slot(ParamSlot::input("in", TypeKey::of::<Vec<f64>>()))
            .factory(|_| Ok(Box::new(NoopOp) as Box<dyn Op>))
            .build()
    }

    fn registry() -> OpRegistry {
        let mut builder = OpRegistry::builder();
        builder.register(descriptor("stats.mean", TypeKey::of::<Mean>()));
        builder.register(descriptor("geom.mean", TypeKey::of::<Mean>()));
        builder.register(descriptor("stats.sum", TypeKey::of::<Sum>()));
        builder.build()
    }

    #[test]
    fn test_unknown_name_yields_empty() {
        let registry = registry();
        assert!(registry.find_by_name("median").is_empty());
    }

    #[test]
    fn test_find_by_exact_name() {
        let registry = registry();
        let found = registry.find_by_name("stats.mean");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), Some("stats.mean"));
    }

    #[test]
    fn test_find_by_suffix_crosses_namespaces() {
        let registry = registry();
        assert_eq!(registry.find_by_name("mean").len(), 2);
    }

    #[test]
    fn test_find_by_capability_with_subtypes() {
        let registry = registry();
        let mut types = TypeHierarchy::new();
        types.relate_types::<Mean, Stat>();
        assert_eq!(registry.find_by_capability(TypeKey::of::<Mean>(), &types).len(), 2);
        // Mean is a Stat, so a Stat request sees mean and nothing else.
        assert_eq!(registry.find_by_capability(TypeKey::of::<Stat>(), &types).len(), 2);
        assert_eq!(registry.find_by_capability(TypeKey::of::<Sum>(), &types).len(), 1);
    }

    #[test]
    fn test_is_capability() {
        let registry = registry();
        let types = TypeHierarchy::new();
        assert!(registry.is_capability(TypeKey::of::<Mean>(), &types));
        assert!(!registry.is_capability(TypeKey::of::<Vec<f64>>(), &types));
    }

    #[test]
    fn test_names_sorted_and_deduplicated() {
        let registry = registry();
        assert_eq!(
            registry.names(),
            vec!["geom.mean".to_string(), "stats.mean".to_string(), "stats.sum".to_string()]
        );
    }
}
