//! Registered projection mappings.
//!
//! When a projected specification carries no selector, the evaluator falls
//! back to a mapping registered for the `(T, R)` type pair. Mappings receive
//! the specification's expand hints so they can skip members nobody asked
//! for.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

/// Mapping from `T` to `R` that honours expand hints.
pub type Mapping<T, R> = Arc<dyn Fn(&T, &[String]) -> R + Send + Sync>;

/// Concurrent `(T, R)` → mapping table.
///
/// Cheaply cloneable (`Arc`-backed); clones share the same table.
#[derive(Clone, Default)]
pub struct MappingRegistry {
    inner: Arc<DashMap<(TypeId, TypeId), Arc<dyn Any + Send + Sync>>>,
}

impl MappingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the mapping for `(T, R)`, replacing any earlier one.
    pub fn register<T, R, F>(&self, mapping: F)
    where
        T: 'static,
        R: 'static,
        F: Fn(&T, &[String]) -> R + Send + Sync + 'static,
    {
        let mapping: Mapping<T, R> = Arc::new(mapping);
        tracing::debug!(
            entity = type_name::<T>(),
            result = type_name::<R>(),
            "projection mapping registered"
        );
        self.inner
            .insert((TypeId::of::<T>(), TypeId::of::<R>()), Arc::new(mapping));
    }

    /// Looks up the mapping for `(T, R)`.
    pub fn get<T: 'static, R: 'static>(&self) -> Option<Mapping<T, R>> {
        let entry = self.inner.get(&(TypeId::of::<T>(), TypeId::of::<R>()))?;
        entry.value().downcast_ref::<Mapping<T, R>>().cloned()
    }

    pub fn contains<T: 'static, R: 'static>(&self) -> bool {
        self.inner
            .contains_key(&(TypeId::of::<T>(), TypeId::of::<R>()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for MappingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRegistry")
            .field("mappings", &self.inner.len())
            .finish()
    }
}
