//! Per-scope specification cache.
//!
//! Stateless specifications are cheap but not free to build. A
//! [`SpecificationFactory`] constructs each declared specification type at
//! most once for the lifetime of the factory (its *scope*) and hands out the
//! same shared instance afterwards.
//!
//! Construction is single-flight: concurrent callers asking for the same type
//! wait on one construct-once cell instead of racing each other. A failed
//! construction is returned to the caller and not cached, so the next call
//! retries.
//!
//! # Example
//!
//! ```rust
//! use quarry_spec::{Condition, Entity, ScopedSpecification, Specification,
//!     SpecificationFactory, Value};
//!
//! struct Guild { active: bool }
//! impl Entity for Guild {
//!     fn field(&self, name: &str) -> Value<'_> {
//!         match name {
//!             "active" => Value::Bool(self.active),
//!             _ => Value::Null,
//!         }
//!     }
//! }
//!
//! struct ActiveGuilds(Specification<Guild>);
//!
//! impl ScopedSpecification for ActiveGuilds {
//!     fn create() -> quarry_spec::Result<Self> {
//!         Ok(Self(
//!             Specification::builder()
//!                 .where_condition(Condition::eq("active", true))
//!                 .build(),
//!         ))
//!     }
//! }
//!
//! let factory = SpecificationFactory::new();
//! let a = factory.get_specification::<ActiveGuilds>().unwrap();
//! let b = factory.get_specification::<ActiveGuilds>().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//! ```

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use uuid::Uuid;

use crate::error::{Result, SpecError};

/// A specification type the factory can construct on demand.
pub trait ScopedSpecification: Send + Sync + Sized + 'static {
    /// Builds the specification.
    fn create() -> Result<Self>;
}

type Slot = Arc<OnceCell<Arc<dyn Any + Send + Sync>>>;

/// Concurrent, per-scope specification cache backed by [`DashMap`].
///
/// Cloning the factory shares the scope; create a new factory to start a
/// fresh scope.
#[derive(Clone)]
pub struct SpecificationFactory {
    scope: Uuid,
    slots: Arc<DashMap<TypeId, Slot>>,
}

impl SpecificationFactory {
    /// Opens a new, empty scope.
    #[must_use]
    pub fn new() -> Self {
        let scope = Uuid::now_v7();
        tracing::debug!(%scope, "specification scope opened");
        Self {
            scope,
            slots: Arc::new(DashMap::new()),
        }
    }

    pub fn scope_id(&self) -> Uuid {
        self.scope
    }

    /// Returns the scope's instance of `S`, constructing it on first use.
    pub fn get_specification<S: ScopedSpecification>(&self) -> Result<Arc<S>> {
        // Clone the slot out so the map shard is not locked while `create`
        // runs.
        let slot: Slot = Arc::clone(
            self.slots
                .entry(TypeId::of::<S>())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        let instance = slot.get_or_try_init(|| {
            tracing::debug!(
                scope = %self.scope,
                specification = type_name::<S>(),
                "constructing specification"
            );
            S::create()
                .map(|spec| Arc::new(spec) as Arc<dyn Any + Send + Sync>)
                .map_err(|source| SpecError::Construction {
                    specification: type_name::<S>(),
                    source: Box::new(source),
                })
        })?;

        Arc::clone(instance)
            .downcast::<S>()
            .map_err(|_| {
                SpecError::Internal(format!("slot type mismatch for {}", type_name::<S>()))
            })
    }

    /// `true` once `S` has been constructed in this scope.
    pub fn contains<S: ScopedSpecification>(&self) -> bool {
        self.slots
            .get(&TypeId::of::<S>())
            .is_some_and(|slot| slot.value().get().is_some())
    }

    /// Number of constructed specifications in this scope.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SpecificationFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpecificationFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecificationFactory")
            .field("scope", &self.scope)
            .field("constructed", &self.len())
            .finish()
    }
}
