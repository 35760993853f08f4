//! Process-wide cache of sealed adapters, one per hierarchy root type.
//!
//! The first request for a type builds its table; concurrent first
//! requests block on the same slot and all observe the one result. A
//! failed build is cached too, so a broken declaration fails the same way
//! on every request instead of being retried.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, OnceLock, PoisonError};

use crate::adapter::Sealed;
use crate::sealed::{ConfigError, ResolutionTable, SealedAdapter};

/// A root type that can declare its own hierarchy.
pub trait SealedHierarchy: Sealed {
    fn resolution_table() -> Result<ResolutionTable<Self>, ConfigError>;
}

type Slot<T> = OnceLock<Result<SealedAdapter<T>, ConfigError>>;

#[derive(Default)]
pub struct AdapterRegistry {
    slots: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter for `T`, built on first use.
    pub fn adapter<T: SealedHierarchy>(&self) -> Result<SealedAdapter<T>, ConfigError> {
        let slot = self.slot::<T>();
        slot.get_or_init(|| {
            let built = T::resolution_table().map(|table| SealedAdapter::new(Arc::new(table)));
            match &built {
                Ok(_) => tracing::debug!(root = std::any::type_name::<T>(), "registered sealed adapter"),
                Err(e) => {
                    tracing::warn!(root = std::any::type_name::<T>(), error = %e, "invalid hierarchy")
                }
            }
            built
        })
        .clone()
    }

    /// Number of root types requested so far.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot<T: SealedHierarchy>(&self) -> Arc<Slot<T>> {
        // The map lock is held only to find the slot, never while building.
        let erased = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                slots
                    .entry(TypeId::of::<T>())
                    .or_insert_with(|| Arc::new(Slot::<T>::new()) as Arc<dyn Any + Send + Sync>),
            )
        };
        erased
            .downcast::<Slot<T>>()
            .unwrap_or_else(|_| unreachable!("slot keyed by TypeId holds its own type"))
    }
}

static GLOBAL: LazyLock<AdapterRegistry> = LazyLock::new(AdapterRegistry::new);

pub fn global() -> &'static AdapterRegistry {
    &GLOBAL
}

/// Adapter for `T` from the global registry.
pub fn adapter<T: SealedHierarchy>() -> Result<SealedAdapter<T>, ConfigError> {
    global().adapter::<T>()
}
