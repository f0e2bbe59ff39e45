use crate::capability::TypeKey;
use std::any::Any;
use std::sync::Arc;

/// A shared, type-erased instance that remembers its concrete type
#[derive(Clone, Debug)]
pub(crate) struct AnyValue {
    pub(crate) type_key: TypeKey,
    pub(crate) value: Arc<dyn Any + Send + Sync>,
}

impl AnyValue {
    /// Create a new AnyValue from a value of any type that implements Any, Send, and Sync
    pub(crate) fn new<T: 'static + Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared value without reallocating it
    pub(crate) fn from_arc<T: 'static + Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            type_key: TypeKey::of::<T>(),
            value,
        }
    }

    /// Get a new handle on the contained value if it is of type T
    pub(crate) fn downcast_arc<T: 'static + Any + Send + Sync>(&self) -> Option<Arc<T>> {
        if self.type_key.is::<T>() {
            Arc::clone(&self.value).downcast::<T>().ok()
        } else {
            None
        }
    }

    /// Get a new handle on the contained value, still type-erased
    pub(crate) fn shared(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.value)
    }

    /// The address of the shared allocation, used as instance identity
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.value) as *const () as usize
    }
}
