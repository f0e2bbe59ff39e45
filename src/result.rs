use crate::capability::TypeKey;
use crate::error::LookupError;
use crate::item::Item;
use crate::listener::{ListenerId, LookupListener, RawListener};
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// The object-safe side of a live lookup result.
///
/// Lookup implementations hand these out from [`Lookup::find_result`];
/// callers normally use the typed [`LookupResult`] wrapper instead.
///
/// [`Lookup::find_result`]: crate::Lookup::find_result
pub trait ResultView: Send + Sync {
    /// The type this result was queried with
    fn query(&self) -> TypeKey;

    /// The current matching items, in lookup order
    fn items(&self) -> Result<Vec<Item>, LookupError>;

    /// Registers a listener, keeping it alive until it is removed
    fn subscribe(&self, listener: RawListener) -> Result<ListenerId, LookupError>;

    /// Unregisters a listener; returns false if it was not registered
    fn unsubscribe(&self, id: ListenerId) -> Result<bool, LookupError>;
}

/// A live view of every instance currently matching `T`.
///
/// Obtained from [`LookupExt::lookup_result`]. The view stays current as the
/// underlying content changes, and listeners fire whenever the set of
/// matching items changes. Dropping every handle to a result drops its
/// listeners too.
///
/// [`LookupExt::lookup_result`]: crate::LookupExt::lookup_result
pub struct LookupResult<T: ?Sized> {
    view: Arc<dyn ResultView>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> Clone for LookupResult<T> {
    fn clone(&self) -> Self {
        Self {
            view: Arc::clone(&self.view),
            _marker: PhantomData,
        }
    }
}

impl<T> LookupResult<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    /// Wraps an erased view. The view must have been queried with `T`.
    pub fn from_view(view: Arc<dyn ResultView>) -> Self {
        debug_assert!(view.query().is::<T>());
        Self {
            view,
            _marker: PhantomData,
        }
    }

    /// The type this result was queried with
    pub fn query(&self) -> TypeKey {
        self.view.query()
    }

    /// All matching instances, realizing deferred ones
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Conversion` if a deferred instance cannot be built.
    pub fn all_instances(&self) -> Result<Vec<Arc<T>>, LookupError> {
        let mut instances = Vec::new();
        for item in self.view.items()? {
            if let Some(instance) = item.instance::<T>()? {
                instances.push(instance);
            }
        }
        Ok(instances)
    }

    /// All matching items, without realizing anything
    pub fn all_items(&self) -> Result<Vec<Item>, LookupError> {
        self.view.items()
    }

    /// The concrete types of the matching instances, without realizing anything
    pub fn all_classes(&self) -> Result<HashSet<TypeKey>, LookupError> {
        Ok(self
            .view
            .items()?
            .iter()
            .map(Item::declared_type)
            .collect())
    }

    /// Returns true if nothing currently matches
    pub fn is_empty(&self) -> Result<bool, LookupError> {
        Ok(self.view.items()?.is_empty())
    }

    /// Registers `listener`; the result keeps it alive until removed
    pub fn add_listener<L>(&self, listener: L) -> Result<ListenerId, LookupError>
    where
        L: LookupListener<T>,
    {
        let raw: RawListener = Arc::new(move |view: &Arc<dyn ResultView>| {
            listener.result_changed(&LookupResult::from_view(Arc::clone(view)))
        });
        self.view.subscribe(raw)
    }

    /// Unregisters a listener; returns false if it was not registered
    pub fn remove_listener(&self, id: ListenerId) -> Result<bool, LookupError> {
        self.view.unsubscribe(id)
    }

    /// Returns true if both handles are the same live result
    pub fn same_result(&self, other: &LookupResult<T>) -> bool {
        Arc::as_ptr(&self.view) as *const () == Arc::as_ptr(&other.view) as *const ()
    }

    /// The erased view behind this result
    pub fn view(&self) -> &Arc<dyn ResultView> {
        &self.view
    }
}

impl<T: ?Sized> fmt::Debug for LookupResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupResult")
            .field("query", &self.view.query())
            .finish()
    }
}
