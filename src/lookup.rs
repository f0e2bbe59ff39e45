use crate::capability::TypeKey;
use crate::error::LookupError;
use crate::item::Item;
use crate::result::{LookupResult, ResultView};
use std::sync::Arc;

/// A read-only, type-indexed search interface over a set of instances.
///
/// This is the object-safe core every lookup implements; it works on erased
/// [`TypeKey`] queries so lookups can be composed as `Arc<dyn Lookup>`. The
/// typed API lives on [`LookupExt`], which every lookup gets for free.
///
/// Only [`find_result`](Lookup::find_result) is required; the other queries
/// default to reading the result.
pub trait Lookup: Send + Sync {
    /// The first item matching `query`, without realizing it
    fn find_item(&self, query: TypeKey) -> Result<Option<Item>, LookupError> {
        Ok(self.find_items(query)?.into_iter().next())
    }

    /// Every item matching `query`, without realizing them
    fn find_items(&self, query: TypeKey) -> Result<Vec<Item>, LookupError> {
        self.find_result(query)?.items()
    }

    /// A live result for `query`
    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError>;

    /// Re-reads whatever external source backs this lookup.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Unsupported` for lookups with nothing to refresh.
    fn refresh(&self) -> Result<(), LookupError> {
        Err(LookupError::Unsupported("refresh"))
    }
}

impl<L: Lookup + ?Sized> Lookup for Arc<L> {
    fn find_item(&self, query: TypeKey) -> Result<Option<Item>, LookupError> {
        (**self).find_item(query)
    }

    fn find_items(&self, query: TypeKey) -> Result<Vec<Item>, LookupError> {
        (**self).find_items(query)
    }

    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError> {
        (**self).find_result(query)
    }

    fn refresh(&self) -> Result<(), LookupError> {
        (**self).refresh()
    }
}

/// Typed queries available on every [`Lookup`].
///
/// `T` is either a concrete type or a capability such as `dyn Trait`; see
/// [`Capabilities`](crate::Capabilities).
pub trait LookupExt: Lookup {
    /// One instance matching `T`, or `None`.
    ///
    /// Which instance is returned when several match is up to the lookup; the
    /// built-in lookups return the first in storage order.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Conversion` if the matching item is deferred and
    /// cannot be built.
    fn lookup<T>(&self) -> Result<Option<Arc<T>>, LookupError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.find_item(TypeKey::of::<T>())? {
            Some(item) => item.instance::<T>(),
            None => Ok(None),
        }
    }

    /// Every instance matching `T`, possibly empty
    fn lookup_all<T>(&self) -> Result<Vec<Arc<T>>, LookupError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut instances = Vec::new();
        for item in self.find_items(TypeKey::of::<T>())? {
            if let Some(instance) = item.instance::<T>()? {
                instances.push(instance);
            }
        }
        Ok(instances)
    }

    /// The first item matching `T`, without realizing it
    fn lookup_item<T>(&self) -> Result<Option<Item>, LookupError>
    where
        T: ?Sized + 'static,
    {
        self.find_item(TypeKey::of::<T>())
    }

    /// A live result for `T`
    fn lookup_result<T>(&self) -> Result<LookupResult<T>, LookupError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.find_result(TypeKey::of::<T>())
            .map(LookupResult::from_view)
    }
}

impl<L: Lookup + ?Sized> LookupExt for L {}

/// Returns true if both handles point at the same lookup object
pub(crate) fn same_lookup(left: &Arc<dyn Lookup>, right: &Arc<dyn Lookup>) -> bool {
    Arc::as_ptr(left) as *const () == Arc::as_ptr(right) as *const ()
}
