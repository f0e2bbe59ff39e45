use crate::capability::TypeKey;
use crate::content::{ContentShared, InstanceContent};
use crate::error::LookupError;
use crate::item::Item;
use crate::lookup::Lookup;
use crate::result::ResultView;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// The read side over an [`InstanceContent`].
///
/// Queries go straight to the content's index, so a lookup is as cheap to
/// clone as an `Arc`. Results are shared: asking twice for the same type
/// while the first result is still alive hands back the same result.
///
/// ```
/// use sovran_lookup::{Entry, GenericLookup, InstanceContent, LookupExt, LookupError};
/// use std::sync::Arc;
///
/// trait Shape: Send + Sync {
///     fn area(&self) -> f64;
/// }
///
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 { self.0 * self.0 }
/// }
///
/// let content = InstanceContent::new();
/// let lookup = GenericLookup::new(&content)?;
/// content.add(Entry::new(Square(2.0)).provides(|square| square as Arc<dyn Shape>))?;
///
/// let shapes = lookup.lookup_all::<dyn Shape>()?;
/// assert_eq!(shapes[0].area(), 4.0);
/// # Ok::<(), LookupError>(())
/// ```
#[derive(Clone)]
pub struct GenericLookup {
    content: Arc<ContentShared>,
}

impl GenericLookup {
    /// Attaches a lookup to `content`.
    ///
    /// Items already in the content are visible right away.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::ContentAlreadyAttached` if another lookup was
    /// created over the same content.
    pub fn new(content: &InstanceContent) -> Result<Self, LookupError> {
        if content.shared.attached.swap(true, Ordering::AcqRel) {
            return Err(LookupError::ContentAlreadyAttached);
        }
        tracing::trace!("attached lookup to content");
        Ok(Self {
            content: Arc::clone(&content.shared),
        })
    }

    /// Creates a fresh content together with the lookup over it
    pub fn with_content() -> (InstanceContent, GenericLookup) {
        let content = InstanceContent::new();
        let lookup = GenericLookup {
            content: Arc::clone(&content.shared),
        };
        content.shared.attached.store(true, Ordering::Release);
        (content, lookup)
    }
}

impl Lookup for GenericLookup {
    fn find_item(&self, query: TypeKey) -> Result<Option<Item>, LookupError> {
        let storage = self
            .content
            .storage
            .lock()
            .map_err(|_| LookupError::LockError)?;
        Ok(storage.items_for(&query).first().cloned())
    }

    fn find_items(&self, query: TypeKey) -> Result<Vec<Item>, LookupError> {
        let storage = self
            .content
            .storage
            .lock()
            .map_err(|_| LookupError::LockError)?;
        Ok(storage.items_for(&query).to_vec())
    }

    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError> {
        let mut storage = self
            .content
            .storage
            .lock()
            .map_err(|_| LookupError::LockError)?;
        let result = storage.result_for(query, &self.content);
        Ok(result as Arc<dyn ResultView>)
    }
}

impl fmt::Debug for GenericLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericLookup").finish_non_exhaustive()
    }
}
