use crate::capability::TypeKey;
use crate::error::LookupError;
use crate::index::{dedup_items, Index};
use crate::item::Item;
use crate::listener::{ListenerId, RawListener};
use crate::lookup::Lookup;
use crate::result::ResultView;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A lookup that never finds anything
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyLookup;

impl Lookup for EmptyLookup {
    fn find_item(&self, _query: TypeKey) -> Result<Option<Item>, LookupError> {
        Ok(None)
    }

    fn find_items(&self, _query: TypeKey) -> Result<Vec<Item>, LookupError> {
        Ok(Vec::new())
    }

    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError> {
        Ok(Arc::new(StaticResult::new(query, Vec::new())))
    }
}

/// A lookup over exactly one item.
///
/// ```
/// use sovran_lookup::{Entry, LookupExt, LookupError, SingletonLookup};
///
/// let lookup = SingletonLookup::new(Entry::new(42_u64).with_id("answer"));
/// assert_eq!(lookup.lookup::<u64>()?.as_deref(), Some(&42));
/// assert_eq!(lookup.item().id(), "answer");
/// # Ok::<(), LookupError>(())
/// ```
#[derive(Clone)]
pub struct SingletonLookup {
    item: Item,
}

impl SingletonLookup {
    pub fn new(item: impl Into<Item>) -> Self {
        Self { item: item.into() }
    }

    pub fn item(&self) -> &Item {
        &self.item
    }
}

impl Lookup for SingletonLookup {
    fn find_item(&self, query: TypeKey) -> Result<Option<Item>, LookupError> {
        Ok(self
            .item
            .satisfies_key(&query)
            .then(|| self.item.clone()))
    }

    fn find_items(&self, query: TypeKey) -> Result<Vec<Item>, LookupError> {
        Ok(self.find_item(query)?.into_iter().collect())
    }

    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError> {
        Ok(Arc::new(StaticResult::new(query, self.find_items(query)?)))
    }
}

impl fmt::Debug for SingletonLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonLookup")
            .field("item", &self.item)
            .finish()
    }
}

/// An immutable lookup over a list of items fixed at construction.
///
/// Repeated items are kept once, at their first position.
#[derive(Clone)]
pub struct FixedLookup {
    shared: Arc<FixedShared>,
}

struct FixedShared {
    items: Vec<Item>,
    index: Index,
}

impl FixedLookup {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let items = dedup_items(items.into_iter().map(Into::into));
        let index = Index::rebuild(&items);
        Self {
            shared: Arc::new(FixedShared { items, index }),
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.shared.items
    }

    pub fn len(&self) -> usize {
        self.shared.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.items.is_empty()
    }
}

impl Lookup for FixedLookup {
    fn find_item(&self, query: TypeKey) -> Result<Option<Item>, LookupError> {
        Ok(self.shared.index.items(&query).first().cloned())
    }

    fn find_items(&self, query: TypeKey) -> Result<Vec<Item>, LookupError> {
        Ok(self.shared.index.items(&query).to_vec())
    }

    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError> {
        Ok(Arc::new(StaticResult::new(query, self.find_items(query)?)))
    }
}

impl fmt::Debug for FixedLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedLookup")
            .field("items", &self.shared.items.len())
            .finish()
    }
}

/// A result whose items never change; listeners are kept but never called
struct StaticResult {
    query: TypeKey,
    items: Vec<Item>,
    listeners: Mutex<Vec<(ListenerId, RawListener)>>,
}

impl StaticResult {
    fn new(query: TypeKey, items: Vec<Item>) -> Self {
        Self {
            query,
            items,
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl ResultView for StaticResult {
    fn query(&self) -> TypeKey {
        self.query
    }

    fn items(&self) -> Result<Vec<Item>, LookupError> {
        Ok(self.items.clone())
    }

    fn subscribe(&self, listener: RawListener) -> Result<ListenerId, LookupError> {
        let id = ListenerId::next();
        self.listeners
            .lock()
            .map_err(|_| LookupError::LockError)?
            .push((id, listener));
        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) -> Result<bool, LookupError> {
        let mut listeners = self.listeners.lock().map_err(|_| LookupError::LockError)?;
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        Ok(listeners.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Entry;
    use crate::lookup::LookupExt;
    use crate::result::LookupResult;
    use pretty_assertions::assert_eq;
    use std::fmt::Display;

    #[test]
    fn test_empty_lookup_finds_nothing() -> Result<(), LookupError> {
        let lookup = EmptyLookup;
        assert!(lookup.lookup::<String>()?.is_none());
        assert!(lookup.lookup_all::<String>()?.is_empty());
        assert!(matches!(lookup.refresh(), Err(LookupError::Unsupported("refresh"))));
        Ok(())
    }

    #[test]
    fn test_singleton_matches_capabilities_only() -> Result<(), LookupError> {
        let lookup = SingletonLookup::new(
            Entry::new("one".to_string()).provides(|s| s as Arc<dyn Display + Send + Sync>),
        );
        let shown = lookup
            .lookup::<dyn Display + Send + Sync>()?
            .map(|d| d.to_string());
        assert_eq!(shown, Some("one".to_string()));
        assert!(lookup.lookup::<u8>()?.is_none());
        Ok(())
    }

    #[test]
    fn test_fixed_lookup_keeps_first_of_duplicates() -> Result<(), LookupError> {
        let a = Arc::new(1_i32);
        let b = Arc::new(2_i32);
        let lookup = FixedLookup::new([Arc::clone(&a), Arc::clone(&b), Arc::clone(&a)]);
        assert_eq!(lookup.len(), 2);
        let values: Vec<i32> = lookup.lookup_all::<i32>()?.iter().map(|v| **v).collect();
        assert_eq!(values, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn test_static_result_accepts_listeners() -> Result<(), LookupError> {
        let lookup = FixedLookup::new([Arc::new(5_u8)]);
        let result = lookup.lookup_result::<u8>()?;
        let id = result.add_listener(|_: &LookupResult<u8>| {})?;
        assert!(result.remove_listener(id)?);
        assert!(!result.remove_listener(id)?);
        Ok(())
    }
}
