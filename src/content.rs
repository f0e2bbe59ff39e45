use crate::capability::TypeKey;
use crate::error::LookupError;
use crate::executor::Executor;
use crate::index::{same_members, Index};
use crate::item::{Item, ItemKey};
use crate::listener::{log_listener_error, ErrorHandler, ListenerId, ListenerSet, RawListener};
use crate::result::ResultView;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// The write side of a [`GenericLookup`]: add, remove and replace items.
///
/// The content owns the items, the index over them and the registry of live
/// results. Every mutation updates the index, recomputes the results the
/// change could affect, and notifies the ones whose set of items actually
/// changed.
///
/// ```
/// use sovran_lookup::{GenericLookup, InstanceContent, LookupExt, LookupError};
/// use std::sync::Arc;
///
/// let content = InstanceContent::new();
/// let lookup = GenericLookup::new(&content)?;
///
/// let greeting = Arc::new("hello".to_string());
/// content.add(Arc::clone(&greeting))?;
/// assert_eq!(lookup.lookup_all::<String>()?.len(), 1);
///
/// content.remove(&greeting)?;
/// assert!(lookup.lookup::<String>()?.is_none());
/// # Ok::<(), LookupError>(())
/// ```
///
/// [`GenericLookup`]: crate::GenericLookup
pub struct InstanceContent {
    pub(crate) shared: Arc<ContentShared>,
}

pub(crate) struct ContentShared {
    pub(crate) storage: Mutex<Storage>,
    pub(crate) attached: AtomicBool,
    executor: Option<Arc<dyn Executor>>,
    on_error: ErrorHandler,
}

#[derive(Default)]
pub(crate) struct Storage {
    items: Vec<Item>,
    index: Index,
    results: HashMap<TypeKey, Weak<ContentResult>>,
}

/// Configures an [`InstanceContent`]
pub struct InstanceContentBuilder {
    executor: Option<Arc<dyn Executor>>,
    on_error: ErrorHandler,
}

impl InstanceContentBuilder {
    /// Relays notifications through `executor` instead of the mutating call
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Receives failures of listeners on this content's results
    pub fn on_listener_error(
        mut self,
        handler: impl Fn(crate::ListenerError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Arc::new(handler);
        self
    }

    pub fn build(self) -> InstanceContent {
        InstanceContent {
            shared: Arc::new(ContentShared {
                storage: Mutex::new(Storage::default()),
                attached: AtomicBool::new(false),
                executor: self.executor,
                on_error: self.on_error,
            }),
        }
    }
}

impl InstanceContent {
    /// Creates an empty content that notifies listeners synchronously
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> InstanceContentBuilder {
        InstanceContentBuilder {
            executor: None,
            on_error: log_listener_error(),
        }
    }

    /// Adds an item.
    ///
    /// An item with the same key replaces the stored one in place, without
    /// notifying anyone.
    ///
    /// # Returns
    ///
    /// Returns `Ok(true)` if the item was not present before.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::LockError` if the internal lock cannot be acquired.
    pub fn add(&self, item: impl Into<Item>) -> Result<bool, LookupError> {
        let item = item.into();
        let (added, changed) = {
            let mut storage = self.lock()?;
            match storage.position(item.key()) {
                Some(position) => {
                    let old = std::mem::replace(&mut storage.items[position], item.clone());
                    storage.index.replace(&old, &item);
                    let touched = touched_by([&old, &item]);
                    (false, storage.recompute(Some(&touched)))
                }
                None => {
                    storage.index.insert(&item);
                    storage.items.push(item.clone());
                    let touched = touched_by([&item]);
                    (true, storage.recompute(Some(&touched)))
                }
            }
        };
        tracing::debug!(id = %item.id(), added, notified = changed.len(), "added item");
        self.notify(changed);
        Ok(added)
    }

    /// Removes the given shared instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(true)` if the instance was present and removed.
    pub fn remove<C>(&self, instance: &Arc<C>) -> Result<bool, LookupError>
    where
        C: Send + Sync + 'static,
    {
        self.remove_key(&ItemKey::Instance(
            Arc::as_ptr(instance) as *const () as usize
        ))
    }

    /// Removes the deferred item of declared type `C` with persistence id `id`
    pub fn remove_deferred<C>(&self, id: &str) -> Result<bool, LookupError>
    where
        C: Send + Sync + 'static,
    {
        self.remove_key(&ItemKey::Deferred(TypeKey::of::<C>(), id.to_string()))
    }

    /// Removes the item with the given key
    pub fn remove_key(&self, key: &ItemKey) -> Result<bool, LookupError> {
        let (removed, changed) = {
            let mut storage = self.lock()?;
            match storage.position(key) {
                Some(position) => {
                    let item = storage.items.remove(position);
                    storage.index.remove(&item);
                    let touched = touched_by([&item]);
                    (Some(item), storage.recompute(Some(&touched)))
                }
                None => (None, Vec::new()),
            }
        };
        match &removed {
            Some(item) => {
                tracing::debug!(id = %item.id(), notified = changed.len(), "removed item")
            }
            None => tracing::trace!(key = ?key, "remove ignored, item not present"),
        }
        self.notify(changed);
        Ok(removed.is_some())
    }

    /// Replaces the whole content at once.
    ///
    /// Items whose key was already present keep the stored item, including a
    /// realized deferred instance. Only results whose set of items changed are
    /// notified, once each. Later duplicates in `items` are ignored.
    pub fn set<I>(&self, items: I) -> Result<(), LookupError>
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let incoming: Vec<Item> = items.into_iter().map(Into::into).collect();
        let changed = {
            let mut storage = self.lock()?;
            let previous: HashMap<ItemKey, Item> = storage
                .items
                .iter()
                .map(|item| (item.key().clone(), item.clone()))
                .collect();

            let mut seen = HashSet::new();
            let mut next = Vec::with_capacity(incoming.len());
            let mut touched = HashSet::new();
            for item in incoming {
                if !seen.insert(item.key().clone()) {
                    continue;
                }
                match previous.get(item.key()) {
                    Some(kept) => next.push(kept.clone()),
                    None => {
                        touched.extend(item.capability_keys());
                        next.push(item);
                    }
                }
            }
            for (key, item) in &previous {
                if !seen.contains(key) {
                    touched.extend(item.capability_keys());
                }
            }

            storage.index = Index::rebuild(&next);
            storage.items = next;
            tracing::debug!(
                items = storage.items.len(),
                touched = touched.len(),
                "replaced content"
            );
            // every live result is refreshed so order changes are picked up silently
            storage.recompute(None)
        };
        self.notify(changed);
        Ok(())
    }

    /// Removes every item
    pub fn clear(&self) -> Result<(), LookupError> {
        self.set(Vec::<Item>::new())
    }

    /// Returns the number of items
    pub fn len(&self) -> Result<usize, LookupError> {
        Ok(self.lock()?.items.len())
    }

    /// Returns true if the content holds no items
    pub fn is_empty(&self) -> Result<bool, LookupError> {
        Ok(self.lock()?.items.is_empty())
    }

    /// Returns every item in storage order
    pub fn items(&self) -> Result<Vec<Item>, LookupError> {
        Ok(self.lock()?.items.clone())
    }

    /// Returns true if an item with this key is stored
    pub fn contains_key(&self, key: &ItemKey) -> Result<bool, LookupError> {
        Ok(self.lock()?.position(key).is_some())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Storage>, LookupError> {
        self.shared.storage.lock().map_err(|_| LookupError::LockError)
    }

    fn notify(&self, changed: Vec<Arc<ContentResult>>) {
        for result in changed {
            result.notify(self.shared.executor.as_ref());
        }
    }
}

impl Default for InstanceContent {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InstanceContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceContent")
            .field("attached", &self.shared.attached.load(Ordering::Acquire))
            .field("async", &self.shared.executor.is_some())
            .finish()
    }
}

fn touched_by<'a>(items: impl IntoIterator<Item = &'a Item>) -> HashSet<TypeKey> {
    items
        .into_iter()
        .flat_map(|item| item.capability_keys().collect::<Vec<_>>())
        .collect()
}

impl Storage {
    fn position(&self, key: &ItemKey) -> Option<usize> {
        self.items.iter().position(|item| item.key() == key)
    }

    pub(crate) fn items_for(&self, query: &TypeKey) -> &[Item] {
        self.index.items(query)
    }

    /// Refreshes the snapshots of live results whose query is in `touched`
    /// (all of them when `None`) and returns those whose members changed.
    fn recompute(&mut self, touched: Option<&HashSet<TypeKey>>) -> Vec<Arc<ContentResult>> {
        self.results.retain(|_, result| result.strong_count() > 0);

        let mut changed = Vec::new();
        for (query, result) in &self.results {
            if touched.is_some_and(|touched| !touched.contains(query)) {
                continue;
            }
            let Some(result) = result.upgrade() else {
                continue;
            };
            if result.update(self.index.items(query).to_vec()) {
                changed.push(result);
            }
        }
        changed
    }

    /// Returns the live result for `query`, creating it when none is alive
    pub(crate) fn result_for(
        &mut self,
        query: TypeKey,
        shared: &ContentShared,
    ) -> Arc<ContentResult> {
        if let Some(result) = self.results.get(&query).and_then(Weak::upgrade) {
            return result;
        }
        let result = Arc::new(ContentResult {
            query,
            snapshot: Mutex::new(self.index.items(&query).to_vec()),
            listeners: ListenerSet::new(query, Arc::clone(&shared.on_error)),
        });
        self.results.insert(query, Arc::downgrade(&result));
        result
    }
}

/// The live result handed out by a [`GenericLookup`](crate::GenericLookup).
///
/// Its snapshot is pushed by the content under the storage lock; readers only
/// take the snapshot lock.
pub(crate) struct ContentResult {
    query: TypeKey,
    snapshot: Mutex<Vec<Item>>,
    listeners: Arc<ListenerSet>,
}

impl ContentResult {
    /// Replaces the snapshot; returns true if the members changed
    fn update(&self, items: Vec<Item>) -> bool {
        let Ok(mut snapshot) = self.snapshot.lock() else {
            return false;
        };
        let changed = !same_members(&snapshot, &items);
        *snapshot = items;
        changed
    }

    fn notify(self: &Arc<Self>, executor: Option<&Arc<dyn Executor>>) {
        let source: Arc<dyn ResultView> = Arc::clone(self) as Arc<dyn ResultView>;
        self.listeners.fire(source, executor);
    }
}

impl ResultView for ContentResult {
    fn query(&self) -> TypeKey {
        self.query
    }

    fn items(&self) -> Result<Vec<Item>, LookupError> {
        Ok(self
            .snapshot
            .lock()
            .map_err(|_| LookupError::LockError)?
            .clone())
    }

    fn subscribe(&self, listener: RawListener) -> Result<ListenerId, LookupError> {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> Result<bool, LookupError> {
        self.listeners.remove(id)
    }
}
