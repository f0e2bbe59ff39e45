use crate::capability::TypeKey;
use crate::error::LookupError;
use crate::index::same_members;
use crate::item::Item;
use crate::listener::{log_listener_error, ErrorHandler, ListenerId, ListenerSet, RawListener};
use crate::lookup::{same_lookup, Lookup};
use crate::result::ResultView;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// Supplies the lookup a [`DelegatedLookup`] currently forwards to.
///
/// `None` means "nothing right now" and behaves like an empty lookup. Any
/// `Fn() -> Option<Arc<dyn Lookup>>` closure is a provider.
pub trait LookupProvider: Send + Sync {
    fn current_lookup(&self) -> Option<Arc<dyn Lookup>>;
}

impl<F> LookupProvider for F
where
    F: Fn() -> Option<Arc<dyn Lookup>> + Send + Sync,
{
    fn current_lookup(&self) -> Option<Arc<dyn Lookup>> {
        self()
    }
}

/// A lookup that forwards to whatever its provider currently names.
///
/// The target is resolved again on every query. When it changed, every live
/// result moves its subscription to the new target and fires if its set of
/// items changed.
///
/// ```
/// use sovran_lookup::{DelegatedLookup, GenericLookup, Lookup, LookupExt, LookupError};
/// use std::sync::{Arc, Mutex};
///
/// let (content, lookup) = GenericLookup::with_content();
/// content.add(Arc::new(7_u32))?;
///
/// let selected: Arc<Mutex<Option<Arc<dyn Lookup>>>> = Arc::default();
/// let current = Arc::clone(&selected);
/// let delegated = DelegatedLookup::from_fn(move || current.lock().ok()?.clone());
/// assert!(delegated.lookup::<u32>()?.is_none());
///
/// *selected.lock().unwrap() = Some(Arc::new(lookup));
/// assert_eq!(delegated.lookup::<u32>()?.as_deref(), Some(&7));
/// # Ok::<(), LookupError>(())
/// ```
#[derive(Clone)]
pub struct DelegatedLookup {
    shared: Arc<DelegatedShared>,
}

struct DelegatedShared {
    provider: Arc<dyn LookupProvider>,
    delegate: Mutex<Target>,
    results: Mutex<HashMap<TypeKey, Weak<DelegatedResult>>>,
    on_error: ErrorHandler,
}

/// The current target and how many times it has been switched.
///
/// Results remember the generation they are bound to and ignore a retarget
/// older than that, so racing switches settle on the newest target.
struct Target {
    lookup: Option<Arc<dyn Lookup>>,
    generation: u64,
}

impl DelegatedLookup {
    pub fn new(provider: Arc<dyn LookupProvider>) -> Self {
        Self::with_error_handler(provider, log_listener_error())
    }

    /// Like [`new`](Self::new), reporting listener failures to `on_error`
    pub fn with_error_handler(provider: Arc<dyn LookupProvider>, on_error: ErrorHandler) -> Self {
        let delegate = provider.current_lookup();
        Self {
            shared: Arc::new(DelegatedShared {
                provider,
                delegate: Mutex::new(Target {
                    lookup: delegate,
                    generation: 1,
                }),
                results: Mutex::new(HashMap::new()),
                on_error,
            }),
        }
    }

    /// Creates a delegated lookup from a provider closure
    pub fn from_fn<F>(provider: F) -> Self
    where
        F: Fn() -> Option<Arc<dyn Lookup>> + Send + Sync + 'static,
    {
        Self::new(Arc::new(provider))
    }

    /// The lookup queries are currently forwarded to, after resolving it again
    pub fn delegate(&self) -> Result<Option<Arc<dyn Lookup>>, LookupError> {
        self.lookup_updated()?;
        Ok(self.current()?.0)
    }

    /// Asks the provider for its current lookup and switches to it.
    ///
    /// Live results are re-pointed at the new target and notified if their
    /// items changed.
    ///
    /// # Returns
    ///
    /// Returns `Ok(true)` if the target changed.
    pub fn lookup_updated(&self) -> Result<bool, LookupError> {
        Self::sync(&self.shared)
    }

    fn sync(shared: &Arc<DelegatedShared>) -> Result<bool, LookupError> {
        let next = shared.provider.current_lookup();
        let generation = {
            let mut delegate = shared
                .delegate
                .lock()
                .map_err(|_| LookupError::LockError)?;
            let unchanged = match (delegate.lookup.as_ref(), next.as_ref()) {
                (Some(current), Some(next)) => same_lookup(current, next),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return Ok(false);
            }
            delegate.lookup = next.clone();
            delegate.generation += 1;
            delegate.generation
        };

        let live: Vec<Arc<DelegatedResult>> = {
            let mut results = shared.results.lock().map_err(|_| LookupError::LockError)?;
            results.retain(|_, result| result.strong_count() > 0);
            results.values().filter_map(Weak::upgrade).collect()
        };
        tracing::debug!(
            present = next.is_some(),
            results = live.len(),
            "delegated lookup switched target"
        );
        for result in live {
            if result.retarget(next.as_ref(), generation)? {
                result.refresh();
            }
        }
        Ok(true)
    }

    fn current(&self) -> Result<(Option<Arc<dyn Lookup>>, u64), LookupError> {
        let delegate = self
            .shared
            .delegate
            .lock()
            .map_err(|_| LookupError::LockError)?;
        Ok((delegate.lookup.clone(), delegate.generation))
    }
}

impl Lookup for DelegatedLookup {
    fn find_item(&self, query: TypeKey) -> Result<Option<Item>, LookupError> {
        match self.delegate()? {
            Some(target) => target.find_item(query),
            None => Ok(None),
        }
    }

    fn find_items(&self, query: TypeKey) -> Result<Vec<Item>, LookupError> {
        match self.delegate()? {
            Some(target) => target.find_items(query),
            None => Ok(Vec::new()),
        }
    }

    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError> {
        self.lookup_updated()?;
        let mut results = self
            .shared
            .results
            .lock()
            .map_err(|_| LookupError::LockError)?;
        if let Some(result) = results.get(&query).and_then(Weak::upgrade) {
            return Ok(result as Arc<dyn ResultView>);
        }
        // read under the results lock so a concurrent switch either is seen
        // here or finds the new result registered
        let (target, generation) = self.current()?;
        let result = Arc::new(DelegatedResult {
            query,
            owner: Arc::downgrade(&self.shared),
            binding: Mutex::new(Binding {
                generation: 0,
                source: None,
            }),
            snapshot: Mutex::new(Vec::new()),
            listeners: ListenerSet::new(query, Arc::clone(&self.shared.on_error)),
        });
        result.retarget(target.as_ref(), generation)?;
        result.recompute()?;
        results.insert(query, Arc::downgrade(&result));
        Ok(result as Arc<dyn ResultView>)
    }

    /// Re-resolves the target, then refreshes it if it supports refreshing
    fn refresh(&self) -> Result<(), LookupError> {
        match self.delegate()? {
            Some(target) => match target.refresh() {
                Ok(()) | Err(LookupError::Unsupported(_)) => Ok(()),
                Err(error) => Err(error),
            },
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DelegatedLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present = self
            .shared
            .delegate
            .lock()
            .map(|delegate| delegate.lookup.is_some())
            .unwrap_or(false);
        f.debug_struct("DelegatedLookup")
            .field("has_delegate", &present)
            .finish()
    }
}

struct Source {
    result: Arc<dyn ResultView>,
    subscription: ListenerId,
}

struct Binding {
    generation: u64,
    source: Option<Source>,
}

struct DelegatedResult {
    query: TypeKey,
    owner: Weak<DelegatedShared>,
    binding: Mutex<Binding>,
    snapshot: Mutex<Vec<Item>>,
    listeners: Arc<ListenerSet>,
}

impl DelegatedResult {
    fn bound_generation(&self) -> Result<u64, LookupError> {
        Ok(self
            .binding
            .lock()
            .map_err(|_| LookupError::LockError)?
            .generation)
    }

    /// Moves the subscription to `target`; returns false if a newer target
    /// was already bound
    fn retarget(
        self: &Arc<Self>,
        target: Option<&Arc<dyn Lookup>>,
        generation: u64,
    ) -> Result<bool, LookupError> {
        if self.bound_generation()? >= generation {
            return Ok(false);
        }
        let next = match target {
            Some(target) => {
                let result = target.find_result(self.query)?;
                let delegated = Arc::downgrade(self);
                let forward: RawListener = Arc::new(move |_: &Arc<dyn ResultView>| {
                    if let Some(delegated) = delegated.upgrade() {
                        delegated.refresh();
                    }
                    Ok(())
                });
                let subscription = result.subscribe(forward)?;
                Some(Source {
                    result,
                    subscription,
                })
            }
            None => None,
        };

        let (stale, bound) = {
            let mut binding = self.binding.lock().map_err(|_| LookupError::LockError)?;
            if binding.generation >= generation {
                (next, false)
            } else {
                binding.generation = generation;
                (std::mem::replace(&mut binding.source, next), true)
            }
        };
        if let Some(stale) = stale {
            stale.result.unsubscribe(stale.subscription)?;
        }
        Ok(bound)
    }

    fn recompute(&self) -> Result<bool, LookupError> {
        loop {
            // the target result may call back into this result while answering
            let (generation, source) = {
                let binding = self.binding.lock().map_err(|_| LookupError::LockError)?;
                let source = binding
                    .source
                    .as_ref()
                    .map(|source| Arc::clone(&source.result));
                (binding.generation, source)
            };
            let items = match source {
                Some(result) => result.items()?,
                None => Vec::new(),
            };
            let mut snapshot = self.snapshot.lock().map_err(|_| LookupError::LockError)?;
            // rebound while answering; the items belong to a replaced target
            if self.bound_generation()? != generation {
                continue;
            }
            let changed = !same_members(&snapshot, &items);
            *snapshot = items;
            return Ok(changed);
        }
    }

    fn refresh(self: &Arc<Self>) {
        match self.recompute() {
            Ok(true) => {
                let source: Arc<dyn ResultView> = Arc::clone(self) as Arc<dyn ResultView>;
                self.listeners.fire(source, None);
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(query = %self.query, error = %error, "failed to recompute delegated result")
            }
        }
    }
}

impl ResultView for DelegatedResult {
    fn query(&self) -> TypeKey {
        self.query
    }

    fn items(&self) -> Result<Vec<Item>, LookupError> {
        if let Some(owner) = self.owner.upgrade() {
            DelegatedLookup::sync(&owner)?;
        }
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

impl Drop for DelegatedResult {
    fn drop(&mut self) {
        let source = match self.binding.get_mut() {
            Ok(binding) => binding.source.take(),
            Err(poisoned) => poisoned.into_inner().source.take(),
        };
        if let Some(source) = source {
            let _ = source.result.unsubscribe(source.subscription);
        }
    }
}
