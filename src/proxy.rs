use crate::capability::TypeKey;
use crate::error::LookupError;
use crate::index::{dedup_items, same_members};
use crate::item::Item;
use crate::listener::{log_listener_error, ErrorHandler, ListenerId, ListenerSet, RawListener};
use crate::lookup::{same_lookup, Lookup};
use crate::result::ResultView;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Merges several lookups into one.
///
/// Members are consulted in order: [`lookup`](crate::LookupExt::lookup) returns
/// the first hit, [`lookup_all`](crate::LookupExt::lookup_all) concatenates
/// every member's matches and drops repeated items. Merged results listen to
/// each member's result and fire when the merged set of items changes.
///
/// ```
/// use sovran_lookup::{GenericLookup, Lookup, LookupExt, LookupError, ProxyLookup};
/// use std::sync::Arc;
///
/// let (system, system_lookup) = GenericLookup::with_content();
/// let (user, user_lookup) = GenericLookup::with_content();
/// system.add(Arc::new("system".to_string()))?;
/// user.add(Arc::new("user".to_string()))?;
///
/// let proxy = ProxyLookup::new([
///     Arc::new(user_lookup) as Arc<dyn Lookup>,
///     Arc::new(system_lookup) as Arc<dyn Lookup>,
/// ]);
/// assert_eq!(proxy.lookup::<String>()?.as_deref().map(String::as_str), Some("user"));
/// assert_eq!(proxy.lookup_all::<String>()?.len(), 2);
/// # Ok::<(), LookupError>(())
/// ```
#[derive(Clone)]
pub struct ProxyLookup {
    shared: Arc<ProxyShared>,
}

struct ProxyShared {
    members: Mutex<Vec<Arc<dyn Lookup>>>,
    results: Mutex<HashMap<TypeKey, Weak<ProxyResult>>>,
    on_error: ErrorHandler,
}

impl ProxyLookup {
    /// Creates a proxy over `members`, consulted in the given order
    pub fn new(members: impl IntoIterator<Item = Arc<dyn Lookup>>) -> Self {
        Self::with_error_handler(members, log_listener_error())
    }

    /// Like [`new`](Self::new), reporting listener failures to `on_error`
    pub fn with_error_handler(
        members: impl IntoIterator<Item = Arc<dyn Lookup>>,
        on_error: ErrorHandler,
    ) -> Self {
        Self {
            shared: Arc::new(ProxyShared {
                members: Mutex::new(members.into_iter().collect()),
                results: Mutex::new(HashMap::new()),
                on_error,
            }),
        }
    }

    /// The current members, in order
    pub fn members(&self) -> Result<Vec<Arc<dyn Lookup>>, LookupError> {
        Ok(self.lock_members()?.clone())
    }

    /// Appends a member; live merged results pick up its items
    pub fn add_lookup(&self, member: Arc<dyn Lookup>) -> Result<(), LookupError> {
        self.lock_members()?.push(Arc::clone(&member));
        let live = self.live_results()?;
        tracing::debug!(results = live.len(), "added proxy member");
        for result in live {
            result.attach(&member)?;
            result.refresh();
        }
        Ok(())
    }

    /// Removes a member, compared by identity.
    ///
    /// # Returns
    ///
    /// Returns `Ok(false)` if `member` was not part of this proxy.
    pub fn remove_lookup(&self, member: &Arc<dyn Lookup>) -> Result<bool, LookupError> {
        {
            let mut members = self.lock_members()?;
            let Some(position) = members.iter().position(|m| same_lookup(m, member)) else {
                return Ok(false);
            };
            members.remove(position);
        }
        let live = self.live_results()?;
        tracing::debug!(results = live.len(), "removed proxy member");
        for result in live {
            result.detach(member)?;
            result.refresh();
        }
        Ok(true)
    }

    fn lock_members(&self) -> Result<MutexGuard<'_, Vec<Arc<dyn Lookup>>>, LookupError> {
        self.shared.members.lock().map_err(|_| LookupError::LockError)
    }

    fn live_results(&self) -> Result<Vec<Arc<ProxyResult>>, LookupError> {
        let mut results = self
            .shared
            .results
            .lock()
            .map_err(|_| LookupError::LockError)?;
        results.retain(|_, result| result.strong_count() > 0);
        Ok(results.values().filter_map(Weak::upgrade).collect())
    }
}

impl Lookup for ProxyLookup {
    fn find_item(&self, query: TypeKey) -> Result<Option<Item>, LookupError> {
        for member in self.members()? {
            if let Some(item) = member.find_item(query)? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    fn find_items(&self, query: TypeKey) -> Result<Vec<Item>, LookupError> {
        let mut items = Vec::new();
        for member in self.members()? {
            items.extend(member.find_items(query)?);
        }
        Ok(dedup_items(items))
    }

    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError> {
        let mut results = self
            .shared
            .results
            .lock()
            .map_err(|_| LookupError::LockError)?;
        if let Some(result) = results.get(&query).and_then(Weak::upgrade) {
            return Ok(result as Arc<dyn ResultView>);
        }

        let result = Arc::new(ProxyResult {
            query,
            sources: Mutex::new(Vec::new()),
            snapshot: Mutex::new(Vec::new()),
            listeners: ListenerSet::new(query, Arc::clone(&self.shared.on_error)),
        });
        for member in self.members()? {
            result.attach(&member)?;
        }
        result.recompute()?;
        results.insert(query, Arc::downgrade(&result));
        Ok(result as Arc<dyn ResultView>)
    }

    /// Refreshes every member that supports it
    fn refresh(&self) -> Result<(), LookupError> {
        for member in self.members()? {
            match member.refresh() {
                Ok(()) | Err(LookupError::Unsupported(_)) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProxyLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members = self.shared.members.lock().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("ProxyLookup")
            .field("members", &members)
            .finish()
    }
}

struct Source {
    member: Arc<dyn Lookup>,
    result: Arc<dyn ResultView>,
    subscription: ListenerId,
}

/// A merged result, subscribed to the matching result of every member
struct ProxyResult {
    query: TypeKey,
    sources: Mutex<Vec<Source>>,
    snapshot: Mutex<Vec<Item>>,
    listeners: Arc<ListenerSet>,
}

impl ProxyResult {
    fn is_attached(&self, member: &Arc<dyn Lookup>) -> Result<bool, LookupError> {
        let sources = self.sources.lock().map_err(|_| LookupError::LockError)?;
        Ok(sources.iter().any(|source| same_lookup(&source.member, member)))
    }

    /// Subscribes to `member`; the member is queried without holding `sources`
    fn attach(self: &Arc<Self>, member: &Arc<dyn Lookup>) -> Result<(), LookupError> {
        if self.is_attached(member)? {
            return Ok(());
        }
        let result = member.find_result(self.query)?;
        let merged = Arc::downgrade(self);
        let forward: RawListener = Arc::new(move |_: &Arc<dyn ResultView>| {
            if let Some(merged) = merged.upgrade() {
                merged.refresh();
            }
            Ok(())
        });
        let subscription = result.subscribe(forward)?;

        let mut sources = self.sources.lock().map_err(|_| LookupError::LockError)?;
        if sources.iter().any(|source| same_lookup(&source.member, member)) {
            // attached concurrently
            drop(sources);
            result.unsubscribe(subscription)?;
            return Ok(());
        }
        sources.push(Source {
            member: Arc::clone(member),
            result,
            subscription,
        });
        Ok(())
    }

    fn detach(&self, member: &Arc<dyn Lookup>) -> Result<(), LookupError> {
        let removed = {
            let mut sources = self.sources.lock().map_err(|_| LookupError::LockError)?;
            sources
                .iter()
                .position(|source| same_lookup(&source.member, member))
                .map(|position| sources.remove(position))
        };
        if let Some(source) = removed {
            source.result.unsubscribe(source.subscription)?;
        }
        Ok(())
    }

    /// Rebuilds the merged snapshot; returns true if its members changed
    fn recompute(&self) -> Result<bool, LookupError> {
        // member results may call back into this result while answering
        let results: Vec<Arc<dyn ResultView>> = self
            .sources
            .lock()
            .map_err(|_| LookupError::LockError)?
            .iter()
            .map(|source| Arc::clone(&source.result))
            .collect();
        let mut items = Vec::new();
        for result in results {
            items.extend(result.items()?);
        }
        let items = dedup_items(items);
        let mut snapshot = self.snapshot.lock().map_err(|_| LookupError::LockError)?;
        let changed = !same_members(&snapshot, &items);
        *snapshot = items;
        Ok(changed)
    }

    fn refresh(self: &Arc<Self>) {
        match self.recompute() {
            Ok(true) => {
                let source: Arc<dyn ResultView> = Arc::clone(self) as Arc<dyn ResultView>;
                self.listeners.fire(source, None);
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(query = %self.query, error = %error, "failed to recompute merged result")
            }
        }
    }
}

impl ResultView for ProxyResult {
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

impl Drop for ProxyResult {
    fn drop(&mut self) {
        let sources = match self.sources.get_mut() {
            Ok(sources) => std::mem::take(sources),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for source in sources {
            let _ = source.result.unsubscribe(source.subscription);
        }
    }
}
