//! The process-wide default lookup.
//!
//! Built on first access and cached afterwards. Resolution, in order:
//!
//! 1. a lookup installed with [`set_default_lookup`];
//! 2. the plugins of the default group (see [`set_default_group`]) are
//!    discovered into an [`EntryPointLookup`], then
//!    - a discovered lookup that is also a [`LookupProvider`] becomes the
//!      default provider: its current lookup is returned on every access,
//!      falling back to the lookup itself;
//!    - a discovered lookup is returned as is;
//!    - a discovered provider is wrapped in a [`DelegatedLookup`];
//!    - otherwise a [`ProxyLookup`] over the entry-point lookup is used.
//!
//! A plugin contributes a lookup by declaring the `dyn Lookup` capability:
//!
//! ```
//! use sovran_lookup::{default_lookup, Entry, FixedLookup, Item, Lookup, LookupError, Plugin};
//! use std::sync::Arc;
//!
//! fn system_lookup() -> Item {
//!     Entry::lazy("system", || Ok(FixedLookup::new([Arc::new(8080_u16)])))
//!         .provides(|lookup| lookup as Arc<dyn Lookup>)
//!         .into()
//! }
//!
//! sovran_lookup::inventory::submit! {
//!     Plugin::new(sovran_lookup::DEFAULT_GROUP, "system", system_lookup)
//! }
//!
//! fn main() -> Result<(), LookupError> {
//!     use sovran_lookup::LookupExt;
//!     let port = default_lookup()?.lookup::<u16>()?;
//!     assert_eq!(port.as_deref(), Some(&8080));
//!     Ok(())
//! }
//! ```

use crate::delegated::{DelegatedLookup, LookupProvider};
use crate::error::LookupError;
use crate::lookup::{Lookup, LookupExt};
use crate::plugin::{EntryPointLookup, InventorySource, PluginSource};
use crate::proxy::ProxyLookup;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// The plugin group searched for the default lookup
pub const DEFAULT_GROUP: &str = "lookup.default";

#[derive(Clone)]
struct Resolved {
    lookup: Arc<dyn Lookup>,
    provider: Option<Arc<dyn LookupProvider>>,
}

impl Resolved {
    fn fixed(lookup: Arc<dyn Lookup>) -> Self {
        Self {
            lookup,
            provider: None,
        }
    }

    fn current(&self) -> Arc<dyn Lookup> {
        self.provider
            .as_ref()
            .and_then(|provider| provider.current_lookup())
            .unwrap_or_else(|| Arc::clone(&self.lookup))
    }
}

enum Slot {
    Empty,
    Initializing(ThreadId),
    Ready(Resolved),
}

struct DefaultState {
    slot: Slot,
    group: Option<String>,
    source: Option<Arc<dyn PluginSource>>,
}

static STATE: Mutex<DefaultState> = Mutex::new(DefaultState {
    slot: Slot::Empty,
    group: None,
    source: None,
});
static READY: Condvar = Condvar::new();

fn lock_state() -> Result<MutexGuard<'static, DefaultState>, LookupError> {
    STATE.lock().map_err(|_| LookupError::LockError)
}

/// Returns the default lookup, building it on first access.
///
/// Other threads asking while it is being built wait for the result.
///
/// # Errors
///
/// - Returns `LookupError::ReentrantInitialization` when called from inside
///   the initialization on the same thread, e.g. by a plugin factory
/// - Returns `LookupError::Discovery` if the plugin source fails; nothing is
///   cached and the next call tries again
pub fn default_lookup() -> Result<Arc<dyn Lookup>, LookupError> {
    let me = thread::current().id();
    let mut state = lock_state()?;
    loop {
        match &state.slot {
            Slot::Ready(resolved) => {
                let resolved = resolved.clone();
                drop(state);
                return Ok(resolved.current());
            }
            Slot::Initializing(owner) if *owner == me => {
                return Err(LookupError::ReentrantInitialization)
            }
            Slot::Initializing(_) => {
                state = READY.wait(state).map_err(|_| LookupError::LockError)?;
            }
            Slot::Empty => break,
        }
    }

    state.slot = Slot::Initializing(me);
    let group = state
        .group
        .clone()
        .unwrap_or_else(|| DEFAULT_GROUP.to_string());
    let source = state
        .source
        .clone()
        .unwrap_or_else(|| Arc::new(InventorySource));
    drop(state);

    // resets the slot if resolution unwinds or the slot cannot be written
    let init = InitGuard { owner: me };
    let resolved = resolve(&group, source);

    let mut state = lock_state()?;
    let outcome = if let Slot::Ready(installed) = &state.slot {
        // installed by someone else while this thread was resolving
        Ok(installed.clone())
    } else {
        match resolved {
            Ok(resolved) => {
                state.slot = Slot::Ready(resolved.clone());
                Ok(resolved)
            }
            Err(error) => {
                tracing::warn!(group = %group, error = %error, "failed to build default lookup");
                state.slot = Slot::Empty;
                Err(error)
            }
        }
    };
    drop(state);
    drop(init);
    outcome.map(|resolved| resolved.current())
}

/// Puts the slot back to empty unless initialization filled it, then wakes waiters
struct InitGuard {
    owner: ThreadId,
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        let mut state = STATE.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(state.slot, Slot::Initializing(owner) if owner == self.owner) {
            state.slot = Slot::Empty;
        }
        READY.notify_all();
    }
}

fn resolve(group: &str, source: Arc<dyn PluginSource>) -> Result<Resolved, LookupError> {
    let entry_points = Arc::new(EntryPointLookup::with_source(group, source)?);

    for item in entry_points.lookup_result::<dyn Lookup>()?.all_items()? {
        if !item.satisfies::<dyn LookupProvider>() {
            continue;
        }
        if let (Some(lookup), Some(provider)) = (
            item.instance::<dyn Lookup>()?,
            item.instance::<dyn LookupProvider>()?,
        ) {
            tracing::info!(group, id = %item.id(), "default lookup is a discovered provider");
            return Ok(Resolved {
                lookup,
                provider: Some(provider),
            });
        }
    }

    if let Some(lookup) = entry_points.lookup::<dyn Lookup>()? {
        tracing::info!(group, "default lookup is a discovered lookup");
        return Ok(Resolved::fixed(lookup));
    }

    if let Some(provider) = entry_points.lookup::<dyn LookupProvider>()? {
        tracing::info!(group, "default lookup delegates to a discovered provider");
        return Ok(Resolved::fixed(Arc::new(DelegatedLookup::new(provider))));
    }

    tracing::info!(group, "default lookup proxies the discovered plugins");
    let entry_points: Arc<dyn Lookup> = entry_points;
    Ok(Resolved::fixed(Arc::new(ProxyLookup::new([entry_points]))))
}

/// Installs `lookup` as the default, replacing whatever was resolved
pub fn set_default_lookup(lookup: Arc<dyn Lookup>) -> Result<(), LookupError> {
    let mut state = lock_state()?;
    state.slot = Slot::Ready(Resolved::fixed(lookup));
    READY.notify_all();
    tracing::info!("default lookup installed");
    Ok(())
}

/// Changes the plugin group searched when the default lookup is built.
///
/// Only affects a lookup that has not been built yet.
pub fn set_default_group(group: impl Into<String>) -> Result<(), LookupError> {
    lock_state()?.group = Some(group.into());
    Ok(())
}

/// Changes where plugins are discovered when the default lookup is built
pub fn set_default_source(source: Arc<dyn PluginSource>) -> Result<(), LookupError> {
    lock_state()?.source = Some(source);
    Ok(())
}

/// Forgets the default lookup and its configuration.
///
/// The next [`default_lookup`] call resolves again from [`DEFAULT_GROUP`].
/// A resolution in progress on another thread is left to finish.
pub fn reset_default_lookup() -> Result<(), LookupError> {
    let mut state = STATE.lock().unwrap_or_else(PoisonError::into_inner);
    if !matches!(state.slot, Slot::Initializing(_)) {
        state.slot = Slot::Empty;
    }
    state.group = None;
    state.source = None;
    tracing::debug!("default lookup reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Entry, Item};
    use crate::plugin::Plugin;
    use crate::simple::SingletonLookup;
    use serial_test::serial;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct Marker(&'static str);

    fn reentrant() -> Item {
        Entry::lazy("reentrant", || {
            let nested = default_lookup();
            assert!(matches!(nested, Err(LookupError::ReentrantInitialization)));
            Ok(SingletonLookup::new(Entry::new(Marker("reentrant"))))
        })
        .provides(|lookup| lookup as Arc<dyn Lookup>)
        .into()
    }

    inventory::submit! { Plugin::new("default.unit.reentrant", "reentrant", reentrant) }

    static POISONED: AtomicBool = AtomicBool::new(false);

    // poisons the state lock during the first resolution only
    fn poisoning() -> Item {
        Entry::lazy("poisoning", || {
            if !POISONED.swap(true, Ordering::SeqCst) {
                let _ = thread::spawn(|| {
                    let _state = STATE.lock();
                    panic!("state poisoned during resolution");
                })
                .join();
            }
            Ok(SingletonLookup::new(Entry::new(Marker("poisoning"))))
        })
        .provides(|lookup| lookup as Arc<dyn Lookup>)
        .into()
    }

    inventory::submit! { Plugin::new("default.unit.poisoning", "poisoning", poisoning) }

    #[test]
    #[serial]
    fn test_installed_lookup_wins() -> Result<(), LookupError> {
        reset_default_lookup()?;
        let installed: Arc<dyn Lookup> = Arc::new(SingletonLookup::new(Entry::new(Marker("set"))));
        set_default_lookup(Arc::clone(&installed))?;
        let found = default_lookup()?;
        assert!(crate::lookup::same_lookup(&found, &installed));
        reset_default_lookup()
    }

    #[test]
    #[serial]
    fn test_reentrant_access_fails() -> Result<(), LookupError> {
        reset_default_lookup()?;
        set_default_group("default.unit.reentrant")?;
        let lookup = default_lookup()?;
        // resolution realized the plugin, whose factory asserted the nested failure
        let marker = lookup.lookup::<Marker>()?.expect("marker registered");
        assert_eq!(marker.0, "reentrant");
        reset_default_lookup()
    }

    #[test]
    #[serial]
    fn test_unwritable_slot_is_released() -> Result<(), LookupError> {
        reset_default_lookup()?;
        set_default_group("default.unit.poisoning")?;

        assert!(matches!(default_lookup(), Err(LookupError::LockError)));
        STATE.clear_poison();
        assert!(matches!(lock_state()?.slot, Slot::Empty));

        // the next access resolves again instead of reporting reentrancy
        let lookup = default_lookup()?;
        assert!(lookup.lookup::<Marker>()?.is_some());
        reset_default_lookup()
    }
}
