use pretty_assertions::assert_eq;
use serial_test::serial;
use sovran_lookup::{
    default_lookup, reset_default_lookup, set_default_group, set_default_lookup,
    set_default_source, BoxError, Entry, Item, Lookup, LookupError, LookupExt, LookupProvider,
    Plugin, ResultView, SingletonLookup, TypeKey,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug)]
struct Marker(&'static str);

fn marker(lookup: &Arc<dyn Lookup>) -> Option<&'static str> {
    lookup.lookup::<Marker>().unwrap().map(|m| m.0)
}

fn markers(lookup: &Arc<dyn Lookup>) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = lookup
        .lookup_all::<Marker>()
        .unwrap()
        .iter()
        .map(|m| m.0)
        .collect();
    found.sort();
    found
}

fn singleton(name: &'static str) -> SingletonLookup {
    SingletonLookup::new(Entry::new(Marker(name)))
}

// a plain lookup
fn plain_lookup() -> Item {
    Entry::lazy("plain", || Ok(singleton("plain")))
        .provides(|lookup| lookup as Arc<dyn Lookup>)
        .into()
}

inventory::submit! { Plugin::new("tests.default.plain", "plain", plain_lookup) }

// a lookup that is also a provider
static DUAL_PROVIDES: AtomicBool = AtomicBool::new(true);

struct Dual {
    own: SingletonLookup,
    provided: Arc<dyn Lookup>,
}

impl Lookup for Dual {
    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError> {
        self.own.find_result(query)
    }
}

impl LookupProvider for Dual {
    fn current_lookup(&self) -> Option<Arc<dyn Lookup>> {
        DUAL_PROVIDES
            .load(Ordering::SeqCst)
            .then(|| Arc::clone(&self.provided))
    }
}

fn dual_lookup() -> Item {
    Entry::lazy("dual", || {
        Ok(Dual {
            own: singleton("own"),
            provided: Arc::new(singleton("provided")),
        })
    })
    .provides(|dual| dual as Arc<dyn Lookup>)
    .provides(|dual| dual as Arc<dyn LookupProvider>)
    .into()
}

inventory::submit! { Plugin::new("tests.default.dual", "dual", dual_lookup) }

// only a provider
struct Provider {
    target: Arc<dyn Lookup>,
}

impl LookupProvider for Provider {
    fn current_lookup(&self) -> Option<Arc<dyn Lookup>> {
        Some(Arc::clone(&self.target))
    }
}

fn provider() -> Item {
    Entry::lazy("provider", || {
        Ok(Provider {
            target: Arc::new(singleton("delegated")),
        })
    })
    .provides(|provider| provider as Arc<dyn LookupProvider>)
    .into()
}

inventory::submit! { Plugin::new("tests.default.provider", "provider", provider) }

// neither: plain services
fn first_service() -> Item {
    Entry::lazy("first", || Ok(Marker("first"))).into()
}

fn second_service() -> Item {
    Entry::lazy("second", || Ok(Marker("second"))).into()
}

inventory::submit! { Plugin::new("tests.default.services", "first", first_service) }
inventory::submit! { Plugin::new("tests.default.services", "second", second_service) }

#[test]
#[serial]
fn test_discovered_lookup_is_returned() -> Result<(), LookupError> {
    reset_default_lookup()?;
    set_default_group("tests.default.plain")?;

    let lookup = default_lookup()?;
    assert_eq!(marker(&lookup), Some("plain"));
    assert!(Arc::ptr_eq(&lookup, &default_lookup()?));
    reset_default_lookup()
}

#[test]
#[serial]
fn test_discovered_provider_lookup_falls_back_to_itself() -> Result<(), LookupError> {
    reset_default_lookup()?;
    set_default_group("tests.default.dual")?;
    DUAL_PROVIDES.store(true, Ordering::SeqCst);

    assert_eq!(marker(&default_lookup()?), Some("provided"));

    DUAL_PROVIDES.store(false, Ordering::SeqCst);
    assert_eq!(marker(&default_lookup()?), Some("own"));

    DUAL_PROVIDES.store(true, Ordering::SeqCst);
    reset_default_lookup()
}

#[test]
#[serial]
fn test_discovered_provider_is_delegated() -> Result<(), LookupError> {
    reset_default_lookup()?;
    set_default_group("tests.default.provider")?;

    let lookup = default_lookup()?;
    assert_eq!(marker(&lookup), Some("delegated"));
    reset_default_lookup()
}

#[test]
#[serial]
fn test_plain_plugins_are_proxied() -> Result<(), LookupError> {
    reset_default_lookup()?;
    set_default_group("tests.default.services")?;

    let lookup = default_lookup()?;
    assert_eq!(markers(&lookup), vec!["first", "second"]);
    reset_default_lookup()
}

#[test]
#[serial]
fn test_empty_group_gives_empty_lookup() -> Result<(), LookupError> {
    reset_default_lookup()?;
    set_default_group("tests.default.nothing")?;

    let lookup = default_lookup()?;
    assert!(markers(&lookup).is_empty());
    reset_default_lookup()
}

#[test]
#[serial]
fn test_failed_discovery_is_retried() -> Result<(), LookupError> {
    reset_default_lookup()?;
    set_default_source(Arc::new(
        |_: &str| -> Result<Vec<Plugin>, BoxError> { Err("registry offline".into()) },
    ))?;

    assert!(matches!(
        default_lookup(),
        Err(LookupError::Discovery { .. })
    ));

    set_default_source(Arc::new(
        |_: &str| -> Result<Vec<Plugin>, BoxError> {
            Ok(vec![Plugin::new("any", "plain", plain_lookup)])
        },
    ))?;
    assert_eq!(marker(&default_lookup()?), Some("plain"));
    reset_default_lookup()
}

#[test]
#[serial]
fn test_installed_lookup_takes_precedence() -> Result<(), LookupError> {
    reset_default_lookup()?;
    set_default_group("tests.default.plain")?;
    set_default_lookup(Arc::new(singleton("installed")))?;

    assert_eq!(marker(&default_lookup()?), Some("installed"));

    reset_default_lookup()?;
    set_default_group("tests.default.plain")?;
    assert_eq!(marker(&default_lookup()?), Some("plain"));
    reset_default_lookup()
}

#[test]
#[serial]
fn test_concurrent_first_access_builds_once() -> Result<(), LookupError> {
    reset_default_lookup()?;
    set_default_group("tests.default.plain")?;

    let handles: Vec<_> = (0..8)
        .map(|_| thread::spawn(|| default_lookup().unwrap()))
        .collect();
    let lookups: Vec<Arc<dyn Lookup>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(lookups.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    reset_default_lookup()
}
