use pretty_assertions::assert_eq;
use sovran_lookup::{
    Convertor, Entry, FnConvertor, GenericLookup, InstanceContent, Item, ItemKey, LookupError,
    LookupExt, LookupResult, TypeKey,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

trait Parent: Send + Sync {
    fn name(&self) -> String;
}

struct ParentObject;

struct ChildObject;

impl Parent for ParentObject {
    fn name(&self) -> String {
        "parent".to_string()
    }
}

impl Parent for ChildObject {
    fn name(&self) -> String {
        "child".to_string()
    }
}

struct OtherObject;

fn names(parents: &[Arc<dyn Parent>]) -> Vec<String> {
    parents.iter().map(|p| p.name()).collect()
}

/// Counts notifications and remembers what the result held each time
struct Recorder<T: ?Sized> {
    calls: AtomicUsize,
    seen: Mutex<Vec<usize>>,
    _marker: std::marker::PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Recorder<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            _marker: std::marker::PhantomData,
        })
    }

    fn attach(self: &Arc<Self>, result: &LookupResult<T>) {
        let recorder = Arc::clone(self);
        result
            .add_listener(move |result: &LookupResult<T>| {
                recorder.calls.fetch_add(1, Ordering::SeqCst);
                let len = result.all_items().map(|items| items.len()).unwrap_or(0);
                recorder.seen.lock().unwrap().push(len);
            })
            .unwrap();
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[test]
fn test_parent_child_scenario() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let parent = Arc::new(ParentObject);
    let child = Arc::new(ChildObject);

    content.add(Entry::shared(Arc::clone(&parent)).provides(|p| p as Arc<dyn Parent>))?;
    content.add(Entry::shared(Arc::clone(&child)).provides(|c| c as Arc<dyn Parent>))?;

    assert_eq!(names(&lookup.lookup_all::<dyn Parent>()?), vec!["parent", "child"]);
    assert_eq!(lookup.lookup_all::<ChildObject>()?.len(), 1);

    let result = lookup.lookup_result::<dyn Parent>()?;
    let recorder = Recorder::new();
    recorder.attach(&result);

    assert!(content.remove(&child)?);

    assert_eq!(names(&lookup.lookup_all::<dyn Parent>()?), vec!["parent"]);
    assert_eq!(recorder.calls(), 1);
    assert_eq!(names(&result.all_instances()?), vec!["parent"]);
    assert!(lookup.lookup::<ChildObject>()?.is_none());
    Ok(())
}

#[test]
fn test_lookup_all_matches_stored_instances() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let values: Vec<Arc<u32>> = (0..6).map(Arc::new).collect();

    for value in &values {
        content.add(Arc::clone(value))?;
    }
    content.remove(&values[1])?;
    content.remove(&values[4])?;
    content.add(Arc::clone(&values[1]))?;

    let found: Vec<u32> = lookup.lookup_all::<u32>()?.iter().map(|v| **v).collect();
    assert_eq!(found, vec![0, 2, 3, 5, 1]);
    assert_eq!(content.len()?, 5);
    Ok(())
}

#[test]
fn test_add_then_remove_notifies_only_matching_results() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let strings = lookup.lookup_result::<String>()?;
    let others = lookup.lookup_result::<OtherObject>()?;
    let string_recorder = Recorder::new();
    let other_recorder = Recorder::new();
    string_recorder.attach(&strings);
    other_recorder.attach(&others);

    let text = Arc::new("text".to_string());
    assert!(content.add(Arc::clone(&text))?);
    assert!(content.remove(&text)?);
    assert!(!content.remove(&text)?);

    assert_eq!(string_recorder.calls(), 2);
    assert_eq!(*string_recorder.seen.lock().unwrap(), vec![1, 0]);
    assert_eq!(other_recorder.calls(), 0);
    assert!(strings.is_empty()?);
    Ok(())
}

#[test]
fn test_adding_same_instance_twice_is_silent() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let result = lookup.lookup_result::<String>()?;
    let recorder = Recorder::new();
    recorder.attach(&result);

    let text = Arc::new("once".to_string());
    assert!(content.add(Arc::clone(&text))?);
    assert!(!content.add(Arc::clone(&text))?);

    assert_eq!(recorder.calls(), 1);
    assert_eq!(lookup.lookup_all::<String>()?.len(), 1);
    Ok(())
}

#[test]
fn test_set_replaces_content_with_one_notification() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let a = Arc::new("a".to_string());
    let b = Arc::new("b".to_string());
    let c = Arc::new("c".to_string());
    content.add(Arc::clone(&a))?;
    content.add(Arc::clone(&b))?;

    let result = lookup.lookup_result::<String>()?;
    let recorder = Recorder::new();
    recorder.attach(&result);

    content.set([Arc::clone(&b), Arc::clone(&c)])?;
    assert_eq!(recorder.calls(), 1);
    let found: Vec<String> = result.all_instances()?.iter().map(|s| s.to_string()).collect();
    assert_eq!(found, vec!["b", "c"]);

    // same members, different order
    content.set([Arc::clone(&c), Arc::clone(&b)])?;
    assert_eq!(recorder.calls(), 1);
    let found: Vec<String> = result.all_instances()?.iter().map(|s| s.to_string()).collect();
    assert_eq!(found, vec!["c", "b"]);

    content.clear()?;
    assert_eq!(recorder.calls(), 2);
    assert!(content.is_empty()?);
    Ok(())
}

#[test]
fn test_set_keeps_realized_instances() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let builds = Arc::new(AtomicUsize::new(0));

    let declare = |builds: Arc<AtomicUsize>| -> Item {
        Entry::lazy("config", move || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(42_u64)
        })
        .into()
    };

    content.set([declare(Arc::clone(&builds))])?;
    let first = lookup.lookup::<u64>()?.expect("config registered");
    content.set([declare(Arc::clone(&builds))])?;
    let second = lookup.lookup::<u64>()?.expect("config registered");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_deferred_item_metadata_without_realization() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let convertor = FnConvertor::new("db-primary", || Ok(OtherObject))
        .with_display_name("Primary database");
    assert_eq!(convertor.display_name(), "Primary database");
    content.add(Entry::deferred(convertor))?;

    let result = lookup.lookup_result::<OtherObject>()?;
    let items = result.all_items()?;
    let item = &items[0];
    assert_eq!(item.id(), "db-primary");
    assert_eq!(item.display_name(), "Primary database");
    assert_eq!(item.declared_type(), TypeKey::of::<OtherObject>());
    assert!(!item.is_realized());
    assert_eq!(
        result.all_classes()?.into_iter().collect::<Vec<_>>(),
        vec![TypeKey::of::<OtherObject>()]
    );
    assert!(!item.is_realized());

    assert!(content.remove_deferred::<OtherObject>("db-primary")?);
    assert!(!content.contains_key(&ItemKey::Deferred(
        TypeKey::of::<OtherObject>(),
        "db-primary".to_string()
    ))?);
    Ok(())
}

#[test]
fn test_failed_conversion_surfaces_and_retries() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    content.add(Entry::lazy("flaky", move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("first attempt fails".into())
        } else {
            Ok(OtherObject)
        }
    }))?;

    match lookup.lookup::<OtherObject>() {
        Err(LookupError::Conversion { id, .. }) => assert_eq!(id, "flaky"),
        other => panic!("expected a conversion error, got {:?}", other.map(|o| o.is_some())),
    }
    assert!(lookup.lookup::<OtherObject>()?.is_some());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_concurrent_realization_builds_once() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    content.add(Entry::lazy("shared", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(std::time::Duration::from_millis(10));
        Ok(vec![1_u8, 2, 3])
    }))?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lookup = lookup.clone();
            thread::spawn(move || lookup.lookup::<Vec<u8>>().unwrap().unwrap())
        })
        .collect();
    let instances: Vec<Arc<Vec<u8>>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    Ok(())
}

#[test]
fn test_thread_safety() -> Result<(), LookupError> {
    let content = Arc::new(InstanceContent::new());
    let lookup = GenericLookup::new(&content)?;

    let handles: Vec<_> = (0..10_u32)
        .map(|i| {
            let content = Arc::clone(&content);
            thread::spawn(move || {
                let value = Arc::new(i);
                content.add(Arc::clone(&value)).unwrap();
                if i % 2 == 0 {
                    content.remove(&value).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut found: Vec<u32> = lookup.lookup_all::<u32>()?.iter().map(|v| **v).collect();
    found.sort();
    assert_eq!(found, vec![1, 3, 5, 7, 9]);
    Ok(())
}

#[test]
fn test_error_display() {
    let err = LookupError::ContentAlreadyAttached;
    assert_eq!(err.to_string(), "content is already attached to a lookup");

    let err = LookupError::Unsupported("refresh");
    assert_eq!(err.to_string(), "`refresh` is not supported by this lookup");
}
