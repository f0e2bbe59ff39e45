use pretty_assertions::assert_eq;
use sovran_lookup::{
    BoxError, GenericLookup, InstanceContent, ListenerError, LookupError, LookupExt,
    LookupListener, LookupResult, Task,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Counter {
    calls: Arc<AtomicUsize>,
}

impl Counter {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LookupListener<String> for Counter {
    fn result_changed(&self, _result: &LookupResult<String>) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Failing;

impl LookupListener<String> for Failing {
    fn result_changed(&self, _result: &LookupResult<String>) -> Result<(), BoxError> {
        Err("listener refused".into())
    }
}

#[test]
fn test_failing_listeners_are_isolated() -> Result<(), LookupError> {
    let reported: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&reported);
    let content = InstanceContent::builder()
        .on_listener_error(move |error: ListenerError| {
            sink.lock().unwrap().push(error.to_string());
        })
        .build();
    let lookup = GenericLookup::new(&content)?;
    let result = lookup.lookup_result::<String>()?;

    let before = Counter::default();
    let after = Counter::default();
    result.add_listener(before.clone())?;
    result.add_listener(Failing)?;
    result.add_listener(|_: &LookupResult<String>| panic!("listener exploded"))?;
    result.add_listener(after.clone())?;

    assert!(content.add(Arc::new("value".to_string()))?);

    assert_eq!(before.calls(), 1);
    assert_eq!(after.calls(), 1);
    assert_eq!(lookup.lookup_all::<String>()?.len(), 1);

    let reported = reported.lock().unwrap();
    assert_eq!(reported.len(), 2);
    assert!(reported[0].contains("failed"));
    assert!(reported[1].contains("listener exploded"));
    Ok(())
}

#[test]
fn test_removed_listener_is_not_called() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let result = lookup.lookup_result::<String>()?;
    let counter = Counter::default();
    let id = result.add_listener(counter.clone())?;

    content.add(Arc::new("one".to_string()))?;
    assert!(result.remove_listener(id)?);
    content.add(Arc::new("two".to_string()))?;

    assert_eq!(counter.calls(), 1);
    assert!(!result.remove_listener(id)?);
    Ok(())
}

#[test]
fn test_dropping_result_drops_listeners() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let counter = Counter::default();
    {
        let result = lookup.lookup_result::<String>()?;
        result.add_listener(counter.clone())?;
    }
    content.add(Arc::new("unobserved".to_string()))?;

    assert_eq!(counter.calls(), 0);
    assert_eq!(Arc::strong_count(&counter.calls), 1);
    Ok(())
}

#[test]
fn test_listener_may_mutate_content() -> Result<(), LookupError> {
    let content = Arc::new(InstanceContent::new());
    let lookup = GenericLookup::new(&content)?;
    let strings = lookup.lookup_result::<String>()?;

    let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
    let record = Arc::clone(&seen);
    let writer = Arc::clone(&content);
    strings.add_listener(move |result: &LookupResult<String>| {
        let count = result.all_items().unwrap().len();
        record.lock().unwrap().push(count);
        if count == 1 {
            // runs after this notification returns
            writer.add(Arc::new("echo".to_string())).unwrap();
        }
    })?;

    content.add(Arc::new("first".to_string()))?;

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    assert_eq!(lookup.lookup_all::<String>()?.len(), 2);
    Ok(())
}

#[test]
fn test_executor_relays_notifications() -> Result<(), LookupError> {
    let queue: Arc<Mutex<Vec<Task>>> = Arc::default();
    let sink = Arc::clone(&queue);
    let content = InstanceContent::builder()
        .executor(move |task: Task| sink.lock().unwrap().push(task))
        .build();
    let lookup = GenericLookup::new(&content)?;
    let result = lookup.lookup_result::<String>()?;
    let counter = Counter::default();
    result.add_listener(counter.clone())?;

    content.add(Arc::new("a".to_string()))?;
    content.add(Arc::new("b".to_string()))?;
    assert_eq!(counter.calls(), 0);

    let tasks: Vec<Task> = queue.lock().unwrap().drain(..).collect();
    assert_eq!(tasks.len(), 2);
    for task in tasks {
        task();
    }
    assert_eq!(counter.calls(), 2);
    Ok(())
}

#[test]
fn test_listener_sees_current_instances() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();
    let result = lookup.lookup_result::<String>()?;
    let snapshots: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
    let record = Arc::clone(&snapshots);
    result.add_listener(move |result: &LookupResult<String>| {
        let values = result
            .all_instances()
            .unwrap()
            .iter()
            .map(|s| s.to_string())
            .collect();
        record.lock().unwrap().push(values);
    })?;

    let first = Arc::new("first".to_string());
    content.add(Arc::clone(&first))?;
    content.add(Arc::new("second".to_string()))?;
    content.remove(&first)?;

    assert_eq!(
        *snapshots.lock().unwrap(),
        vec![
            vec!["first".to_string()],
            vec!["first".to_string(), "second".to_string()],
            vec!["second".to_string()],
        ]
    );
    Ok(())
}
