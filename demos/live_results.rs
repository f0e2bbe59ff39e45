//! Demonstrates live results across composed lookups.
//!
//! Two independent contents feed a `ProxyLookup`. A listener on the merged
//! result hears about changes in either one, and a `DelegatedLookup` follows
//! whichever document is currently active.
//!
//! Run with: cargo run --example live_results

use sovran_lookup::{
    DelegatedLookup, Entry, GenericLookup, Lookup, LookupError, LookupExt, LookupResult,
    ProxyLookup,
};
use std::sync::{Arc, Mutex};

trait Action: Send + Sync {
    fn label(&self) -> String;
}

struct Command(&'static str);

impl Action for Command {
    fn label(&self) -> String {
        self.0.to_string()
    }
}

fn action(name: &'static str) -> Entry<Command> {
    Entry::new(Command(name)).provides(|c| c as Arc<dyn Action>)
}

fn print_actions(title: &str, result: &LookupResult<dyn Action>) {
    let labels: Vec<String> = result
        .all_instances()
        .map(|actions| actions.iter().map(|a| a.label()).collect())
        .unwrap_or_default();
    println!("{}: {:?}", title, labels);
}

fn main() -> Result<(), LookupError> {
    // Global actions and per-document actions
    let (global_content, global) = GenericLookup::with_content();
    let (editor_content, editor) = GenericLookup::with_content();
    let (viewer_content, viewer) = GenericLookup::with_content();

    global_content.add(action("Quit"))?;
    editor_content.add(action("Save"))?;
    viewer_content.add(action("Zoom"))?;

    let editor: Arc<dyn Lookup> = Arc::new(editor);
    let viewer: Arc<dyn Lookup> = Arc::new(viewer);

    // The active document changes over time
    let active: Arc<Mutex<Arc<dyn Lookup>>> = Arc::new(Mutex::new(Arc::clone(&editor)));
    let current = Arc::clone(&active);
    let document = Arc::new(DelegatedLookup::from_fn(move || {
        current.lock().ok().map(|lookup| Arc::clone(&*lookup))
    }));

    let global: Arc<dyn Lookup> = Arc::new(global);
    let menu = ProxyLookup::new([global, Arc::clone(&document) as Arc<dyn Lookup>]);

    let result = menu.lookup_result::<dyn Action>()?;
    print_actions("menu", &result);
    result.add_listener(|result: &LookupResult<dyn Action>| {
        print_actions("menu changed", result)
    })?;

    editor_content.add(action("Undo"))?;
    global_content.add(action("Help"))?;

    // Switch documents and tell the delegate to look again
    if let Ok(mut slot) = active.lock() {
        *slot = Arc::clone(&viewer);
    }
    document.lookup_updated()?;

    // Changes to the inactive document no longer reach the menu
    editor_content.add(action("Redo"))?;
    viewer_content.add(action("Rotate"))?;

    print_actions("final", &result);
    Ok(())
}
