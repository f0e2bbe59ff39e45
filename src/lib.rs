//! # sovran-lookup
//!
//! A live, type-indexed object lookup registry.
//!
//! `sovran-lookup` lets components publish instances into a shared registry and
//! lets other components find them by type, without either side knowing about
//! the other. Results are live: a listener registered on a result is told
//! whenever the set of matching instances changes.
//!
//! ## Key Features
//!
//! - **Type and capability queries**: find instances by concrete type or by any
//!   `dyn Trait` they declare
//! - **Live results**: listeners fire only when the set of matching items
//!   actually changes
//! - **Lazy instances**: deferred items are indexed right away and built the
//!   first time someone asks for them, exactly once
//! - **Composition**: merge lookups with [`ProxyLookup`], redirect them with
//!   [`DelegatedLookup`], populate them from plugins with [`EntryPointLookup`]
//! - **Thread-safe**: built on `Arc<Mutex<_>>`; everything is `Send + Sync`
//!
//! ## Usage Examples
//!
//! ### Basic Usage
//!
//! ```rust
//! use sovran_lookup::{GenericLookup, InstanceContent, LookupError, LookupExt};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), LookupError> {
//!     // The content is the write side, the lookup is the read side
//!     let content = InstanceContent::new();
//!     let lookup = GenericLookup::new(&content)?;
//!
//!     content.add(Arc::new(42_i32))?;
//!     content.add(Arc::new("Hello, world!".to_string()))?;
//!
//!     let number = lookup.lookup::<i32>()?;
//!     println!("Number: {:?}", number);
//!
//!     // Nothing registered is not an error
//!     assert!(lookup.lookup::<bool>()?.is_none());
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Looking Up by Capability
//!
//! ```rust
//! use sovran_lookup::{Entry, GenericLookup, LookupError, LookupExt};
//! use std::sync::Arc;
//!
//! trait Animal: Send + Sync {
//!     fn speak(&self) -> String;
//! }
//!
//! struct Dog;
//! struct Cat;
//!
//! impl Animal for Dog {
//!     fn speak(&self) -> String { "Woof".to_string() }
//! }
//!
//! impl Animal for Cat {
//!     fn speak(&self) -> String { "Meow".to_string() }
//! }
//!
//! fn main() -> Result<(), LookupError> {
//!     let (content, lookup) = GenericLookup::with_content();
//!
//!     content.add(Entry::new(Dog).provides(|dog| dog as Arc<dyn Animal>))?;
//!     content.add(Entry::new(Cat).provides(|cat| cat as Arc<dyn Animal>))?;
//!
//!     let sounds: Vec<String> = lookup
//!         .lookup_all::<dyn Animal>()?
//!         .iter()
//!         .map(|animal| animal.speak())
//!         .collect();
//!     assert_eq!(sounds, vec!["Woof", "Meow"]);
//!
//!     // The concrete types are still there
//!     assert!(lookup.lookup::<Dog>()?.is_some());
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Listening for Changes
//!
//! ```rust
//! use sovran_lookup::{GenericLookup, LookupError, LookupExt, LookupResult};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), LookupError> {
//!     let (content, lookup) = GenericLookup::with_content();
//!     let result = lookup.lookup_result::<String>()?;
//!
//!     let changes = Arc::new(AtomicUsize::new(0));
//!     let seen = Arc::clone(&changes);
//!     result.add_listener(move |result: &LookupResult<String>| {
//!         seen.fetch_add(1, Ordering::SeqCst);
//!         println!("now {} strings", result.all_items().map(|items| items.len()).unwrap_or(0));
//!     })?;
//!
//!     let name = Arc::new("alice".to_string());
//!     content.add(Arc::clone(&name))?;
//!     content.add(Arc::new(7_u8))?; // not a String, no notification
//!     content.remove(&name)?;
//!
//!     assert_eq!(changes.load(Ordering::SeqCst), 2);
//!     Ok(())
//! }
//! ```
//!
//! ### Lazy Instances
//!
//! ```rust
//! use sovran_lookup::{Entry, GenericLookup, LookupError, LookupExt};
//!
//! struct Database {
//!     url: String,
//! }
//!
//! fn main() -> Result<(), LookupError> {
//!     let (content, lookup) = GenericLookup::with_content();
//!
//!     content.add(Entry::lazy("primary-db", || {
//!         Ok(Database { url: "postgres://localhost/app".to_string() })
//!     }))?;
//!
//!     // The item is known without building the database
//!     let item = lookup.lookup_item::<Database>()?.expect("registered");
//!     assert_eq!(item.id(), "primary-db");
//!     assert!(!item.is_realized());
//!
//!     let db = lookup.lookup::<Database>()?.expect("registered");
//!     println!("connected to {}", db.url);
//!     assert!(item.is_realized());
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Error Handling
//!
//! ```rust
//! use sovran_lookup::{Entry, GenericLookup, LookupError, LookupExt};
//!
//! struct Flaky;
//!
//! let (content, lookup) = GenericLookup::with_content();
//! if let Err(e) = content.add(Entry::lazy("flaky", || Err::<Flaky, _>("offline".into()))) {
//!     eprintln!("Failed to register: {}", e);
//!     return;
//! }
//!
//! match lookup.lookup::<Flaky>() {
//!     Ok(Some(_)) => println!("Flaky is up"),
//!     Ok(None) => println!("Nothing registered"),
//!     Err(LookupError::Conversion { id, .. }) => println!("Could not build {}", id),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```

mod any_value;
mod capability;
mod content;
mod convertor;
mod default;
mod delegated;
mod error;
mod executor;
mod generic;
mod index;
mod item;
mod listener;
mod lookup;
mod plugin;
mod proxy;
mod result;
mod simple;

pub use capability::{Capabilities, TypeKey};
pub use content::{InstanceContent, InstanceContentBuilder};
pub use convertor::{Convertor, FnConvertor};
pub use default::{
    default_lookup, reset_default_lookup, set_default_group, set_default_lookup,
    set_default_source, DEFAULT_GROUP,
};
pub use delegated::{DelegatedLookup, LookupProvider};
pub use error::{BoxError, ListenerError, LookupError};
pub use executor::{Executor, Task};
pub use generic::GenericLookup;
pub use item::{Entry, Item, ItemKey};
pub use listener::{log_listener_error, ErrorHandler, ListenerId, LookupListener, RawListener};
pub use lookup::{Lookup, LookupExt};
pub use plugin::{EntryPointLookup, InventorySource, Plugin, PluginSource};
pub use proxy::ProxyLookup;
pub use result::{LookupResult, ResultView};
pub use simple::{EmptyLookup, FixedLookup, SingletonLookup};

// Re-exported so plugins can be submitted without a direct dependency
pub use inventory;
