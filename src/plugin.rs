//! Populating lookups from plugin registrations.
//!
//! A plugin is a named declaration filed under a group. Declarations are
//! collected at link time with [`inventory`]:
//!
//! ```
//! use sovran_lookup::{Entry, EntryPointLookup, Item, LookupExt, LookupError, Plugin};
//!
//! struct Greeter;
//!
//! fn greeter() -> Item {
//!     Entry::lazy("greeter", || Ok(Greeter)).into()
//! }
//!
//! sovran_lookup::inventory::submit! {
//!     Plugin::new("demo.greeters", "greeter", greeter)
//! }
//!
//! fn main() -> Result<(), LookupError> {
//!     let lookup = EntryPointLookup::new("demo.greeters")?;
//!     assert!(lookup.lookup::<Greeter>()?.is_some());
//!     Ok(())
//! }
//! ```

use crate::capability::TypeKey;
use crate::content::InstanceContent;
use crate::error::{BoxError, LookupError};
use crate::generic::GenericLookup;
use crate::item::Item;
use crate::lookup::Lookup;
use crate::result::ResultView;
use std::fmt;
use std::sync::Arc;

/// Registration entry for a plugin.
///
/// `declare` should be cheap: it describes the item, usually as a deferred
/// entry, and the instance is only built when a lookup asks for it.
#[derive(Clone, Copy)]
pub struct Plugin {
    /// The group the plugin is discovered under
    pub group: &'static str,
    /// Name of the plugin, unique within its group
    pub name: &'static str,
    /// Builds the item the plugin contributes
    pub declare: fn() -> Item,
}

impl Plugin {
    pub const fn new(group: &'static str, name: &'static str, declare: fn() -> Item) -> Self {
        Self {
            group,
            name,
            declare,
        }
    }

    /// Declares the item this plugin contributes
    pub fn item(&self) -> Item {
        (self.declare)()
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("group", &self.group)
            .field("name", &self.name)
            .finish()
    }
}

inventory::collect!(Plugin);

/// Enumerates the plugins of a group.
///
/// An unknown or empty group is not an error. Any
/// `Fn(&str) -> Result<Vec<Plugin>, BoxError>` closure is a source.
pub trait PluginSource: Send + Sync {
    fn discover(&self, group: &str) -> Result<Vec<Plugin>, BoxError>;
}

impl<F> PluginSource for F
where
    F: Fn(&str) -> Result<Vec<Plugin>, BoxError> + Send + Sync,
{
    fn discover(&self, group: &str) -> Result<Vec<Plugin>, BoxError> {
        self(group)
    }
}

/// The plugins submitted with `inventory::submit!`, ordered by name
#[derive(Clone, Copy, Debug, Default)]
pub struct InventorySource;

impl PluginSource for InventorySource {
    fn discover(&self, group: &str) -> Result<Vec<Plugin>, BoxError> {
        let mut plugins: Vec<Plugin> = inventory::iter::<Plugin>()
            .filter(|plugin| plugin.group == group)
            .copied()
            .collect();
        plugins.sort_by(|a, b| a.name.cmp(b.name));
        Ok(plugins)
    }
}

/// A lookup over the items contributed by the plugins of one group.
///
/// Discovery happens on creation and again on every
/// [`refresh`](Lookup::refresh); items that survive a refresh keep their
/// realized instances and live results only fire when their items changed.
pub struct EntryPointLookup {
    group: String,
    source: Arc<dyn PluginSource>,
    content: InstanceContent,
    lookup: GenericLookup,
}

impl EntryPointLookup {
    /// Discovers `group` among the `inventory` registrations
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Discovery` if the source fails.
    pub fn new(group: impl Into<String>) -> Result<Self, LookupError> {
        Self::with_source(group, Arc::new(InventorySource))
    }

    /// Discovers `group` through a custom source
    pub fn with_source(
        group: impl Into<String>,
        source: Arc<dyn PluginSource>,
    ) -> Result<Self, LookupError> {
        let (content, lookup) = GenericLookup::with_content();
        let entry_points = Self {
            group: group.into(),
            source,
            content,
            lookup,
        };
        entry_points.content.set(entry_points.discover()?)?;
        Ok(entry_points)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    fn discover(&self) -> Result<Vec<Item>, LookupError> {
        let plugins = self
            .source
            .discover(&self.group)
            .map_err(|source| LookupError::Discovery {
                group: self.group.clone(),
                source,
            })?;
        tracing::debug!(group = %self.group, plugins = plugins.len(), "discovered plugins");
        Ok(plugins.iter().map(Plugin::item).collect())
    }
}

impl Lookup for EntryPointLookup {
    fn find_item(&self, query: TypeKey) -> Result<Option<Item>, LookupError> {
        self.lookup.find_item(query)
    }

    fn find_items(&self, query: TypeKey) -> Result<Vec<Item>, LookupError> {
        self.lookup.find_items(query)
    }

    fn find_result(&self, query: TypeKey) -> Result<Arc<dyn ResultView>, LookupError> {
        self.lookup.find_result(query)
    }

    /// Discovers the group again and replaces the content with what was found
    fn refresh(&self) -> Result<(), LookupError> {
        let items = self.discover()?;
        self.content.set(items)
    }
}

impl fmt::Debug for EntryPointLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPointLookup")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}
