use crate::any_value::AnyValue;
use crate::capability::{Capabilities, CapabilitySet, TypeKey};
use crate::convertor::{Convertor, FnConvertor, Realize};
use crate::error::{BoxError, LookupError};
use std::fmt;
use std::sync::{Arc, Mutex};

/// The identity of an item inside a content.
///
/// Eager instances are identified by the address of their shared allocation,
/// so stored types need neither `Eq` nor `Hash`. Deferred items are identified
/// by their declared type and persistence id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ItemKey {
    /// An eager instance, by address
    Instance(usize),
    /// A convertor-backed item, by declared type and id
    Deferred(TypeKey, String),
}

enum Slot {
    Ready(AnyValue),
    Deferred {
        convertor: Box<dyn Realize>,
        realized: Mutex<Option<AnyValue>>,
    },
}

struct ItemInner {
    key: ItemKey,
    id: String,
    display_name: String,
    capabilities: CapabilitySet,
    slot: Slot,
}

/// A single entry of a lookup: one instance or one deferred producer.
///
/// Gives access to the identity, persistence id, display name and declared
/// type without forcing a deferred instance into existence. Cloning an item
/// clones a handle, not the instance.
#[derive(Clone)]
pub struct Item {
    inner: Arc<ItemInner>,
}

impl Item {
    /// The identity used for de-duplication and removal
    pub fn key(&self) -> &ItemKey {
        &self.inner.key
    }

    /// A persistent identifier for the item
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// A human presentable name for the item
    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    /// The concrete type of the instance, known without realizing it
    pub fn declared_type(&self) -> TypeKey {
        self.inner.capabilities.concrete()
    }

    /// Returns true if the instance can be found as `T`
    pub fn satisfies<T: ?Sized + 'static>(&self) -> bool {
        self.satisfies_key(&TypeKey::of::<T>())
    }

    pub(crate) fn satisfies_key(&self, key: &TypeKey) -> bool {
        self.inner.capabilities.contains(key)
    }

    pub(crate) fn capability_keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.inner.capabilities.keys()
    }

    /// Returns false while a deferred instance has not been built yet
    pub fn is_realized(&self) -> bool {
        match &self.inner.slot {
            Slot::Ready(_) => true,
            Slot::Deferred { realized, .. } => realized
                .lock()
                .map(|realized| realized.is_some())
                .unwrap_or(false),
        }
    }

    /// Returns the instance viewed as `T`, realizing it first if needed.
    ///
    /// Returns `Ok(None)` when the item does not satisfy `T`.
    ///
    /// # Errors
    ///
    /// - Returns `LookupError::Conversion` if the convertor fails; the item
    ///   stays unrealized and the next call retries
    /// - Returns `LookupError::LockError` if the realization lock is poisoned
    pub fn instance<T>(&self) -> Result<Option<Arc<T>>, LookupError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        if !self.satisfies_key(&key) {
            return Ok(None);
        }
        let value = self.realize()?;
        Ok(self
            .inner
            .capabilities
            .view(&key, &value)
            .and_then(|view| view.downcast_ref::<Arc<T>>().cloned()))
    }

    pub(crate) fn realize(&self) -> Result<AnyValue, LookupError> {
        match &self.inner.slot {
            Slot::Ready(value) => Ok(value.clone()),
            Slot::Deferred {
                convertor,
                realized,
            } => {
                // held across realize_any so concurrent readers wait for one realization
                let mut realized = realized.lock().map_err(|_| LookupError::LockError)?;
                if let Some(value) = realized.as_ref() {
                    return Ok(value.clone());
                }
                match convertor.realize_any() {
                    Ok(value) => {
                        tracing::debug!(id = %self.inner.id, "realized deferred item");
                        *realized = Some(value.clone());
                        Ok(value)
                    }
                    Err(source) => {
                        tracing::warn!(id = %self.inner.id, error = %source, "failed to realize item");
                        Err(LookupError::conversion(self.inner.id.clone(), source))
                    }
                }
            }
        }
    }

    /// Returns true if both handles refer to the same stored item
    pub fn same_item(&self, other: &Item) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.inner.id)
            .field("type", &self.declared_type())
            .field("realized", &self.is_realized())
            .finish()
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.id)
    }
}

enum Source {
    Instance(AnyValue),
    Deferred {
        convertor: Box<dyn Realize>,
        id: String,
        display_name: String,
    },
}

/// Builder for an [`Item`] of concrete type `C`.
///
/// ```
/// use sovran_lookup::{Entry, InstanceContent, GenericLookup, LookupExt, LookupError};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
///
/// impl Greeter for English {
///     fn greet(&self) -> String { "Hello".to_string() }
/// }
///
/// let content = InstanceContent::new();
/// let lookup = GenericLookup::new(&content)?;
///
/// content.add(Entry::new(English).provides::<dyn Greeter>(|e| e))?;
///
/// let greeter = lookup.lookup::<dyn Greeter>()?.expect("registered");
/// assert_eq!(greeter.greet(), "Hello");
/// # Ok::<(), LookupError>(())
/// ```
pub struct Entry<C> {
    source: Source,
    capabilities: Capabilities<C>,
    id: Option<String>,
    display_name: Option<String>,
}

impl<C> Entry<C>
where
    C: Send + Sync + 'static,
{
    /// An eager entry owning `value`
    pub fn new(value: C) -> Self {
        Self::shared(Arc::new(value))
    }

    /// An eager entry for an already shared instance; removal uses the same `Arc`
    pub fn shared(value: Arc<C>) -> Self {
        Self {
            source: Source::Instance(AnyValue::from_arc(value)),
            capabilities: Capabilities::new(),
            id: None,
            display_name: None,
        }
    }

    /// A deferred entry realized through `convertor`
    pub fn deferred<V>(convertor: V) -> Self
    where
        V: Convertor<Output = C>,
    {
        let id = convertor.id();
        let display_name = convertor.display_name();
        let capabilities = convertor.capabilities();
        Self {
            source: Source::Deferred {
                convertor: Box::new(convertor),
                id,
                display_name,
            },
            capabilities,
            id: None,
            display_name: None,
        }
    }

    /// A deferred entry realized by calling `factory`
    pub fn lazy<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<C, BoxError> + Send + Sync + 'static,
    {
        Self::deferred(FnConvertor::new(id, factory))
    }

    /// Declares that the instance can also be found as `T`
    pub fn provides<T>(mut self, cast: impl Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.capabilities = self.capabilities.provides(cast);
        self
    }

    /// Replaces the declared capabilities
    pub fn with_capabilities(mut self, capabilities: Capabilities<C>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the persistence id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl<C> From<Entry<C>> for Item
where
    C: Send + Sync + 'static,
{
    fn from(entry: Entry<C>) -> Self {
        let capabilities = entry.capabilities.set;
        let concrete = capabilities.concrete();
        let (key, id, display_name, slot) = match entry.source {
            Source::Instance(value) => {
                let identity = value.identity();
                let id = entry
                    .id
                    .unwrap_or_else(|| format!("{}@{:#x}", concrete.name(), identity));
                let display_name = entry.display_name.unwrap_or_else(|| id.clone());
                (ItemKey::Instance(identity), id, display_name, Slot::Ready(value))
            }
            Source::Deferred {
                convertor,
                id,
                display_name,
            } => {
                let id = entry.id.unwrap_or(id);
                let display_name = entry.display_name.unwrap_or(display_name);
                let slot = Slot::Deferred {
                    convertor,
                    realized: Mutex::new(None),
                };
                (ItemKey::Deferred(concrete, id.clone()), id, display_name, slot)
            }
        };
        Item {
            inner: Arc::new(ItemInner {
                key,
                id,
                display_name,
                capabilities,
                slot,
            }),
        }
    }
}

impl<C> From<Arc<C>> for Item
where
    C: Send + Sync + 'static,
{
    fn from(value: Arc<C>) -> Self {
        Entry::shared(value).into()
    }
}
