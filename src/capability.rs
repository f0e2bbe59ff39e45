use crate::any_value::AnyValue;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// A runtime tag for a queried or concrete type.
///
/// Works for sized types and for trait objects alike, so both
/// `TypeKey::of::<Config>()` and `TypeKey::of::<dyn Greeter>()` are valid.
/// Equality and hashing only consider the [`TypeId`].
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying [`TypeId`]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// The type name, for diagnostics only
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if this key was built for `T`
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Turns the realized concrete value into a boxed `Arc<T>` view.
type Caster = Arc<dyn Fn(&AnyValue) -> Option<AnyView> + Send + Sync>;

/// A type-erased `Arc<T>` produced for one capability of an instance.
pub(crate) type AnyView = Box<dyn Any + Send + Sync>;

/// The types an instance of `C` can be found under.
///
/// Rust has no runtime "is-a" relation, so an item declares it explicitly:
/// every instance satisfies its own concrete type and `dyn Any + Send + Sync`,
/// and each call to [`provides`](Capabilities::provides) adds one more type,
/// usually a trait object the concrete type implements.
///
/// Capabilities are declared without an instance, which is what lets deferred
/// items take part in queries before they are realized.
///
/// ```
/// use sovran_lookup::Capabilities;
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
/// let caps = Capabilities::<English>::new().provides::<dyn Greeter>(|e| e);
/// assert!(caps.contains::<English>());
/// assert!(caps.contains::<dyn Greeter>());
/// assert!(!caps.contains::<String>());
/// ```
pub struct Capabilities<C> {
    pub(crate) set: CapabilitySet,
    _marker: PhantomData<fn() -> C>,
}

impl<C> Capabilities<C>
where
    C: Send + Sync + 'static,
{
    /// Creates the minimal set: `C` itself and `dyn Any + Send + Sync`
    pub fn new() -> Self {
        let mut set = CapabilitySet::new(TypeKey::of::<C>());
        set.insert(
            TypeKey::of::<C>(),
            Arc::new(|value: &AnyValue| {
                value
                    .downcast_arc::<C>()
                    .map(|concrete| Box::new(concrete) as AnyView)
            }),
        );
        set.insert(
            TypeKey::of::<dyn Any + Send + Sync>(),
            Arc::new(|value: &AnyValue| Some(Box::new(value.shared()) as AnyView)),
        );
        Self {
            set,
            _marker: PhantomData,
        }
    }

    /// Declares that instances of `C` can also be found as `T`.
    ///
    /// `cast` is normally the identity closure `|c| c`, which coerces
    /// `Arc<C>` into `Arc<dyn Trait>`.
    pub fn provides<T>(mut self, cast: impl Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.set.insert(
            TypeKey::of::<T>(),
            Arc::new(move |value: &AnyValue| {
                let concrete = value.downcast_arc::<C>()?;
                Some(Box::new(cast(concrete)) as AnyView)
            }),
        );
        self
    }

    /// Returns true if instances of `C` can be found as `T`
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.set.contains(&TypeKey::of::<T>())
    }
}

impl<C> Default for Capabilities<C>
where
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The erased form of [`Capabilities`] kept on every item.
#[derive(Clone)]
pub(crate) struct CapabilitySet {
    concrete: TypeKey,
    casts: Vec<(TypeKey, Caster)>,
}

impl CapabilitySet {
    fn new(concrete: TypeKey) -> Self {
        Self {
            concrete,
            casts: Vec::new(),
        }
    }

    fn insert(&mut self, key: TypeKey, caster: Caster) {
        match self.casts.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = caster,
            None => self.casts.push((key, caster)),
        }
    }

    pub(crate) fn concrete(&self) -> TypeKey {
        self.concrete
    }

    pub(crate) fn contains(&self, key: &TypeKey) -> bool {
        self.casts.iter().any(|(existing, _)| existing == key)
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.casts.iter().map(|(key, _)| *key)
    }

    /// Produces the `Arc<T>` view of `value` for the capability `key`
    pub(crate) fn view(&self, key: &TypeKey, value: &AnyValue) -> Option<AnyView> {
        self.casts
            .iter()
            .find(|(existing, _)| existing == key)
            .and_then(|(_, caster)| caster(value))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("concrete", &self.concrete)
            .field("provides", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}
