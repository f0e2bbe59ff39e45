use crate::any_value::AnyValue;
use crate::capability::Capabilities;
use crate::error::BoxError;
use std::fmt;
use std::marker::PhantomData;

/// Postpones the creation of an instance until a lookup needs it.
///
/// Everything except [`realize`](Convertor::realize) must be answerable
/// without building the instance: the id, the display name and the
/// capabilities the instance will have. A deferred item is indexed from those
/// alone.
///
/// `realize` is called at most once per item when it succeeds; the instance is
/// then cached on the item. A failed `realize` is retried on the next access.
pub trait Convertor: Send + Sync + 'static {
    /// The concrete type produced
    type Output: Send + Sync + 'static;

    /// Builds the instance
    fn realize(&self) -> Result<Self::Output, BoxError>;

    /// A persistent identifier for the produced instance
    fn id(&self) -> String;

    /// A human presentable name, defaults to the id
    fn display_name(&self) -> String {
        self.id()
    }

    /// The types the produced instance can be found under
    fn capabilities(&self) -> Capabilities<Self::Output> {
        Capabilities::new()
    }
}

/// Object-safe face of a [`Convertor`], used by items
pub(crate) trait Realize: Send + Sync {
    fn realize_any(&self) -> Result<AnyValue, BoxError>;
}

impl<V: Convertor> Realize for V {
    fn realize_any(&self) -> Result<AnyValue, BoxError> {
        self.realize().map(AnyValue::new)
    }
}

/// A [`Convertor`] backed by a closure.
///
/// ```
/// use sovran_lookup::{Convertor, FnConvertor};
///
/// let convertor = FnConvertor::new("answer", || Ok(42u32));
/// assert_eq!(convertor.id(), "answer");
/// assert_eq!(convertor.realize().unwrap(), 42);
/// ```
pub struct FnConvertor<C, F> {
    id: String,
    display_name: Option<String>,
    factory: F,
    _marker: PhantomData<fn() -> C>,
}

impl<C, F> FnConvertor<C, F>
where
    C: Send + Sync + 'static,
    F: Fn() -> Result<C, BoxError> + Send + Sync + 'static,
{
    pub fn new(id: impl Into<String>, factory: F) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            factory,
            _marker: PhantomData,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl<C, F> Convertor for FnConvertor<C, F>
where
    C: Send + Sync + 'static,
    F: Fn() -> Result<C, BoxError> + Send + Sync + 'static,
{
    type Output = C;

    fn realize(&self) -> Result<C, BoxError> {
        (self.factory)()
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn display_name(&self) -> String {
        self.display_name.clone().unwrap_or_else(|| self.id.clone())
    }
}

impl<C, F> fmt::Debug for FnConvertor<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConvertor")
            .field("id", &self.id)
            .field("output", &std::any::type_name::<C>())
            .finish()
    }
}
