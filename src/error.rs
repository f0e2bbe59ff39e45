use thiserror::Error;

/// A boxed error type used by collaborators (convertors, listeners, plugin sources).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when using a lookup
#[derive(Error, Debug)]
pub enum LookupError {
    /// Failed to acquire an internal lock
    #[error("failed to acquire lock")]
    LockError,

    /// The content already backs another lookup
    #[error("content is already attached to a lookup")]
    ContentAlreadyAttached,

    /// A deferred item could not be realized; the item stays unrealized
    #[error("failed to realize item `{id}`")]
    Conversion {
        /// Persistence id of the item
        id: String,
        /// What the convertor reported
        #[source]
        source: BoxError,
    },

    /// The plugin source could not enumerate a group
    #[error("plugin discovery failed for group `{group}`")]
    Discovery {
        /// The group that was being discovered
        group: String,
        /// What the source reported
        #[source]
        source: BoxError,
    },

    /// The default lookup was requested while it is being built on the same thread
    #[error("default lookup requested while it is being initialized")]
    ReentrantInitialization,

    /// The operation is intentionally not implemented by this kind of lookup
    #[error("`{0}` is not supported by this lookup")]
    Unsupported(&'static str),
}

/// A failure raised by a single listener during notification.
///
/// Listener failures never abort the notification of sibling listeners and
/// never reach the mutating call; they are handed to the owner's error handler.
#[derive(Error, Debug)]
pub enum ListenerError {
    /// The listener returned an error
    #[error("listener {listener} on `{query}` failed")]
    Failed {
        /// Registration id of the listener
        listener: u64,
        /// Type name the result was queried with
        query: &'static str,
        /// What the listener returned
        #[source]
        source: BoxError,
    },

    /// The listener panicked
    #[error("listener {listener} on `{query}` panicked: {message}")]
    Panicked {
        /// Registration id of the listener
        listener: u64,
        /// Type name the result was queried with
        query: &'static str,
        /// The panic payload, when it was a string
        message: String,
    },
}

impl LookupError {
    pub(crate) fn conversion(id: impl Into<String>, source: BoxError) -> Self {
        LookupError::Conversion {
            id: id.into(),
            source,
        }
    }
}
