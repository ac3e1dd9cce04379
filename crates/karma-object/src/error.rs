//! Error and anomaly types for the object core
//!
//! Two kinds of failure exist:
//! - [`ObjectError`]: a broken calling contract. Returned as `Err` and never
//!   silently recovered from.
//! - [`SoftAnomaly`]: a recoverable oddity. Logged as a warning, recorded on
//!   the context, and execution continues with a fallback.

use crate::config::ConfigError;

/// Contract violations raised by the object core
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// Outer object is not a live object of this context
    #[error("Invalid outer for '{name}': object is not registered in this context")]
    InvalidOuter {
        /// Name of the object being created
        name: String,
    },

    /// Class descriptor is not a live object of this context
    #[error("Class '{0}' is not registered in this context")]
    ForeignClass(String),

    /// Attempt to instantiate an abstract class
    #[error("Cannot instantiate abstract class '{0}'")]
    AbstractClass(String),

    /// Class has no instance layout (size zero or no constructor)
    #[error("Class '{0}' has no instance size and cannot be instantiated")]
    ZeroInstanceSize(String),

    /// Requested class is not a child of the requested Rust type
    #[error("Class '{class}' is not a child of '{expected}'")]
    ClassMismatch {
        /// Name of the class that was supplied
        class: String,
        /// Name of the class the caller asked for
        expected: String,
    },

    /// Two distinct Rust types registered under one class name
    #[error("Class name '{0}' is already registered by a different type")]
    DuplicateClassName(&'static str),

    /// Empty object name where one is required
    #[error("Object name cannot be empty")]
    EmptyName,

    /// Allocator arena was initialized twice
    #[error("Pooled allocator is already initialized")]
    AllocatorAlreadyInitialized,

    /// Field class lookup failed
    #[error("Unknown field class: {0}")]
    UnknownFieldClass(String),

    /// Field class already registered
    #[error("Field class '{0}' is already registered")]
    DuplicateFieldClass(String),

    /// Field class is not a property class
    #[error("Field class '{0}' is not a property class")]
    NotAProperty(String),

    /// Property does not fit in its owner struct
    #[error("Property '{property}' ({offset}+{size}) does not fit in '{owner}' ({owner_size} bytes)")]
    PropertyOutOfBounds {
        /// Property name
        property: String,
        /// Owner struct name
        owner: String,
        /// Byte offset of the property
        offset: usize,
        /// Total byte size of the property
        size: usize,
        /// Byte size of the owner struct
        owner_size: usize,
    },

    /// Property value access with a value of the wrong size
    #[error("Property '{property}' holds {expected} bytes, accessed as {actual} bytes")]
    PropertyTypeMismatch {
        /// Property name
        property: String,
        /// Element size of the property
        expected: usize,
        /// Size of the requested value type
        actual: usize,
    },

    /// Property accessed on an object whose class does not own it
    #[error("Property '{property}' does not belong to class '{class}'")]
    PropertyOwnerMismatch {
        /// Property name
        property: String,
        /// Class of the container object
        class: String,
    },

    /// Array index out of range for a static array property
    #[error("Index {index} out of bounds for property '{property}' (array dim {array_dim})")]
    PropertyIndexOutOfBounds {
        /// Property name
        property: String,
        /// Requested index
        index: usize,
        /// Static array dimension
        array_dim: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Recoverable anomalies; logged and recorded, never returned as errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SoftAnomaly {
    /// More than one object matched a scoped name lookup
    #[error("Ambiguous search, {matches} objects named '{name}' share one outer")]
    AmbiguousName {
        /// Name that was searched for
        name: String,
        /// Number of matching objects
        matches: usize,
    },

    /// An object was created without a name and received the sentinel name
    #[error("Object of class '{class}' created without a name, using 'NoName'")]
    EmptyName {
        /// Class of the object being created
        class: String,
    },

    /// The pooled allocator arena overflowed and fell back to the heap
    #[error("Pooled allocator arena exhausted, exceeded by {exceeded_bytes} bytes")]
    ArenaExhausted {
        /// Bytes requested beyond the arena's end so far
        exceeded_bytes: usize,
    },
}
