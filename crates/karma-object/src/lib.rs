//! Karma Object Core
//!
//! Reflection and lifetime management for the Karma engine's object model:
//! - **Objects**: identity records, flags, packages and the object table (`object` module)
//! - **Memory**: the pooled bump allocator objects are carved from (`memory` module)
//! - **Reflection**: class descriptors, registration, fields and properties (`reflect` module)
//! - **Context**: the owner of all of the above, plus construction and lookup
//!
//! # Example
//!
//! ```rust,ignore
//! use karma_object::prelude::*;
//!
//! #[repr(C)]
//! pub struct AActor {
//!     object: UObject,
//!     health: i32,
//! }
//!
//! karma_object::impl_object_deref!(AActor => UObject, object);
//!
//! unsafe impl UObjectType for AActor {
//!     type Super = UObject;
//!     const NAME: &'static str = "Actor";
//!
//!     fn construct(init: &ObjectInitializer<'_>) -> Self {
//!         Self { object: UObject::new(init), health: 100 }
//!     }
//! }
//!
//! let ctx = ObjectContext::with_defaults()?;
//! let level = ctx.get_transient_package()?;
//! let actor = ctx.new_object::<AActor>(Some(level.as_object_base()), None, "Hero", EObjectFlags::PUBLIC)?;
//! assert!(actor.is_a::<UObject>());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Configuration loaded from TOML
pub mod config;

/// Construction and lookup entry points on the context
pub mod construct;

/// The object context
pub mod context;

/// Contract violations and soft anomalies
pub mod error;

/// Pooled object memory
pub mod memory;

/// Object identity, flags, packages and the object table
pub mod object;

/// Class descriptors, registration, fields and properties
pub mod reflect;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigError, DuplicateResolution, ObjectConfig};
pub use construct::{AllocatedObject, StaticConstructObjectParameters};
pub use context::ObjectContext;
pub use error::{ObjectError, SoftAnomaly};
pub use memory::{PooledObjectAllocator, MIN_OBJECT_ALIGNMENT};
pub use object::{
    is_valid, EClassFlags, EInternalObjectFlags, EObjectFlags, EPropertyFlags, ObjectInitializer,
    UObject, UObjectArray, UObjectBase, UPackage, INDEX_NONE, NO_NAME, TRANSIENT_PACKAGE_NAME,
};
pub use reflect::{
    ClassParams, ClassVTable, FField, FFieldClass, FFieldVariant, FProperty, FieldClassRegistry,
    PlainValue, PropertyParams, UClass, UField, UObjectType, UStruct,
};

/// Items needed to declare and use reflected types
pub mod prelude {
    pub use crate::context::ObjectContext;
    pub use crate::error::ObjectError;
    pub use crate::object::{
        EClassFlags, EInternalObjectFlags, EObjectFlags, ObjectInitializer, UObject, UObjectBase,
        UPackage,
    };
    pub use crate::reflect::{PropertyParams, UClass, UObjectType, UStruct};
}
