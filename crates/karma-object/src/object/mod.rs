//! Object identity, flags, packages and the object table

mod base;
mod flags;
mod package;
mod table;

pub use base::{is_valid, ObjectInitializer, UObject, UObjectBase, INDEX_NONE, NO_NAME};
pub use flags::{EClassFlags, EInternalObjectFlags, EObjectFlags, EPropertyFlags};
pub use package::{UPackage, TRANSIENT_PACKAGE_NAME};
pub use table::{ObjectIterator, UObjectArray};
