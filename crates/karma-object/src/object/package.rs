//! Packages
//!
//! A package is a root-level object that scopes other objects by being their
//! outer. The context creates one transient package on demand for objects that
//! have no natural home.

use super::base::{ObjectInitializer, UObject};
use crate::reflect::UObjectType;
use std::cell::Cell;

/// Name of the transient package
pub const TRANSIENT_PACKAGE_NAME: &str = "/Engine/Transient";

/// Root scope for a group of objects
#[repr(C)]
#[derive(Debug)]
pub struct UPackage {
    object: UObject,
    dirty: Cell<bool>,
}

impl UPackage {
    /// Whether the package has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Mark the package as changed or unchanged
    pub fn set_dirty_flag(&self, dirty: bool) {
        self.dirty.set(dirty);
    }
}

crate::impl_object_deref!(UPackage => UObject, object);

unsafe impl UObjectType for UPackage {
    type Super = UObject;
    const NAME: &'static str = "Package";
    const PACKAGE: &'static str = "/Script/CoreUObject";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self {
            object: UObject::new(init),
            dirty: Cell::new(false),
        }
    }
}
