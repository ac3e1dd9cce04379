//! Object identity core
//!
//! [`UObjectBase`] is the state every object carries: name, outer, class and
//! flags, plus its slot in the object table. Every reflected type starts with
//! one, so a pointer to any object is also a pointer to its `UObjectBase`.

use super::flags::{EInternalObjectFlags, EObjectFlags};
use crate::error::ObjectError;
use crate::reflect::{ClassParams, UClass, UObjectType};
use once_cell::unsync::OnceCell;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;

/// Internal index of an object that has not been registered yet
pub const INDEX_NONE: i32 = -1;

/// Name given to objects created without one
pub const NO_NAME: &str = "NoName";

/// Arguments handed to an object's constructor
///
/// Only the context builds initializers, so every name, outer and class a
/// constructor sees belongs to a live context.
#[derive(Debug, Clone)]
pub struct ObjectInitializer<'a> {
    name: String,
    outer: Option<&'a UObjectBase>,
    class: Option<&'a UClass>,
    object_flags: EObjectFlags,
    internal_flags: EInternalObjectFlags,
    class_params: Option<ClassParams>,
}

impl<'a> ObjectInitializer<'a> {
    /// Create an initializer for a root-level object
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outer: None,
            class: None,
            object_flags: EObjectFlags::empty(),
            internal_flags: EInternalObjectFlags::empty(),
            class_params: None,
        }
    }

    /// Set the outer
    pub(crate) fn with_outer(mut self, outer: Option<&'a UObjectBase>) -> Self {
        self.outer = outer;
        self
    }

    /// Set the class
    pub(crate) fn with_class(mut self, class: &'a UClass) -> Self {
        self.class = Some(class);
        self
    }

    /// Set the object flags
    pub(crate) fn with_flags(mut self, flags: EObjectFlags) -> Self {
        self.object_flags = flags;
        self
    }

    /// Set the internal flags
    pub(crate) fn with_internal_flags(mut self, flags: EInternalObjectFlags) -> Self {
        self.internal_flags = flags;
        self
    }

    /// Describe the type a class descriptor under construction stands for
    pub(crate) fn with_class_params(mut self, params: ClassParams) -> Self {
        self.class_params = Some(params);
        self
    }

    /// Object name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Outer object
    pub fn outer(&self) -> Option<&'a UObjectBase> {
        self.outer
    }

    /// Class of the object being constructed
    pub fn class(&self) -> Option<&'a UClass> {
        self.class
    }

    /// Object flags
    pub fn object_flags(&self) -> EObjectFlags {
        self.object_flags
    }

    /// Internal flags
    pub fn internal_flags(&self) -> EInternalObjectFlags {
        self.internal_flags
    }

    /// Layout of the described type, when constructing a class descriptor
    pub fn class_params(&self) -> Option<&ClassParams> {
        self.class_params.as_ref()
    }
}

/// Identity record shared by every object
///
/// Layout in memory:
/// ```text
/// ┌──────────────────────────────────────┐
/// │ UObjectBase                          │
/// │  - object_flags / internal_flags     │
/// │  - internal_index (table slot)       │
/// │  - class (set once)                  │
/// │  - outer                             │
/// │  - name                              │
/// ├──────────────────────────────────────┤
/// │ Derived type data                    │
/// └──────────────────────────────────────┘
/// ```
#[repr(C)]
pub struct UObjectBase {
    object_flags: Cell<EObjectFlags>,
    internal_flags: Cell<EInternalObjectFlags>,
    internal_index: Cell<i32>,
    class_private: OnceCell<NonNull<UClass>>,
    outer_private: Option<NonNull<UObjectBase>>,
    name_private: RefCell<String>,
}

impl UObjectBase {
    /// Build the identity record from an initializer
    ///
    /// The record is registered in the object table once it has been placed
    /// at its final address.
    pub fn new(init: &ObjectInitializer<'_>) -> Self {
        let class_private = OnceCell::new();
        if let Some(class) = init.class() {
            let _ = class_private.set(NonNull::from(class));
        }

        Self {
            object_flags: Cell::new(init.object_flags()),
            internal_flags: Cell::new(init.internal_flags()),
            internal_index: Cell::new(INDEX_NONE),
            class_private,
            outer_private: init.outer().map(NonNull::from),
            name_private: RefCell::new(init.name().to_string()),
        }
    }

    /// View this record as itself (mirrors [`UObjectType::as_object_base`])
    #[inline]
    pub fn as_object_base(&self) -> &UObjectBase {
        self
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Object name
    pub fn get_name(&self) -> String {
        self.name_private.borrow().clone()
    }

    /// Compare the name without copying it
    pub fn has_name(&self, name: &str) -> bool {
        *self.name_private.borrow() == name
    }

    /// Rename the object
    pub fn rename(&self, new_name: &str) -> Result<(), ObjectError> {
        if new_name.is_empty() {
            return Err(ObjectError::EmptyName);
        }
        log::debug!("Renaming '{}' to '{}'", self.name_private.borrow(), new_name);
        *self.name_private.borrow_mut() = new_name.to_string();
        Ok(())
    }

    /// Outer object, if any
    pub fn get_outer(&self) -> Option<&UObjectBase> {
        // SAFETY: outers live in the same context and are never freed before it
        self.outer_private.map(|outer| unsafe { &*outer.as_ptr() })
    }

    /// Outermost object in the outer chain (self for root-level objects)
    pub fn get_outermost(&self) -> &UObjectBase {
        let mut current = self;
        while let Some(outer) = current.get_outer() {
            current = outer;
        }
        current
    }

    /// Whether `outer` appears anywhere in this object's outer chain
    pub fn is_in(&self, outer: &UObjectBase) -> bool {
        let mut current = self.get_outer();
        while let Some(object) = current {
            if std::ptr::eq(object, outer) {
                return true;
            }
            current = object.get_outer();
        }
        false
    }

    /// Class descriptor of this object
    ///
    /// # Panics
    ///
    /// Panics if the class has not been assigned, which only happens while
    /// the core descriptors are being bootstrapped.
    pub fn get_class(&self) -> &UClass {
        match self.try_get_class() {
            Some(class) => class,
            None => panic!(
                "object '{}' has no class descriptor",
                self.name_private.borrow()
            ),
        }
    }

    /// Class descriptor, or `None` during bootstrap
    pub fn try_get_class(&self) -> Option<&UClass> {
        // SAFETY: class descriptors live as long as the context
        self.class_private.get().map(|class| unsafe { &*class.as_ptr() })
    }

    /// Assign the class once; later calls are ignored
    pub(crate) fn set_class(&self, class: &UClass) -> bool {
        self.class_private.set(NonNull::from(class)).is_ok()
    }

    /// Slot in the object table
    pub fn get_internal_index(&self) -> i32 {
        self.internal_index.get()
    }

    pub(crate) fn set_internal_index(&self, index: i32) {
        self.internal_index.set(index);
    }

    /// Path name: outer chain joined with '.'
    pub fn get_path_name(&self) -> String {
        let mut names = vec![self.get_name()];
        let mut current = self.get_outer();
        while let Some(outer) = current {
            names.push(outer.get_name());
            current = outer.get_outer();
        }
        names.reverse();
        names.join(".")
    }

    /// Class name followed by the path name
    pub fn get_full_name(&self) -> String {
        let class_name = self
            .try_get_class()
            .map_or_else(|| "None".to_string(), |class| class.get_name());
        format!("{} {}", class_name, self.get_path_name())
    }

    // ------------------------------------------------------------------
    // Type tests
    // ------------------------------------------------------------------

    /// Whether this object's class is `class` or derives from it
    pub fn is_a_class(&self, class: &UClass) -> bool {
        self.get_class().is_child_of(class)
    }

    /// Whether this object is an instance of `T` or a subtype
    pub fn is_a<T: UObjectType>(&self) -> bool {
        let target = TypeId::of::<T>();
        let mut class = Some(self.get_class());
        while let Some(current) = class {
            if current.get_type_id() == Some(target) {
                return true;
            }
            class = current.get_super_class();
        }
        false
    }

    /// Downcast to `T` if this object is a `T`
    ///
    /// Only objects placed and registered by a context can be downcast; a
    /// record built by value in a constructor never is.
    pub fn cast<T: UObjectType>(&self) -> Option<&T> {
        if self.internal_index.get() != INDEX_NONE && self.is_a::<T>() {
            // SAFETY: the object's concrete type derives from T, and every
            // reflected type is repr(C) with its parent as first field
            Some(unsafe { &*(self as *const UObjectBase).cast::<T>() })
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Object flags
    // ------------------------------------------------------------------

    /// Current object flags
    pub fn get_flags(&self) -> EObjectFlags {
        self.object_flags.get()
    }

    /// Add flags
    pub fn set_flags(&self, flags: EObjectFlags) {
        self.object_flags.set(self.object_flags.get() | flags);
    }

    /// Remove flags
    pub fn clear_flags(&self, flags: EObjectFlags) {
        self.object_flags.set(self.object_flags.get() - flags);
    }

    /// Whether any of `flags` is set (false for an empty mask)
    pub fn has_any_flags(&self, flags: EObjectFlags) -> bool {
        self.object_flags.get().intersects(flags)
    }

    /// Whether all of `flags` are set
    pub fn has_all_flags(&self, flags: EObjectFlags) -> bool {
        self.object_flags.get().contains(flags)
    }

    // ------------------------------------------------------------------
    // Internal flags
    // ------------------------------------------------------------------

    /// Current internal flags
    pub fn get_internal_flags(&self) -> EInternalObjectFlags {
        self.internal_flags.get()
    }

    /// Add internal flags
    pub fn set_internal_flags(&self, flags: EInternalObjectFlags) {
        self.internal_flags.set(self.internal_flags.get() | flags);
    }

    /// Remove internal flags
    pub fn clear_internal_flags(&self, flags: EInternalObjectFlags) {
        self.internal_flags.set(self.internal_flags.get() - flags);
    }

    /// Whether any of `flags` is set (false for an empty mask)
    pub fn has_any_internal_flags(&self, flags: EInternalObjectFlags) -> bool {
        self.internal_flags.get().intersects(flags)
    }

    /// Whether all of `flags` are set
    pub fn has_all_internal_flags(&self, flags: EInternalObjectFlags) -> bool {
        self.internal_flags.get().contains(flags)
    }

    // ------------------------------------------------------------------
    // Lifecycle markers (flags only, nothing is collected)
    // ------------------------------------------------------------------

    /// Mark the object as garbage
    pub fn mark_as_garbage(&self) {
        self.set_internal_flags(EInternalObjectFlags::GARBAGE);
        self.set_flags(EObjectFlags::MIRRORED_GARBAGE);
    }

    /// Undo [`mark_as_garbage`](Self::mark_as_garbage)
    pub fn clear_garbage(&self) {
        self.clear_internal_flags(EInternalObjectFlags::GARBAGE);
        self.clear_flags(EObjectFlags::MIRRORED_GARBAGE);
    }

    /// Whether the object is marked as garbage
    pub fn is_garbage(&self) -> bool {
        self.has_any_internal_flags(EInternalObjectFlags::GARBAGE)
    }

    /// Add to the root set
    pub fn add_to_root(&self) {
        self.set_internal_flags(EInternalObjectFlags::ROOT_SET);
    }

    /// Remove from the root set
    pub fn remove_from_root(&self) {
        self.clear_internal_flags(EInternalObjectFlags::ROOT_SET);
    }

    /// Whether the object is in the root set
    pub fn is_rooted(&self) -> bool {
        self.has_any_internal_flags(EInternalObjectFlags::ROOT_SET)
    }

    /// Whether the object is a class default object or an archetype
    pub fn is_template(&self) -> bool {
        self.has_any_flags(EObjectFlags::CLASS_DEFAULT_OBJECT | EObjectFlags::ARCHETYPE_OBJECT)
    }
}

impl fmt::Debug for UObjectBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UObjectBase")
            .field("name", &*self.name_private.borrow())
            .field("index", &self.internal_index.get())
            .field("class", &self.try_get_class().map(|class| class.get_name()))
            .field("outer", &self.get_outer().map(|outer| outer.get_name()))
            .field("flags", &self.object_flags.get())
            .finish()
    }
}

/// Whether `object` is present and not marked as garbage
pub fn is_valid(object: Option<&UObjectBase>) -> bool {
    object.is_some_and(|object| !object.is_garbage())
}

/// Root of the reflected type hierarchy
#[repr(C)]
#[derive(Debug)]
pub struct UObject {
    base: UObjectBase,
}

impl UObject {
    /// Construct the base part of a derived type
    pub fn new(init: &ObjectInitializer<'_>) -> Self {
        Self {
            base: UObjectBase::new(init),
        }
    }
}

crate::impl_object_deref!(UObject => UObjectBase, base);

unsafe impl UObjectType for UObject {
    type Super = UObject;
    const NAME: &'static str = "Object";
    const PACKAGE: &'static str = "/Script/CoreUObject";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self::new(init)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_base_defaults() {
        let base = UObjectBase::new(&ObjectInitializer::new("Thing"));
        assert_eq!(base.get_name(), "Thing");
        assert!(base.has_name("Thing"));
        assert_eq!(base.get_internal_index(), INDEX_NONE);
        assert!(base.get_outer().is_none());
        assert!(base.try_get_class().is_none());
        assert_eq!(base.get_flags(), EObjectFlags::empty());
    }

    #[test]
    fn test_flags() {
        let init = ObjectInitializer::new("Flags")
            .with_flags(EObjectFlags::PUBLIC | EObjectFlags::TRANSIENT);
        let base = UObjectBase::new(&init);

        assert!(base.has_any_flags(EObjectFlags::PUBLIC));
        assert!(base.has_all_flags(EObjectFlags::PUBLIC | EObjectFlags::TRANSIENT));
        assert!(!base.has_any_flags(EObjectFlags::STANDALONE));
        assert!(!base.has_any_flags(EObjectFlags::empty()));

        base.clear_flags(EObjectFlags::PUBLIC);
        assert!(!base.has_any_flags(EObjectFlags::PUBLIC));
        assert!(base.has_any_flags(EObjectFlags::TRANSIENT));
    }

    #[test]
    fn test_lifecycle_markers() {
        let base = UObjectBase::new(&ObjectInitializer::new("Marked"));
        assert!(is_valid(Some(&base)));
        assert!(!is_valid(None));

        base.mark_as_garbage();
        assert!(base.is_garbage());
        assert!(base.has_any_flags(EObjectFlags::MIRRORED_GARBAGE));
        assert!(!is_valid(Some(&base)));

        base.clear_garbage();
        assert!(is_valid(Some(&base)));

        base.add_to_root();
        assert!(base.is_rooted());
        base.remove_from_root();
        assert!(!base.is_rooted());
    }

    #[test]
    fn test_rename() {
        let base = UObjectBase::new(&ObjectInitializer::new("Old"));
        base.rename("New").unwrap();
        assert_eq!(base.get_name(), "New");
        assert!(matches!(base.rename(""), Err(ObjectError::EmptyName)));
        assert_eq!(base.get_name(), "New");
    }

    #[test]
    fn test_outer_chain() {
        let root = UObjectBase::new(&ObjectInitializer::new("Root"));
        let middle = UObjectBase::new(&ObjectInitializer::new("Middle").with_outer(Some(&root)));
        let leaf = UObjectBase::new(&ObjectInitializer::new("Leaf").with_outer(Some(&middle)));

        assert_eq!(leaf.get_path_name(), "Root.Middle.Leaf");
        assert!(std::ptr::eq(leaf.get_outermost(), &root));
        assert!(leaf.is_in(&root));
        assert!(leaf.is_in(&middle));
        assert!(!root.is_in(&leaf));
        assert_eq!(leaf.get_full_name(), "None Root.Middle.Leaf");
    }

    #[test]
    fn test_unregistered_record_never_downcasts() {
        let ctx = crate::context::ObjectContext::with_defaults().unwrap();
        let class = ctx.static_class::<crate::object::UPackage>().unwrap();

        let bare = UObjectBase::new(&ObjectInitializer::new("Fake").with_class(class));
        assert!(bare.is_a::<crate::object::UPackage>());
        assert!(bare.cast::<crate::object::UPackage>().is_none());
        assert!(bare.cast::<UObject>().is_none());

        let package = ctx.get_transient_package().unwrap();
        assert!(package.as_object_base().cast::<crate::object::UPackage>().is_some());
    }
}
