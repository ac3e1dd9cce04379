//! Type descriptor graph
//!
//! `UField → UStruct → UClass`, each a `#[repr(C)]` extension of its parent.
//! Descriptors form a single-inheritance tree through `super_struct`, rooted
//! at the `Object` class whose super is `None`.
//!
//! Descriptor equality is identity: the bootstrap guarantees one descriptor
//! per type name, so two descriptors are equal only if they are the same
//! object.

use super::property::FProperty;
use super::registration::{ClassParams, ClassVTable, UObjectType};
use crate::object::{EClassFlags, ObjectInitializer, UObject, UObjectBase};
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;

/// Base of every reflected descriptor
#[repr(C)]
#[derive(Debug)]
pub struct UField {
    object: UObject,
}

impl UField {
    /// Construct the field part of a derived descriptor
    pub fn new(init: &ObjectInitializer<'_>) -> Self {
        Self {
            object: UObject::new(init),
        }
    }
}

crate::impl_object_deref!(UField => UObject, object);

unsafe impl UObjectType for UField {
    type Super = UObject;
    const NAME: &'static str = "Field";
    const PACKAGE: &'static str = "/Script/CoreUObject";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self::new(init)
    }
}

/// Descriptor of a type with an instance layout
#[repr(C)]
pub struct UStruct {
    field: UField,
    super_struct: Cell<Option<NonNull<UStruct>>>,
    properties_size: usize,
    min_alignment: usize,
    child_properties: RefCell<Vec<NonNull<FProperty>>>,
}

impl UStruct {
    /// Construct a struct descriptor; the layout comes from the initializer's
    /// class parameters and is empty without them
    pub fn new(init: &ObjectInitializer<'_>) -> Self {
        let (properties_size, min_alignment) = init
            .class_params()
            .map_or((0, 1), |params| (params.properties_size, params.min_alignment));

        Self {
            field: UField::new(init),
            super_struct: Cell::new(None),
            properties_size,
            min_alignment,
            child_properties: RefCell::new(Vec::new()),
        }
    }

    /// Parent descriptor (`None` for a root)
    pub fn get_super_struct(&self) -> Option<&UStruct> {
        // SAFETY: descriptors live as long as the context
        self.super_struct.get().map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    pub(crate) fn set_super_struct(&self, super_struct: Option<&UStruct>) {
        self.super_struct.set(super_struct.map(NonNull::from));
    }

    /// Whether this descriptor is `base` or inherits from it
    ///
    /// Walks the super chain comparing identity.
    pub fn is_child_of(&self, base: &UStruct) -> bool {
        let mut current = Some(self);
        while let Some(candidate) = current {
            if std::ptr::eq(candidate, base) {
                return true;
            }
            current = candidate.get_super_struct();
        }
        false
    }

    /// Number of descriptors from here to the root, excluding self
    pub fn get_inheritance_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.get_super_struct();
        while let Some(parent) = current {
            depth += 1;
            current = parent.get_super_struct();
        }
        depth
    }

    /// Byte size of an instance
    pub fn get_properties_size(&self) -> usize {
        self.properties_size
    }

    /// Byte alignment of an instance
    pub fn get_min_alignment(&self) -> usize {
        self.min_alignment
    }

    /// Properties declared directly on this struct
    pub fn get_child_properties(&self) -> Vec<&FProperty> {
        self.child_properties
            .borrow()
            .iter()
            // SAFETY: properties are owned by the context and never freed before it
            .map(|ptr| unsafe { &*ptr.as_ptr() })
            .collect()
    }

    pub(crate) fn add_child_property(&self, property: &FProperty) {
        self.child_properties.borrow_mut().push(NonNull::from(property));
    }

    /// Find a property declared here or on any super struct
    pub fn find_property_by_name(&self, name: &str) -> Option<&FProperty> {
        let mut current = Some(self);
        while let Some(strukt) = current {
            let found = strukt
                .child_properties
                .borrow()
                .iter()
                .copied()
                // SAFETY: see get_child_properties
                .map(|ptr| unsafe { &*ptr.as_ptr() })
                .find(|property| property.get_name() == name);
            if found.is_some() {
                return found;
            }
            current = strukt.get_super_struct();
        }
        None
    }
}

crate::impl_object_deref!(UStruct => UField, field);

impl PartialEq for UStruct {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for UStruct {}

impl fmt::Debug for UStruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UStruct")
            .field("name", &self.get_name())
            .field("super", &self.get_super_struct().map(|s| s.get_name()))
            .field("size", &self.properties_size)
            .field("alignment", &self.min_alignment)
            .finish()
    }
}

unsafe impl UObjectType for UStruct {
    type Super = UField;
    const NAME: &'static str = "Struct";
    const PACKAGE: &'static str = "/Script/CoreUObject";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self::new(init)
    }
}

/// Descriptor of a reflected object type
#[repr(C)]
pub struct UClass {
    strukt: UStruct,
    class_flags: Cell<EClassFlags>,
    package_name: &'static str,
    vtable: Option<ClassVTable>,
    class_default_object: Cell<Option<NonNull<UObjectBase>>>,
}

impl UClass {
    /// Construct a class descriptor from the initializer's class parameters
    ///
    /// Without parameters the class has no layout and cannot be instantiated.
    pub fn new(init: &ObjectInitializer<'_>) -> Self {
        let params: Option<&ClassParams> = init.class_params();
        Self {
            strukt: UStruct::new(init),
            class_flags: Cell::new(params.map_or(EClassFlags::empty(), |p| p.class_flags)),
            package_name: params.map_or("", |p| p.package_name),
            vtable: params.map(|p| p.vtable),
            class_default_object: Cell::new(None),
        }
    }

    /// Parent class (`None` for the root `Object` class)
    pub fn get_super_class(&self) -> Option<&UClass> {
        // SAFETY: the super of a class is always a class (see set_super_class)
        self.strukt
            .get_super_struct()
            .map(|strukt| unsafe { &*(strukt as *const UStruct).cast::<UClass>() })
    }

    pub(crate) fn set_super_class(&self, super_class: Option<&UClass>) {
        self.strukt.set_super_struct(super_class.map(|class| &class.strukt));
    }

    /// Class flags
    pub fn get_class_flags(&self) -> EClassFlags {
        self.class_flags.get()
    }

    /// Add class flags
    pub fn set_class_flags(&self, flags: EClassFlags) {
        self.class_flags.set(self.class_flags.get() | flags);
    }

    /// Whether any of `flags` is set (false for an empty mask)
    pub fn has_any_class_flags(&self, flags: EClassFlags) -> bool {
        self.class_flags.get().intersects(flags)
    }

    /// Whether all of `flags` are set
    pub fn has_all_class_flags(&self, flags: EClassFlags) -> bool {
        self.class_flags.get().contains(flags)
    }

    /// Package the class was declared in
    pub fn get_package_name(&self) -> &'static str {
        self.package_name
    }

    /// Rust type this class describes, if it was registered from one
    pub fn get_type_id(&self) -> Option<TypeId> {
        self.vtable.map(|vtable| vtable.type_id)
    }

    /// Whether instances of this class can be constructed
    pub fn is_constructible(&self) -> bool {
        self.vtable.is_some() && self.get_properties_size() > 0
    }

    pub(crate) fn vtable(&self) -> Option<&ClassVTable> {
        self.vtable.as_ref()
    }

    /// Class default object, if it has been created
    pub fn get_default_object_if_present(&self) -> Option<&UObjectBase> {
        // SAFETY: the default object lives as long as the context
        self.class_default_object
            .get()
            .map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    pub(crate) fn set_default_object(&self, object: &UObjectBase) {
        self.class_default_object.set(Some(NonNull::from(object)));
    }

    /// Iterate from this class up to the root
    pub fn super_chain(&self) -> impl Iterator<Item = &UClass> {
        std::iter::successors(Some(self), |class| class.get_super_class())
    }
}

crate::impl_object_deref!(UClass => UStruct, strukt);

impl PartialEq for UClass {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for UClass {}

impl fmt::Debug for UClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UClass")
            .field("name", &self.get_name())
            .field("super", &self.get_super_class().map(|c| c.get_name()))
            .field("size", &self.get_properties_size())
            .field("alignment", &self.get_min_alignment())
            .field("flags", &self.class_flags.get())
            .finish()
    }
}

unsafe impl UObjectType for UClass {
    type Super = UStruct;
    const NAME: &'static str = "Class";
    const PACKAGE: &'static str = "/Script/CoreUObject";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self::new(init)
    }
}
