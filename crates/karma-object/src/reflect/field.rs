//! Field descriptors
//!
//! Fields are the lightweight reflection axis: they are not objects, are not
//! in the object table, and are owned either by an object (a struct or class)
//! or by another field (the inner property of a container).
//!
//! `FFieldClass` child tests use a 64-bit cast mask. Each of the first 64
//! registered field classes gets one bit; a class's mask is its own bit plus
//! its parent's mask, so "is child of" is a single AND. Classes registered
//! after the bits run out get id 0 and are tested by walking the super chain.

use crate::error::ObjectError;
use crate::object::{EClassFlags, EObjectFlags, UObjectBase};
use crate::reflect::{UClass, UStruct};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

/// Descriptor of a field type
pub struct FFieldClass {
    name: String,
    id: u64,
    cast_flags: u64,
    class_flags: EClassFlags,
    super_class: Option<NonNull<FFieldClass>>,
}

impl FFieldClass {
    /// Field class name
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Unique cast bit (0 once the 64 bits are used up)
    pub fn get_id(&self) -> u64 {
        self.id
    }

    /// Own bit plus every ancestor's bit
    pub fn get_cast_flags(&self) -> u64 {
        self.cast_flags
    }

    /// Parent field class
    pub fn get_super_class(&self) -> Option<&FFieldClass> {
        // SAFETY: field classes are boxed in the registry and never removed
        self.super_class.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Whether any of `flags` is set
    pub fn has_any_class_flags(&self, flags: EClassFlags) -> bool {
        self.class_flags.intersects(flags)
    }

    /// Whether this class is `base` or derives from it
    pub fn is_child_of(&self, base: &FFieldClass) -> bool {
        let base_id = base.id;
        if base_id != 0 {
            return self.cast_flags & base_id != 0;
        }
        self.is_child_of_slow(base)
    }

    fn is_child_of_slow(&self, base: &FFieldClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if std::ptr::eq(class, base) {
                return true;
            }
            current = class.get_super_class();
        }
        false
    }
}

impl PartialEq for FFieldClass {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for FFieldClass {}

impl fmt::Debug for FFieldClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FFieldClass")
            .field("name", &self.name)
            .field("id", &format_args!("{:#x}", self.id))
            .field("cast_flags", &format_args!("{:#x}", self.cast_flags))
            .field("super", &self.get_super_class().map(FFieldClass::get_name))
            .finish()
    }
}

/// Built-in field classes as `(name, super)`, parents first
const BUILTIN_FIELD_CLASSES: &[(&str, Option<&str>)] = &[
    ("Field", None),
    ("Property", Some("Field")),
    ("NumericProperty", Some("Property")),
    ("ByteProperty", Some("NumericProperty")),
    ("IntProperty", Some("NumericProperty")),
    ("Int64Property", Some("NumericProperty")),
    ("FloatProperty", Some("NumericProperty")),
    ("DoubleProperty", Some("NumericProperty")),
    ("BoolProperty", Some("Property")),
    ("StrProperty", Some("Property")),
    ("ObjectPropertyBase", Some("Property")),
    ("ObjectProperty", Some("ObjectPropertyBase")),
    ("StructProperty", Some("Property")),
    ("ArrayProperty", Some("Property")),
];

/// Registry of field classes
#[derive(Default)]
pub struct FieldClassRegistry {
    /// Field classes in registration order
    classes: RefCell<Vec<Box<FFieldClass>>>,

    /// Name → index into `classes`
    by_name: RefCell<FxHashMap<String, usize>>,
}

impl FieldClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in field classes
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (name, super_name) in BUILTIN_FIELD_CLASSES {
            // Built-in names are unique and listed parents first
            if let Err(err) = registry.register(name, *super_name, EClassFlags::NATIVE) {
                log::error!("Failed to register built-in field class '{}': {}", name, err);
            }
        }
        registry
    }

    /// Register a field class under `super_name`
    pub fn register(
        &self,
        name: &str,
        super_name: Option<&str>,
        class_flags: EClassFlags,
    ) -> Result<&FFieldClass, ObjectError> {
        if name.is_empty() {
            return Err(ObjectError::EmptyName);
        }
        if self.by_name.borrow().contains_key(name) {
            return Err(ObjectError::DuplicateFieldClass(name.to_string()));
        }

        let super_class = match super_name {
            Some(super_name) => Some(
                self.find(super_name)
                    .ok_or_else(|| ObjectError::UnknownFieldClass(super_name.to_string()))?,
            ),
            None => None,
        };

        let mut classes = self.classes.borrow_mut();
        let index = classes.len();
        let id = if index < 64 { 1u64 << index } else { 0 };
        let cast_flags = id | super_class.map_or(0, |class| class.cast_flags);

        if id == 0 {
            log::debug!("Field class '{}' has no cast bit, child tests walk the chain", name);
        }

        classes.push(Box::new(FFieldClass {
            name: name.to_string(),
            id,
            cast_flags,
            class_flags,
            super_class: super_class.map(NonNull::from),
        }));
        self.by_name.borrow_mut().insert(name.to_string(), index);

        let class: *const FFieldClass = &*classes[index];
        // SAFETY: the box is never dropped or moved while the registry lives
        Ok(unsafe { &*class })
    }

    /// Find a field class by name
    pub fn find(&self, name: &str) -> Option<&FFieldClass> {
        let index = *self.by_name.borrow().get(name)?;
        let class: *const FFieldClass = &*self.classes.borrow()[index];
        // SAFETY: see register
        Some(unsafe { &*class })
    }

    /// Number of registered field classes
    pub fn len(&self) -> usize {
        self.classes.borrow().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for FieldClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldClassRegistry")
            .field("classes", &self.len())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum FieldOwner {
    Object(NonNull<UObjectBase>),
    Field(NonNull<FField>),
}

/// Reflected member that is not itself an object
#[repr(C)]
pub struct FField {
    class_private: NonNull<FFieldClass>,
    owner: FieldOwner,
    name_private: String,
    flags_private: Cell<EObjectFlags>,
}

impl FField {
    /// Create a field of `class` owned by `owner`
    pub(crate) fn new(
        class: &FFieldClass,
        owner: FFieldVariant<'_>,
        name: impl Into<String>,
        flags: EObjectFlags,
    ) -> Self {
        let owner = match owner {
            FFieldVariant::Object(object) => FieldOwner::Object(NonNull::from(object)),
            FFieldVariant::Field(field) => FieldOwner::Field(NonNull::from(field)),
        };
        Self {
            class_private: NonNull::from(class),
            owner,
            name_private: name.into(),
            flags_private: Cell::new(flags),
        }
    }

    /// Field name
    pub fn get_name(&self) -> &str {
        &self.name_private
    }

    /// Field class
    pub fn get_class(&self) -> &FFieldClass {
        // SAFETY: field classes outlive every field
        unsafe { &*self.class_private.as_ptr() }
    }

    /// Whether this field's class is `class` or derives from it
    pub fn is_a(&self, class: &FFieldClass) -> bool {
        self.get_class().is_child_of(class)
    }

    /// Direct owner
    pub fn get_owner(&self) -> FFieldVariant<'_> {
        // SAFETY: owners live in the same context as the field
        unsafe {
            match self.owner {
                FieldOwner::Object(object) => FFieldVariant::Object(&*object.as_ptr()),
                FieldOwner::Field(field) => FFieldVariant::Field(&*field.as_ptr()),
            }
        }
    }

    /// Nearest owning object, found by walking up through owning fields
    pub fn get_owner_uobject(&self) -> &UObjectBase {
        let mut owner = self.get_owner();
        loop {
            match owner {
                FFieldVariant::Object(object) => return object,
                FFieldVariant::Field(field) => owner = field.get_owner(),
            }
        }
    }

    /// Owning struct, if the owning object is one
    pub fn get_owner_struct(&self) -> Option<&UStruct> {
        self.get_owner_uobject().cast::<UStruct>()
    }

    /// Owning class, if the owning object is one
    pub fn get_owner_class(&self) -> Option<&UClass> {
        self.get_owner_uobject().cast::<UClass>()
    }

    /// Path of owners joined with ':' after the owning object's path
    pub fn get_path_name(&self) -> String {
        match self.get_owner() {
            FFieldVariant::Object(object) => format!("{}:{}", object.get_path_name(), self.name_private),
            FFieldVariant::Field(field) => format!("{}.{}", field.get_path_name(), self.name_private),
        }
    }

    /// Field class name followed by the path name
    pub fn get_full_name(&self) -> String {
        format!("{} {}", self.get_class().get_name(), self.get_path_name())
    }

    /// Whether any of `flags` is set
    pub fn has_any_flags(&self, flags: EObjectFlags) -> bool {
        self.flags_private.get().intersects(flags)
    }

    /// Add flags
    pub fn set_flags(&self, flags: EObjectFlags) {
        self.flags_private.set(self.flags_private.get() | flags);
    }

    /// Remove flags
    pub fn clear_flags(&self, flags: EObjectFlags) {
        self.flags_private.set(self.flags_private.get() - flags);
    }
}

impl fmt::Debug for FField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FField")
            .field("class", &self.get_class().get_name())
            .field("name", &self.name_private)
            .field("owner", &self.get_owner().get_name())
            .finish()
    }
}

/// Owner of a field: an object or another field
#[derive(Debug, Clone, Copy)]
pub enum FFieldVariant<'a> {
    /// Owned by an object
    Object(&'a UObjectBase),
    /// Owned by a field
    Field(&'a FField),
}

impl<'a> FFieldVariant<'a> {
    /// Whether the owner is an object
    pub fn is_uobject(&self) -> bool {
        matches!(self, FFieldVariant::Object(_))
    }

    /// The object, if the owner is one
    pub fn to_uobject(&self) -> Option<&'a UObjectBase> {
        match *self {
            FFieldVariant::Object(object) => Some(object),
            FFieldVariant::Field(_) => None,
        }
    }

    /// The field, if the owner is one
    pub fn to_field(&self) -> Option<&'a FField> {
        match *self {
            FFieldVariant::Field(field) => Some(field),
            FFieldVariant::Object(_) => None,
        }
    }

    /// The object, without checking the variant
    ///
    /// # Safety
    ///
    /// The variant must be `Object`.
    pub unsafe fn to_uobject_unchecked(&self) -> &'a UObjectBase {
        match *self {
            FFieldVariant::Object(object) => object,
            FFieldVariant::Field(_) => std::hint::unreachable_unchecked(),
        }
    }

    /// The field, without checking the variant
    ///
    /// # Safety
    ///
    /// The variant must be `Field`.
    pub unsafe fn to_field_unchecked(&self) -> &'a FField {
        match *self {
            FFieldVariant::Field(field) => field,
            FFieldVariant::Object(_) => std::hint::unreachable_unchecked(),
        }
    }

    /// Name of the object or field
    pub fn get_name(&self) -> String {
        match self {
            FFieldVariant::Object(object) => object.get_name(),
            FFieldVariant::Field(field) => field.get_name().to_string(),
        }
    }

    /// Whether the owner is still usable (objects must not be garbage)
    pub fn is_valid(&self) -> bool {
        match self {
            FFieldVariant::Object(object) => !object.is_garbage(),
            FFieldVariant::Field(_) => true,
        }
    }

    /// Owner one level up: an object's outer, or a field's owner
    pub fn get_owner_variant(&self) -> Option<FFieldVariant<'a>> {
        match *self {
            FFieldVariant::Object(object) => object.get_outer().map(FFieldVariant::Object),
            FFieldVariant::Field(field) => Some(field.get_owner()),
        }
    }
}

impl PartialEq for FFieldVariant<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FFieldVariant::Object(a), FFieldVariant::Object(b)) => std::ptr::eq(*a, *b),
            (FFieldVariant::Field(a), FFieldVariant::Field(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl Eq for FFieldVariant<'_> {}

impl Hash for FFieldVariant<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FFieldVariant::Object(object) => std::ptr::hash(*object, state),
            FFieldVariant::Field(field) => std::ptr::hash(*field, state),
        }
    }
}

impl<'a> From<&'a UObjectBase> for FFieldVariant<'a> {
    fn from(object: &'a UObjectBase) -> Self {
        FFieldVariant::Object(object)
    }
}

impl<'a> From<&'a FField> for FFieldVariant<'a> {
    fn from(field: &'a FField) -> Self {
        FFieldVariant::Field(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectInitializer;
    use rustc_hash::FxHashSet;

    #[test]
    fn test_builtin_field_classes() {
        let registry = FieldClassRegistry::with_builtins();
        assert_eq!(registry.len(), BUILTIN_FIELD_CLASSES.len());

        let field = registry.find("Field").unwrap();
        let property = registry.find("Property").unwrap();
        let numeric = registry.find("NumericProperty").unwrap();
        let int = registry.find("IntProperty").unwrap();
        let string = registry.find("StrProperty").unwrap();

        assert_eq!(field.get_id(), 1);
        assert!(field.get_super_class().is_none());
        assert!(int.is_child_of(numeric));
        assert!(int.is_child_of(property));
        assert!(int.is_child_of(field));
        assert!(int.is_child_of(int));
        assert!(!string.is_child_of(numeric));
        assert!(!property.is_child_of(int));
        assert!(registry.find("NoSuchProperty").is_none());
    }

    #[test]
    fn test_register_errors() {
        let registry = FieldClassRegistry::with_builtins();
        assert!(matches!(
            registry.register("IntProperty", Some("NumericProperty"), EClassFlags::empty()),
            Err(ObjectError::DuplicateFieldClass(_))
        ));
        assert!(matches!(
            registry.register("VectorProperty", Some("MissingProperty"), EClassFlags::empty()),
            Err(ObjectError::UnknownFieldClass(_))
        ));
    }

    #[test]
    fn test_cast_bits_run_out_and_fall_back_to_chain_walk() {
        let registry = FieldClassRegistry::new();
        let root = registry.register("Field", None, EClassFlags::empty()).unwrap();
        let mut parent = root;
        for i in 1..70 {
            parent = registry
                .register(&format!("Level{}", i), Some(parent.get_name()), EClassFlags::empty())
                .unwrap();
        }

        let deep = registry.find("Level69").unwrap();
        let unbitted = registry.find("Level65").unwrap();
        let bitted = registry.find("Level10").unwrap();

        assert_eq!(deep.get_id(), 0);
        assert_eq!(unbitted.get_id(), 0);
        assert_eq!(registry.find("Level63").unwrap().get_id(), 1u64 << 63);

        assert!(deep.is_child_of(bitted));
        assert!(deep.is_child_of(unbitted));
        assert!(!unbitted.is_child_of(deep));
        assert!(!bitted.is_child_of(unbitted));
    }

    #[test]
    fn test_field_variant() {
        let registry = FieldClassRegistry::with_builtins();
        let owner = UObjectBase::new(&ObjectInitializer::new("Owner"));
        let array = FField::new(
            registry.find("ArrayProperty").unwrap(),
            FFieldVariant::from(&owner),
            "Items",
            EObjectFlags::empty(),
        );
        let inner = FField::new(
            registry.find("IntProperty").unwrap(),
            FFieldVariant::from(&array),
            "Items_Inner",
            EObjectFlags::empty(),
        );

        let object_variant = array.get_owner();
        assert!(object_variant.is_uobject());
        assert!(object_variant.to_field().is_none());
        assert!(std::ptr::eq(object_variant.to_uobject().unwrap(), &owner));
        assert!(object_variant.is_valid());

        let field_variant = inner.get_owner();
        assert!(!field_variant.is_uobject());
        assert!(field_variant.to_uobject().is_none());
        assert!(std::ptr::eq(unsafe { field_variant.to_field_unchecked() }, &array));
        assert_eq!(field_variant.get_owner_variant(), Some(object_variant));

        assert!(std::ptr::eq(inner.get_owner_uobject(), &owner));
        assert_eq!(inner.get_path_name(), "Owner:Items.Items_Inner");
        assert_eq!(inner.get_full_name(), "IntProperty Owner:Items.Items_Inner");

        let mut set = FxHashSet::default();
        set.insert(object_variant);
        set.insert(field_variant);
        set.insert(array.get_owner());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_field_flags() {
        let registry = FieldClassRegistry::with_builtins();
        let owner = UObjectBase::new(&ObjectInitializer::new("Owner"));
        let field = FField::new(
            registry.find("BoolProperty").unwrap(),
            (&owner).into(),
            "bEnabled",
            EObjectFlags::PUBLIC,
        );
        assert!(field.is_a(registry.find("Property").unwrap()));
        assert!(field.has_any_flags(EObjectFlags::PUBLIC));
        field.set_flags(EObjectFlags::TRANSIENT);
        field.clear_flags(EObjectFlags::PUBLIC);
        assert!(!field.has_any_flags(EObjectFlags::PUBLIC));
        assert!(field.has_any_flags(EObjectFlags::TRANSIENT));
    }
}
