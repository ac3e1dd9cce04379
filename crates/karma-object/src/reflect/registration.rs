//! Class registration
//!
//! Reflected Rust types implement [`UObjectType`]. The first call to
//! [`ObjectContext::static_class`] for a type allocates its `UClass`
//! descriptor from the pooled allocator, links it to its parent and to the
//! `Class` metaclass, and caches it by name. Later calls, including reentrant
//! ones made while another descriptor is still being bootstrapped, return the
//! cached descriptor.
//!
//! Bootstrap order for the core types:
//! ```text
//! static_class::<UObject>()
//!   ├─ allocate "Object", cache it
//!   ├─ super: none (root)
//!   └─ metaclass: static_class::<UClass>()
//!        ├─ allocate "Class", cache it
//!        ├─ super: static_class::<UStruct>()
//!        │    └─ super: static_class::<UField>()
//!        │         └─ super: "Object" (cached)
//!        └─ metaclass: "Class" (cached, itself)
//! ```

use super::class::UClass;
use crate::context::ObjectContext;
use crate::error::ObjectError;
use crate::object::{EClassFlags, EInternalObjectFlags, EObjectFlags, ObjectInitializer, UObjectBase};
use std::any::TypeId;
use std::fmt;
use std::ptr::NonNull;

/// A Rust type that participates in the reflected object hierarchy
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` and have a value of `Self::Super` as
/// their first field, so that a pointer to `Self` is a valid pointer to every
/// ancestor down to [`UObjectBase`]. The root type [`UObject`] names itself
/// as its `Super`.
///
/// [`UObject`]: crate::object::UObject
pub unsafe trait UObjectType: Sized + 'static {
    /// Parent type in the hierarchy
    type Super: UObjectType;

    /// Class name, unique per context
    const NAME: &'static str;

    /// Package the class is declared in
    const PACKAGE: &'static str = "/Script/Engine";

    /// Flags applied to the class descriptor
    const CLASS_FLAGS: EClassFlags = EClassFlags::empty();

    /// Build a value from the initializer
    ///
    /// The result is written over zero-filled memory at its final address.
    fn construct(init: &ObjectInitializer<'_>) -> Self;

    /// Called once after construction, before the object is handed out
    fn post_init_properties(&self) {}

    /// View as the identity record
    #[inline]
    fn as_object_base(&self) -> &UObjectBase {
        // SAFETY: guaranteed by the trait's layout contract
        unsafe { &*(self as *const Self).cast::<UObjectBase>() }
    }

    /// Whether this type is the root of the hierarchy
    #[inline]
    fn is_root_type() -> bool {
        Self::NAME == <Self::Super as UObjectType>::NAME
    }
}

/// Generate the `Deref` impl linking a reflected type to its parent
///
/// ```ignore
/// #[repr(C)]
/// pub struct AActor {
///     object: UObject,
///     health: i32,
/// }
///
/// karma_object::impl_object_deref!(AActor => UObject, object);
/// ```
#[macro_export]
macro_rules! impl_object_deref {
    ($ty:ty => $parent:ty, $field:ident) => {
        impl ::std::ops::Deref for $ty {
            type Target = $parent;

            #[inline]
            fn deref(&self) -> &$parent {
                &self.$field
            }
        }
    };
}

/// Writes a constructed value over raw object memory
pub type ClassConstructorFn = unsafe fn(NonNull<u8>, &ObjectInitializer<'_>);

/// Drops an object in place
pub type ClassDestructorFn = unsafe fn(NonNull<UObjectBase>);

/// Runs the type's post-construction hook
pub type PostInitPropertiesFn = unsafe fn(NonNull<UObjectBase>);

/// Per-type entry points stored on a class descriptor
///
/// Instances are always built through the exact constructor of their class,
/// never through a base constructor.
#[derive(Clone, Copy)]
pub struct ClassVTable {
    /// Placement constructor
    pub constructor: ClassConstructorFn,
    /// In-place destructor, run at context shutdown
    pub destructor: ClassDestructorFn,
    /// Post-construction hook
    pub post_init_properties: PostInitPropertiesFn,
    /// Rust type the entry points belong to
    pub type_id: TypeId,
}

impl ClassVTable {
    /// Entry points of `T`
    pub fn of<T: UObjectType>() -> Self {
        Self {
            constructor: construct_in_place::<T>,
            destructor: destroy_in_place::<T>,
            post_init_properties: post_init_in_place::<T>,
            type_id: TypeId::of::<T>(),
        }
    }
}

impl fmt::Debug for ClassVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassVTable")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// Construct a `T` at `ptr`
///
/// # Safety
///
/// `ptr` must be valid for writes of `size_of::<T>()` bytes and aligned for `T`.
pub unsafe fn construct_in_place<T: UObjectType>(ptr: NonNull<u8>, init: &ObjectInitializer<'_>) {
    ptr.cast::<T>().as_ptr().write(T::construct(init));
}

/// Drop the `T` at `ptr`
///
/// # Safety
///
/// `ptr` must point to a live `T` that is not used afterwards.
pub unsafe fn destroy_in_place<T: UObjectType>(ptr: NonNull<UObjectBase>) {
    std::ptr::drop_in_place(ptr.cast::<T>().as_ptr());
}

unsafe fn post_init_in_place<T: UObjectType>(ptr: NonNull<UObjectBase>) {
    (*ptr.cast::<T>().as_ptr()).post_init_properties();
}

/// Layout and entry points of the type a class descriptor describes
#[derive(Debug, Clone, Copy)]
pub struct ClassParams {
    /// Instance size in bytes
    pub properties_size: usize,
    /// Instance alignment in bytes
    pub min_alignment: usize,
    /// Class flags
    pub class_flags: EClassFlags,
    /// Declaring package
    pub package_name: &'static str,
    /// Per-type entry points
    pub vtable: ClassVTable,
}

impl ClassParams {
    /// Parameters of a native Rust type
    pub fn of<T: UObjectType>() -> Self {
        Self {
            properties_size: std::mem::size_of::<T>(),
            min_alignment: std::mem::align_of::<T>(),
            class_flags: T::CLASS_FLAGS | EClassFlags::NATIVE,
            package_name: T::PACKAGE,
            vtable: ClassVTable::of::<T>(),
        }
    }
}

impl ObjectContext {
    /// Class descriptor of `T`
    ///
    /// Returns the same descriptor on every call.
    pub fn static_class<T: UObjectType>(&self) -> Result<&UClass, ObjectError> {
        self.get_private_static_class_body::<T>()
    }

    /// Look up or bootstrap the descriptor of `T`
    ///
    /// The descriptor is cached before its super and metaclass are resolved,
    /// which terminates reentrant bootstrap cycles (`Class` is its own class).
    pub fn get_private_static_class_body<T: UObjectType>(&self) -> Result<&UClass, ObjectError> {
        if let Some(class) = self.find_cached_class(T::NAME) {
            if class.get_type_id() != Some(TypeId::of::<T>()) {
                return Err(ObjectError::DuplicateClassName(T::NAME));
            }
            return Ok(class);
        }

        log::debug!("Registering class '{}' ({})", T::NAME, T::PACKAGE);
        let class = self.allocate_class_descriptor(T::NAME, ClassParams::of::<T>())?;

        if let Err(err) = self.link_class_descriptor::<T>(class) {
            self.abandon_class_descriptor(T::NAME, class);
            return Err(err);
        }

        log::trace!(
            "Class '{}' registered: super = {:?}, size = {}, align = {}",
            T::NAME,
            class.get_super_class().map(|c| c.get_name()),
            class.get_properties_size(),
            class.get_min_alignment()
        );
        Ok(class)
    }

    /// Resolve the super class and metaclass of a freshly cached descriptor
    fn link_class_descriptor<T: UObjectType>(&self, class: &UClass) -> Result<(), ObjectError> {
        let super_class = if T::is_root_type() {
            None
        } else {
            Some(self.static_class::<T::Super>()?)
        };
        class.set_super_class(super_class);

        let metaclass = self.static_class::<UClass>()?;
        class.set_class(metaclass);
        class.set_class_flags(EClassFlags::CONSTRUCTED);
        Ok(())
    }

    /// Drop a descriptor whose linking failed from the cache
    ///
    /// The record stays in the object table, marked as garbage and detached
    /// from any super class, so lookups skip it and the next registration
    /// starts over. It still gets its metaclass when one exists so that
    /// shutdown drops it with everything else.
    fn abandon_class_descriptor(&self, name: &'static str, class: &UClass) {
        log::warn!("Registration of class '{}' failed; discarding descriptor", name);
        self.uncache_class(name, class);
        class.set_super_class(None);
        if let Some(metaclass) = self.find_cached_class(UClass::NAME) {
            class.set_class(metaclass);
        }
        class.mark_as_garbage();
    }

    /// Allocate, construct, register and cache a class descriptor
    fn allocate_class_descriptor(
        &self,
        name: &'static str,
        params: ClassParams,
    ) -> Result<&UClass, ObjectError> {
        let ptr = self.allocate_object_memory(
            std::mem::size_of::<UClass>(),
            std::mem::align_of::<UClass>(),
        );

        let init = ObjectInitializer::new(name)
            .with_flags(EObjectFlags::PUBLIC | EObjectFlags::STANDALONE)
            .with_internal_flags(EInternalObjectFlags::NATIVE | EInternalObjectFlags::ROOT_SET)
            .with_class_params(params);

        // SAFETY: ptr is fresh, zero-filled memory sized and aligned for UClass
        let class = unsafe {
            construct_in_place::<UClass>(ptr, &init);
            let class = ptr.cast::<UClass>();
            self.objects.allocate_index(class.cast::<UObjectBase>());
            &*class.as_ptr()
        };

        self.cache_class(name, class);
        Ok(class)
    }
}
