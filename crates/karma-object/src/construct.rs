//! Construction and lookup
//!
//! Objects are created through [`ObjectContext::new_object`] (or the lower
//! level `static_*` entry points) and found again by name within an outer.
//! Creating an object whose name, outer and class match an existing one
//! returns the existing object instead of allocating a new one.

use crate::config::DuplicateResolution;
use crate::context::ObjectContext;
use crate::error::{ObjectError, SoftAnomaly};
use crate::object::{
    EClassFlags, EInternalObjectFlags, EObjectFlags, ObjectInitializer, UObjectBase, UPackage,
    NO_NAME, TRANSIENT_PACKAGE_NAME,
};
use crate::reflect::{UClass, UObjectType};
use std::ptr::NonNull;

/// Smallest alignment used for object instances before the allocator's own minimum
const MIN_INSTANCE_ALIGNMENT: usize = 4;

/// Result of [`ObjectContext::static_allocate_object`]
#[derive(Debug, Clone, Copy)]
pub struct AllocatedObject<'a> {
    /// The object
    pub object: &'a UObjectBase,
    /// Whether an existing object was returned instead of a new one
    pub reused: bool,
}

/// Arguments to [`ObjectContext::static_construct_object_internal`]
#[derive(Debug, Clone)]
pub struct StaticConstructObjectParameters<'a> {
    /// Class to instantiate
    pub class: &'a UClass,
    /// Outer of the new object
    pub outer: Option<&'a UObjectBase>,
    /// Object name (empty gives "NoName")
    pub name: String,
    /// Object flags
    pub set_flags: EObjectFlags,
    /// Internal flags
    pub internal_set_flags: EInternalObjectFlags,
}

impl<'a> StaticConstructObjectParameters<'a> {
    /// Parameters for an unnamed root-level object of `class`
    pub fn new(class: &'a UClass) -> Self {
        Self {
            class,
            outer: None,
            name: String::new(),
            set_flags: EObjectFlags::empty(),
            internal_set_flags: EInternalObjectFlags::empty(),
        }
    }

    /// Set the outer
    pub fn outer(mut self, outer: Option<&'a UObjectBase>) -> Self {
        self.outer = outer;
        self
    }

    /// Set the name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the object flags
    pub fn flags(mut self, flags: EObjectFlags) -> Self {
        self.set_flags = flags;
        self
    }

    /// Set the internal flags
    pub fn internal_flags(mut self, flags: EInternalObjectFlags) -> Self {
        self.internal_set_flags = flags;
        self
    }
}

impl ObjectContext {
    /// Find an object by name directly inside `outer`
    ///
    /// Returns `None` without an outer: only scoped lookups are supported.
    /// A candidate matches when its name is `name`, its outer is exactly
    /// `outer`, it has none of the excluded flags, and its class passes the
    /// filter (identical with `exact_class`, derived otherwise). Several
    /// matches are reported as [`SoftAnomaly::AmbiguousName`] and resolved by
    /// the configured [`DuplicateResolution`].
    pub fn static_find_object_fast_internal(
        &self,
        class: Option<&UClass>,
        outer: Option<&UObjectBase>,
        name: &str,
        exact_class: bool,
        exclude_flags: EObjectFlags,
        exclude_internal_flags: EInternalObjectFlags,
    ) -> Option<&UObjectBase> {
        let outer = outer?;

        let mut matches = self.objects.iter().filter_map(|ptr| {
            // SAFETY: table entries are live objects of this context
            let object: &UObjectBase = unsafe { &*ptr.as_ptr() };
            let outer_matches = object
                .get_outer()
                .is_some_and(|candidate| std::ptr::eq(candidate, outer));
            if !outer_matches
                || !object.has_name(name)
                || object.has_any_flags(exclude_flags)
                || object.has_any_internal_flags(exclude_internal_flags)
            {
                return None;
            }

            let class_matches = match (class, object.try_get_class()) {
                (None, _) => true,
                (Some(filter), Some(actual)) if exact_class => std::ptr::eq(filter, actual),
                (Some(filter), Some(actual)) => actual.is_child_of(filter),
                (Some(_), None) => false,
            };
            class_matches.then_some(object)
        });

        let first = matches.next()?;
        let mut count = 1;
        let mut last = first;
        for object in matches {
            count += 1;
            last = object;
        }

        if count > 1 {
            self.report_anomaly(SoftAnomaly::AmbiguousName {
                name: name.to_string(),
                matches: count,
            });
            return Some(match self.config().duplicate_resolution {
                DuplicateResolution::FirstFound => first,
                DuplicateResolution::MostRecent => last,
            });
        }
        Some(first)
    }

    /// Find an existing object or allocate and construct a new one
    ///
    /// The new object is built with its class's own constructor over
    /// zero-filled memory and registered in the object table. It keeps
    /// `NEED_INITIALIZATION` until post-initialization runs.
    pub fn static_allocate_object<'a>(
        &'a self,
        class: &'a UClass,
        outer: Option<&'a UObjectBase>,
        name: &str,
        flags: EObjectFlags,
        internal_flags: EInternalObjectFlags,
    ) -> Result<AllocatedObject<'a>, ObjectError> {
        if let Some(outer) = outer {
            if !self.objects.is_valid(outer) {
                return Err(ObjectError::InvalidOuter {
                    name: name.to_string(),
                });
            }
        }
        if !self.objects.is_valid(class) {
            return Err(ObjectError::ForeignClass(class.get_name()));
        }
        if class.has_any_class_flags(EClassFlags::ABSTRACT)
            && !flags.contains(EObjectFlags::CLASS_DEFAULT_OBJECT)
        {
            return Err(ObjectError::AbstractClass(class.get_name()));
        }

        let name = if name.is_empty() {
            self.report_anomaly(SoftAnomaly::EmptyName {
                class: class.get_name(),
            });
            NO_NAME
        } else {
            name
        };

        if let Some(existing) = self.static_find_object_fast_internal(
            Some(class),
            outer,
            name,
            true,
            EObjectFlags::empty(),
            EInternalObjectFlags::empty(),
        ) {
            log::debug!("Reusing existing object '{}'", existing.get_path_name());
            return Ok(AllocatedObject {
                object: existing,
                reused: true,
            });
        }

        let size = class.get_properties_size();
        let vtable = match class.vtable() {
            Some(vtable) if size > 0 => *vtable,
            _ => return Err(ObjectError::ZeroInstanceSize(class.get_name())),
        };
        let alignment = class.get_min_alignment().max(MIN_INSTANCE_ALIGNMENT);

        let memory = self.allocate_object_memory(size, alignment);

        let init = ObjectInitializer::new(name)
            .with_outer(outer)
            .with_class(class)
            .with_flags(flags | EObjectFlags::NEED_INITIALIZATION)
            .with_internal_flags(internal_flags);

        // SAFETY: memory is zero-filled, sized and aligned for the class's
        // type, and the vtable belongs to that type
        let object = unsafe {
            (vtable.constructor)(memory, &init);
            let object = memory.cast::<UObjectBase>();
            self.objects.allocate_index(object);
            &*object.as_ptr()
        };

        log::debug!(
            "Constructed {} (index {})",
            object.get_full_name(),
            object.get_internal_index()
        );
        Ok(AllocatedObject {
            object,
            reused: false,
        })
    }

    /// Allocate an object and run its post-initialization
    pub fn static_construct_object_internal<'a>(
        &'a self,
        params: &StaticConstructObjectParameters<'a>,
    ) -> Result<&'a UObjectBase, ObjectError> {
        let allocated = self.static_allocate_object(
            params.class,
            params.outer,
            &params.name,
            params.set_flags,
            params.internal_set_flags,
        )?;

        let object = allocated.object;
        if !allocated.reused {
            if let Some(vtable) = object.get_class().vtable() {
                // SAFETY: the object was just built by this class's constructor
                unsafe { (vtable.post_init_properties)(NonNull::from(object)) };
            }
            object.clear_flags(EObjectFlags::NEED_INITIALIZATION);
        }
        Ok(object)
    }

    /// Create or find an object of type `T`
    ///
    /// `class` defaults to `T`'s class and must otherwise derive from it.
    pub fn new_object<'a, T: UObjectType>(
        &'a self,
        outer: Option<&'a UObjectBase>,
        class: Option<&'a UClass>,
        name: &str,
        flags: EObjectFlags,
    ) -> Result<&'a T, ObjectError> {
        let expected = self.static_class::<T>()?;
        let class = class.unwrap_or(expected);
        if !class.is_child_of(expected) {
            return Err(ObjectError::ClassMismatch {
                class: class.get_name(),
                expected: expected.get_name(),
            });
        }

        let params = StaticConstructObjectParameters::new(class)
            .outer(outer)
            .name(name)
            .flags(flags);
        let object = self.static_construct_object_internal(&params)?;
        self.cast_checked::<T>(object)
    }

    /// Find an object of type `T` named `name` directly inside `outer`
    pub fn find_object<'a, T: UObjectType>(
        &'a self,
        outer: Option<&'a UObjectBase>,
        name: &str,
    ) -> Option<&'a T> {
        let class = self.static_class::<T>().ok()?;
        self.static_find_object_fast_internal(
            Some(class),
            outer,
            name,
            false,
            EObjectFlags::empty(),
            EInternalObjectFlags::empty(),
        )
        .and_then(|object| object.cast::<T>())
    }

    /// Downcast, failing with [`ObjectError::ClassMismatch`]
    pub fn cast_checked<'a, T: UObjectType>(
        &self,
        object: &'a UObjectBase,
    ) -> Result<&'a T, ObjectError> {
        object.cast::<T>().ok_or_else(|| ObjectError::ClassMismatch {
            class: object.get_class().get_name(),
            expected: T::NAME.to_string(),
        })
    }

    /// Every object whose class is `class` (or derives from it)
    pub fn get_objects_of_class(&self, class: &UClass, include_derived: bool) -> Vec<&UObjectBase> {
        self.objects
            .iter()
            // SAFETY: table entries are live objects of this context
            .map(|ptr| unsafe { &*ptr.as_ptr() })
            .filter(|object| match object.try_get_class() {
                Some(actual) if include_derived => actual.is_child_of(class),
                Some(actual) => std::ptr::eq(actual, class),
                None => false,
            })
            .collect()
    }

    /// Visit every object whose outer is exactly `outer`
    pub fn for_each_object_with_outer<'a, F>(&'a self, outer: &UObjectBase, mut f: F)
    where
        F: FnMut(&'a UObjectBase),
    {
        for ptr in self.objects.iter() {
            // SAFETY: table entries are live objects of this context
            let object: &'a UObjectBase = unsafe { &*ptr.as_ptr() };
            if object
                .get_outer()
                .is_some_and(|candidate| std::ptr::eq(candidate, outer))
            {
                f(object);
            }
        }
    }

    /// The transient package, created on first use
    pub fn get_transient_package(&self) -> Result<&UPackage, ObjectError> {
        if let Some(package) = self.transient_package.get() {
            // SAFETY: the package is an object of this context
            return Ok(unsafe { &*package.as_ptr() });
        }

        let package = self.new_object::<UPackage>(
            None,
            None,
            TRANSIENT_PACKAGE_NAME,
            EObjectFlags::PUBLIC | EObjectFlags::TRANSIENT,
        )?;
        package.add_to_root();
        self.transient_package.set(Some(NonNull::from(package)));
        Ok(package)
    }

    /// The class default object of `class`, created on first use
    ///
    /// Named `Default__<Class>`, scoped to the class itself and flagged
    /// `CLASS_DEFAULT_OBJECT`. Abstract classes have one too.
    pub fn get_default_object<'a>(&'a self, class: &'a UClass) -> Result<&'a UObjectBase, ObjectError> {
        if let Some(object) = class.get_default_object_if_present() {
            return Ok(object);
        }

        let params = StaticConstructObjectParameters::new(class)
            .outer(Some(class.as_object_base()))
            .name(format!("Default__{}", class.get_name()))
            .flags(EObjectFlags::CLASS_DEFAULT_OBJECT | EObjectFlags::PUBLIC);
        let object = self.static_construct_object_internal(&params)?;
        class.set_default_object(object);
        Ok(object)
    }
}
