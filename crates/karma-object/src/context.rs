//! Object context
//!
//! [`ObjectContext`] owns everything the object core needs: the pooled
//! allocator, the object table, the class cache, the field class registry and
//! the property storage. All object and descriptor references handed out by
//! the context borrow it, and everything is released together when it is shut
//! down or dropped.
//!
//! The context is confined to the thread that created it. It holds `Cell`,
//! `RefCell` and raw pointer state, so it is neither `Send` nor `Sync`, and
//! every operation completes synchronously.

use crate::config::ObjectConfig;
use crate::error::{ObjectError, SoftAnomaly};
use crate::memory::PooledObjectAllocator;
use crate::object::{EClassFlags, UObject, UObjectArray, UObjectBase, UPackage};
use crate::reflect::{
    ClassDestructorFn, FFieldClass, FProperty, FieldClassRegistry, UClass, UField, UStruct,
};
use rustc_hash::FxHashMap;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::ptr::NonNull;

/// Owner of all object core state
pub struct ObjectContext {
    /// Active configuration
    config: ObjectConfig,

    /// Memory for objects and descriptors
    allocator: RefCell<PooledObjectAllocator>,

    /// Every object constructed by this context
    pub(crate) objects: UObjectArray,

    /// Class descriptors by name
    class_cache: RefCell<FxHashMap<&'static str, NonNull<UClass>>>,

    /// Field classes
    field_classes: FieldClassRegistry,

    /// Property storage
    properties: RefCell<Vec<Box<FProperty>>>,

    /// Recorded soft anomalies, oldest first
    anomalies: RefCell<Vec<SoftAnomaly>>,

    /// Lazily created transient package
    pub(crate) transient_package: Cell<Option<NonNull<UPackage>>>,
}

impl ObjectContext {
    /// Create a context: validate the configuration, set up the arena and
    /// register the core classes
    pub fn new(config: ObjectConfig) -> Result<Self, ObjectError> {
        config.validate()?;

        let mut allocator = PooledObjectAllocator::new();
        if !allocator.initialize(config.arena_element_size, config.arena_element_count) {
            return Err(ObjectError::AllocatorAlreadyInitialized);
        }

        let context = Self {
            config,
            allocator: RefCell::new(allocator),
            objects: UObjectArray::new(),
            class_cache: RefCell::new(FxHashMap::default()),
            field_classes: FieldClassRegistry::with_builtins(),
            properties: RefCell::new(Vec::new()),
            anomalies: RefCell::new(Vec::new()),
            transient_package: Cell::new(None),
        };

        context.static_class::<UObject>()?;
        context.static_class::<UField>()?;
        context.static_class::<UStruct>()?;
        context.static_class::<UClass>()?;
        context.static_class::<UPackage>()?;

        log::info!(
            "Object context initialized: {} byte arena, {} core classes, {} field classes",
            context.config.arena_bytes(),
            context.objects.len(),
            context.field_classes.len()
        );
        Ok(context)
    }

    /// Create a context with the default configuration
    pub fn with_defaults() -> Result<Self, ObjectError> {
        Self::new(ObjectConfig::default())
    }

    /// Active configuration
    pub fn config(&self) -> &ObjectConfig {
        &self.config
    }

    /// The object table
    pub fn get_object_array(&self) -> &UObjectArray {
        &self.objects
    }

    /// Number of objects in the table, descriptors included
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    /// Read access to the allocator, for diagnostics
    pub fn allocator(&self) -> Ref<'_, PooledObjectAllocator> {
        self.allocator.borrow()
    }

    /// Field class registry
    pub fn field_classes(&self) -> &FieldClassRegistry {
        &self.field_classes
    }

    /// Register a custom field class
    pub fn register_field_class(
        &self,
        name: &str,
        super_name: Option<&str>,
        class_flags: EClassFlags,
    ) -> Result<&FFieldClass, ObjectError> {
        self.field_classes.register(name, super_name, class_flags)
    }

    /// Find a registered class descriptor by name
    pub fn find_class(&self, name: &str) -> Option<&UClass> {
        self.find_cached_class(name)
    }

    /// Take every soft anomaly recorded so far
    pub fn take_anomalies(&self) -> Vec<SoftAnomaly> {
        std::mem::take(&mut *self.anomalies.borrow_mut())
    }

    /// Log and record a soft anomaly
    pub(crate) fn report_anomaly(&self, anomaly: SoftAnomaly) {
        log::warn!("{}", anomaly);
        self.anomalies.borrow_mut().push(anomaly);
    }

    /// Allocate zero-filled memory for an object
    ///
    /// Arena overflow is recorded as a soft anomaly; the memory then comes
    /// from the heap.
    pub(crate) fn allocate_object_memory(&self, size: usize, alignment: usize) -> NonNull<u8> {
        let (ptr, overflow) = {
            let mut allocator = self.allocator.borrow_mut();
            let ptr = allocator.allocate_object(size, alignment, true);
            (ptr, allocator.take_overflow_notice())
        };

        if let Some(exceeded_bytes) = overflow {
            self.report_anomaly(SoftAnomaly::ArenaExhausted { exceeded_bytes });
        }

        // SAFETY: the allocator returned at least `size` writable bytes
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        ptr
    }

    pub(crate) fn find_cached_class(&self, name: &str) -> Option<&UClass> {
        // SAFETY: descriptors live until the context is dropped
        self.class_cache
            .borrow()
            .get(name)
            .map(|class| unsafe { &*class.as_ptr() })
    }

    pub(crate) fn cache_class(&self, name: &'static str, class: &UClass) {
        self.class_cache.borrow_mut().insert(name, NonNull::from(class));
    }

    /// Remove `name` from the class cache if it still maps to `class`
    pub(crate) fn uncache_class(&self, name: &str, class: &UClass) {
        let mut cache = self.class_cache.borrow_mut();
        if cache
            .get(name)
            .is_some_and(|cached| std::ptr::eq(cached.as_ptr(), class))
        {
            cache.remove(name);
        }
    }

    pub(crate) fn store_property(&self, property: FProperty) -> &FProperty {
        let property = Box::new(property);
        let ptr: *const FProperty = &*property;
        self.properties.borrow_mut().push(property);
        // SAFETY: boxed properties are never moved or removed while the context lives
        unsafe { &*ptr }
    }

    /// Shut the context down, dropping every object and releasing all memory
    pub fn shut_down(self) {
        log::info!("Shutting down object context with {} objects", self.objects.len());
        drop(self);
    }

    /// Drop every object in reverse registration order
    fn destroy_objects(&mut self) {
        // Destructors are collected before any runs: class descriptors are
        // objects too and are dropped along with everything else
        let doomed: Vec<(NonNull<UObjectBase>, ClassDestructorFn)> = self
            .objects
            .snapshot()
            .into_iter()
            .rev()
            .filter_map(|object| {
                // SAFETY: nothing has been dropped yet
                let class = unsafe { object.as_ref() }.try_get_class()?;
                class.vtable().map(|vtable| (object, vtable.destructor))
            })
            .collect();

        let count = doomed.len();
        for (object, destructor) in doomed {
            // SAFETY: each object is dropped exactly once, with its own type's
            // destructor, and never touched again
            unsafe { destructor(object) };
        }
        log::debug!("Destroyed {} objects", count);
    }
}

impl Drop for ObjectContext {
    fn drop(&mut self) {
        self.destroy_objects();
        self.class_cache.get_mut().clear();
        self.transient_package.set(None);
        // The allocator releases the arena and heap blocks when it drops
    }
}

impl fmt::Debug for ObjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectContext")
            .field("config", &self.config)
            .field("objects", &self.objects.len())
            .field("classes", &self.class_cache.borrow().len())
            .field("field_classes", &self.field_classes.len())
            .field("properties", &self.properties.borrow().len())
            .finish()
    }
}
