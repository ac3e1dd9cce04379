//! Integration tests for the object core
//!
//! Tests cover:
//! - Descriptor singletons and reentrant bootstrap
//! - Failed registrations leaving no cached descriptor behind
//! - Ancestor chains and is_child_of
//! - Allocator alignment and arena exhaustion
//! - Find-before-create on new_object
//! - Downcasts only of registered objects
//! - Flag round trips through construction
//! - Object destruction at shutdown

use karma_object::prelude::*;
use karma_object::{
    ObjectConfig, PooledObjectAllocator, SoftAnomaly, StaticConstructObjectParameters,
    MIN_OBJECT_ALIGNMENT,
};
use std::sync::atomic::{AtomicUsize, Ordering};

#[repr(C)]
struct Base {
    object: UObject,
    value: u64,
}

karma_object::impl_object_deref!(Base => UObject, object);

unsafe impl UObjectType for Base {
    type Super = UObject;
    const NAME: &'static str = "Base";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self {
            object: UObject::new(init),
            value: 1,
        }
    }
}

#[repr(C)]
struct Derived {
    base: Base,
    extra: [u64; 3],
}

karma_object::impl_object_deref!(Derived => Base, base);

unsafe impl UObjectType for Derived {
    type Super = Base;
    const NAME: &'static str = "Derived";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self {
            base: Base::construct(init),
            extra: [2, 3, 4],
        }
    }
}

#[repr(C)]
struct MostDerived {
    derived: Derived,
}

karma_object::impl_object_deref!(MostDerived => Derived, derived);

unsafe impl UObjectType for MostDerived {
    type Super = Derived;
    const NAME: &'static str = "MostDerived";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self {
            derived: Derived::construct(init),
        }
    }
}

/// A different type that claims the name "Base"
#[repr(C)]
struct Impostor {
    object: UObject,
}

karma_object::impl_object_deref!(Impostor => UObject, object);

unsafe impl UObjectType for Impostor {
    type Super = UObject;
    const NAME: &'static str = "Base";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self {
            object: UObject::new(init),
        }
    }
}

/// Derives from a type whose name is already taken
#[repr(C)]
struct Stray {
    parent: Impostor,
}

karma_object::impl_object_deref!(Stray => Impostor, parent);

unsafe impl UObjectType for Stray {
    type Super = Impostor;
    const NAME: &'static str = "Stray";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self {
            parent: Impostor::construct(init),
        }
    }
}

static BARE_DOWNCASTS: AtomicUsize = AtomicUsize::new(0);

/// Builds a second identity record by value while being constructed
#[repr(C)]
struct Mirror {
    object: UObject,
    payload: [u64; 4],
}

karma_object::impl_object_deref!(Mirror => UObject, object);

unsafe impl UObjectType for Mirror {
    type Super = UObject;
    const NAME: &'static str = "Mirror";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        let bare = UObjectBase::new(init);
        if bare.cast::<Mirror>().is_some() {
            BARE_DOWNCASTS.fetch_add(1, Ordering::SeqCst);
        }
        Self {
            object: UObject::new(init),
            payload: [7; 4],
        }
    }
}

static TRACKED_DROPS: AtomicUsize = AtomicUsize::new(0);

#[repr(C)]
struct Tracked {
    object: UObject,
    payload: Vec<u32>,
}

karma_object::impl_object_deref!(Tracked => UObject, object);

unsafe impl UObjectType for Tracked {
    type Super = UObject;
    const NAME: &'static str = "Tracked";

    fn construct(init: &ObjectInitializer<'_>) -> Self {
        Self {
            object: UObject::new(init),
            payload: vec![1, 2, 3],
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        assert_eq!(self.payload, vec![1, 2, 3]);
        TRACKED_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

fn element_size_for<T>() -> usize {
    std::mem::size_of::<T>().next_multiple_of(16)
}

// ============================================================================
// Descriptors
// ============================================================================

#[test]
fn test_static_class_is_singleton() {
    let ctx = ObjectContext::with_defaults().unwrap();

    // Deriving first bootstraps Base reentrantly
    let derived = ctx.static_class::<Derived>().unwrap();
    let base = ctx.static_class::<Base>().unwrap();

    assert!(std::ptr::eq(derived, ctx.static_class::<Derived>().unwrap()));
    assert!(std::ptr::eq(base, derived.get_super_class().unwrap()));
    assert!(std::ptr::eq(
        ctx.static_class::<UClass>().unwrap(),
        ctx.static_class::<UClass>().unwrap()
    ));
    assert_eq!(base.get_name(), "Base");
    assert_eq!(base.get_package_name(), "/Script/Engine");
}

#[test]
fn test_ancestor_chain_terminates_at_object() {
    let ctx = ObjectContext::with_defaults().unwrap();
    let object = ctx.static_class::<UObject>().unwrap();

    for class in [
        ctx.static_class::<MostDerived>().unwrap(),
        ctx.static_class::<UClass>().unwrap(),
        ctx.static_class::<UPackage>().unwrap(),
        object,
    ] {
        let root = class.super_chain().last().unwrap();
        assert!(std::ptr::eq(root, object));
        assert!(root.get_super_class().is_none());
    }

    let names: Vec<String> = ctx
        .static_class::<UClass>()
        .unwrap()
        .super_chain()
        .map(|class| class.get_name())
        .collect();
    assert_eq!(names, vec!["Class", "Struct", "Field", "Object"]);
}

#[test]
fn test_is_child_of_reflexive_and_transitive() {
    let ctx = ObjectContext::with_defaults().unwrap();
    let base = ctx.static_class::<Base>().unwrap();
    let derived = ctx.static_class::<Derived>().unwrap();
    let most = ctx.static_class::<MostDerived>().unwrap();
    let object = ctx.static_class::<UObject>().unwrap();

    for class in [base, derived, most, object] {
        assert!(class.is_child_of(class));
    }
    assert!(most.is_child_of(derived));
    assert!(derived.is_child_of(base));
    assert!(most.is_child_of(base));
    assert!(most.is_child_of(object));
    assert!(!base.is_child_of(derived));
    assert!(!object.is_child_of(base));
}

#[test]
fn test_duplicate_class_name_is_rejected() {
    let ctx = ObjectContext::with_defaults().unwrap();
    ctx.static_class::<Base>().unwrap();

    assert!(matches!(
        ctx.static_class::<Impostor>(),
        Err(ObjectError::DuplicateClassName("Base"))
    ));
}

#[test]
fn test_failed_registration_is_not_cached() {
    let ctx = ObjectContext::with_defaults().unwrap();
    ctx.static_class::<Base>().unwrap();

    for _ in 0..2 {
        assert!(matches!(
            ctx.static_class::<Stray>(),
            Err(ObjectError::DuplicateClassName("Base"))
        ));
    }
    assert!(ctx.find_class("Stray").is_none());

    let class_class = ctx.static_class::<UClass>().unwrap();
    let object_class = ctx.static_class::<UObject>().unwrap();
    let mut abandoned = 0;
    for descriptor in ctx.get_objects_of_class(class_class, false) {
        let class = descriptor.cast::<UClass>().unwrap();
        if class.is_garbage() {
            assert!(class.has_name("Stray"));
            assert!(class.get_super_class().is_none());
            abandoned += 1;
        } else {
            assert!(class.is_child_of(object_class));
        }
    }
    assert_eq!(abandoned, 2);
}

#[test]
fn test_every_descriptor_is_a_class_instance() {
    let ctx = ObjectContext::with_defaults().unwrap();
    let class_class = ctx.static_class::<UClass>().unwrap();
    ctx.static_class::<MostDerived>().unwrap();

    let descriptors = ctx.get_objects_of_class(class_class, false);
    assert_eq!(descriptors.len(), 8);
    for descriptor in descriptors {
        assert!(descriptor.is_a::<UClass>());
        assert!(descriptor.is_a::<UStruct>());
        assert!(std::ptr::eq(descriptor.get_class(), class_class));
    }
}

// ============================================================================
// Allocator
// ============================================================================

#[test]
fn test_allocation_alignment() {
    let mut pool = PooledObjectAllocator::new();
    pool.initialize(64, 64);

    for alignment in [1, 2, 4, 8, 16, 32, 64, 128, 256] {
        for allow_permanent in [true, false] {
            let ptr = pool.allocate_object(24, alignment, allow_permanent);
            let expected = alignment.max(MIN_OBJECT_ALIGNMENT);
            assert_eq!(ptr.as_ptr() as usize % expected, 0, "alignment {}", alignment);
        }
    }
}

#[test]
fn test_arena_exhaustion_falls_back_to_heap() {
    let mut pool = PooledObjectAllocator::new();
    pool.initialize(48, 3);

    let mut blocks = Vec::new();
    for _ in 0..3 {
        blocks.push(pool.allocate_object(48, 16, true));
    }
    let used = pool.arena_used();
    assert_eq!(used, 144);

    let overflow = pool.allocate_object(48, 16, true);
    assert!(!pool.contains(overflow.as_ptr()));
    assert_eq!(overflow.as_ptr() as usize % 16, 0);
    assert_eq!(pool.arena_used(), used);
    assert_eq!(pool.arena_allocation_count(), 3);
    assert_eq!(pool.heap_fallback_count(), 1);

    // Heap memory is usable
    unsafe {
        overflow.as_ptr().write_bytes(0xAB, 48);
        assert_eq!(*overflow.as_ptr().add(47), 0xAB);
    }
    for block in blocks {
        assert!(pool.contains(block.as_ptr()));
    }
}

#[test]
fn test_context_records_arena_exhaustion() {
    let config = ObjectConfig {
        arena_element_size: 16,
        arena_element_count: 1,
        ..ObjectConfig::default()
    };
    let ctx = ObjectContext::new(config).unwrap();
    ctx.take_anomalies();

    let object = ctx
        .new_object::<Base>(None, None, "Spilled", EObjectFlags::empty())
        .unwrap();
    assert_eq!(object.value, 1);
    assert!(ctx
        .take_anomalies()
        .iter()
        .any(|anomaly| matches!(anomaly, SoftAnomaly::ArenaExhausted { .. })));
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_new_object_is_idempotent_per_outer_and_name() {
    let ctx = ObjectContext::with_defaults().unwrap();
    let package = ctx.get_transient_package().unwrap();
    let outer = Some(package.as_object_base());

    let first = ctx.new_object::<Base>(outer, None, "X", EObjectFlags::empty()).unwrap();
    let second = ctx.new_object::<Base>(outer, None, "X", EObjectFlags::empty()).unwrap();
    assert!(std::ptr::eq(first, second));

    let other_name = ctx.new_object::<Base>(outer, None, "Y", EObjectFlags::empty()).unwrap();
    assert!(!std::ptr::eq(first, other_name));

    // Root-level objects cannot be found, so each call creates a new one
    let loose_a = ctx.new_object::<Base>(None, None, "X", EObjectFlags::empty()).unwrap();
    let loose_b = ctx.new_object::<Base>(None, None, "X", EObjectFlags::empty()).unwrap();
    assert!(!std::ptr::eq(loose_a, loose_b));
}

#[test]
fn test_flag_round_trip() {
    let ctx = ObjectContext::with_defaults().unwrap();
    let requested = EObjectFlags::PUBLIC | EObjectFlags::STANDALONE | EObjectFlags::TRANSIENT;
    let object = ctx.new_object::<Base>(None, None, "Flagged", requested).unwrap();

    assert!(object.has_all_flags(requested));
    assert!(object.has_any_flags(requested));
    assert!(object.has_any_flags(EObjectFlags::PUBLIC | EObjectFlags::ARCHETYPE_OBJECT));
    assert!(!object.has_any_flags(EObjectFlags::ARCHETYPE_OBJECT | EObjectFlags::WAS_LOADED));
    assert!(!object.has_all_flags(requested | EObjectFlags::WAS_LOADED));
    assert!(!object.has_any_flags(EObjectFlags::empty()));
    assert!(!object.has_any_internal_flags(EInternalObjectFlags::empty()));
    assert!(!object.has_any_flags(EObjectFlags::NEED_INITIALIZATION));
}

#[test]
fn test_base_derived_scenario() {
    let config = ObjectConfig {
        arena_element_size: element_size_for::<Derived>(),
        arena_element_count: 2,
        ..ObjectConfig::default()
    };
    let ctx = ObjectContext::new(config).unwrap();

    let derived_class = ctx.static_class::<Derived>().unwrap();
    let base_class = derived_class.get_super_class().unwrap();
    assert_eq!(base_class.get_name(), "Base");
    assert_eq!(derived_class.get_properties_size(), std::mem::size_of::<Derived>());
    assert_eq!(derived_class.get_min_alignment(), 8);
    assert_eq!(base_class.get_properties_size(), std::mem::size_of::<Base>());

    let package = ctx.get_transient_package().unwrap();
    let outer = Some(package.as_object_base());
    let before = ctx.num_objects();

    let a = ctx
        .new_object::<Derived>(outer, Some(derived_class), "A", EObjectFlags::empty())
        .unwrap();
    let again = ctx
        .new_object::<Derived>(outer, Some(derived_class), "A", EObjectFlags::empty())
        .unwrap();

    assert!(std::ptr::eq(a, again));
    assert_eq!(ctx.num_objects(), before + 1);
    assert_eq!(a.extra, [2, 3, 4]);
    assert_eq!(a.value, 1);
    assert!(a.is_a::<Base>());
    assert_eq!(a.get_path_name(), "/Engine/Transient.A");
    assert_eq!(a.get_full_name(), "Derived /Engine/Transient.A");
}

#[test]
fn test_construct_with_subclass() {
    let ctx = ObjectContext::with_defaults().unwrap();
    let most = ctx.static_class::<MostDerived>().unwrap();

    let object = ctx
        .new_object::<Base>(None, Some(most), "Wide", EObjectFlags::empty())
        .unwrap();
    assert!(std::ptr::eq(object.get_class(), most));
    assert!(object.cast::<MostDerived>().is_some());
    assert!(object.cast::<Derived>().is_some());

    let params = StaticConstructObjectParameters::new(most).name("Params");
    let raw = ctx.static_construct_object_internal(&params).unwrap();
    assert_eq!(raw.cast::<Derived>().unwrap().extra, [2, 3, 4]);
}

#[test]
fn test_bare_record_built_in_constructor_does_not_downcast() {
    let ctx = ObjectContext::with_defaults().unwrap();
    let package = ctx.get_transient_package().unwrap();

    let mirror = ctx
        .new_object::<Mirror>(Some(package.as_object_base()), None, "Mirror0", EObjectFlags::empty())
        .unwrap();
    assert_eq!(BARE_DOWNCASTS.load(Ordering::SeqCst), 0);
    assert_eq!(mirror.payload, [7; 4]);
    assert!(mirror.as_object_base().cast::<Mirror>().is_some());
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_shutdown_drops_objects() {
    TRACKED_DROPS.store(0, Ordering::SeqCst);
    let ctx = ObjectContext::with_defaults().unwrap();
    let package = ctx.get_transient_package().unwrap();

    for name in ["One", "Two", "Three"] {
        ctx.new_object::<Tracked>(Some(package.as_object_base()), None, name, EObjectFlags::empty())
            .unwrap();
    }
    // Reused, not constructed again
    ctx.new_object::<Tracked>(Some(package.as_object_base()), None, "One", EObjectFlags::empty())
        .unwrap();
    assert_eq!(TRACKED_DROPS.load(Ordering::SeqCst), 0);

    ctx.shut_down();
    assert_eq!(TRACKED_DROPS.load(Ordering::SeqCst), 3);
}
