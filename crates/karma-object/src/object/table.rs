//! Global object table
//!
//! Append-only list of every object constructed by a context. An object's
//! slot is written into its `internal_index` at registration and never
//! changes: entries are never removed or compacted.

use super::base::UObjectBase;
use std::cell::RefCell;
use std::ptr::NonNull;

/// Append-only table of live objects
#[derive(Debug, Default)]
pub struct UObjectArray {
    /// Objects indexed by internal index
    objects: RefCell<Vec<NonNull<UObjectBase>>>,
}

impl UObjectArray {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object and assign its internal index
    ///
    /// # Safety
    ///
    /// `object` must point to a fully constructed object that stays at this
    /// address for as long as the table is alive.
    pub unsafe fn allocate_index(&self, object: NonNull<UObjectBase>) -> i32 {
        let mut objects = self.objects.borrow_mut();
        let index = objects.len() as i32;
        objects.push(object);
        object.as_ref().set_internal_index(index);
        index
    }

    /// Get the object stored at `index`
    pub fn index_to_object(&self, index: i32) -> Option<NonNull<UObjectBase>> {
        if index < 0 {
            return None;
        }
        self.objects.borrow().get(index as usize).copied()
    }

    /// Whether `object` is registered in this table
    pub fn is_valid(&self, object: &UObjectBase) -> bool {
        self.index_to_object(object.get_internal_index())
            .is_some_and(|slot| std::ptr::eq(slot.as_ptr(), object))
    }

    /// Number of registered objects
    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over registered objects in registration order
    ///
    /// Objects appended while iterating are visited as well.
    pub fn iter(&self) -> ObjectIterator<'_> {
        ObjectIterator {
            table: self,
            next: 0,
        }
    }

    /// Snapshot of all registered objects
    pub fn snapshot(&self) -> Vec<NonNull<UObjectBase>> {
        self.objects.borrow().clone()
    }
}

/// Index-based iterator over a [`UObjectArray`]
///
/// Holds no borrow of the table between steps, so objects may be created
/// while iterating.
pub struct ObjectIterator<'a> {
    table: &'a UObjectArray,
    next: usize,
}

impl Iterator for ObjectIterator<'_> {
    type Item = NonNull<UObjectBase>;

    fn next(&mut self) -> Option<Self::Item> {
        let object = self.table.objects.borrow().get(self.next).copied()?;
        self.next += 1;
        Some(object)
    }
}
