//! Properties
//!
//! An [`FProperty`] describes one member of a reflected type by byte offset
//! and element size. Values are read and written through the offset, so a
//! property registered for `AActor::health` with
//! `offset_of!(AActor, health)` addresses that field on every `AActor`
//! instance and on every instance of a subclass.

use super::field::{FField, FFieldClass, FFieldVariant};
use crate::context::ObjectContext;
use crate::error::ObjectError;
use crate::object::{EObjectFlags, EPropertyFlags, UObjectBase};
use crate::reflect::UStruct;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;

mod sealed {
    pub trait Sealed {}
}

/// Plain value types that can be copied in and out of property memory
pub trait PlainValue: Copy + sealed::Sealed + 'static {}

macro_rules! impl_plain_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl PlainValue for $ty {}
        )*
    };
}

impl_plain_value!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Description of a property to add to a struct
#[derive(Debug, Clone)]
pub struct PropertyParams {
    field_class: String,
    name: String,
    offset: usize,
    element_size: usize,
    array_dim: usize,
    flags: EPropertyFlags,
}

impl PropertyParams {
    /// A single-element property of `field_class` at `offset`
    pub fn new(
        field_class: impl Into<String>,
        name: impl Into<String>,
        offset: usize,
        element_size: usize,
    ) -> Self {
        Self {
            field_class: field_class.into(),
            name: name.into(),
            offset,
            element_size,
            array_dim: 1,
            flags: EPropertyFlags::empty(),
        }
    }

    /// Make the property a fixed-size array of `array_dim` elements
    pub fn with_array_dim(mut self, array_dim: usize) -> Self {
        self.array_dim = array_dim.max(1);
        self
    }

    /// Set the property flags
    pub fn with_flags(mut self, flags: EPropertyFlags) -> Self {
        self.flags = flags;
        self
    }

    fn total_size(&self) -> usize {
        self.element_size.saturating_mul(self.array_dim)
    }
}

/// Reflected data member
#[repr(C)]
pub struct FProperty {
    field: FField,
    offset_internal: usize,
    element_size: usize,
    array_dim: usize,
    property_flags: Cell<EPropertyFlags>,
    inner_properties: RefCell<Vec<NonNull<FProperty>>>,
}

impl FProperty {
    fn new(class: &FFieldClass, owner: FFieldVariant<'_>, params: &PropertyParams) -> Self {
        Self {
            field: FField::new(class, owner, params.name.clone(), EObjectFlags::PUBLIC),
            offset_internal: params.offset,
            element_size: params.element_size,
            array_dim: params.array_dim,
            property_flags: Cell::new(params.flags),
            inner_properties: RefCell::new(Vec::new()),
        }
    }

    /// Byte offset inside the owning type
    pub fn get_offset_for_internal(&self) -> usize {
        self.offset_internal
    }

    /// Size of one element
    pub fn get_element_size(&self) -> usize {
        self.element_size
    }

    /// Number of elements (1 unless the property is a fixed array)
    pub fn get_array_dim(&self) -> usize {
        self.array_dim
    }

    /// Total byte size
    pub fn get_size(&self) -> usize {
        self.element_size * self.array_dim
    }

    /// Property flags
    pub fn get_property_flags(&self) -> EPropertyFlags {
        self.property_flags.get()
    }

    /// Whether any of `flags` is set
    pub fn has_any_property_flags(&self, flags: EPropertyFlags) -> bool {
        self.property_flags.get().intersects(flags)
    }

    /// Whether all of `flags` are set
    pub fn has_all_property_flags(&self, flags: EPropertyFlags) -> bool {
        self.property_flags.get().contains(flags)
    }

    /// Add property flags
    pub fn set_property_flags(&self, flags: EPropertyFlags) {
        self.property_flags.set(self.property_flags.get() | flags);
    }

    /// Properties owned by this one (e.g. the element type of a container)
    pub fn get_inner_properties(&self) -> Vec<&FProperty> {
        self.inner_properties
            .borrow()
            .iter()
            // SAFETY: properties are owned by the context
            .map(|ptr| unsafe { &*ptr.as_ptr() })
            .collect()
    }

    /// Check that `container` is an instance of this property's owner struct
    ///
    /// Inner properties are owned by another property and never address an
    /// object directly.
    fn check_container(&self, container: &UObjectBase) -> Result<(), ObjectError> {
        let class = container.get_class();
        let owner = self
            .get_owner()
            .to_uobject()
            .and_then(|owner| owner.cast::<UStruct>());
        match owner {
            Some(owner) if class.is_child_of(owner) => Ok(()),
            _ => Err(ObjectError::PropertyOwnerMismatch {
                property: self.get_name().to_string(),
                class: class.get_name(),
            }),
        }
    }

    fn check_value_size<V: PlainValue>(&self) -> Result<(), ObjectError> {
        let actual = std::mem::size_of::<V>();
        if actual != self.element_size {
            return Err(ObjectError::PropertyTypeMismatch {
                property: self.get_name().to_string(),
                expected: self.element_size,
                actual,
            });
        }
        Ok(())
    }

    /// Address of element `index` of this property inside `container`
    pub fn container_ptr_to_value_ptr(
        &self,
        container: &UObjectBase,
        index: usize,
    ) -> Result<NonNull<u8>, ObjectError> {
        self.check_container(container)?;
        if index >= self.array_dim {
            return Err(ObjectError::PropertyIndexOutOfBounds {
                property: self.get_name().to_string(),
                index,
                array_dim: self.array_dim,
            });
        }

        let base = NonNull::from(container).cast::<u8>();
        // SAFETY: the property was checked to fit in its owner at registration,
        // and the container is an instance of the owner or a subclass
        Ok(unsafe { base.add(self.offset_internal + index * self.element_size) })
    }

    /// Read the value of a single-element property
    pub fn get_value<V: PlainValue>(&self, container: &UObjectBase) -> Result<V, ObjectError> {
        self.get_value_at(container, 0)
    }

    /// Read element `index` of the property
    pub fn get_value_at<V: PlainValue>(
        &self,
        container: &UObjectBase,
        index: usize,
    ) -> Result<V, ObjectError> {
        self.check_value_size::<V>()?;
        let ptr = self.container_ptr_to_value_ptr(container, index)?;
        // SAFETY: in-bounds, correctly sized; the offset may not be aligned for V
        Ok(unsafe { ptr.cast::<V>().as_ptr().read_unaligned() })
    }

    /// Write the value of a single-element property
    ///
    /// # Safety
    ///
    /// The member at this property's offset must actually have type `V`, and
    /// no reference to that member may be alive during the write.
    pub unsafe fn set_value<V: PlainValue>(
        &self,
        container: &UObjectBase,
        value: V,
    ) -> Result<(), ObjectError> {
        self.set_value_at(container, 0, value)
    }

    /// Write element `index` of the property
    ///
    /// # Safety
    ///
    /// See [`set_value`](Self::set_value).
    pub unsafe fn set_value_at<V: PlainValue>(
        &self,
        container: &UObjectBase,
        index: usize,
        value: V,
    ) -> Result<(), ObjectError> {
        self.check_value_size::<V>()?;
        let ptr = self.container_ptr_to_value_ptr(container, index)?;
        ptr.cast::<V>().as_ptr().write_unaligned(value);
        Ok(())
    }
}

crate::impl_object_deref!(FProperty => FField, field);

impl fmt::Debug for FProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FProperty")
            .field("class", &self.get_class().get_name())
            .field("name", &self.get_name())
            .field("offset", &self.offset_internal)
            .field("element_size", &self.element_size)
            .field("array_dim", &self.array_dim)
            .finish()
    }
}

impl ObjectContext {
    /// Add a property to `owner`
    ///
    /// The field class must derive from `Property`, and the property must fit
    /// inside the owner's instance size.
    ///
    /// # Safety
    ///
    /// Every element of the property (`offset + i * element_size` for each
    /// `i < array_dim`) must name a member of a [`PlainValue`] type exactly
    /// `element_size` bytes wide, in every instance of `owner` and of its
    /// subclasses. [`FProperty::get_value`] reads that memory without further
    /// checks on what lies there.
    pub unsafe fn add_property(
        &self,
        owner: &UStruct,
        params: PropertyParams,
    ) -> Result<&FProperty, ObjectError> {
        let class = self.find_property_class(&params.field_class)?;

        let size = params.total_size();
        let fits = params
            .offset
            .checked_add(size)
            .is_some_and(|end| end <= owner.get_properties_size());
        if !fits {
            return Err(ObjectError::PropertyOutOfBounds {
                property: params.name.clone(),
                owner: owner.get_name(),
                offset: params.offset,
                size,
                owner_size: owner.get_properties_size(),
            });
        }

        let property = self.store_property(FProperty::new(
            class,
            FFieldVariant::Object(owner.as_object_base()),
            &params,
        ));
        owner.add_child_property(property);

        log::debug!(
            "Added {} '{}' to '{}' at offset {}",
            class.get_name(),
            property.get_name(),
            owner.get_name(),
            params.offset
        );
        Ok(property)
    }

    /// Add a property owned by another property, such as a container's
    /// element type
    ///
    /// Inner properties describe values relative to the element, not to the
    /// owning object, so they are not linked into any struct.
    pub fn add_inner_property(
        &self,
        owner: &FProperty,
        params: PropertyParams,
    ) -> Result<&FProperty, ObjectError> {
        let class = self.find_property_class(&params.field_class)?;
        let property = self.store_property(FProperty::new(class, FFieldVariant::Field(&owner.field), &params));
        owner.inner_properties.borrow_mut().push(NonNull::from(property));
        Ok(property)
    }

    fn find_property_class(&self, name: &str) -> Result<&FFieldClass, ObjectError> {
        let class = self
            .field_classes()
            .find(name)
            .ok_or_else(|| ObjectError::UnknownFieldClass(name.to_string()))?;
        let property_class = self
            .field_classes()
            .find("Property")
            .ok_or_else(|| ObjectError::UnknownFieldClass("Property".to_string()))?;

        if !class.is_child_of(property_class) {
            return Err(ObjectError::NotAProperty(name.to_string()));
        }
        Ok(class)
    }
}
