//! Reflection: class descriptors, registration, fields and properties

mod class;
mod field;
mod property;
mod registration;

pub use class::{UClass, UField, UStruct};
pub use field::{FField, FFieldClass, FFieldVariant, FieldClassRegistry};
pub use property::{FProperty, PlainValue, PropertyParams};
pub use registration::{
    construct_in_place, destroy_in_place, ClassConstructorFn, ClassDestructorFn, ClassParams,
    ClassVTable, PostInitPropertiesFn, UObjectType,
};
