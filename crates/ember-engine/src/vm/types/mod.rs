//! Type descriptor system for precise garbage collection
//!
//! Descriptors record the slot layout of every class so the collector knows
//! exactly which slots hold references. Arrays carry their element class id
//! instead of a separate descriptor.

mod registry;

pub use registry::{
    ClassDescriptor, ClassId, FieldDescriptor, FieldKind, TypeRegistry, TypeRegistryBuilder,
    MAX_CLASSES,
};
