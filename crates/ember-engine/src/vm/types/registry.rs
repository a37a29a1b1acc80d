//! Class descriptor registry
//!
//! Descriptors are immutable once the registry is built and are shared by
//! every heap and interpreter through an `Arc<TypeRegistry>`.

use crate::vm::{VmError, VmResult};
use rustc_hash::FxHashMap;
use std::fmt;

/// Maximum number of classes (class ids are packed into 24 header bits)
pub const MAX_CLASSES: usize = 1 << 24;

/// Class identifier (index into the registry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Registry index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a field slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// 64-bit signed integer, defaults to 0
    Int,
    /// 64-bit float, defaults to 0.0
    Double,
    /// Nullable reference, defaults to null. Carries the declared class when known.
    Reference(Option<ClassId>),
}

impl FieldKind {
    /// Check if the slot holds a reference
    #[inline]
    pub fn is_reference(self) -> bool {
        matches!(self, FieldKind::Reference(_))
    }

    /// Name used in diagnostics and disassembly
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Double => "double",
            FieldKind::Reference(_) => "class",
        }
    }
}

/// A named field slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Slot kind
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Create a field descriptor
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Integer field
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int)
    }

    /// Float field
    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Double)
    }

    /// Reference field pointing at instances of `class`
    pub fn reference(name: impl Into<String>, class: ClassId) -> Self {
        Self::new(name, FieldKind::Reference(Some(class)))
    }
}

/// Static layout of a class
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    /// Class id
    pub id: ClassId,
    /// Class name
    pub name: String,
    /// Field slots in declaration order
    pub fields: Vec<FieldDescriptor>,
    /// Indices of reference slots, precomputed for tracing
    reference_slots: Vec<usize>,
}

impl ClassDescriptor {
    fn new(id: ClassId, name: String, fields: Vec<FieldDescriptor>) -> Self {
        let reference_slots = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind.is_reference())
            .map(|(i, _)| i)
            .collect();
        Self {
            id,
            name,
            fields,
            reference_slots,
        }
    }

    /// Number of field slots
    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Kind of the slot at `index`
    #[inline]
    pub fn field_kind(&self, index: usize) -> Option<FieldKind> {
        self.fields.get(index).map(|f| f.kind)
    }

    /// Slot index of the field named `name`
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Indices of reference slots
    #[inline]
    pub fn reference_slots(&self) -> &[usize] {
        &self.reference_slots
    }
}

/// Builder for an immutable [`TypeRegistry`]
///
/// Classes may be declared before their fields are known so that mutually
/// referencing classes can name each other.
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    classes: Vec<ClassDescriptor>,
    by_name: FxHashMap<String, ClassId>,
}

impl TypeRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a class with no fields yet, returning its id
    pub fn declare_class(&mut self, name: &str) -> VmResult<ClassId> {
        if self.by_name.contains_key(name) {
            return Err(VmError::InvalidConfig(format!(
                "class '{}' is already defined",
                name
            )));
        }
        if self.classes.len() >= MAX_CLASSES {
            return Err(VmError::InvalidConfig(format!(
                "too many classes (limit {})",
                MAX_CLASSES
            )));
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes
            .push(ClassDescriptor::new(id, name.to_string(), Vec::new()));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Set the fields of a declared class
    pub fn define_fields(&mut self, id: ClassId, fields: Vec<FieldDescriptor>) -> VmResult<()> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(VmError::InvalidConfig(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
            if let FieldKind::Reference(Some(target)) = field.kind {
                if target.index() >= self.classes.len() {
                    return Err(VmError::InvalidConfig(format!(
                        "field '{}' refers to unknown class {}",
                        field.name, target
                    )));
                }
            }
        }
        let class = self
            .classes
            .get_mut(id.index())
            .ok_or_else(|| VmError::InvalidConfig(format!("unknown class {}", id)))?;
        *class = ClassDescriptor::new(id, std::mem::take(&mut class.name), fields);
        Ok(())
    }

    /// Declare and define a class in one step
    pub fn register_class(&mut self, name: &str, fields: Vec<FieldDescriptor>) -> VmResult<ClassId> {
        let id = self.declare_class(name)?;
        self.define_fields(id, fields)?;
        Ok(id)
    }

    /// Look up a class declared so far
    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Freeze into an immutable registry
    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            classes: self.classes,
            by_name: self.by_name,
        }
    }
}

/// Immutable class registry
#[derive(Debug, Default)]
pub struct TypeRegistry {
    classes: Vec<ClassDescriptor>,
    by_name: FxHashMap<String, ClassId>,
}

impl TypeRegistry {
    /// Get a descriptor by id
    #[inline]
    pub fn get(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.classes.get(id.index())
    }

    /// Get a descriptor by id, failing with a diagnostic
    pub fn class(&self, id: ClassId) -> VmResult<&ClassDescriptor> {
        self.get(id)
            .ok_or_else(|| VmError::InvalidConfig(format!("unknown class {}", id)))
    }

    /// Look up a class by name
    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterate over all descriptors in id order
    pub fn iter(&self) -> impl Iterator<Item = &ClassDescriptor> + '_ {
        self.classes.iter()
    }

    /// Human-readable name of a class, for diagnostics
    pub fn class_name(&self, id: ClassId) -> String {
        match self.get(id) {
            Some(class) => class.name.clone(),
            None => format!("<class {}>", id),
        }
    }

    /// Human-readable name of an array of `element`
    pub fn array_name(&self, element: ClassId) -> String {
        format!("{}[]", self.class_name(element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo_bar() -> TypeRegistry {
        let mut builder = TypeRegistryBuilder::new();
        let bar = builder
            .register_class("Bar", vec![FieldDescriptor::int("a")])
            .unwrap();
        builder
            .register_class(
                "Foo",
                vec![FieldDescriptor::int("x"), FieldDescriptor::reference("y", bar)],
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = foo_bar();
        assert_eq!(registry.len(), 2);

        let foo = registry.lookup("Foo").unwrap();
        let desc = registry.class(foo).unwrap();
        assert_eq!(desc.name, "Foo");
        assert_eq!(desc.field_count(), 2);
        assert_eq!(desc.field_index("y"), Some(1));
        assert_eq!(desc.reference_slots(), &[1]);
        assert!(registry.lookup("Baz").is_none());
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let mut builder = TypeRegistryBuilder::new();
        builder.declare_class("A").unwrap();
        assert!(builder.declare_class("A").is_err());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut builder = TypeRegistryBuilder::new();
        let result = builder.register_class(
            "A",
            vec![FieldDescriptor::int("x"), FieldDescriptor::double("x")],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_forward_declaration() {
        let mut builder = TypeRegistryBuilder::new();
        let node = builder.declare_class("Node").unwrap();
        builder
            .define_fields(
                node,
                vec![FieldDescriptor::reference("next", node), FieldDescriptor::int("v")],
            )
            .unwrap();
        let registry = builder.build();
        assert_eq!(registry.class(node).unwrap().reference_slots(), &[0]);
    }

    #[test]
    fn test_array_name() {
        let registry = foo_bar();
        let foo = registry.lookup("Foo").unwrap();
        assert_eq!(registry.array_name(foo), "Foo[]");
    }
}
