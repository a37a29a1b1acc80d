//! Object model accessors
//!
//! Checked reads and writes of object fields and array elements living in a
//! [`Heap`]. Every check runs before the slot is touched, so a failed access
//! leaves the heap exactly as it was.

use crate::vm::gc::{GcHeader, Heap, ARRAY_HEADER_WORDS};
use crate::vm::types::{ClassId, FieldKind};
use crate::vm::value::{Reference, Value};
use crate::vm::{VmError, VmResult};

impl Heap {
    /// Read field `index` of the object named by `object`
    pub fn load_field(&self, object: Reference, index: usize) -> VmResult<Value> {
        let (base, header) = self.locate(object, "load_field")?;
        let kind = self.field_kind_at(header, index)?;
        let raw = self.words()[base + 1 + index];
        Ok(match kind {
            FieldKind::Int => Value::Int(raw as i64),
            FieldKind::Double => Value::Double(f64::from_bits(raw)),
            FieldKind::Reference(_) => Value::Ref(Reference::from_slot(raw)),
        })
    }

    /// Write field `index` of the object named by `object`
    ///
    /// Integers widen into `double` fields; every other kind mismatch fails.
    pub fn store_field(&mut self, object: Reference, index: usize, value: Value) -> VmResult<()> {
        let (base, header) = self.locate(object, "store_field")?;
        let kind = self.field_kind_at(header, index)?;
        let raw = match (kind, value) {
            (FieldKind::Int, Value::Int(v)) => v as u64,
            (FieldKind::Double, Value::Double(v)) => v.to_bits(),
            (FieldKind::Double, Value::Int(v)) => (v as f64).to_bits(),
            (FieldKind::Reference(expected), Value::Ref(target)) => {
                if let Some(expected) = expected {
                    self.check_instance_of(target, expected)
                        .map_err(|reason| self.field_error(header, index, reason))?;
                }
                target.to_slot()
            }
            (kind, value) => {
                let reason = format!("cannot store {} into {} field", value.kind_name(), kind.name());
                return Err(self.field_error(header, index, reason));
            }
        };
        self.words_mut()[base + 1 + index] = raw;
        Ok(())
    }

    /// Read element `index` of the array named by `array`
    pub fn load_element(&self, array: Reference, index: i64) -> VmResult<Value> {
        let (base, _, slot) = self.element_slot(array, index, "load_element")?;
        Ok(Value::Ref(Reference::from_slot(self.words()[base + slot])))
    }

    /// Write element `index` of the array named by `array`
    pub fn store_element(&mut self, array: Reference, index: i64, value: Value) -> VmResult<()> {
        let (base, header, slot) = self.element_slot(array, index, "store_element")?;
        let descriptor = || self.type_registry().array_name(header.class_id());
        let target = value.as_reference().ok_or_else(|| VmError::InvalidFieldAccess {
            descriptor: descriptor(),
            index: slot - ARRAY_HEADER_WORDS,
            reason: format!("cannot store {} into a reference array", value.kind_name()),
        })?;
        self.check_instance_of(target, header.class_id())
            .map_err(|reason| VmError::InvalidFieldAccess {
                descriptor: descriptor(),
                index: slot - ARRAY_HEADER_WORDS,
                reason,
            })?;
        self.words_mut()[base + slot] = target.to_slot();
        Ok(())
    }

    /// Length of the array named by `array`
    pub fn length_of(&self, array: Reference) -> VmResult<usize> {
        let (base, header) = self.locate(array, "array_length")?;
        if !header.is_array() {
            return Err(self.not_an_array(header));
        }
        Ok(self.array_length(base))
    }

    /// Class of an object, or element class of an array
    pub fn class_of(&self, reference: Reference) -> VmResult<ClassId> {
        let (_, header) = self.locate(reference, "class_of")?;
        Ok(header.class_id())
    }

    /// Fail unless `object` is a non-null instance of `class`
    pub fn expect_instance(
        &self,
        object: Reference,
        class: ClassId,
        operation: &'static str,
    ) -> VmResult<()> {
        if object.is_null() {
            return Err(VmError::NullPointer { operation });
        }
        self.check_instance_of(object, class)
            .map_err(|reason| VmError::TypeError(format!("{}: {}", operation, reason)))
    }

    /// Diagnostic name of the descriptor of `reference` (`Foo` or `Foo[]`)
    pub fn describe(&self, reference: Reference) -> VmResult<String> {
        let (_, header) = self.locate(reference, "describe")?;
        Ok(self.descriptor_name(header))
    }

    fn locate(&self, reference: Reference, operation: &'static str) -> VmResult<(usize, GcHeader)> {
        let handle = reference
            .handle()
            .ok_or(VmError::NullPointer { operation })?;
        let header = self.resolve(handle)?;
        Ok((handle.index(), header))
    }

    fn field_kind_at(&self, header: GcHeader, index: usize) -> VmResult<FieldKind> {
        if header.is_array() {
            return Err(self.field_error(header, index, "arrays have no fields".to_string()));
        }
        let class = self.type_registry().class(header.class_id())?;
        class.field_kind(index).ok_or_else(|| {
            let reason = format!("{} has {} fields", class.name, class.field_count());
            self.field_error(header, index, reason)
        })
    }

    /// Bounds-checked (base, header, word offset) of an array element
    fn element_slot(
        &self,
        array: Reference,
        index: i64,
        operation: &'static str,
    ) -> VmResult<(usize, GcHeader, usize)> {
        let (base, header) = self.locate(array, operation)?;
        if !header.is_array() {
            return Err(self.not_an_array(header));
        }
        let length = self.array_length(base);
        match usize::try_from(index) {
            Ok(i) if i < length => Ok((base, header, ARRAY_HEADER_WORDS + i)),
            _ => Err(VmError::IndexOutOfBounds {
                operation,
                descriptor: self.type_registry().array_name(header.class_id()),
                index,
                length,
            }),
        }
    }

    /// `Ok` if `target` is null or an instance of `class`
    fn check_instance_of(&self, target: Reference, class: ClassId) -> Result<(), String> {
        let Some(handle) = target.handle() else {
            return Ok(());
        };
        let header = self.resolve(handle).map_err(|e| e.to_string())?;
        if header.is_array() || header.class_id() != class {
            return Err(format!(
                "expected {}, found {}",
                self.type_registry().class_name(class),
                self.descriptor_name(header)
            ));
        }
        Ok(())
    }

    fn descriptor_name(&self, header: GcHeader) -> String {
        if header.is_array() {
            self.type_registry().array_name(header.class_id())
        } else {
            self.type_registry().class_name(header.class_id())
        }
    }

    fn field_error(&self, header: GcHeader, index: usize, reason: String) -> VmError {
        VmError::InvalidFieldAccess {
            descriptor: self.descriptor_name(header),
            index,
            reason,
        }
    }

    fn not_an_array(&self, header: GcHeader) -> VmError {
        VmError::TypeError(format!(
            "expected an array, found {}",
            self.descriptor_name(header)
        ))
    }
}
