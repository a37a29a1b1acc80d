//! Opcode handlers, grouped by the kind of operation
//!
//! Each group is an `impl Interpreter` block returning a `RegOpcodeResult`;
//! the dispatch loop in `core` routes opcodes to them.

/// Unwrap a `VmResult` inside a handler, turning errors into `RegOpcodeResult::Error`
macro_rules! reg_try {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => return $crate::vm::interpreter::RegOpcodeResult::Error(e),
        }
    };
}

mod arithmetic;
mod arrays;
mod calls;
mod comparison;
mod constants;
mod control_flow;
mod native;
mod objects;

pub use arithmetic::binary_arithmetic;
pub use comparison::{compare, is_truthy};

use crate::vm::value::{Reference, Value};
use crate::vm::{VmError, VmResult};

/// Read an integer operand
pub(in crate::vm::interpreter) fn expect_int(value: Value, operation: &str) -> VmResult<i64> {
    value.as_int().ok_or_else(|| {
        VmError::TypeError(format!("{} expects an int, got {}", operation, value.kind_name()))
    })
}

/// Read a reference operand
pub(in crate::vm::interpreter) fn expect_ref(value: Value, operation: &str) -> VmResult<Reference> {
    value.as_reference().ok_or_else(|| {
        VmError::TypeError(format!("{} expects a reference, got {}", operation, value.kind_name()))
    })
}
