//! Comparison opcode handlers
//!
//! Comparisons produce `Int` 1 or 0. Equality on references is identity.

use crate::bytecode::{RegInstr, RegOpcode};
use crate::vm::interpreter::{Interpreter, RegOpcodeResult};
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};

/// Evaluate a comparison opcode
pub fn compare(opcode: RegOpcode, lhs: Value, rhs: Value) -> VmResult<bool> {
    match opcode {
        RegOpcode::Eq => Ok(values_equal(lhs, rhs)),
        RegOpcode::Ne => Ok(!values_equal(lhs, rhs)),
        RegOpcode::Lt | RegOpcode::Le => {
            let ordered = match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => Some(a.cmp(&b)),
                _ => match (lhs.as_double(), rhs.as_double()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => {
                        return Err(VmError::TypeError(format!(
                            "{} expects numbers, got {} and {}",
                            opcode.name(),
                            lhs.kind_name(),
                            rhs.kind_name()
                        )))
                    }
                },
            };
            // NaN is unordered: every ordering test is false
            Ok(match ordered {
                Some(ord) if opcode == RegOpcode::Lt => ord.is_lt(),
                Some(ord) => ord.is_le(),
                None => false,
            })
        }
        other => Err(VmError::RuntimeError(format!(
            "{} is not a comparison opcode",
            other.name()
        ))),
    }
}

fn values_equal(lhs: Value, rhs: Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Ref(a), Value::Ref(b)) => a == b,
        (Value::Ref(_), _) | (_, Value::Ref(_)) => false,
        _ => lhs.as_double() == rhs.as_double(),
    }
}

/// Branch condition: non-zero numbers and non-null references are true
pub fn is_truthy(value: Value) -> bool {
    match value {
        Value::Int(v) => v != 0,
        Value::Double(v) => v != 0.0,
        Value::Ref(r) => !r.is_null(),
    }
}

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_reg_comparison_ops(
        &mut self,
        opcode: RegOpcode,
        instr: RegInstr,
        reg_base: usize,
    ) -> RegOpcodeResult {
        let lhs = reg_try!(self.registers.get_reg(reg_base, instr.b()));
        let rhs = reg_try!(self.registers.get_reg(reg_base, instr.c()));
        let result = reg_try!(compare(opcode, lhs, rhs));
        reg_try!(self.registers.set_reg(reg_base, instr.a(), Value::int(result as i64)));
        RegOpcodeResult::cont()
    }
}
