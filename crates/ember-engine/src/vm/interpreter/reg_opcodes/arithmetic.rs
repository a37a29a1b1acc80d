//! Arithmetic opcode handlers
//!
//! Integer arithmetic wraps on overflow. A double on either side promotes
//! the operation to floating point.

use crate::bytecode::{RegInstr, RegOpcode};
use crate::vm::interpreter::{Interpreter, RegOpcodeResult};
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};

/// Apply an arithmetic opcode to two operands
pub fn binary_arithmetic(opcode: RegOpcode, lhs: Value, rhs: Value) -> VmResult<Value> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        return int_arithmetic(opcode, a, b).map(Value::Int);
    }
    match (lhs.as_double(), rhs.as_double()) {
        (Some(a), Some(b)) => float_arithmetic(opcode, a, b).map(Value::Double),
        _ => Err(VmError::TypeError(format!(
            "{} expects numbers, got {} and {}",
            opcode.name(),
            lhs.kind_name(),
            rhs.kind_name()
        ))),
    }
}

fn int_arithmetic(opcode: RegOpcode, a: i64, b: i64) -> VmResult<i64> {
    match opcode {
        RegOpcode::Add => Ok(a.wrapping_add(b)),
        RegOpcode::Sub => Ok(a.wrapping_sub(b)),
        RegOpcode::Mul => Ok(a.wrapping_mul(b)),
        RegOpcode::Div if b == 0 => Err(VmError::RuntimeError("integer division by zero".to_string())),
        RegOpcode::Div => Ok(a.wrapping_div(b)),
        RegOpcode::Mod if b == 0 => Err(VmError::RuntimeError("integer modulo by zero".to_string())),
        RegOpcode::Mod => Ok(a.wrapping_rem(b)),
        other => Err(not_arithmetic(other)),
    }
}

fn float_arithmetic(opcode: RegOpcode, a: f64, b: f64) -> VmResult<f64> {
    match opcode {
        RegOpcode::Add => Ok(a + b),
        RegOpcode::Sub => Ok(a - b),
        RegOpcode::Mul => Ok(a * b),
        RegOpcode::Div => Ok(a / b),
        RegOpcode::Mod => Ok(a % b),
        other => Err(not_arithmetic(other)),
    }
}

fn not_arithmetic(opcode: RegOpcode) -> VmError {
    VmError::RuntimeError(format!("{} is not an arithmetic opcode", opcode.name()))
}

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_reg_arithmetic_ops(
        &mut self,
        opcode: RegOpcode,
        instr: RegInstr,
        reg_base: usize,
    ) -> RegOpcodeResult {
        let lhs = reg_try!(self.registers.get_reg(reg_base, instr.b()));
        let rhs = reg_try!(self.registers.get_reg(reg_base, instr.c()));
        let result = reg_try!(binary_arithmetic(opcode, lhs, rhs));
        reg_try!(self.registers.set_reg(reg_base, instr.a(), result));
        RegOpcodeResult::cont()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::value::Reference;

    #[test]
    fn test_int_arithmetic() {
        let add = binary_arithmetic(RegOpcode::Add, Value::int(40), Value::int(2)).unwrap();
        assert_eq!(add, Value::int(42));
        let div = binary_arithmetic(RegOpcode::Div, Value::int(-7), Value::int(2)).unwrap();
        assert_eq!(div, Value::int(-3));
        let rem = binary_arithmetic(RegOpcode::Mod, Value::int(-7), Value::int(2)).unwrap();
        assert_eq!(rem, Value::int(-1));
    }

    #[test]
    fn test_int_wraps() {
        let sum = binary_arithmetic(RegOpcode::Add, Value::int(i64::MAX), Value::int(1)).unwrap();
        assert_eq!(sum, Value::int(i64::MIN));
        let quot = binary_arithmetic(RegOpcode::Div, Value::int(i64::MIN), Value::int(-1)).unwrap();
        assert_eq!(quot, Value::int(i64::MIN));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            binary_arithmetic(RegOpcode::Div, Value::int(1), Value::int(0)),
            Err(VmError::RuntimeError(_))
        ));
        assert!(matches!(
            binary_arithmetic(RegOpcode::Mod, Value::int(1), Value::int(0)),
            Err(VmError::RuntimeError(_))
        ));
    }

    #[test]
    fn test_double_promotion() {
        let mixed = binary_arithmetic(RegOpcode::Mul, Value::int(3), Value::double(0.5)).unwrap();
        assert_eq!(mixed, Value::double(1.5));
        let div = binary_arithmetic(RegOpcode::Div, Value::double(1.0), Value::int(4)).unwrap();
        assert_eq!(div, Value::double(0.25));
    }

    #[test]
    fn test_reference_operand_rejected() {
        let err = binary_arithmetic(RegOpcode::Add, Value::Ref(Reference::Null), Value::int(1)).unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
    }
}
