//! The print intrinsic

use crate::bytecode::{RegInstr, RegOpcode};
use crate::vm::interpreter::{Interpreter, RegOpcodeResult};
use crate::vm::intrinsics::PrintArg;
use crate::vm::value::Value;
use crate::vm::VmError;

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_reg_native_ops(
        &mut self,
        opcode: RegOpcode,
        instr: RegInstr,
        reg_base: usize,
    ) -> RegOpcodeResult {
        let module = self.module;
        let arg = match opcode {
            RegOpcode::Print => match reg_try!(self.registers.get_reg(reg_base, instr.a())) {
                Value::Int(v) => PrintArg::Int(v),
                Value::Double(v) => PrintArg::Double(v),
                Value::Ref(_) => {
                    return RegOpcodeResult::error(VmError::TypeError(
                        "print expects a number; use a string literal for text".to_string(),
                    ))
                }
            },
            RegOpcode::PrintLit => match module.literals.get(instr.bx() as usize) {
                Some(text) => PrintArg::Literal(text),
                None => {
                    return RegOpcodeResult::error(VmError::RuntimeError(format!(
                        "literal #{} does not exist",
                        instr.bx()
                    )))
                }
            },
            _ => {
                return RegOpcodeResult::runtime_error(format!(
                    "Not a native opcode: {:?}",
                    opcode
                ))
            }
        };

        match self.printer.print(arg) {
            Ok(()) => RegOpcodeResult::cont(),
            Err(e) => RegOpcodeResult::error(VmError::RuntimeError(format!("print failed: {}", e))),
        }
    }
}
