//! Register moves and constant loads

use crate::bytecode::{RegInstr, RegOpcode};
use crate::vm::interpreter::{Interpreter, RegOpcodeResult};
use crate::vm::value::Value;
use crate::vm::VmError;

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_reg_constant_ops(
        &mut self,
        opcode: RegOpcode,
        instr: RegInstr,
        reg_base: usize,
    ) -> RegOpcodeResult {
        let value = match opcode {
            RegOpcode::Move => reg_try!(self.registers.get_reg(reg_base, instr.b())),
            RegOpcode::LoadNull => Value::null(),
            RegOpcode::LoadInt => Value::int(instr.sbx() as i64),
            RegOpcode::LoadConst => match self.module.constants.get(instr.bx() as usize) {
                Some(value) => *value,
                None => {
                    return RegOpcodeResult::error(VmError::RuntimeError(format!(
                        "constant #{} does not exist",
                        instr.bx()
                    )))
                }
            },
            _ => {
                return RegOpcodeResult::runtime_error(format!(
                    "Not a constant opcode: {:?}",
                    opcode
                ))
            }
        };
        reg_try!(self.registers.set_reg(reg_base, instr.a(), value));
        RegOpcodeResult::cont()
    }
}
