//! Jumps, returns, and halt

use super::comparison::is_truthy;
use crate::bytecode::{RegInstr, RegOpcode};
use crate::vm::interpreter::{Interpreter, RegOpcodeResult};
use crate::vm::value::Value;

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_reg_control_flow_ops(
        &mut self,
        opcode: RegOpcode,
        instr: RegInstr,
        reg_base: usize,
        offset: usize,
    ) -> RegOpcodeResult {
        // Offsets are relative to the instruction after the jump
        let target = (offset as i64 + 1 + instr.sbx() as i64) as usize;

        let taken = match opcode {
            RegOpcode::Jump => true,
            RegOpcode::JumpIf => is_truthy(reg_try!(self.registers.get_reg(reg_base, instr.a()))),
            RegOpcode::JumpIfNot => !is_truthy(reg_try!(self.registers.get_reg(reg_base, instr.a()))),
            RegOpcode::JumpIfNull => reg_try!(self.registers.get_reg(reg_base, instr.a())).is_null(),
            RegOpcode::JumpIfNotNull => !reg_try!(self.registers.get_reg(reg_base, instr.a())).is_null(),
            RegOpcode::Return => {
                let value = reg_try!(self.registers.get_reg(reg_base, instr.a()));
                return RegOpcodeResult::Return(value);
            }
            RegOpcode::ReturnVoid => return RegOpcodeResult::Return(Value::null()),
            RegOpcode::Halt => return RegOpcodeResult::Halt,
            _ => {
                return RegOpcodeResult::runtime_error(format!(
                    "Not a control flow opcode: {:?}",
                    opcode
                ))
            }
        };

        if taken {
            RegOpcodeResult::Jump(target)
        } else {
            RegOpcodeResult::cont()
        }
    }
}
