//! Function calls

use crate::bytecode::RegInstr;
use crate::vm::interpreter::{Interpreter, RegOpcodeResult};

impl<'a> Interpreter<'a> {
    /// `Call A, B, C` + extra: `xA = functions[extra](xB .. xB+C)`
    pub(in crate::vm::interpreter) fn exec_reg_call_ops(
        &mut self,
        instr: RegInstr,
        extra: u32,
    ) -> RegOpcodeResult {
        RegOpcodeResult::PushFrame {
            func_id: extra as usize,
            arg_base: instr.b(),
            arg_count: instr.c(),
            dest_reg: instr.a(),
        }
    }
}
