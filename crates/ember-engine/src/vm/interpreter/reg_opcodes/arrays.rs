//! Array allocation, element access, and length

use super::{expect_int, expect_ref};
use crate::bytecode::{RegInstr, RegOpcode};
use crate::vm::interpreter::{Interpreter, RegOpcodeResult};
use crate::vm::types::ClassId;
use crate::vm::value::Value;

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_reg_array_ops(
        &mut self,
        opcode: RegOpcode,
        instr: RegInstr,
        extra: u32,
        reg_base: usize,
    ) -> RegOpcodeResult {
        match opcode {
            RegOpcode::NewArray => {
                let length = reg_try!(self.registers.get_reg(reg_base, instr.b()));
                let length = reg_try!(expect_int(length, "new_array"));
                let array =
                    reg_try!(self.gc.allocate_array(ClassId(extra), length, &mut self.registers));
                reg_try!(self.registers.set_reg(reg_base, instr.a(), Value::Ref(array)));
                RegOpcodeResult::cont()
            }

            RegOpcode::LoadElem => {
                let array = reg_try!(self.registers.get_reg(reg_base, instr.b()));
                let array = reg_try!(expect_ref(array, "load_element"));
                let index = reg_try!(self.registers.get_reg(reg_base, instr.c()));
                let index = reg_try!(expect_int(index, "load_element"));
                let value = reg_try!(self.gc.load_element(array, index));
                reg_try!(self.registers.set_reg(reg_base, instr.a(), value));
                RegOpcodeResult::cont()
            }

            RegOpcode::StoreElem => {
                let array = reg_try!(self.registers.get_reg(reg_base, instr.a()));
                let array = reg_try!(expect_ref(array, "store_element"));
                let index = reg_try!(self.registers.get_reg(reg_base, instr.b()));
                let index = reg_try!(expect_int(index, "store_element"));
                let value = reg_try!(self.registers.get_reg(reg_base, instr.c()));
                reg_try!(self.gc.store_element(array, index, value));
                RegOpcodeResult::cont()
            }

            RegOpcode::ArrayLen => {
                let array = reg_try!(self.registers.get_reg(reg_base, instr.b()));
                let array = reg_try!(expect_ref(array, "array_length"));
                let length = reg_try!(self.gc.array_length(array));
                reg_try!(self.registers.set_reg(reg_base, instr.a(), Value::int(length as i64)));
                RegOpcodeResult::cont()
            }

            _ => RegOpcodeResult::runtime_error(format!("Not an array opcode: {:?}", opcode)),
        }
    }
}
