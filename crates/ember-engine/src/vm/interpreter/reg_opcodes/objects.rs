//! Object allocation and field access
//!
//! Field instructions carry the class the assembler resolved the field
//! against; the receiver is checked against it before the slot is touched.

use super::expect_ref;
use crate::bytecode::{RegInstr, RegOpcode};
use crate::vm::interpreter::{Interpreter, RegOpcodeResult};
use crate::vm::types::ClassId;
use crate::vm::value::Value;

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_reg_object_ops(
        &mut self,
        opcode: RegOpcode,
        instr: RegInstr,
        extra: u32,
        reg_base: usize,
    ) -> RegOpcodeResult {
        match opcode {
            RegOpcode::NewObject => {
                // The register file is the root set: a collection here may
                // move every live object and rewrite the registers.
                let object = reg_try!(self.gc.allocate_object(ClassId(extra), &mut self.registers));
                reg_try!(self.registers.set_reg(reg_base, instr.a(), Value::Ref(object)));
                RegOpcodeResult::cont()
            }

            RegOpcode::LoadField => {
                let object = reg_try!(self.registers.get_reg(reg_base, instr.b()));
                let object = reg_try!(expect_ref(object, "load_field"));
                reg_try!(self.gc.heap().expect_instance(object, ClassId(extra), "load_field"));
                let value = reg_try!(self.gc.load_field(object, instr.c() as usize));
                reg_try!(self.registers.set_reg(reg_base, instr.a(), value));
                RegOpcodeResult::cont()
            }

            RegOpcode::StoreField => {
                let object = reg_try!(self.registers.get_reg(reg_base, instr.a()));
                let object = reg_try!(expect_ref(object, "store_field"));
                reg_try!(self.gc.heap().expect_instance(object, ClassId(extra), "store_field"));
                let value = reg_try!(self.registers.get_reg(reg_base, instr.c()));
                reg_try!(self.gc.store_field(object, instr.b() as usize, value));
                RegOpcodeResult::cont()
            }

            RegOpcode::IsNull => {
                let value = reg_try!(self.registers.get_reg(reg_base, instr.b()));
                reg_try!(self.registers.set_reg(reg_base, instr.a(), Value::int(value.is_null() as i64)));
                RegOpcodeResult::cont()
            }

            _ => RegOpcodeResult::runtime_error(format!("Not an object opcode: {:?}", opcode)),
        }
    }
}
