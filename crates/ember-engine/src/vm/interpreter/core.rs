//! Interpreter state and the main dispatch loop

use super::execution::{RegExecutionFrame, RegOpcodeResult};
use crate::bytecode::{Function, Module, RegInstr, RegOpcode};
use crate::vm::defaults::MAX_CALL_DEPTH;
use crate::vm::gc::GarbageCollector;
use crate::vm::intrinsics::Printer;
use crate::vm::register_file::{RegisterFile, RegisterFileStats};
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};
use log::{debug, trace};
use std::io::Write;

/// Executes one module against a caller-owned collector
///
/// The interpreter assumes the module passed verification: registers,
/// pool indices, and jump targets are in range.
pub struct Interpreter<'a> {
    /// Module being executed
    pub(super) module: &'a Module,

    /// Heap and collector
    pub(super) gc: &'a mut GarbageCollector,

    /// Registers of every live frame; the root set of the program
    pub(super) registers: RegisterFile,

    /// Saved callers
    frames: Vec<RegExecutionFrame>,

    /// Sink for the print intrinsic
    pub(super) printer: Printer<&'a mut dyn Write>,

    /// Instructions dispatched so far
    instructions_executed: u64,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter for `module`
    pub fn new(
        module: &'a Module,
        gc: &'a mut GarbageCollector,
        out: &'a mut dyn Write,
        max_registers: usize,
    ) -> Self {
        Self {
            module,
            gc,
            registers: RegisterFile::with_max_size(max_registers),
            frames: Vec::new(),
            printer: Printer::new(out),
            instructions_executed: 0,
        }
    }

    /// Run the entry function to completion
    ///
    /// Returns the entry function's return value, or null when the program
    /// ends with `Halt` or `ReturnVoid`.
    pub fn run(&mut self) -> VmResult<Value> {
        let module = self.module;
        let entry = module.entry_function().ok_or_else(|| {
            VmError::RuntimeError(format!("entry function {} does not exist", module.entry))
        })?;
        debug!(
            "Running '{}' ({} functions, {} classes)",
            entry.name,
            module.functions.len(),
            module.registry.len()
        );

        let result = self.execute(module.entry);
        let flushed = self
            .printer
            .flush()
            .map_err(|e| VmError::RuntimeError(format!("failed to flush output: {}", e)));

        debug!(
            "Executed {} instructions, {} lines printed, {} collections",
            self.instructions_executed,
            self.printer.lines(),
            self.gc.stats().collections
        );
        let value = result?;
        flushed?;
        Ok(value)
    }

    /// Instructions dispatched so far
    pub fn instructions_executed(&self) -> u64 {
        self.instructions_executed
    }

    /// Register file usage
    pub fn register_stats(&self) -> RegisterFileStats {
        self.registers.stats()
    }

    /// Lines written by the print intrinsic
    pub fn lines_printed(&self) -> usize {
        self.printer.lines()
    }

    fn execute(&mut self, entry: usize) -> VmResult<Value> {
        let module = self.module;
        let mut func_id = entry;
        let mut function = function_at(module, func_id)?;
        let mut reg_base = self.registers.alloc_frame(function.register_count)?;
        let mut ip = 0usize;

        loop {
            let offset = ip;
            let word = *function.code.get(ip).ok_or_else(|| {
                trap(
                    function,
                    offset,
                    VmError::RuntimeError("execution fell off the end of the function".to_string()),
                )
            })?;
            let instr = RegInstr(word);
            let opcode = instr
                .opcode()
                .ok_or_else(|| trap(function, offset, VmError::InvalidOpcode(instr.opcode_byte())))?;
            ip += 1;

            let extra = if opcode.is_extended() {
                let extra = *function.code.get(ip).ok_or_else(|| {
                    trap(
                        function,
                        offset,
                        VmError::RuntimeError("missing extension word".to_string()),
                    )
                })?;
                ip += 1;
                extra
            } else {
                0
            };

            self.instructions_executed += 1;

            match self.execute_reg_opcode(opcode, instr, extra, reg_base, offset) {
                RegOpcodeResult::Continue => {}
                RegOpcodeResult::Jump(target) => ip = target,
                RegOpcodeResult::Return(value) => {
                    self.registers.free_frame(reg_base);
                    let Some(frame) = self.frames.pop() else {
                        return Ok(value);
                    };
                    trace!("return from '{}' to frame {}", function.name, frame.func_id);
                    func_id = frame.func_id;
                    function = function_at(module, func_id)?;
                    ip = frame.ip;
                    reg_base = frame.reg_base;
                    self.registers
                        .set_reg(reg_base, frame.dest_reg, value)
                        .map_err(|e| trap(function, ip, e))?;
                }
                RegOpcodeResult::Halt => {
                    self.frames.clear();
                    self.registers.free_frame(0);
                    return Ok(Value::null());
                }
                RegOpcodeResult::PushFrame {
                    func_id: callee_id,
                    arg_base,
                    arg_count,
                    dest_reg,
                } => {
                    if self.frames.len() >= MAX_CALL_DEPTH {
                        return Err(trap(function, offset, VmError::StackOverflow));
                    }
                    let callee = function_at(module, callee_id).map_err(|e| trap(function, offset, e))?;
                    let new_base = self
                        .registers
                        .alloc_frame(callee.register_count)
                        .map_err(|e| trap(function, offset, e))?;
                    self.registers
                        .copy_regs(reg_base + arg_base as usize, new_base, arg_count as usize)
                        .map_err(|e| trap(function, offset, e))?;
                    self.frames.push(RegExecutionFrame {
                        func_id,
                        ip,
                        reg_base,
                        dest_reg,
                    });
                    trace!("call '{}' from '{}'", callee.name, function.name);
                    func_id = callee_id;
                    function = callee;
                    reg_base = new_base;
                    ip = 0;
                }
                RegOpcodeResult::Error(e) => return Err(trap(function, offset, e)),
            }
        }
    }

    fn execute_reg_opcode(
        &mut self,
        opcode: RegOpcode,
        instr: RegInstr,
        extra: u32,
        reg_base: usize,
        offset: usize,
    ) -> RegOpcodeResult {
        use RegOpcode::*;

        match opcode {
            Nop => RegOpcodeResult::cont(),
            Move | LoadNull | LoadInt | LoadConst => self.exec_reg_constant_ops(opcode, instr, reg_base),
            Add | Sub | Mul | Div | Mod => self.exec_reg_arithmetic_ops(opcode, instr, reg_base),
            Lt | Le | Eq | Ne => self.exec_reg_comparison_ops(opcode, instr, reg_base),
            Jump | JumpIf | JumpIfNot | JumpIfNull | JumpIfNotNull | Return | ReturnVoid | Halt => {
                self.exec_reg_control_flow_ops(opcode, instr, reg_base, offset)
            }
            NewObject | LoadField | StoreField | IsNull => {
                self.exec_reg_object_ops(opcode, instr, extra, reg_base)
            }
            NewArray | LoadElem | StoreElem | ArrayLen => {
                self.exec_reg_array_ops(opcode, instr, extra, reg_base)
            }
            Print | PrintLit => self.exec_reg_native_ops(opcode, instr, reg_base),
            Call => self.exec_reg_call_ops(instr, extra),
        }
    }
}

fn function_at(module: &Module, func_id: usize) -> VmResult<&Function> {
    module
        .functions
        .get(func_id)
        .ok_or_else(|| VmError::RuntimeError(format!("function {} does not exist", func_id)))
}

/// Attach the executing function and offset to an error
fn trap(function: &Function, offset: usize, error: VmError) -> VmError {
    VmError::Trap {
        function: function.name.clone(),
        offset,
        source: Box::new(error),
    }
}
