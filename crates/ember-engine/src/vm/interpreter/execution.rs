//! Execution types shared by the dispatch loop and the opcode handlers

use crate::vm::value::Value;
use crate::vm::VmError;

/// Saved state of a caller while its callee runs
///
/// Pushed by `Call` and popped by `Return`/`ReturnVoid`.
#[derive(Debug, Clone, Copy)]
pub struct RegExecutionFrame {
    /// Function index of the caller
    pub func_id: usize,
    /// Instruction pointer to resume at (past the call's extension word)
    pub ip: usize,
    /// Base of the caller's register window
    pub reg_base: usize,
    /// Caller register that receives the result
    pub dest_reg: u8,
}

/// Result of executing a single opcode
///
/// The main loop owns control flow: handlers only describe what should
/// happen next.
#[derive(Debug)]
pub enum RegOpcodeResult {
    /// Fall through to the next instruction
    Continue,

    /// Jump to an absolute code offset
    Jump(usize),

    /// Pop the current frame, handing `Value` to the caller
    Return(Value),

    /// Stop the program
    Halt,

    /// Abort the run
    Error(VmError),

    /// Enter a callee; the dispatch loop saves the caller and copies arguments
    PushFrame {
        /// Callee's index in the module
        func_id: usize,
        /// First argument register in the caller's frame
        arg_base: u8,
        /// Number of arguments to copy
        arg_count: u8,
        /// Caller's destination register for the return value
        dest_reg: u8,
    },
}

impl RegOpcodeResult {
    /// Fall through
    pub fn cont() -> Self {
        RegOpcodeResult::Continue
    }

    /// Abort with `e`
    pub fn error(e: VmError) -> Self {
        RegOpcodeResult::Error(e)
    }

    /// Create a runtime error result
    pub fn runtime_error(message: impl Into<String>) -> Self {
        RegOpcodeResult::Error(VmError::RuntimeError(message.into()))
    }
}

impl From<VmError> for RegOpcodeResult {
    fn from(e: VmError) -> Self {
        RegOpcodeResult::Error(e)
    }
}
