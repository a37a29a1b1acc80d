//! Register bytecode
//!
//! Instruction encoding, functions, modules, and the verifier that runs
//! before a module is executed.

pub mod module;
pub mod opcode;

pub use module::{Function, Instructions, Module, VerifyError};
pub use opcode::{InstrFormat, RegBytecodeWriter, RegInstr, RegOpcode};
