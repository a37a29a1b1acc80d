//! Register-based interpreter
//!
//! The interpreter owns the register file and the frame stack; the heap and
//! collector belong to the caller. Every allocating instruction hands the
//! register file to the collector as its root set.

mod core;
mod execution;
pub mod reg_opcodes;
mod vm_facade;

pub use core::Interpreter;
pub use execution::{RegExecutionFrame, RegOpcodeResult};
pub use vm_facade::{RunReport, Vm, VmOptions};
