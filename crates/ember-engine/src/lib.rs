//! Ember Engine
//!
//! A small managed-memory virtual machine built around a bounded heap:
//! - **VM**: heap region, allocator, object model, garbage collector, and the
//!   register-based interpreter that drives them (`vm` module)
//! - **Bytecode**: 32-bit register instruction format and loaded modules (`bytecode` module)
//! - **Assembler**: `.easm` text to bytecode (`asm` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use ember_engine::{assemble, Vm, VmOptions};
//!
//! let source = r#"
//!     .func main regs=2
//!         movi x0, 42
//!         print x0
//!         ret
//!     .end
//! "#;
//!
//! let module = assemble(source).unwrap();
//! let mut vm = Vm::new(VmOptions::default()).unwrap();
//! vm.run(&module, &mut std::io::stdout()).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Assembler module: lexer and parser for `.easm` sources
pub mod asm;

/// Bytecode module: instruction encoding, modules, and functions
pub mod bytecode;

/// VM module: heap, garbage collector, object model, and interpreter
pub mod vm;

// ============================================================================
// Re-exports
// ============================================================================

pub use asm::{assemble, AsmError};
pub use bytecode::{Function, Module, RegInstr, RegOpcode};
pub use vm::gc::{GarbageCollector, GcConfig, GcPhase, GcStats, GcStrategy, HeapStats};
pub use vm::gc::{NoRoots, RootProvider, RootSet};
pub use vm::interpreter::{Interpreter, RunReport, Vm, VmOptions};
pub use vm::types::{ClassDescriptor, ClassId, FieldKind, TypeRegistry, TypeRegistryBuilder};
pub use vm::value::{Handle, Reference, Value};
pub use vm::{VmError, VmResult};
