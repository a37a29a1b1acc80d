//! Ember VM Core Runtime
//!
//! This module provides the virtual machine runtime including:
//! - Bounded heap region and allocator
//! - Garbage collector (mark-compact or mark-sweep)
//! - Object model and type descriptors
//! - Register-based interpreter and the intrinsic print

pub mod defaults;
pub mod gc;
pub mod interpreter;
pub mod intrinsics;
pub mod object;
pub mod register_file;
pub mod types;
pub mod value;

pub use intrinsics::{PrintArg, Printer};
pub use register_file::{RegisterFile, RegisterFileStats};
pub use types::{ClassDescriptor, ClassId, FieldDescriptor, FieldKind, TypeRegistry};
pub use value::{Handle, Reference, Value};

/// VM execution errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    /// Allocation failed even after a full collection cycle
    #[error("Out of memory: cannot allocate {requested_bytes} bytes for {descriptor}")]
    OutOfMemory {
        /// Size of the failed request, header included
        requested_bytes: usize,
        /// Descriptor of the object or array being allocated
        descriptor: String,
    },

    /// Array index outside `[0, length)`
    #[error("Index out of bounds in {operation} on {descriptor}: index {index}, length {length}")]
    IndexOutOfBounds {
        /// Operation that indexed the array
        operation: &'static str,
        /// Descriptor of the array, e.g. `Node[]`
        descriptor: String,
        /// Requested index
        index: i64,
        /// Array length
        length: usize,
    },

    /// Field index outside the descriptor or slot-kind mismatch
    #[error("Invalid field access on {descriptor} at slot {index}: {reason}")]
    InvalidFieldAccess {
        /// Descriptor of the accessed object or array
        descriptor: String,
        /// Slot index used by the access
        index: usize,
        /// What was wrong with the access
        reason: String,
    },

    /// Dereference of a null reference
    #[error("Null pointer exception in {operation}")]
    NullPointer {
        /// Operation that dereferenced null
        operation: &'static str,
    },

    /// A handle that does not name an object in this heap
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The heap reservation could not be acquired
    #[error("Failed to reserve {0} bytes for the heap")]
    ReservationFailed(usize),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Register file exhausted
    #[error("Stack overflow")]
    StackOverflow,

    /// Invalid opcode
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Type error
    #[error("Type error: {0}")]
    TypeError(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// Module rejected by the bytecode verifier
    #[error("Invalid module: {0}")]
    InvalidModule(#[from] crate::bytecode::VerifyError),

    /// Error raised by an instruction, with its location
    #[error("{source} (in '{function}' at {offset})")]
    Trap {
        /// Function that was executing
        function: String,
        /// Code offset of the failing instruction
        offset: usize,
        /// The underlying error
        source: Box<VmError>,
    },
}

impl VmError {
    /// The error beneath any `Trap` location wrappers
    pub fn root_cause(&self) -> &VmError {
        match self {
            VmError::Trap { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
