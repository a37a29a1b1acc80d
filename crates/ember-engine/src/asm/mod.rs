//! Assembler for `.easm` sources
//!
//! ```text
//! .class Bar
//!     int a;
//! .class
//!
//! .func main regs=3
//!     newobj x0, Bar
//!     movi x1, 7
//!     stfield x0, Bar@a, x1
//!     ldfield x2, Bar@a, x0
//!     print x2
//!     ret
//! .end
//! ```
//!
//! Classes may reference each other in any order. Functions may call
//! functions defined later in the file. The function named `main` is the
//! entry point.

mod lexer;
mod parser;

pub use lexer::{tokenize, Spanned, Token};
pub use parser::assemble;

use crate::bytecode::VerifyError;

/// Assembly errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AsmError {
    /// Input that is not a token
    #[error("line {line}: unexpected input '{text}'")]
    Lex {
        /// Source line
        line: usize,
        /// Offending text
        text: String,
    },

    /// Malformed directive, declaration, or operand
    #[error("line {line}: {message}")]
    Syntax {
        /// Source line
        line: usize,
        /// What was wrong
        message: String,
    },

    /// Mnemonic that names no instruction
    #[error("line {line}: unknown instruction '{mnemonic}'")]
    UnknownInstruction {
        /// Source line
        line: usize,
        /// The mnemonic
        mnemonic: String,
    },

    /// Class, field, function, or label that was never defined
    #[error("line {line}: undefined {what} '{name}'")]
    Undefined {
        /// Source line
        line: usize,
        /// Kind of name
        what: &'static str,
        /// The name
        name: String,
    },

    /// Name defined twice
    #[error("line {line}: duplicate {what} '{name}'")]
    Duplicate {
        /// Source line of the second definition
        line: usize,
        /// Kind of name
        what: &'static str,
        /// The name
        name: String,
    },

    /// No function named `main`
    #[error("no 'main' function")]
    MissingMain,

    /// Assembled module rejected by the verifier
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
}

impl AsmError {
    /// Source line the error points at, if any
    pub fn line(&self) -> Option<usize> {
        match self {
            AsmError::Lex { line, .. }
            | AsmError::Syntax { line, .. }
            | AsmError::UnknownInstruction { line, .. }
            | AsmError::Undefined { line, .. }
            | AsmError::Duplicate { line, .. } => Some(*line),
            AsmError::MissingMain | AsmError::Verify(_) => None,
        }
    }
}
