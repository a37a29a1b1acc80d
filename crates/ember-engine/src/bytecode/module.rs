//! Loaded bytecode modules
//!
//! A [`Module`] is everything the interpreter needs to run a program: the
//! frozen class registry, constant and literal pools, and the functions.

use super::opcode::{InstrFormat, RegInstr, RegOpcode};
use crate::vm::types::{ClassId, FieldKind, TypeRegistry};
use crate::vm::value::Value;
use std::fmt;
use std::sync::Arc;

/// A compiled function
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Registers needed by one activation (params included)
    pub register_count: usize,
    /// Number of parameters, passed in `x0..x{param_count-1}`
    pub param_count: usize,
    /// Register instructions (32-bit words, extension words inline)
    pub code: Vec<u32>,
}

impl Function {
    /// Create a function
    pub fn new(name: impl Into<String>, register_count: usize, param_count: usize, code: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            register_count,
            param_count,
            code,
        }
    }

    /// Decoded instructions with their code offsets and extension words
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            code: &self.code,
            pc: 0,
        }
    }
}

/// Iterator over `(offset, instruction, extension word)`
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    code: &'a [u32],
    pc: usize,
}

impl Iterator for Instructions<'_> {
    type Item = (usize, RegInstr, Option<u32>);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.pc;
        let instr = RegInstr(*self.code.get(offset)?);
        self.pc += 1;
        let extra = match instr.opcode() {
            Some(op) if op.is_extended() => {
                let extra = self.code.get(self.pc).copied();
                self.pc += 1;
                extra
            }
            _ => None,
        };
        Some((offset, instr, extra))
    }
}

/// A program ready to run
#[derive(Debug, Clone)]
pub struct Module {
    /// Class descriptors, frozen at load time
    pub registry: Arc<TypeRegistry>,
    /// Numeric constant pool (`LOAD_CONST`)
    pub constants: Vec<Value>,
    /// Literal string pool (`PRINT_LIT`)
    pub literals: Vec<String>,
    /// Functions; `Call` extension words index into this
    pub functions: Vec<Function>,
    /// Index of the function run first
    pub entry: usize,
}

impl Module {
    /// Create an empty module over `registry`
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            constants: Vec::new(),
            literals: Vec::new(),
            functions: Vec::new(),
            entry: 0,
        }
    }

    /// The function run first
    pub fn entry_function(&self) -> Option<&Function> {
        self.functions.get(self.entry)
    }

    /// Index of the function named `name`
    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    /// `Class@field` for disassembly
    fn field_name(&self, class: u32, index: u8) -> String {
        match self.registry.get(ClassId(class)) {
            Some(desc) => match desc.fields.get(index as usize) {
                Some(field) => format!("{}@{}", desc.name, field.name),
                None => format!("{}@{}", desc.name, index),
            },
            None => format!("<class {}>@{}", class, index),
        }
    }

    fn fmt_instr(&self, f: &mut fmt::Formatter<'_>, instr: RegInstr, extra: Option<u32>, offset: usize) -> fmt::Result {
        let Some(op) = instr.opcode() else {
            return write!(f, "{}", instr);
        };
        let (a, b, c) = (instr.a(), instr.b(), instr.c());
        let name = op.name();
        let extra = extra.unwrap_or(u32::MAX);
        match op {
            RegOpcode::Nop | RegOpcode::ReturnVoid | RegOpcode::Halt => write!(f, "{}", name),
            RegOpcode::Move | RegOpcode::ArrayLen | RegOpcode::IsNull => {
                write!(f, "{} x{}, x{}", name, a, b)
            }
            RegOpcode::LoadNull | RegOpcode::Print | RegOpcode::Return => write!(f, "{} x{}", name, a),
            RegOpcode::LoadInt => write!(f, "{} x{}, {}", name, a, instr.sbx()),
            RegOpcode::LoadConst => match self.constants.get(instr.bx() as usize) {
                Some(value) => write!(f, "{} x{}, #{} ({})", name, a, instr.bx(), value),
                None => write!(f, "{} x{}, #{}", name, a, instr.bx()),
            },
            RegOpcode::Add
            | RegOpcode::Sub
            | RegOpcode::Mul
            | RegOpcode::Div
            | RegOpcode::Mod
            | RegOpcode::Lt
            | RegOpcode::Le
            | RegOpcode::Eq
            | RegOpcode::Ne => write!(f, "{} x{}, x{}, x{}", name, a, b, c),
            RegOpcode::Jump => write!(f, "{} -> {}", name, jump_target(offset, instr)),
            RegOpcode::JumpIf | RegOpcode::JumpIfNot | RegOpcode::JumpIfNull | RegOpcode::JumpIfNotNull => {
                write!(f, "{} x{} -> {}", name, a, jump_target(offset, instr))
            }
            RegOpcode::NewObject => {
                write!(f, "{} x{}, {}", name, a, self.registry.class_name(ClassId(extra)))
            }
            RegOpcode::NewArray => {
                write!(f, "{} x{}, {}[x{}]", name, a, self.registry.class_name(ClassId(extra)), b)
            }
            RegOpcode::LoadField => {
                write!(f, "{} x{}, x{}.{}", name, a, b, self.field_name(extra, c))
            }
            RegOpcode::StoreField => {
                write!(f, "{} x{}.{}, x{}", name, a, self.field_name(extra, b), c)
            }
            RegOpcode::LoadElem => write!(f, "{} x{}, x{}[x{}]", name, a, b, c),
            RegOpcode::StoreElem => write!(f, "{} x{}[x{}], x{}", name, a, b, c),
            RegOpcode::PrintLit => match self.literals.get(instr.bx() as usize) {
                Some(text) => write!(f, "{} {:?}", name, text),
                None => write!(f, "{} #{}", name, instr.bx()),
            },
            RegOpcode::Call => {
                let callee = self
                    .functions
                    .get(extra as usize)
                    .map_or("<unknown>", |func| func.name.as_str());
                write!(f, "{} x{}, {}(x{}, {})", name, a, callee, b, c)
            }
        }
    }
}

/// Absolute code offset a jump at `offset` lands on
pub(crate) fn jump_target(offset: usize, instr: RegInstr) -> i64 {
    offset as i64 + 1 + instr.sbx() as i64
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in self.registry.iter() {
            writeln!(f, ".class {}", class.name)?;
            for (i, field) in class.fields.iter().enumerate() {
                match field.kind {
                    FieldKind::Reference(Some(target)) => writeln!(
                        f,
                        "    [{}] class {} {};",
                        i,
                        self.registry.class_name(target),
                        field.name
                    )?,
                    kind => writeln!(f, "    [{}] {} {};", i, kind.name(), field.name)?,
                }
            }
            writeln!(f, ".class")?;
            writeln!(f)?;
        }

        for (index, function) in self.functions.iter().enumerate() {
            let marker = if index == self.entry { " (entry)" } else { "" };
            writeln!(
                f,
                ".func {} regs={} params={}{}",
                function.name, function.register_count, function.param_count, marker
            )?;
            for (offset, instr, extra) in function.instructions() {
                write!(f, "    {:04}  ", offset)?;
                self.fmt_instr(f, instr, extra, offset)?;
                writeln!(f)?;
            }
            writeln!(f, ".end")?;
            if index + 1 < self.functions.len() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Bytecode verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Invalid opcode
    #[error("{function}@{offset}: invalid opcode {opcode:#04x}")]
    InvalidOpcode {
        /// Function name
        function: String,
        /// Code offset
        offset: usize,
        /// The invalid opcode byte
        opcode: u8,
    },

    /// Extended instruction without its extension word
    #[error("{function}@{offset}: truncated instruction")]
    Truncated {
        /// Function name
        function: String,
        /// Code offset
        offset: usize,
    },

    /// Register outside the frame
    #[error("{function}@{offset}: register x{register} outside frame of {count}")]
    InvalidRegister {
        /// Function name
        function: String,
        /// Code offset
        offset: usize,
        /// Register index
        register: usize,
        /// Frame size
        count: usize,
    },

    /// Jump outside the function or into an extension word
    #[error("{function}@{offset}: invalid jump target {target}")]
    InvalidJumpTarget {
        /// Function name
        function: String,
        /// Code offset
        offset: usize,
        /// Resolved target
        target: i64,
    },

    /// Pool index, class id, or function id out of range
    #[error("{function}@{offset}: {what} {index} out of range")]
    InvalidIndex {
        /// Function name
        function: String,
        /// Code offset
        offset: usize,
        /// Kind of index
        what: &'static str,
        /// The index
        index: usize,
    },

    /// Call with the wrong number of arguments
    #[error("{function}@{offset}: {callee} expects {expected} arguments, got {found}")]
    ArgumentCount {
        /// Function name
        function: String,
        /// Code offset
        offset: usize,
        /// Called function
        callee: String,
        /// Declared parameters
        expected: usize,
        /// Arguments passed
        found: usize,
    },

    /// Execution can run past the last instruction
    #[error("{0}: execution falls off the end of the function")]
    FallOffEnd(String),

    /// Structural problem with the module
    #[error("{0}")]
    Module(String),
}

impl Module {
    /// Check every function for malformed instructions
    ///
    /// A verified module never makes the interpreter index outside a frame,
    /// a pool, or the function table.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let entry = self
            .entry_function()
            .ok_or_else(|| VerifyError::Module(format!("entry function {} does not exist", self.entry)))?;
        if entry.param_count != 0 {
            return Err(VerifyError::Module(format!(
                "entry function '{}' must not take parameters",
                entry.name
            )));
        }
        for function in &self.functions {
            self.verify_function(function)?;
        }
        Ok(())
    }

    fn verify_function(&self, function: &Function) -> Result<(), VerifyError> {
        let name = || function.name.clone();
        if function.param_count > function.register_count {
            return Err(VerifyError::Module(format!(
                "function '{}' has {} params but only {} registers",
                function.name, function.param_count, function.register_count
            )));
        }

        let mut boundaries = vec![false; function.code.len()];
        let mut jumps = Vec::new();
        let mut last = None;

        for (offset, instr, extra) in function.instructions() {
            boundaries[offset] = true;
            let op = instr.opcode().ok_or_else(|| VerifyError::InvalidOpcode {
                function: name(),
                offset,
                opcode: instr.opcode_byte(),
            })?;
            let extra = match (op.is_extended(), extra) {
                (true, None) => return Err(VerifyError::Truncated { function: name(), offset }),
                (_, extra) => extra.unwrap_or(0) as usize,
            };
            last = Some(op);

            let check_reg = |register: u8| {
                if (register as usize) < function.register_count {
                    Ok(())
                } else {
                    Err(VerifyError::InvalidRegister {
                        function: name(),
                        offset,
                        register: register as usize,
                        count: function.register_count,
                    })
                }
            };
            let check_index = |what: &'static str, index: usize, len: usize| {
                if index < len {
                    Ok(())
                } else {
                    Err(VerifyError::InvalidIndex {
                        function: name(),
                        offset,
                        what,
                        index,
                    })
                }
            };

            let (a, b, c) = (instr.a(), instr.b(), instr.c());
            match op {
                RegOpcode::Nop | RegOpcode::ReturnVoid | RegOpcode::Halt | RegOpcode::Jump => {}
                RegOpcode::LoadNull | RegOpcode::LoadInt | RegOpcode::Print | RegOpcode::Return => {
                    check_reg(a)?
                }
                RegOpcode::JumpIf | RegOpcode::JumpIfNot | RegOpcode::JumpIfNull | RegOpcode::JumpIfNotNull => {
                    check_reg(a)?
                }
                RegOpcode::Move | RegOpcode::ArrayLen | RegOpcode::IsNull => {
                    check_reg(a)?;
                    check_reg(b)?;
                }
                RegOpcode::LoadField => {
                    check_reg(a)?;
                    check_reg(b)?;
                    check_index("class", extra, self.registry.len())?;
                    check_index("field", c as usize, self.registry.get(ClassId(extra as u32)).map_or(0, |d| d.field_count()))?;
                }
                RegOpcode::StoreField => {
                    check_reg(a)?;
                    check_reg(c)?;
                    check_index("class", extra, self.registry.len())?;
                    check_index("field", b as usize, self.registry.get(ClassId(extra as u32)).map_or(0, |d| d.field_count()))?;
                }
                RegOpcode::Add
                | RegOpcode::Sub
                | RegOpcode::Mul
                | RegOpcode::Div
                | RegOpcode::Mod
                | RegOpcode::Lt
                | RegOpcode::Le
                | RegOpcode::Eq
                | RegOpcode::Ne
                | RegOpcode::LoadElem
                | RegOpcode::StoreElem => {
                    check_reg(a)?;
                    check_reg(b)?;
                    check_reg(c)?;
                }
                RegOpcode::LoadConst => {
                    check_reg(a)?;
                    check_index("constant", instr.bx() as usize, self.constants.len())?;
                }
                RegOpcode::PrintLit => {
                    check_index("literal", instr.bx() as usize, self.literals.len())?;
                }
                RegOpcode::NewObject => {
                    check_reg(a)?;
                    check_index("class", extra, self.registry.len())?;
                }
                RegOpcode::NewArray => {
                    check_reg(a)?;
                    check_reg(b)?;
                    check_index("class", extra, self.registry.len())?;
                }
                RegOpcode::Call => {
                    check_reg(a)?;
                    check_index("function", extra, self.functions.len())?;
                    let callee = &self.functions[extra];
                    if c as usize != callee.param_count {
                        return Err(VerifyError::ArgumentCount {
                            function: name(),
                            offset,
                            callee: callee.name.clone(),
                            expected: callee.param_count,
                            found: c as usize,
                        });
                    }
                    if c > 0 {
                        check_reg(b)?;
                        if b as usize + c as usize > function.register_count {
                            return Err(VerifyError::InvalidRegister {
                                function: name(),
                                offset,
                                register: b as usize + c as usize - 1,
                                count: function.register_count,
                            });
                        }
                    }
                }
            }

            if op.format() == InstrFormat::AsBx && op.is_jump() {
                jumps.push((offset, jump_target(offset, instr)));
            }
        }

        for (offset, target) in jumps {
            let valid = usize::try_from(target)
                .ok()
                .and_then(|t| boundaries.get(t).copied())
                .unwrap_or(false);
            if !valid {
                return Err(VerifyError::InvalidJumpTarget {
                    function: name(),
                    offset,
                    target,
                });
            }
        }

        match last {
            Some(op) if op.is_terminator() => Ok(()),
            _ => Err(VerifyError::FallOffEnd(name())),
        }
    }
}
