//! Instruction set
//!
//! Every instruction is one 32-bit word in one of three layouts:
//! - ABC:  [opcode:8][A:8][B:8][C:8]       moves, arithmetic, element access
//! - ABx:  [opcode:8][A:8][Bx:16]          constant and literal pools
//! - AsBx: [opcode:8][A:8][sBx:16 signed]  jumps, small ints
//!
//! Instructions that name a class or function are followed by one more word:
//! - ABCx: [opcode:8][A:8][B:8][C:8] + [extra:32] allocation, fields, calls

/// Opcodes
///
/// Register operands are 8-bit indices into the current frame (`x0`..`x255`).
/// Jump offsets are relative to the instruction after the jump.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegOpcode {
    // ===== Constants & Moves (0x00-0x0F) =====
    /// Does nothing
    Nop = 0x00,
    /// rA = rB
    Move = 0x01,
    /// rA = Null
    LoadNull = 0x02,
    /// rA = sBx as int
    LoadInt = 0x03,
    /// rA = constants[Bx]
    LoadConst = 0x04,

    // ===== Arithmetic (0x10-0x1F) =====
    /// rA = rB + rC
    Add = 0x10,
    /// rA = rB - rC
    Sub = 0x11,
    /// rA = rB * rC
    Mul = 0x12,
    /// rA = rB / rC (int division by zero traps)
    Div = 0x13,
    /// rA = remainder of rB / rC
    Mod = 0x14,

    // ===== Comparison (0x20-0x2F) =====
    /// rA = (rB < rC) as int
    Lt = 0x20,
    /// rA = (rB <= rC) as int
    Le = 0x21,
    /// rA = (rB == rC) as int (numbers by value, references by identity)
    Eq = 0x22,
    /// rA = (rB != rC) as int
    Ne = 0x23,

    // ===== Control Flow (0x30-0x3F) =====
    /// pc += sBx
    Jump = 0x30,
    /// if rA is truthy: pc += sBx
    JumpIf = 0x31,
    /// if rA is falsy: pc += sBx
    JumpIfNot = 0x32,
    /// if rA is null: pc += sBx
    JumpIfNull = 0x33,
    /// if rA is not null: pc += sBx
    JumpIfNotNull = 0x34,

    // ===== Objects & Arrays (0x40-0x4F) =====
    /// rA = new class(extra)
    NewObject = 0x40,
    /// rA = new class(extra)[rB]
    NewArray = 0x41,
    /// rA = rB.field[C]; extra = class id of rB
    LoadField = 0x42,
    /// rA.field[B] = rC; extra = class id of rA
    StoreField = 0x43,
    /// rA = element rC of array rB
    LoadElem = 0x44,
    /// element rB of array rA = rC
    StoreElem = 0x45,
    /// rA = rB.length
    ArrayLen = 0x46,
    /// rA = (rB == null) as int
    IsNull = 0x47,

    // ===== Intrinsics (0x50-0x5F) =====
    /// print rA
    Print = 0x50,
    /// print literals[Bx]
    PrintLit = 0x51,

    // ===== Calls (0x60-0x6F) =====
    /// rA = functions[extra](rB, ..., rB+C-1)
    Call = 0x60,
    /// return rA
    Return = 0x61,
    /// return (no value)
    ReturnVoid = 0x62,
    /// Stop the program
    Halt = 0x63,
}

/// Instruction format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrFormat {
    /// [opcode:8][A:8][B:8][C:8]
    ABC,
    /// [opcode:8][A:8][Bx:16]
    ABx,
    /// [opcode:8][A:8][sBx:16 signed]
    AsBx,
    /// [opcode:8][A:8][B:8][C:8] + [extra:32]
    ABCx,
}

impl RegOpcode {
    /// Every opcode, in encoding order
    pub const ALL: [RegOpcode; 33] = [
        Self::Nop,
        Self::Move,
        Self::LoadNull,
        Self::LoadInt,
        Self::LoadConst,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Mod,
        Self::Lt,
        Self::Le,
        Self::Eq,
        Self::Ne,
        Self::Jump,
        Self::JumpIf,
        Self::JumpIfNot,
        Self::JumpIfNull,
        Self::JumpIfNotNull,
        Self::NewObject,
        Self::NewArray,
        Self::LoadField,
        Self::StoreField,
        Self::LoadElem,
        Self::StoreElem,
        Self::ArrayLen,
        Self::IsNull,
        Self::Print,
        Self::PrintLit,
        Self::Call,
        Self::Return,
        Self::ReturnVoid,
        Self::Halt,
    ];

    /// Decode an opcode byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Move),
            0x02 => Some(Self::LoadNull),
            0x03 => Some(Self::LoadInt),
            0x04 => Some(Self::LoadConst),

            0x10 => Some(Self::Add),
            0x11 => Some(Self::Sub),
            0x12 => Some(Self::Mul),
            0x13 => Some(Self::Div),
            0x14 => Some(Self::Mod),

            0x20 => Some(Self::Lt),
            0x21 => Some(Self::Le),
            0x22 => Some(Self::Eq),
            0x23 => Some(Self::Ne),

            0x30 => Some(Self::Jump),
            0x31 => Some(Self::JumpIf),
            0x32 => Some(Self::JumpIfNot),
            0x33 => Some(Self::JumpIfNull),
            0x34 => Some(Self::JumpIfNotNull),

            0x40 => Some(Self::NewObject),
            0x41 => Some(Self::NewArray),
            0x42 => Some(Self::LoadField),
            0x43 => Some(Self::StoreField),
            0x44 => Some(Self::LoadElem),
            0x45 => Some(Self::StoreElem),
            0x46 => Some(Self::ArrayLen),
            0x47 => Some(Self::IsNull),

            0x50 => Some(Self::Print),
            0x51 => Some(Self::PrintLit),

            0x60 => Some(Self::Call),
            0x61 => Some(Self::Return),
            0x62 => Some(Self::ReturnVoid),
            0x63 => Some(Self::Halt),

            _ => None,
        }
    }

    /// Operand layout
    pub fn format(self) -> InstrFormat {
        match self {
            Self::LoadConst | Self::PrintLit => InstrFormat::ABx,

            Self::LoadInt
            | Self::Jump
            | Self::JumpIf
            | Self::JumpIfNot
            | Self::JumpIfNull
            | Self::JumpIfNotNull => InstrFormat::AsBx,

            Self::NewObject
            | Self::NewArray
            | Self::LoadField
            | Self::StoreField
            | Self::Call => InstrFormat::ABCx,

            _ => InstrFormat::ABC,
        }
    }

    /// Followed by an extension word
    #[inline]
    pub fn is_extended(self) -> bool {
        self.format() == InstrFormat::ABCx
    }

    /// Number of code words the instruction occupies
    #[inline]
    pub fn width(self) -> usize {
        if self.is_extended() {
            2
        } else {
            1
        }
    }

    /// Disassembly name
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Move => "MOVE",
            Self::LoadNull => "LOAD_NULL",
            Self::LoadInt => "LOAD_INT",
            Self::LoadConst => "LOAD_CONST",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Jump => "JUMP",
            Self::JumpIf => "JUMP_IF",
            Self::JumpIfNot => "JUMP_IF_NOT",
            Self::JumpIfNull => "JUMP_IF_NULL",
            Self::JumpIfNotNull => "JUMP_IF_NOT_NULL",
            Self::NewObject => "NEW_OBJECT",
            Self::NewArray => "NEW_ARRAY",
            Self::LoadField => "LOAD_FIELD",
            Self::StoreField => "STORE_FIELD",
            Self::LoadElem => "LOAD_ELEM",
            Self::StoreElem => "STORE_ELEM",
            Self::ArrayLen => "ARRAY_LEN",
            Self::IsNull => "IS_NULL",
            Self::Print => "PRINT",
            Self::PrintLit => "PRINT_LIT",
            Self::Call => "CALL",
            Self::Return => "RETURN",
            Self::ReturnVoid => "RETURN_VOID",
            Self::Halt => "HALT",
        }
    }

    /// Branches by `sBx`
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jump | Self::JumpIf | Self::JumpIfNot | Self::JumpIfNull | Self::JumpIfNotNull
        )
    }

    /// May allocate, and therefore collect
    pub fn allocates(self) -> bool {
        matches!(self, Self::NewObject | Self::NewArray)
    }

    /// Leaves the current function
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::Jump | Self::Return | Self::ReturnVoid | Self::Halt)
    }
}

// ============================================================================
// Instruction words
// ============================================================================

/// One encoded instruction
///
/// The opcode is always the top byte and `A` the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegInstr(pub u32);

impl RegInstr {
    /// `A`, `B`, `C` operands
    #[inline]
    pub fn abc(op: RegOpcode, a: u8, b: u8, c: u8) -> Self {
        Self((op as u32) << 24 | (a as u32) << 16 | (b as u32) << 8 | (c as u32))
    }

    /// `A` plus an unsigned 16-bit pool index
    #[inline]
    pub fn abx(op: RegOpcode, a: u8, bx: u16) -> Self {
        Self((op as u32) << 24 | (a as u32) << 16 | (bx as u32))
    }

    /// `sBx` is stored as its two's-complement low 16 bits
    #[inline]
    pub fn asbx(op: RegOpcode, a: u8, sbx: i16) -> Self {
        Self((op as u32) << 24 | (a as u32) << 16 | (sbx as u16 as u32))
    }

    /// Top byte, which may not be a valid opcode
    #[inline]
    pub fn opcode_byte(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Decoded opcode, `None` for an unknown byte
    #[inline]
    pub fn opcode(self) -> Option<RegOpcode> {
        RegOpcode::from_u8(self.opcode_byte())
    }

    /// First register operand
    #[inline]
    pub fn a(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Second register operand
    #[inline]
    pub fn b(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Third register operand
    #[inline]
    pub fn c(self) -> u8 {
        self.0 as u8
    }

    /// Pool index operand
    #[inline]
    pub fn bx(self) -> u16 {
        self.0 as u16
    }

    /// Signed jump offset or small int
    #[inline]
    pub fn sbx(self) -> i16 {
        self.0 as u16 as i16
    }

    /// Encoded word
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Wrap an encoded word
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for RegInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self.opcode() {
            Some(op) => op,
            None => return write!(f, "UNKNOWN(0x{:02X})", self.opcode_byte()),
        };
        match op.format() {
            InstrFormat::ABC | InstrFormat::ABCx => {
                write!(f, "{} x{}, x{}, x{}", op.name(), self.a(), self.b(), self.c())
            }
            InstrFormat::ABx => write!(f, "{} x{}, {}", op.name(), self.a(), self.bx()),
            InstrFormat::AsBx => write!(f, "{} x{}, {}", op.name(), self.a(), self.sbx()),
        }
    }
}

// ============================================================================
// Code emission
// ============================================================================

/// Appends instruction words to a growing code vector
#[derive(Debug, Default)]
pub struct RegBytecodeWriter {
    code: Vec<u32>,
}

impl RegBytecodeWriter {
    /// Empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Each `emit_*` returns the offset of the emitted instruction
    #[inline]
    pub fn emit_abc(&mut self, op: RegOpcode, a: u8, b: u8, c: u8) -> usize {
        let pos = self.code.len();
        self.code.push(RegInstr::abc(op, a, b, c).raw());
        pos
    }

    /// `A` plus pool index
    #[inline]
    pub fn emit_abx(&mut self, op: RegOpcode, a: u8, bx: u16) -> usize {
        let pos = self.code.len();
        self.code.push(RegInstr::abx(op, a, bx).raw());
        pos
    }

    /// `A` plus signed offset
    #[inline]
    pub fn emit_asbx(&mut self, op: RegOpcode, a: u8, sbx: i16) -> usize {
        let pos = self.code.len();
        self.code.push(RegInstr::asbx(op, a, sbx).raw());
        pos
    }

    /// Instruction word plus its extension word
    #[inline]
    pub fn emit_abcx(&mut self, op: RegOpcode, a: u8, b: u8, c: u8, extra: u32) -> usize {
        let pos = self.code.len();
        self.code.push(RegInstr::abc(op, a, b, c).raw());
        self.code.push(extra);
        pos
    }

    /// Offset the next instruction will get
    #[inline]
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Rewrite the jump offset of the instruction at `pos`
    pub fn patch_sbx(&mut self, pos: usize, sbx: i16) {
        let existing = self.code[pos];
        self.code[pos] = (existing & 0xFFFF_0000) | (sbx as u16 as u32);
    }

    /// Finished code
    pub fn finish(self) -> Vec<u32> {
        self.code
    }
}
