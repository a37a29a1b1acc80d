//! Two-pass assembler
//!
//! The first pass splits the source into class and function blocks and
//! registers every class and function name. The second pass encodes each
//! function body, resolving labels once the whole body has been seen.

use super::lexer::{tokenize, Spanned, Token};
use super::AsmError;
use crate::bytecode::{Function, Module, RegBytecodeWriter, RegOpcode};
use crate::vm::types::{ClassId, FieldDescriptor, TypeRegistry, TypeRegistryBuilder};
use crate::vm::value::Value;
use log::debug;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Name of the entry function
const ENTRY_FUNCTION: &str = "main";

/// Largest register index encodable in an operand
const MAX_REGISTER: u32 = u8::MAX as u32;

/// Assemble `.easm` source into a verified module
pub fn assemble(source: &str) -> Result<Module, AsmError> {
    let lines = split_lines(tokenize(source)?);
    let (classes, functions) = scan(&lines)?;
    let registry = Arc::new(build_registry(&classes)?);

    let mut signatures = FxHashMap::default();
    for (index, decl) in functions.iter().enumerate() {
        let signature = Signature {
            index,
            params: decl.params,
        };
        if signatures.insert(decl.name.clone(), signature).is_some() {
            return Err(AsmError::Duplicate {
                line: decl.line,
                what: "function",
                name: decl.name.clone(),
            });
        }
    }
    let entry = signatures
        .get(ENTRY_FUNCTION)
        .map(|s| s.index)
        .ok_or(AsmError::MissingMain)?;

    let mut pools = Pools::default();
    let mut compiled = Vec::with_capacity(functions.len());
    for decl in &functions {
        let assembler = FunctionAssembler::new(&registry, &signatures, &mut pools, decl.regs);
        compiled.push(assembler.assemble(decl)?);
    }

    let mut module = Module::new(registry);
    module.constants = pools.constants;
    module.literals = pools.literals;
    module.functions = compiled;
    module.entry = entry;
    module.verify()?;

    debug!(
        "Assembled {} classes, {} functions, {} constants, {} literals",
        module.registry.len(),
        module.functions.len(),
        module.constants.len(),
        module.literals.len()
    );
    Ok(module)
}

// ============================================================================
// Lines and operand cursor
// ============================================================================

/// Non-empty source line
#[derive(Debug)]
struct Line {
    number: usize,
    tokens: Vec<Token>,
}

fn split_lines(tokens: Vec<Spanned>) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current = Line {
        number: 0,
        tokens: Vec::new(),
    };

    for Spanned { token, line } in tokens {
        if token == Token::Newline {
            if !current.tokens.is_empty() {
                lines.push(std::mem::replace(
                    &mut current,
                    Line {
                        number: 0,
                        tokens: Vec::new(),
                    },
                ));
            }
            continue;
        }
        if current.tokens.is_empty() {
            current.number = line;
        }
        current.tokens.push(token);
    }
    if !current.tokens.is_empty() {
        lines.push(current);
    }
    lines
}

struct Cursor<'l> {
    tokens: &'l [Token],
    pos: usize,
    line: usize,
}

impl<'l> Cursor<'l> {
    fn new(line: &'l Line) -> Self {
        Self {
            tokens: &line.tokens,
            pos: 0,
            line: line.number,
        }
    }

    fn peek(&self) -> Option<&'l Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&'l Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, message: impl Into<String>) -> AsmError {
        AsmError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn expected(&self, what: &str) -> AsmError {
        match self.peek() {
            Some(token) => self.error(format!("expected {}, found {}", what, token.describe())),
            None => self.error(format!("expected {} before end of line", what)),
        }
    }

    fn expect_end(&self) -> Result<(), AsmError> {
        match self.peek() {
            Some(token) => Err(self.error(format!("unexpected {}", token.describe()))),
            None => Ok(()),
        }
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), AsmError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.expected(&expected.describe()))
        }
    }

    fn comma(&mut self) -> Result<(), AsmError> {
        self.expect(&Token::Comma)
    }

    fn ident(&mut self, what: &str) -> Result<&'l str, AsmError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.expected(what)),
        }
    }

    /// A declared name; `x1` lexes as a register but is a valid field name
    fn name(&mut self, what: &str) -> Result<String, AsmError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            Some(Token::Register(r)) => {
                self.pos += 1;
                Ok(format!("x{}", r))
            }
            _ => Err(self.expected(what)),
        }
    }

    fn count(&mut self, what: &str) -> Result<usize, AsmError> {
        match self.peek() {
            Some(Token::Int(v)) if *v >= 0 => {
                self.pos += 1;
                Ok(*v as usize)
            }
            _ => Err(self.expected(what)),
        }
    }
}

// ============================================================================
// Pass 1: blocks, classes, and function headers
// ============================================================================

#[derive(Debug)]
enum FieldType {
    Int,
    Double,
    Class(String),
}

#[derive(Debug)]
struct FieldDecl {
    line: usize,
    name: String,
    ty: FieldType,
}

#[derive(Debug)]
struct ClassDecl {
    line: usize,
    name: String,
    fields: Vec<FieldDecl>,
}

#[derive(Debug)]
struct FunctionDecl<'l> {
    line: usize,
    name: String,
    regs: Option<usize>,
    params: usize,
    body: &'l [Line],
}

fn directive(line: &Line) -> Option<&str> {
    match line.tokens.first() {
        Some(Token::Directive(name)) => Some(name.as_str()),
        _ => None,
    }
}

fn scan(lines: &[Line]) -> Result<(Vec<ClassDecl>, Vec<FunctionDecl<'_>>), AsmError> {
    let mut classes = Vec::new();
    let mut functions = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        match directive(line) {
            Some("class") => {
                let mut cursor = Cursor::new(line);
                cursor.pos = 1;
                let name = cursor.ident("class name")?.to_string();
                cursor.expect_end()?;

                let mut decl = ClassDecl {
                    line: line.number,
                    name,
                    fields: Vec::new(),
                };
                i += 1;
                loop {
                    let Some(body) = lines.get(i) else {
                        return Err(AsmError::Syntax {
                            line: line.number,
                            message: format!("class '{}' is never closed", decl.name),
                        });
                    };
                    i += 1;
                    // A bare `.class` or `.end` closes the block
                    if matches!(directive(body), Some("class" | "end")) && body.tokens.len() == 1 {
                        break;
                    }
                    parse_fields(body, &mut decl.fields)?;
                }
                classes.push(decl);
            }
            Some("func") => {
                let mut decl = parse_function_header(line)?;
                let start = i + 1;
                let end = lines[start..]
                    .iter()
                    .position(|l| directive(l) == Some("end"))
                    .map(|offset| start + offset)
                    .ok_or_else(|| AsmError::Syntax {
                        line: line.number,
                        message: format!("function '{}' is never closed with '.end'", decl.name),
                    })?;
                let mut closing = Cursor::new(&lines[end]);
                closing.pos = 1;
                closing.expect_end()?;
                if let Some(nested) = lines[start..end].iter().find(|l| directive(l).is_some()) {
                    return Err(AsmError::Syntax {
                        line: nested.number,
                        message: format!("directive inside function '{}'", decl.name),
                    });
                }
                decl.body = &lines[start..end];
                functions.push(decl);
                i = end + 1;
            }
            _ => {
                return Err(AsmError::Syntax {
                    line: line.number,
                    message: "expected '.class' or '.func' at top level".to_string(),
                })
            }
        }
    }

    Ok((classes, functions))
}

/// `int a;`, `double b;`, or `class Foo c;`, several per line allowed
fn parse_fields(line: &Line, fields: &mut Vec<FieldDecl>) -> Result<(), AsmError> {
    let mut cursor = Cursor::new(line);
    while !cursor.at_end() {
        if cursor.eat(&Token::Semicolon) {
            continue;
        }
        let ty = match cursor.ident("field type")? {
            "int" => FieldType::Int,
            "double" => FieldType::Double,
            "class" => FieldType::Class(cursor.ident("class name")?.to_string()),
            other => {
                return Err(cursor.error(format!(
                    "unknown field type '{}' (expected int, double, or class)",
                    other
                )))
            }
        };
        let name = cursor.name("field name")?;
        if !cursor.at_end() {
            cursor.expect(&Token::Semicolon)?;
        }
        fields.push(FieldDecl {
            line: line.number,
            name,
            ty,
        });
    }
    Ok(())
}

/// `.func name [regs=N] [params=M]`
fn parse_function_header(line: &Line) -> Result<FunctionDecl<'_>, AsmError> {
    let mut cursor = Cursor::new(line);
    cursor.pos = 1;
    let name = cursor.ident("function name")?.to_string();
    let mut regs = None;
    let mut params = 0;

    while !cursor.at_end() {
        match cursor.ident("'regs=' or 'params='")? {
            "regs" => {
                cursor.expect(&Token::Equals)?;
                let count = cursor.count("register count")?;
                if count > MAX_REGISTER as usize + 1 {
                    return Err(cursor.error(format!("at most {} registers per frame", MAX_REGISTER + 1)));
                }
                regs = Some(count);
            }
            "params" => {
                cursor.expect(&Token::Equals)?;
                params = cursor.count("parameter count")?;
                if params > u8::MAX as usize {
                    return Err(cursor.error(format!("at most {} parameters", u8::MAX)));
                }
            }
            other => return Err(cursor.error(format!("unknown function attribute '{}'", other))),
        }
    }

    Ok(FunctionDecl {
        line: line.number,
        name,
        regs,
        params,
        body: &[],
    })
}

fn build_registry(classes: &[ClassDecl]) -> Result<TypeRegistry, AsmError> {
    let mut builder = TypeRegistryBuilder::new();
    let mut ids = Vec::with_capacity(classes.len());

    for class in classes {
        let id = builder.declare_class(&class.name).map_err(|e| {
            if builder.lookup(&class.name).is_some() {
                AsmError::Duplicate {
                    line: class.line,
                    what: "class",
                    name: class.name.clone(),
                }
            } else {
                AsmError::Syntax {
                    line: class.line,
                    message: e.to_string(),
                }
            }
        })?;
        ids.push(id);
    }

    for (class, id) in classes.iter().zip(ids) {
        let mut fields = Vec::with_capacity(class.fields.len());
        for field in &class.fields {
            let descriptor = match &field.ty {
                FieldType::Int => FieldDescriptor::int(field.name.as_str()),
                FieldType::Double => FieldDescriptor::double(field.name.as_str()),
                FieldType::Class(target) => {
                    let target = builder.lookup(target).ok_or_else(|| AsmError::Undefined {
                        line: field.line,
                        what: "class",
                        name: target.clone(),
                    })?;
                    FieldDescriptor::reference(field.name.as_str(), target)
                }
            };
            if fields.iter().any(|f: &FieldDescriptor| f.name == descriptor.name) {
                return Err(AsmError::Duplicate {
                    line: field.line,
                    what: "field",
                    name: format!("{}@{}", class.name, field.name),
                });
            }
            fields.push(descriptor);
        }
        if fields.len() > u8::MAX as usize + 1 {
            return Err(AsmError::Syntax {
                line: class.line,
                message: format!("class '{}' has more than {} fields", class.name, u8::MAX as usize + 1),
            });
        }
        builder.define_fields(id, fields).map_err(|e| AsmError::Syntax {
            line: class.line,
            message: e.to_string(),
        })?;
    }

    Ok(builder.build())
}

// ============================================================================
// Pass 2: function bodies
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Signature {
    index: usize,
    params: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstantKey {
    Int(i64),
    Double(u64),
}

/// Module-wide constant and literal pools, deduplicated
#[derive(Debug, Default)]
struct Pools {
    constants: Vec<Value>,
    constant_index: FxHashMap<ConstantKey, u16>,
    literals: Vec<String>,
    literal_index: FxHashMap<String, u16>,
}

impl Pools {
    fn constant(&mut self, value: Value, line: usize) -> Result<u16, AsmError> {
        let key = match value {
            Value::Int(v) => ConstantKey::Int(v),
            Value::Double(v) => ConstantKey::Double(v.to_bits()),
            Value::Ref(_) => {
                return Err(AsmError::Syntax {
                    line,
                    message: "references cannot be constants".to_string(),
                })
            }
        };
        if let Some(&index) = self.constant_index.get(&key) {
            return Ok(index);
        }
        let index = u16::try_from(self.constants.len()).map_err(|_| AsmError::Syntax {
            line,
            message: "constant pool is full".to_string(),
        })?;
        self.constants.push(value);
        self.constant_index.insert(key, index);
        Ok(index)
    }

    fn literal(&mut self, text: &str, line: usize) -> Result<u16, AsmError> {
        if let Some(&index) = self.literal_index.get(text) {
            return Ok(index);
        }
        let index = u16::try_from(self.literals.len()).map_err(|_| AsmError::Syntax {
            line,
            message: "literal pool is full".to_string(),
        })?;
        self.literals.push(text.to_string());
        self.literal_index.insert(text.to_string(), index);
        Ok(index)
    }
}

/// Jump whose offset is patched once its label is known
struct Fixup {
    pos: usize,
    label: String,
    line: usize,
}

struct FunctionAssembler<'a> {
    registry: &'a TypeRegistry,
    signatures: &'a FxHashMap<String, Signature>,
    pools: &'a mut Pools,
    writer: RegBytecodeWriter,
    labels: FxHashMap<String, usize>,
    fixups: Vec<Fixup>,
    /// Declared frame size, if the header gave one
    frame_size: Option<usize>,
    /// Highest register used so far
    max_register: Option<u8>,
}

impl<'a> FunctionAssembler<'a> {
    fn new(
        registry: &'a TypeRegistry,
        signatures: &'a FxHashMap<String, Signature>,
        pools: &'a mut Pools,
        frame_size: Option<usize>,
    ) -> Self {
        Self {
            registry,
            signatures,
            pools,
            writer: RegBytecodeWriter::new(),
            labels: FxHashMap::default(),
            fixups: Vec::new(),
            frame_size,
            max_register: None,
        }
    }

    fn assemble(mut self, decl: &FunctionDecl<'_>) -> Result<Function, AsmError> {
        for line in decl.body {
            let mut cursor = Cursor::new(line);

            while let (Some(Token::Ident(label)), Some(Token::Colon)) = (cursor.peek(), cursor.peek_at(1)) {
                if self.labels.insert(label.clone(), self.writer.position()).is_some() {
                    return Err(AsmError::Duplicate {
                        line: line.number,
                        what: "label",
                        name: label.clone(),
                    });
                }
                cursor.pos += 2;
            }
            if cursor.at_end() {
                continue;
            }

            let mnemonic = cursor.ident("instruction")?;
            self.instruction(mnemonic, &mut cursor)?;
            cursor.expect_end()?;
        }

        self.resolve_fixups()?;

        let used = self.max_register.map_or(0, |r| r as usize + 1);
        let register_count = self.frame_size.unwrap_or(used).max(decl.params);
        Ok(Function::new(
            decl.name.as_str(),
            register_count,
            decl.params,
            self.writer.finish(),
        ))
    }

    fn resolve_fixups(&mut self) -> Result<(), AsmError> {
        for fixup in std::mem::take(&mut self.fixups) {
            let target = *self.labels.get(&fixup.label).ok_or_else(|| AsmError::Undefined {
                line: fixup.line,
                what: "label",
                name: fixup.label.clone(),
            })?;
            let offset = target as i64 - (fixup.pos as i64 + 1);
            let offset = i16::try_from(offset).map_err(|_| AsmError::Syntax {
                line: fixup.line,
                message: format!("jump to '{}' is out of range", fixup.label),
            })?;
            self.writer.patch_sbx(fixup.pos, offset);
        }
        Ok(())
    }

    fn instruction(&mut self, mnemonic: &str, c: &mut Cursor<'_>) -> Result<(), AsmError> {
        use RegOpcode::*;

        match mnemonic {
            "nop" => {
                self.writer.emit_abc(Nop, 0, 0, 0);
            }
            "mov" => {
                let (a, b) = self.two_registers(c)?;
                self.writer.emit_abc(Move, a, b, 0);
            }
            "movi" => {
                let a = self.register(c)?;
                c.comma()?;
                match c.peek() {
                    Some(Token::Int(v)) => match i16::try_from(*v) {
                        Ok(small) => {
                            self.writer.emit_asbx(LoadInt, a, small);
                        }
                        Err(_) => {
                            let index = self.pools.constant(Value::int(*v), c.line)?;
                            self.writer.emit_abx(LoadConst, a, index);
                        }
                    },
                    Some(Token::Float(v)) => {
                        let index = self.pools.constant(Value::double(*v), c.line)?;
                        self.writer.emit_abx(LoadConst, a, index);
                    }
                    _ => return Err(c.expected("a number")),
                }
                c.pos += 1;
            }
            "null" => {
                let a = self.register(c)?;
                self.writer.emit_abc(LoadNull, a, 0, 0);
            }
            "add" | "sub" | "mul" | "div" | "mod" | "lt" | "le" | "eq" | "ne" => {
                let op = match mnemonic {
                    "add" => Add,
                    "sub" => Sub,
                    "mul" => Mul,
                    "div" => Div,
                    "mod" => Mod,
                    "lt" => Lt,
                    "le" => Le,
                    "eq" => Eq,
                    _ => Ne,
                };
                let (a, b, cc) = self.three_registers(c)?;
                self.writer.emit_abc(op, a, b, cc);
            }
            // a > b is b < a
            "gt" | "ge" => {
                let op = if mnemonic == "gt" { Lt } else { Le };
                let (a, b, cc) = self.three_registers(c)?;
                self.writer.emit_abc(op, a, cc, b);
            }
            "jmp" => {
                let label = c.ident("label")?;
                self.jump(Jump, 0, label, c.line);
            }
            "jmp_if" | "jmp_ifnot" | "jmp_null" | "jmp_nonnull" => {
                let op = match mnemonic {
                    "jmp_if" => JumpIf,
                    "jmp_ifnot" => JumpIfNot,
                    "jmp_null" => JumpIfNull,
                    _ => JumpIfNotNull,
                };
                let a = self.register(c)?;
                c.comma()?;
                let label = c.ident("label")?;
                self.jump(op, a, label, c.line);
            }
            "newobj" => {
                let a = self.register(c)?;
                c.comma()?;
                let class = self.class(c)?;
                self.writer.emit_abcx(NewObject, a, 0, 0, class.0);
            }
            "newarr" => {
                let a = self.register(c)?;
                c.comma()?;
                let class = self.class(c)?;
                c.comma()?;
                let length = self.register(c)?;
                self.writer.emit_abcx(NewArray, a, length, 0, class.0);
            }
            "ldfield" => {
                let dest = self.register(c)?;
                c.comma()?;
                let (class, field) = self.field(c)?;
                c.comma()?;
                let object = self.register(c)?;
                self.writer.emit_abcx(LoadField, dest, object, field, class.0);
            }
            "stfield" => {
                let object = self.register(c)?;
                c.comma()?;
                let (class, field) = self.field(c)?;
                c.comma()?;
                let value = self.register(c)?;
                self.writer.emit_abcx(StoreField, object, field, value, class.0);
            }
            "ldelem" => {
                let (dest, array, index) = self.three_registers(c)?;
                self.writer.emit_abc(LoadElem, dest, array, index);
            }
            "stelem" => {
                let (array, index, value) = self.three_registers(c)?;
                self.writer.emit_abc(StoreElem, array, index, value);
            }
            "len" => {
                let (a, b) = self.two_registers(c)?;
                self.writer.emit_abc(ArrayLen, a, b, 0);
            }
            "isnull" => {
                let (a, b) = self.two_registers(c)?;
                self.writer.emit_abc(IsNull, a, b, 0);
            }
            "print" => {
                let a = self.register(c)?;
                self.writer.emit_abc(Print, a, 0, 0);
            }
            "prints" => {
                let text = match c.peek() {
                    Some(Token::Str(text)) => text,
                    _ => return Err(c.expected("a string literal")),
                };
                c.pos += 1;
                let index = self.pools.literal(text, c.line)?;
                self.writer.emit_abx(PrintLit, 0, index);
            }
            "call" => self.call(c)?,
            "ret" => {
                if c.at_end() {
                    self.writer.emit_abc(ReturnVoid, 0, 0, 0);
                } else {
                    let a = self.register(c)?;
                    self.writer.emit_abc(Return, a, 0, 0);
                }
            }
            "halt" => {
                self.writer.emit_abc(Halt, 0, 0, 0);
            }
            other => {
                return Err(AsmError::UnknownInstruction {
                    line: c.line,
                    mnemonic: other.to_string(),
                })
            }
        }
        Ok(())
    }

    /// `call xA, name` or `call xA, name, xB, N` (arguments in xB .. xB+N)
    fn call(&mut self, c: &mut Cursor<'_>) -> Result<(), AsmError> {
        let dest = self.register(c)?;
        c.comma()?;
        let name = c.ident("function name")?;
        let signature = *self.signatures.get(name).ok_or_else(|| AsmError::Undefined {
            line: c.line,
            what: "function",
            name: name.to_string(),
        })?;

        let (arg_base, arg_count) = if c.eat(&Token::Comma) {
            let base = self.register(c)?;
            c.comma()?;
            let count = c.count("argument count")?;
            if count > 0 {
                // The whole argument window must be addressable
                let last = base as usize + count - 1;
                self.check_register(u32::try_from(last).unwrap_or(u32::MAX), c)?;
            }
            (base, count)
        } else {
            (0, 0)
        };

        if arg_count != signature.params {
            return Err(c.error(format!(
                "'{}' takes {} arguments, {} given",
                name, signature.params, arg_count
            )));
        }
        self.writer
            .emit_abcx(RegOpcode::Call, dest, arg_base, arg_count as u8, signature.index as u32);
        Ok(())
    }

    fn jump(&mut self, op: RegOpcode, a: u8, label: &str, line: usize) {
        let pos = self.writer.emit_asbx(op, a, 0);
        self.fixups.push(Fixup {
            pos,
            label: label.to_string(),
            line,
        });
    }

    fn register(&mut self, c: &mut Cursor<'_>) -> Result<u8, AsmError> {
        match c.peek() {
            Some(Token::Register(r)) => {
                let r = *r;
                c.pos += 1;
                self.check_register(r, c)
            }
            _ => Err(c.expected("a register")),
        }
    }

    fn check_register(&mut self, r: u32, c: &Cursor<'_>) -> Result<u8, AsmError> {
        if r > MAX_REGISTER {
            return Err(c.error(format!("register x{} out of range (x0..x{})", r, MAX_REGISTER)));
        }
        if let Some(size) = self.frame_size {
            if r as usize >= size {
                return Err(c.error(format!("register x{} outside a frame of {} registers", r, size)));
            }
        }
        let r = r as u8;
        self.max_register = Some(self.max_register.map_or(r, |max| max.max(r)));
        Ok(r)
    }

    fn two_registers(&mut self, c: &mut Cursor<'_>) -> Result<(u8, u8), AsmError> {
        let a = self.register(c)?;
        c.comma()?;
        let b = self.register(c)?;
        Ok((a, b))
    }

    fn three_registers(&mut self, c: &mut Cursor<'_>) -> Result<(u8, u8, u8), AsmError> {
        let (a, b) = self.two_registers(c)?;
        c.comma()?;
        let cc = self.register(c)?;
        Ok((a, b, cc))
    }

    fn class(&mut self, c: &mut Cursor<'_>) -> Result<ClassId, AsmError> {
        let name = c.ident("class name")?;
        self.registry.lookup(name).ok_or_else(|| AsmError::Undefined {
            line: c.line,
            what: "class",
            name: name.to_string(),
        })
    }

    /// `Class@field`, resolved to the class id and slot index
    fn field(&mut self, c: &mut Cursor<'_>) -> Result<(ClassId, u8), AsmError> {
        let class = self.class(c)?;
        c.expect(&Token::At)?;
        let name = c.name("field name")?;
        let index = self
            .registry
            .get(class)
            .and_then(|descriptor| descriptor.field_index(&name))
            .ok_or_else(|| AsmError::Undefined {
                line: c.line,
                what: "field",
                name: format!("{}@{}", self.registry.class_name(class), name),
            })?;
        Ok((class, index as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::RegInstr;
    use crate::vm::types::FieldKind;

    #[test]
    fn test_classes_with_forward_reference() {
        let module = assemble(
            r#"
            .class Foo
                int x;
                class Bar y;
            .class

            .class Bar
                int a;
            .class

            .func main
                ret
            .end
            "#,
        )
        .unwrap();

        let registry = &module.registry;
        let foo = registry.lookup("Foo").unwrap();
        let bar = registry.lookup("Bar").unwrap();
        let descriptor = registry.get(foo).unwrap();
        assert_eq!(descriptor.field_count(), 2);
        assert_eq!(descriptor.field_kind(1), Some(FieldKind::Reference(Some(bar))));
    }

    #[test]
    fn test_register_count_inferred() {
        let module = assemble(
            r#"
            .func main
                movi x0, 1
                movi x4, 2
                add x2, x0, x4
                ret x2
            .end
            "#,
        )
        .unwrap();
        assert_eq!(module.functions[0].register_count, 5);
    }

    #[test]
    fn test_constants_deduplicated() {
        let module = assemble(
            r#"
            .func main regs=3
                movi x0, 40000
                movi x1, 40000
                movi x2, 1.5
                prints 'a'
                prints "a"
                movi x0, 7
                ret
            .end
            "#,
        )
        .unwrap();
        assert_eq!(module.constants, vec![Value::int(40000), Value::double(1.5)]);
        assert_eq!(module.literals, vec!["a".to_string()]);
    }

    #[test]
    fn test_labels_resolve_both_directions() {
        let module = assemble(
            r#"
            .func main regs=2
                movi x0, 0
                jmp check
            body:
                movi x1, 1
                add x0, x0, x1
            check:
                movi x1, 3
                lt x1, x0, x1
                jmp_if x1, body
                ret x0
            .end
            "#,
        )
        .unwrap();
        assert!(module.verify().is_ok());
    }

    #[test]
    fn test_entry_is_main() {
        let module = assemble(
            r#"
            .func helper params=1
                ret x0
            .end
            .func main regs=2
                movi x1, 5
                call x0, helper, x1, 1
                ret x0
            .end
            "#,
        )
        .unwrap();
        assert_eq!(module.entry, 1);
        assert_eq!(module.functions[0].register_count, 1);

        // call x0, helper, x1, 1 encodes as Call A=0 B=1 C=1 plus the callee index
        let code = &module.functions[1].code;
        let call = RegInstr(code[1]);
        assert_eq!(call.opcode(), Some(RegOpcode::Call));
        assert_eq!((call.a(), call.b(), call.c()), (0, 1, 1));
        assert_eq!(code[2], 0);
    }

    #[test]
    fn test_missing_main() {
        let err = assemble(".func helper\n ret\n.end\n").unwrap_err();
        assert_eq!(err, AsmError::MissingMain);
    }

    #[test]
    fn test_unknown_instruction_line() {
        let err = assemble(".func main\n  nop\n  frobnicate x0\n  ret\n.end\n").unwrap_err();
        assert_eq!(
            err,
            AsmError::UnknownInstruction {
                line: 3,
                mnemonic: "frobnicate".to_string()
            }
        );
    }

    #[test]
    fn test_undefined_names() {
        let err = assemble(".func main\n  newobj x0, Nope\n  ret\n.end\n").unwrap_err();
        assert!(matches!(err, AsmError::Undefined { what: "class", line: 2, .. }));

        let err = assemble(".class A\n int a;\n.class\n.func main\n  ldfield x0, A@b, x1\n  ret\n.end\n")
            .unwrap_err();
        assert!(matches!(err, AsmError::Undefined { what: "field", line: 5, .. }));

        let err = assemble(".func main\n  jmp nowhere\n.end\n").unwrap_err();
        assert!(matches!(err, AsmError::Undefined { what: "label", line: 2, .. }));
    }

    #[test]
    fn test_duplicates() {
        let err = assemble(".class A\n.class\n.class A\n.class\n.func main\n ret\n.end\n").unwrap_err();
        assert!(matches!(err, AsmError::Duplicate { what: "class", line: 3, .. }));

        let err = assemble(".class A\n int a; int a;\n.class\n.func main\n ret\n.end\n").unwrap_err();
        assert!(matches!(err, AsmError::Duplicate { what: "field", line: 2, .. }));
    }

    #[test]
    fn test_register_outside_declared_frame() {
        let err = assemble(".func main regs=2\n  movi x2, 1\n  ret\n.end\n").unwrap_err();
        assert!(matches!(err, AsmError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_call_arity_checked() {
        let err = assemble(
            ".func f params=2\n ret\n.end\n.func main regs=2\n call x0, f, x0, 1\n ret\n.end\n",
        )
        .unwrap_err();
        assert!(matches!(err, AsmError::Syntax { line: 5, .. }));
    }

    #[test]
    fn test_unclosed_blocks() {
        assert!(assemble(".class A\n int a;\n").is_err());
        assert!(assemble(".func main\n ret\n").is_err());
    }

    #[test]
    fn test_fall_off_end_rejected() {
        let err = assemble(".func main\n nop\n.end\n").unwrap_err();
        assert!(matches!(err, AsmError::Verify(_)));
    }
}
