//! Lexer for `.easm` sources
//!
//! Newlines are significant: every instruction, label, and directive ends
//! at the end of its line.

use super::AsmError;
use logos::Logos;

/// Assembly token
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"(#|//)[^\n]*")]
pub enum Token {
    /// End of line
    #[token("\n")]
    Newline,

    /// `,`
    #[token(",")]
    Comma,

    /// `:` after a label
    #[token(":")]
    Colon,

    /// `;` ending a field declaration
    #[token(";")]
    Semicolon,

    /// `@` in `Class@field`
    #[token("@")]
    At,

    /// `=` in `regs=N`
    #[token("=")]
    Equals,

    /// `.class`, `.func`, `.end`
    #[regex(r"\.[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Directive(String),

    /// `x0` .. `x255`; range is checked by the parser
    #[regex(r"x[0-9]+", parse_register, priority = 10)]
    Register(u32),

    /// Integer literal
    #[regex(r"-?[0-9]+", parse_int)]
    Int(i64),

    /// Float literal with optional exponent
    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", parse_float)]
    Float(f64),

    /// String literal in double or single quotes
    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    #[regex(r"'([^'\\\n]|\\.)*'", parse_string)]
    Str(String),

    /// Mnemonic, label, class, field or function name
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl Token {
    /// Short description for error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Newline => "end of line".to_string(),
            Token::Comma => "','".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Semicolon => "';'".to_string(),
            Token::At => "'@'".to_string(),
            Token::Equals => "'='".to_string(),
            Token::Directive(d) => format!("'.{}'", d),
            Token::Register(r) => format!("register x{}", r),
            Token::Int(v) => format!("integer {}", v),
            Token::Float(v) => format!("float {}", v),
            Token::Str(s) => format!("string {:?}", s),
            Token::Ident(s) => format!("'{}'", s),
        }
    }
}

fn parse_register(lex: &mut logos::Lexer<'_, Token>) -> Option<u32> {
    lex.slice()[1..].parse().ok()
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let s = lex.slice();
    unescape(&s[1..s.len() - 1])
}

fn unescape(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            'n' => result.push('\n'),
            't' => result.push('\t'),
            'r' => result.push('\r'),
            '0' => result.push('\0'),
            '\\' => result.push('\\'),
            '"' => result.push('"'),
            '\'' => result.push('\''),
            _ => return None,
        }
    }

    Some(result)
}

/// A token and the 1-based line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token
    pub token: Token,
    /// Source line
    pub line: usize,
}

/// Split `source` into tokens
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, AsmError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut line = 1;

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => {
                let is_newline = token == Token::Newline;
                tokens.push(Spanned { token, line });
                if is_newline {
                    line += 1;
                }
            }
            Err(()) => {
                return Err(AsmError::Lex {
                    line,
                    text: lexer.slice().to_string(),
                })
            }
        }
    }

    Ok(tokens)
}
