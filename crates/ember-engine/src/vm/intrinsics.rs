//! Intrinsic print
//!
//! The only output operation the VM exposes. It never touches the managed
//! heap: arguments are numbers or literals from the module's literal pool.

use std::fmt;
use std::io::{self, Write};

/// Argument to the print intrinsic
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrintArg<'a> {
    /// Integer, printed in decimal
    Int(i64),
    /// Float, printed with `Display`
    Double(f64),
    /// Literal string from the literal pool
    Literal(&'a str),
}

impl fmt::Display for PrintArg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintArg::Int(v) => write!(f, "{}", v),
            PrintArg::Double(v) => write!(f, "{}", v),
            PrintArg::Literal(s) => f.write_str(s),
        }
    }
}

/// Line-oriented sink for the print intrinsic
pub struct Printer<W: Write> {
    out: W,
    lines: usize,
}

impl<W: Write> Printer<W> {
    /// Wrap an output stream
    pub fn new(out: W) -> Self {
        Self { out, lines: 0 }
    }

    /// Write `arg` followed by a newline
    pub fn print(&mut self, arg: PrintArg<'_>) -> io::Result<()> {
        writeln!(self.out, "{}", arg)?;
        self.lines += 1;
        Ok(())
    }

    /// Number of lines written so far
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Flush the underlying stream
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Unwrap the output stream
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_lines() {
        let mut printer = Printer::new(Vec::new());
        printer.print(PrintArg::Int(-42)).unwrap();
        printer.print(PrintArg::Double(1.5)).unwrap();
        printer.print(PrintArg::Literal("done")).unwrap();

        assert_eq!(printer.lines(), 3);
        assert_eq!(String::from_utf8(printer.into_inner()).unwrap(), "-42\n1.5\ndone\n");
    }
}
