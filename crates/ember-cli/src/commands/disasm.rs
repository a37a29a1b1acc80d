//! `ember disasm`: print the assembled bytecode.

use super::load_module;
use std::io::Write;
use std::path::Path;

pub fn execute(file: &Path) -> anyhow::Result<()> {
    let module = load_module(file)?;
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", module)?;
    stdout.flush()?;
    Ok(())
}
