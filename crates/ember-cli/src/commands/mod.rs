//! Subcommand implementations

pub mod check;
pub mod disasm;
pub mod run;

use anyhow::Context;
use ember_engine::Module;
use std::path::Path;

/// Read and assemble an `.easm` file
pub fn load_module(path: &Path) -> anyhow::Result<Module> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    ember_engine::assemble(&source).with_context(|| format!("{}", path.display()))
}
