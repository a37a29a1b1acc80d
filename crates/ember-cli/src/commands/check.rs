//! `ember check`: assemble and verify without running.

use super::load_module;
use crate::output::StyledOutput;
use std::path::Path;

pub fn execute(file: &Path, out: &mut StyledOutput) -> anyhow::Result<()> {
    let module = load_module(file)?;
    out.success(
        "ok:",
        &format!(
            "{} ({} classes, {} functions, {} constants, {} literals)",
            file.display(),
            module.registry.len(),
            module.functions.len(),
            module.constants.len(),
            module.literals.len()
        ),
    );
    Ok(())
}
