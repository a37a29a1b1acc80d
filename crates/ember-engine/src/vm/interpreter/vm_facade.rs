//! Top-level VM entry point
//!
//! `Vm` ties a verified module to a fresh heap sized by `VmOptions` and runs
//! it. The heap lives for one run; its statistics stay readable afterwards.

use super::core::Interpreter;
use crate::bytecode::Module;
use crate::vm::defaults::DEFAULT_MAX_REGISTERS;
use crate::vm::gc::{GarbageCollector, GcConfig, GcStats, HeapStats};
use crate::vm::register_file::RegisterFileStats;
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};
use log::info;
use serde::Deserialize;
use std::io::Write;
use std::time::{Duration, Instant};

/// Options for creating a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmOptions {
    /// Heap ceiling and collection strategy
    pub gc: GcConfig,

    /// Register file capacity shared by all frames
    pub max_registers: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            gc: GcConfig::default(),
            max_registers: DEFAULT_MAX_REGISTERS,
        }
    }
}

impl VmOptions {
    /// Check that the options can back a VM
    pub fn validate(&self) -> VmResult<()> {
        self.gc.validate()?;
        if self.max_registers == 0 {
            return Err(VmError::InvalidConfig(
                "max_registers must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What happened during the last run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Collector statistics
    pub gc: GcStats,
    /// Heap occupancy when the program stopped
    pub heap: HeapStats,
    /// Register file usage
    pub registers: RegisterFileStats,
    /// Instructions dispatched
    pub instructions: u64,
    /// Lines written by the print intrinsic
    pub lines_printed: usize,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

/// Virtual machine
///
/// # Example
///
/// ```rust,ignore
/// let module = ember_engine::assemble(source)?;
/// let mut vm = Vm::new(VmOptions::default())?;
/// vm.run(&module, &mut std::io::stdout())?;
/// println!("{} collections", vm.last_run().unwrap().gc.collections);
/// ```
#[derive(Debug)]
pub struct Vm {
    options: VmOptions,
    last_run: Option<RunReport>,
}

impl Vm {
    /// Create a VM, rejecting unusable options
    pub fn new(options: VmOptions) -> VmResult<Self> {
        options.validate()?;
        Ok(Self {
            options,
            last_run: None,
        })
    }

    /// Verify and run `module`, writing printed lines to `out`
    ///
    /// Each run gets its own heap. A report is recorded even when the
    /// program fails, as long as it started executing.
    pub fn run(&mut self, module: &Module, out: &mut dyn Write) -> VmResult<Value> {
        module.verify()?;

        let mut gc = GarbageCollector::new(self.options.gc, module.registry.clone())?;
        let start = Instant::now();
        let (result, instructions, registers, lines_printed) = {
            let mut interpreter = Interpreter::new(module, &mut gc, out, self.options.max_registers);
            let result = interpreter.run();
            (
                result,
                interpreter.instructions_executed(),
                interpreter.register_stats(),
                interpreter.lines_printed(),
            )
        };
        let elapsed = start.elapsed();

        let report = RunReport {
            gc: gc.stats().clone(),
            heap: gc.heap_stats(),
            registers,
            instructions,
            lines_printed,
            elapsed,
        };
        info!(
            "Run finished in {:?}: {} instructions, {} collections, {} objects freed",
            elapsed, report.instructions, report.gc.collections, report.gc.objects_freed
        );
        self.last_run = Some(report);
        result
    }

    /// Report of the most recent run
    pub fn last_run(&self) -> Option<&RunReport> {
        self.last_run.as_ref()
    }

    /// Options the VM was created with
    pub fn options(&self) -> &VmOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Function, RegBytecodeWriter, RegOpcode};
    use crate::vm::gc::GcStrategy;
    use crate::vm::types::{FieldDescriptor, TypeRegistryBuilder};
    use std::sync::Arc;

    fn node_module(iterations: i16) -> Module {
        let mut builder = TypeRegistryBuilder::new();
        let node = builder.declare_class("Node").unwrap();
        builder
            .define_fields(
                node,
                vec![FieldDescriptor::int("value"), FieldDescriptor::reference("next", node)],
            )
            .unwrap();
        let mut module = Module::new(Arc::new(builder.build()));

        // x0 = counter, x1 = limit, x2 = one, x3 = object, x4 = flag
        let mut w = RegBytecodeWriter::new();
        w.emit_asbx(RegOpcode::LoadInt, 0, 0);
        w.emit_asbx(RegOpcode::LoadInt, 1, iterations);
        w.emit_asbx(RegOpcode::LoadInt, 2, 1);
        let loop_start = w.position();
        w.emit_abcx(RegOpcode::NewObject, 3, 0, 0, node.0);
        w.emit_abcx(RegOpcode::StoreField, 3, 0, 0, node.0);
        w.emit_abc(RegOpcode::Add, 0, 0, 2);
        w.emit_abc(RegOpcode::Lt, 4, 0, 1);
        let jump = w.position();
        w.emit_asbx(RegOpcode::JumpIf, 4, 0);
        w.patch_sbx(jump, (loop_start as i64 - jump as i64 - 1) as i16);
        w.emit_abcx(RegOpcode::LoadField, 0, 3, 0, node.0);
        w.emit_abc(RegOpcode::Print, 0, 0, 0);
        w.emit_abc(RegOpcode::Return, 0, 0, 0);

        module.functions.push(Function::new("main", 5, 0, w.finish()));
        module
    }

    #[test]
    fn test_run_reports_stats() {
        let module = node_module(1000);
        let options = VmOptions {
            gc: GcConfig::with_heap_size(4096),
            ..VmOptions::default()
        };
        let mut vm = Vm::new(options).unwrap();
        let mut out = Vec::new();

        let result = vm.run(&module, &mut out).unwrap();
        assert_eq!(result, Value::int(999));
        assert_eq!(String::from_utf8(out).unwrap(), "999\n");

        let report = vm.last_run().unwrap();
        assert!(report.gc.collections > 0);
        assert_eq!(report.lines_printed, 1);
        assert!(report.instructions > 5000);
    }

    #[test]
    fn test_sweep_strategy_runs() {
        let module = node_module(1000);
        let options = VmOptions {
            gc: GcConfig {
                heap_size: 4096,
                strategy: GcStrategy::Sweep,
            },
            ..VmOptions::default()
        };
        let mut vm = Vm::new(options).unwrap();
        let mut out = Vec::new();
        assert_eq!(vm.run(&module, &mut out).unwrap(), Value::int(999));
        assert!(vm.last_run().unwrap().gc.collections > 0);
    }

    #[test]
    fn test_rejects_invalid_options() {
        let options = VmOptions {
            max_registers: 0,
            ..VmOptions::default()
        };
        assert!(matches!(Vm::new(options), Err(VmError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unverified_module() {
        let module = Module::new(Arc::new(TypeRegistryBuilder::new().build()));
        let mut vm = Vm::new(VmOptions::default()).unwrap();
        let err = vm.run(&module, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, VmError::InvalidModule(_)));
        assert!(vm.last_run().is_none());
    }

    #[test]
    fn test_trap_location() {
        let module = {
            let mut module = Module::new(Arc::new(TypeRegistryBuilder::new().build()));
            let mut w = RegBytecodeWriter::new();
            w.emit_asbx(RegOpcode::LoadInt, 0, 1);
            w.emit_asbx(RegOpcode::LoadInt, 1, 0);
            w.emit_abc(RegOpcode::Div, 0, 0, 1);
            w.emit_abc(RegOpcode::Return, 0, 0, 0);
            module.functions.push(Function::new("main", 2, 0, w.finish()));
            module
        };
        let mut vm = Vm::new(VmOptions::default()).unwrap();
        let err = vm.run(&module, &mut Vec::new()).unwrap_err();

        match &err {
            VmError::Trap { function, offset, .. } => {
                assert_eq!(function, "main");
                assert_eq!(*offset, 2);
            }
            other => panic!("expected a trap, got {:?}", other),
        }
        assert!(matches!(err.root_cause(), VmError::RuntimeError(_)));
    }
}
