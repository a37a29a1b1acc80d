//! `ember run`: assemble a program and execute it on a fresh heap.

use super::load_module;
use crate::config::{self, Overrides};
use crate::output::StyledOutput;
use anyhow::Context;
use ember_engine::{RunReport, Vm};
use log::debug;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub struct RunArgs {
    pub file: PathBuf,
    pub heap_size: Option<String>,
    pub strategy: Option<String>,
    pub config: Option<PathBuf>,
    pub stats: bool,
}

pub fn execute(args: RunArgs, out: &mut StyledOutput) -> anyhow::Result<()> {
    let options = config::resolve(
        args.config.as_deref(),
        Overrides {
            heap_size: args.heap_size.as_deref(),
            strategy: args.strategy.as_deref(),
        },
    )?;
    debug!(
        "heap_size={} strategy={} max_registers={}",
        options.gc.heap_size, options.gc.strategy, options.max_registers
    );

    let module = load_module(&args.file)?;
    let mut vm = Vm::new(options)?;

    let result = {
        let mut stdout = BufWriter::new(std::io::stdout().lock());
        let result = vm.run(&module, &mut stdout);
        stdout.flush().context("failed to flush stdout")?;
        result
    };

    if args.stats {
        if let Some(report) = vm.last_run() {
            print_stats(out, vm.options().gc.strategy, report);
        }
    }

    result.with_context(|| format!("{} failed", args.file.display()))?;
    Ok(())
}

fn print_stats(out: &mut StyledOutput, strategy: ember_engine::GcStrategy, report: &RunReport) {
    out.heading("run");
    out.row("elapsed", format!("{:?}", report.elapsed));
    out.row("instructions", report.instructions);
    out.row("lines printed", report.lines_printed);
    out.row("peak registers", report.registers.peak);

    out.heading("gc");
    out.row("strategy", strategy);
    out.row("collections", report.gc.collections);
    out.row("objects freed", report.gc.objects_freed);
    out.row("bytes freed", report.gc.bytes_freed);
    out.row("live objects", report.gc.live_objects);
    out.row("live bytes", report.gc.live_bytes);
    out.row("out of memory", report.gc.out_of_memory_count);
    out.row("total pause", format!("{:?}", report.gc.total_pause_time));
    out.row("avg pause", format!("{:?}", report.gc.avg_pause_time));
    out.row("max pause", format!("{:?}", report.gc.max_pause_time));

    out.heading("heap");
    out.row("capacity", report.heap.capacity_bytes);
    out.row("allocated", report.heap.allocated_bytes);
    out.row("blocks", report.heap.allocation_count);
    out.row("top", report.heap.top_bytes);
    out.row("free lists", report.heap.free_list_bytes);
}
