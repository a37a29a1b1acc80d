//! Register file for the interpreter
//!
//! Every activation owns a window `[reg_base, reg_base + register_count)`
//! of one growable value array. The register file doubles as the
//! interpreter's root set: every register below `top` is handed to the
//! collector, so a reference parked in any live frame survives collection
//! and is rewritten if its object moves.
//!
//! Frames stack upward: the caller's window sits directly below the
//! callee's, and a call copies arguments into the bottom of the new window.

use crate::vm::defaults::DEFAULT_MAX_REGISTERS;
use crate::vm::gc::RootProvider;
use crate::vm::value::{Reference, Value};
use crate::vm::{VmError, VmResult};

/// Register windows of every live frame
#[derive(Debug)]
pub struct RegisterFile {
    registers: Vec<Value>,
    /// One past the last register of the innermost frame
    top: usize,
    /// Ceiling on `top`; exceeding it is a stack overflow
    max_size: usize,
    peak: usize,
}

impl RegisterFile {
    /// Register file with the default ceiling
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_REGISTERS)
    }

    /// Register file holding at most `max_size` values
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            registers: Vec::with_capacity(256.min(max_size)),
            top: 0,
            max_size,
            peak: 0,
        }
    }

    /// Push a window of `count` null registers and return its base
    pub fn alloc_frame(&mut self, count: usize) -> VmResult<usize> {
        let base = self.top;
        let new_top = base.checked_add(count).ok_or(VmError::StackOverflow)?;
        if new_top > self.max_size {
            return Err(VmError::StackOverflow);
        }
        if new_top > self.registers.len() {
            self.registers.resize(new_top, Value::null());
        }
        // Stale values from a popped frame must not become roots again
        self.registers[base..new_top].fill(Value::null());
        self.top = new_top;
        self.peak = self.peak.max(new_top);
        Ok(base)
    }

    /// Pop the innermost window, which starts at `base`
    #[inline]
    pub fn free_frame(&mut self, base: usize) {
        debug_assert!(base <= self.top);
        self.top = base;
    }

    /// Read `x{offset}` of the frame at `reg_base`
    #[inline]
    pub fn get_reg(&self, reg_base: usize, offset: u8) -> VmResult<Value> {
        let index = reg_base + offset as usize;
        if index < self.top {
            Ok(self.registers[index])
        } else {
            Err(self.out_of_frame(reg_base, offset))
        }
    }

    /// Write `x{offset}` of the frame at `reg_base`
    #[inline]
    pub fn set_reg(&mut self, reg_base: usize, offset: u8, value: Value) -> VmResult<()> {
        let index = reg_base + offset as usize;
        if index < self.top {
            self.registers[index] = value;
            Ok(())
        } else {
            Err(self.out_of_frame(reg_base, offset))
        }
    }

    /// Copy a run of registers between windows (call arguments)
    pub fn copy_regs(&mut self, src_base: usize, dst_base: usize, count: usize) -> VmResult<()> {
        let src_end = src_base + count;
        let dst_end = dst_base + count;
        if src_end > self.top || dst_end > self.top {
            return Err(VmError::RuntimeError(format!(
                "argument copy [{}..{}] -> [{}..{}] outside live registers (top {})",
                src_base, src_end, dst_base, dst_end, self.top
            )));
        }
        self.registers.copy_within(src_base..src_end, dst_base);
        Ok(())
    }

    /// Registers in use by all live frames
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    /// Ceiling given at construction
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// No frame is live
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    /// Usage snapshot
    pub fn stats(&self) -> RegisterFileStats {
        RegisterFileStats {
            top: self.top,
            peak: self.peak,
            max_size: self.max_size,
        }
    }

    fn out_of_frame(&self, reg_base: usize, offset: u8) -> VmError {
        VmError::RuntimeError(format!(
            "register x{} is outside the frame at {} (top {})",
            offset, reg_base, self.top
        ))
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RootProvider for RegisterFile {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        self.registers[..self.top].visit_roots(visitor);
    }
}

/// Register file usage
#[derive(Debug, Clone, Copy)]
pub struct RegisterFileStats {
    /// Registers in use when the snapshot was taken
    pub top: usize,
    /// Deepest point reached
    pub peak: usize,
    /// Ceiling
    pub max_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::value::Handle;

    #[test]
    fn test_new_register_file() {
        let rf = RegisterFile::new();
        assert_eq!(rf.top(), 0);
        assert!(rf.is_empty());
        assert_eq!(rf.max_size(), DEFAULT_MAX_REGISTERS);
    }

    #[test]
    fn test_alloc_and_free_frame() {
        let mut rf = RegisterFile::new();

        let base = rf.alloc_frame(4).unwrap();
        assert_eq!(base, 0);
        assert_eq!(rf.top(), 4);

        let base2 = rf.alloc_frame(3).unwrap();
        assert_eq!(base2, 4);
        assert_eq!(rf.top(), 7);

        rf.free_frame(base2);
        assert_eq!(rf.top(), 4);
        assert_eq!(rf.stats().peak, 7);
    }

    #[test]
    fn test_get_set_reg() {
        let mut rf = RegisterFile::new();
        let base = rf.alloc_frame(4).unwrap();

        assert!(rf.get_reg(base, 0).unwrap().is_null());
        rf.set_reg(base, 2, Value::int(42)).unwrap();
        assert_eq!(rf.get_reg(base, 2).unwrap(), Value::int(42));

        assert!(rf.get_reg(base, 4).is_err());
        assert!(rf.set_reg(base, 200, Value::null()).is_err());
    }

    #[test]
    fn test_reused_frame_is_nulled() {
        let mut rf = RegisterFile::new();
        let base = rf.alloc_frame(2).unwrap();
        rf.set_reg(base, 1, Value::int(7)).unwrap();
        rf.free_frame(base);

        let base = rf.alloc_frame(2).unwrap();
        assert!(rf.get_reg(base, 1).unwrap().is_null());
    }

    #[test]
    fn test_stack_overflow() {
        let mut rf = RegisterFile::with_max_size(10);
        rf.alloc_frame(8).unwrap();
        assert_eq!(rf.alloc_frame(3), Err(VmError::StackOverflow));
    }

    #[test]
    fn test_copy_regs() {
        let mut rf = RegisterFile::new();
        let base = rf.alloc_frame(4).unwrap();
        rf.set_reg(base, 0, Value::int(1)).unwrap();
        rf.set_reg(base, 1, Value::int(2)).unwrap();
        rf.copy_regs(base, base + 2, 2).unwrap();
        assert_eq!(rf.get_reg(base, 3).unwrap(), Value::int(2));
        assert!(rf.copy_regs(base, base + 3, 2).is_err());
    }

    #[test]
    fn test_roots_cover_live_frames_only() {
        let mut rf = RegisterFile::new();
        let outer = rf.alloc_frame(2).unwrap();
        rf.set_reg(outer, 0, Value::from(Handle::from_index(0))).unwrap();
        let inner = rf.alloc_frame(2).unwrap();
        rf.set_reg(inner, 1, Value::from(Handle::from_index(8))).unwrap();
        rf.set_reg(inner, 0, Value::int(3)).unwrap();

        let mut seen = Vec::new();
        rf.visit_roots(&mut |r| seen.push(*r));
        assert_eq!(seen.len(), 3);

        rf.free_frame(inner);
        let mut seen = Vec::new();
        rf.visit_roots(&mut |r| seen.push(*r));
        assert_eq!(seen, vec![Reference::Handle(Handle::from_index(0)), Reference::Null]);
    }
}
