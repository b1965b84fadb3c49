//! Register and scratch effect summaries
//!
//! Each opcode's read and write sets over the two registers and the sixteen
//! scratch cells. The initialization, divisor-guard and packet-guard passes
//! all consume these summaries.
//!
//! Packet memory is deliberately absent: packet access is guarded by the
//! packet-guard pass and does not participate in read-before-write tracking.
//! `LoadMemShift` therefore reads nothing here even though it reads the
//! packet.

use crate::instruction::{Insn, Reg, SCRATCH_CELLS};

/// A set of registers and scratch cells
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemSet {
    /// Indexed by [`Reg`]
    pub regs: [bool; 2],
    pub scratch: [bool; SCRATCH_CELLS],
}

impl MemSet {
    pub fn reg(&self, reg: Reg) -> bool {
        self.regs[reg as usize]
    }

    /// Combine two sets cell by cell with `policy`.
    pub fn merge(self, other: MemSet, policy: impl Fn(bool, bool) -> bool) -> MemSet {
        let mut merged = MemSet::default();

        for i in 0..merged.regs.len() {
            merged.regs[i] = policy(self.regs[i], other.regs[i]);
        }

        for i in 0..merged.scratch.len() {
            merged.scratch[i] = policy(self.scratch[i], other.scratch[i]);
        }

        merged
    }

    /// Cells present in both sets
    pub fn and(self, other: MemSet) -> MemSet {
        self.merge(other, |a, b| a && b)
    }

    /// Cells present in either set
    pub fn or(self, other: MemSet) -> MemSet {
        self.merge(other, |a, b| a || b)
    }

    fn with_reg(mut self, reg: Reg) -> MemSet {
        self.regs[reg as usize] = true;
        self
    }

    fn with_scratch(mut self, n: usize) -> MemSet {
        if let Some(cell) = self.scratch.get_mut(n) {
            *cell = true;
        }
        self
    }
}

impl Insn {
    /// The registers and scratch cells this instruction reads.
    pub fn mem_reads(&self) -> MemSet {
        let set = MemSet::default();

        match *self {
            Insn::AluOpConstant { .. } => set.with_reg(Reg::A),
            Insn::AluOpX { .. } => set.with_reg(Reg::A).with_reg(Reg::X),

            Insn::JumpIf { .. } => set.with_reg(Reg::A),
            Insn::JumpIfX { .. } => set.with_reg(Reg::A).with_reg(Reg::X),

            Insn::LoadIndirect { .. } => set.with_reg(Reg::X),
            Insn::LoadScratch { n, .. } => set.with_scratch(n),

            Insn::NegateA => set.with_reg(Reg::A),

            Insn::RetA => set.with_reg(Reg::A),

            Insn::StoreScratch { src, .. } => set.with_reg(src),

            Insn::Tax => set.with_reg(Reg::A),
            Insn::Txa => set.with_reg(Reg::X),

            _ => set,
        }
    }

    /// The registers and scratch cells this instruction writes.
    pub fn mem_writes(&self) -> MemSet {
        let set = MemSet::default();

        match *self {
            Insn::AluOpConstant { .. } => set.with_reg(Reg::A),
            Insn::AluOpX { .. } => set.with_reg(Reg::A),

            Insn::LoadAbsolute { .. } => set.with_reg(Reg::A),
            Insn::LoadConstant { dst, .. } => set.with_reg(dst),
            Insn::LoadIndirect { .. } => set.with_reg(Reg::A),
            Insn::LoadMemShift { .. } => set.with_reg(Reg::X),
            Insn::LoadScratch { dst, .. } => set.with_reg(dst),

            Insn::NegateA => set.with_reg(Reg::A),

            Insn::StoreScratch { n, .. } => set.with_scratch(n),

            Insn::Tax => set.with_reg(Reg::X),
            Insn::Txa => set.with_reg(Reg::A),

            // Scratch initialization counts as a write so that re-running
            // the analysis over transformed output finds nothing new to do.
            Insn::InitializeScratch { n } => set.with_scratch(n),

            _ => set,
        }
    }
}
