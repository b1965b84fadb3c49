//! Zero initialization of memory read before it is written
//!
//! The verifier rejects reads of uninitialized registers and stack slots, so
//! anything the filter can read before writing on some path must be zeroed
//! at entry. One forward sweep suffices: the block list is a DAG in
//! topological order and the lattice is finite.

use std::collections::HashMap;

use log::debug;

use crate::cfg::{Block, BlockId};
use crate::effects::MemSet;
use crate::instruction::{Insn, PosInsn, Reg, SCRATCH_CELLS};

/// Zero initialize every register and scratch cell the program can read
/// before writing.
pub fn initialize_memory(blocks: &mut [Block]) {
    // Memory initialized at the start of each block
    let mut statuses: HashMap<BlockId, MemSet> = HashMap::new();

    // Uninitialized memory read so far, program wide
    let mut uninitialized = MemSet::default();

    for idx in 0..blocks.len() {
        let mut status = statuses
            .remove(&BlockId(idx as u32))
            .unwrap_or_default();

        for wrapped in &blocks[idx].insns {
            uninitialized = uninitialized.or(uninitialized_reads(&wrapped.insn, status));
            status = status.or(wrapped.insn.mem_writes());
        }

        // Memory must be initialized on every path into a successor
        let targets: Vec<BlockId> = blocks[idx].jumps.values().copied().collect();
        for target in targets {
            statuses
                .entry(target)
                .and_modify(|s| *s = s.and(status))
                .or_insert(status);
        }
    }

    // Prepend the zero inits to the entry block, registers in canonical
    // order first, then the scratch cells
    let mut inits = Vec::new();

    for reg in Reg::ALL {
        if uninitialized.reg(reg) {
            inits.push(PosInsn::pseudo(Insn::LoadConstant { dst: reg, val: 0 }));
        }
    }

    for n in 0..SCRATCH_CELLS {
        if uninitialized.scratch[n] {
            inits.push(PosInsn::pseudo(Insn::InitializeScratch { n }));
        }
    }

    if inits.is_empty() {
        return;
    }

    if let Some(entry) = blocks.first_mut() {
        debug!("zero initializing {} cells in {}", inits.len(), entry.label());
        entry.insns.splice(0..0, inits);
    }
}

/// Memory read by `insn` that `initialized` does not cover
fn uninitialized_reads(insn: &Insn, initialized: MemSet) -> MemSet {
    insn.mem_reads()
        .merge(initialized, |read, init| read && !init)
}
