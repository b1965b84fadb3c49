//! Packet bounds guards
//!
//! The verifier requires packet accesses to be dominated by an explicit
//! length check, so every block's loads must be covered by a guard at least
//! as long as the furthest byte they touch. Walking the DAG forward, the
//! guard known to be in effect at a block's entry is the weakest one among
//! its predecessors' exits; a new guard is inserted only when the block
//! demands more than that.
//!
//! Absolute and indirect loads are tracked separately: indirect guards are
//! relative to X, so writing X invalidates them and splits the block into
//! sub-runs.

use std::collections::HashMap;

use log::debug;

use crate::cfg::{Block, BlockId};
use crate::instruction::{Insn, Reg};

/// Add absolute and indirect packet guards as required.
pub fn add_packet_guards(blocks: &mut [Block]) {
    if blocks.is_empty() {
        return;
    }

    // Least guard length in effect at the start of each block
    let mut absolute: HashMap<BlockId, u32> = HashMap::new();
    let mut indirect: HashMap<BlockId, u32> = HashMap::new();

    // The entry block starts with no guards
    absolute.insert(BlockId(0), 0);
    indirect.insert(BlockId(0), 0);

    for idx in 0..blocks.len() {
        let id = BlockId(idx as u32);

        let absolute_exit =
            add_absolute_guard(&mut blocks[idx], absolute.remove(&id).unwrap_or(0));
        let indirect_exit =
            add_indirect_guard(&mut blocks[idx], indirect.remove(&id).unwrap_or(0));

        // Merging paths can only keep the weakest common bound
        let targets: Vec<BlockId> = blocks[idx].jumps.values().copied().collect();
        for target in targets {
            absolute
                .entry(target)
                .and_modify(|len| *len = (*len).min(absolute_exit))
                .or_insert(absolute_exit);
            indirect
                .entry(target)
                .and_modify(|len| *len = (*len).min(indirect_exit))
                .or_insert(indirect_exit);
        }
    }
}

/// Guard the absolute loads of a block, given the least guard in effect at
/// its start. Returns the guard in effect at the end.
fn add_absolute_guard(block: &mut Block, entry: u32) -> u32 {
    let mut guard = entry;
    let mut biggest = 0u32;

    for wrapped in &block.insns {
        match wrapped.insn {
            Insn::LoadAbsolute { off, size } => {
                biggest = biggest.max(off.saturating_add(size.bytes()));
            }
            Insn::LoadMemShift { off } => {
                biggest = biggest.max(off.saturating_add(1));
            }
            Insn::PacketGuardAbsolute { len } => {
                guard = guard.max(len);
            }
            _ => {}
        }
    }

    if biggest > guard {
        guard = biggest;
        debug!("guarding absolute loads up to {} in {}", guard, block.label());
        block.insert(0, Insn::PacketGuardAbsolute { len: guard });
    }

    guard
}

/// Guard the indirect loads of a block, given the least guard in effect at
/// its start. Returns the guard in effect at the end.
///
/// Every write to X starts a fresh sub-run with no guard in effect.
fn add_indirect_guard(block: &mut Block, entry: u32) -> u32 {
    let mut guard = entry;
    let mut biggest = 0u32;
    let mut start = 0usize;

    let mut pc = 0;
    while pc < block.insns.len() {
        match block.insns[pc].insn {
            Insn::LoadIndirect { off, size } => {
                biggest = biggest.max(off.saturating_add(size.bytes()));
            }
            Insn::PacketGuardIndirect { len } => {
                guard = guard.max(len);
            }
            _ => {}
        }

        let clobbered = block.insns[pc].insn.mem_writes().reg(Reg::X);

        // End of block or X clobbered: guard the sub-run scanned so far
        if pc == block.insns.len() - 1 || clobbered {
            if biggest > guard {
                guard = biggest;
                debug!("guarding indirect loads up to {} in {}", guard, block.label());
                block.insert(start, Insn::PacketGuardIndirect { len: guard });
                pc += 1;
            }
        }

        if clobbered {
            start = pc + 1;
            guard = 0;
            biggest = 0;
        }

        pc += 1;
    }

    guard
}
