//! Basic block construction
//!
//! Splits the flat, normalized instruction stream into an ordered list of
//! basic blocks with fully resolved jump edges. Classic BPF skips are
//! non-negative, so the graph is a DAG and the list comes out in topological
//! order; every later analysis gets away with a single forward sweep.
//!
//! Blocks are kept in the order they are found, which also mirrors the
//! layout of the original filter.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;

use crate::CompileError;
use crate::instruction::{Insn, Pos, PosInsn};

/// Relative displacement of a jump, added to the position after the jump
/// to obtain the absolute target. 0 falls through.
pub type Skip = u32;

/// Index of a block in the ordered block list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A linear run of instructions:
/// - Nothing jumps into the middle of a block
/// - Nothing jumps out of the middle of a block
///
/// A block may start or end with any instruction, as any instruction can be
/// the target of a jump. A block also knows which blocks it jumps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Ordered instructions. Non-empty; the last instruction is the only one
    /// that may transfer control non-sequentially.
    pub insns: Vec<PosInsn>,

    /// Absolute positions the last instruction can transfer control to,
    /// mapped to the successor blocks. A fall-through contributes the entry
    /// for skip 0. Returns contribute nothing.
    pub jumps: BTreeMap<Pos, BlockId>,

    /// Position of the instruction that started this block. Stable: later
    /// insertions at the front do not change it.
    pub id: Pos,

    /// True iff another block jumps here explicitly. A block falling
    /// through into this one does not count.
    pub is_target: bool,
}

impl Block {
    /// Label for downstream code generation
    pub fn label(&self) -> String {
        format!("block_{}", self.id)
    }

    pub fn last(&self) -> &PosInsn {
        self.insns.last().expect("blocks are never empty")
    }

    /// Absolute target of a skip off this block's last instruction
    pub fn skip_to_pos(&self, skip: Skip) -> Option<Pos> {
        let last = self.last().pos?;
        Some(Pos(last.0.saturating_add(1).saturating_add(skip)))
    }

    /// Successor block a skip off this block's last instruction lands in
    pub fn skip_to_block(&self, skip: Skip) -> Option<BlockId> {
        self.jumps.get(&self.skip_to_pos(skip)?).copied()
    }

    /// Insert a pseudo-instruction, shifting the tail up
    pub fn insert(&mut self, index: usize, insn: Insn) {
        self.insns.insert(index, PosInsn::pseudo(insn));
    }
}

/// An edge into a block that has not been created yet
struct PendingEdge {
    from: BlockId,
    /// True iff the edge is a fall-through (skip 0)
    fallthrough: bool,
}

/// Split the instruction stream into an ordered list of blocks.
///
/// Works off a map of pending target positions, smallest first, seeded with
/// the entry. Each target becomes a block: the scan runs until the first
/// control transfer or the next pending target, the block's outgoing skips
/// become new pending targets, and the edges waiting on the current target
/// are resolved against the freshly created block.
///
/// Instructions no path can reach (between a return and the next jump
/// target) end up in no block.
pub fn split_blocks(insns: Vec<PosInsn>) -> Result<Vec<Block>, CompileError> {
    let mut blocks: Vec<Block> = Vec::new();

    // Pending target positions, each with the edges waiting to point at it.
    // The entry position has no incoming edges.
    let mut pending: BTreeMap<u32, Vec<PendingEdge>> = BTreeMap::new();
    pending.insert(0, Vec::new());

    while let Some((&target, _)) = pending.first_key_value() {
        // Stop before the next pending target, it starts its own block
        let end = pending
            .keys()
            .nth(1)
            .map(|&next| next as usize)
            .unwrap_or(insns.len());

        let (block_insns, skips) = visit_block(&insns[target as usize..end]);
        let id = BlockId(blocks.len() as u32);

        // Positions inside a scanned run are consecutive
        let last_pos = target as u64 + block_insns.len() as u64 - 1;

        for &skip in &skips {
            let jump_target = last_pos + 1 + skip as u64;
            if jump_target >= insns.len() as u64 {
                return Err(CompileError::FlowsPastEnd {
                    last: *block_insns.last().expect("blocks are never empty"),
                });
            }

            pending
                .entry(jump_target as u32)
                .or_default()
                .push(PendingEdge {
                    from: id,
                    fallthrough: skip == 0,
                });
        }

        // The target is now a block; resolve the edges waiting on it
        let mut is_target = false;
        for edge in pending.remove(&target).unwrap_or_default() {
            blocks[edge.from.0 as usize].jumps.insert(Pos(target), id);

            if !edge.fallthrough {
                is_target = true;
            }
        }

        blocks.push(Block {
            insns: block_insns.to_vec(),
            jumps: BTreeMap::new(),
            id: Pos(target),
            is_target,
        });
    }

    debug!("split {} instructions into {} blocks", insns.len(), blocks.len());

    Ok(blocks)
}

/// Scan until the end of the first block, returning the block's instructions
/// and the relative targets of its last instruction.
fn visit_block(insns: &[PosInsn]) -> (&[PosInsn], Vec<Skip>) {
    for (pc, wrapped) in insns.iter().enumerate() {
        let skips = match wrapped.insn {
            Insn::Jump { skip } => vec![skip],
            Insn::JumpIf {
                skip_true,
                skip_false,
                ..
            }
            | Insn::JumpIfX {
                skip_true,
                skip_false,
                ..
            } => vec![skip_true as Skip, skip_false as Skip],

            Insn::RetA | Insn::RetConstant { .. } => vec![],

            // Regular instruction, keep scanning
            _ => continue,
        };

        return (&insns[..pc + 1], skips);
    }

    // No control transfer, fall through to the next block
    (insns, vec![0])
}
