//! Classic BPF to eBPF compilation front end
//!
//! Compiles a classic BPF (cBPF) filter program into an ordered list of
//! basic blocks whose instruction stream a strict in-kernel verifier will
//! accept once a code generator emits it:
//!
//! - registers and scratch cells are zero initialized as required,
//! - every packet load is covered by a runtime packet length guard,
//! - every division by X is covered by a runtime divisor check,
//! - conditional jumps are normalized to always use the true skip,
//! - jump edges are resolved into an explicit control flow graph.
//!
//! Emitting concrete eBPF bytes (or C) from the block list is a downstream
//! concern; the blocks carry everything a generator needs, including four
//! pseudo-opcodes for the inserted guards.
//!
//! Classic BPF jumps only go forward, so the block list is a DAG in
//! topological order and each analysis is a single forward sweep.

use log::debug;
use thiserror::Error;

pub mod cfg;
pub mod divide;
pub mod effects;
pub mod instruction;
pub mod memory;
pub mod normalize;
pub mod packet;

pub use cfg::{Block, BlockId, Skip};
pub use effects::MemSet;
pub use instruction::{
    AluOp, EncodeError, Extension, Insn, JumpCond, Pos, PosInsn, RawInsn, Reg, SCRATCH_CELLS,
    Size,
};

/// Errors that abort compilation
///
/// Nothing is retried or substituted; on any error the caller gets no block
/// list.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("can't compile an empty program")]
    EmptyProgram,

    #[error("unsupported instruction at {index}")]
    UnsupportedOpcode { index: Pos },

    #[error("malformed instruction at {index}")]
    MalformedInstruction { index: Pos },

    #[error("instruction {last} flows past the end of the program")]
    FlowsPastEnd { last: PosInsn },

    #[error("instruction {insn} divides by zero")]
    StaticDivideByZero { insn: PosInsn },
}

/// Compile a classic BPF program to an ordered list of blocks, with:
/// - registers and scratch zero initialized as required,
/// - packet and divisor guards added,
/// - conditional jumps normalized (see [`normalize::normalize_jumps`]).
pub fn compile(insns: &[Insn]) -> Result<Vec<Block>, CompileError> {
    validate_insns(insns)?;

    debug!("compiling {} instructions", insns.len());

    let mut instructions = to_instructions(insns);
    normalize::normalize_jumps(&mut instructions);

    let mut blocks = cfg::split_blocks(instructions)?;

    memory::initialize_memory(&mut blocks);
    divide::add_divide_guards(&mut blocks)?;
    packet::add_packet_guards(&mut blocks);

    Ok(blocks)
}

/// Check the instructions are valid and supported.
pub fn validate_insns(insns: &[Insn]) -> Result<(), CompileError> {
    if insns.is_empty() {
        return Err(CompileError::EmptyProgram);
    }

    for (pc, insn) in insns.iter().enumerate() {
        // Assembling performs the per-instruction consistency checks
        if insn.assemble().is_err() {
            return Err(CompileError::MalformedInstruction {
                index: Pos(pc as u32),
            });
        }

        match insn {
            Insn::LoadExtension { .. } | Insn::Raw(_) => {
                return Err(CompileError::UnsupportedOpcode {
                    index: Pos(pc as u32),
                });
            }
            _ => {}
        }
    }

    Ok(())
}

/// Tag every instruction with its original position, the identity later
/// used to resolve jump edges.
fn to_instructions(insns: &[Insn]) -> Vec<PosInsn> {
    insns
        .iter()
        .enumerate()
        .map(|(pc, &insn)| PosInsn::new(insn, Pos(pc as u32)))
        .collect()
}
