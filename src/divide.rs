//! Division by zero guards
//!
//! eBPF traps on division by zero, so every division or modulo by X gets a
//! runtime check unless X is already known to be non-zero on every path
//! into it. Division by a zero constant cannot be saved by a guard and is a
//! hard error.

use std::collections::HashMap;

use log::debug;

use crate::CompileError;
use crate::cfg::{Block, BlockId};
use crate::instruction::{AluOp, Insn, Reg};

/// Insert [`Insn::CheckXNotZero`] in front of every X division whose
/// divisor is not already known to be non-zero.
pub fn add_divide_guards(blocks: &mut [Block]) -> Result<(), CompileError> {
    // Is X known to be non-zero at the start of each block. Division by A
    // is impossible, only X needs tracking.
    let mut x_not_zero: HashMap<BlockId, bool> = HashMap::new();

    for idx in 0..blocks.len() {
        let mut not_zero = x_not_zero
            .remove(&BlockId(idx as u32))
            .unwrap_or(false);

        let mut pc = 0;
        while pc < blocks[idx].insns.len() {
            let wrapped = blocks[idx].insns[pc];

            match wrapped.insn {
                Insn::AluOpConstant { op, val } if is_division(op) && val == 0 => {
                    return Err(CompileError::StaticDivideByZero { insn: wrapped });
                }

                Insn::AluOpX { op } if is_division(op) && !not_zero => {
                    debug!("guarding division at {}", wrapped);
                    blocks[idx].insert(pc, Insn::CheckXNotZero);
                    pc += 1;
                    not_zero = true;
                }

                Insn::CheckXNotZero => not_zero = true,

                _ => {}
            }

            // Writing X invalidates the check
            if blocks[idx].insns[pc].insn.mem_writes().reg(Reg::X) {
                not_zero = false;
            }

            pc += 1;
        }

        // X must be non-zero on every path into a successor
        let targets: Vec<BlockId> = blocks[idx].jumps.values().copied().collect();
        for target in targets {
            x_not_zero
                .entry(target)
                .and_modify(|v| *v = *v && not_zero)
                .or_insert(not_zero);
        }
    }

    Ok(())
}

fn is_division(op: AluOp) -> bool {
    matches!(op, AluOp::Div | AluOp::Mod)
}
