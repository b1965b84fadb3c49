//! Raw classic BPF encoding
//!
//! Assembles decoded instructions into `sock_filter` slots and decodes raw
//! slots back. Decoding is total: unknown bit patterns come back as
//! [`Insn::Raw`], ancillary loads as [`Insn::LoadExtension`]. Assembly is the
//! per-instruction consistency check the validator relies on.

use thiserror::Error;

use super::opcode::*;
use super::{AluOp, Extension, Insn, JumpCond, RawInsn, Reg, SCRATCH_CELLS, Size};

/// Errors from assembling an instruction into its raw form
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("scratch slot {0} out of range")]
    ScratchOutOfRange(usize),

    #[error("{0} has no raw encoding")]
    NoEncoding(&'static str),
}

impl Insn {
    /// Assemble into the raw `sock_filter` form.
    ///
    /// Conditions without a native opcode (`!=`, `<`, `≤`, bits-not-set)
    /// encode as their complement with the skip bytes swapped.
    pub fn assemble(&self) -> Result<RawInsn, EncodeError> {
        match *self {
            Insn::LoadAbsolute { off, size } => {
                Ok(RawInsn::new(BPF_LD | BPF_ABS | size_bits(size), 0, 0, off))
            }
            Insn::LoadIndirect { off, size } => {
                Ok(RawInsn::new(BPF_LD | BPF_IND | size_bits(size), 0, 0, off))
            }
            Insn::LoadMemShift { off } => Ok(RawInsn::new(BPF_LDX | BPF_MSH | BPF_B, 0, 0, off)),
            Insn::LoadConstant { dst, val } => {
                Ok(RawInsn::new(load_class(dst) | BPF_IMM | BPF_W, 0, 0, val))
            }
            Insn::LoadScratch { dst, n } => {
                let n = scratch_slot(n)?;
                Ok(RawInsn::new(load_class(dst) | BPF_MEM | BPF_W, 0, 0, n))
            }
            Insn::StoreScratch { src, n } => {
                let n = scratch_slot(n)?;
                let code = match src {
                    Reg::A => BPF_ST,
                    Reg::X => BPF_STX,
                };
                Ok(RawInsn::new(code, 0, 0, n))
            }
            Insn::LoadExtension { ext } => match ext.skf_offset() {
                None => Ok(RawInsn::new(BPF_LD | BPF_W | BPF_LEN, 0, 0, 0)),
                Some(off) => Ok(RawInsn::new(BPF_LD | BPF_W | BPF_ABS, 0, 0, SKF_AD_OFF + off)),
            },
            Insn::AluOpConstant { op, val } => {
                Ok(RawInsn::new(BPF_ALU | alu_bits(op) | BPF_K, 0, 0, val))
            }
            Insn::AluOpX { op } => Ok(RawInsn::new(BPF_ALU | alu_bits(op) | BPF_X, 0, 0, 0)),
            Insn::NegateA => Ok(RawInsn::new(BPF_ALU | BPF_NEG, 0, 0, 0)),
            Insn::Jump { skip } => Ok(RawInsn::new(BPF_JMP | BPF_JA, 0, 0, skip)),
            Insn::JumpIf {
                cond,
                val,
                skip_true,
                skip_false,
            } => {
                let (op, jt, jf) = cond_bits(cond, skip_true, skip_false);
                Ok(RawInsn::new(BPF_JMP | op | BPF_K, jt, jf, val))
            }
            Insn::JumpIfX {
                cond,
                skip_true,
                skip_false,
            } => {
                let (op, jt, jf) = cond_bits(cond, skip_true, skip_false);
                Ok(RawInsn::new(BPF_JMP | op | BPF_X, jt, jf, 0))
            }
            Insn::RetA => Ok(RawInsn::new(BPF_RET | BPF_A, 0, 0, 0)),
            Insn::RetConstant { val } => Ok(RawInsn::new(BPF_RET | BPF_K, 0, 0, val)),
            Insn::Tax => Ok(RawInsn::new(BPF_MISC | BPF_TAX, 0, 0, 0)),
            Insn::Txa => Ok(RawInsn::new(BPF_MISC | BPF_TXA, 0, 0, 0)),
            Insn::Raw(raw) => Ok(raw),
            Insn::PacketGuardAbsolute { .. } => Err(EncodeError::NoEncoding("packet guard")),
            Insn::PacketGuardIndirect { .. } => Err(EncodeError::NoEncoding("packet guard")),
            Insn::InitializeScratch { .. } => {
                Err(EncodeError::NoEncoding("scratch initialization"))
            }
            Insn::CheckXNotZero => Err(EncodeError::NoEncoding("divisor check")),
        }
    }
}

impl RawInsn {
    /// Decode into instruction form. Total: anything unrecognized decodes to
    /// [`Insn::Raw`].
    pub fn decode(self) -> Insn {
        match self.code & CLASS_MASK {
            BPF_LD | BPF_LDX => self.decode_load(),
            BPF_ST => Insn::StoreScratch {
                src: Reg::A,
                n: self.k as usize,
            },
            BPF_STX => Insn::StoreScratch {
                src: Reg::X,
                n: self.k as usize,
            },
            BPF_ALU => self.decode_alu(),
            BPF_JMP => self.decode_jump(),
            BPF_RET => match self.code & RVAL_MASK {
                BPF_A => Insn::RetA,
                BPF_K => Insn::RetConstant { val: self.k },
                _ => Insn::Raw(self),
            },
            BPF_MISC => match self.code & MISC_MASK {
                BPF_TAX => Insn::Tax,
                BPF_TXA => Insn::Txa,
                _ => Insn::Raw(self),
            },
            _ => Insn::Raw(self),
        }
    }

    fn decode_load(self) -> Insn {
        let class = self.code & CLASS_MASK;
        let dst = match class {
            BPF_LD => Reg::A,
            _ => Reg::X,
        };

        match self.code & MODE_MASK {
            BPF_IMM => Insn::LoadConstant { dst, val: self.k },
            BPF_MEM => Insn::LoadScratch {
                dst,
                n: self.k as usize,
            },
            BPF_ABS if class == BPF_LD => match (decode_size(self.code), self.k) {
                (Some(Size::Word), k) if k >= SKF_AD_OFF => {
                    match Extension::from_skf_offset(k - SKF_AD_OFF) {
                        Some(ext) => Insn::LoadExtension { ext },
                        None => Insn::Raw(self),
                    }
                }
                (Some(size), off) => Insn::LoadAbsolute { off, size },
                (None, _) => Insn::Raw(self),
            },
            BPF_IND if class == BPF_LD => match decode_size(self.code) {
                Some(size) => Insn::LoadIndirect { off: self.k, size },
                None => Insn::Raw(self),
            },
            BPF_LEN if class == BPF_LD => Insn::LoadExtension {
                ext: Extension::PacketLength,
            },
            BPF_MSH if class == BPF_LDX && (self.code & SIZE_MASK) == BPF_B => {
                Insn::LoadMemShift { off: self.k }
            }
            _ => Insn::Raw(self),
        }
    }

    fn decode_alu(self) -> Insn {
        let op = match self.code & OP_MASK {
            BPF_ADD => AluOp::Add,
            BPF_SUB => AluOp::Sub,
            BPF_MUL => AluOp::Mul,
            BPF_DIV => AluOp::Div,
            BPF_MOD => AluOp::Mod,
            BPF_OR => AluOp::Or,
            BPF_AND => AluOp::And,
            BPF_LSH => AluOp::Shl,
            BPF_RSH => AluOp::Shr,
            BPF_XOR => AluOp::Xor,
            BPF_NEG => return Insn::NegateA,
            _ => return Insn::Raw(self),
        };

        match self.code & SRC_MASK {
            BPF_X => Insn::AluOpX { op },
            _ => Insn::AluOpConstant { op, val: self.k },
        }
    }

    fn decode_jump(self) -> Insn {
        let cond = match self.code & OP_MASK {
            BPF_JA => return Insn::Jump { skip: self.k },
            BPF_JEQ => JumpCond::Equal,
            BPF_JGT => JumpCond::Greater,
            BPF_JGE => JumpCond::GreaterOrEqual,
            BPF_JSET => JumpCond::BitsSet,
            _ => return Insn::Raw(self),
        };

        match self.code & SRC_MASK {
            BPF_X => Insn::JumpIfX {
                cond,
                skip_true: self.jt,
                skip_false: self.jf,
            },
            _ => Insn::JumpIf {
                cond,
                val: self.k,
                skip_true: self.jt,
                skip_false: self.jf,
            },
        }
    }
}

impl Extension {
    /// Offset within the ancillary data area, or `None` for the packet
    /// length, which has its own addressing mode.
    const fn skf_offset(self) -> Option<u32> {
        match self {
            Extension::PacketLength => None,
            Extension::Protocol => Some(0),
            Extension::PacketType => Some(4),
            Extension::InterfaceIndex => Some(8),
            Extension::NetlinkAttr => Some(12),
            Extension::NetlinkAttrNested => Some(16),
            Extension::Mark => Some(20),
            Extension::Queue => Some(24),
            Extension::LinkLayerType => Some(28),
            Extension::RxHash => Some(32),
            Extension::Cpu => Some(36),
            Extension::VlanTag => Some(44),
            Extension::VlanTagPresent => Some(48),
            Extension::PayloadOffset => Some(52),
            Extension::Random => Some(56),
            Extension::VlanProto => Some(60),
        }
    }

    fn from_skf_offset(off: u32) -> Option<Extension> {
        match off {
            0 => Some(Extension::Protocol),
            4 => Some(Extension::PacketType),
            8 => Some(Extension::InterfaceIndex),
            12 => Some(Extension::NetlinkAttr),
            16 => Some(Extension::NetlinkAttrNested),
            20 => Some(Extension::Mark),
            24 => Some(Extension::Queue),
            28 => Some(Extension::LinkLayerType),
            32 => Some(Extension::RxHash),
            36 => Some(Extension::Cpu),
            44 => Some(Extension::VlanTag),
            48 => Some(Extension::VlanTagPresent),
            52 => Some(Extension::PayloadOffset),
            56 => Some(Extension::Random),
            60 => Some(Extension::VlanProto),
            _ => None,
        }
    }
}

const fn size_bits(size: Size) -> u16 {
    match size {
        Size::Byte => BPF_B,
        Size::Half => BPF_H,
        Size::Word => BPF_W,
    }
}

const fn decode_size(code: u16) -> Option<Size> {
    match code & SIZE_MASK {
        BPF_W => Some(Size::Word),
        BPF_H => Some(Size::Half),
        BPF_B => Some(Size::Byte),
        _ => None,
    }
}

const fn load_class(dst: Reg) -> u16 {
    match dst {
        Reg::A => BPF_LD,
        Reg::X => BPF_LDX,
    }
}

const fn alu_bits(op: AluOp) -> u16 {
    match op {
        AluOp::Add => BPF_ADD,
        AluOp::Sub => BPF_SUB,
        AluOp::Mul => BPF_MUL,
        AluOp::Div => BPF_DIV,
        AluOp::Mod => BPF_MOD,
        AluOp::Or => BPF_OR,
        AluOp::And => BPF_AND,
        AluOp::Shl => BPF_LSH,
        AluOp::Shr => BPF_RSH,
        AluOp::Xor => BPF_XOR,
    }
}

/// Skip bytes for a condition: complements encode with jt and jf swapped.
const fn cond_bits(cond: JumpCond, skip_true: u8, skip_false: u8) -> (u16, u8, u8) {
    match cond {
        JumpCond::Equal => (BPF_JEQ, skip_true, skip_false),
        JumpCond::NotEqual => (BPF_JEQ, skip_false, skip_true),
        JumpCond::Greater => (BPF_JGT, skip_true, skip_false),
        JumpCond::LessOrEqual => (BPF_JGT, skip_false, skip_true),
        JumpCond::GreaterOrEqual => (BPF_JGE, skip_true, skip_false),
        JumpCond::Less => (BPF_JGE, skip_false, skip_true),
        JumpCond::BitsSet => (BPF_JSET, skip_true, skip_false),
        JumpCond::BitsNotSet => (BPF_JSET, skip_false, skip_true),
    }
}

fn scratch_slot(n: usize) -> Result<u32, EncodeError> {
    if n >= SCRATCH_CELLS {
        return Err(EncodeError::ScratchOutOfRange(n));
    }
    Ok(n as u32)
}
