use super::*;

#[test]
fn test_assemble_packet_loads() {
    let raw = Insn::LoadAbsolute {
        off: 12,
        size: Size::Half,
    }
    .assemble()
    .unwrap();
    assert_eq!(raw, RawInsn::new(0x28, 0, 0, 12));

    let raw = Insn::LoadIndirect {
        off: 16,
        size: Size::Byte,
    }
    .assemble()
    .unwrap();
    assert_eq!(raw, RawInsn::new(0x50, 0, 0, 16));

    let raw = Insn::LoadMemShift { off: 14 }.assemble().unwrap();
    assert_eq!(raw, RawInsn::new(0xb1, 0, 0, 14));
}

#[test]
fn test_assemble_scratch() {
    let raw = Insn::LoadScratch { dst: Reg::A, n: 5 }.assemble().unwrap();
    assert_eq!(raw, RawInsn::new(0x60, 0, 0, 5));

    let raw = Insn::LoadScratch { dst: Reg::X, n: 5 }.assemble().unwrap();
    assert_eq!(raw, RawInsn::new(0x61, 0, 0, 5));

    let raw = Insn::StoreScratch { src: Reg::A, n: 15 }.assemble().unwrap();
    assert_eq!(raw, RawInsn::new(0x02, 0, 0, 15));

    let raw = Insn::StoreScratch { src: Reg::X, n: 0 }.assemble().unwrap();
    assert_eq!(raw, RawInsn::new(0x03, 0, 0, 0));
}

#[test]
fn test_assemble_scratch_out_of_range() {
    let err = Insn::LoadScratch { dst: Reg::A, n: 16 }.assemble();
    assert_eq!(err, Err(EncodeError::ScratchOutOfRange(16)));

    let err = Insn::StoreScratch { src: Reg::X, n: 99 }.assemble();
    assert_eq!(err, Err(EncodeError::ScratchOutOfRange(99)));
}

#[test]
fn test_assemble_jumps() {
    let raw = Insn::JumpIf {
        cond: JumpCond::Equal,
        val: 0x800,
        skip_true: 0,
        skip_false: 3,
    }
    .assemble()
    .unwrap();
    assert_eq!(raw, RawInsn::new(0x15, 0, 3, 0x800));

    // Complement conditions swap the skip bytes
    let raw = Insn::JumpIf {
        cond: JumpCond::NotEqual,
        val: 0x800,
        skip_true: 0,
        skip_false: 3,
    }
    .assemble()
    .unwrap();
    assert_eq!(raw, RawInsn::new(0x15, 3, 0, 0x800));

    let raw = Insn::JumpIf {
        cond: JumpCond::Less,
        val: 5,
        skip_true: 1,
        skip_false: 2,
    }
    .assemble()
    .unwrap();
    assert_eq!(raw, RawInsn::new(0x35, 2, 1, 5));

    let raw = Insn::JumpIfX {
        cond: JumpCond::BitsSet,
        skip_true: 4,
        skip_false: 0,
    }
    .assemble()
    .unwrap();
    assert_eq!(raw, RawInsn::new(0x4d, 4, 0, 0));

    let raw = Insn::Jump { skip: 7 }.assemble().unwrap();
    assert_eq!(raw, RawInsn::new(0x05, 0, 0, 7));
}

#[test]
fn test_assemble_returns_and_transfers() {
    assert_eq!(
        Insn::RetConstant { val: 65535 }.assemble().unwrap(),
        RawInsn::new(0x06, 0, 0, 65535)
    );
    assert_eq!(Insn::RetA.assemble().unwrap(), RawInsn::new(0x16, 0, 0, 0));
    assert_eq!(Insn::Tax.assemble().unwrap(), RawInsn::new(0x07, 0, 0, 0));
    assert_eq!(Insn::Txa.assemble().unwrap(), RawInsn::new(0x87, 0, 0, 0));
}

#[test]
fn test_pseudo_opcodes_have_no_encoding() {
    for insn in [
        Insn::PacketGuardAbsolute { len: 4 },
        Insn::PacketGuardIndirect { len: 1 },
        Insn::InitializeScratch { n: 0 },
        Insn::CheckXNotZero,
    ] {
        assert!(matches!(insn.assemble(), Err(EncodeError::NoEncoding(_))));
    }
}

#[test]
fn test_decode_supported_set() {
    assert_eq!(
        RawInsn::new(0x28, 0, 0, 12).decode(),
        Insn::LoadAbsolute {
            off: 12,
            size: Size::Half
        }
    );
    assert_eq!(
        RawInsn::new(0x15, 0, 3, 0x800).decode(),
        Insn::JumpIf {
            cond: JumpCond::Equal,
            val: 0x800,
            skip_true: 0,
            skip_false: 3,
        }
    );
    assert_eq!(
        RawInsn::new(0x01, 0, 0, 9).decode(),
        Insn::LoadConstant { dst: Reg::X, val: 9 }
    );
    assert_eq!(
        RawInsn::new(0x34, 0, 0, 4).decode(),
        Insn::AluOpConstant {
            op: AluOp::Div,
            val: 4
        }
    );
    assert_eq!(
        RawInsn::new(0x3c, 0, 0, 0).decode(),
        Insn::AluOpX { op: AluOp::Div }
    );
    assert_eq!(RawInsn::new(0x84, 0, 0, 0).decode(), Insn::NegateA);
    assert_eq!(
        RawInsn::new(0xb1, 0, 0, 14).decode(),
        Insn::LoadMemShift { off: 14 }
    );
}

#[test]
fn test_decode_extensions() {
    assert_eq!(
        RawInsn::new(0x20, 0, 0, opcode::SKF_AD_OFF).decode(),
        Insn::LoadExtension {
            ext: Extension::Protocol
        }
    );
    assert_eq!(
        RawInsn::new(0x20, 0, 0, opcode::SKF_AD_OFF + 36).decode(),
        Insn::LoadExtension {
            ext: Extension::Cpu
        }
    );
    // Packet length has its own addressing mode
    assert_eq!(
        RawInsn::new(0x80, 0, 0, 0).decode(),
        Insn::LoadExtension {
            ext: Extension::PacketLength
        }
    );
}

#[test]
fn test_decode_unknown_stays_raw() {
    let raw = RawInsn::new(0xffff, 1, 2, 3);
    assert_eq!(raw.decode(), Insn::Raw(raw));

    // Unknown ancillary offset
    let raw = RawInsn::new(0x20, 0, 0, opcode::SKF_AD_OFF + 1000);
    assert_eq!(raw.decode(), Insn::Raw(raw));

    // ALU operation nibble past the defined set
    let raw = RawInsn::new(0x04 | 0xf0, 0, 0, 0);
    assert_eq!(raw.decode(), Insn::Raw(raw));
}

#[test]
fn test_cond_inverse_is_an_involution() {
    for cond in [
        JumpCond::Equal,
        JumpCond::NotEqual,
        JumpCond::Greater,
        JumpCond::Less,
        JumpCond::GreaterOrEqual,
        JumpCond::LessOrEqual,
        JumpCond::BitsSet,
        JumpCond::BitsNotSet,
    ] {
        assert_ne!(cond.inverse(), cond);
        assert_eq!(cond.inverse().inverse(), cond);
    }
}

#[test]
fn test_display() {
    assert_eq!(
        Insn::LoadAbsolute {
            off: 12,
            size: Size::Half
        }
        .to_string(),
        "ldh [12]"
    );
    assert_eq!(Insn::LoadMemShift { off: 14 }.to_string(), "ldxb 4*([14]&0xf)");
    assert_eq!(
        Insn::JumpIf {
            cond: JumpCond::NotEqual,
            val: 6,
            skip_true: 2,
            skip_false: 0,
        }
        .to_string(),
        "jneq #6,+2,+0"
    );
    assert_eq!(
        PosInsn::new(Insn::RetConstant { val: 0 }, Pos(9)).to_string(),
        "9: ret #0"
    );
    assert_eq!(
        PosInsn::pseudo(Insn::PacketGuardAbsolute { len: 14 }).to_string(),
        "-: guard_abs #14"
    );
}
