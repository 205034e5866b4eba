//! Opcode decoding.
//!
//! The 6510 opcode matrix is regular enough that the low bits select an
//! instruction group and the remaining bits select the addressing mode
//! and the operation:
//!
//! - `xxxxxxx1`: accumulator ALU ops ($x1/$x5/$x9/$xD) and their
//!   undocumented neighbours ($x3/$x7/$xB/$xF: LAX, SAX)
//! - `xxxxxx10`: shifts, X-register ops, INC/DEC, register transfers
//! - `xxxx1000`: stack, Y-register and flag ops (implied)
//! - `xxxxxx00` otherwise: branches, jumps, BIT, Y/compare ops
//!
//! Decoding produces an [`Op`] descriptor; [`OPCODES`] holds all 256 of
//! them, built at compile time. Opcodes that a player routine never emits
//! still decode to *something*: whatever the group rules yield.

/// How the effective address of an operand is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No operand fetched; the previous effective address is kept.
    Unchanged,
    Immediate,
    ZeroPage,
    /// zp + X, not wrapped to the zero page.
    ZeroPageX,
    /// zp + Y, not wrapped to the zero page.
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    /// (zp,X)
    IndexedIndirect,
    /// (zp),Y
    IndirectIndexed,
    /// Signed 8-bit branch displacement.
    Relative,
}

impl Mode {
    /// Base cycle cost of an instruction using this mode.
    pub const fn cycles(self) -> u8 {
        match self {
            Mode::Unchanged | Mode::Immediate | Mode::Relative => 2,
            Mode::ZeroPage => 3,
            Mode::ZeroPageX | Mode::ZeroPageY | Mode::Absolute => 4,
            Mode::AbsoluteX | Mode::AbsoluteY => 5,
            Mode::IndexedIndirect | Mode::IndirectIndexed => 6,
        }
    }
}

/// Whether a shift works on A or on memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Accumulator,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    // accumulator group
    Ora,
    And,
    Eor,
    Adc,
    Sbc,
    Cmp,
    /// LDA; with `also_x` this is LAX (A and X loaded from one read).
    Lda { also_x: bool },
    /// STA; with `and_x` this is SAX (stores A & X).
    Sta { and_x: bool },

    // shift / X group
    Asl(Target),
    Rol(Target),
    Lsr(Target),
    Ror(Target),
    Dec,
    Dex,
    Inc,
    Ldx,
    Tax,
    /// TSX: copies SP to X without touching the flags.
    Tsx,
    Stx,
    Txa,
    Txs,
    Nop,

    // implied $x8 group
    Php,
    Plp,
    Pha,
    Pla,
    Dey,
    Iny,
    Inx,
    Tya,
    Tay,
    /// CLC/SEC/CLI/SEI/CLV/CLD/SED.
    Flag { mask: u8, set: bool },

    // control group
    Branch { flag: u8, when_set: bool },
    Brk,
    Jsr,
    Rti,
    Rts,
    Jmp,
    JmpIndirect,
    Bit,
    Ldy,
    Sty,
    Cpy,
    Cpx,
}

/// Decoded operation descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op {
    pub mode: Mode,
    pub kind: Kind,
}

impl Op {
    /// True for memory read-modify-write forms (two extra cycles).
    pub const fn is_rmw(&self) -> bool {
        matches!(
            self.kind,
            Kind::Asl(Target::Memory)
                | Kind::Rol(Target::Memory)
                | Kind::Lsr(Target::Memory)
                | Kind::Ror(Target::Memory)
                | Kind::Dec
                | Kind::Inc
        )
    }
}

/// Flag byte per `opcode >> 5` for the $x8 flag instructions.
/// Bit 5 set means "set", otherwise "clear"; the rest is the mask.
const FLAG_OPS: [u8; 8] = [0x01, 0x21, 0x04, 0x24, 0x00, 0x40, 0x08, 0x28];

/// Flag tested by each branch pair, indexed by `opcode >> 6`: N, V, C, Z.
const BRANCH_FLAGS: [u8; 4] = [0x80, 0x40, 0x01, 0x02];

pub static OPCODES: [Op; 256] = build_table();

const fn build_table() -> [Op; 256] {
    let mut table = [Op {
        mode: Mode::Unchanged,
        kind: Kind::Nop,
    }; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode(i as u8);
        i += 1;
    }
    table
}

pub const fn decode(ir: u8) -> Op {
    if ir & 0x01 != 0 {
        decode_alu(ir)
    } else if ir & 0x02 != 0 {
        decode_shift(ir)
    } else if ir & 0x0C == 0x08 {
        decode_implied(ir)
    } else {
        decode_control(ir)
    }
}

const fn decode_alu(ir: u8) -> Op {
    let mode = match ir & 0x1F {
        0x01 | 0x03 => Mode::IndexedIndirect,
        0x11 | 0x13 => Mode::IndirectIndexed,
        0x19 | 0x1F => Mode::AbsoluteY,
        0x1D => Mode::AbsoluteX,
        0x0D | 0x0F => Mode::Absolute,
        0x15 => Mode::ZeroPageX,
        0x05 | 0x07 => Mode::ZeroPage,
        0x17 => Mode::ZeroPageY,
        0x09 | 0x0B => Mode::Immediate,
        _ => Mode::Unchanged,
    };
    let undocumented = ir & 0x03 == 0x03;
    let kind = match ir & 0xE0 {
        0x00 => Kind::Ora,
        0x20 => Kind::And,
        0x40 => Kind::Eor,
        0x60 => Kind::Adc,
        0x80 => Kind::Sta {
            and_x: undocumented,
        },
        0xA0 => Kind::Lda {
            also_x: undocumented,
        },
        0xC0 => Kind::Cmp,
        _ => Kind::Sbc,
    };
    Op { mode, kind }
}

const fn decode_shift(ir: u8) -> Op {
    // STX/LDX index with Y where everything else in the group uses X.
    let y_indexed = ir & 0xC0 == 0x80;
    let mode = match ir & 0x1F {
        0x1E => {
            if y_indexed {
                Mode::AbsoluteY
            } else {
                Mode::AbsoluteX
            }
        }
        0x0E => Mode::Absolute,
        0x16 => {
            if y_indexed {
                Mode::ZeroPageY
            } else {
                Mode::ZeroPageX
            }
        }
        0x06 => Mode::ZeroPage,
        0x02 => Mode::Immediate,
        _ => Mode::Unchanged,
    };
    let on_a = ir & 0x0F == 0x0A;
    let target = if on_a {
        Target::Accumulator
    } else {
        Target::Memory
    };
    let kind = match ir & 0xE0 {
        0x00 => Kind::Asl(target),
        0x20 => Kind::Rol(target),
        0x40 => Kind::Lsr(target),
        0x60 => Kind::Ror(target),
        0x80 => {
            if ir & 0x04 != 0 {
                Kind::Stx
            } else if ir & 0x10 != 0 {
                Kind::Txs
            } else {
                Kind::Txa
            }
        }
        0xA0 => {
            if !on_a {
                Kind::Ldx
            } else if ir & 0x10 != 0 {
                Kind::Tsx
            } else {
                Kind::Tax
            }
        }
        0xC0 => {
            if ir & 0x04 != 0 {
                Kind::Dec
            } else {
                Kind::Dex
            }
        }
        _ => {
            if ir & 0x04 != 0 {
                Kind::Inc
            } else {
                Kind::Nop
            }
        }
    };
    Op { mode, kind }
}

const fn decode_implied(ir: u8) -> Op {
    let kind = match ir & 0xF0 {
        0x00 => Kind::Php,
        0x20 => Kind::Plp,
        0x40 => Kind::Pha,
        0x60 => Kind::Pla,
        0x80 => Kind::Dey,
        0x90 => Kind::Tya,
        0xA0 => Kind::Tay,
        0xC0 => Kind::Iny,
        0xE0 => Kind::Inx,
        _ => {
            let f = FLAG_OPS[(ir >> 5) as usize];
            Kind::Flag {
                mask: f & 0xDF,
                set: f & 0x20 != 0,
            }
        }
    };
    Op {
        mode: Mode::Unchanged,
        kind,
    }
}

const fn decode_control(ir: u8) -> Op {
    if ir & 0x1F == 0x10 {
        return Op {
            mode: Mode::Relative,
            kind: Kind::Branch {
                flag: BRANCH_FLAGS[(ir >> 6) as usize],
                when_set: ir & 0x20 != 0,
            },
        };
    }
    let mode = match ir & 0x1F {
        // immediate, or the low byte of JSR's target
        0x00 => Mode::Immediate,
        0x1C => Mode::AbsoluteX,
        0x0C => Mode::Absolute,
        0x14 => Mode::ZeroPageX,
        0x04 => Mode::ZeroPage,
        _ => Mode::Unchanged,
    };
    let has_operand_form = ir & 0x0F != 0;
    let kind = match ir & 0xE0 {
        0x00 => Kind::Brk,
        0x20 => {
            if has_operand_form {
                Kind::Bit
            } else {
                Kind::Jsr
            }
        }
        0x40 => {
            if has_operand_form {
                Kind::Jmp
            } else {
                Kind::Rti
            }
        }
        0x60 => {
            if has_operand_form {
                Kind::JmpIndirect
            } else {
                Kind::Rts
            }
        }
        0x80 => Kind::Sty,
        0xA0 => Kind::Ldy,
        0xC0 => Kind::Cpy,
        _ => Kind::Cpx,
    };
    Op { mode, kind }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_opcodes_decode() {
        assert_eq!(
            decode(0xA9),
            Op {
                mode: Mode::Immediate,
                kind: Kind::Lda { also_x: false }
            }
        );
        assert_eq!(decode(0x8D).kind, Kind::Sta { and_x: false });
        assert_eq!(decode(0x8D).mode, Mode::Absolute);
        assert_eq!(decode(0xB6).mode, Mode::ZeroPageY);
        assert_eq!(decode(0xBE).mode, Mode::AbsoluteY);
        assert_eq!(decode(0x0A).kind, Kind::Asl(Target::Accumulator));
        assert_eq!(decode(0x4C).kind, Kind::Jmp);
        assert_eq!(decode(0x6C).kind, Kind::JmpIndirect);
        assert_eq!(decode(0x20).kind, Kind::Jsr);
        assert_eq!(decode(0x60).kind, Kind::Rts);
        assert_eq!(decode(0x40).kind, Kind::Rti);
        assert_eq!(decode(0x9A).kind, Kind::Txs);
        assert_eq!(decode(0xBA).kind, Kind::Tsx);
    }

    #[test]
    fn undocumented_pairs_decode_to_combined_ops() {
        assert_eq!(decode(0xA7).kind, Kind::Lda { also_x: true });
        assert_eq!(decode(0xBF).mode, Mode::AbsoluteY);
        assert_eq!(decode(0x87).kind, Kind::Sta { and_x: true });
        assert_eq!(decode(0x97).mode, Mode::ZeroPageY);
    }

    #[test]
    fn flag_ops() {
        assert_eq!(decode(0x18).kind, Kind::Flag { mask: 0x01, set: false });
        assert_eq!(decode(0x38).kind, Kind::Flag { mask: 0x01, set: true });
        assert_eq!(decode(0x78).kind, Kind::Flag { mask: 0x04, set: true });
        assert_eq!(decode(0xB8).kind, Kind::Flag { mask: 0x40, set: false });
        assert_eq!(decode(0xF8).kind, Kind::Flag { mask: 0x08, set: true });
    }

    #[test]
    fn branches() {
        assert_eq!(
            decode(0xD0).kind,
            Kind::Branch {
                flag: 0x02,
                when_set: false
            }
        );
        assert_eq!(
            decode(0xB0).kind,
            Kind::Branch {
                flag: 0x01,
                when_set: true
            }
        );
        assert_eq!(decode(0x10).mode, Mode::Relative);
    }

    #[test]
    fn read_modify_write_forms() {
        for ir in [0x06, 0x0E, 0x16, 0x1E, 0x26, 0x46, 0x66, 0xC6, 0xCE, 0xE6, 0xFE] {
            assert!(OPCODES[ir].is_rmw(), "${ir:02X}");
        }
        for ir in [0x0A, 0x2A, 0x4A, 0x6A, 0x86, 0x8E, 0xA6, 0xAE, 0xCA, 0xEA, 0x24] {
            assert!(!OPCODES[ir].is_rmw(), "${ir:02X}");
        }
    }
}
