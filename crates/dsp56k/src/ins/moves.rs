//! The data move half of parallel instructions.
use crate::agu::Ea;
use crate::bounded::U8;
use crate::ins::Cond;
use crate::ins::fields::{self, LongReg};
use crate::mem::Space;
use crate::regs::{Acc, Reg};

/// Memory operand of a single X, Y or L move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Ea(Ea),
    /// 6-bit absolute short address.
    Short(u32),
}

impl Operand {
    #[inline(always)]
    pub fn needs_ext(self) -> bool {
        match self {
            Self::Ea(ea) => ea.needs_ext(),
            Self::Short(_) => false,
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ea(ea) => write!(f, "{ea}"),
            Self::Short(addr) => write!(f, "${addr:02X}"),
        }
    }
}

/// One side of an XY move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XyHalf {
    pub ea: Ea,
    pub reg: Reg,
    /// Memory to register.
    pub load: bool,
}

/// The data move of a parallel instruction.
///
/// `load` always means memory to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParallelMove {
    None,
    /// `ifcc`: the ALU operation only executes if the condition holds.
    IfCc {
        cond: Cond,
        update_ccr: bool,
    },
    /// Address register update only.
    Update(Ea),
    /// `#xx,D`
    Imm {
        value: U8,
        dst: Reg,
    },
    /// `S,D`
    Reg {
        src: Reg,
        dst: Reg,
    },
    /// `X:ea,D`, `S,Y:aa` and friends.
    Mem {
        space: Space,
        operand: Operand,
        reg: Reg,
        load: bool,
    },
    /// `L:ea,D`
    Long {
        operand: Operand,
        reg: LongReg,
        load: bool,
    },
    /// Class I `X:ea,D1 S2,D2`
    XR {
        ea: Ea,
        reg: Reg,
        load: bool,
        s2: Acc,
        d2: Reg,
    },
    /// Class I `S1,D1 Y:ea,D2`
    RY {
        ea: Ea,
        reg: Reg,
        load: bool,
        s1: Acc,
        d1: Reg,
    },
    /// Class II `A,X:ea X0,A` (or with B).
    XRAcc {
        ea: Ea,
        acc: Acc,
    },
    /// Class II `B,Y:ea Y0,B` (or with A).
    RYAcc {
        ea: Ea,
        acc: Acc,
    },
    XY {
        x: XyHalf,
        y: XyHalf,
    },
}

impl ParallelMove {
    /// Decodes the upper 16 bits of a parallel instruction. Returns `None` for reserved
    /// encodings.
    pub fn decode(word: u32) -> Option<Self> {
        let upper = (word >> 8) & 0xFFFF;
        let bits = |start: u32, len: u32| (upper >> start) & ((1 << len) - 1);

        let mv = match bits(12, 4) {
            0b0000 => {
                // 0000_100d_x0MM_MRRR
                if bits(9, 3) != 0b100 || bits(6, 1) != 0 {
                    return None;
                }

                let ea = Ea::decode(bits(0, 6))?;
                let acc = Acc::new(bits(8, 1));
                if bits(7, 1) == 0 {
                    Self::XRAcc { ea, acc }
                } else {
                    Self::RYAcc { ea, acc }
                }
            }
            0b0001 => {
                let ea = Ea::decode(bits(0, 6))?;
                let load = bits(7, 1) == 1;
                if bits(6, 1) == 0 {
                    // 0001_ffdF_W0MM_MRRR
                    Self::XR {
                        ea,
                        reg: fields::xy_x(bits(10, 2)),
                        load,
                        s2: Acc::new(bits(9, 1)),
                        d2: if bits(8, 1) == 0 { Reg::Y0 } else { Reg::Y1 },
                    }
                } else {
                    // 0001_deff_W1MM_MRRR
                    Self::RY {
                        ea,
                        reg: fields::xy_y(bits(8, 2)),
                        load,
                        s1: Acc::new(bits(11, 1)),
                        d1: if bits(10, 1) == 0 { Reg::X0 } else { Reg::X1 },
                    }
                }
            }
            0b0010 | 0b0011 if bits(10, 3) == 0 => {
                // 0010_00ee_eeed_dddd
                let src = bits(5, 5);
                let dst = bits(0, 5);
                match src {
                    0b00000 if dst == 0 => Self::None,
                    0b00001 => Self::IfCc {
                        cond: Cond::new(dst),
                        update_ccr: dst & 0b10000 != 0,
                    },
                    // 0010_0000_010M_MRRR
                    0b00010 => Self::Update(Ea::decode_update(bits(3, 2), bits(0, 3) as u8)),
                    0b00100..=0b11111 => Self::Reg {
                        src: fields::reg5(src)?,
                        dst: fields::reg5(dst)?,
                    },
                    _ => return None,
                }
            }
            0b0010 | 0b0011 => {
                // 001d_dddd_iiii_iiii
                Self::Imm {
                    value: U8::new(bits(0, 8) as u8),
                    dst: fields::reg5(bits(8, 5))?,
                }
            }
            0b0100..=0b0111 => {
                // 01dd_Sddd_W1MM_MRRR or 01dd_Sddd_W0aa_aaaa
                let load = bits(7, 1) == 1;
                let operand = if bits(6, 1) == 1 {
                    Operand::Ea(Ea::decode(bits(0, 6))?)
                } else {
                    Operand::Short(bits(0, 6))
                };

                let ddddd = (bits(12, 2) << 3) | bits(8, 3);
                if ddddd < 0b100 {
                    // 0100_L0LL
                    Self::Long {
                        operand,
                        reg: LongReg::new((bits(11, 1) << 2) | bits(8, 2)),
                        load,
                    }
                } else {
                    Self::Mem {
                        space: if bits(11, 1) == 0 { Space::X } else { Space::Y },
                        operand,
                        reg: fields::reg5(ddddd)?,
                        load,
                    }
                }
            }
            _ => {
                // 1wmm_eeff_WrrM_MRRR
                let rrr = bits(0, 3) as u8;
                let rr = bits(5, 2) as u8;
                let y_reg = if rrr < 4 { 4 + rr } else { rr };

                Self::XY {
                    x: XyHalf {
                        ea: Ea::decode_xy(bits(3, 2), rrr),
                        reg: fields::xy_x(bits(10, 2)),
                        load: bits(7, 1) == 1,
                    },
                    y: XyHalf {
                        ea: Ea::decode_xy(bits(12, 2), y_reg),
                        reg: fields::xy_y(bits(8, 2)),
                        load: bits(14, 1) == 1,
                    },
                }
            }
        };

        Some(mv)
    }

    /// Whether this move is followed by an extension word.
    pub fn needs_ext(self) -> bool {
        match self {
            Self::Mem { operand, .. } | Self::Long { operand, .. } => operand.needs_ext(),
            Self::XR { ea, .. }
            | Self::RY { ea, .. }
            | Self::XRAcc { ea, .. }
            | Self::RYAcc { ea, .. } => ea.needs_ext(),
            _ => false,
        }
    }

    /// Whether this move may write program memory or change the loop/AGU mode registers.
    pub fn writes_control(self) -> bool {
        let is_control = |reg: Reg| reg.is_control();
        match self {
            Self::Imm { dst, .. } | Self::Reg { dst, .. } => is_control(dst),
            Self::Mem { reg, load, .. } => load && is_control(reg),
            _ => false,
        }
    }
}

fn side(
    f: &mut std::fmt::Formatter<'_>,
    space: &str,
    operand: impl std::fmt::Display,
    reg: impl std::fmt::Display,
    load: bool,
) -> std::fmt::Result {
    if load {
        write!(f, "{space}:{operand},{reg}")
    } else {
        write!(f, "{reg},{space}:{operand}")
    }
}

impl std::fmt::Display for ParallelMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let acc = fields::acc_reg;

        match *self {
            Self::None => Ok(()),
            Self::IfCc { cond, update_ccr } => {
                write!(f, "if{cond}{}", if update_ccr { ".u" } else { "" })
            }
            Self::Update(ea) => write!(f, "{ea}"),
            Self::Imm { value, dst } => write!(f, "#${:02X},{dst}", value.value()),
            Self::Reg { src, dst } => write!(f, "{src},{dst}"),
            Self::Mem {
                space,
                operand,
                reg,
                load,
            } => side(f, space.name(), operand, reg, load),
            Self::Long { operand, reg, load } => side(f, "l", operand, reg, load),
            Self::XR {
                ea,
                reg,
                load,
                s2,
                d2,
            } => {
                side(f, "x", ea, reg, load)?;
                write!(f, " {},{d2}", acc(s2))
            }
            Self::RY {
                ea,
                reg,
                load,
                s1,
                d1,
            } => {
                write!(f, "{},{d1} ", acc(s1))?;
                side(f, "y", ea, reg, load)
            }
            Self::XRAcc { ea, acc: a } => write!(f, "{},x:{ea} x0,{}", acc(a), acc(a)),
            Self::RYAcc { ea, acc: a } => write!(f, "{},y:{ea} y0,{}", acc(a), acc(a)),
            Self::XY { x, y } => {
                side(f, "x", x.ea, x.reg, x.load)?;
                f.write_str(" ")?;
                side(f, "y", y.ea, y.reg, y.load)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::agu::EaMode;

    fn decode(word: u32) -> ParallelMove {
        ParallelMove::decode(word).unwrap()
    }

    #[test]
    fn no_move() {
        assert_eq!(decode(0x20_0013), ParallelMove::None);
    }

    #[test]
    fn immediate_short() {
        // move #$12,x0 (ddddd = 00100)
        assert_eq!(
            decode(0x24_1200),
            ParallelMove::Imm {
                value: U8::new(0x12),
                dst: Reg::X0
            }
        );
    }

    #[test]
    fn register_to_register() {
        // move a,x0: eeeee = 01110, ddddd = 00100
        let word = (0b0010_0001_1100_0100 << 8) | 0x00;
        assert_eq!(
            decode(word),
            ParallelMove::Reg {
                src: Reg::A,
                dst: Reg::X0
            }
        );
    }

    #[test]
    fn x_memory() {
        // move x:(r0)+,x0: 01dd_0ddd_W1MM_MRRR with ddddd = 00100
        let word = 0b0100_0100_1101_1000 << 8;
        assert_eq!(
            decode(word),
            ParallelMove::Mem {
                space: Space::X,
                operand: Operand::Ea(Ea {
                    mode: EaMode::PostInc,
                    reg: 0
                }),
                reg: Reg::X0,
                load: true,
            }
        );

        // absolute address needs an extension word
        let word = 0b0100_0100_1111_0000 << 8;
        assert!(decode(word).needs_ext());
    }

    #[test]
    fn long_memory() {
        // move a10,l:$10 → 0100_0000_0001_0000
        let word = 0b0100_0000_0001_0000 << 8;
        assert_eq!(
            decode(word),
            ParallelMove::Long {
                operand: Operand::Short(0x10),
                reg: LongReg::A10,
                load: false,
            }
        );
    }

    #[test]
    fn xy_uses_other_bank() {
        // x:(r1)+,x0 y:(r5)+,y0 → 1wmm_eeff_WrrM_MRRR
        let word = 0b1111_0000_1001_1001 << 8;
        let ParallelMove::XY { x, y } = decode(word) else {
            panic!("not an XY move");
        };

        assert_eq!(x.ea, Ea { mode: EaMode::PostInc, reg: 1 });
        assert_eq!(y.ea, Ea { mode: EaMode::PostInc, reg: 4 });
        assert!(x.load && y.load);
        assert_eq!((x.reg, y.reg), (Reg::X0, Reg::Y0));
    }

    #[test]
    fn reserved_encodings() {
        assert!(ParallelMove::decode(0b0010_0000_0110_0000 << 8).is_none());
        assert!(ParallelMove::decode(0b0000_0000_0000_0000 << 8).is_none());
    }
}
