//! The data ALU half of parallel instructions.
use crate::ins::fields;
use crate::regs::{Acc, Reg};

/// Source operand of a two-operand ALU instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluSrc {
    /// The other accumulator.
    Acc(Acc),
    /// X1:X0 as a 48-bit value.
    X,
    /// Y1:Y0 as a 48-bit value.
    Y,
    /// A 24-bit data register.
    Reg(Reg),
}

impl std::fmt::Display for AluSrc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acc(Acc::A) => f.write_str("a"),
            Self::Acc(Acc::B) => f.write_str("b"),
            Self::X => f.write_str("x"),
            Self::Y => f.write_str("y"),
            Self::Reg(reg) => write!(f, "{reg}"),
        }
    }
}

/// A multiplication in a parallel instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mul {
    pub s1: Reg,
    pub s2: Reg,
    pub negate: bool,
    pub accumulate: bool,
    pub round: bool,
    pub dst: Acc,
}

/// The ALU operation of a parallel instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    /// Move only.
    None,
    Add(AluSrc, Acc),
    Sub(AluSrc, Acc),
    Cmp(AluSrc, Acc),
    Cmpm(AluSrc, Acc),
    Tfr(AluSrc, Acc),
    Adc(AluSrc, Acc),
    Sbc(AluSrc, Acc),
    And(Reg, Acc),
    Or(Reg, Acc),
    Eor(Reg, Acc),
    Addr(Acc),
    Addl(Acc),
    Subr(Acc),
    Subl(Acc),
    /// `max a,b`: transfers A to B if A is greater.
    Max,
    /// `maxm a,b`: transfers A to B if |A| is greater.
    Maxm,
    Rnd(Acc),
    Tst(Acc),
    Clr(Acc),
    Asr(Acc),
    Asl(Acc),
    Lsr(Acc),
    Lsl(Acc),
    Ror(Acc),
    Rol(Acc),
    Abs(Acc),
    Neg(Acc),
    Not(Acc),
    Mul(Mul),
}

impl AluOp {
    /// Decodes the low byte of a parallel instruction. Returns `None` for reserved encodings.
    pub fn decode(byte: u8) -> Option<Self> {
        let byte = byte as u32;
        if byte & 0x80 != 0 {
            let (s1, s2) = fields::mul_pair3(byte >> 4);
            return Some(Self::Mul(Mul {
                s1,
                s2,
                negate: byte & 0b100 != 0,
                accumulate: byte & 0b10 != 0,
                round: byte & 0b1 != 0,
                dst: Acc::new(byte >> 3),
            }));
        }

        let jjj = (byte >> 4) & 0b111;
        let dst = Acc::new(byte >> 3);
        let other = AluSrc::Acc(dst.other());
        let data = || fields::data2(jjj);

        let op = match (byte & 0b111, jjj) {
            (0b000, 0b000) if dst == Acc::A => Self::None,
            (0b000, 0b000) => return None,
            (0b000, 0b001) => Self::Add(other, dst),
            (0b000, 0b010) => Self::Add(AluSrc::X, dst),
            (0b000, 0b011) => Self::Add(AluSrc::Y, dst),
            (0b000, _) => Self::Add(AluSrc::Reg(data()), dst),

            (0b001, 0b000) => Self::Tfr(other, dst),
            (0b001, 0b001) => Self::Rnd(dst),
            (0b001, 0b010) => Self::Adc(AluSrc::X, dst),
            (0b001, 0b011) => Self::Adc(AluSrc::Y, dst),
            (0b001, _) => Self::Tfr(AluSrc::Reg(data()), dst),

            (0b010, 0b000) => Self::Addr(dst),
            (0b010, 0b001) => Self::Addl(dst),
            (0b010, 0b010) => Self::Asr(dst),
            (0b010, 0b011) => Self::Asl(dst),
            (0b010, _) => Self::Or(data(), dst),

            (0b011, 0b000) => Self::Tst(dst),
            (0b011, 0b001) => Self::Clr(dst),
            (0b011, 0b010) => Self::Lsr(dst),
            (0b011, 0b011) => Self::Lsl(dst),
            (0b011, _) => Self::Eor(data(), dst),

            (0b100, 0b000) => return None,
            (0b100, 0b001) => Self::Sub(other, dst),
            (0b100, 0b010) => Self::Sub(AluSrc::X, dst),
            (0b100, 0b011) => Self::Sub(AluSrc::Y, dst),
            (0b100, _) => Self::Sub(AluSrc::Reg(data()), dst),

            (0b101, 0b000) => Self::Cmp(other, dst),
            (0b101, 0b001) if dst == Acc::B => Self::Max,
            (0b101, 0b001) => Self::Maxm,
            (0b101, 0b010) => Self::Sbc(AluSrc::X, dst),
            (0b101, 0b011) => Self::Sbc(AluSrc::Y, dst),
            (0b101, _) => Self::Cmp(AluSrc::Reg(data()), dst),

            (0b110, 0b000) => Self::Subr(dst),
            (0b110, 0b001) => Self::Subl(dst),
            (0b110, 0b010) => Self::Abs(dst),
            (0b110, 0b011) => Self::Neg(dst),
            (0b110, _) => Self::And(data(), dst),

            (_, 0b000) => Self::Cmpm(other, dst),
            (_, 0b001) => Self::Not(dst),
            (_, 0b010) => Self::Ror(dst),
            (_, 0b011) => Self::Rol(dst),
            (_, _) => Self::Cmpm(AluSrc::Reg(data()), dst),
        };

        Some(op)
    }

    /// The accumulator this operation writes, if any.
    pub fn dst(self) -> Option<Acc> {
        match self {
            Self::None | Self::Cmp(..) | Self::Cmpm(..) | Self::Tst(_) => None,
            Self::Max | Self::Maxm => Some(Acc::B),
            Self::Add(_, d)
            | Self::Sub(_, d)
            | Self::Tfr(_, d)
            | Self::Adc(_, d)
            | Self::Sbc(_, d)
            | Self::And(_, d)
            | Self::Or(_, d)
            | Self::Eor(_, d)
            | Self::Addr(d)
            | Self::Addl(d)
            | Self::Subr(d)
            | Self::Subl(d)
            | Self::Rnd(d)
            | Self::Clr(d)
            | Self::Asr(d)
            | Self::Asl(d)
            | Self::Lsr(d)
            | Self::Lsl(d)
            | Self::Ror(d)
            | Self::Rol(d)
            | Self::Abs(d)
            | Self::Neg(d)
            | Self::Not(d) => Some(d),
            Self::Mul(mul) => Some(mul.dst),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Add(..) => "add",
            Self::Sub(..) => "sub",
            Self::Cmp(..) => "cmp",
            Self::Cmpm(..) => "cmpm",
            Self::Tfr(..) => "tfr",
            Self::Adc(..) => "adc",
            Self::Sbc(..) => "sbc",
            Self::And(..) => "and",
            Self::Or(..) => "or",
            Self::Eor(..) => "eor",
            Self::Addr(_) => "addr",
            Self::Addl(_) => "addl",
            Self::Subr(_) => "subr",
            Self::Subl(_) => "subl",
            Self::Max => "max",
            Self::Maxm => "maxm",
            Self::Rnd(_) => "rnd",
            Self::Tst(_) => "tst",
            Self::Clr(_) => "clr",
            Self::Asr(_) => "asr",
            Self::Asl(_) => "asl",
            Self::Lsr(_) => "lsr",
            Self::Lsl(_) => "lsl",
            Self::Ror(_) => "ror",
            Self::Rol(_) => "rol",
            Self::Abs(_) => "abs",
            Self::Neg(_) => "neg",
            Self::Not(_) => "not",
            Self::Mul(mul) => match (mul.accumulate, mul.round) {
                (false, false) => "mpy",
                (false, true) => "mpyr",
                (true, false) => "mac",
                (true, true) => "macr",
            },
        }
    }
}

impl std::fmt::Display for AluOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let acc = |acc: Acc| match acc {
            Acc::A => "a",
            Acc::B => "b",
        };

        let name = self.mnemonic();
        match *self {
            Self::None => Ok(()),
            Self::Add(s, d)
            | Self::Sub(s, d)
            | Self::Cmp(s, d)
            | Self::Cmpm(s, d)
            | Self::Tfr(s, d)
            | Self::Adc(s, d)
            | Self::Sbc(s, d) => write!(f, "{name} {s},{}", acc(d)),
            Self::And(s, d) | Self::Or(s, d) | Self::Eor(s, d) => {
                write!(f, "{name} {s},{}", acc(d))
            }
            Self::Addr(d) | Self::Addl(d) | Self::Subr(d) | Self::Subl(d) => {
                write!(f, "{name} {},{}", acc(d.other()), acc(d))
            }
            Self::Max | Self::Maxm => write!(f, "{name} a,b"),
            Self::Mul(mul) => write!(
                f,
                "{name} {}{},{},{}",
                if mul.negate { "-" } else { "" },
                mul.s1,
                mul.s2,
                acc(mul.dst)
            ),
            Self::Rnd(d)
            | Self::Tst(d)
            | Self::Clr(d)
            | Self::Asr(d)
            | Self::Asl(d)
            | Self::Lsr(d)
            | Self::Lsl(d)
            | Self::Ror(d)
            | Self::Rol(d)
            | Self::Abs(d)
            | Self::Neg(d)
            | Self::Not(d) => write!(f, "{name} {}", acc(d)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_common_operations() {
        assert_eq!(AluOp::decode(0x00), Some(AluOp::None));
        assert_eq!(AluOp::decode(0x08), None);
        assert_eq!(AluOp::decode(0x04), None);
        assert_eq!(AluOp::decode(0x10), Some(AluOp::Add(AluSrc::Acc(Acc::B), Acc::A)));
        assert_eq!(AluOp::decode(0x32), Some(AluOp::Asl(Acc::A)));
        assert_eq!(AluOp::decode(0x13), Some(AluOp::Clr(Acc::A)));
        assert_eq!(AluOp::decode(0x1D), Some(AluOp::Max));
        assert_eq!(AluOp::decode(0x15), Some(AluOp::Maxm));
        assert_eq!(AluOp::decode(0x46), Some(AluOp::And(Reg::X0, Acc::A)));
        assert_eq!(AluOp::decode(0x21), Some(AluOp::Adc(AluSrc::X, Acc::A)));
    }

    #[test]
    fn decodes_multiplications() {
        let Some(AluOp::Mul(mul)) = AluOp::decode(0xD7) else {
            panic!("not a multiplication");
        };

        // 1101_0111: QQQ = 101, d = 0, k = 1, macr
        assert_eq!((mul.s1, mul.s2), (Reg::Y0, Reg::X0));
        assert!(mul.negate && mul.accumulate && mul.round);
        assert_eq!(mul.dst, Acc::A);
    }
}
