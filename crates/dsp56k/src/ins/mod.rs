//! Instruction decoding.
pub mod alu;
pub mod fields;
pub mod moves;
mod opcodes;

pub use alu::{AluOp, AluSrc, Mul};
pub use moves::{Operand, ParallelMove, XyHalf};
pub use opcodes::{Flags, OpcodeInfo, Opcode};

use crate::agu::Ea;
use crate::bounded::U24;
use crate::regs::Status;
use easyerr::Error;
use strum::FromRepr;

include!(concat!(env!("OUT_DIR"), "/dsp56k_candidates.rs"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum Cond {
    CarryClear = 0b0000,
    GreaterOrEqual = 0b0001,
    NotEqual = 0b0010,
    Plus = 0b0011,
    NotNormalized = 0b0100,
    ExtensionClear = 0b0101,
    LimitClear = 0b0110,
    Greater = 0b0111,
    CarrySet = 0b1000,
    Less = 0b1001,
    Equal = 0b1010,
    Minus = 0b1011,
    Normalized = 0b1100,
    ExtensionSet = 0b1101,
    LimitSet = 0b1110,
    LessOrEqual = 0b1111,
}

impl Cond {
    #[inline(always)]
    pub fn new(value: u32) -> Self {
        match Self::from_repr((value & 0xF) as u8) {
            Some(cond) => cond,
            None => unreachable!(),
        }
    }

    /// Evaluates the condition against the condition code bits.
    #[inline(always)]
    pub fn eval(self, status: Status) -> bool {
        let c = status.carry();
        let v = status.overflow();
        let z = status.zero();
        let n = status.negative();
        let u = status.unnormalized();
        let e = status.extension();
        let l = status.limit();

        // the upper half of the table is the negation of the lower half
        let set = match self as u8 & 0b111 {
            0b000 => c,
            0b001 => n ^ v,
            0b010 => z,
            0b011 => n,
            0b100 => z | (!u & !e),
            0b101 => e,
            0b110 => l,
            _ => z | (n ^ v),
        };

        if self as u8 & 0b1000 != 0 { set } else { !set }
    }
}

impl std::fmt::Display for Cond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CarryClear => "cc",
            Self::GreaterOrEqual => "ge",
            Self::NotEqual => "ne",
            Self::Plus => "pl",
            Self::NotNormalized => "nn",
            Self::ExtensionClear => "ec",
            Self::LimitClear => "lc",
            Self::Greater => "gt",
            Self::CarrySet => "cs",
            Self::Less => "lt",
            Self::Equal => "eq",
            Self::Minus => "mi",
            Self::Normalized => "nr",
            Self::ExtensionSet => "es",
            Self::LimitSet => "ls",
            Self::LessOrEqual => "le",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("illegal instruction {word}")]
    Illegal { word: U24 },
    #[error("instruction {word} matches both {first:?} and {second:?}")]
    Ambiguous {
        word: U24,
        first: Opcode,
        second: Opcode,
    },
}

/// What an instruction word decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Parallel { alu: AluOp, mv: ParallelMove },
    Single(Opcode),
}

/// Whether an instruction word is a parallel (ALU + move) instruction.
#[inline(always)]
pub fn is_parallel(word: u32) -> bool {
    word & 0xF0_0000 != 0 || word & 0xFE_4000 == 0x08_0000
}

/// Gathers the bits of `word` selected by `mask`, most significant first.
#[inline(always)]
pub fn gather(word: u32, mask: u32) -> u32 {
    let mut result = 0;
    let mut mask = mask;
    while mask != 0 {
        let top = 31 - mask.leading_zeros();
        result = (result << 1) | ((word >> top) & 1);
        mask &= !(1 << top);
    }

    result
}

pub fn decode(word: U24) -> Result<Decoded, DecodeError> {
    let raw = word.value();
    if is_parallel(raw) {
        let illegal = || DecodeError::Illegal { word };
        let alu = AluOp::decode(raw as u8).ok_or_else(illegal)?;
        let mv = ParallelMove::decode(raw).ok_or_else(illegal)?;
        return Ok(Decoded::Parallel { alu, mv });
    }

    let mut found = None;
    for &opcode in CANDIDATES[((raw >> 10) & 0x3FF) as usize] {
        if !opcode.info().matches(raw) {
            continue;
        }

        if let Some(first) = found {
            return Err(DecodeError::Ambiguous {
                word,
                first,
                second: opcode,
            });
        }

        found = Some(opcode);
    }

    found
        .map(Decoded::Single)
        .ok_or(DecodeError::Illegal { word })
}

impl Decoded {
    /// Length in words of the instruction `word` decodes to.
    pub fn len(self, word: U24) -> u32 {
        let needs_ext = match self {
            Self::Parallel { mv, .. } => mv.needs_ext(),
            Self::Single(opcode) => {
                let info = opcode.info();
                info.flags.contains(Flags::EXT)
                    || (info.has_ea() && (word.value() >> 11) & 0b111 == 0b110)
            }
        };

        1 + u32::from(needs_ext)
    }

    pub fn opcode(self) -> Option<Opcode> {
        match self {
            Self::Single(opcode) => Some(opcode),
            Self::Parallel { .. } => None,
        }
    }

    pub fn flags(self) -> Flags {
        match self {
            Self::Single(opcode) => opcode.info().flags,
            Self::Parallel { .. } => Flags::NONE,
        }
    }
}

/// A decoded instruction together with its words.
#[derive(Debug, Clone, Copy)]
pub struct Ins {
    pub word: U24,
    /// The extension word. Only meaningful when `len() == 2`.
    pub ext: U24,
    pub decoded: Decoded,
}

impl Ins {
    pub fn new(word: U24, ext: U24) -> Result<Self, DecodeError> {
        Ok(Self {
            word,
            ext,
            decoded: decode(word)?,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> u32 {
        self.decoded.len(self.word)
    }

    /// Value of a named field of a non-parallel instruction.
    #[inline(always)]
    pub fn field(&self, letter: u8) -> u32 {
        match self.decoded {
            Decoded::Single(opcode) => gather(self.word.value(), opcode.info().field_mask(letter)),
            Decoded::Parallel { .. } => 0,
        }
    }

    /// The `MMMRRR` effective address of a non-parallel instruction.
    #[inline(always)]
    pub fn ea(&self) -> Option<Ea> {
        Ea::decode((self.field(b'M') << 3) | self.field(b'R'))
    }

    #[inline(always)]
    pub fn cond(&self) -> Cond {
        Cond::new(self.field(b'C'))
    }
}

impl std::fmt::Display for Ins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.decoded {
            Decoded::Parallel { alu, mv } => match (alu, mv) {
                (AluOp::None, ParallelMove::None) => f.write_str("nop"),
                (AluOp::None, mv) => write!(f, "move {mv}"),
                (alu, ParallelMove::None) => write!(f, "{alu}"),
                (alu, mv) => write!(f, "{alu} {mv}"),
            },
            Decoded::Single(opcode) => {
                let name = format!("{opcode:?}").to_ascii_lowercase();
                f.write_str(&name)?;

                let info = opcode.info();
                let mut separator = " ";
                for field in info.fields.iter().filter(|field| field.letter != 0) {
                    let value = gather(self.word.value(), field.mask);
                    write!(f, "{separator}{}={value:X}", field.letter as char)?;
                    separator = ",";
                }

                if self.len() == 2 {
                    write!(f, "{separator}{}", self.ext)?;
                }

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::regs::{Acc, Reg};
    use strum::VariantArray;

    #[test]
    fn unique_opcodes() {
        for value in 0..0x10_0000 {
            if is_parallel(value) {
                continue;
            }

            let mut hit = None;
            for opcode in Opcode::VARIANTS {
                if opcode.info().matches(value) {
                    if let Some(hit) = hit {
                        panic!("opcodes {hit:?} and {opcode:?} are valid for {value:06X}");
                    }

                    hit = Some(*opcode);
                }
            }
        }
    }

    #[test]
    fn candidates_agree_with_full_scan() {
        for value in (0..0x10_0000).step_by(7) {
            if is_parallel(value) {
                continue;
            }

            let scanned = Opcode::VARIANTS
                .iter()
                .copied()
                .find(|opcode| opcode.info().matches(value));

            let decoded = decode(U24::new(value)).ok().and_then(Decoded::opcode);
            assert_eq!(decoded, scanned, "{value:06X}");
        }
    }

    #[test]
    fn classification() {
        assert!(is_parallel(0x20_0000));
        assert!(is_parallel(0x08_0000));
        assert!(is_parallel(0xFF_FFFF));
        assert!(!is_parallel(0x08_4000));
        assert!(!is_parallel(0x0C_0000));
        assert!(!is_parallel(0x00_0000));
    }

    #[test]
    fn decodes_simple_instructions() {
        let decode = |word| decode(U24::new(word)).unwrap();

        assert_eq!(decode(0x00_0000), Decoded::Single(Opcode::Nop));
        assert_eq!(decode(0x00_000C), Decoded::Single(Opcode::Rts));
        assert_eq!(decode(0x0C_0123), Decoded::Single(Opcode::JmpAbs));
        assert_eq!(decode(0x0D_0456), Decoded::Single(Opcode::JsrAbs));
        assert_eq!(decode(0x0C_1D02), Decoded::Single(Opcode::AslImm));
        assert_eq!(
            decode(0x20_0032),
            Decoded::Parallel {
                alu: AluOp::Asl(Acc::A),
                mv: ParallelMove::None
            }
        );
    }

    #[test]
    fn illegal_words() {
        assert_eq!(
            decode(U24::new(0x00_0007)),
            Err(DecodeError::Illegal {
                word: U24::new(0x00_0007)
            })
        );

        // reserved ALU byte
        assert!(decode(U24::new(0x20_0008)).is_err());
    }

    #[test]
    fn instruction_lengths() {
        let len = |word| {
            let word = U24::new(word);
            decode(word).unwrap().len(word)
        };

        assert_eq!(len(0x00_0000), 1);
        assert_eq!(len(0x0D_1080), 2); // bsr long
        // jmp to an absolute address in the extension word
        assert_eq!(len(0x0A_F080), 2);
        // jmp (r0)
        assert_eq!(len(0x0A_E080), 1);
        // move x:abs,x0
        assert_eq!(len(0x44_F000), 2);
    }

    #[test]
    fn named_fields() {
        // movec x:(r3)+,sr with W = 1
        let ins = Ins::new(U24::new(0b0000_0101_1101_1011_0011_1001), U24::ZERO).unwrap();
        assert_eq!(ins.decoded, Decoded::Single(Opcode::MovecEa));
        assert_eq!(ins.field(b'W'), 1);
        assert_eq!(ins.field(b'd'), 0b11001);
        assert_eq!(fields::ctrl5(ins.field(b'd')), Some(Reg::Sr));
        assert_eq!(ins.ea().map(|ea| ea.reg), Some(3));

        // the short displacement of movex is split across the word
        assert_eq!(gather(0b1_0101_0000, 0b1_1000_0000), 0b10);
    }

    #[test]
    fn conditions() {
        let status = Status::default().with_zero(true);
        assert!(Cond::Equal.eval(status));
        assert!(!Cond::NotEqual.eval(status));
        assert!(Cond::LessOrEqual.eval(status));
        assert!(!Cond::Greater.eval(status));

        let status = Status::default().with_negative(true);
        assert!(Cond::Less.eval(status));
        assert!(Cond::Minus.eval(status));
        assert!(Cond::CarryClear.eval(status));
        // not zero but unnormalized bit clear and extension clear means normalized
        assert!(Cond::Normalized.eval(status));
    }
}
