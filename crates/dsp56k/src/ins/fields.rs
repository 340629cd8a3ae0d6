//! Raw instruction fields to registers.
//!
//! Every encoding of a register inside an instruction goes through one of these tables.
use crate::regs::{Acc, Reg};

/// The 6-bit register select (`DDDDDD`).
pub fn reg6(value: u32) -> Option<Reg> {
    Some(match value & 0x3F {
        0x04 => Reg::X0,
        0x05 => Reg::X1,
        0x06 => Reg::Y0,
        0x07 => Reg::Y1,
        0x08 => Reg::A0,
        0x09 => Reg::B0,
        0x0A => Reg::A2,
        0x0B => Reg::B2,
        0x0C => Reg::A1,
        0x0D => Reg::B1,
        0x0E => Reg::A,
        0x0F => Reg::B,
        i @ 0x10..=0x17 => Reg::R(i as u8 & 7),
        i @ 0x18..=0x1F => Reg::N(i as u8 & 7),
        i @ 0x20..=0x27 => Reg::M(i as u8 & 7),
        0x2A => Reg::Ep,
        0x30 => Reg::Vba,
        0x31 => Reg::Sc,
        0x38 => Reg::Sz,
        0x39 => Reg::Sr,
        0x3A => Reg::Omr,
        0x3B => Reg::Sp,
        0x3C => Reg::Ssh,
        0x3D => Reg::Ssl,
        0x3E => Reg::La,
        0x3F => Reg::Lc,
        _ => return None,
    })
}

/// The 5-bit data/address register select (`ddddd`), the low half of the 6-bit table.
pub fn reg5(value: u32) -> Option<Reg> {
    reg6(value & 0x1F)
}

/// The 5-bit control register select used by MOVEC, the high half of the 6-bit table.
pub fn ctrl5(value: u32) -> Option<Reg> {
    reg6(0x20 | (value & 0x1F))
}

/// The 4-bit data register select (`DDDD`) used by moves with short displacements.
pub fn reg4(value: u32) -> Option<Reg> {
    match value & 0xF {
        0..4 => None,
        v => reg6(v),
    }
}

/// The 3-bit source select (`sss`) of shifts by register, field operations and MERGE.
pub fn reg3(value: u32) -> Option<Reg> {
    Some(match value & 0b111 {
        0b010 => Reg::A1,
        0b011 => Reg::B1,
        0b100 => Reg::X0,
        0b101 => Reg::Y0,
        0b110 => Reg::X1,
        0b111 => Reg::Y1,
        _ => return None,
    })
}

/// The 2-bit data register select (`JJ`) of the ALU and DIV.
pub fn data2(value: u32) -> Reg {
    match value & 0b11 {
        0b00 => Reg::X0,
        0b01 => Reg::Y0,
        0b10 => Reg::X1,
        _ => Reg::Y1,
    }
}

/// The 3-bit multiplier operand pair (`QQQ`) of parallel multiplications.
pub fn mul_pair3(value: u32) -> (Reg, Reg) {
    match value & 0b111 {
        0b000 => (Reg::X0, Reg::X0),
        0b001 => (Reg::Y0, Reg::Y0),
        0b010 => (Reg::X1, Reg::X0),
        0b011 => (Reg::Y1, Reg::Y0),
        0b100 => (Reg::X0, Reg::Y1),
        0b101 => (Reg::Y0, Reg::X0),
        0b110 => (Reg::X1, Reg::Y0),
        _ => (Reg::Y1, Reg::X1),
    }
}

/// The 4-bit multiplier operand pair (`QQQQ`) of the mixed sign multiplications and DMAC.
pub fn mul_pair4(value: u32) -> (Reg, Reg) {
    match value & 0b1111 {
        v @ 0b0000..=0b0111 => mul_pair3(v),
        0b1000 => (Reg::X1, Reg::X1),
        0b1001 => (Reg::Y1, Reg::Y1),
        0b1010 => (Reg::X0, Reg::X1),
        0b1011 => (Reg::Y0, Reg::Y1),
        0b1100 => (Reg::Y1, Reg::X0),
        0b1101 => (Reg::X0, Reg::Y0),
        0b1110 => (Reg::Y0, Reg::X1),
        _ => (Reg::X1, Reg::Y1),
    }
}

/// The multiplier operand (`QQ`) of `mpy ±S,#n`.
pub fn mul_shift_src(value: u32) -> Reg {
    match value & 0b11 {
        0b00 => Reg::Y1,
        0b01 => Reg::X0,
        0b10 => Reg::Y0,
        _ => Reg::X1,
    }
}

/// The transfer source of `Tcc` (`JJJ` with `d`), `None` for reserved encodings.
pub fn tcc_src(jjj: u32, dst: Acc) -> Option<Reg> {
    match jjj & 0b111 {
        0b000 => Some(match dst.other() {
            Acc::A => Reg::A,
            Acc::B => Reg::B,
        }),
        v @ 0b100..=0b111 => Some(data2(v)),
        _ => None,
    }
}

/// Destination of LUA with an address register update (`dddd`).
pub fn addr4(value: u32) -> Reg {
    let index = (value & 0b111) as u8;
    if value & 0b1000 == 0 {
        Reg::R(index)
    } else {
        Reg::N(index)
    }
}

/// X register of XY moves and class I X:R moves (`ee`/`ff`).
pub fn xy_x(value: u32) -> Reg {
    match value & 0b11 {
        0b00 => Reg::X0,
        0b01 => Reg::X1,
        0b10 => Reg::A,
        _ => Reg::B,
    }
}

/// Y register of XY moves and class I R:Y moves (`ff`).
pub fn xy_y(value: u32) -> Reg {
    match value & 0b11 {
        0b00 => Reg::Y0,
        0b01 => Reg::Y1,
        0b10 => Reg::A,
        _ => Reg::B,
    }
}

/// Accumulator encoded in a single bit.
pub fn acc(value: u32) -> Acc {
    Acc::new(value)
}

/// Register of an accumulator as seen by moves.
pub fn acc_reg(acc: Acc) -> Reg {
    match acc {
        Acc::A => Reg::A,
        Acc::B => Reg::B,
    }
}

/// Long (48-bit) move registers (`LLL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LongReg {
    /// A1:A0, unlimited.
    A10,
    /// B1:B0, unlimited.
    B10,
    X,
    Y,
    /// A, limited.
    A,
    /// B, limited.
    B,
    /// A to X memory, B to Y memory.
    AB,
    /// B to X memory, A to Y memory.
    BA,
}

impl LongReg {
    pub fn new(value: u32) -> Self {
        match value & 0b111 {
            0b000 => Self::A10,
            0b001 => Self::B10,
            0b010 => Self::X,
            0b011 => Self::Y,
            0b100 => Self::A,
            0b101 => Self::B,
            0b110 => Self::AB,
            _ => Self::BA,
        }
    }
}

impl std::fmt::Display for LongReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::A10 => "a10",
            Self::B10 => "b10",
            Self::X => "x",
            Self::Y => "y",
            Self::A => "a",
            Self::B => "b",
            Self::AB => "ab",
            Self::BA => "ba",
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ins::opcodes::is_reg6;

    #[test]
    fn reg6_matches_validity() {
        for value in 0..64 {
            assert_eq!(reg6(value).is_some(), is_reg6(value), "{value:02X}");
        }
    }

    #[test]
    fn control_registers() {
        assert_eq!(ctrl5(0b11001), Some(Reg::Sr));
        assert_eq!(ctrl5(0b11111), Some(Reg::Lc));
        assert_eq!(ctrl5(0b00011), Some(Reg::M(3)));
        assert_eq!(ctrl5(0b01000), None);
    }

    #[test]
    fn short_tables() {
        assert_eq!(reg5(0x0E), Some(Reg::A));
        assert_eq!(reg5(0x13), Some(Reg::R(3)));
        assert_eq!(reg4(0b0011), None);
        assert_eq!(reg3(0b001), None);
        assert_eq!(mul_pair4(0b1111), (Reg::X1, Reg::Y1));
        assert_eq!(tcc_src(0, Acc::A), Some(Reg::B));
        assert_eq!(tcc_src(0b010, Acc::A), None);
    }
}
