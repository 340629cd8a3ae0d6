use dsp56k::Registers;
use dsp56k::agu::AddressingClass;
use dsp56k::regs::Scaling;

/// The part of the machine state a block is specialized for: the addressing class of every
/// address register, the scaling mode and the rounding mode.
///
/// Instructions that can change any of these end their block, so a block always runs in the
/// mode it was compiled for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Mode(u32);

impl Mode {
    const SCALING_SHIFT: u32 = 16;
    const ROUNDING_SHIFT: u32 = 18;

    pub fn of(regs: &Registers) -> Self {
        let mut bits = 0;
        for (i, m) in regs.m.iter().enumerate() {
            bits |= (AddressingClass::of(*m) as u32) << (2 * i);
        }

        let status = regs.status();
        bits |= (status.scaling_mode().value() as u32) << Self::SCALING_SHIFT;
        bits |= u32::from(status.rounding()) << Self::ROUNDING_SHIFT;

        Self(bits)
    }

    #[inline(always)]
    pub fn class(self, reg: u8) -> AddressingClass {
        AddressingClass::from_bits((self.0 >> (2 * (reg as u32 & 7))) as u8)
    }

    #[inline(always)]
    pub fn scaling(self) -> Scaling {
        Scaling::new(((self.0 >> Self::SCALING_SHIFT) & 0b11) as u8)
    }

    /// Whether rounding is two's complement instead of convergent.
    #[inline(always)]
    pub fn twos_complement_rounding(self) -> bool {
        (self.0 >> Self::ROUNDING_SHIFT) & 1 != 0
    }

    #[inline(always)]
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let classes = (0..8).map(|i| match self.class(i) {
            AddressingClass::Linear => 'l',
            AddressingClass::Modulo => 'm',
            AddressingClass::MultiWrap => 'w',
            AddressingClass::BitReverse => 'r',
        });

        write!(
            f,
            "Mode({} {:?}{})",
            classes.collect::<String>(),
            self.scaling(),
            if self.twos_complement_rounding() {
                " tc"
            } else {
                ""
            }
        )
    }
}
