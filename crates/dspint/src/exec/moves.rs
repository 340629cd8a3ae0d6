//! Parallel data moves and how they combine with the ALU half of an instruction.
use super::alu;
use crate::{ExecError, Interpreter};
use dsp56k::agu::{Ea, EaMode};
use dsp56k::ins::fields::{LongReg, acc_reg};
use dsp56k::ins::{AluOp, Ins, Operand, ParallelMove};
use dsp56k::regs::{Acc, Reg, Registers};
use dsp56k::{Dsp, Space, U8, U24, U48, U56};

/// L and S: the flags a move can set in SR.
const MOVE_FLAGS: u32 = 0b1100_0000;

/// The registers both halves of a parallel instruction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Latch {
    a: U56,
    b: U56,
    x0: U24,
    x1: U24,
    y0: U24,
    y1: U24,
    sr: U24,
}

impl Latch {
    fn capture(regs: &Registers) -> Self {
        Self {
            a: regs.a,
            b: regs.b,
            x0: regs.x0,
            x1: regs.x1,
            y0: regs.y0,
            y1: regs.y1,
            sr: regs.sr,
        }
    }

    fn restore(self, regs: &mut Registers) {
        regs.a = self.a;
        regs.b = self.b;
        regs.x0 = self.x0;
        regs.x1 = self.x1;
        regs.y0 = self.y0;
        regs.y1 = self.y1;
        regs.sr = self.sr;
    }

    /// Combines the results of the move and the ALU operation, both started from `self`.
    fn merge(self, pc: U24, moved: Self, computed: Self) -> Result<Self, ExecError> {
        fn pick<T: PartialEq + Copy>(
            pc: U24,
            reg: Reg,
            before: T,
            moved: T,
            computed: T,
        ) -> Result<T, ExecError> {
            if moved == before {
                Ok(computed)
            } else if computed == before || computed == moved {
                Ok(moved)
            } else {
                Err(ExecError::ParallelConflict { pc, reg })
            }
        }

        let control = !MOVE_FLAGS;
        let sr = if (moved.sr.value() ^ self.sr.value()) & control != 0 {
            moved.sr
        } else {
            U24::new(computed.sr.value() | (moved.sr.value() & MOVE_FLAGS))
        };

        Ok(Self {
            a: pick(pc, Reg::A, self.a, moved.a, computed.a)?,
            b: pick(pc, Reg::B, self.b, moved.b, computed.b)?,
            x0: pick(pc, Reg::X0, self.x0, moved.x0, computed.x0)?,
            x1: pick(pc, Reg::X1, self.x1, moved.x1, computed.x1)?,
            y0: pick(pc, Reg::Y0, self.y0, moved.y0, computed.y0)?,
            y1: pick(pc, Reg::Y1, self.y1, moved.y1, computed.y1)?,
            sr,
        })
    }
}

/// Writes a short immediate. Data ALU registers take it as a fraction.
pub fn short_immediate(regs: &mut Registers, value: U8, dst: Reg) {
    let value = value.value() as u32;
    let word = match dst {
        Reg::X0 | Reg::X1 | Reg::Y0 | Reg::Y1 | Reg::A | Reg::B | Reg::A1 | Reg::B1 => value << 16,
        _ => value,
    };

    regs.write(dst, U24::new(word));
}

/// Reads a long register pair as a move source would.
pub fn long_read(regs: &mut Registers, reg: LongReg) -> (U24, U24) {
    match reg {
        LongReg::A10 => (regs.a.high(), regs.a.low()),
        LongReg::B10 => (regs.b.high(), regs.b.low()),
        LongReg::X => (regs.x1, regs.x0),
        LongReg::Y => (regs.y1, regs.y0),
        LongReg::A | LongReg::B => {
            let acc = if reg == LongReg::A { Acc::A } else { Acc::B };
            let pair = regs.read_acc_pair(acc);
            (pair.high(), pair.low())
        }
        LongReg::AB => (regs.read_acc(Acc::A), regs.read_acc(Acc::B)),
        LongReg::BA => (regs.read_acc(Acc::B), regs.read_acc(Acc::A)),
    }
}

/// Writes a long register pair as a move destination would.
pub fn long_write(regs: &mut Registers, reg: LongReg, high: U24, low: U24) {
    match reg {
        LongReg::A10 => regs.a = regs.a.with_high(high).with_low(low),
        LongReg::B10 => regs.b = regs.b.with_high(high).with_low(low),
        LongReg::X => regs.set_x(U48::from_halves(high, low)),
        LongReg::Y => regs.set_y(U48::from_halves(high, low)),
        LongReg::A => regs.a = U56::from_pair(U48::from_halves(high, low)),
        LongReg::B => regs.b = U56::from_pair(U48::from_halves(high, low)),
        LongReg::AB => {
            regs.write(Reg::A, high);
            regs.write(Reg::B, low);
        }
        LongReg::BA => {
            regs.write(Reg::B, high);
            regs.write(Reg::A, low);
        }
    }
}

#[inline(always)]
fn is_immediate(ea: Ea) -> bool {
    ea.mode == EaMode::Immediate
}

/// Reads a data word from memory, or returns the address itself for immediate operands.
#[inline(always)]
pub(crate) fn load(dsp: &mut Dsp, space: Space, ea: Ea, addr: U24) -> U24 {
    if is_immediate(ea) {
        addr
    } else {
        dsp.read(space, addr)
    }
}

impl Interpreter {
    /// Executes a parallel instruction.
    pub(crate) fn parallel(
        &mut self,
        dsp: &mut Dsp,
        ins: Ins,
        op: AluOp,
        mv: ParallelMove,
    ) -> Result<(), ExecError> {
        match (op, mv) {
            (_, ParallelMove::IfCc { cond, update_ccr }) => {
                if cond.eval(dsp.regs.status()) {
                    let sr = dsp.regs.sr;
                    alu::execute(&mut dsp.regs, op);
                    if !update_ccr {
                        dsp.regs.sr = sr;
                    }
                }
            }
            (_, ParallelMove::None) => alu::execute(&mut dsp.regs, op),
            (AluOp::None, _) => self.data_move(dsp, ins.ext, mv),
            _ => {
                let before = Latch::capture(&dsp.regs);
                self.data_move(dsp, ins.ext, mv);
                let moved = Latch::capture(&dsp.regs);

                before.restore(&mut dsp.regs);
                alu::execute(&mut dsp.regs, op);
                let computed = Latch::capture(&dsp.regs);

                before.merge(self.pc, moved, computed)?.restore(&mut dsp.regs);
            }
        }

        Ok(())
    }

    fn data_move(&mut self, dsp: &mut Dsp, ext: U24, mv: ParallelMove) {
        match mv {
            ParallelMove::None | ParallelMove::IfCc { .. } => (),
            ParallelMove::Update(ea) => {
                ea.resolve(&mut dsp.regs, ext);
            }
            ParallelMove::Imm { value, dst } => short_immediate(&mut dsp.regs, value, dst),
            ParallelMove::Reg { src, dst } => {
                let value = dsp.regs.read(src);
                dsp.regs.write(dst, value);
            }
            ParallelMove::Mem {
                space,
                operand,
                reg,
                load: true,
            } => {
                let value = match operand {
                    Operand::Ea(ea) => {
                        let addr = ea.resolve(&mut dsp.regs, ext);
                        load(dsp, space, ea, addr)
                    }
                    Operand::Short(addr) => dsp.read(space, U24::new(addr)),
                };

                dsp.regs.write(reg, value);
            }
            ParallelMove::Mem {
                space,
                operand,
                reg,
                load: false,
            } => {
                let value = dsp.regs.read(reg);
                let addr = self.operand_addr(dsp, operand, ext);
                dsp.write(space, addr, value);
            }
            ParallelMove::Long { operand, reg, load } => {
                if load {
                    let addr = self.operand_addr(dsp, operand, ext);
                    let high = dsp.read(Space::X, addr);
                    let low = dsp.read(Space::Y, addr);
                    long_write(&mut dsp.regs, reg, high, low);
                } else {
                    let (high, low) = long_read(&mut dsp.regs, reg);
                    let addr = self.operand_addr(dsp, operand, ext);
                    dsp.write(Space::X, addr, high);
                    dsp.write(Space::Y, addr, low);
                }
            }
            ParallelMove::XR {
                ea,
                reg,
                load,
                s2,
                d2,
            } => {
                let transfer = dsp.regs.read_acc(s2);
                self.single_side(dsp, Space::X, ea, ext, reg, load);
                dsp.regs.write(d2, transfer);
            }
            ParallelMove::RY {
                ea,
                reg,
                load,
                s1,
                d1,
            } => {
                let transfer = dsp.regs.read_acc(s1);
                self.single_side(dsp, Space::Y, ea, ext, reg, load);
                dsp.regs.write(d1, transfer);
            }
            ParallelMove::XRAcc { ea, acc } => {
                let value = dsp.regs.read_acc(acc);
                let x0 = dsp.regs.x0;
                let addr = ea.resolve(&mut dsp.regs, ext);
                dsp.write(Space::X, addr, value);
                dsp.regs.write(acc_reg(acc), x0);
            }
            ParallelMove::RYAcc { ea, acc } => {
                let value = dsp.regs.read_acc(acc);
                let y0 = dsp.regs.y0;
                let addr = ea.resolve(&mut dsp.regs, ext);
                dsp.write(Space::Y, addr, value);
                dsp.regs.write(acc_reg(acc), y0);
            }
            ParallelMove::XY { x, y } => {
                // every source is read before any destination is written
                let x_addr = x.ea.resolve(&mut dsp.regs, ext);
                let y_addr = y.ea.resolve(&mut dsp.regs, ext);

                let x_value = if x.load {
                    dsp.read(Space::X, x_addr)
                } else {
                    dsp.regs.read(x.reg)
                };

                let y_value = if y.load {
                    dsp.read(Space::Y, y_addr)
                } else {
                    dsp.regs.read(y.reg)
                };

                if x.load {
                    dsp.regs.write(x.reg, x_value);
                } else {
                    dsp.write(Space::X, x_addr, x_value);
                }

                if y.load {
                    dsp.regs.write(y.reg, y_value);
                } else {
                    dsp.write(Space::Y, y_addr, y_value);
                }
            }
        }
    }

    #[inline(always)]
    fn operand_addr(&self, dsp: &mut Dsp, operand: Operand, ext: U24) -> U24 {
        match operand {
            Operand::Ea(ea) => ea.resolve(&mut dsp.regs, ext),
            Operand::Short(addr) => U24::new(addr),
        }
    }

    fn single_side(
        &self,
        dsp: &mut Dsp,
        space: Space,
        ea: Ea,
        ext: U24,
        reg: Reg,
        to_reg: bool,
    ) {
        if to_reg {
            let addr = ea.resolve(&mut dsp.regs, ext);
            let value = load(dsp, space, ea, addr);
            dsp.regs.write(reg, value);
        } else {
            let value = dsp.regs.read(reg);
            let addr = ea.resolve(&mut dsp.regs, ext);
            dsp.write(space, addr, value);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::{dsp_with, run};

    #[test]
    fn immediate_alignment() {
        let mut regs = Registers::default();
        short_immediate(&mut regs, U8::new(0x12), Reg::X0);
        short_immediate(&mut regs, U8::new(0x12), Reg::R(2));
        short_immediate(&mut regs, U8::new(0x80), Reg::A);

        assert_eq!(regs.x0, U24::new(0x12_0000));
        assert_eq!(regs.r[2], U24::new(0x12));
        assert_eq!(regs.a, U56::new(0xFF_800000_000000));
    }

    #[test]
    fn long_pairs() {
        let mut regs = Registers::default();
        long_write(&mut regs, LongReg::AB, U24::new(0x40_0000), U24::new(0xC0_0000));
        assert_eq!(regs.a, U56::new(0x00_400000_000000));
        assert_eq!(regs.b, U56::new(0xFF_C00000_000000));

        assert_eq!(
            long_read(&mut regs, LongReg::BA),
            (U24::new(0xC0_0000), U24::new(0x40_0000))
        );
    }

    #[test]
    fn alu_reads_registers_before_the_move() {
        // add x0,a x:(r0)+,x0
        let mut dsp = dsp_with(&[0x44_D840]);
        dsp.regs.x0 = U24::new(0x10_0000);
        dsp.mem.write(Space::X, U24::ZERO, U24::new(0x20_0000));

        let ins = dsp.fetch_ins(U24::ZERO).unwrap();
        let dsp56k::Decoded::Parallel { alu, mv } = ins.decoded else {
            panic!("not a parallel instruction");
        };
        assert_eq!(alu, AluOp::Add(dsp56k::ins::AluSrc::Reg(Reg::X0), Acc::A));
        assert!(matches!(mv, ParallelMove::Mem { reg: Reg::X0, load: true, .. }));

        run(&mut dsp, 1);
        assert_eq!(dsp.regs.a.high(), U24::new(0x10_0000));
        assert_eq!(dsp.regs.x0, U24::new(0x20_0000));
        assert_eq!(dsp.regs.r[0], U24::new(1));
    }

    #[test]
    fn conflicting_writes_are_reported() {
        // add x0,a x:(r0)+,a
        let mut dsp = dsp_with(&[0x56_D840]);
        dsp.regs.x0 = U24::new(0x10_0000);
        dsp.mem.write(Space::X, U24::ZERO, U24::new(0x20_0000));

        let mut int = Interpreter::new();
        let result = int.step(&mut dsp);
        assert!(matches!(
            result,
            Err(ExecError::ParallelConflict { reg: Reg::A, .. })
        ));
    }

    #[test]
    fn move_sets_limit_alongside_alu_flags() {
        // tst b a,x0
        let mut dsp = dsp_with(&[0x21_C40B]);
        dsp.regs.a = U56::new(0x01_000000_000000);

        run(&mut dsp, 1);
        assert_eq!(dsp.regs.x0, U24::new(0x7F_FFFF));
        let status = dsp.regs.status();
        assert!(status.limit() && status.zero());
    }
}
