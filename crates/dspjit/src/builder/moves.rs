use super::BlockBuilder;
use super::alu::acc_id;
use super::util::MASK24;
use crate::block::Fastmem;
use crate::hooks;
use crate::registers::RegId;
use cranelift::{codegen::ir, prelude::InstBuilder, prelude::IntCC};
use dsp56k::agu::{AddressingClass, Ea, EaMode};
use dsp56k::ins::{AluOp, Operand, ParallelMove};
use dsp56k::regs::{Acc, Reg};
use dsp56k::{Space, U8, U24};

/// L and S in SR.
const LIMIT_BIT: i64 = 6;
const SCALING_BIT: i64 = 7;

/// The registers a native move writes.
fn move_writes(mv: ParallelMove) -> impl Iterator<Item = Reg> {
    let (first, second) = match mv {
        ParallelMove::Imm { dst, .. } | ParallelMove::Reg { dst, .. } => (Some(dst), None),
        ParallelMove::Mem {
            reg, load: true, ..
        } => (Some(reg), None),
        ParallelMove::XY { x, y } => (x.load.then_some(x.reg), y.load.then_some(y.reg)),
        _ => (None, None),
    };

    first.into_iter().chain(second)
}

/// The registers a native move reads or writes.
fn move_registers(mv: ParallelMove) -> impl Iterator<Item = Reg> {
    let (first, second) = match mv {
        ParallelMove::Imm { dst, .. } => (Some(dst), None),
        ParallelMove::Reg { src, dst } => (Some(src), Some(dst)),
        ParallelMove::Mem { reg, .. } => (Some(reg), None),
        ParallelMove::XY { x, y } => (Some(x.reg), Some(y.reg)),
        _ => (None, None),
    };

    first.into_iter().chain(second)
}

impl BlockBuilder<'_> {
    fn is_native_move(mv: ParallelMove) -> bool {
        match mv {
            ParallelMove::None | ParallelMove::Update(_) => true,
            ParallelMove::Imm { .. }
            | ParallelMove::Reg { .. }
            | ParallelMove::Mem { .. }
            | ParallelMove::XY { .. } => {
                move_registers(mv).all(|reg| RegId::of(reg).is_some())
            }
            _ => false,
        }
    }

    /// Whether a parallel instruction can be compiled without the interpreter.
    pub(super) fn is_native_parallel(alu: AluOp, mv: ParallelMove) -> bool {
        if !Self::is_native_alu(alu) || !Self::is_native_move(mv) {
            return false;
        }

        // both halves writing the same accumulator is resolved by the interpreter
        alu.dst()
            .is_none_or(|dst| move_writes(mv).all(|reg| reg.acc() != Some(dst)))
    }

    /// Updates an address register value with the addressing class of the block.
    fn agu_update(&mut self, index: u8, r: ir::Value, n: ir::Value, add: bool) -> ir::Value {
        match self.mode.class(index) {
            AddressingClass::Linear => {
                let updated = if add {
                    self.bd.ins().iadd(r, n)
                } else {
                    self.bd.ins().isub(r, n)
                };

                self.bd.ins().band_imm(updated, MASK24)
            }
            _ => {
                let m = self.get(RegId::M(index));
                let add = self.ir_value(add);
                let inst = self.call(
                    self.consts.sigs.agu,
                    hooks::agu_update as usize,
                    &[r, n, m, add],
                );

                self.bd.inst_results(inst)[0]
            }
        }
    }

    /// Computes the address of an effective address and applies its register update.
    fn resolve_ea(&mut self, ea: Ea, ext: U24) -> ir::Value {
        let i = ea.reg & 7;
        match ea.mode {
            EaMode::Absolute | EaMode::Immediate => self.ir_value(ext.value()),
            EaMode::NoUpdate => self.get(RegId::R(i)),
            EaMode::Indexed => {
                let r = self.get(RegId::R(i));
                let n = self.get(RegId::N(i));
                self.agu_update(i, r, n, true)
            }
            EaMode::PreDec => {
                let r = self.get(RegId::R(i));
                let one = self.ir_value(1u32);
                let updated = self.agu_update(i, r, one, false);
                self.set(RegId::R(i), updated);
                updated
            }
            EaMode::PostDecN | EaMode::PostIncN | EaMode::PostDec | EaMode::PostInc => {
                let r = self.get(RegId::R(i));
                let n = match ea.mode {
                    EaMode::PostDecN | EaMode::PostIncN => self.get(RegId::N(i)),
                    _ => self.ir_value(1u32),
                };

                let add = matches!(ea.mode, EaMode::PostIncN | EaMode::PostInc);
                let updated = self.agu_update(i, r, n, add);
                self.set(RegId::R(i), updated);
                r
            }
        }
    }

    /// Branches on whether `addr` is below the fast memory limit of `space`. Returns the fast
    /// block, the slow block and the continuation block.
    fn fastmem_split(
        &mut self,
        space: Space,
        addr: ir::Value,
        result: ir::Type,
    ) -> (ir::Block, ir::Block, ir::Block, ir::Value) {
        let limit = self.bd.ins().load(
            ir::types::I32,
            ir::MemFlags::trusted(),
            self.consts.fmem_ptr,
            Fastmem::limit_offset(space),
        );
        let fast = self.bd.ins().icmp(IntCC::UnsignedLessThan, addr, limit);

        let fast_bb = self.bd.create_block();
        let slow_bb = self.bd.create_block();
        let cont_bb = self.bd.create_block();
        let value = self.bd.append_block_param(cont_bb, result);

        self.bd.ins().brif(fast, fast_bb, &[], slow_bb, &[]);
        self.bd.seal_block(fast_bb);
        self.bd.seal_block(slow_bb);

        (fast_bb, slow_bb, cont_bb, value)
    }

    /// Address of a word in fast memory.
    fn fastmem_addr(&mut self, space: Space, addr: ir::Value) -> ir::Value {
        let base = self.bd.ins().load(
            self.consts.ptr_type,
            ir::MemFlags::trusted(),
            self.consts.fmem_ptr,
            Fastmem::base_offset(space),
        );

        let offset = self.bd.ins().uextend(self.consts.ptr_type, addr);
        let offset = self.bd.ins().ishl_imm(offset, 2);
        self.bd.ins().iadd(base, offset)
    }

    fn read_hook(&mut self, space: Space, addr: ir::Value) -> ir::Value {
        let space = self.ir_value(space as u32);
        let inst = self.call(
            self.consts.sigs.read,
            self.compiler.hooks.read as usize,
            &[self.consts.ctx_ptr, space, addr],
        );

        self.bd.inst_results(inst)[0]
    }

    fn write_hook(&mut self, space: Space, addr: ir::Value, value: ir::Value) -> ir::Value {
        let space = self.ir_value(space as u32);
        let inst = self.call(
            self.consts.sigs.write,
            self.compiler.hooks.write as usize,
            &[self.consts.ctx_ptr, space, addr, value],
        );

        self.bd.inst_results(inst)[0]
    }

    /// Reads a data memory word.
    pub(super) fn read_mem(&mut self, space: Space, addr: ir::Value) -> ir::Value {
        if !self.compiler.settings.fastmem {
            return self.read_hook(space, addr);
        }

        let (fast_bb, slow_bb, cont_bb, value) = self.fastmem_split(space, addr, ir::types::I32);

        self.bd.switch_to_block(fast_bb);
        let ptr = self.fastmem_addr(space, addr);
        let fast = self
            .bd
            .ins()
            .load(ir::types::I32, ir::MemFlags::trusted(), ptr, 0);
        self.bd.ins().jump(cont_bb, &[ir::BlockArg::Value(fast)]);

        self.bd.switch_to_block(slow_bb);
        let slow = self.read_hook(space, addr);
        self.bd.ins().jump(cont_bb, &[ir::BlockArg::Value(slow)]);

        self.bd.seal_block(cont_bb);
        self.bd.switch_to_block(cont_bb);
        value
    }

    /// Writes a data memory word, recording whether the write asks the block to stop.
    pub(super) fn write_mem(&mut self, space: Space, addr: ir::Value, value: ir::Value) {
        let stop = if self.compiler.settings.fastmem {
            let (fast_bb, slow_bb, cont_bb, stop) =
                self.fastmem_split(space, addr, ir::types::I8);

            self.bd.switch_to_block(fast_bb);
            let ptr = self.fastmem_addr(space, addr);
            self.bd
                .ins()
                .store(ir::MemFlags::trusted(), value, ptr, 0);
            let no = self.ir_value(false);
            self.bd.ins().jump(cont_bb, &[ir::BlockArg::Value(no)]);

            self.bd.switch_to_block(slow_bb);
            let slow = self.write_hook(space, addr, value);
            self.bd.ins().jump(cont_bb, &[ir::BlockArg::Value(slow)]);

            self.bd.seal_block(cont_bb);
            self.bd.switch_to_block(cont_bb);
            stop
        } else {
            self.write_hook(space, addr, value)
        };

        self.stop = Some(match self.stop {
            Some(previous) => self.bd.ins().bor(previous, stop),
            None => stop,
        });
    }

    /// An accumulator as it appears on the data bus: scaled and limited. Also returns the L and
    /// S bits the read sets.
    fn limited_acc(&mut self, acc: Acc) -> (ir::Value, ir::Value) {
        let value = self.get(acc_id(acc));
        let scaled = self.scaled(value);
        let fits = self.fits_48(scaled);

        let high = self.bd.ins().sshr_imm(scaled, 24);
        let high = self.bd.ins().ireduce(ir::types::I32, high);
        let high = self.bd.ins().band_imm(high, MASK24);

        let negative = self.bd.ins().icmp_imm(IntCC::SignedLessThan, scaled, 0);
        let min = self.ir_value(0x80_0000u32);
        let max = self.ir_value(0x7F_FFFFu32);
        let limit = self.bd.ins().select(negative, min, max);
        let word = self.bd.ins().select(fits, high, limit);

        let limited = self.not(fits);
        let limited = self.bd.ins().uextend(ir::types::I32, limited);
        let limited = self.bd.ins().ishl_imm(limited, LIMIT_BIT);

        let bit46 = self.bd.ins().sshr_imm(scaled, 46);
        let bit45 = self.bd.ins().sshr_imm(scaled, 45);
        let sticky = self.bd.ins().bxor(bit46, bit45);
        let sticky = self.bd.ins().ireduce(ir::types::I32, sticky);
        let sticky = self.bd.ins().band_imm(sticky, 1);
        let sticky = self.bd.ins().ishl_imm(sticky, SCALING_BIT);

        let flags = self.bd.ins().bor(limited, sticky);
        (word, flags)
    }

    /// Reads a register without side effects.
    pub(super) fn peek(&mut self, reg: Reg) -> ir::Value {
        match reg {
            Reg::A0 | Reg::B0 | Reg::A1 | Reg::B1 | Reg::A2 | Reg::B2 => {
                let value = self.get(RegId::of(reg).unwrap_or(RegId::A));
                match reg {
                    Reg::A0 | Reg::B0 => self.acc_low(value),
                    Reg::A1 | Reg::B1 => self.acc_high(value),
                    _ => self.acc_ext(value),
                }
            }
            Reg::A => self.limited_acc(Acc::A).0,
            Reg::B => self.limited_acc(Acc::B).0,
            _ => match RegId::of(reg) {
                Some(id) => self.get(id),
                None => unreachable!("{reg} is not handled by compiled moves"),
            },
        }
    }

    /// Reads a register as a move source, accumulating the L and S bits of accumulator reads.
    fn read_reg(&mut self, reg: Reg) -> ir::Value {
        let acc = match reg {
            Reg::A => Acc::A,
            Reg::B => Acc::B,
            _ => return self.peek(reg),
        };

        let (word, flags) = self.limited_acc(acc);
        self.move_flags = Some(match self.move_flags {
            Some(previous) => self.bd.ins().bor(previous, flags),
            None => flags,
        });

        word
    }

    /// Writes a register as a move destination.
    fn write_reg(&mut self, reg: Reg, value: ir::Value) {
        match reg {
            Reg::A0 | Reg::B0 | Reg::A1 | Reg::B1 | Reg::A2 | Reg::B2 => {
                let acc = RegId::of(reg).unwrap_or(RegId::A);
                let current = self.get(acc);
                let updated = match reg {
                    Reg::A0 | Reg::B0 => self.acc_with(current, value, 0, MASK24),
                    Reg::A1 | Reg::B1 => self.acc_with_high(current, value),
                    _ => self.acc_with(current, value, 48, 0xFF << 48),
                };

                self.set(acc, updated);
            }
            Reg::A | Reg::B => {
                let acc = self.acc_from_word(value);
                self.set(if reg == Reg::A { RegId::A } else { RegId::B }, acc);
            }
            _ => match RegId::of(reg) {
                Some(id) => self.set(id, value),
                None => unreachable!("{reg} is not handled by compiled moves"),
            },
        }
    }

    fn short_immediate(&mut self, value: U8, dst: Reg) {
        let value = value.value() as u32;
        let word = match dst {
            Reg::X0 | Reg::X1 | Reg::Y0 | Reg::Y1 | Reg::A | Reg::B | Reg::A1 | Reg::B1 => {
                value << 16
            }
            _ => value,
        };

        let word = self.ir_value(word);
        self.write_reg(dst, word);
    }

    fn operand_addr(&mut self, operand: Operand, ext: U24) -> ir::Value {
        match operand {
            Operand::Ea(ea) => self.resolve_ea(ea, ext),
            Operand::Short(addr) => self.ir_value(addr),
        }
    }

    /// Emits the data move half of a parallel instruction.
    pub(super) fn data_move(&mut self, mv: ParallelMove, ext: U24) {
        match mv {
            ParallelMove::None => (),
            ParallelMove::Update(ea) => {
                self.resolve_ea(ea, ext);
            }
            ParallelMove::Imm { value, dst } => self.short_immediate(value, dst),
            ParallelMove::Reg { src, dst } => {
                let value = self.read_reg(src);
                self.write_reg(dst, value);
            }
            ParallelMove::Mem {
                space,
                operand,
                reg,
                load: true,
            } => {
                let addr = self.operand_addr(operand, ext);
                let value = match operand {
                    Operand::Ea(ea) if ea.mode == EaMode::Immediate => addr,
                    _ => self.read_mem(space, addr),
                };

                self.write_reg(reg, value);
            }
            ParallelMove::Mem {
                space,
                operand,
                reg,
                load: false,
            } => {
                let value = self.read_reg(reg);
                let addr = self.operand_addr(operand, ext);
                self.write_mem(space, addr, value);
            }
            ParallelMove::XY { x, y } => {
                let x_addr = self.resolve_ea(x.ea, ext);
                let y_addr = self.resolve_ea(y.ea, ext);

                let x_value = if x.load {
                    self.read_mem(Space::X, x_addr)
                } else {
                    self.read_reg(x.reg)
                };

                let y_value = if y.load {
                    self.read_mem(Space::Y, y_addr)
                } else {
                    self.read_reg(y.reg)
                };

                if x.load {
                    self.write_reg(x.reg, x_value);
                } else {
                    self.write_mem(Space::X, x_addr, x_value);
                }

                if y.load {
                    self.write_reg(y.reg, y_value);
                } else {
                    self.write_mem(Space::Y, y_addr, y_value);
                }
            }
            _ => unreachable!("{mv:?} is executed by the interpreter"),
        }
    }

    /// Emits a parallel instruction: the ALU operation sees the registers from before the move.
    pub(super) fn parallel(&mut self, alu: AluOp, mv: ParallelMove, ext: U24) {
        let outcome = self.alu(alu);
        self.data_move(mv, ext);
        self.apply(outcome);
    }
}
