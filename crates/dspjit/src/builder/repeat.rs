use super::{BlockBuilder, Exit, Step};
use crate::registers::RegId;
use crate::{BuildError, Source};
use cranelift::{codegen::ir, prelude::InstBuilder, prelude::IntCC};
use dsp56k::ins::{self, AluOp, Decoded, Ins, Opcode, ParallelMove, fields};
use dsp56k::regs::Reg;
use dsp56k::{Registers, U24};
use std::mem::offset_of;

/// How many times a REP repeats its instruction.
#[derive(Debug, Clone, Copy)]
enum Count {
    Const(u32),
    Reg(RegId),
}

/// The instruction a REP repeats.
#[derive(Debug, Clone, Copy)]
struct Body {
    alu: AluOp,
    mv: ParallelMove,
    ext: U24,
    len: u32,
}

impl BlockBuilder<'_> {
    fn rep_count(ins: &Ins, opcode: Opcode) -> Option<Count> {
        match opcode {
            Opcode::RepImm => Some(Count::Const((ins.field(b'h') << 8) | ins.field(b'i'))),
            Opcode::RepReg => match fields::reg6(ins.field(b'D'))? {
                reg @ (Reg::X0 | Reg::X1 | Reg::Y0 | Reg::Y1 | Reg::R(_) | Reg::N(_)) => {
                    RegId::of(reg).map(Count::Reg)
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// The instruction after a REP, if it can be repeated by compiled code.
    fn rep_body(&self, source: &mut impl Source, pc: U24) -> Option<Body> {
        let addr = pc.wrapping_add(U24::new(1));
        if source.is_volatile(addr) || source.is_block_start(addr) {
            return None;
        }

        let word = source.fetch(addr);
        let decoded = ins::decode(word).ok()?;
        let len = decoded.len(word);
        if self.covers_loop_end(addr, len) {
            return None;
        }

        let (alu, mv) = match decoded {
            Decoded::Parallel { alu, mv } if Self::is_native_parallel(alu, mv) => (alu, mv),
            Decoded::Single(Opcode::Nop) => (AluOp::None, ParallelMove::None),
            _ => return None,
        };

        let ext = if len == 2 {
            source.fetch(addr.wrapping_add(U24::new(1)))
        } else {
            U24::ZERO
        };

        Some(Body { alu, mv, ext, len })
    }

    /// Emits one execution of the repeated instruction, returning its stop flag.
    fn repeat_once(&mut self, body: Body) -> Option<ir::Value> {
        self.parallel(body.alu, body.mv, body.ext);
        if let Some(flags) = self.move_flags.take() {
            let sr = self.get(RegId::Sr);
            let sr = self.bd.ins().bor(sr, flags);
            self.set(RegId::Sr, sr);
        }

        self.stop.take()
    }

    /// `rep n; asr d`: a single shift by `n`, which must not be zero.
    fn repeat_asr(&mut self, acc: dsp56k::regs::Acc, count: ir::Value) {
        let id = super::alu::acc_id(acc);
        let value = self.get(id);
        let signed = self.sext56(value);

        let count = self.bd.ins().uextend(ir::types::I64, count);
        let max = self.ir_value(63i64);
        let amount = self.bd.ins().umin(count, max);
        let last = self.bd.ins().iadd_imm(count, -1);
        let last = self.bd.ins().umin(last, max);

        let shifted = self.bd.ins().sshr(signed, amount);
        let result = self.mask56(shifted);
        let carry_out = self.bd.ins().sshr(signed, last);
        let carry = self.get_bit(carry_out, 0);

        let sr = self.get(RegId::Sr);
        let sr = self.set_bit(sr, 0, carry);
        let sr = self.set_bit(sr, 1, false);

        self.set(id, result);
        self.set(RegId::Sr, sr);
        self.pending = Some(result);
    }

    fn store_rep_lc(&mut self) {
        let lc = self.load_field(ir::types::I32, offset_of!(Registers, lc));
        self.store_field(lc, offset_of!(Registers, rep_lc));
    }

    /// Repeats `body` `count` times, which must not be zero. The first pass is emitted on its
    /// own so every register the body touches is cached before the loop, which then carries
    /// them in variables across the back edge.
    fn repeat_loop(&mut self, body: Body, count: ir::Value) -> ir::Value {
        let stop = self.bd.declare_var(ir::types::I8);
        let first = match self.repeat_once(body) {
            Some(stopped) => stopped,
            None => self.ir_value(false),
        };
        self.bd.def_var(stop, first);

        // a pass either reads the previous pending result or replaces it, never both, so only
        // the one of the last pass has to survive the loop
        let result = self.pending.take().map(|value| {
            let ty = self.bd.func.dfg.value_type(value);
            let var = self.bd.declare_var(ty);
            self.bd.def_var(var, value);
            var
        });

        let header_bb = self.bd.create_block();
        let exit_bb = self.bd.create_block();
        let remaining = self.bd.append_block_param(header_bb, ir::types::I32);

        let left = self.bd.ins().iadd_imm(count, -1);
        let more = self.bd.ins().icmp_imm(IntCC::NotEqual, left, 0);
        self.bd.ins().brif(
            more,
            header_bb,
            &[ir::BlockArg::Value(left)],
            exit_bb,
            &[],
        );

        self.bd.switch_to_block(header_bb);
        if let Some(stopped) = self.repeat_once(body) {
            let previous = self.bd.use_var(stop);
            let stopped = self.bd.ins().bor(previous, stopped);
            self.bd.def_var(stop, stopped);
        }

        let value = self.pending.take();
        debug_assert!(value.is_none() || result.is_some());
        if let (Some(var), Some(value)) = (result, value) {
            self.bd.def_var(var, value);
        }

        let left = self.bd.ins().iadd_imm(remaining, -1);
        let more = self.bd.ins().icmp_imm(IntCC::NotEqual, left, 0);
        self.bd.ins().brif(
            more,
            header_bb,
            &[ir::BlockArg::Value(left)],
            exit_bb,
            &[],
        );
        self.bd.seal_block(header_bb);
        self.bd.seal_block(exit_bb);

        self.bd.switch_to_block(exit_bb);
        if let Some(var) = result {
            self.pending = Some(self.bd.use_var(var));
        }

        self.bd.use_var(stop)
    }

    /// Emits a REP together with the instruction it repeats. Returns `None` without emitting
    /// anything if the pair has to go through the interpreter.
    pub(super) fn repeat(
        &mut self,
        source: &mut impl Source,
        pc: U24,
        ins: Ins,
        opcode: Opcode,
    ) -> Result<Option<Step>, BuildError> {
        let Some(count) = Self::rep_count(&ins, opcode) else {
            return Ok(None);
        };

        let Some(body) = self.rep_body(source, pc) else {
            return Ok(None);
        };

        let after = pc.wrapping_add(U24::new(1 + body.len));
        let unroll = self.compiler.settings.rep_unroll_limit;
        let shift = match (body.alu, body.mv) {
            (AluOp::Asr(acc), ParallelMove::None) => Some(acc),
            _ => None,
        };

        self.count(1i32);
        let stop = match count {
            Count::Const(0) => None,
            Count::Const(n) => {
                self.store_rep_lc();
                self.count(n);

                if let Some(acc) = shift {
                    let n = self.ir_value(n);
                    self.repeat_asr(acc, n);
                    None
                } else if n <= unroll {
                    let mut stop = None;
                    for _ in 0..n {
                        if let Some(stopped) = self.repeat_once(body) {
                            stop = Some(match stop {
                                Some(previous) => self.bd.ins().bor(previous, stopped),
                                None => stopped,
                            });
                        }
                    }

                    stop
                } else {
                    let n = self.ir_value(n);
                    Some(self.repeat_loop(body, n))
                }
            }
            Count::Reg(reg) => {
                let n = self.get(reg);
                self.count(n);

                self.materialize();
                self.flush();
                self.clear();

                let repeat_bb = self.bd.create_block();
                let after_bb = self.bd.create_block();
                let stop_param = self.bd.append_block_param(after_bb, ir::types::I8);

                let zero = self.is_zero(n);
                let no = self.ir_value(false);
                self.bd.ins().brif(
                    zero,
                    after_bb,
                    &[ir::BlockArg::Value(no)],
                    repeat_bb,
                    &[],
                );
                self.bd.seal_block(repeat_bb);

                self.bd.switch_to_block(repeat_bb);
                self.store_rep_lc();
                let stop = if let Some(acc) = shift {
                    self.repeat_asr(acc, n);
                    self.ir_value(false)
                } else {
                    self.repeat_loop(body, n)
                };

                // both paths must leave the same registers cached
                self.materialize();
                self.flush();
                self.clear();

                self.bd
                    .ins()
                    .jump(after_bb, &[ir::BlockArg::Value(stop)]);
                self.bd.seal_block(after_bb);
                self.bd.switch_to_block(after_bb);

                Some(stop_param)
            }
        };

        if let Some(stop) = stop {
            self.side_exit(stop, Exit::Static(after), false)?;
        }

        Ok(Some(Step {
            len: 1 + body.len,
            instructions: 2,
            end: None,
        }))
    }
}
