use super::{BlockBuilder, Exit};
use crate::BuildError;
use crate::registers::RegId;
use cranelift::{codegen::ir, prelude::InstBuilder, prelude::IntCC};
use dsp56k::ins::{Cond, Flags, Ins, Opcode};
use dsp56k::{Registers, U24};
use std::mem::offset_of;

/// Stack pointer error bits.
const SP_STACK_ERROR: i64 = 1 << 4;
const SP_UNDERFLOW: i64 = 1 << 5;

impl BlockBuilder<'_> {
    pub(super) fn is_native_branch(opcode: Opcode) -> bool {
        use Opcode::*;

        matches!(
            opcode,
            JmpAbs
                | JsrAbs
                | JccAbs
                | JsccAbs
                | BraShort
                | BsrShort
                | BccShort
                | BsccShort
                | BraLong
                | BsrLong
                | BccLong
                | BsccLong
                | Rts
        )
    }

    /// Evaluates a condition code against SR, as a boolean.
    fn condition(&mut self, cond: Cond) -> ir::Value {
        self.materialize();
        let sr = self.get(RegId::Sr);

        let c = self.get_bit(sr, 0);
        let v = self.get_bit(sr, 1);
        let z = self.get_bit(sr, 2);
        let n = self.get_bit(sr, 3);

        let bits = cond as u8;
        let set = match bits & 0b111 {
            0b000 => c,
            0b001 => self.bd.ins().bxor(n, v),
            0b010 => z,
            0b011 => n,
            0b100 => {
                let u = self.get_bit(sr, 4);
                let e = self.get_bit(sr, 5);
                let either = self.bd.ins().bor(u, e);
                let normalized = self.not(either);
                self.bd.ins().bor(z, normalized)
            }
            0b101 => self.get_bit(sr, 5),
            0b110 => self.get_bit(sr, 6),
            _ => {
                let less = self.bd.ins().bxor(n, v);
                self.bd.ins().bor(z, less)
            }
        };

        if bits & 0b1000 != 0 {
            set
        } else {
            self.not(set)
        }
    }

    /// Address of a system stack slot: `base` plus four times the I32 `index`.
    fn stack_slot(&mut self, index: ir::Value) -> ir::Value {
        let offset = self.bd.ins().uextend(self.consts.ptr_type, index);
        let offset = self.bd.ins().ishl_imm(offset, 2);
        self.bd.ins().iadd(self.consts.regs_ptr, offset)
    }

    /// Pushes a pair of words into the system stack.
    fn push(&mut self, high: ir::Value, low: ir::Value) {
        let sp = self.get(RegId::Sp);
        let index = self.bd.ins().band_imm(sp, 0xF);

        let full = self.bd.ins().icmp_imm(IntCC::Equal, index, 15);
        let error = self.ir_value(SP_STACK_ERROR as u32);
        let zero = self.ir_value(0u32);
        let error = self.bd.ins().select(full, error, zero);

        let index = self.bd.ins().iadd_imm(index, 1);
        let index = self.bd.ins().band_imm(index, 0xF);

        let sp = self.bd.ins().band_imm(sp, 0xFF_FFF0);
        let sp = self.bd.ins().bor(sp, error);
        let sp = self.bd.ins().bor(sp, index);
        self.set(RegId::Sp, sp);

        let slot = self.stack_slot(index);
        self.bd.ins().store(
            ir::MemFlags::trusted(),
            high,
            slot,
            offset_of!(Registers, ss_high) as i32,
        );
        self.bd.ins().store(
            ir::MemFlags::trusted(),
            low,
            slot,
            offset_of!(Registers, ss_low) as i32,
        );
    }

    /// Pops a pair of words from the system stack.
    fn pop(&mut self) -> (ir::Value, ir::Value) {
        let sp = self.get(RegId::Sp);
        let index = self.bd.ins().band_imm(sp, 0xF);

        let slot = self.stack_slot(index);
        let high = self.bd.ins().load(
            ir::types::I32,
            ir::MemFlags::trusted(),
            slot,
            offset_of!(Registers, ss_high) as i32,
        );
        let low = self.bd.ins().load(
            ir::types::I32,
            ir::MemFlags::trusted(),
            slot,
            offset_of!(Registers, ss_low) as i32,
        );

        let empty = self.bd.ins().icmp_imm(IntCC::Equal, index, 0);
        let error = self.ir_value((SP_STACK_ERROR | SP_UNDERFLOW) as u32);
        let zero = self.ir_value(0u32);
        let error = self.bd.ins().select(empty, error, zero);

        let index = self.bd.ins().iadd_imm(index, 15);
        let index = self.bd.ins().band_imm(index, 0xF);

        let sp = self.bd.ins().band_imm(sp, 0xFF_FFF0);
        let sp = self.bd.ins().bor(sp, error);
        let sp = self.bd.ins().bor(sp, index);
        self.set(RegId::Sp, sp);

        (high, low)
    }

    /// Pushes the return address and SR of a subroutine call.
    fn push_return(&mut self, next: U24) {
        self.materialize();
        let next = self.ir_value(next.value());
        let sr = self.get(RegId::Sr);
        self.push(next, sr);
    }

    /// Emits a jump, branch, call or return. Always ends the block.
    pub(super) fn branch(
        &mut self,
        pc: U24,
        ins: Ins,
        opcode: Opcode,
        next: U24,
    ) -> Result<(), BuildError> {
        use Opcode::*;

        self.count(1i32);

        if opcode == Rts {
            let (pc, _) = self.pop();
            return self.exit(Exit::Dynamic(pc), false);
        }

        let target = match opcode {
            JmpAbs | JsrAbs | JccAbs | JsccAbs => U24::new(ins.field(b'a')),
            BraShort | BsrShort | BccShort | BsccShort => {
                let displacement = ((ins.field(b'a') << 23) as i32) >> 23;
                pc.wrapping_add(U24::from_signed(displacement))
            }
            _ => pc.wrapping_add(ins.ext),
        };

        if !opcode.info().flags.contains(Flags::COND) {
            if opcode.is_call() {
                self.push_return(next);
            }

            return self.exit(Exit::Static(target), true);
        }

        let taken = self.condition(ins.cond());
        let taken_bb = self.bd.create_block();
        let not_taken_bb = self.bd.create_block();

        self.bd.ins().brif(taken, taken_bb, &[], not_taken_bb, &[]);
        self.bd.seal_block(taken_bb);
        self.bd.seal_block(not_taken_bb);

        let snapshot = self.snapshot();
        self.bd.switch_to_block(taken_bb);
        if opcode.is_call() {
            self.push_return(next);
        }

        self.exit(Exit::Static(target), true)?;
        self.restore(snapshot);

        self.bd.switch_to_block(not_taken_bb);
        self.exit(Exit::Static(next), true)
    }
}
