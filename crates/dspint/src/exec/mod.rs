//! Instruction semantics.
pub mod arith;

mod alu;
mod bits;
mod flow;
mod moves;
mod ops;
mod transfer;

use crate::Interpreter;
use bits::{BitOp, BitTest};
use dsp56k::ins::fields;
use dsp56k::regs::Reg;
use dsp56k::{Dsp, Ins, Opcode, U24};
use flow::Target;

macro_rules! register_field {
    ($($name:ident),*) => {
        $(
            /// Register named by a field the decoder has already validated.
            #[inline(always)]
            pub(crate) fn $name(value: u32) -> Reg {
                match fields::$name(value) {
                    Some(reg) => reg,
                    None => unreachable!("reserved register encoding {value:#b}"),
                }
            }
        )*
    };
}

register_field!(reg6, reg5, reg4, reg3, ctrl5);

/// Sign extends the low `bits` bits of `value` to a word.
#[inline(always)]
pub(crate) fn sext(value: u32, bits: u32) -> U24 {
    let shift = 32 - bits;
    U24::from_signed(((value << shift) as i32) >> shift)
}

/// Address of a `qq` operand, in the low half of the I/O window.
#[inline(always)]
pub(crate) fn io_low(q: u32) -> U24 {
    U24::new(0xFF_FF80 + (q & 0x3F))
}

/// Address of a `pp` operand, in the high half of the I/O window.
#[inline(always)]
pub(crate) fn io_high(p: u32) -> U24 {
    U24::new(0xFF_FFC0 + (p & 0x3F))
}

impl Interpreter {
    /// Resolves the `MMMRRR` field of the instruction, applying its register update. Absolute
    /// and immediate forms yield the extension word.
    #[inline(always)]
    fn ea_addr(&self, dsp: &mut Dsp, ins: &Ins) -> U24 {
        match ins.ea() {
            Some(ea) => ea.resolve(&mut dsp.regs, ins.ext),
            None => ins.ext,
        }
    }

    #[inline(always)]
    fn relative(&self, displacement: U24) -> U24 {
        self.pc.wrapping_add(displacement)
    }

    /// Executes a non-parallel instruction.
    pub(crate) fn single(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        match opcode {
            Opcode::Nop => (),
            Opcode::Pflushun => dsp.icache.flush_unlocked(),
            Opcode::Pfree => dsp.icache.free(),
            Opcode::Pflush => dsp.icache.flush(),
            Opcode::Plock => self.plock(dsp, ins, true),
            Opcode::Punlock => self.plock(dsp, ins, false),
            Opcode::Plockr => self.plockr(dsp, ins, true),
            Opcode::Punlockr => self.plockr(dsp, ins, false),

            Opcode::Rti => self.rti(dsp),
            Opcode::Rts => self.rts(dsp),
            Opcode::Illegal => self.exception(dsp, dsp56k::ILLEGAL_VECTOR),
            Opcode::Trap => self.exception(dsp, dsp56k::TRAP_VECTOR),
            Opcode::Trapcc => self.trapcc(dsp, ins),
            Opcode::Reset => self.reset(),
            Opcode::Wait => self.halt(dsp, dsp56k::RunState::Wait),
            Opcode::Stop => self.halt(dsp, dsp56k::RunState::Stop),
            Opcode::Debug | Opcode::Debugcc => self.debug(dsp, ins, opcode),

            Opcode::Inc | Opcode::Dec => self.inc_dec(dsp, ins, opcode == Opcode::Inc),
            Opcode::Andi | Opcode::Ori => self.andi_ori(dsp, ins, opcode == Opcode::Andi),

            Opcode::AddImm | Opcode::AddLong => self.add_imm(dsp, ins),
            Opcode::SubImm | Opcode::SubLong => self.sub_imm(dsp, ins),
            Opcode::CmpImm | Opcode::CmpLong => self.cmp_imm(dsp, ins),
            Opcode::AndImm | Opcode::AndLong => self.logic_imm(dsp, ins, |a, b| a & b),
            Opcode::OrImm | Opcode::OrLong => self.logic_imm(dsp, ins, |a, b| a | b),
            Opcode::EorImm | Opcode::EorLong => self.logic_imm(dsp, ins, |a, b| a ^ b),

            Opcode::MpyShift | Opcode::MpyrShift | Opcode::MacShift | Opcode::MacrShift => {
                self.mul_shift(dsp, ins)
            }
            Opcode::Mpyi | Opcode::Mpyri | Opcode::Maci | Opcode::Macri => self.mul_imm(dsp, ins),
            Opcode::Dmac => self.dmac(dsp, ins),
            Opcode::Macsu | Opcode::Mpysu => self.mul_su(dsp, ins, opcode == Opcode::Macsu),
            Opcode::Div => self.div(dsp, ins),
            Opcode::Norm => self.norm(dsp, ins),
            Opcode::Normf => self.normf(dsp, ins),
            Opcode::Clb => self.clb(dsp, ins),
            Opcode::Merge => self.merge(dsp, ins),
            Opcode::Extract | Opcode::Extractu | Opcode::ExtractImm | Opcode::ExtractuImm => {
                self.extract(dsp, ins, matches!(opcode, Opcode::Extract | Opcode::ExtractImm))
            }
            Opcode::Insert | Opcode::InsertImm => self.insert(dsp, ins),
            Opcode::AsrImm | Opcode::AslImm => self.shift_imm(dsp, ins, opcode == Opcode::AslImm),
            Opcode::AsrReg | Opcode::AslReg => self.shift_reg(dsp, ins, opcode == Opcode::AslReg),
            Opcode::LsrImm | Opcode::LslImm => {
                self.logical_imm(dsp, ins, opcode == Opcode::LslImm)
            }
            Opcode::LsrReg | Opcode::LslReg => {
                self.logical_reg(dsp, ins, opcode == Opcode::LslReg)
            }
            Opcode::Cmpu => self.cmpu(dsp, ins),

            Opcode::TccAcc | Opcode::TccR | Opcode::TccAccR => self.tcc(dsp, ins, opcode),

            Opcode::BclrQq | Opcode::BclrEa | Opcode::BclrAa | Opcode::BclrPp | Opcode::BclrReg => {
                self.bit_op(dsp, ins, BitOp::Clear)
            }
            Opcode::BsetQq | Opcode::BsetEa | Opcode::BsetAa | Opcode::BsetPp | Opcode::BsetReg => {
                self.bit_op(dsp, ins, BitOp::Set)
            }
            Opcode::BchgQq | Opcode::BchgEa | Opcode::BchgAa | Opcode::BchgPp | Opcode::BchgReg => {
                self.bit_op(dsp, ins, BitOp::Change)
            }
            Opcode::BtstQq | Opcode::BtstEa | Opcode::BtstAa | Opcode::BtstPp | Opcode::BtstReg => {
                self.bit_op(dsp, ins, BitOp::Test)
            }

            Opcode::JclrQq | Opcode::JclrEa | Opcode::JclrAa | Opcode::JclrPp | Opcode::JclrReg => {
                self.bit_branch(dsp, ins, BitTest::Clear, Target::Jump)
            }
            Opcode::JsetQq | Opcode::JsetEa | Opcode::JsetAa | Opcode::JsetPp | Opcode::JsetReg => {
                self.bit_branch(dsp, ins, BitTest::Set, Target::Jump)
            }
            Opcode::JsclrQq
            | Opcode::JsclrEa
            | Opcode::JsclrAa
            | Opcode::JsclrPp
            | Opcode::JsclrReg => self.bit_branch(dsp, ins, BitTest::Clear, Target::Call),
            Opcode::JssetQq
            | Opcode::JssetEa
            | Opcode::JssetAa
            | Opcode::JssetPp
            | Opcode::JssetReg => self.bit_branch(dsp, ins, BitTest::Set, Target::Call),
            Opcode::BrclrQq
            | Opcode::BrclrEa
            | Opcode::BrclrAa
            | Opcode::BrclrPp
            | Opcode::BrclrReg => self.bit_branch(dsp, ins, BitTest::Clear, Target::Branch),
            Opcode::BrsetQq
            | Opcode::BrsetEa
            | Opcode::BrsetAa
            | Opcode::BrsetPp
            | Opcode::BrsetReg => self.bit_branch(dsp, ins, BitTest::Set, Target::Branch),
            Opcode::BsclrQq
            | Opcode::BsclrEa
            | Opcode::BsclrAa
            | Opcode::BsclrPp
            | Opcode::BsclrReg => self.bit_branch(dsp, ins, BitTest::Clear, Target::BranchCall),
            Opcode::BssetQq
            | Opcode::BssetEa
            | Opcode::BssetAa
            | Opcode::BssetPp
            | Opcode::BssetReg => self.bit_branch(dsp, ins, BitTest::Set, Target::BranchCall),

            Opcode::MovexShort | Opcode::MoveyShort => self.move_short(dsp, ins, opcode),
            Opcode::MovexLong | Opcode::MoveyLong => self.move_long(dsp, ins, opcode),
            Opcode::LuaRn => self.lua_rn(dsp, ins),
            Opcode::LuaEa => self.lua_ea(dsp, ins),
            Opcode::LraRn | Opcode::LraDisp => self.lra(dsp, ins, opcode),
            Opcode::MovecReg => self.movec_reg(dsp, ins),
            Opcode::MovecEa | Opcode::MovecAa => self.movec_mem(dsp, ins, opcode),
            Opcode::MovecImm => self.movec_imm(dsp, ins),
            Opcode::MovemAa | Opcode::MovemEa => self.movem(dsp, ins, opcode),
            Opcode::MovepQqReg | Opcode::MovepQqRegY | Opcode::MovepPpReg => {
                self.movep_reg(dsp, ins, opcode)
            }
            Opcode::MovepQqEa | Opcode::MovepQqEaY | Opcode::MovepPpEa | Opcode::MovepPpP => {
                self.movep_mem(dsp, ins, opcode)
            }
            Opcode::Vsl => self.vsl(dsp, ins),

            Opcode::JmpAbs | Opcode::JmpEa | Opcode::JccAbs | Opcode::JccEa => {
                self.jump_abs(dsp, ins, opcode, false)
            }
            Opcode::JsrAbs | Opcode::JsrEa | Opcode::JsccAbs | Opcode::JsccEa => {
                self.jump_abs(dsp, ins, opcode, true)
            }
            Opcode::BraShort | Opcode::BraLong | Opcode::BraRn => {
                self.branch(dsp, ins, opcode, Target::Branch)
            }
            Opcode::BccShort | Opcode::BccLong | Opcode::BccRn => {
                self.branch(dsp, ins, opcode, Target::Branch)
            }
            Opcode::BsrShort | Opcode::BsrLong | Opcode::BsrRn => {
                self.branch(dsp, ins, opcode, Target::BranchCall)
            }
            Opcode::BsccShort | Opcode::BsccLong | Opcode::BsccRn => {
                self.branch(dsp, ins, opcode, Target::BranchCall)
            }

            Opcode::DoEa
            | Opcode::DoAa
            | Opcode::DoImm
            | Opcode::DoReg
            | Opcode::DorEa
            | Opcode::DorAa
            | Opcode::DorImm
            | Opcode::DorReg => self.do_loop(dsp, ins, opcode),
            Opcode::DoForever | Opcode::DorForever => self.do_forever(dsp, ins, opcode),
            Opcode::RepEa | Opcode::RepAa | Opcode::RepImm | Opcode::RepReg => {
                self.rep(dsp, ins, opcode)
            }
            Opcode::Enddo => crate::end_loop(&mut dsp.regs),
            Opcode::Brkcc => self.brk(dsp, ins),
        }
    }
}
