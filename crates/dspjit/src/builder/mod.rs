mod alu;
mod branch;
mod moves;
mod repeat;
mod util;

use crate::block::{Info, LinkSlot, Termination};
use crate::hooks::Hooks;
use crate::mode::Mode;
use crate::registers::{RegId, RegMask};
use crate::{BuildCtx, BuildError, Compiler, Source, Target};
use cranelift::{
    codegen::ir::{self, SigRef},
    frontend::{self, Variable},
    prelude::InstBuilder,
};
use dsp56k::ins::{self, Decoded, Flags, Ins, Opcode};
use dsp56k::{Registers, U24};
use easyerr::ResultExt;
use jitalloc::{Allocation, ReadWrite};
use rustc_hash::FxHashMap;
use std::alloc::Layout;
use std::collections::hash_map::Entry;
use std::mem::offset_of;

struct Sigs {
    read: SigRef,
    write: SigRef,
    interpret: SigRef,
    loop_end: SigRef,
    follow_link: SigRef,
    try_link: SigRef,
    agu: SigRef,
    block: SigRef,
}

struct Consts {
    ptr_type: ir::Type,
    info_ptr: ir::Value,
    ctx_ptr: ir::Value,
    regs_ptr: ir::Value,
    fmem_ptr: ir::Value,
    sigs: Sigs,
}

#[derive(Debug, Clone, Copy)]
struct RegState {
    var: Variable,
    modified: bool,
}

/// The register cache at some point, restored after emitting a side exit.
struct Snapshot {
    regs: FxHashMap<RegId, RegState>,
    pending: Option<ir::Value>,
}

/// Where execution continues after leaving a block.
#[derive(Debug, Clone, Copy)]
enum Exit {
    /// A known address. Can be linked.
    Static(U24),
    /// An address computed at run time.
    Dynamic(ir::Value),
    /// PC was already stored by a hook.
    Stored,
}

/// How far the compiler got with an instruction.
struct Step {
    /// Program words consumed.
    len: u32,
    /// Instructions compiled.
    instructions: u32,
    end: Option<Termination>,
}

impl Step {
    fn next(len: u32) -> Self {
        Self {
            len,
            instructions: 1,
            end: None,
        }
    }

    fn end(len: u32, termination: Termination) -> Self {
        Self {
            len,
            instructions: 1,
            end: Some(termination),
        }
    }
}

pub(crate) struct Output {
    pub len: u32,
    pub instructions: u32,
    pub termination: Termination,
    pub reads: RegMask,
    pub writes: RegMask,
    pub links: Vec<Allocation<ReadWrite>>,
}

/// Whether a non-parallel instruction may write SR, SP, LA, LC or a modifier register.
fn single_writes_control(opcode: Opcode) -> bool {
    use Opcode::*;

    matches!(
        opcode,
        MovecReg
            | MovecEa
            | MovecAa
            | MovecImm
            | MovepPpReg
            | MovepQqReg
            | MovepQqRegY
            | MovexLong
            | MoveyLong
            | MovexShort
            | MoveyShort
            | BclrReg
            | BsetReg
            | BchgReg
    )
}

pub(crate) struct BlockBuilder<'ctx> {
    compiler: &'ctx mut Compiler,
    bd: frontend::FunctionBuilder<'ctx>,
    consts: Consts,
    regs: FxHashMap<RegId, RegState>,
    /// Result whose N, Z, E and U flags have not been written to SR yet.
    pending: Option<ir::Value>,
    /// L and S bits set by the move of the current instruction.
    move_flags: Option<ir::Value>,
    /// Whether a write of the current instruction reached program memory.
    stop: Option<ir::Value>,
    executed: Variable,
    mode: Mode,
    loop_end: Option<U24>,
    start: U24,
    links: Vec<Allocation<ReadWrite>>,
    reads: RegMask,
    writes: RegMask,
}

impl<'ctx> BlockBuilder<'ctx> {
    pub fn new(
        compiler: &'ctx mut Compiler,
        mut bd: frontend::FunctionBuilder<'ctx>,
        target: Target,
    ) -> Self {
        let entry_bb = bd.create_block();
        bd.append_block_params_for_function_params(entry_bb);
        bd.switch_to_block(entry_bb);
        bd.seal_block(entry_bb);

        let ptr_type = compiler.isa.pointer_type();
        let sigs = Sigs {
            read: bd.import_signature(Hooks::read_sig(ptr_type)),
            write: bd.import_signature(Hooks::write_sig(ptr_type)),
            interpret: bd.import_signature(Hooks::interpret_sig(ptr_type)),
            loop_end: bd.import_signature(Hooks::loop_end_sig(ptr_type)),
            follow_link: bd.import_signature(Hooks::follow_link_sig(ptr_type)),
            try_link: bd.import_signature(Hooks::try_link_sig(ptr_type)),
            agu: bd.import_signature(Hooks::agu_sig()),
            block: bd.import_signature(compiler.block_signature()),
        };

        let params = bd.block_params(entry_bb);
        let consts = Consts {
            ptr_type,
            info_ptr: params[0],
            ctx_ptr: params[1],
            regs_ptr: params[2],
            fmem_ptr: params[3],
            sigs,
        };

        let executed = bd.declare_var(ir::types::I32);
        let zero = bd.ins().iconst(ir::types::I32, 0);
        bd.def_var(executed, zero);

        Self {
            compiler,
            bd,
            consts,
            regs: FxHashMap::default(),
            pending: None,
            move_flags: None,
            stop: None,
            executed,
            mode: target.mode,
            loop_end: target.loop_end,
            start: target.start,
            links: Vec::new(),
            reads: RegMask::NONE,
            writes: RegMask::NONE,
        }
    }

    fn get(&mut self, reg: RegId) -> ir::Value {
        let var = match self.regs.entry(reg) {
            Entry::Occupied(o) => o.get().var,
            Entry::Vacant(v) => {
                let loaded = self.bd.ins().load(
                    reg.ty(),
                    ir::MemFlags::trusted(),
                    self.consts.regs_ptr,
                    reg.offset(),
                );

                let var = self.bd.declare_var(reg.ty());
                self.bd.def_var(var, loaded);
                self.reads.insert(reg);

                v.insert(RegState {
                    var,
                    modified: false,
                })
                .var
            }
        };

        self.bd.use_var(var)
    }

    fn set(&mut self, reg: RegId, value: ir::Value) {
        let var = match self.regs.entry(reg) {
            Entry::Occupied(o) => {
                let state = o.into_mut();
                state.modified = true;

                state.var
            }
            Entry::Vacant(v) => {
                let var = self.bd.declare_var(reg.ty());
                v.insert(RegState {
                    var,
                    modified: true,
                });

                var
            }
        };

        self.writes.insert(reg);
        self.bd.def_var(var, value);
    }

    /// Loads a field of the register file that is never cached.
    fn load_field(&mut self, ty: ir::Type, offset: usize) -> ir::Value {
        self.bd.ins().load(
            ty,
            ir::MemFlags::trusted(),
            self.consts.regs_ptr,
            offset as i32,
        )
    }

    fn store_field(&mut self, value: ir::Value, offset: usize) {
        self.bd.ins().store(
            ir::MemFlags::trusted(),
            value,
            self.consts.regs_ptr,
            offset as i32,
        );
    }

    /// Writes the N, Z, E and U flags of the pending result into SR.
    fn materialize(&mut self) {
        let Some(value) = self.pending.take() else {
            return;
        };

        let flags = self.result_flags(value);
        let sr = self.get(RegId::Sr);
        let cleared = self.bd.ins().band_imm(sr, !0b11_1100 & util::MASK24);
        let sr = self.bd.ins().bor(cleared, flags);
        self.set(RegId::Sr, sr);
    }

    /// Stores every modified register back into the register file.
    fn flush(&mut self) {
        for (reg, state) in &mut self.regs {
            if !state.modified {
                continue;
            }

            let value = self.bd.use_var(state.var);
            self.bd.ins().store(
                ir::MemFlags::trusted(),
                value,
                self.consts.regs_ptr,
                reg.offset(),
            );

            state.modified = false;
        }
    }

    /// Forgets every cached register. They must have been flushed.
    fn clear(&mut self) {
        debug_assert!(self.pending.is_none());
        debug_assert!(self.regs.values().all(|state| !state.modified));
        self.regs.clear();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            regs: self.regs.clone(),
            pending: self.pending,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.regs = snapshot.regs;
        self.pending = snapshot.pending;
    }

    /// Adds `count` to the amount of instructions executed natively.
    fn count(&mut self, count: impl util::IntoIrValue) {
        let count = self.ir_value(count);
        let executed = self.bd.use_var(self.executed);
        let executed = self.bd.ins().iadd(executed, count);
        self.bd.def_var(self.executed, executed);
    }

    fn update_info(&mut self) {
        let offset = offset_of!(Info, instructions) as i32;
        let executed = self.bd.use_var(self.executed);
        let current = self.bd.ins().load(
            ir::types::I32,
            ir::MemFlags::trusted(),
            self.consts.info_ptr,
            offset,
        );

        let updated = self.bd.ins().iadd(current, executed);
        self.bd.ins().store(
            ir::MemFlags::trusted(),
            updated,
            self.consts.info_ptr,
            offset,
        );
    }

    fn store_pc(&mut self, pc: impl util::IntoIrValue) {
        let pc = self.ir_value(pc);
        self.store_field(pc, offset_of!(Registers, pc));
    }

    fn call(&mut self, sig: SigRef, func: usize, args: &[ir::Value]) -> ir::Inst {
        let func = self.bd.ins().iconst(self.consts.ptr_type, func as i64);
        self.bd.ins().call_indirect(sig, func, args)
    }

    /// Leaves the block, continuing at `exit`. Static exits go through a link slot if `link` is
    /// set.
    fn exit(&mut self, exit: Exit, link: bool) -> Result<(), BuildError> {
        self.materialize();
        self.flush();

        match exit {
            Exit::Static(pc) => self.store_pc(pc.value()),
            Exit::Dynamic(pc) => self.store_pc(pc),
            Exit::Stored => (),
        }

        self.update_info();
        match exit {
            Exit::Static(pc) if link => self.jump_with_link(pc),
            _ => {
                self.bd.ins().return_(&[]);
                Ok(())
            }
        }
    }

    /// Ends the block through a new link slot for `target`.
    fn jump_with_link(&mut self, target: U24) -> Result<(), BuildError> {
        let alloc = self
            .compiler
            .module
            .allocate_data(Layout::new::<LinkSlot>())
            .context(BuildCtx::Alloc)?;

        // SAFETY: the allocation is fresh and fits a link slot
        unsafe {
            alloc.as_ptr().cast::<LinkSlot>().write(LinkSlot {
                func: 0,
                target: target.value(),
                child: 0,
                owner: 0,
            });
        }

        let slot_addr = alloc.addr();
        self.links.push(alloc);

        let ptr_type = self.consts.ptr_type;
        let slot = self.bd.ins().iconst(ptr_type, slot_addr as i64);
        let func_offset = offset_of!(LinkSlot, func) as i32;

        let follow_bb = self.bd.create_block();
        let exit_bb = self.bd.create_block();
        let need_bb = self.bd.create_block();
        let call_bb = self.bd.create_block();
        let fail_bb = self.bd.create_block();
        let linked = self.bd.append_block_param(call_bb, ptr_type);

        self.bd.set_cold_block(exit_bb);
        self.bd.set_cold_block(need_bb);
        self.bd.set_cold_block(fail_bb);

        let inst = self.call(
            self.consts.sigs.follow_link,
            self.compiler.hooks.follow_link as usize,
            &[self.consts.info_ptr, self.consts.ctx_ptr, slot],
        );
        let follow = self.bd.inst_results(inst)[0];
        self.bd.ins().brif(follow, follow_bb, &[], exit_bb, &[]);
        self.bd.seal_block(follow_bb);
        self.bd.seal_block(exit_bb);

        // the dispatcher wants control back
        self.bd.switch_to_block(exit_bb);
        self.bd.ins().return_(&[]);

        // follow the link if there is one
        self.bd.switch_to_block(follow_bb);
        let func = self
            .bd
            .ins()
            .load(ptr_type, ir::MemFlags::trusted(), slot, func_offset);
        self.bd.ins().brif(
            func,
            call_bb,
            &[ir::BlockArg::Value(func)],
            need_bb,
            &[],
        );
        self.bd.seal_block(need_bb);

        // ask for a link
        self.bd.switch_to_block(need_bb);
        self.call(
            self.consts.sigs.try_link,
            self.compiler.hooks.try_link as usize,
            &[self.consts.ctx_ptr, slot],
        );
        let func = self
            .bd
            .ins()
            .load(ptr_type, ir::MemFlags::trusted(), slot, func_offset);
        self.bd.ins().brif(
            func,
            call_bb,
            &[ir::BlockArg::Value(func)],
            fail_bb,
            &[],
        );
        self.bd.seal_block(call_bb);
        self.bd.seal_block(fail_bb);

        self.bd.switch_to_block(fail_bb);
        self.bd.ins().return_(&[]);

        self.bd.switch_to_block(call_bb);
        self.bd.ins().return_call_indirect(
            self.consts.sigs.block,
            linked,
            &[
                self.consts.info_ptr,
                self.consts.ctx_ptr,
                self.consts.regs_ptr,
                self.consts.fmem_ptr,
            ],
        );

        Ok(())
    }

    /// Branches to a side exit if the boolean `cond` is set, then continues in a new block.
    fn side_exit(&mut self, cond: ir::Value, exit: Exit, link: bool) -> Result<(), BuildError> {
        let exit_bb = self.bd.create_block();
        let continue_bb = self.bd.create_block();
        self.bd.set_cold_block(exit_bb);

        self.bd.ins().brif(cond, exit_bb, &[], continue_bb, &[]);
        self.bd.seal_block(exit_bb);
        self.bd.seal_block(continue_bb);

        let snapshot = self.snapshot();
        self.bd.switch_to_block(exit_bb);
        self.exit(exit, link)?;
        self.restore(snapshot);

        self.bd.switch_to_block(continue_bb);
        Ok(())
    }

    fn covers_loop_end(&self, pc: U24, len: u32) -> bool {
        self.loop_end
            .is_some_and(|la| la.wrapping_sub(pc).value() < len)
    }

    /// Leaves the block after an instruction that may have finished a hardware loop iteration.
    fn loop_end_exit(&mut self, pc: U24, len: u32, next: U24) -> Result<(), BuildError> {
        self.materialize();
        self.flush();
        self.store_pc(next.value());

        let pc = self.ir_value(pc.value());
        let len = self.ir_value(len);
        self.call(
            self.consts.sigs.loop_end,
            self.compiler.hooks.loop_end as usize,
            &[self.consts.ctx_ptr, pc, len],
        );

        self.clear();
        self.exit(Exit::Stored, false)
    }

    /// Applies the per instruction side effects collected while emitting it: the move flags and
    /// the program write check.
    fn finish_instruction(&mut self, next: U24) -> Result<(), BuildError> {
        if let Some(flags) = self.move_flags.take() {
            let sr = self.get(RegId::Sr);
            let sr = self.bd.ins().bor(sr, flags);
            self.set(RegId::Sr, sr);
        }

        if let Some(stop) = self.stop.take() {
            self.side_exit(stop, Exit::Static(next), false)?;
        }

        Ok(())
    }

    /// Executes an instruction through the interpreter.
    fn fallback(
        &mut self,
        pc: U24,
        ins: Ins,
        covers_loop_end: bool,
    ) -> Result<Step, BuildError> {
        let len = ins.len();
        let flags = ins.decoded.flags();
        let ending = match ins.decoded {
            _ if flags.contains(Flags::BRANCH) || flags.contains(Flags::LOOP) => {
                Some(Termination::Branch)
            }
            _ if flags.contains(Flags::WRITES_P) => Some(Termination::ProgramWrite),
            Decoded::Single(Opcode::Andi | Opcode::Ori) => Some(Termination::ModeChange),
            Decoded::Single(opcode) if single_writes_control(opcode) => {
                Some(Termination::LoopRegisterWrite)
            }
            Decoded::Parallel { mv, .. } if mv.writes_control() => {
                Some(Termination::LoopRegisterWrite)
            }
            _ if covers_loop_end => Some(Termination::LoopEnd),
            _ => None,
        };

        self.reads = RegMask::ALL;
        self.writes = RegMask::ALL;

        self.materialize();
        self.flush();
        self.clear();
        self.store_pc(pc.value());

        let pc_value = self.ir_value(pc.value());
        let word = self.ir_value(ins.word.value());
        let ext = self.ir_value(ins.ext.value());
        let inst = self.call(
            self.consts.sigs.interpret,
            self.compiler.hooks.interpret as usize,
            &[self.consts.ctx_ptr, pc_value, word, ext],
        );
        let stop = self.bd.inst_results(inst)[0];

        let Some(termination) = ending else {
            self.side_exit(stop, Exit::Stored, false)?;
            return Ok(Step::next(len));
        };

        if covers_loop_end {
            self.side_exit(stop, Exit::Stored, false)?;
            let len = self.ir_value(len);
            self.call(
                self.consts.sigs.loop_end,
                self.compiler.hooks.loop_end as usize,
                &[self.consts.ctx_ptr, pc_value, len],
            );
        }

        self.exit(Exit::Stored, false)?;
        Ok(Step::end(len, termination))
    }

    fn emit(&mut self, source: &mut impl Source, pc: U24, ins: Ins) -> Result<Step, BuildError> {
        let len = ins.len();
        let next = pc.wrapping_add(U24::new(len));
        let covers_loop_end = self.covers_loop_end(pc, len);

        match ins.decoded {
            Decoded::Parallel { alu, mv } if Self::is_native_parallel(alu, mv) => {
                self.parallel(alu, mv, ins.ext);
                self.count(1i32);
                self.finish_instruction(next)?;

                if covers_loop_end {
                    self.loop_end_exit(pc, len, next)?;
                    return Ok(Step::end(len, Termination::LoopEnd));
                }

                Ok(Step::next(len))
            }
            Decoded::Single(Opcode::Nop) => {
                self.count(1i32);
                if covers_loop_end {
                    self.loop_end_exit(pc, len, next)?;
                    return Ok(Step::end(len, Termination::LoopEnd));
                }

                Ok(Step::next(len))
            }
            Decoded::Single(opcode) if !covers_loop_end && Self::is_native_branch(opcode) => {
                self.branch(pc, ins, opcode, next)?;
                Ok(Step::end(len, Termination::Branch))
            }
            Decoded::Single(opcode @ (Opcode::RepImm | Opcode::RepReg)) if !covers_loop_end => {
                match self.repeat(source, pc, ins, opcode)? {
                    Some(step) => Ok(step),
                    None => self.fallback(pc, ins, covers_loop_end),
                }
            }
            _ => self.fallback(pc, ins, covers_loop_end),
        }
    }

    pub fn build(mut self, source: &mut impl Source) -> Result<Output, BuildError> {
        let start = self.start;
        let max = self.compiler.settings.max_block_len.max(1);

        let mut len = 0u32;
        let mut instructions = 0u32;
        let termination = loop {
            let pc = start.wrapping_add(U24::new(len));

            if instructions >= max {
                self.exit(Exit::Static(pc), true)?;
                break Termination::InstructionCap;
            }

            if instructions > 0 {
                if source.is_block_start(pc) {
                    self.exit(Exit::Static(pc), true)?;
                    break Termination::MergePoint;
                }

                if source.is_volatile(pc) || source.is_volatile(start) {
                    self.exit(Exit::Static(pc), true)?;
                    break Termination::VolatileAddress;
                }
            }

            let word = source.fetch(pc);
            let decoded = match ins::decode(word) {
                Ok(decoded) => decoded,
                Err(err) if instructions == 0 => {
                    return Err(BuildError::Decode {
                        addr: pc,
                        source: err,
                    });
                }
                Err(_) => {
                    self.exit(Exit::Static(pc), false)?;
                    break Termination::Fallback;
                }
            };

            let ext = if decoded.len(word) == 2 {
                source.fetch(pc.wrapping_add(U24::new(1)))
            } else {
                U24::ZERO
            };

            let ins = Ins { word, ext, decoded };
            self.bd.set_srcloc(ir::SourceLoc::new(pc.value()));

            let step = self.emit(source, pc, ins)?;
            len += step.len;
            instructions += step.instructions;

            if let Some(termination) = step.end {
                break termination;
            }
        };

        self.bd.seal_all_blocks();
        self.bd.finalize();

        Ok(Output {
            len,
            instructions,
            termination,
            reads: self.reads,
            writes: self.writes,
            links: self.links,
        })
    }
}
