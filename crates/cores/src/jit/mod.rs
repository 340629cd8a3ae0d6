//! A core that compiles DSP code into host code, falling back to the interpreter for repeats,
//! halted states and instruction tracing.
mod arena;
mod chain;
pub mod mirror;

use crate::{CoreCtx, CoreError, DspCore, Executed};
use arena::Arena;
use chain::{Chain, MicroKey, Slot};
use dsp56k::mem::{Memory, POISON};
use dsp56k::{Dsp, Ins, Registers, RunState, Space, U24};
use dspint::{ExecError, Interpreter};
use dspjit::{
    Block, BuildError, Fastmem, Info, LinkSlot, Mode, Source, Target, hooks::*,
};
use easyerr::ResultExt;
use indexmap::IndexMap;
use mirror::{BlockInfo, Event, Mirror};
use rustc_hash::FxHashSet;
use std::ptr::NonNull;
use tracing::{debug, trace};

pub use arena::Handle;
pub use dspjit;

/// JIT configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Code generation settings.
    pub settings: dspjit::Settings,
    /// Whether to check, before entering or linking into a block, that it agrees with the
    /// active hardware loop.
    pub check_loops: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: dspjit::Settings::default(),
            check_loops: true,
        }
    }
}

pub struct StoredBlock {
    pub inner: Block,
    /// Link slots of other blocks that currently point into this one.
    incoming: Vec<NonNull<LinkSlot>>,
    /// Set if the block starts at a volatile address.
    micro: Option<MicroKey>,
}

/// Compiled blocks of every mode, together with what is needed to keep them coherent with
/// program memory.
#[derive(Default)]
pub struct Blocks {
    arena: Arena<StoredBlock>,
    chains: IndexMap<Mode, Chain>,
    /// Program addresses written at run time.
    volatile: FxHashSet<u32>,
    /// Destroyed blocks whose code might still be on the stack.
    graveyard: Vec<StoredBlock>,
    events: Vec<Event>,
}

/// Program memory as the compiler sees it.
struct Program<'a> {
    mem: &'a Memory,
    chain: Option<&'a Chain>,
    volatile: &'a FxHashSet<u32>,
}

impl Source for Program<'_> {
    fn fetch(&mut self, addr: U24) -> U24 {
        word(self.mem, addr)
    }

    fn is_volatile(&self, addr: U24) -> bool {
        self.volatile.contains(&addr.value())
    }

    fn is_block_start(&self, addr: U24) -> bool {
        self.chain
            .is_some_and(|chain| matches!(chain.get(addr), Slot::Block(_)))
    }
}

#[inline(always)]
fn word(mem: &Memory, addr: U24) -> U24 {
    mem.words(Space::P)
        .get(addr.value() as usize)
        .copied()
        .unwrap_or(POISON)
}

fn micro_key(mem: &Memory, addr: U24) -> MicroKey {
    MicroKey {
        addr: addr.value(),
        words: [0, 1, 2].map(|offset| word(mem, addr.wrapping_add(U24::new(offset))).value()),
    }
}

impl Blocks {
    /// Amount of blocks alive, including micro-blocks waiting for reuse.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Amount of modes blocks have been compiled for.
    pub fn chains(&self) -> usize {
        self.chains.len()
    }

    /// Amount of micro-blocks waiting for reuse.
    pub fn micro_blocks(&self) -> usize {
        self.chains.values().map(Chain::micro_blocks).sum()
    }

    pub fn is_volatile(&self, addr: U24) -> bool {
        self.volatile.contains(&addr.value())
    }

    /// The block mapped at `addr` in the chain of `mode`, if one starts there.
    pub fn get(&self, mode: Mode, addr: U24) -> Option<&StoredBlock> {
        match self.chains.get(&mode)?.get(addr) {
            Slot::Block(handle) => self.arena.get(handle),
            _ => None,
        }
    }

    fn insert(&mut self, block: Block, micro: Option<MicroKey>) -> Handle {
        let meta = block.meta();
        let (mode, start, len) = (meta.mode, meta.start, meta.len);
        let info = BlockInfo::new(meta);

        let handle = self.arena.insert(StoredBlock {
            inner: block,
            incoming: Vec::new(),
            micro,
        });

        if let Some(stored) = self.arena.get(handle) {
            for mut slot in stored.inner.links() {
                // SAFETY: the slot belongs to a block owned by the arena
                unsafe { slot.as_mut() }.owner = handle.to_bits();
            }
        }

        let chain = self.chains.entry(mode).or_default();
        let occupants = chain.occupants(start, len);
        for occupant in occupants {
            self.destroy(occupant);
        }

        self.chains.entry(mode).or_default().map(start, len, handle);
        self.events.push(Event::Created(handle, info));

        handle
    }

    /// Destroys a block along with every block linking into it.
    fn destroy(&mut self, handle: Handle) {
        let mut pending = vec![handle];
        while let Some(handle) = pending.pop() {
            let Some(stored) = self.arena.remove(handle) else {
                continue;
            };

            let meta = stored.inner.meta();
            trace!("destroying block at {} ({:?})", meta.start, meta.mode);

            if let Some(chain) = self.chains.get_mut(&meta.mode) {
                chain.unmap(meta.start, meta.len, handle);
                if let Some(key) = stored.micro {
                    chain.forget_micro(key, handle);
                }
            }

            for slot in &stored.incoming {
                // SAFETY: incoming slots belong to blocks still in the arena
                let slot = unsafe { slot.as_ref() };
                if slot.child == handle.to_bits() {
                    pending.push(Handle::from_bits(slot.owner));
                }
            }

            for slot in stored.inner.links() {
                // SAFETY: the slot belongs to the block being destroyed, which is still alive
                let child = unsafe { slot.as_ref() }.child;
                if let Some(child) = self.arena.get_mut(Handle::from_bits(child)) {
                    child.incoming.retain(|incoming| *incoming != slot);
                }
            }

            self.events.push(Event::Destroyed(handle));
            self.graveyard.push(stored);
        }
    }

    /// Takes a block out of its chain, unlinking every exit that leads into it. Blocks built at
    /// volatile addresses are kept around as micro-blocks, everything else is destroyed.
    fn evict(&mut self, handle: Handle) {
        let Some(stored) = self.arena.get_mut(handle) else {
            return;
        };

        let Some(key) = stored.micro else {
            self.destroy(handle);
            return;
        };

        for mut slot in stored.incoming.drain(..) {
            // SAFETY: incoming slots belong to blocks still in the arena
            let slot = unsafe { slot.as_mut() };
            if slot.child == handle.to_bits() {
                slot.unlink();
            }
        }

        let meta = stored.inner.meta();
        let (mode, start, len) = (meta.mode, meta.start, meta.len);
        if let Some(chain) = self.chains.get_mut(&mode) {
            chain.unmap(start, len, handle);
            if let Some(previous) = chain.keep_micro(key, handle)
                && previous != handle
            {
                self.destroy(previous);
            }
        }

        trace!("kept block at {start} ({mode:?}) as a micro-block");
    }

    /// Evicts every block covering `addr` and marks it volatile.
    pub fn invalidate(&mut self, addr: U24) {
        self.volatile.insert(addr.value());

        let handles = self
            .chains
            .values()
            .filter_map(|chain| chain.get(addr).handle())
            .collect::<Vec<_>>();

        for handle in handles {
            self.evict(handle);
        }
    }

    /// Invalidates every program address written since the last call.
    pub fn sync(&mut self, mem: &mut Memory) {
        if !mem.has_program_writes() {
            return;
        }

        for addr in mem.take_program_writes() {
            self.invalidate(U24::new(addr));
        }
    }

    /// Puts a micro-block built from the current words at `addr` back into its chain.
    fn revive(&mut self, mem: &Memory, mode: Mode, addr: U24) -> Option<Handle> {
        let chain = self.chains.get_mut(&mode)?;
        let handle = chain.take_micro(micro_key(mem, addr))?;
        let (start, len) = {
            let meta = self.arena.get(handle)?.inner.meta();
            (meta.start, meta.len)
        };

        if !chain.occupants(start, len).is_empty() {
            self.destroy(handle);
            return None;
        }

        chain.map(start, len, handle);
        trace!("reusing micro-block at {addr} ({mode:?})");

        Some(handle)
    }

    /// Destroys every block.
    pub fn clear(&mut self) {
        for (handle, _) in self.arena.iter() {
            self.events.push(Event::Destroyed(handle));
        }

        self.graveyard.extend(self.arena.clear());
        self.chains.clear();
    }

    /// Frees the code of destroyed blocks. Must not be called while compiled code runs.
    fn bury(&mut self) {
        self.graveyard.clear();
    }
}

/// Context to be passed in for execution of JIT blocks.
struct Context<'a> {
    dsp: &'a mut Dsp,
    blocks: &'a mut Blocks,
    interpreter: &'a mut Interpreter,
    fastmem: Fastmem,
    check_loops: bool,
    /// `dsp.executed` when the dispatcher entered compiled code.
    entry_executed: u64,
    /// Instructions the dispatcher wants executed before getting control back.
    budget: u64,
    /// Error raised by an interpreted instruction.
    error: Option<ExecError>,
}

const CTX_HOOKS: Hooks = {
    extern "sysv64-unwind" fn get_registers<'a>(ctx: &'a mut Context) -> &'a mut Registers {
        &mut ctx.dsp.regs
    }

    extern "sysv64-unwind" fn get_fastmem<'a>(ctx: &'a mut Context) -> &'a Fastmem {
        &ctx.fastmem
    }

    extern "sysv64-unwind" fn read(ctx: &mut Context, space: u32, addr: u32) -> u32 {
        ctx.dsp.read(Space::data(space), U24::new(addr)).value()
    }

    extern "sysv64-unwind" fn write(ctx: &mut Context, space: u32, addr: u32, value: u32) -> bool {
        ctx.dsp
            .write(Space::data(space), U24::new(addr), U24::new(value));

        if ctx.dsp.mem.has_program_writes() {
            std::hint::cold_path();
            ctx.blocks.sync(&mut ctx.dsp.mem);
            return true;
        }

        false
    }

    extern "sysv64-unwind" fn interpret(ctx: &mut Context, pc: u32, word: u32, ext: u32) -> bool {
        let pc = U24::new(pc);
        let ins = match Ins::new(U24::new(word), U24::new(ext)) {
            Ok(ins) => ins,
            Err(source) => {
                std::hint::cold_path();
                ctx.error = Some(ExecError::Decode { source });
                return true;
            }
        };

        if let Err(e) = ctx.interpreter.execute(ctx.dsp, ins) {
            std::hint::cold_path();
            ctx.error = Some(e);
            return true;
        }

        // a REP of zero skips an instruction the block knows nothing about
        let len = ctx.interpreter.span();
        let writes = ctx.dsp.mem.has_program_writes();
        if !writes && len == ins.len() && ctx.dsp.state == RunState::Running {
            return false;
        }

        // the block exits right away, so the loop end it would have handled is handled here
        if ctx.dsp.regs.pc == pc.wrapping_add(U24::new(len)) {
            dspint::loop_end(&mut ctx.dsp.regs, pc, len);
        }

        ctx.blocks.sync(&mut ctx.dsp.mem);
        true
    }

    extern "sysv64-unwind" fn loop_end(ctx: &mut Context, pc: u32, len: u32) {
        let pc = U24::new(pc);
        if ctx.dsp.regs.pc == pc.wrapping_add(U24::new(len)) {
            dspint::loop_end(&mut ctx.dsp.regs, pc, len);
        }
    }

    extern "sysv64-unwind" fn follow_link(
        info: &Info,
        ctx: &mut Context,
        slot: &mut LinkSlot,
    ) -> bool {
        // out of budget, give control back to the dispatcher
        let executed = info.instructions as u64 + (ctx.dsp.executed - ctx.entry_executed);
        if executed >= ctx.budget {
            return false;
        }

        // the running block was destroyed, or an interrupt has to be serviced
        if !ctx.blocks.arena.contains(Handle::from_bits(slot.owner))
            || ctx.dsp.periph.pending_interrupt().is_some()
        {
            std::hint::cold_path();
            return false;
        }

        if !slot.is_linked() {
            return true;
        }

        match ctx.blocks.arena.get(Handle::from_bits(slot.child)) {
            Some(child) => {
                !ctx.check_loops || child.inner.meta().is_valid_for(&ctx.dsp.regs)
            }
            None => {
                slot.unlink();
                true
            }
        }
    }

    extern "sysv64-unwind" fn try_link(ctx: &mut Context, slot: &mut LinkSlot) {
        let blocks = &mut *ctx.blocks;
        let Some(owner) = blocks.arena.get(Handle::from_bits(slot.owner)) else {
            return;
        };

        let mode = owner.inner.meta().mode;
        let Some(Slot::Block(child)) = blocks.chains.get(&mode).map(|c| c.get(slot.target()))
        else {
            return;
        };

        let Some(stored) = blocks.arena.get_mut(child) else {
            return;
        };

        if ctx.check_loops && !stored.inner.meta().is_valid_for(&ctx.dsp.regs) {
            return;
        }

        slot.link(stored.inner.as_fn(), child.to_bits());
        stored.incoming.push(NonNull::from(slot));
    }

    #[expect(
        clippy::missing_transmute_annotations,
        reason = "unnecessary - the definitions are above"
    )]
    unsafe {
        use std::mem::transmute;

        let get_registers =
            transmute::<_, GetRegistersHook>(get_registers as extern "sysv64-unwind" fn(_) -> _);
        let get_fastmem =
            transmute::<_, GetFastmemHook>(get_fastmem as extern "sysv64-unwind" fn(_) -> _);

        let read = transmute::<_, ReadHook>(read as extern "sysv64-unwind" fn(_, _, _) -> _);
        let write = transmute::<_, WriteHook>(write as extern "sysv64-unwind" fn(_, _, _, _) -> _);
        let interpret =
            transmute::<_, InterpretHook>(interpret as extern "sysv64-unwind" fn(_, _, _, _) -> _);
        let loop_end = transmute::<_, LoopEndHook>(loop_end as extern "sysv64-unwind" fn(_, _, _));

        let follow_link =
            transmute::<_, FollowLinkHook>(follow_link as extern "sysv64-unwind" fn(_, _, _) -> _);
        let try_link = transmute::<_, TryLinkHook>(try_link as extern "sysv64-unwind" fn(_, _));

        Hooks {
            get_registers,
            get_fastmem,
            read,
            write,
            interpret,
            loop_end,
            follow_link,
            try_link,
        }
    }
};

/// Direct memory access for compiled code. Disabled when memory accesses are being traced,
/// since those have to go through [`Memory`].
fn fastmem(dsp: &mut Dsp) -> Fastmem {
    if dsp.trace.uninitialized_reads || dsp.trace.strict_memory {
        return Fastmem::DISABLED;
    }

    Fastmem {
        base: [
            dsp.mem.base_ptr(Space::X),
            dsp.mem.base_ptr(Space::Y),
        ],
        limit: [
            dsp.mem.fast_limit(Space::X),
            dsp.mem.fast_limit(Space::Y),
        ],
    }
}

pub struct Core {
    pub config: Config,
    pub compiler: dspjit::Jit,
    pub blocks: Blocks,
    interpreter: Interpreter,
    mirror: Mirror,
}

impl Core {
    pub fn new(config: Config) -> Result<Self, BuildError> {
        let compiler = dspjit::Jit::new(config.settings.clone(), CTX_HOOKS)?;

        Ok(Self {
            config,
            compiler,
            blocks: Blocks::default(),
            interpreter: Interpreter::new(),
            mirror: Mirror::default(),
        })
    }

    /// The mirror this core publishes block events to.
    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Destroys every compiled block.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.blocks.bury();
        self.mirror.publish(&mut self.blocks.events);
    }

    /// Compiles a block at the current PC of `dsp`. Returns `None` if the first instruction does
    /// not decode, so the interpreter gets to report it.
    fn compile(&mut self, dsp: &Dsp, mode: Mode) -> Result<Option<Handle>, CoreError> {
        let pc = dsp.regs.pc;
        let status = dsp.regs.status();
        let target = Target {
            start: pc,
            mode,
            loop_end: status.loop_flag().then_some(dsp.regs.la),
        };

        let mut source = Program {
            mem: &dsp.mem,
            chain: self.blocks.chains.get(&mode),
            volatile: &self.blocks.volatile,
        };

        let block = match self.compiler.compile(&mut source, target) {
            Ok(block) => block,
            Err(BuildError::Decode { addr, source }) => {
                debug!("not compiling at {addr}: {source}");
                return Ok(None);
            }
            Err(e) => return Err(e).context(CoreCtx::Build),
        };

        let micro = self
            .blocks
            .is_volatile(pc)
            .then(|| micro_key(&dsp.mem, pc));

        Ok(Some(self.blocks.insert(block, micro)))
    }

    /// Finds or builds the block to run at the current PC.
    fn lookup(&mut self, dsp: &Dsp) -> Result<Option<Handle>, CoreError> {
        let pc = dsp.regs.pc;
        let mode = Mode::of(&dsp.regs);

        let slot = self
            .blocks
            .chains
            .get(&mode)
            .map_or(Slot::Empty, |chain| chain.get(pc));

        let found = match slot {
            Slot::Block(handle) => Some(handle),
            Slot::Covered(handle) => {
                std::hint::cold_path();
                debug!("entered a block in the middle at {pc}, destroying it");
                self.blocks.destroy(handle);
                None
            }
            Slot::Empty if self.blocks.is_volatile(pc) => self.blocks.revive(&dsp.mem, mode, pc),
            Slot::Empty => None,
        };

        if let Some(handle) = found {
            let valid = self
                .blocks
                .arena
                .get(handle)
                .is_some_and(|b| !self.config.check_loops || b.inner.meta().is_valid_for(&dsp.regs));

            if valid {
                return Ok(Some(handle));
            }

            debug!("block at {pc} does not match the active loop, rebuilding it");
            self.blocks.destroy(handle);
        }

        self.compile(dsp, mode)
    }

    /// Runs the instruction at PC through the interpreter.
    fn interpret(&mut self, dsp: &mut Dsp) -> Result<(), CoreError> {
        let result = self.interpreter.step(dsp).context(CoreCtx::Exec);
        self.blocks.sync(&mut dsp.mem);
        result
    }

    fn exec_inner(&mut self, dsp: &mut Dsp, instructions: u64) -> Result<(), CoreError> {
        self.blocks.sync(&mut dsp.mem);

        let target = dsp.executed.saturating_add(instructions);
        while dsp.executed < target {
            if dsp.state != RunState::Running && dsp.periph.pending_interrupt().is_none() {
                break;
            }

            // repeats, halted states and instruction tracing go through the interpreter
            if dsp.regs.rep_active != 0 || dsp.state != RunState::Running || dsp.trace.instructions
            {
                self.interpret(dsp)?;
                continue;
            }

            dsp.check_interrupts();
            let Some(handle) = self.lookup(dsp)? else {
                self.interpret(dsp)?;
                continue;
            };

            let Some(block) = self.blocks.arena.get(handle).map(|b| b.inner.as_fn()) else {
                continue;
            };

            let before = dsp.executed;
            let mut ctx = Context {
                fastmem: fastmem(dsp),
                dsp: &mut *dsp,
                blocks: &mut self.blocks,
                interpreter: &mut self.interpreter,
                check_loops: self.config.check_loops,
                entry_executed: before,
                budget: target - before,
                error: None,
            };

            // SAFETY: the context is the one the hooks expect and the block is alive in the arena
            let info = unsafe {
                self.compiler
                    .call(&raw mut ctx as *mut dspjit::hooks::Context, block)
            };

            let error = ctx.error.take();
            dsp.executed += info.instructions as u64;
            dsp.periph.tick((dsp.executed - before) as u32);
            self.blocks.sync(&mut dsp.mem);

            if let Some(e) = error {
                return Err(e).context(CoreCtx::Exec);
            }
        }

        Ok(())
    }
}

impl DspCore for Core {
    fn exec(&mut self, dsp: &mut Dsp, instructions: u64) -> Result<Executed, CoreError> {
        let before = dsp.executed;
        let result = self.exec_inner(dsp, instructions);

        self.blocks.bury();
        self.mirror.publish(&mut self.blocks.events);

        result.map(|()| Executed {
            instructions: dsp.executed - before,
        })
    }

    fn step(&mut self, dsp: &mut Dsp) -> Result<Executed, CoreError> {
        let before = dsp.executed;
        if dsp.state == RunState::Running || dsp.periph.pending_interrupt().is_some() {
            self.interpret(dsp)?;
        }

        Ok(Executed {
            instructions: dsp.executed - before,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use dsp56k::{Config as DspConfig, NullPeripherals};
    use dspjit::Termination;

    fn dsp_with(program: &[u32]) -> Dsp {
        let mut dsp = Dsp::new(&DspConfig::default(), Box::new(NullPeripherals::new()));
        for (addr, &word) in program.iter().enumerate() {
            dsp.write(Space::P, U24::new(addr as u32), U24::new(word));
        }

        dsp.mem.take_program_writes();
        dsp
    }

    fn core() -> Core {
        Core::new(Config::default()).unwrap()
    }

    fn block_at(core: &Core, dsp: &Dsp, addr: u32) -> Option<Termination> {
        core.blocks
            .get(Mode::of(&dsp.regs), U24::new(addr))
            .map(|b| b.inner.meta().termination)
    }

    #[test]
    fn runs_compiled_code() {
        // 0: clr a
        // 1: add x0,a
        // 2: add x0,a
        // 3: wait
        let mut dsp = dsp_with(&[0x20_0013, 0x20_0040, 0x20_0040, 0x00_0086]);
        dsp.regs.x0 = U24::new(0x10);

        let mut core = core();
        let executed = core.exec(&mut dsp, 100).unwrap();
        assert_eq!(executed.instructions, 4);
        assert_eq!(dsp.regs.a.value(), 0x20_000000);
        assert_eq!(dsp.regs.pc, U24::new(4));
        assert_eq!(dsp.state, RunState::Wait);
        assert_eq!(block_at(&core, &dsp, 0), Some(Termination::Branch));

        // halted, nothing else runs
        assert_eq!(core.exec(&mut dsp, 100).unwrap().instructions, 0);
    }

    #[test]
    fn program_writes_invalidate_blocks() {
        // 0: clr a
        // 1: add x0,a
        // 2: wait
        let mut dsp = dsp_with(&[0x20_0013, 0x20_0040, 0x00_0086]);
        dsp.regs.x0 = U24::new(0x10);

        let mut core = core();
        core.exec(&mut dsp, 100).unwrap();
        assert_eq!(dsp.regs.a.value(), 0x10_000000);

        // 1: nop
        dsp.write(Space::P, U24::new(1), U24::ZERO);
        dsp.regs.pc = U24::ZERO;
        dsp.state = RunState::Running;

        core.exec(&mut dsp, 100).unwrap();
        assert_eq!(dsp.regs.a.value(), 0);
        assert!(core.blocks.is_volatile(U24::new(1)));
        assert!(!core.blocks.is_volatile(U24::new(0)));
    }

    #[test]
    fn code_that_rewrites_itself() {
        // 0: movem x0,p:$2
        // 1: nop
        // 2: clr a
        // 3: wait
        let program = [0x07_0204, 0x00_0000, 0x20_0013, 0x00_0086];
        let mut dsp = dsp_with(&program);
        dsp.regs.x0 = U24::new(0x20_0013);

        let mut core = core();
        core.exec(&mut dsp, 100).unwrap();
        assert_eq!(dsp.regs.pc, U24::new(4));

        // this time the clear is replaced by a wait
        dsp.regs.pc = U24::ZERO;
        dsp.regs.a = dsp56k::U56::new(5);
        dsp.regs.x0 = U24::new(0x00_0086);
        dsp.state = RunState::Running;

        core.exec(&mut dsp, 100).unwrap();
        assert_eq!(dsp.regs.a.value(), 5);
        assert_eq!(dsp.regs.pc, U24::new(3));
        assert_eq!(dsp.state, RunState::Wait);
    }

    #[test]
    fn micro_blocks_are_reused() {
        // 0: clr a
        // 1: add x0,a
        // 2: wait
        let add = 0x20_0040;
        let mut dsp = dsp_with(&[0x20_0013, add, 0x00_0086]);
        dsp.regs.x0 = U24::new(0x10);

        let mut core = core();
        let rerun = |core: &mut Core, dsp: &mut Dsp| {
            dsp.regs.pc = U24::ZERO;
            dsp.state = RunState::Running;
            core.exec(dsp, 100).unwrap();
        };

        // rewriting the same word makes the address volatile
        rerun(&mut core, &mut dsp);
        dsp.write(Space::P, U24::new(1), U24::new(add));
        rerun(&mut core, &mut dsp);
        assert_eq!(core.blocks.micro_blocks(), 0);

        // 1: nop
        dsp.write(Space::P, U24::new(1), U24::ZERO);
        rerun(&mut core, &mut dsp);
        assert_eq!(dsp.regs.a.value(), 0);
        assert_eq!(core.blocks.micro_blocks(), 1);

        // back to the add, which is picked up again without compiling
        let compiled = core.compiler.compiled_count();
        dsp.write(Space::P, U24::new(1), U24::new(add));
        rerun(&mut core, &mut dsp);
        assert_eq!(dsp.regs.a.value(), 0x10_000000);
        assert_eq!(core.compiler.compiled_count(), compiled);
        assert_eq!(core.blocks.micro_blocks(), 1);
    }

    #[test]
    fn entering_a_block_in_the_middle() {
        // 0: clr a
        // 1: add x0,a
        // 2: add x0,a
        // 3: wait
        let mut dsp = dsp_with(&[0x20_0013, 0x20_0040, 0x20_0040, 0x00_0086]);
        dsp.regs.x0 = U24::new(0x10);

        let mut core = core();
        core.exec(&mut dsp, 100).unwrap();
        assert!(block_at(&core, &dsp, 0).is_some());

        dsp.regs.pc = U24::new(2);
        dsp.state = RunState::Running;
        core.exec(&mut dsp, 100).unwrap();

        assert_eq!(dsp.regs.a.value(), 0x30_000000);
        assert!(block_at(&core, &dsp, 0).is_none());
        assert!(block_at(&core, &dsp, 2).is_some());
    }

    #[test]
    fn destroying_a_block_destroys_its_parents() {
        // 0: jmp $2
        // 1: nop
        // 2: clr a
        // 3: wait
        let mut dsp = dsp_with(&[0x0C_0002, 0x00_0000, 0x20_0013, 0x00_0086]);

        let mut core = core();
        let rerun = |core: &mut Core, dsp: &mut Dsp| {
            dsp.regs.pc = U24::ZERO;
            dsp.state = RunState::Running;
            core.exec(dsp, 100).unwrap();
        };

        // the second run links the jump to the block at 2
        rerun(&mut core, &mut dsp);
        rerun(&mut core, &mut dsp);
        assert!(block_at(&core, &dsp, 0).is_some());
        assert!(block_at(&core, &dsp, 2).is_some());

        let mut view = core.mirror().view();
        view.refresh();
        assert_eq!(view.len(), 2);

        dsp.write(Space::P, U24::new(3), U24::new(0x00_0086));
        core.blocks.sync(&mut dsp.mem);
        assert!(block_at(&core, &dsp, 2).is_none());
        assert!(block_at(&core, &dsp, 0).is_none());

        // the mirror catches up once the core publishes
        core.clear();
        view.refresh();
        assert_eq!(view.len(), 0);
    }

    #[test]
    fn blocks_follow_the_active_loop() {
        // 0: do #3,$3
        // 2: add x0,a
        // 3: add x0,a
        // 4: wait
        let mut dsp = dsp_with(&[0x06_0380, 0x00_0003, 0x20_0040, 0x20_0040, 0x00_0086]);
        dsp.regs.x0 = U24::new(1);

        let mut core = core();
        core.exec(&mut dsp, 100).unwrap();
        assert_eq!(dsp.regs.a.value(), 6 << 24);
        assert_eq!(dsp.regs.pc, U24::new(5));
        assert!(!dsp.regs.status().loop_flag());
    }

    #[test]
    fn repeats() {
        // 0: rep #5
        // 1: add x0,a
        // 2: rep x0
        // 3: add x0,a
        // 4: wait
        let mut dsp = dsp_with(&[0x06_05A0, 0x20_0040, 0x06_C420, 0x20_0040, 0x00_0086]);
        dsp.regs.x0 = U24::new(2);
        dsp.regs.lc = U24::new(0x77);

        let mut core = core();
        core.exec(&mut dsp, 100).unwrap();
        assert_eq!(dsp.regs.a.value(), 14 << 24);
        assert_eq!(dsp.regs.lc, U24::new(0x77));
        assert_eq!(dsp.regs.rep_active, 0);
        assert_eq!(dsp.executed, 5 + 2 + 2 + 1);
    }

    #[test]
    fn illegal_words_are_reported() {
        let mut dsp = dsp_with(&[0x00_0000, 0x20_0008]);
        let mut core = core();
        assert!(matches!(
            core.exec(&mut dsp, 100),
            Err(CoreError::Exec { .. })
        ));
        assert_eq!(dsp.regs.pc, U24::new(1));
    }
}
