//! Compiles DSP56300 instruction streams into host code using Cranelift.
mod builder;
mod module;
mod unwind;

pub mod block;
pub mod hooks;
pub mod mode;
pub mod registers;

use crate::{
    block::Trampoline,
    builder::BlockBuilder,
    hooks::{Context, Hooks},
    module::Module,
    unwind::Registration,
};
use cranelift::{
    codegen::{self, ir},
    frontend, native,
    prelude::{Configurable, InstBuilder, isa::TargetIsa},
};
use dsp56k::U24;
use dsp56k::ins::DecodeError;
use easyerr::{Error, ResultExt};
use jitalloc::AllocError;
use std::sync::Arc;
use tracing::{error, trace, trace_span};

pub use block::{Block, BlockFn, Fastmem, Info, LinkSlot, Meta, Termination};
pub use mode::Mode;
pub use registers::{RegId, RegMask};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum amount of instructions in a block.
    pub max_block_len: u32,
    /// REP instructions with a constant count up to this one are unrolled.
    pub rep_unroll_limit: u32,
    /// Whether X and Y memory accesses may skip the read and write hooks.
    pub fastmem: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_block_len: 64,
            rep_unroll_limit: 4,
            fastmem: true,
        }
    }
}

/// Where the compiler gets program words from, and what it knows about the addresses.
pub trait Source {
    /// Reads a program word.
    fn fetch(&mut self, addr: U24) -> U24;
    /// Whether `addr` was written at run time and must be compiled on its own.
    fn is_volatile(&self, addr: U24) -> bool;
    /// Whether a block already starts at `addr`.
    fn is_block_start(&self, addr: U24) -> bool;
}

/// What to compile.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub start: U24,
    pub mode: Mode,
    /// LA, if a hardware loop is active.
    pub loop_end: Option<U24>,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("instruction at {addr} does not decode")]
    Decode { addr: U24, source: DecodeError },
    #[error(transparent)]
    Codegen { source: codegen::CodegenError },
    #[error(transparent)]
    Alloc { source: AllocError },
    #[error(transparent)]
    Settings { source: codegen::settings::SetError },
    #[error("host machine is not supported: {reason}")]
    UnsupportedHost { reason: &'static str },
}

struct Compiler {
    settings: Settings,
    hooks: Hooks,
    isa: Arc<dyn TargetIsa>,
    module: Module,
}

impl Compiler {
    fn new(settings: Settings, hooks: Hooks) -> Result<Self, BuildError> {
        let verifier = if cfg!(debug_assertions) {
            "true"
        } else {
            "false"
        };

        let mut codegen = codegen::settings::builder();
        let options = [
            ("preserve_frame_pointers", "true"),
            ("use_colocated_libcalls", "false"),
            ("stack_switch_model", "basic"),
            ("unwind_info", "true"),
            ("is_pic", "false"),
            // affect runtime performance
            ("opt_level", "speed"),
            ("enable_verifier", verifier),
            ("enable_alias_analysis", "true"),
            ("regalloc_algorithm", "backtracking"),
            ("regalloc_checker", "false"),
            ("enable_pinned_reg", "false"),
            ("enable_heap_access_spectre_mitigation", "false"),
            ("enable_table_access_spectre_mitigation", "false"),
        ];

        for (name, value) in options {
            codegen.set(name, value).context(BuildCtx::Settings)?;
        }

        let isa_builder =
            native::builder().map_err(|reason| BuildError::UnsupportedHost { reason })?;

        let flags = codegen::settings::Flags::new(codegen);
        let isa = isa_builder.finish(flags).context(BuildCtx::Codegen)?;
        if isa.pointer_type() != ir::types::I64 {
            return Err(BuildError::UnsupportedHost {
                reason: "only 64-bit hosts are supported",
            });
        }

        Ok(Compiler {
            settings,
            hooks,
            isa,
            module: Module::new(),
        })
    }

    fn block_signature(&self) -> ir::Signature {
        let ptr = self.isa.pointer_type();
        ir::Signature {
            // info, ctx, regs, fastmem
            params: vec![ir::AbiParam::new(ptr); 4],
            returns: vec![],
            call_conv: codegen::isa::CallConv::Tail,
        }
    }

    fn trampoline_signature(&self) -> ir::Signature {
        let ptr = self.isa.pointer_type();
        ir::Signature {
            // info, ctx, block
            params: vec![ir::AbiParam::new(ptr); 3],
            returns: vec![],
            call_conv: codegen::isa::CallConv::SystemV,
        }
    }

    /// Compiles a trampoline to call blocks from Rust.
    fn trampoline(
        &mut self,
        code_ctx: &mut codegen::Context,
        func_ctx: &mut frontend::FunctionBuilderContext,
    ) -> Result<Trampoline, BuildError> {
        let block_sig = self.block_signature();

        let mut func = ir::Function::new();
        func.signature = self.trampoline_signature();

        let mut builder = frontend::FunctionBuilder::new(&mut func, func_ctx);
        let entry_bb = builder.create_block();
        builder.append_block_params_for_function_params(entry_bb);
        builder.switch_to_block(entry_bb);
        builder.seal_block(entry_bb);

        let params = builder.block_params(entry_bb);
        let info_ptr = params[0];
        let ctx_ptr = params[1];
        let block_ptr = params[2];
        let ptr_type = self.isa.pointer_type();

        // extract regs ptr
        let get_regs_sig = builder.import_signature(Hooks::get_registers_sig(ptr_type));
        let get_registers = builder
            .ins()
            .iconst(ptr_type, self.hooks.get_registers as usize as i64);
        let inst = builder
            .ins()
            .call_indirect(get_regs_sig, get_registers, &[ctx_ptr]);
        let regs_ptr = builder.inst_results(inst)[0];

        // extract fastmem ptr
        let get_fmem_sig = builder.import_signature(Hooks::get_fastmem_sig(ptr_type));
        let get_fmem = builder
            .ins()
            .iconst(ptr_type, self.hooks.get_fastmem as usize as i64);
        let inst = builder
            .ins()
            .call_indirect(get_fmem_sig, get_fmem, &[ctx_ptr]);
        let fmem_ptr = builder.inst_results(inst)[0];

        // call the block
        let block_sig = builder.import_signature(block_sig);
        builder.ins().call_indirect(
            block_sig,
            block_ptr,
            &[info_ptr, ctx_ptr, regs_ptr, fmem_ptr],
        );

        builder.ins().return_(&[]);
        builder.finalize();

        code_ctx.clear();
        code_ctx.func = func;
        let compiled = code_ctx
            .compile(&*self.isa, &mut Default::default())
            .map_err(|e| BuildError::Codegen { source: e.inner })?;

        let alloc = self
            .module
            .allocate_code(compiled.code_buffer())
            .context(BuildCtx::Alloc)?;

        Ok(Trampoline(alloc))
    }
}

/// A JIT context, producing [`Block`]s.
pub struct Jit {
    compiler: Compiler,
    code_ctx: codegen::Context,
    func_ctx: frontend::FunctionBuilderContext,
    compiled_count: u64,
    trampoline: Trampoline,
}

impl Jit {
    pub fn new(settings: Settings, hooks: Hooks) -> Result<Self, BuildError> {
        let mut compiler = Compiler::new(settings, hooks)?;
        let mut code_ctx = codegen::Context::new();
        let mut func_ctx = frontend::FunctionBuilderContext::new();

        let trampoline = compiler.trampoline(&mut code_ctx, &mut func_ctx)?;

        Ok(Self {
            compiler,
            code_ctx,
            func_ctx,
            compiled_count: 0,
            trampoline,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.compiler.settings
    }

    /// Amount of blocks compiled so far.
    pub fn compiled_count(&self) -> u64 {
        self.compiled_count
    }

    /// Bytes of executable memory in use.
    pub fn code_size(&self) -> usize {
        self.compiler.module.code_size()
    }

    /// Compiles the block starting at `target.start`, following the program until a terminal
    /// instruction or one of the block limits.
    pub fn compile(
        &mut self,
        source: &mut impl Source,
        target: Target,
    ) -> Result<Block, BuildError> {
        let _span = trace_span!("compile", start = %target.start, mode = ?target.mode).entered();

        let mut func = ir::Function::new();
        func.signature = self.compiler.block_signature();

        let func_builder = frontend::FunctionBuilder::new(&mut func, &mut self.func_ctx);
        let builder = BlockBuilder::new(&mut self.compiler, func_builder, target);
        let output = builder.build(source)?;

        let clir = cfg!(debug_assertions).then(|| func.display().to_string());

        self.code_ctx.clear();
        self.code_ctx.func = func;
        let compiled = match self
            .code_ctx
            .compile(&*self.compiler.isa, &mut Default::default())
        {
            Ok(compiled) => compiled,
            Err(e) => {
                error!("failed to compile block at {}: {}", target.start, e.inner);
                return Err(BuildError::Codegen { source: e.inner });
            }
        };

        let alloc = match self.compiler.module.allocate_code(compiled.code_buffer()) {
            Ok(alloc) => alloc,
            Err(e) => {
                error!("out of executable memory for block at {}: {e}", target.start);
                return Err(BuildError::Alloc { source: e });
            }
        };

        let unwind = if let Ok(Some(unwind_info)) = compiled.create_unwind_info(&*self.compiler.isa)
        {
            // SAFETY: the code lives as long as the block, which owns the registration
            unsafe { Registration::new(&*self.compiler.isa, alloc.addr(), &unwind_info) }
        } else {
            None
        };

        let meta = Meta {
            start: target.start,
            len: output.len,
            instructions: output.instructions,
            termination: output.termination,
            loop_end: target.loop_end,
            mode: target.mode,
            reads: output.reads,
            writes: output.writes,
            code_size: alloc.len(),
            clir,
        };

        trace!(
            "compiled block at {}: {} instructions, {} words, {:?}, {} bytes",
            meta.start, meta.instructions, meta.len, meta.termination, meta.code_size
        );

        self.compiled_count += 1;
        Ok(Block::new(alloc, meta, output.links, unwind))
    }

    /// Calls the given block with the given context.
    ///
    /// # Safety
    /// `ctx` must match the type expected by the hooks of this JIT context, and `block` must have
    /// been compiled by it and still be alive.
    pub unsafe fn call(&mut self, ctx: *mut Context, block: BlockFn) -> Info {
        // SAFETY: the exclusive reference to the context guarantees the allocator is not being
        // used, keeping the allocations safe
        unsafe { self.trampoline.call(ctx, block) }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::LinkSlot;
    use crate::hooks::Context;
    use dsp56k::Registers;

    extern "sysv64-unwind" fn get_registers(_: *mut Context) -> *mut Registers {
        std::ptr::null_mut()
    }

    extern "sysv64-unwind" fn get_fastmem(_: *mut Context) -> *const Fastmem {
        std::ptr::null()
    }

    extern "sysv64-unwind" fn read(_: *mut Context, _: u32, _: u32) -> u32 {
        0
    }

    extern "sysv64-unwind" fn write(_: *mut Context, _: u32, _: u32, _: u32) -> bool {
        false
    }

    extern "sysv64-unwind" fn interpret(_: *mut Context, _: u32, _: u32, _: u32) -> bool {
        false
    }

    extern "sysv64-unwind" fn loop_end(_: *mut Context, _: u32, _: u32) {}

    extern "sysv64-unwind" fn follow_link(
        _: *const Info,
        _: *mut Context,
        _: *mut LinkSlot,
    ) -> bool {
        false
    }

    extern "sysv64-unwind" fn try_link(_: *mut Context, _: *mut LinkSlot) {}

    fn jit(settings: Settings) -> Jit {
        let hooks = Hooks {
            get_registers,
            get_fastmem,
            read,
            write,
            interpret,
            loop_end,
            follow_link,
            try_link,
        };

        Jit::new(settings, hooks).unwrap()
    }

    /// Program memory for the compiler. Addresses past the end read as NOP.
    #[derive(Default)]
    struct Program {
        words: Vec<u32>,
        starts: Vec<u32>,
        volatile: Vec<u32>,
    }

    impl Program {
        fn new(words: &[u32]) -> Self {
            Self {
                words: words.to_vec(),
                ..Default::default()
            }
        }
    }

    impl Source for Program {
        fn fetch(&mut self, addr: U24) -> U24 {
            U24::new(self.words.get(addr.value() as usize).copied().unwrap_or(0))
        }

        fn is_volatile(&self, addr: U24) -> bool {
            self.volatile.contains(&addr.value())
        }

        fn is_block_start(&self, addr: U24) -> bool {
            self.starts.contains(&addr.value())
        }
    }

    fn target(start: u32) -> Target {
        Target {
            start: U24::new(start),
            mode: Mode::default(),
            loop_end: None,
        }
    }

    fn compile(program: &mut Program, target: Target) -> Block {
        jit(Settings::default()).compile(program, target).unwrap()
    }

    #[test]
    fn straight_line_until_return() {
        // clr a
        // add x0,a
        // rts
        let mut program = Program::new(&[0x20_0013, 0x20_0040, 0x00_000C]);
        let block = compile(&mut program, target(0));

        let meta = block.meta();
        assert_eq!(meta.termination, Termination::Branch);
        assert_eq!(meta.len, 3);
        assert_eq!(meta.instructions, 3);
        assert!(meta.writes.contains(RegId::A));
        assert!(meta.reads.contains(RegId::X0));
        assert_eq!(block.links().count(), 0);
    }

    #[test]
    fn instruction_cap() {
        let mut jit = jit(Settings {
            max_block_len: 8,
            ..Default::default()
        });

        let block = jit.compile(&mut Program::default(), target(0x10)).unwrap();
        assert_eq!(block.meta().termination, Termination::InstructionCap);
        assert_eq!(block.meta().len, 8);
        assert_eq!(block.links().count(), 1);
        assert_eq!(jit.compiled_count(), 1);
    }

    #[test]
    fn stops_at_other_blocks() {
        let mut program = Program::default();
        program.starts.push(2);

        let block = compile(&mut program, target(0));
        assert_eq!(block.meta().termination, Termination::MergePoint);
        assert_eq!(block.meta().len, 2);
    }

    #[test]
    fn volatile_start_is_compiled_alone() {
        let mut program = Program::default();
        program.volatile.push(4);

        let block = compile(&mut program, target(4));
        assert_eq!(block.meta().termination, Termination::VolatileAddress);
        assert_eq!(block.meta().len, 1);
    }

    #[test]
    fn loop_end_closes_the_block() {
        let mut program = Program::default();
        let block = compile(
            &mut program,
            Target {
                loop_end: Some(U24::new(1)),
                ..target(0)
            },
        );

        assert_eq!(block.meta().termination, Termination::LoopEnd);
        assert_eq!(block.meta().len, 2);
        assert_eq!(block.meta().loop_end, Some(U24::new(1)));
    }

    #[test]
    fn conditional_branch_has_two_links() {
        // jeq $100
        let mut program = Program::new(&[0x0E_A100]);
        let block = compile(&mut program, target(0));
        assert_eq!(block.meta().termination, Termination::Branch);
        assert_eq!(block.links().count(), 2);
    }

    #[test]
    fn repeat_is_compiled_with_its_body() {
        // rep #5
        // asr a
        // rts
        let mut program = Program::new(&[0x06_05A0, 0x20_0022, 0x00_000C]);
        let block = compile(&mut program, target(0));
        assert_eq!(block.meta().termination, Termination::Branch);
        assert_eq!(block.meta().len, 3);
        assert_eq!(block.meta().instructions, 3);

        // rep #0
        // add x0,a
        // rts
        let mut program = Program::new(&[0x06_00A0, 0x20_0040, 0x00_000C]);
        let block = compile(&mut program, target(0));
        assert_eq!(block.meta().len, 3);

        // rep x0 with a loop body
        let mut program = Program::new(&[0x06_C420, 0x20_0040, 0x00_000C]);
        let block = compile(&mut program, target(0));
        assert_eq!(block.meta().len, 3);
    }

    /// The instructions of every block in the CLIF text of a function, by block name.
    fn clif_blocks(clir: &str) -> Vec<(&str, Vec<&str>)> {
        let mut blocks: Vec<(&str, Vec<&str>)> = Vec::new();
        for line in clir.lines() {
            if line.starts_with("block") {
                let end = line.find(['(', ':']).unwrap_or(line.len());
                blocks.push((&line[..end], Vec::new()));
            } else if let Some((_, lines)) = blocks.last_mut() {
                lines.push(line.trim());
            }
        }

        blocks
    }

    #[test]
    fn repeat_loops_keep_registers_in_variables() {
        // rep #100
        // add x0,a
        // rts
        let mut program = Program::new(&[0x06_64A0, 0x20_0040, 0x00_000C]);
        let block = compile(&mut program, target(0));
        assert_eq!(block.meta().instructions, 3);

        let clir = block.meta().clir.as_deref().unwrap();
        let blocks = clif_blocks(clir);
        let (_, body) = blocks
            .iter()
            .find(|(name, lines)| {
                let back_edge = format!("{name}(");
                lines
                    .iter()
                    .any(|line| line.starts_with("brif") && line.contains(&back_edge))
            })
            .unwrap();

        assert!(body.iter().any(|line| line.contains("iadd")));
        assert!(
            body.iter()
                .all(|line| !line.contains("load") && !line.contains("store")),
            "the loop touches the register file:\n{}",
            body.join("\n")
        );
    }

    #[test]
    fn hardware_loops_end_the_block() {
        // do #3,$3
        let mut program = Program::new(&[0x06_0380, 0x00_0003]);
        let block = compile(&mut program, target(0));
        assert_eq!(block.meta().termination, Termination::Branch);
        assert_eq!(block.meta().len, 2);
    }

    #[test]
    fn control_writes_end_the_block() {
        // movec #$10,m0
        let mut program = Program::new(&[0x05_10A0]);
        let block = compile(&mut program, target(0));
        assert_eq!(block.meta().termination, Termination::LoopRegisterWrite);
        assert_eq!(block.meta().writes, RegMask::ALL);

        // andi #$fe,mr
        let mut program = Program::new(&[0x00_FEB8]);
        let block = compile(&mut program, target(0));
        assert_eq!(block.meta().termination, Termination::ModeChange);
    }

    #[test]
    fn undecodable_words() {
        let mut jit = jit(Settings::default());
        let mut program = Program::new(&[0x20_0008]);
        assert!(matches!(
            jit.compile(&mut program, target(0)),
            Err(BuildError::Decode { .. })
        ));

        let mut program = Program::new(&[0x00_0000, 0x20_0008]);
        let block = jit.compile(&mut program, target(0)).unwrap();
        assert_eq!(block.meta().termination, Termination::Fallback);
        assert_eq!(block.meta().len, 1);
    }
}
