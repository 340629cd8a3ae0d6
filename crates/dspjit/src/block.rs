use crate::hooks::Context;
use crate::mode::Mode;
use crate::registers::RegMask;
use crate::unwind::Registration;
use dsp56k::{Registers, Space, U24};
use jitalloc::{Allocation, Exec, ReadWrite};
use std::ptr::NonNull;

/// Information regarding an execution of compiled code.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Info {
    /// How many instructions were executed natively, including the blocks reached through
    /// links. Instructions run by the interpret hook are not counted here.
    pub instructions: u32,
}

/// Direct access to data memory for compiled code.
///
/// Addresses below `limit[space]` are loaded straight from `base[space]`, everything else goes
/// through the read and write hooks.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Fastmem {
    pub base: [*mut U24; 2],
    pub limit: [u32; 2],
}

impl Fastmem {
    /// Fast memory that sends every access through the hooks.
    pub const DISABLED: Self = Self {
        base: [std::ptr::null_mut(); 2],
        limit: [0; 2],
    };

    pub(crate) fn base_offset(space: Space) -> i32 {
        (std::mem::offset_of!(Fastmem, base) + size_of::<*mut U24>() * space as usize) as i32
    }

    pub(crate) fn limit_offset(space: Space) -> i32 {
        (std::mem::offset_of!(Fastmem, limit) + size_of::<u32>() * space as usize) as i32
    }
}

/// The cell an exit of a block goes through to reach its successor.
///
/// Lives in data memory for as long as the JIT does. `func` is zero until the slot is linked.
#[repr(C)]
#[derive(Debug)]
pub struct LinkSlot {
    /// Entry point of the linked block.
    pub func: usize,
    /// Address the exit continues at.
    pub target: u32,
    /// Owner defined handle of the linked block.
    pub child: u64,
    /// Owner defined handle of the block this slot belongs to.
    pub owner: u64,
}

impl LinkSlot {
    pub fn target(&self) -> U24 {
        U24::new(self.target)
    }

    pub fn is_linked(&self) -> bool {
        self.func != 0
    }

    pub fn link(&mut self, func: BlockFn, child: u64) {
        self.func = func.addr();
        self.child = child;
    }

    pub fn unlink(&mut self) {
        self.func = 0;
        self.child = 0;
    }
}

/// Entry point of a compiled block. Uses the tail calling convention and can only be called
/// through [`crate::Jit::call`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockFn(NonNull<u8>);

impl BlockFn {
    pub fn addr(self) -> usize {
        self.0.addr().get()
    }
}

/// Why a block ended where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// A jump, branch, call, return or exception.
    Branch,
    /// An instruction that writes LA, LC, SR, SP or a modifier register.
    LoopRegisterWrite,
    /// An instruction that may write program memory.
    ProgramWrite,
    /// ANDI or ORI, which may change the scaling or rounding mode.
    ModeChange,
    /// The last instruction of the active hardware loop.
    LoopEnd,
    /// The next instruction starts another block.
    MergePoint,
    /// The block starts or the next instruction sits at an address that was written at run time.
    VolatileAddress,
    /// The configured maximum block length was reached.
    InstructionCap,
    /// The next word does not decode, the interpreter reports it when it gets there.
    Fallback,
}

/// Meta information regarding a block.
#[derive(Debug, Clone)]
pub struct Meta {
    pub start: U24,
    /// Program words covered, including extension words and repeated bodies.
    pub len: u32,
    /// Instructions compiled, natively or through the interpret hook.
    pub instructions: u32,
    pub termination: Termination,
    /// The loop end address this block was compiled against, if LF was set.
    pub loop_end: Option<U24>,
    pub mode: Mode,
    /// Registers the block may read.
    pub reads: RegMask,
    /// Registers the block may write.
    pub writes: RegMask,
    pub code_size: usize,
    /// The Cranelift IR of this block. Only available if `cfg!(debug_assertions)` is true.
    pub clir: Option<String>,
}

impl Meta {
    /// Whether `addr` lies in this block.
    #[inline(always)]
    pub fn covers(&self, addr: U24) -> bool {
        addr.wrapping_sub(self.start).value() < self.len
    }

    /// Whether this block may run with the given register state.
    ///
    /// A block that covers the loop address must have been compiled against it when a loop is
    /// active, or the loop end would be missed.
    #[inline(always)]
    pub fn is_valid_for(&self, regs: &Registers) -> bool {
        !(regs.status().loop_flag() && self.covers(regs.la) && self.loop_end != Some(regs.la))
    }
}

/// A compiled block of DSP56300 instructions.
pub struct Block {
    code: Allocation<Exec>,
    meta: Meta,
    links: Vec<Allocation<ReadWrite>>,
    _unwind: Option<Registration>,
}

impl Block {
    pub(crate) fn new(
        code: Allocation<Exec>,
        meta: Meta,
        links: Vec<Allocation<ReadWrite>>,
        unwind: Option<Registration>,
    ) -> Self {
        Self {
            code,
            meta,
            links,
            _unwind: unwind,
        }
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn as_fn(&self) -> BlockFn {
        // SAFETY: the pointer is only used as an address
        BlockFn(unsafe { self.code.as_ptr() }.cast())
    }

    /// The link slots of this block's exits.
    pub fn links(&self) -> impl Iterator<Item = NonNull<LinkSlot>> + '_ {
        // SAFETY: the pointers are only handed out, accesses go through the owner
        self.links
            .iter()
            .map(|slot| unsafe { slot.as_ptr() }.cast::<LinkSlot>())
    }
}

/// Compiled code that calls blocks from Rust.
pub(crate) struct Trampoline(pub(crate) Allocation<Exec>);

type TrampolineFn = extern "sysv64-unwind" fn(*mut Info, *mut Context, BlockFn);

impl Trampoline {
    /// # Safety
    /// `ctx` must be what the hooks of the JIT that compiled `block` expect.
    pub(crate) unsafe fn call(&self, ctx: *mut Context, block: BlockFn) -> Info {
        let mut info = Info::default();

        // SAFETY: the trampoline was compiled with this signature
        let func: TrampolineFn = unsafe { std::mem::transmute(self.0.as_ptr().cast::<u8>()) };
        func(&raw mut info, ctx, block);

        info
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn meta(start: u32, len: u32, loop_end: Option<u32>) -> Meta {
        Meta {
            start: U24::new(start),
            len,
            instructions: len,
            termination: Termination::Branch,
            loop_end: loop_end.map(U24::new),
            mode: Mode::default(),
            reads: RegMask::NONE,
            writes: RegMask::NONE,
            code_size: 0,
            clir: None,
        }
    }

    #[test]
    fn coverage_wraps() {
        let meta = meta(0xFF_FFFE, 4, None);
        assert!(meta.covers(U24::new(0xFF_FFFF)));
        assert!(meta.covers(U24::new(1)));
        assert!(!meta.covers(U24::new(2)));
    }

    #[test]
    fn loop_guard() {
        let mut regs = Registers::default();
        regs.la = U24::new(0x12);

        // no active loop, anything goes
        assert!(meta(0x10, 4, None).is_valid_for(&regs));

        regs.update_status(|s| s.set_loop_flag(true));
        assert!(!meta(0x10, 4, None).is_valid_for(&regs));
        assert!(meta(0x10, 4, Some(0x12)).is_valid_for(&regs));
        assert!(meta(0x13, 4, None).is_valid_for(&regs));
    }

    #[test]
    fn fastmem_layout() {
        assert_eq!(Fastmem::base_offset(Space::X), 0);
        assert_eq!(Fastmem::base_offset(Space::Y), size_of::<usize>() as i32);
        assert_eq!(Fastmem::limit_offset(Space::Y), 2 * size_of::<usize>() as i32 + 4);
    }
}
