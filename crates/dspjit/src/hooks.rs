//! Functions compiled code calls back into.
use crate::block::{Fastmem, Info, LinkSlot};
use cranelift::codegen::{ir, isa};
use dsp56k::{Registers, U24, agu};

pub type Context = std::ffi::c_void;

pub type GetRegistersHook = extern "sysv64-unwind" fn(*mut Context) -> *mut Registers;
pub type GetFastmemHook = extern "sysv64-unwind" fn(*mut Context) -> *const Fastmem;
/// Reads a data word: `(ctx, space, addr) -> value`.
pub type ReadHook = extern "sysv64-unwind" fn(*mut Context, u32, u32) -> u32;
/// Writes a data word: `(ctx, space, addr, value) -> program memory changed`.
pub type WriteHook = extern "sysv64-unwind" fn(*mut Context, u32, u32, u32) -> bool;
/// Executes an instruction the compiler does not handle: `(ctx, pc, word, ext) -> stop`.
///
/// Registers are flushed before the call and reloaded after it. Returning `true` makes the
/// block exit right away without storing anything.
pub type InterpretHook = extern "sysv64-unwind" fn(*mut Context, u32, u32, u32) -> bool;
/// Handles the end of a hardware loop iteration: `(ctx, pc, len)`.
pub type LoopEndHook = extern "sysv64-unwind" fn(*mut Context, u32, u32);
/// Decides whether an exit should continue into the block behind a link slot.
pub type FollowLinkHook = extern "sysv64-unwind" fn(*const Info, *mut Context, *mut LinkSlot) -> bool;
/// Tries to fill an empty link slot.
pub type TryLinkHook = extern "sysv64-unwind" fn(*mut Context, *mut LinkSlot);

/// External functions that compiled code calls.
#[derive(Clone, Copy)]
pub struct Hooks {
    pub get_registers: GetRegistersHook,
    pub get_fastmem: GetFastmemHook,
    pub read: ReadHook,
    pub write: WriteHook,
    pub interpret: InterpretHook,
    pub loop_end: LoopEndHook,
    pub follow_link: FollowLinkHook,
    pub try_link: TryLinkHook,
}

/// Non linear address register update, called for modulo, multiple wrap-around and bit
/// reversed registers.
pub(crate) extern "sysv64-unwind" fn agu_update(r: u32, n: u32, m: u32, add: bool) -> u32 {
    agu::update(U24::new(r), U24::new(n), U24::new(m), add).value()
}

fn signature(params: &[ir::Type], returns: &[ir::Type]) -> ir::Signature {
    ir::Signature {
        params: params.iter().copied().map(ir::AbiParam::new).collect(),
        returns: returns.iter().copied().map(ir::AbiParam::new).collect(),
        call_conv: isa::CallConv::SystemV,
    }
}

impl Hooks {
    pub(crate) fn get_registers_sig(ptr_type: ir::Type) -> ir::Signature {
        signature(&[ptr_type], &[ptr_type])
    }

    pub(crate) fn get_fastmem_sig(ptr_type: ir::Type) -> ir::Signature {
        signature(&[ptr_type], &[ptr_type])
    }

    pub(crate) fn read_sig(ptr_type: ir::Type) -> ir::Signature {
        use ir::types::I32;
        signature(&[ptr_type, I32, I32], &[I32])
    }

    pub(crate) fn write_sig(ptr_type: ir::Type) -> ir::Signature {
        use ir::types::{I8, I32};
        signature(&[ptr_type, I32, I32, I32], &[I8])
    }

    pub(crate) fn interpret_sig(ptr_type: ir::Type) -> ir::Signature {
        use ir::types::{I8, I32};
        signature(&[ptr_type, I32, I32, I32], &[I8])
    }

    pub(crate) fn loop_end_sig(ptr_type: ir::Type) -> ir::Signature {
        use ir::types::I32;
        signature(&[ptr_type, I32, I32], &[])
    }

    pub(crate) fn follow_link_sig(ptr_type: ir::Type) -> ir::Signature {
        signature(&[ptr_type, ptr_type, ptr_type], &[ir::types::I8])
    }

    pub(crate) fn try_link_sig(ptr_type: ir::Type) -> ir::Signature {
        signature(&[ptr_type, ptr_type], &[])
    }

    pub(crate) fn agu_sig() -> ir::Signature {
        use ir::types::{I8, I32};
        signature(&[I32, I32, I32, I8], &[I32])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn agu_helper_matches_the_agu() {
        assert_eq!(agu_update(0x103, 1, 9, true), 0x104);
        assert_eq!(agu_update(0x109, 2, 9, true), 0x101);
        assert_eq!(agu_update(0, 0x40_0000, 0, true), 2);
        assert_eq!(agu_update(0, 1, 0xFF_FFFF, false), 0xFF_FFFF);
    }
}
