//! Registration of unwind tables for compiled blocks, so panics in hooks can cross JIT frames.
use cranelift::codegen::isa::{TargetIsa, unwind::UnwindInfo};

#[cfg(unix)]
mod imp {
    use super::*;
    use cranelift::codegen::gimli::{
        RunTimeEndian,
        write::{Address, EhFrame, EndianVec, FrameTable, Writer},
    };

    unsafe extern "C" {
        fn __register_frame(fde: *const u8);
        fn __deregister_frame(fde: *const u8);
    }

    /// libgcc walks a whole table and wants a zero length terminator.
    const TERMINATED: bool = cfg!(any(
        all(target_os = "linux", target_env = "gnu"),
        target_os = "freebsd"
    ));

    fn eh_frame(isa: &dyn TargetIsa, addr: usize, info: &UnwindInfo) -> Option<Box<[u8]>> {
        let UnwindInfo::SystemV(info) = info else {
            return None;
        };

        let mut table = FrameTable::default();
        let cie = table.add_cie(isa.create_systemv_cie()?);
        table.add_fde(cie, info.to_fde(Address::Constant(addr as u64)));

        let mut frame = EhFrame(EndianVec::new(RunTimeEndian::default()));
        table.write_eh_frame(&mut frame).ok()?;
        if TERMINATED {
            frame.0.write_u32(0).ok()?;
        }

        Some(frame.0.into_vec().into_boxed_slice())
    }

    pub struct Registration(Box<[u8]>);

    impl Registration {
        /// # Safety
        /// `addr` must be the address of the code `info` describes, which must outlive this
        /// registration.
        pub unsafe fn new(isa: &dyn TargetIsa, addr: usize, info: &UnwindInfo) -> Option<Self> {
            let frame = eh_frame(isa, addr, info)?;
            unsafe { __register_frame(frame.as_ptr()) };
            Some(Self(frame))
        }
    }

    impl Drop for Registration {
        fn drop(&mut self) {
            unsafe { __deregister_frame(self.0.as_ptr()) };
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;

    pub struct Registration;

    impl Registration {
        /// # Safety
        /// Always safe, nothing is registered on this platform.
        pub unsafe fn new(_: &dyn TargetIsa, _: usize, _: &UnwindInfo) -> Option<Self> {
            None
        }
    }
}

pub use imp::Registration;
