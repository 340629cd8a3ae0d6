//! Arena allocator for JITs.
//!
//! Regions are mapped on demand and never unmapped while the allocator is alive, so pointers
//! handed out stay valid even after the code they point to has been superseded.
use easyerr::Error;
use std::marker::PhantomData;
use std::ptr::NonNull;

#[cfg(target_family = "unix")]
use rustix::mm::{self as mman, MapFlags, MprotectFlags, ProtFlags};
#[cfg(target_family = "windows")]
use windows::Win32::System::{
    Diagnostics::Debug::FlushInstructionCache, Memory, Threading::GetCurrentProcess,
};

const REGION_MIN_LEN: usize = 1 << 18;

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("allocation of zero bytes")]
    Empty,
    #[error("failed to map a region of {len} bytes")]
    Map { len: usize },
    #[error("failed to change protection of a region to {protection:?}")]
    Protect { protection: Protection },
}

/// A memory mapped region.
#[derive(Clone, Copy)]
struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: changing the protection can be done from any thread
unsafe impl Send for Region {}

impl Region {
    fn map(len: usize) -> Result<Self, AllocError> {
        let len = len.max(REGION_MIN_LEN).next_multiple_of(REGION_MIN_LEN);

        #[cfg(target_family = "unix")]
        let ptr = unsafe {
            mman::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::empty(),
                MapFlags::PRIVATE,
            )
        }
        .map_err(|_| AllocError::Map { len })?;

        #[cfg(target_family = "windows")]
        let ptr = unsafe {
            Memory::VirtualAlloc(
                None,
                len,
                Memory::MEM_RESERVE | Memory::MEM_COMMIT,
                Memory::PAGE_NOACCESS,
            )
        };

        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or(AllocError::Map { len })?;
        Ok(Self { ptr, len })
    }

    /// Changes the protection of the first `length` bytes of this region.
    unsafe fn protect(&self, length: usize, protection: Protection) -> Result<(), AllocError> {
        #[cfg(target_family = "unix")]
        let result = unsafe {
            let flags = match protection {
                Protection::ReadExec => MprotectFlags::READ | MprotectFlags::EXEC,
                Protection::ReadWrite => MprotectFlags::READ | MprotectFlags::WRITE,
            };

            mman::mprotect(self.ptr.as_ptr().cast(), length, flags).is_ok()
        };

        #[cfg(target_family = "windows")]
        let result = unsafe {
            let mut previous = Memory::PAGE_PROTECTION_FLAGS(0);
            let flags = match protection {
                Protection::ReadExec => Memory::PAGE_EXECUTE_READ,
                Protection::ReadWrite => Memory::PAGE_READWRITE,
            };

            Memory::VirtualProtect(self.ptr.as_ptr().cast(), length, flags, &raw mut previous)
                .is_ok()
        };

        if result {
            Ok(())
        } else {
            Err(AllocError::Protect { protection })
        }
    }
}

/// An allocation inside an [`Allocator`].
///
/// # Safety considerations
/// The allocator this allocation comes from must not be modified while the allocation
/// is accessed. This is specially important for multi-threaded contexts.
pub struct Allocation<K>(NonNull<[u8]>, PhantomData<K>);

impl<K> Allocation<K> {
    /// Returns a pointer to the allocation.
    ///
    /// # Safety
    /// In order to access the data behind the pointer, accesses to the underlying allocator must
    /// be synchronized, as stated in the type docs.
    #[inline(always)]
    pub unsafe fn as_ptr(&self) -> NonNull<[u8]> {
        self.0
    }

    /// Address of the first byte of this allocation.
    #[inline(always)]
    pub fn addr(&self) -> usize {
        self.0.cast::<u8>().addr().get()
    }

    /// Length of this allocation in bytes.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

// SAFETY: safe to send to another thread as long as accesses to the allocation are synchronized
// with accesses to the allocator, which is the user's responsibility
unsafe impl<K> Send for Allocation<K> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    ReadExec,
    ReadWrite,
}

pub trait AllocKind {
    const PROTECTION: Protection;
}

pub struct Exec;
impl AllocKind for Exec {
    const PROTECTION: Protection = Protection::ReadExec;
}

pub struct ReadWrite;
impl AllocKind for ReadWrite {
    const PROTECTION: Protection = Protection::ReadWrite;
}

pub struct Allocator<K> {
    /// Regions that are full. Kept alive so that their allocations remain valid.
    retired: Vec<Region>,
    /// The currently active region
    current: Option<Region>,
    /// Offset into the current region
    offset: usize,
    /// Total bytes handed out.
    allocated: usize,
    _phantom: PhantomData<K>,
}

impl<K> Allocator<K>
where
    K: AllocKind,
{
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            retired: Vec::new(),
            current: None,
            offset: 0,
            allocated: 0,
            _phantom: PhantomData,
        }
    }

    /// Total amount of bytes allocated so far.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Amount of regions mapped so far.
    pub fn regions(&self) -> usize {
        self.retired.len() + usize::from(self.current.is_some())
    }

    fn reserve(
        &mut self,
        alignment: usize,
        length: usize,
    ) -> Result<(Region, NonNull<[u8]>), AllocError> {
        if length == 0 {
            return Err(AllocError::Empty);
        }

        let alignment = alignment.max(1).next_power_of_two();
        loop {
            let region = match self.current {
                Some(region) => region,
                None => {
                    let region = Region::map(length + alignment)?;
                    self.current = Some(region);
                    self.offset = 0;
                    region
                }
            };

            let start = self.offset.next_multiple_of(alignment);
            if region.len.checked_sub(start).is_some_and(|r| r >= length) {
                self.offset = start + length;
                self.allocated += length;

                let ptr = unsafe { region.ptr.add(start) };
                return Ok((region, NonNull::slice_from_raw_parts(ptr, length)));
            }

            self.retired.extend(self.current.take());
        }
    }

    /// Allocates `length` bytes without initializing them.
    pub fn allocate_uninit(
        &mut self,
        alignment: usize,
        length: usize,
    ) -> Result<Allocation<K>, AllocError> {
        let (region, ptr) = self.reserve(alignment, length)?;
        unsafe { region.protect(self.offset, K::PROTECTION)? };

        Ok(Allocation(ptr, PhantomData))
    }

    /// Allocates a copy of `data`.
    pub fn allocate(&mut self, alignment: usize, data: &[u8]) -> Result<Allocation<K>, AllocError> {
        let (region, ptr) = self.reserve(alignment, data.len())?;

        unsafe {
            region.protect(self.offset, Protection::ReadWrite)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr().cast(), data.len());
            if K::PROTECTION != Protection::ReadWrite {
                region.protect(self.offset, K::PROTECTION)?;
            }

            #[cfg(target_family = "windows")]
            {
                let process = GetCurrentProcess();
                _ = FlushInstructionCache(process, Some(ptr.as_ptr().cast()), data.len());
            }
        }

        Ok(Allocation(ptr, PhantomData))
    }
}

impl<K> Default for Allocator<K>
where
    K: AllocKind,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn data_is_copied_and_aligned() {
        let mut alloc = Allocator::<ReadWrite>::new();
        let a = alloc.allocate(64, &[1, 2, 3]).unwrap();
        let b = alloc.allocate(64, &[4, 5]).unwrap();

        assert_eq!(a.addr() % 64, 0);
        assert_eq!(b.addr() % 64, 0);
        assert_ne!(a.addr(), b.addr());

        let bytes = unsafe { a.as_ptr().as_ref() };
        assert_eq!(bytes, &[1, 2, 3]);
        assert_eq!(alloc.allocated(), 5);
    }

    #[test]
    fn large_allocations_get_their_own_region() {
        let mut alloc = Allocator::<ReadWrite>::new();
        alloc.allocate_uninit(8, 16).unwrap();
        let big = alloc.allocate_uninit(8, REGION_MIN_LEN * 2).unwrap();

        assert_eq!(big.len(), REGION_MIN_LEN * 2);
        assert_eq!(alloc.regions(), 2);
    }

    #[test]
    fn empty_allocation_is_an_error() {
        let mut alloc = Allocator::<Exec>::new();
        assert!(matches!(alloc.allocate(16, &[]), Err(AllocError::Empty)));
    }
}
