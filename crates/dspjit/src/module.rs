use jitalloc::{AllocError, Allocation, Allocator, Exec, ReadWrite};
use std::alloc::Layout;

/// Memory for compiled code and the data it refers to.
pub struct Module {
    code_allocator: Allocator<Exec>,
    data_allocator: Allocator<ReadWrite>,
}

impl Module {
    pub fn new() -> Self {
        Self {
            code_allocator: Allocator::new(),
            data_allocator: Allocator::new(),
        }
    }

    pub fn allocate_code(&mut self, code: &[u8]) -> Result<Allocation<Exec>, AllocError> {
        self.code_allocator.allocate(64, code)
    }

    pub fn allocate_data(&mut self, layout: Layout) -> Result<Allocation<ReadWrite>, AllocError> {
        self.data_allocator
            .allocate_uninit(layout.align(), layout.size())
    }

    /// Bytes of code allocated so far.
    pub fn code_size(&self) -> usize {
        self.code_allocator.allocated()
    }
}
