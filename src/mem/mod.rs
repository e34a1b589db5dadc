pub mod allocator;
pub mod frame;
pub mod paging;
pub mod physical;

pub const PAGE_SIZE: u64 = 4096;
// user addresses live strictly below this; anything at or above is kernel space
pub const MAX_USER_ADDRESS: u64 = 0x80_0000_0000;
// span of virtual memory covered by one last-level page table (512 entries)
pub const PAGE_TABLE_SPAN: u64 = 512 * PAGE_SIZE;

#[inline]
pub const fn align_up(val: u64, align: u64) -> u64 {
    (val + align - 1) & !(align - 1)
}

#[inline]
pub const fn align_down(val: u64, align: u64) -> u64 {
    val & !(align - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub fn to_inner(self) -> u64 {
        self.0
    }

    pub const fn offset(&self, offset: u64) -> Self {
        Self::new(self.0 + offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub fn to_inner(self) -> u64 {
        self.0
    }

    pub fn offset(&self, offset: u64) -> Self {
        Self::new(self.0 + offset)
    }

    pub fn is_page_aligned(&self) -> bool {
        self.0 % PAGE_SIZE == 0
    }

    pub fn is_user(&self) -> bool {
        self.0 < MAX_USER_ADDRESS
    }

    // virtual page number
    pub fn page(&self) -> u64 {
        self.0 / PAGE_SIZE
    }

    pub fn page_offset(&self) -> u64 {
        self.0 % PAGE_SIZE
    }

    // index of the last-level table covering this address
    pub fn table(&self) -> u64 {
        self.0 / PAGE_TABLE_SPAN
    }
}
