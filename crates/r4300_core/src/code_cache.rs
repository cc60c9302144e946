//! Bookkeeping shared with a translated-code cache. The core never looks at translated code itself,
//! it only keeps track of which pages may hold stale translations.

/// Number of 4 KiB pages in the 32-bit virtual address space.
pub const PAGE_COUNT: usize = 0x10_0000;

pub struct CodeCache {
    /// Pages whose translated code must be re-validated before use.
    invalid: Box<[bool]>,
    /// Checksum of a page taken when it was last unmapped from the TLB, if any.
    checksums: Box<[Option<u32>]>,
    /// Pages holding translated code.
    compiled: Box<[bool]>,
}

impl CodeCache {
    pub fn new() -> Self {
        Self {
            invalid: vec![true; PAGE_COUNT].into_boxed_slice(),
            checksums: vec![None; PAGE_COUNT].into_boxed_slice(),
            compiled: vec![false; PAGE_COUNT].into_boxed_slice(),
        }
    }

    pub fn is_invalid(&self, page: usize) -> bool {
        self.invalid[page]
    }

    pub fn set_invalid(&mut self, page: usize, invalid: bool) {
        self.invalid[page] = invalid;
    }

    pub fn checksum(&self, page: usize) -> Option<u32> {
        self.checksums[page]
    }

    pub fn set_checksum(&mut self, page: usize, checksum: Option<u32>) {
        self.checksums[page] = checksum;
    }

    /// Mark a page as holding translated code, which makes it valid.
    pub fn mark_compiled(&mut self, page: usize) {
        self.compiled[page] = true;
        self.invalid[page] = false;
    }

    pub fn is_compiled(&self, page: usize) -> bool {
        self.compiled[page]
    }

    /// Called after every store. A store to a page with valid translated code invalidates it.
    pub fn notify_store(&mut self, addr: u32) {
        let page = (addr >> 12) as usize;
        if !self.invalid[page] && self.compiled[page] {
            trace!("Store to {addr:08x} invalidated page {page:05x}");
            self.invalid[page] = true;
        }
    }
}
