pub mod entry;

use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use log::trace;

use self::entry::{Entry, Perm};
use super::frame::Frame;
use super::physical::PhysicalMemory;
use super::{PhysicalAddress, VirtualAddress, PAGE_SIZE};
use crate::error::{KResult, KernelError};

/// Per-process mappings of user pages.
///
/// Every last-level table that holds at least one mapping is backed by a
/// physical frame, so mapping into a new 2 MiB span can run out of memory even
/// when the pages themselves are shared.
#[derive(Debug, Default)]
pub struct AddressSpace {
    // virtual page number -> mapping
    entries: HashMap<u64, Entry>,
    // table index -> frame holding the table
    tables: HashMap<u64, Frame>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, va: VirtualAddress) -> Option<Entry> {
        self.entries.get(&va.page()).copied()
    }

    pub fn translate(&self, va: VirtualAddress) -> Option<(PhysicalAddress, Perm)> {
        self.entry(va).map(|entry| {
            let phys = entry.frame().start_address().offset(va.page_offset());
            (phys, entry.perm())
        })
    }

    pub fn mapped_pages(&self) -> usize {
        self.entries.len()
    }

    pub fn table_frames(&self) -> usize {
        self.tables.len()
    }

    fn missing_tables(&self, va: VirtualAddress, pages: u64) -> HashSet<u64> {
        if pages == 0 {
            return HashSet::new();
        }
        let last = va.offset((pages - 1) * PAGE_SIZE).table();
        (va.table()..=last)
            .filter(|table| !self.tables.contains_key(table))
            .collect()
    }

    /// True if every byte of [va, va + len) is mapped.
    pub fn is_mapped(&self, va: VirtualAddress, len: usize) -> bool {
        Self::chunks(va, len).all(|(cur, _, _)| self.entry(cur).is_some())
    }

    // allocates page-table frames for [va, va + pages) after checking that
    // `extra` more frames would still be available afterwards
    fn reserve(&mut self, mem: &mut PhysicalMemory, va: VirtualAddress, pages: u64, extra: u64) -> KResult<()> {
        let missing = self.missing_tables(va, pages);
        if mem.free_frames() < missing.len() as u64 + extra {
            return Err(KernelError::OutOfMemory);
        }
        for table in missing {
            let frame = mem.alloc(0)?;
            self.tables.insert(table, frame);
        }
        Ok(())
    }

    fn set(&mut self, mem: &mut PhysicalMemory, va: VirtualAddress, entry: Entry) {
        if let Some(old) = self.entries.insert(va.page(), entry) {
            mem.release(old.frame());
        }
    }

    /// Backs `size` bytes at `va` with fresh frames, replacing what was there.
    pub fn alloc_region(&mut self, mem: &mut PhysicalMemory, va: VirtualAddress, size: u64, perm: Perm) -> KResult<()> {
        let pages = size.div_ceil(PAGE_SIZE);
        self.reserve(mem, va, pages, pages)?;

        let fill = if perm.contains(Perm::ALLOC_ONE) { 0xff } else { 0 };
        let perm = (perm & Perm::PROT_ALL) | Perm::USER;
        for n in 0..pages {
            let frame = mem.alloc(fill)?;
            self.set(mem, va.offset(n * PAGE_SIZE), Entry::new(frame, perm));
        }
        trace!("allocated {} pages at {:#x}", pages, va.to_inner());
        Ok(())
    }

    /// Entries backing `size` bytes at `va`. Every page must be mapped, and
    /// writable if `writable` is requested.
    pub fn collect(&self, va: VirtualAddress, size: u64, writable: bool) -> KResult<Vec<Entry>> {
        (0..size.div_ceil(PAGE_SIZE))
            .map(|n| {
                let entry = self
                    .entry(va.offset(n * PAGE_SIZE))
                    .ok_or(KernelError::InvalidArgument)?;
                if writable && !entry.is_writable() {
                    return Err(KernelError::InvalidArgument);
                }
                Ok(entry)
            })
            .collect()
    }

    /// Maps the frames of `entries` at consecutive pages from `va`.
    /// Either every page is mapped or nothing changes.
    pub fn install(&mut self, mem: &mut PhysicalMemory, va: VirtualAddress, entries: &[Entry], perm: Perm) -> KResult<()> {
        self.reserve(mem, va, entries.len() as u64, 0)?;

        let perm = (perm & Perm::PROT_ALL) | Perm::USER;
        for (n, src) in entries.iter().enumerate() {
            // retain first, the old mapping may hold the same frame
            mem.retain(src.frame());
            self.set(mem, va.offset(n as u64 * PAGE_SIZE), Entry::new(src.frame(), perm));
        }
        Ok(())
    }

    pub fn unmap_region(&mut self, mem: &mut PhysicalMemory, va: VirtualAddress, size: u64) {
        let pages = va.page()..va.page().saturating_add(size.div_ceil(PAGE_SIZE));
        let gone: Vec<u64> = self
            .entries
            .keys()
            .filter(|page| pages.contains(page))
            .copied()
            .collect();
        for page in gone {
            if let Some(old) = self.entries.remove(&page) {
                mem.release(old.frame());
            }
        }
    }

    /// Drops every mapping and page table.
    pub fn clear(&mut self, mem: &mut PhysicalMemory) {
        for (_, entry) in self.entries.drain() {
            mem.release(entry.frame());
        }
        for (_, frame) in self.tables.drain() {
            mem.release(frame);
        }
    }

    // splits [va, va + len) at page boundaries
    fn chunks(va: VirtualAddress, len: usize) -> impl Iterator<Item = (VirtualAddress, usize, usize)> {
        let mut done = 0;
        core::iter::from_fn(move || {
            if done == len {
                return None;
            }
            let cur = va.offset(done as u64);
            let n = ((PAGE_SIZE - cur.page_offset()) as usize).min(len - done);
            let item = (cur, done, n);
            done += n;
            Some(item)
        })
    }

    pub fn read(&self, mem: &PhysicalMemory, va: VirtualAddress, buf: &mut [u8]) -> KResult<()> {
        for (cur, start, n) in Self::chunks(va, buf.len()) {
            let entry = self.entry(cur).ok_or(KernelError::Fault)?;
            mem.read(entry.frame(), cur.page_offset() as usize, &mut buf[start..start + n]);
        }
        Ok(())
    }

    pub fn write(&self, mem: &mut PhysicalMemory, va: VirtualAddress, bytes: &[u8]) -> KResult<()> {
        // check the whole range before touching memory
        for (cur, _, _) in Self::chunks(va, bytes.len()) {
            match self.entry(cur) {
                Some(entry) if entry.is_writable() => {}
                _ => return Err(KernelError::Fault),
            }
        }
        for (cur, start, n) in Self::chunks(va, bytes.len()) {
            if let Some(entry) = self.entry(cur) {
                mem.write(entry.frame(), cur.page_offset() as usize, &bytes[start..start + n]);
            }
        }
        Ok(())
    }
}
