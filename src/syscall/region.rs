use crate::error::{KResult, KernelError};
use crate::kernel::Kernel;
use crate::mem::paging::entry::Perm;
use crate::mem::{VirtualAddress, MAX_USER_ADDRESS};
use crate::process::ProcessId;

// page aligned and [va, va + size) inside user space
pub(crate) fn check_user_range(va: VirtualAddress, size: u64) -> KResult<()> {
    let end = va.to_inner().checked_add(size);
    if !va.is_page_aligned() || end.map_or(true, |end| end > MAX_USER_ADDRESS) {
        return Err(KernelError::InvalidArgument);
    }
    Ok(())
}

impl Kernel {
    pub(crate) fn sys_alloc_region(&mut self, target: ProcessId, va: VirtualAddress, size: u64, perm: Perm) -> KResult<()> {
        check_user_range(va, size)?;
        if !perm.is_allocatable() {
            return Err(KernelError::InvalidArgument);
        }
        let slot = self.envid2env(target, true)?;
        let proc = self.processes.get_mut(slot);
        proc.address_space.alloc_region(&mut self.memory, va, size, perm)
    }

    pub(crate) fn sys_map_region(
        &mut self,
        src: ProcessId,
        src_va: VirtualAddress,
        dst: ProcessId,
        dst_va: VirtualAddress,
        size: u64,
        perm: Perm,
    ) -> KResult<()> {
        check_user_range(src_va, size)?;
        check_user_range(dst_va, size)?;
        if !perm.is_mappable() {
            return Err(KernelError::InvalidArgument);
        }
        let src_slot = self.envid2env(src, true)?;
        let dst_slot = self.envid2env(dst, true)?;
        self.map_between(src_slot, src_va, dst_slot, dst_va, size, perm)
    }

    // unmapping holes is not an error
    pub(crate) fn sys_unmap_region(&mut self, target: ProcessId, va: VirtualAddress, size: u64) -> KResult<()> {
        check_user_range(va, size)?;
        let slot = self.envid2env(target, true)?;
        let proc = self.processes.get_mut(slot);
        proc.address_space.unmap_region(&mut self.memory, va, size);
        Ok(())
    }

    /// Shares the frames behind `size` bytes at `src_va` of one process with
    /// another at `dst_va`. Fails without side effects.
    pub(crate) fn map_between(
        &mut self,
        src_slot: usize,
        src_va: VirtualAddress,
        dst_slot: usize,
        dst_va: VirtualAddress,
        size: u64,
        perm: Perm,
    ) -> KResult<()> {
        let entries = self
            .processes
            .get(src_slot)
            .address_space
            .collect(src_va, size, perm.contains(Perm::W))?;
        let proc = self.processes.get_mut(dst_slot);
        proc.address_space.install(&mut self.memory, dst_va, &entries, perm)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::RunOutcome;
    use crate::mem::PAGE_SIZE;
    use crate::process::ProcessType;
    use crate::syscall::Syscall;
    use crate::testing::{kernel, script};

    const VA: VirtualAddress = VirtualAddress::new(0x20_0000);

    #[test]
    fn user_range_checks() {
        assert!(check_user_range(VA, PAGE_SIZE).is_ok());
        assert!(check_user_range(VirtualAddress::new(MAX_USER_ADDRESS - PAGE_SIZE), PAGE_SIZE).is_ok());
        assert_eq!(check_user_range(VA.offset(1), PAGE_SIZE), Err(KernelError::InvalidArgument));
        assert_eq!(
            check_user_range(VirtualAddress::new(MAX_USER_ADDRESS), PAGE_SIZE),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(check_user_range(VA, u64::MAX), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn alloc_map_unmap_between_parent_and_child() {
        let mut k = kernel();
        let holder = alloc::sync::Arc::new(spin::Mutex::new(alloc::vec::Vec::new()));
        let calls = holder.clone();
        let parent = k
            .spawn(ProcessType::User, move |_: &mut crate::process::TaskContext<'_>| {
                calls.lock().pop().unwrap_or(Syscall::Exit)
            })
            .unwrap();
        let (child_task, _) = script(core::iter::repeat(Syscall::Yield).take(8));
        let child = k.spawn_child(parent, ProcessType::User, child_task).unwrap();

        let dst = VirtualAddress::new(0x80_0000);
        // popped from the back
        *holder.lock() = alloc::vec![
            Syscall::UnmapRegion { target: child, va: dst, size: PAGE_SIZE },
            Syscall::MapRegion { src: ProcessId::CURRENT, src_va: VA, dst: child, dst_va: dst, size: PAGE_SIZE, perm: Perm::R },
            Syscall::AllocRegion { target: ProcessId::CURRENT, va: VA, size: PAGE_SIZE, perm: Perm::RW },
        ];

        // alloc + map happen on the parent's first two resumptions
        k.step();
        k.step();
        let (parent_pa, _) = k.translate(parent, VA).unwrap();
        let (child_pa, child_perm) = k.translate(child, dst).unwrap();
        assert_eq!(parent_pa, child_pa);
        assert_eq!(child_perm, Perm::R | Perm::USER);

        k.step();
        assert!(k.translate(child, dst).is_none());
        assert_eq!(k.run(50), RunOutcome::Idle);
    }

    #[test]
    fn region_calls_validate_arguments() {
        let mut k = kernel();
        let (stranger_task, _) = script([Syscall::Yield]);
        let stranger = k.spawn(ProcessType::User, stranger_task).unwrap();
        let (task, trace) = script([
            Syscall::AllocRegion { target: ProcessId::CURRENT, va: VA.offset(8), size: PAGE_SIZE, perm: Perm::RW },
            Syscall::AllocRegion {
                target: ProcessId::CURRENT,
                va: VA,
                size: PAGE_SIZE,
                perm: Perm::RW | Perm::USER,
            },
            Syscall::AllocRegion { target: stranger, va: VA, size: PAGE_SIZE, perm: Perm::RW },
            Syscall::AllocRegion { target: ProcessId::CURRENT, va: VA, size: PAGE_SIZE, perm: Perm::R },
            // writable mapping of a read-only page
            Syscall::MapRegion {
                src: ProcessId::CURRENT,
                src_va: VA,
                dst: ProcessId::CURRENT,
                dst_va: VA.offset(PAGE_SIZE),
                size: PAGE_SIZE,
                perm: Perm::RW,
            },
            Syscall::MapRegion {
                src: ProcessId::CURRENT,
                src_va: VA,
                dst: ProcessId::CURRENT,
                dst_va: VA.offset(PAGE_SIZE),
                size: PAGE_SIZE,
                perm: Perm::R | Perm::ALLOC_ZERO,
            },
            Syscall::UnmapRegion {
                target: ProcessId::CURRENT,
                va: VA.offset(PAGE_SIZE),
                size: 4 * PAGE_SIZE,
            },
        ]);
        k.spawn(ProcessType::User, task).unwrap();
        k.run(50);

        assert_eq!(
            trace.errors(),
            [
                Some(KernelError::InvalidArgument),
                Some(KernelError::InvalidArgument),
                Some(KernelError::BadTarget),
                None,
                Some(KernelError::InvalidArgument),
                Some(KernelError::InvalidArgument),
                None,
            ]
        );
    }

    #[test]
    fn alloc_out_of_memory() {
        let mut k = Kernel::new(crate::config::KernelConfig::default().with_nenv(4).with_phys_frames(4)).unwrap();
        let (task, trace) = script([
            Syscall::AllocRegion { target: ProcessId::CURRENT, va: VA, size: 8 * PAGE_SIZE, perm: Perm::RW },
            Syscall::AllocRegion { target: ProcessId::CURRENT, va: VA, size: 2 * PAGE_SIZE, perm: Perm::RW },
        ]);
        let id = k.spawn(ProcessType::User, task).unwrap();
        k.step();
        k.step();

        assert_eq!(trace.errors(), [Some(KernelError::OutOfMemory)]);
        assert_eq!(k.process(id).unwrap().address_space().mapped_pages(), 2);
        assert_eq!(k.free_frames(), 0);
    }
}
