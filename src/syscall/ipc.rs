use log::{trace, warn};

use super::region::check_user_range;
use super::Completion;
use crate::error::{KResult, KernelError};
use crate::kernel::Kernel;
use crate::mem::paging::entry::Perm;
use crate::mem::{align_up, VirtualAddress, PAGE_SIZE};
use crate::process::{ProcessId, Status};
use crate::stats::Stats;

impl Kernel {
    /// Delivers `value` (and optionally a region) from `from` to a process
    /// blocked in receive, and makes the receiver runnable. Never blocks:
    /// a target that isn't receiving is reported as `NotReceiving`.
    ///
    /// The mapped length is `min(size, receiver max)` rounded up to whole
    /// pages. A receiver that asked for no region gets none, and sees
    /// `perm == 0`. On error the receiver is untouched.
    pub fn ipc_try_send(
        &mut self,
        from: ProcessId,
        target: ProcessId,
        value: u32,
        src_va: Option<VirtualAddress>,
        size: u64,
        perm: Perm,
    ) -> KResult<()> {
        let from_slot = self.processes.resolve(from).ok_or(KernelError::BadTarget)?;
        let target_slot = if target.is_current() {
            from_slot
        } else {
            self.processes.resolve(target).ok_or(KernelError::BadTarget)?
        };

        let receiver = self.processes.get(target_slot).ipc;
        if !receiver.recving {
            return Err(KernelError::NotReceiving);
        }

        let mut perm = perm;
        let mut transferred = None;
        match src_va {
            Some(src_va) => {
                if size == 0 || !perm.is_mappable() {
                    return Err(KernelError::InvalidArgument);
                }
                check_user_range(src_va, size)?;
                match receiver.dstva {
                    Some(dst_va) => {
                        let len = align_up(size.min(receiver.maxsz), PAGE_SIZE);
                        self.map_between(from_slot, src_va, target_slot, dst_va, len, perm)?;
                        transferred = Some(len);
                    }
                    None => perm = Perm::empty(),
                }
            }
            None if !perm.is_empty() => {
                warn!("ipc_try_send: no region to map, but perm {:?} not empty", perm);
                perm = Perm::empty();
            }
            None => {}
        }

        let proc = self.processes.get_mut(target_slot);
        proc.ipc.recving = false;
        proc.ipc.value = value;
        proc.ipc.from = from;
        proc.ipc.perm = perm;
        if let Some(len) = transferred {
            proc.ipc.maxsz = len;
        }
        proc.status = Status::Runnable;

        Stats::bump(&self.stats.ipc_sends);
        trace!("[{}] ipc {:#x} -> {}", from, value, proc.id);
        Ok(())
    }

    pub(crate) fn sys_ipc_try_send(
        &mut self,
        target: ProcessId,
        value: u32,
        src_va: Option<VirtualAddress>,
        size: u64,
        perm: Perm,
    ) -> KResult<()> {
        let from = self.current_id();
        self.ipc_try_send(from, target, value, src_va, size, perm)
    }

    pub(crate) fn sys_ipc_recv(&mut self, dst_va: Option<VirtualAddress>, max_size: u64) -> KResult<Completion> {
        if let Some(dst_va) = dst_va {
            if max_size == 0 || max_size % PAGE_SIZE != 0 {
                return Err(KernelError::InvalidArgument);
            }
            check_user_range(dst_va, max_size)?;
        }

        let cur = self.current_slot();
        let proc = self.processes.get_mut(cur);
        proc.ipc.recving = true;
        proc.ipc.dstva = dst_va;
        proc.ipc.maxsz = if dst_va.is_some() { max_size } else { 0 };
        proc.status = Status::NotRunnable;

        // seen by the receiver once a sender completes the rendezvous
        self.scheduler.regs.rax = 0;
        Stats::bump(&self.stats.ipc_recvs);
        self.sched_yield();
        Ok(Completion::Yielded)
    }
}
