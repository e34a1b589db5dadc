use alloc::string::String;
use alloc::vec;
use log::info;

use super::Completion;
use crate::error::{KResult, KernelError};
use crate::kernel::Kernel;
use crate::mem::{VirtualAddress, MAX_USER_ADDRESS};
use crate::process::{ProcessId, Status};
use crate::timers::Clock;

impl Kernel {
    // unreadable memory kills the caller
    pub(crate) fn sys_cputs(&mut self, va: VirtualAddress, len: usize) -> KResult<()> {
        let cur = self.current_slot();
        let in_user = va
            .to_inner()
            .checked_add(len as u64)
            .map_or(false, |end| end <= MAX_USER_ADDRESS);

        // check the range before sizing a buffer after it
        let space = &self.processes.get(cur).address_space;
        let res = if in_user && space.is_mapped(va, len) {
            let mut buf = vec![0; len];
            space.read(&self.memory, va, &mut buf).map(|()| buf)
        } else {
            Err(KernelError::Fault)
        };
        let buf = match res {
            Ok(buf) => buf,
            Err(err) => {
                crate::kprintln!(
                    "[{}] user_mem_check assertion failure for va {:#x}",
                    self.current_id(),
                    va.to_inner()
                );
                self.env_destroy(cur);
                return Err(err);
            }
        };

        crate::kprint!("{}", String::from_utf8_lossy(&buf));
        Ok(())
    }

    pub(crate) fn sys_getenvid(&self) -> i64 {
        self.current_id().to_inner() as i64
    }

    pub(crate) fn sys_env_destroy(&mut self, id: ProcessId) -> KResult<()> {
        let slot = self.envid2env(id, true)?;
        if cfg!(feature = "trace_envs") {
            let target = self.processes.get(slot).id;
            if slot == self.current_slot() {
                info!("[{}] exiting gracefully", target);
            } else {
                info!("[{}] destroying {}", self.current_id(), target);
            }
        }
        self.env_destroy(slot);
        Ok(())
    }

    pub(crate) fn sys_env_set_status(&mut self, id: ProcessId, status: Status) -> KResult<()> {
        if !matches!(status, Status::Runnable | Status::NotRunnable) {
            return Err(KernelError::InvalidArgument);
        }
        let slot = self.envid2env(id, true)?;
        let proc = self.processes.get_mut(slot);
        // an explicit status change ends any sleep in progress
        proc.wake_at = None;
        proc.status = status;
        Ok(())
    }

    pub(crate) fn sys_yield(&mut self) -> Completion {
        self.scheduler.regs.rax = 0;
        self.sched_yield();
        Completion::Yielded
    }

    pub(crate) fn sys_sleep(&mut self, ms: u64) -> Completion {
        let cur = self.current_slot();
        let deadline = self.delays.add(self.processes.get(cur).id, ms);
        let proc = self.processes.get_mut(cur);
        proc.wake_at = Some(deadline);
        proc.status = Status::NotRunnable;
        self.scheduler.regs.rax = 0;
        self.sched_yield();
        Completion::Yielded
    }

    pub(crate) fn sys_gettime(&self) -> u64 {
        self.clock.current_ms()
    }
}
