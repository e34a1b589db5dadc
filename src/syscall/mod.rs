pub mod abi;
mod env;
mod ipc;
mod region;
mod sem;

use crate::kernel::Kernel;
use crate::mem::paging::entry::Perm;
use crate::mem::VirtualAddress;
use crate::process::{ProcessId, Status};
use crate::stats::Stats;
use crate::sync::SemId;

/// A request a task hands to the kernel when it gives up the cpu.
/// Target ids of [`ProcessId::CURRENT`] mean the caller itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Syscall {
    /// Print `len` bytes of the caller's memory to the console.
    Cputs { va: VirtualAddress, len: usize },
    GetEnvId,
    EnvDestroy(ProcessId),
    Exit,
    Yield,
    EnvSetStatus(ProcessId, Status),
    AllocRegion {
        target: ProcessId,
        va: VirtualAddress,
        size: u64,
        perm: Perm,
    },
    MapRegion {
        src: ProcessId,
        src_va: VirtualAddress,
        dst: ProcessId,
        dst_va: VirtualAddress,
        size: u64,
        perm: Perm,
    },
    UnmapRegion {
        target: ProcessId,
        va: VirtualAddress,
        size: u64,
    },
    IpcTrySend {
        target: ProcessId,
        value: u32,
        src_va: Option<VirtualAddress>,
        size: u64,
        perm: Perm,
    },
    /// Block until a message arrives; `dst_va` asks for a region of up to
    /// `max_size` bytes to be mapped there.
    IpcRecv {
        dst_va: Option<VirtualAddress>,
        max_size: u64,
    },
    SemWait(SemId),
    SemPost(SemId),
    Sleep(u64),
    GetTime,
    /// Numbered call, decoded with [`abi::decode`].
    Raw { no: u64, args: [u64; 6] },
}

// how a syscall handler left the cpu
pub(crate) enum Completion {
    // caller keeps running with this return value
    Return(i64),
    // caller blocked or gave the cpu away; its return value is already saved
    Yielded,
}

impl Kernel {
    pub(crate) fn dispatch(&mut self, call: Syscall) {
        if let Syscall::Raw { no, args } = call {
            match abi::decode(no, args) {
                Ok(call) => return self.dispatch(call),
                Err(err) => {
                    self.scheduler.regs.rax = err.errno();
                    return;
                }
            }
        }
        Stats::bump(&self.stats.syscalls);

        let ret = |res: crate::error::KResult<i64>| res.map(Completion::Return);
        let res = match call {
            Syscall::Cputs { va, len } => ret(self.sys_cputs(va, len).map(|()| 0)),
            Syscall::GetEnvId => Ok(Completion::Return(self.sys_getenvid())),
            Syscall::EnvDestroy(id) => ret(self.sys_env_destroy(id).map(|()| 0)),
            Syscall::Exit => ret(self.sys_env_destroy(ProcessId::CURRENT).map(|()| 0)),
            Syscall::Yield => Ok(self.sys_yield()),
            Syscall::EnvSetStatus(id, status) => ret(self.sys_env_set_status(id, status).map(|()| 0)),
            Syscall::AllocRegion { target, va, size, perm } => {
                ret(self.sys_alloc_region(target, va, size, perm).map(|()| 0))
            }
            Syscall::MapRegion {
                src,
                src_va,
                dst,
                dst_va,
                size,
                perm,
            } => ret(self.sys_map_region(src, src_va, dst, dst_va, size, perm).map(|()| 0)),
            Syscall::UnmapRegion { target, va, size } => ret(self.sys_unmap_region(target, va, size).map(|()| 0)),
            Syscall::IpcTrySend {
                target,
                value,
                src_va,
                size,
                perm,
            } => ret(self.sys_ipc_try_send(target, value, src_va, size, perm).map(|()| 0)),
            Syscall::IpcRecv { dst_va, max_size } => self.sys_ipc_recv(dst_va, max_size),
            Syscall::SemWait(sem) => self.sys_sem_wait(sem),
            Syscall::SemPost(sem) => ret(self.sys_sem_post(sem).map(|()| 0)),
            Syscall::Sleep(ms) => Ok(self.sys_sleep(ms)),
            Syscall::GetTime => Ok(Completion::Return(self.sys_gettime() as i64)),
            Syscall::Raw { .. } => unreachable!(),
        };

        match res {
            Ok(Completion::Return(val)) => self.scheduler.regs.rax = val,
            Ok(Completion::Yielded) => {}
            Err(err) => self.scheduler.regs.rax = err.errno(),
        }
    }
}
