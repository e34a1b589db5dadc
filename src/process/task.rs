use alloc::vec;
use alloc::vec::Vec;

use super::pid::ProcessId;
use super::process::IpcInfo;
use crate::error::{self, KResult};
use crate::mem::paging::AddressSpace;
use crate::mem::physical::PhysicalMemory;
use crate::mem::VirtualAddress;
use crate::syscall::Syscall;

/// Body of a process. The kernel resumes it whenever the process is put back
/// on the cpu; it runs until it needs the kernel and returns that request.
/// Blocking requests resume only once the process is picked again, and the
/// context then carries the result of the request.
pub trait Task: Send {
    fn resume(&mut self, cx: &mut TaskContext<'_>) -> Syscall;
}

impl<F> Task for F
where
    F: FnMut(&mut TaskContext<'_>) -> Syscall + Send,
{
    fn resume(&mut self, cx: &mut TaskContext<'_>) -> Syscall {
        self(cx)
    }
}

/// The idle process: gives the cpu away forever.
#[derive(Debug, Default)]
pub struct IdleTask;

impl Task for IdleTask {
    fn resume(&mut self, _cx: &mut TaskContext<'_>) -> Syscall {
        Syscall::Yield
    }
}

/// View of the process a task gets while it runs.
pub struct TaskContext<'a> {
    id: ProcessId,
    ret: i64,
    ipc: IpcInfo,
    now_ms: u64,
    space: &'a AddressSpace,
    memory: &'a mut PhysicalMemory,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        id: ProcessId,
        ret: i64,
        ipc: IpcInfo,
        now_ms: u64,
        space: &'a AddressSpace,
        memory: &'a mut PhysicalMemory,
    ) -> Self {
        Self {
            id,
            ret,
            ipc,
            now_ms,
            space,
            memory,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Raw return register of the last request.
    pub fn ret(&self) -> i64 {
        self.ret
    }

    pub fn result(&self) -> KResult<i64> {
        error::from_reg(self.ret)
    }

    /// Outcome of the last completed receive.
    pub fn ipc(&self) -> IpcInfo {
        self.ipc
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn read(&self, va: VirtualAddress, buf: &mut [u8]) -> KResult<()> {
        self.space.read(&*self.memory, va, buf)
    }

    pub fn read_vec(&self, va: VirtualAddress, len: usize) -> KResult<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read(va, &mut buf)?;
        Ok(buf)
    }

    pub fn write(&mut self, va: VirtualAddress, bytes: &[u8]) -> KResult<()> {
        self.space.write(self.memory, va, bytes)
    }
}
