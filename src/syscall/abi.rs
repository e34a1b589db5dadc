//! Numeric system call interface: a call number plus up to six register
//! arguments. Address arguments at or above [`MAX_USER_ADDRESS`] mean
//! "no region".

use super::Syscall;
use crate::error::{KResult, KernelError};
use crate::mem::paging::entry::Perm;
use crate::mem::{VirtualAddress, MAX_USER_ADDRESS};
use crate::process::{ProcessId, Status};
use crate::sync::SemId;

pub const SYS_CPUTS: u64 = 0;
pub const SYS_GETENVID: u64 = 1;
pub const SYS_ENV_DESTROY: u64 = 2;
pub const SYS_ALLOC_REGION: u64 = 3;
pub const SYS_MAP_REGION: u64 = 4;
pub const SYS_UNMAP_REGION: u64 = 5;
pub const SYS_ENV_SET_STATUS: u64 = 6;
pub const SYS_YIELD: u64 = 7;
pub const SYS_IPC_TRY_SEND: u64 = 8;
pub const SYS_IPC_RECV: u64 = 9;
pub const SYS_GETTIME: u64 = 10;
pub const SYS_SEM_WAIT: u64 = 11;
pub const SYS_SEM_POST: u64 = 12;
pub const SYS_SLEEP: u64 = 13;
pub const SYS_EXIT: u64 = 14;

// status encoding shared with userspace
pub const ENV_FREE: u64 = 0;
pub const ENV_DYING: u64 = 1;
pub const ENV_RUNNABLE: u64 = 2;
pub const ENV_RUNNING: u64 = 3;
pub const ENV_NOT_RUNNABLE: u64 = 4;

fn va(raw: u64) -> VirtualAddress {
    VirtualAddress::new(raw)
}

fn opt_va(raw: u64) -> Option<VirtualAddress> {
    (raw < MAX_USER_ADDRESS).then(|| VirtualAddress::new(raw))
}

fn pid(raw: u64) -> KResult<ProcessId> {
    u32::try_from(raw)
        .map(ProcessId::from_raw)
        .map_err(|_| KernelError::BadTarget)
}

fn perm(raw: u64) -> KResult<Perm> {
    u32::try_from(raw)
        .ok()
        .and_then(Perm::from_bits)
        .ok_or(KernelError::InvalidArgument)
}

fn status(raw: u64) -> KResult<Status> {
    match raw {
        ENV_FREE => Ok(Status::Free),
        ENV_DYING => Ok(Status::Dying),
        ENV_RUNNABLE => Ok(Status::Runnable),
        ENV_RUNNING => Ok(Status::Running),
        ENV_NOT_RUNNABLE => Ok(Status::NotRunnable),
        _ => Err(KernelError::InvalidArgument),
    }
}

pub fn decode(no: u64, a: [u64; 6]) -> KResult<Syscall> {
    let call = match no {
        SYS_CPUTS => Syscall::Cputs {
            va: va(a[0]),
            len: usize::try_from(a[1]).map_err(|_| KernelError::InvalidArgument)?,
        },
        SYS_GETENVID => Syscall::GetEnvId,
        SYS_ENV_DESTROY => Syscall::EnvDestroy(pid(a[0])?),
        SYS_ALLOC_REGION => Syscall::AllocRegion {
            target: pid(a[0])?,
            va: va(a[1]),
            size: a[2],
            perm: perm(a[3])?,
        },
        SYS_MAP_REGION => Syscall::MapRegion {
            src: pid(a[0])?,
            src_va: va(a[1]),
            dst: pid(a[2])?,
            dst_va: va(a[3]),
            size: a[4],
            perm: perm(a[5])?,
        },
        SYS_UNMAP_REGION => Syscall::UnmapRegion {
            target: pid(a[0])?,
            va: va(a[1]),
            size: a[2],
        },
        SYS_ENV_SET_STATUS => Syscall::EnvSetStatus(pid(a[0])?, status(a[1])?),
        SYS_YIELD => Syscall::Yield,
        SYS_IPC_TRY_SEND => Syscall::IpcTrySend {
            target: pid(a[0])?,
            value: a[1] as u32,
            src_va: opt_va(a[2]),
            size: a[3],
            perm: perm(a[4])?,
        },
        SYS_IPC_RECV => Syscall::IpcRecv {
            dst_va: opt_va(a[0]),
            max_size: a[1],
        },
        SYS_GETTIME => Syscall::GetTime,
        SYS_SEM_WAIT => Syscall::SemWait(SemId::from_raw(a[0])),
        SYS_SEM_POST => Syscall::SemPost(SemId::from_raw(a[0])),
        SYS_SLEEP => Syscall::Sleep(a[0]),
        SYS_EXIT => Syscall::Exit,
        _ => return Err(KernelError::NoSys),
    };
    Ok(call)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mem::PAGE_SIZE;

    #[test]
    fn kernel_addresses_mean_no_region() {
        let call = decode(SYS_IPC_TRY_SEND, [0x1001, 7, MAX_USER_ADDRESS, PAGE_SIZE, 0, 0]).unwrap();
        assert_eq!(
            call,
            Syscall::IpcTrySend {
                target: ProcessId::from_raw(0x1001),
                value: 7,
                src_va: None,
                size: PAGE_SIZE,
                perm: Perm::empty(),
            }
        );

        let call = decode(SYS_IPC_RECV, [0x4000, 2 * PAGE_SIZE, 0, 0, 0, 0]).unwrap();
        assert_eq!(
            call,
            Syscall::IpcRecv {
                dst_va: Some(VirtualAddress::new(0x4000)),
                max_size: 2 * PAGE_SIZE,
            }
        );
    }

    #[test]
    fn rejects_unknown_numbers_and_bits() {
        assert_eq!(decode(99, [0; 6]), Err(KernelError::NoSys));
        assert_eq!(
            decode(SYS_IPC_TRY_SEND, [1, 0, 0, PAGE_SIZE, 1 << 40, 0]),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(decode(SYS_ENV_SET_STATUS, [0, 9, 0, 0, 0, 0]), Err(KernelError::InvalidArgument));
        assert_eq!(decode(SYS_ENV_DESTROY, [u64::MAX, 0, 0, 0, 0, 0]), Err(KernelError::BadTarget));
    }

    #[test]
    fn semaphore_handles_survive_the_trip() {
        let mut sems = crate::sync::SemaphoreTable::new();
        let first = sems.create(0);
        sems.destroy(first).unwrap();
        let sem = sems.create(0);
        assert_eq!(decode(SYS_SEM_POST, [sem.to_raw(), 0, 0, 0, 0, 0]), Ok(Syscall::SemPost(sem)));
    }
}
