use super::pid::ProcessId;
use crate::mem::paging::{entry::Perm, AddressSpace};
use crate::mem::VirtualAddress;
use crate::sync::SemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Free,
    NotRunnable,
    Runnable,
    Running,
    // destroyed while on the cpu, reclaimed after the next switch
    Dying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessType {
    User,
    Idle,
    Fs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcState {
    pub(crate) recving: bool,
    // None: the receiver does not want a region
    pub(crate) dstva: Option<VirtualAddress>,
    // max size on receive, transferred size once a region arrived
    pub(crate) maxsz: u64,
    pub(crate) from: ProcessId,
    pub(crate) value: u32,
    // 0 unless a region was transferred
    pub(crate) perm: Perm,
}

impl Default for IpcState {
    fn default() -> Self {
        Self {
            recving: false,
            dstva: None,
            maxsz: 0,
            from: ProcessId::CURRENT,
            value: 0,
            perm: Perm::empty(),
        }
    }
}

/// What the receiver sees after a completed rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcInfo {
    pub from: ProcessId,
    pub value: u32,
    pub perm: Perm,
    pub size: u64,
}

pub const FL_IF: u64 = 1 << 9;

/// Registers saved while the process is off the cpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    // syscall return value
    pub rax: i64,
    pub rflags: u64,
}

impl Default for TrapFrame {
    fn default() -> Self {
        // user code always runs with interrupts on
        Self { rax: 0, rflags: FL_IF }
    }
}

#[derive(Debug)]
pub struct Process {
    pub(crate) id: ProcessId,
    pub(crate) parent_id: ProcessId,
    pub(crate) status: Status,
    pub(crate) kind: ProcessType,
    // semaphore this process is parked on, if any
    pub(crate) sem: Option<SemId>,
    // deadline of the sleep this process is in
    pub(crate) wake_at: Option<u64>,
    pub(crate) ipc: IpcState,
    pub(crate) frame: TrapFrame,
    pub(crate) address_space: AddressSpace,
    pub(crate) runs: u64,
}

impl Process {
    pub(crate) fn free(slot: usize) -> Self {
        Self {
            // generation 0: the first occupant gets generation 1
            id: ProcessId::new(0, slot),
            parent_id: ProcessId::CURRENT,
            status: Status::Free,
            kind: ProcessType::User,
            sem: None,
            wake_at: None,
            ipc: IpcState::default(),
            frame: TrapFrame::default(),
            address_space: AddressSpace::new(),
            runs: 0,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn parent_id(&self) -> ProcessId {
        self.parent_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn kind(&self) -> ProcessType {
        self.kind
    }

    pub fn sem(&self) -> Option<SemId> {
        self.sem
    }

    pub fn is_recving(&self) -> bool {
        self.ipc.recving
    }

    pub fn ipc_info(&self) -> IpcInfo {
        IpcInfo {
            from: self.ipc.from,
            value: self.ipc.value,
            perm: self.ipc.perm,
            size: self.ipc.maxsz,
        }
    }

    pub fn frame(&self) -> &TrapFrame {
        &self.frame
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.address_space
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn is_idle(&self) -> bool {
        self.kind == ProcessType::Idle
    }
}
