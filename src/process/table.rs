use alloc::vec::Vec;

use super::pid::ProcessId;
use super::process::{IpcState, Process, ProcessType, Status, TrapFrame};
use crate::error::{KResult, KernelError};

/// Fixed-size arena of process control blocks, indexed by slot.
#[derive(Debug)]
pub struct ProcessTable {
    procs: Vec<Process>,
}

impl ProcessTable {
    pub fn new(nenv: usize) -> Self {
        Self {
            procs: (0..nenv).map(Process::free).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    /// Claims the lowest free slot for a new runnable process.
    pub(crate) fn alloc(&mut self, parent_id: ProcessId, kind: ProcessType) -> KResult<usize> {
        let slot = self
            .procs
            .iter()
            .position(|p| p.status == Status::Free)
            .ok_or(KernelError::NoFreeProcess)?;

        let proc = &mut self.procs[slot];
        debug_assert_eq!(proc.address_space.mapped_pages(), 0);
        proc.id = proc.id.next_generation(slot);
        proc.parent_id = parent_id;
        proc.status = Status::Runnable;
        proc.kind = kind;
        proc.sem = None;
        proc.wake_at = None;
        proc.ipc = IpcState::default();
        proc.frame = TrapFrame::default();
        proc.runs = 0;
        Ok(slot)
    }

    // the id stays behind so the next occupant gets a fresh generation
    pub(crate) fn release(&mut self, slot: usize) {
        let proc = &mut self.procs[slot];
        proc.status = Status::Free;
        proc.sem = None;
        proc.wake_at = None;
        proc.ipc = IpcState::default();
    }

    /// Slot of a live process. Stale or malformed ids resolve to nothing.
    pub fn resolve(&self, id: ProcessId) -> Option<usize> {
        self.procs
            .get(id.slot())
            .filter(|p| p.id == id && p.status != Status::Free)
            .map(|_| id.slot())
    }

    pub fn lookup(&self, id: ProcessId) -> Option<&Process> {
        self.resolve(id).map(|slot| &self.procs[slot])
    }

    pub fn get(&self, slot: usize) -> &Process {
        &self.procs[slot]
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> &mut Process {
        &mut self.procs[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.procs.iter()
    }

    pub fn live(&self) -> usize {
        self.procs.iter().filter(|p| p.status != Status::Free).count()
    }
}
