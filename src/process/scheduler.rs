use log::trace;

use super::process::{Process, Status, TrapFrame};
use super::table::ProcessTable;
use crate::stats::Stats;
use crate::sync::SemaphoreTable;

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    // slot of the process on the cpu
    pub(crate) cur_proc: Option<usize>,
    // register file of the cpu, saved into the PCB on a switch
    pub(crate) regs: TrapFrame,
    // set by the timer, honoured at the next syscall boundary
    pub(crate) need_resched: bool,
}

// not parked on a semaphore that is still at zero
fn ungated(proc: &Process, sems: &SemaphoreTable) -> bool {
    proc.sem.map_or(true, |sem| !sems.is_gated(sem))
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Round robin over the table starting after the current slot. The
    /// current process is picked again only when nothing else can run, and
    /// the idle process only when the current one can't continue either.
    pub(crate) fn pick_next(&self, table: &ProcessTable, sems: &SemaphoreTable) -> Option<usize> {
        let nenv = table.len();
        let start = self.cur_proc.map_or(0, |cur| cur + 1);

        let next = (0..nenv)
            .map(|n| (start + n) % nenv)
            .filter(|slot| Some(*slot) != self.cur_proc)
            .find(|slot| {
                let proc = table.get(*slot);
                proc.status == Status::Runnable && !proc.is_idle() && ungated(proc, sems)
            });
        if next.is_some() {
            return next;
        }

        if let Some(cur) = self.cur_proc {
            let proc = table.get(cur);
            if proc.status == Status::Running && !proc.is_idle() && ungated(proc, sems) {
                return Some(cur);
            }
        }

        table
            .iter()
            .position(|p| p.is_idle() && matches!(p.status, Status::Runnable | Status::Running))
    }

    /// Picks the next process and puts it on the cpu. A process woken from a
    /// semaphore takes its unit here and forgets the semaphore.
    pub(crate) fn sched_yield(&mut self, table: &mut ProcessTable, sems: &SemaphoreTable, stats: &Stats) -> usize {
        let next = match self.pick_next(table, sems) {
            Some(next) => next,
            None => panic!("sched_yield: nothing to run and no idle process"),
        };

        if let Some(sem) = table.get_mut(next).sem.take() {
            sems.consume(sem);
        }

        self.env_run(table, next, stats);
        next
    }

    fn env_run(&mut self, table: &mut ProcessTable, next: usize, stats: &Stats) {
        self.need_resched = false;

        if let Some(cur) = self.cur_proc.filter(|cur| *cur != next) {
            let old = table.get_mut(cur);
            if old.status == Status::Running {
                old.status = Status::Runnable;
            }
            if old.status != Status::Free {
                old.frame = self.regs;
            }
            let old_id = old.id;
            trace!("changing {} --> {}", old_id, table.get(next).id);
            self.regs = table.get(next).frame;
            self.cur_proc = Some(next);
            Stats::bump(&stats.ctx_switches);
        } else if self.cur_proc.is_none() {
            self.regs = table.get(next).frame;
            self.cur_proc = Some(next);
            Stats::bump(&stats.ctx_switches);
        }

        let new = table.get_mut(next);
        new.status = Status::Running;
        new.runs += 1;
    }
}
