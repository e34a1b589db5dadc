use log::trace;

use super::Completion;
use crate::error::{KResult, KernelError};
use crate::kernel::Kernel;
use crate::stats::Stats;
use crate::sync::SemId;

impl Kernel {
    // takes a unit right away if there is one, otherwise parks the caller on
    // the semaphore and gives the cpu away
    pub(crate) fn sys_sem_wait(&mut self, sem: SemId) -> KResult<Completion> {
        let acquired = self.sems.get(sem).ok_or(KernelError::InvalidArgument)?.try_acquire();
        Stats::bump(&self.stats.sem_waits);
        if acquired {
            return Ok(Completion::Return(0));
        }

        let cur = self.current_slot();
        self.processes.get_mut(cur).sem = Some(sem);
        trace!("[{}] waiting on {:?}", self.current_id(), sem);
        self.scheduler.regs.rax = 0;
        self.sched_yield();
        Ok(Completion::Yielded)
    }

    pub(crate) fn sys_sem_post(&mut self, sem: SemId) -> KResult<()> {
        self.sem_post(sem)
    }
}

#[cfg(test)]
mod test {
    use crate::error::KernelError;
    use crate::kernel::{RunOutcome, Step};
    use crate::process::{ProcessType, Status};
    use crate::sync::SemId;
    use crate::syscall::Syscall;
    use crate::testing::{kernel, script};

    #[test]
    fn wait_on_available_unit_does_not_block() {
        let mut k = kernel();
        let sem = k.create_semaphore(2);
        let (task, trace) = script([Syscall::SemWait(sem), Syscall::SemWait(sem), Syscall::GetEnvId]);
        let id = k.spawn(ProcessType::User, task).unwrap();

        assert_eq!(k.step(), Step::Ran(id));
        assert_eq!(k.current(), Some(id));
        assert_eq!(k.run(10), RunOutcome::Idle);
        assert_eq!(trace.rets(), [0, 0, id.to_inner() as i64]);
        assert_eq!(k.sem_value(sem), Some(0));
    }

    #[test]
    fn post_wakes_waiter_and_consumes_unit() {
        let mut k = kernel();
        let sem = k.create_semaphore(0);
        let (waiter_task, waiter_trace) = script([Syscall::SemWait(sem)]);
        let waiter = k.spawn(ProcessType::User, waiter_task).unwrap();

        k.step();
        assert_eq!(k.process(waiter).unwrap().sem(), Some(sem));
        assert_eq!(k.current(), Some(k.idle()));
        assert_eq!(k.run(10), RunOutcome::Idle);
        assert!(waiter_trace.rets().is_empty());

        k.sem_post(sem).unwrap();
        assert_eq!(k.sem_value(sem), Some(1));
        assert_eq!(k.pick_next(), Some(waiter));

        k.step();
        // the idle step switched to the waiter, which took the unit
        assert_eq!(k.sem_value(sem), Some(0));
        assert_eq!(k.process(waiter).unwrap().sem(), None);
        assert_eq!(k.run(10), RunOutcome::Idle);
        assert_eq!(waiter_trace.rets(), [0]);
    }

    #[test]
    fn gated_waiter_is_skipped_while_others_run() {
        let mut k = kernel();
        let sem = k.create_semaphore(0);
        let (waiter_task, waiter_trace) = script([Syscall::SemWait(sem), Syscall::GetTime]);
        let waiter = k.spawn(ProcessType::User, waiter_task).unwrap();
        let (busy_task, _) = script([Syscall::Yield, Syscall::Yield, Syscall::SemPost(sem), Syscall::Yield]);
        let busy = k.spawn(ProcessType::User, busy_task).unwrap();

        k.step();
        assert_eq!(k.current(), Some(busy));
        assert_eq!(k.process(waiter).unwrap().status(), Status::Runnable);

        // busy keeps getting the cpu back while the waiter is gated
        k.step();
        assert_eq!(k.current(), Some(busy));
        k.step();
        assert_eq!(k.current(), Some(busy));

        // the post lets the waiter in at busy's next yield
        k.step();
        assert_eq!(k.sem_value(sem), Some(1));
        k.step();
        assert_eq!(k.current(), Some(waiter));
        assert_eq!(k.sem_value(sem), Some(0));

        assert_eq!(k.run(20), RunOutcome::Idle);
        assert_eq!(waiter_trace.rets().len(), 2);
        assert_eq!(k.stats().sem_posts, 1);
        assert_eq!(k.stats().sem_waits, 1);
    }

    #[test]
    fn invalid_handles_are_rejected() {
        let mut k = kernel();
        let gone = k.create_semaphore(0);
        k.destroy_semaphore(gone).unwrap();
        let (task, trace) = script([
            Syscall::SemWait(gone),
            Syscall::SemPost(gone),
            Syscall::SemWait(SemId::from_raw(0xffff)),
        ]);
        k.spawn(ProcessType::User, task).unwrap();

        assert_eq!(k.run(10), RunOutcome::Idle);
        assert_eq!(trace.errors(), [Some(KernelError::InvalidArgument); 3]);
    }

    #[test]
    fn destroying_semaphore_releases_waiter() {
        let mut k = kernel();
        let sem = k.create_semaphore(0);
        let (task, trace) = script([Syscall::SemWait(sem)]);
        let id = k.spawn(ProcessType::User, task).unwrap();

        assert_eq!(k.run(10), RunOutcome::Idle);
        assert_eq!(k.pick_next(), Some(k.idle()));

        k.destroy_semaphore(sem).unwrap();
        assert_eq!(k.process(id).unwrap().sem(), None);
        assert_eq!(k.run(10), RunOutcome::Idle);
        assert_eq!(trace.rets(), [0]);
        assert!(k.process(id).is_none());
    }

    #[test]
    fn interrupt_handler_post_wakes_waiter() {
        let mut k = kernel();
        let sem = k.create_semaphore(0);
        k.register_irq(5, move |cx: &mut crate::interrupts::IrqContext<'_>| {
            if cx.sem_value(sem) == Some(0) {
                cx.post(sem);
            }
        })
        .unwrap();
        let (task, trace) = script([Syscall::SemWait(sem), Syscall::SemWait(sem)]);
        let id = k.spawn(ProcessType::User, task).unwrap();

        assert_eq!(k.run(10), RunOutcome::Idle);
        k.raise_irq(5);
        // a second interrupt before the waiter ran doesn't stack up
        k.raise_irq(5);
        assert_eq!(k.sem_value(sem), Some(1));

        assert_eq!(k.run(10), RunOutcome::Idle);
        assert_eq!(trace.rets(), [0]);
        assert_eq!(k.process(id).unwrap().sem(), Some(sem));

        k.raise_irq(5);
        assert_eq!(k.run(10), RunOutcome::Idle);
        assert_eq!(trace.rets(), [0, 0]);
        assert!(k.process(id).is_none());
        assert_eq!(k.stats().irqs, 3);
    }
}
