use alloc::{boxed::Box, sync::Arc, vec::Vec};
use hashbrown::HashMap;
use log::{info, trace, warn};

use crate::config::KernelConfig;
use crate::error::{KResult, KernelError};
use crate::interrupts::{self, Cpu, IrqContext, IrqHandler, IrqTable, IRQ_TIMER};
use crate::logging;
use crate::mem::paging::entry::Perm;
use crate::mem::physical::PhysicalMemory;
use crate::mem::{PhysicalAddress, VirtualAddress};
use crate::process::delay::Delays;
use crate::process::scheduler::Scheduler;
use crate::process::{IdleTask, Process, ProcessId, ProcessTable, ProcessType, Status, Task, TaskContext};
use crate::stats::{Stats, StatsSnapshot};
use crate::sync::{SemId, SemaphoreTable};
use crate::timers::{Clock, Hpet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ran(ProcessId),
    // only the idle process had anything to do
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Idle,
    BudgetExhausted,
}

/// One cpu worth of kernel: the process table, semaphores, memory, interrupt
/// routing and the loop that drives process bodies.
pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) cpu: Arc<Cpu>,
    pub(crate) clock: Arc<Hpet>,
    pub(crate) processes: ProcessTable,
    pub(crate) sems: SemaphoreTable,
    pub(crate) memory: PhysicalMemory,
    pub(crate) tasks: HashMap<usize, Box<dyn Task>>,
    pub(crate) delays: Delays,
    pub(crate) irqs: IrqTable,
    pub(crate) scheduler: Scheduler,
    pub(crate) stats: Stats,
    idle: ProcessId,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> KResult<Self> {
        config.validate()?;
        logging::init(config.log_level, config.console_lines);

        let clock = Arc::new(Hpet::new(config.hpet_period_fs));
        let mut kernel = Self {
            cpu: Arc::new(Cpu::new()),
            processes: ProcessTable::new(config.nenv),
            sems: SemaphoreTable::new(),
            memory: PhysicalMemory::new(config.phys_frames),
            tasks: HashMap::new(),
            delays: Delays::new(clock.clone()),
            irqs: IrqTable::default(),
            scheduler: Scheduler::new(),
            stats: Stats::default(),
            idle: ProcessId::CURRENT,
            clock,
            config,
        };
        kernel.idle = kernel.spawn(ProcessType::Idle, IdleTask)?;
        kernel.cpu.enable_interrupts();

        info!(
            "kernel up: {} process slots, {} free frames",
            kernel.config.nenv,
            kernel.memory.free_frames()
        );
        Ok(kernel)
    }

    /// Creates a runnable process with no parent.
    pub fn spawn(&mut self, kind: ProcessType, task: impl Task + 'static) -> KResult<ProcessId> {
        self.spawn_child(ProcessId::CURRENT, kind, task)
    }

    pub fn spawn_child(&mut self, parent: ProcessId, kind: ProcessType, task: impl Task + 'static) -> KResult<ProcessId> {
        if !parent.is_current() && self.processes.resolve(parent).is_none() {
            return Err(KernelError::BadTarget);
        }
        let slot = self.processes.alloc(parent, kind)?;
        self.tasks.insert(slot, Box::new(task));

        let id = self.processes.get(slot).id;
        if cfg!(feature = "trace_envs") {
            info!("[{}] new env {} ({:?})", parent, id, kind);
        }
        Ok(id)
    }

    /// Destroys a process from outside. The idle process can't be destroyed.
    pub fn destroy(&mut self, id: ProcessId) -> KResult<()> {
        let slot = self.processes.resolve(id).ok_or(KernelError::BadTarget)?;
        if id == self.idle {
            return Err(KernelError::BadTarget);
        }
        self.env_destroy(slot);
        self.reap();
        Ok(())
    }

    // a process destroyed while on the cpu lingers as DYING until it is switched out
    pub(crate) fn env_destroy(&mut self, slot: usize) {
        if self.scheduler.cur_proc == Some(slot) {
            self.processes.get_mut(slot).status = Status::Dying;
        } else {
            self.free_env(slot);
        }
    }

    fn free_env(&mut self, slot: usize) {
        let proc = self.processes.get_mut(slot);
        let id = proc.id;
        proc.address_space.clear(&mut self.memory);
        self.processes.release(slot);
        self.tasks.remove(&slot);
        if cfg!(feature = "trace_envs") {
            info!("[{}] free env", id);
        }
    }

    fn reap(&mut self) {
        let dying: Vec<usize> = (0..self.processes.len())
            .filter(|slot| Some(*slot) != self.scheduler.cur_proc)
            .filter(|slot| self.processes.get(*slot).status == Status::Dying)
            .collect();
        for slot in dying {
            self.free_env(slot);
        }
    }

    pub(crate) fn sched_yield(&mut self) -> usize {
        self.scheduler
            .sched_yield(&mut self.processes, &self.sems, &self.stats)
    }

    pub(crate) fn current_slot(&self) -> usize {
        match self.scheduler.cur_proc {
            Some(slot) => slot,
            None => panic!("system call without a current process"),
        }
    }

    pub(crate) fn current_id(&self) -> ProcessId {
        self.processes.get(self.current_slot()).id
    }

    /// Resolves a syscall target. With `checkperm` the target must be the
    /// caller or one of its immediate children.
    pub(crate) fn envid2env(&self, id: ProcessId, checkperm: bool) -> KResult<usize> {
        let cur = self.current_slot();
        if id.is_current() {
            return Ok(cur);
        }

        let slot = self.processes.resolve(id).ok_or(KernelError::BadTarget)?;
        if checkperm && slot != cur && self.processes.get(slot).parent_id != self.processes.get(cur).id {
            return Err(KernelError::BadTarget);
        }
        Ok(slot)
    }

    /// Resumes the process on the cpu until its next system call and handles
    /// that call.
    pub fn step(&mut self) -> Step {
        // user mode runs with interrupts on
        self.cpu.enable_interrupts();
        self.deliver_interrupts();

        let slot = match self
            .scheduler
            .cur_proc
            .filter(|slot| self.processes.get(*slot).status == Status::Running)
        {
            Some(slot) => slot,
            None => self.sched_yield(),
        };

        let proc = self.processes.get(slot);
        let id = proc.id;
        let idle = proc.is_idle();
        let task = match self.tasks.get_mut(&slot) {
            Some(task) => task,
            None => panic!("process {} has no body", id),
        };
        let mut cx = TaskContext::new(
            id,
            self.scheduler.regs.rax,
            proc.ipc_info(),
            self.clock.current_ms(),
            &proc.address_space,
            &mut self.memory,
        );
        let call = task.resume(&mut cx);

        // trap into the kernel
        self.cpu.disable_interrupts();
        trace!("[{}] syscall {:?}", id, call);
        self.dispatch(call);
        self.finish_syscall();
        self.cpu.enable_interrupts();

        if idle && self.scheduler.cur_proc == Some(slot) {
            Step::Idle
        } else {
            Step::Ran(id)
        }
    }

    // the caller keeps the cpu only while it is still RUNNING
    fn finish_syscall(&mut self) {
        let cur = self.current_slot();
        let running = self.processes.get(cur).status == Status::Running;
        if !running || self.scheduler.need_resched {
            if running {
                Stats::bump(&self.stats.preemptions);
            }
            self.sched_yield();
        }
        self.reap();
    }

    /// Steps until nothing but the idle process wants the cpu.
    pub fn run(&mut self, budget: usize) -> RunOutcome {
        for _ in 0..budget {
            if self.step() == Step::Idle {
                return RunOutcome::Idle;
            }
        }
        RunOutcome::BudgetExhausted
    }

    /// Signals an interrupt line. Delivered at once unless interrupts are
    /// masked, in which case it waits for the next syscall boundary.
    pub fn raise_irq(&mut self, line: u8) {
        self.cpu.raise(line);
        self.deliver_interrupts();
    }

    /// Advances the clock and fires the timer interrupt.
    pub fn tick(&mut self, ms: u64) {
        self.clock.advance_ms(ms);
        self.raise_irq(IRQ_TIMER);
    }

    fn deliver_interrupts(&mut self) {
        if !self.cpu.is_int_enabled() {
            return;
        }
        let pending = self.cpu.take_pending();
        if pending == 0 {
            return;
        }

        let cpu = self.cpu.clone();
        cpu.without_interrupts(|| {
            for line in interrupts::lines(pending) {
                self.handle_irq(line);
            }
        });
    }

    fn handle_irq(&mut self, line: u8) {
        Stats::bump(&self.stats.irqs);
        if line == IRQ_TIMER {
            self.timer_interrupt();
            return;
        }
        let mut cx = IrqContext::new(line, self.clock.current_ms(), &self.sems, &self.stats);
        self.irqs.dispatch(&mut cx);
    }

    fn timer_interrupt(&mut self) {
        Stats::bump(&self.stats.timer_ticks);
        for (id, deadline) in self.delays.get_expired_timers() {
            // the sleeper may have been destroyed or woken meanwhile
            if let Some(slot) = self.processes.resolve(id) {
                let proc = self.processes.get_mut(slot);
                if proc.wake_at == Some(deadline) {
                    proc.wake_at = None;
                    if proc.status == Status::NotRunnable {
                        proc.status = Status::Runnable;
                    }
                }
            }
        }
        if self.config.timer_preemption {
            self.scheduler.need_resched = true;
        }
    }

    pub fn register_irq(&mut self, line: u8, handler: impl IrqHandler + 'static) -> KResult<()> {
        self.irqs.register(line, Box::new(handler))
    }

    pub fn unregister_irq(&mut self, line: u8) -> bool {
        self.irqs.unregister(line)
    }

    pub fn create_semaphore(&mut self, value: i32) -> SemId {
        self.sems.create(value)
    }

    /// Destroys a semaphore. Processes still parked on it are let go.
    pub fn destroy_semaphore(&mut self, sem: SemId) -> KResult<()> {
        self.sems.get(sem).ok_or(KernelError::InvalidArgument)?;
        for slot in 0..self.processes.len() {
            let proc = self.processes.get_mut(slot);
            if proc.sem == Some(sem) {
                warn!("[{}] semaphore destroyed while waiting on it", proc.id);
                proc.sem = None;
            }
        }
        self.sems.destroy(sem)
    }

    pub fn sem_value(&self, sem: SemId) -> Option<i32> {
        self.sems.get(sem).map(|sem| sem.value())
    }

    pub fn sem_post(&self, sem: SemId) -> KResult<()> {
        self.sems.get(sem).ok_or(KernelError::InvalidArgument)?.post();
        Stats::bump(&self.stats.sem_posts);
        Ok(())
    }

    /// Backs memory of a process, for loading it before it first runs.
    pub fn alloc_user(&mut self, id: ProcessId, va: VirtualAddress, size: u64, perm: Perm) -> KResult<()> {
        let slot = self.processes.resolve(id).ok_or(KernelError::BadTarget)?;
        let proc = self.processes.get_mut(slot);
        proc.address_space.alloc_region(&mut self.memory, va, size, perm)
    }

    pub fn read_user(&self, id: ProcessId, va: VirtualAddress, buf: &mut [u8]) -> KResult<()> {
        let proc = self.processes.lookup(id).ok_or(KernelError::BadTarget)?;
        proc.address_space.read(&self.memory, va, buf)
    }

    pub fn write_user(&mut self, id: ProcessId, va: VirtualAddress, bytes: &[u8]) -> KResult<()> {
        let slot = self.processes.resolve(id).ok_or(KernelError::BadTarget)?;
        self.processes
            .get(slot)
            .address_space
            .write(&mut self.memory, va, bytes)
    }

    pub fn translate(&self, id: ProcessId, va: VirtualAddress) -> Option<(PhysicalAddress, Perm)> {
        self.processes.lookup(id)?.address_space.translate(va)
    }

    pub fn process(&self, id: ProcessId) -> Option<&Process> {
        self.processes.lookup(id)
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn current(&self) -> Option<ProcessId> {
        self.scheduler.cur_proc.map(|slot| self.processes.get(slot).id)
    }

    pub fn idle(&self) -> ProcessId {
        self.idle
    }

    /// The process the scheduler would switch to right now.
    pub fn pick_next(&self) -> Option<ProcessId> {
        self.scheduler
            .pick_next(&self.processes, &self.sems)
            .map(|slot| self.processes.get(slot).id)
    }

    pub fn free_frames(&self) -> u64 {
        self.memory.free_frames()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.current_ms()
    }

    /// Milliseconds until the earliest sleeper is due.
    pub fn next_wakeup(&self) -> Option<u64> {
        self.delays.get_smallest_delay()
    }

    pub fn cpu(&self) -> Arc<Cpu> {
        self.cpu.clone()
    }

    pub fn clock(&self) -> Arc<Hpet> {
        self.clock.clone()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
