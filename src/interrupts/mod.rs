use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use hashbrown::HashMap;
use log::trace;

use crate::error::{KResult, KernelError};
use crate::stats::Stats;
use crate::sync::{SemId, SemaphoreTable};

pub const IRQ_TIMER: u8 = 0;
pub const MAX_IRQ: u8 = 32;

/// Interrupt state of the (single) cpu: the IF flag and the lines that fired
/// while it was clear.
#[derive(Debug)]
pub struct Cpu {
    interrupts: AtomicBool,
    pending: AtomicU32,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    // interrupts start masked, as after reset
    pub const fn new() -> Self {
        Self {
            interrupts: AtomicBool::new(false),
            pending: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn is_int_enabled(&self) -> bool {
        self.interrupts.load(Ordering::Acquire)
    }

    #[inline]
    pub fn enable_interrupts(&self) {
        self.interrupts.store(true, Ordering::Release);
    }

    #[inline]
    pub fn disable_interrupts(&self) {
        self.interrupts.store(false, Ordering::Release);
    }

    pub fn without_interrupts<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let interrupts_enabled = self.is_int_enabled();
        if interrupts_enabled {
            self.disable_interrupts();
        }
        let ret = f();
        if interrupts_enabled {
            self.enable_interrupts();
        }
        ret
    }

    pub(crate) fn raise(&self, line: u8) {
        assert!(line < MAX_IRQ, "irq line {} out of range", line);
        self.pending.fetch_or(1 << line, Ordering::AcqRel);
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn take_pending(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }
}

/// What an interrupt handler may touch. Handlers never switch processes;
/// they can only make a waiter eligible by posting its semaphore.
pub struct IrqContext<'a> {
    line: u8,
    now_ms: u64,
    sems: &'a SemaphoreTable,
    stats: &'a Stats,
}

impl<'a> IrqContext<'a> {
    pub(crate) fn new(line: u8, now_ms: u64, sems: &'a SemaphoreTable, stats: &'a Stats) -> Self {
        Self {
            line,
            now_ms,
            sems,
            stats,
        }
    }

    pub fn line(&self) -> u8 {
        self.line
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn sem_value(&self, sem: SemId) -> Option<i32> {
        self.sems.get(sem).map(|sem| sem.value())
    }

    /// Returns false if the semaphore no longer exists.
    pub fn post(&self, sem: SemId) -> bool {
        match self.sems.get(sem) {
            Some(sem) => {
                sem.post();
                Stats::bump(&self.stats.sem_posts);
                true
            }
            None => false,
        }
    }
}

pub trait IrqHandler: Send {
    fn handle(&mut self, cx: &mut IrqContext<'_>);
}

impl<F> IrqHandler for F
where
    F: FnMut(&mut IrqContext<'_>) + Send,
{
    fn handle(&mut self, cx: &mut IrqContext<'_>) {
        self(cx)
    }
}

#[derive(Default)]
pub(crate) struct IrqTable {
    handlers: HashMap<u8, Box<dyn IrqHandler>>,
}

impl IrqTable {
    pub(crate) fn register(&mut self, line: u8, handler: Box<dyn IrqHandler>) -> KResult<()> {
        if line == IRQ_TIMER || line >= MAX_IRQ {
            return Err(KernelError::InvalidArgument);
        }
        if self.handlers.contains_key(&line) {
            return Err(KernelError::Busy);
        }
        self.handlers.insert(line, handler);
        Ok(())
    }

    pub(crate) fn unregister(&mut self, line: u8) -> bool {
        self.handlers.remove(&line).is_some()
    }

    pub(crate) fn dispatch(&mut self, cx: &mut IrqContext<'_>) -> bool {
        match self.handlers.get_mut(&cx.line) {
            Some(handler) => {
                handler.handle(cx);
                true
            }
            None => {
                trace!("spurious interrupt on line {}", cx.line);
                false
            }
        }
    }
}

// lines set in `mask`, lowest first
pub(crate) fn lines(mask: u32) -> impl Iterator<Item = u8> {
    (0..MAX_IRQ).filter(move |line| mask & (1 << line) != 0)
}
