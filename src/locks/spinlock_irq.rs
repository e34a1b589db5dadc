use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::interrupts::Cpu;

// Interrupts safe version of SpinLock<T>
// To be used to lock the resources that are modifed/read from within an interrupt handler
// Locking masks interrupts on the owning cpu, they are restored once the Guard goes out of scope
#[derive(Debug)]
pub struct SpinLockIrq<T> {
    cpu: Arc<Cpu>,
    locked: AtomicBool,
    // shows if the interrupts were enabled at the moment when the lock is taken
    interrupts: AtomicBool,
    value: UnsafeCell<T>,
}

impl<T> SpinLockIrq<T> {
    pub fn new(value: T, cpu: Arc<Cpu>) -> Self {
        Self {
            cpu,
            locked: AtomicBool::new(false),
            interrupts: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> GuardIrq<T> {
        // Masking before spinning is fine: whoever holds the lock already masked them,
        // so `interrupts_enabled` only comes out true when the lock is about to be free.
        let interrupts_enabled = self.cpu.is_int_enabled();
        if interrupts_enabled {
            self.cpu.disable_interrupts();
        }

        while self.locked.swap(true, Ordering::Acquire) {
            core::hint::spin_loop();
        }
        self.interrupts.store(interrupts_enabled, Ordering::Relaxed);
        GuardIrq { lock: self }
    }
}

// SAFETY: access to `value` is serialised by `locked`
unsafe impl<T> Sync for SpinLockIrq<T> where T: Send {}
unsafe impl<T> Send for SpinLockIrq<T> where T: Send {}

pub struct GuardIrq<'a, T> {
    lock: &'a SpinLockIrq<T>,
}

impl<T> Deref for GuardIrq<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard proves exclusive access
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for GuardIrq<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive access
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for GuardIrq<'_, T> {
    fn drop(&mut self) {
        let restore = self.lock.interrupts.load(Ordering::Relaxed);
        self.lock.locked.store(false, Ordering::Release);
        if restore {
            self.lock.cpu.enable_interrupts();
        }
    }
}
