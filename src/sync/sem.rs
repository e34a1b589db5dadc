use alloc::vec::Vec;
use core::sync::atomic::{AtomicI32, Ordering};

use crate::error::{KResult, KernelError};

/// Counting semaphore. The value may be changed from interrupt handlers, so
/// every update is a single atomic operation rather than relying on
/// interrupts being masked.
#[derive(Debug)]
pub struct Semaphore {
    value: AtomicI32,
}

impl Semaphore {
    pub const fn new(value: i32) -> Self {
        Self {
            value: AtomicI32::new(value),
        }
    }

    pub fn value(&self) -> i32 {
        self.value.load(Ordering::Acquire)
    }

    pub fn post(&self) {
        self.value.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements if the value is positive.
    pub fn try_acquire(&self) -> bool {
        self.value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |val| {
                if val > 0 {
                    Some(val - 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    // gate would stop a waiter from being picked
    pub(crate) fn is_gated(&self) -> bool {
        self.value() <= 0
    }
}

/// Handle to a semaphore in a [`SemaphoreTable`]. Processes hold these
/// instead of references, so a semaphore can go away while a handle still
/// exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemId {
    index: u32,
    generation: u32,
}

impl SemId {
    pub fn to_raw(self) -> u64 {
        (self.generation as u64) << 32 | self.index as u64
    }

    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    sem: Option<Semaphore>,
}

#[derive(Debug, Default)]
pub struct SemaphoreTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl SemaphoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, value: i32) -> SemId {
        let sem = Some(Semaphore::new(value));
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation += 1;
                slot.sem = sem;
                SemId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot { generation: 0, sem });
                SemId {
                    index: self.slots.len() as u32 - 1,
                    generation: 0,
                }
            }
        }
    }

    pub fn destroy(&mut self, id: SemId) -> KResult<()> {
        self.get(id).ok_or(KernelError::InvalidArgument)?;
        self.slots[id.index as usize].sem = None;
        self.free.push(id.index);
        Ok(())
    }

    pub fn get(&self, id: SemId) -> Option<&Semaphore> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.sem.as_ref())
    }

    // a stale handle keeps its waiter parked
    pub(crate) fn is_gated(&self, id: SemId) -> bool {
        self.get(id).map_or(true, Semaphore::is_gated)
    }

    // wake-up accounting for a waiter the scheduler just picked
    pub(crate) fn consume(&self, id: SemId) {
        if let Some(sem) = self.get(id) {
            sem.value.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::sync::Arc;
    use std::thread;

    #[test]
    fn post_then_wait() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_acquire());
        sem.post();
        assert!(sem.try_acquire());
        assert_eq!(sem.value(), 0);
        assert!(!sem.try_acquire());
    }

    #[test]
    fn stale_handles_do_not_resolve() {
        let mut table = SemaphoreTable::new();
        let a = table.create(3);
        table.destroy(a).unwrap();
        let b = table.create(0);

        assert_eq!(a.index, b.index);
        assert!(table.get(a).is_none());
        assert!(table.is_gated(a));
        assert_eq!(table.destroy(a), Err(KernelError::InvalidArgument));
        assert_eq!(table.get(b).map(Semaphore::value), Some(0));
    }

    #[test]
    fn concurrent_posts_and_acquires_balance() {
        let sem = Arc::new(Semaphore::new(0));
        let posters: Vec<_> = (0..4)
            .map(|_| {
                let sem = sem.clone();
                thread::spawn(move || (0..1000).for_each(|_| sem.post()))
            })
            .collect();
        let taker = {
            let sem = sem.clone();
            thread::spawn(move || {
                let mut taken = 0;
                while taken < 2000 {
                    if sem.try_acquire() {
                        taken += 1;
                    }
                }
            })
        };

        posters.into_iter().for_each(|t| t.join().unwrap());
        taker.join().unwrap();
        assert_eq!(sem.value(), 2000);
    }
}
