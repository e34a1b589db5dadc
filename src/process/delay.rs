use alloc::{collections::BinaryHeap, sync::Arc, vec::Vec};
use core::cmp::Reverse;
use log::trace;

use super::pid::ProcessId;
use crate::timers::Clock;

#[derive(Debug)]
struct Delay(ProcessId, Reverse<u64>);

impl PartialEq for Delay {
    fn eq(&self, other: &Self) -> bool {
        self.1.eq(&other.1)
    }
}

impl Eq for Delay {}

impl PartialOrd for Delay {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delay {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.1.cmp(&other.1)
    }
}

/// Sleeping processes ordered by wake-up deadline (ms since boot).
pub(crate) struct Delays {
    heap: BinaryHeap<Delay>,
    clock: Arc<dyn Clock>,
}

impl Delays {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            heap: BinaryHeap::new(),
            clock,
        }
    }

    /// Returns the deadline the process was queued with.
    pub(crate) fn add(&mut self, pid: ProcessId, delay_ms: u64) -> u64 {
        let time_since_boot = self.clock.current_ms();
        let deadline = time_since_boot.saturating_add(delay_ms);
        let delay = Delay(pid, Reverse(deadline));
        trace!("[add] time_since_boot: {:?}, added delay: {:?}", time_since_boot, delay);
        self.heap.push(delay);
        deadline
    }

    // ids may be stale by now, the caller re-resolves them and checks the
    // deadline is still the one the process sleeps on
    pub(crate) fn get_expired_timers(&mut self) -> Vec<(ProcessId, u64)> {
        let time_since_boot = self.clock.current_ms();

        let mut expired_delays = Vec::new();
        while let Some(Delay(pid, Reverse(deadline))) = self.heap.peek() {
            if *deadline > time_since_boot {
                break;
            }
            expired_delays.push((*pid, *deadline));
            self.heap.pop();
        }

        if !expired_delays.is_empty() {
            trace!("[expire] time_since_boot: {:?}, expired: {:?}", time_since_boot, expired_delays);
        }
        expired_delays
    }

    pub(crate) fn get_smallest_delay(&self) -> Option<u64> {
        self.heap.peek().map(|Delay(_, Reverse(deadline))| {
            deadline.saturating_sub(self.clock.current_ms())
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timers::Hpet;

    #[test]
    fn expire_in_deadline_order() {
        let hpet = Arc::new(Hpet::new(100_000_000));
        let mut delays = Delays::new(hpet.clone());
        let (a, b) = (ProcessId::from_raw(0x1001), ProcessId::from_raw(0x1002));

        assert_eq!(delays.add(a, 30), 30);
        assert_eq!(delays.add(b, 10), 10);
        assert_eq!(delays.get_smallest_delay(), Some(10));
        assert!(delays.get_expired_timers().is_empty());

        hpet.advance_ms(10);
        assert_eq!(delays.get_expired_timers(), [(b, 10)]);
        hpet.advance_ms(25);
        assert_eq!(delays.get_expired_timers(), [(a, 30)]);
        assert_eq!(delays.get_smallest_delay(), None);
    }

    #[test]
    fn deadline_saturates() {
        let hpet = Arc::new(Hpet::new(100_000_000));
        let mut delays = Delays::new(hpet.clone());
        let a = ProcessId::from_raw(0x1001);

        hpet.advance_ms(5);
        assert_eq!(delays.add(a, u64::MAX), u64::MAX);
        hpet.advance_ms(1_000);
        assert!(delays.get_expired_timers().is_empty());
        assert_eq!(delays.get_smallest_delay(), Some(u64::MAX - 1_005));
    }
}
