use core::sync::atomic::{AtomicU64, Ordering};
use log::{info, trace};

use super::Clock;

const FS_PER_SEC: u128 = 1_000_000_000_000_000;
const FS_PER_NS: u128 = 1_000_000;

/// Modelled HPET: a main counter ticking once per `period` femtoseconds.
/// Time only moves when the owner advances it.
#[derive(Debug)]
pub struct Hpet {
    period: u64,
    main_counter: AtomicU64,
}

impl Hpet {
    pub fn new(period: u64) -> Self {
        assert!(period > 0, "HPET period must be non-zero");
        let hpet = Self {
            period,
            main_counter: AtomicU64::new(0),
        };
        info!("Created new HPET: period {} fs, frequency {} Hz", period, hpet.frequency());
        hpet
    }

    #[inline]
    pub fn frequency(&self) -> u64 {
        (FS_PER_SEC / self.period as u128) as u64
    }

    // convert time in ns to the equivalent value in counter
    #[inline]
    pub fn ns_to_counter(&self, ns: u64) -> u64 {
        (ns as u128 * FS_PER_NS / self.period as u128) as u64
    }

    #[inline]
    pub fn read_main_counter(&self) -> u64 {
        self.main_counter.load(Ordering::Acquire)
    }

    #[inline]
    pub fn write_main_counter(&self, val: u64) {
        self.main_counter.store(val, Ordering::Release);
    }

    pub fn advance_ns(&self, ns: u64) {
        let ticks = self.ns_to_counter(ns);
        let now = self.main_counter.fetch_add(ticks, Ordering::AcqRel) + ticks;
        trace!("HPET main counter advanced to {}", now);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_ns(ms * 1_000_000);
    }
}

impl Clock for Hpet {
    fn time_since_boot_in_ns(&self) -> u64 {
        (self.read_main_counter() as u128 * self.period as u128 / FS_PER_NS) as u64
    }
}
