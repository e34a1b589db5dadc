pub mod hpet;

pub use hpet::Hpet;

/// Monotonic time source used for sleeping and `gettime`.
pub trait Clock: Send + Sync {
    fn time_since_boot_in_ns(&self) -> u64;

    fn current_ms(&self) -> u64 {
        self.time_since_boot_in_ns() / 1_000_000
    }
}
