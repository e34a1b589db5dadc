#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod error;
pub mod interrupts;
pub mod kernel;
pub mod locks;
pub mod logging;
pub mod mem;
pub mod process;
pub mod stats;
pub mod sync;
pub mod syscall;
pub mod timers;

#[cfg(test)]
mod testing;

pub use config::KernelConfig;
pub use error::{KResult, KernelError};
pub use kernel::{Kernel, RunOutcome, Step};
