use log::LevelFilter;

use crate::error::{KResult, KernelError};
use crate::process::pid::MAX_NENV;

#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Number of process-table slots. Power of two.
    pub nenv: usize,
    /// Frames of physical memory handed to the frame allocator.
    pub phys_frames: usize,
    pub console_lines: usize,
    /// Reschedule at the next syscall boundary after every timer interrupt.
    pub timer_preemption: bool,
    pub log_level: LevelFilter,
    /// HPET main counter period in femtoseconds.
    pub hpet_period_fs: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            nenv: 64,
            phys_frames: 1024,
            console_lines: 1024,
            timer_preemption: false,
            log_level: LevelFilter::Info,
            // 10 MHz
            hpet_period_fs: 100_000_000,
        }
    }
}

impl KernelConfig {
    pub fn with_nenv(mut self, nenv: usize) -> Self {
        self.nenv = nenv;
        self
    }

    pub fn with_phys_frames(mut self, frames: usize) -> Self {
        self.phys_frames = frames;
        self
    }

    pub fn with_timer_preemption(mut self, on: bool) -> Self {
        self.timer_preemption = on;
        self
    }

    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    pub fn validate(&self) -> KResult<()> {
        if !self.nenv.is_power_of_two() || self.nenv < 2 || self.nenv > MAX_NENV {
            return Err(KernelError::InvalidArgument);
        }
        // frame 0 is never handed out
        if self.phys_frames < 2 || self.console_lines == 0 || self.hpet_period_fs == 0 {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }
}
