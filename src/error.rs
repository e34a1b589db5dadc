use core::fmt;

pub type KResult<T> = Result<T, KernelError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    // target process id doesn't resolve, or the caller may not touch it
    BadTarget,
    InvalidArgument,
    OutOfMemory,
    NoFreeProcess,
    // user memory access to an unmapped or read-only page
    Fault,
    NotReceiving,
    Busy,
    NoSys,
}

impl KernelError {
    const ALL: [KernelError; 8] = [
        KernelError::BadTarget,
        KernelError::InvalidArgument,
        KernelError::OutOfMemory,
        KernelError::NoFreeProcess,
        KernelError::Fault,
        KernelError::NotReceiving,
        KernelError::Busy,
        KernelError::NoSys,
    ];

    /// Value placed in the return register of a failed system call.
    pub fn errno(self) -> i64 {
        match self {
            KernelError::BadTarget => -2,
            KernelError::InvalidArgument => -3,
            KernelError::OutOfMemory => -4,
            KernelError::NoFreeProcess => -5,
            KernelError::Fault => -6,
            KernelError::NotReceiving => -7,
            KernelError::Busy => -8,
            KernelError::NoSys => -9,
        }
    }

    pub fn from_errno(val: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.errno() == val)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::BadTarget => "bad environment",
            KernelError::InvalidArgument => "invalid parameter",
            KernelError::OutOfMemory => "out of memory",
            KernelError::NoFreeProcess => "out of environments",
            KernelError::Fault => "segmentation fault",
            KernelError::NotReceiving => "env is not recving",
            KernelError::Busy => "device busy",
            KernelError::NoSys => "no such system call",
        };
        f.write_str(msg)
    }
}

/// Encodes a syscall outcome as the value of the return register.
pub fn to_reg(res: KResult<i64>) -> i64 {
    match res {
        Ok(val) => val,
        Err(err) => err.errno(),
    }
}

/// Inverse of [`to_reg`]: negative values that name a known error decode to it.
pub fn from_reg(val: i64) -> KResult<i64> {
    match KernelError::from_errno(val) {
        Some(err) if val < 0 => Err(err),
        _ => Ok(val),
    }
}
