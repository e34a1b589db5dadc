use alloc::{collections::VecDeque, sync::Arc, vec::Vec};
use spin::Mutex;

use crate::config::KernelConfig;
use crate::error::{self, KernelError};
use crate::kernel::Kernel;
use crate::process::{IpcInfo, Task, TaskContext};
use crate::syscall::Syscall;

pub(crate) fn kernel() -> Kernel {
    Kernel::new(KernelConfig::default().with_nenv(16)).unwrap()
}

/// What a scripted task observed after each of its calls returned.
#[derive(Clone, Default)]
pub(crate) struct Trace(Arc<Mutex<Vec<(i64, IpcInfo)>>>);

impl Trace {
    pub(crate) fn rets(&self) -> Vec<i64> {
        self.0.lock().iter().map(|(ret, _)| *ret).collect()
    }

    pub(crate) fn errors(&self) -> Vec<Option<KernelError>> {
        self.0.lock().iter().map(|(ret, _)| error::from_reg(*ret).err()).collect()
    }

    pub(crate) fn ipc(&self) -> Vec<IpcInfo> {
        self.0.lock().iter().map(|(_, ipc)| *ipc).collect()
    }
}

/// Issues `calls` in order, then exits.
pub(crate) struct Script {
    calls: VecDeque<Syscall>,
    started: bool,
    trace: Trace,
}

impl Task for Script {
    fn resume(&mut self, cx: &mut TaskContext<'_>) -> Syscall {
        if self.started {
            self.trace.0.lock().push((cx.ret(), cx.ipc()));
        }
        self.started = true;
        self.calls.pop_front().unwrap_or(Syscall::Exit)
    }
}

pub(crate) fn script(calls: impl IntoIterator<Item = Syscall>) -> (Script, Trace) {
    let trace = Trace::default();
    let script = Script {
        calls: calls.into_iter().collect(),
        started: false,
        trace: trace.clone(),
    };
    (script, trace)
}
