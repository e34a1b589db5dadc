pub(crate) mod delay;
pub mod pid;
pub mod process;
pub(crate) mod scheduler;
pub mod table;
pub mod task;

pub use pid::ProcessId;
pub use process::{IpcInfo, Process, ProcessType, Status, TrapFrame};
pub use table::ProcessTable;
pub use task::{IdleTask, Task, TaskContext};
