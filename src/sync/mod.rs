pub mod sem;

pub use sem::{SemId, Semaphore, SemaphoreTable};
