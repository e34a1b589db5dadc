use core::sync::atomic::{AtomicUsize, Ordering};

// per kernel instance so that independent kernels (tests) don't share counters
#[derive(Debug, Default)]
pub struct Stats {
    pub ctx_switches: AtomicUsize,
    pub preemptions: AtomicUsize,
    pub syscalls: AtomicUsize,
    pub ipc_sends: AtomicUsize,
    pub ipc_recvs: AtomicUsize,
    pub sem_waits: AtomicUsize,
    pub sem_posts: AtomicUsize,
    pub irqs: AtomicUsize,
    pub timer_ticks: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub ctx_switches: usize,
    pub preemptions: usize,
    pub syscalls: usize,
    pub ipc_sends: usize,
    pub ipc_recvs: usize,
    pub sem_waits: usize,
    pub sem_posts: usize,
    pub irqs: usize,
    pub timer_ticks: usize,
}

impl Stats {
    #[inline]
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        StatsSnapshot {
            ctx_switches: get(&self.ctx_switches),
            preemptions: get(&self.preemptions),
            syscalls: get(&self.syscalls),
            ipc_sends: get(&self.ipc_sends),
            ipc_recvs: get(&self.ipc_recvs),
            sem_waits: get(&self.sem_waits),
            sem_posts: get(&self.sem_posts),
            irqs: get(&self.irqs),
            timer_ticks: get(&self.timer_ticks),
        }
    }
}
