//! Process-wide request counters. A single lock guards both counters so the
//! pair is always observed consistently.

use std::sync::Mutex;

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    active_requests: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    inner: Mutex<Counters>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_active(&self) {
        let mut c = self.inner.lock().unwrap();
        c.active_requests += 1;
        c.total_requests += 1;
    }

    pub fn dec_active(&self) {
        let mut c = self.inner.lock().unwrap();
        c.active_requests = c.active_requests.saturating_sub(1);
    }

    /// Returns `(total, active)`.
    pub fn get(&self) -> (u64, u64) {
        let c = self.inner.lock().unwrap();
        (c.total_requests, c.active_requests)
    }
}
