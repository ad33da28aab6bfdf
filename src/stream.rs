//! Atomic nonce distribution and stop signalling shared by search workers.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Hands out consecutive nonces to workers, optionally up to a limit.
#[derive(Debug)]
pub struct NonceSource {
    start: u64,
    limit: Option<u64>,
    next: AtomicU64,
}

impl NonceSource {
    pub const fn new(start: u64) -> Self {
        Self {
            start,
            limit: None,
            next: AtomicU64::new(start),
        }
    }

    /// Issue at most `limit` nonces starting at `start`.
    pub const fn bounded(start: u64, limit: u64) -> Self {
        Self {
            start,
            limit: Some(limit),
            next: AtomicU64::new(start),
        }
    }

    /// Reserve the next nonce, or `None` once the limit or `u64::MAX` is hit.
    #[inline]
    pub fn fetch(&self) -> Option<u64> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        // Wrapped past u64::MAX.
        if n < self.start {
            return None;
        }
        match self.limit {
            Some(limit) if n - self.start >= limit => None,
            _ if n == u64::MAX => None,
            _ => Some(n),
        }
    }

    /// Number of nonces handed out so far.
    pub fn issued(&self) -> u64 {
        let raw = self.next.load(Ordering::Relaxed).saturating_sub(self.start);
        match self.limit {
            Some(limit) => raw.min(limit),
            None => raw,
        }
    }
}

/// Cooperative stop signal. Workers poll it between engine calls.
#[derive(Debug)]
pub struct StopFlag {
    stop: AtomicBool,
}

impl StopFlag {
    pub const fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn force_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}
