//! Parking for idle workers.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

/// One-permit parker. An `unpark` that races ahead of `park` is not lost.
#[derive(Debug, Clone, Default)]
pub struct Parker {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Parker {
    /// Parker without a permit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until unparked or `timeout` elapses, consuming the permit.
    pub fn park_timeout(&self, timeout: Duration) {
        let (lock, cvar) = &*self.inner;
        let mut notified = lock.lock();
        if !*notified {
            cvar.wait_for(&mut notified, timeout);
        }
        *notified = false;
    }

    /// Hands out the permit and wakes the parked thread, if any.
    pub fn unpark(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock() = true;
        cvar.notify_one();
    }
}

/// Workers currently parked (or about to park).
#[derive(Debug, Default)]
pub struct IdleWorkers {
    parked: Mutex<Vec<(usize, Parker)>>,
}

impl IdleWorkers {
    /// No idle workers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Announces that `worker` is about to park on `parker`.
    pub fn register(&self, worker: usize, parker: &Parker) {
        self.parked.lock().push((worker, parker.clone()));
    }

    /// Withdraws the announcement, if still present.
    pub fn deregister(&self, worker: usize) {
        self.parked.lock().retain(|(id, _)| *id != worker);
    }

    /// Unparks one idle worker. Returns false when none was idle.
    pub fn unpark_one(&self) -> bool {
        let next = self.parked.lock().pop();
        match next {
            Some((_, parker)) => {
                parker.unpark();
                true
            }
            None => false,
        }
    }

    /// Unparks every idle worker.
    pub fn unpark_all(&self) {
        let all = std::mem::take(&mut *self.parked.lock());
        for (_, parker) in all {
            parker.unpark();
        }
    }

    /// Number of idle workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parked.lock().len()
    }

    /// True when no worker is idle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parked.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn unpark_before_park_is_remembered() {
        let parker = Parker::new();
        parker.unpark();
        let start = Instant::now();
        parker.park_timeout(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn park_times_out() {
        let parker = Parker::new();
        let start = Instant::now();
        parker.park_timeout(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn unpark_one_wakes_a_parked_thread() {
        let idle = Arc::new(IdleWorkers::new());
        let parker = Parker::new();
        idle.register(0, &parker);
        let handle = {
            let parker = parker.clone();
            thread::spawn(move || {
                let start = Instant::now();
                parker.park_timeout(Duration::from_secs(5));
                start.elapsed()
            })
        };
        assert!(idle.unpark_one());
        assert!(handle.join().unwrap() < Duration::from_secs(4));
        assert!(idle.is_empty());
        assert!(!idle.unpark_one());
    }

    #[test]
    fn deregister_removes_entry() {
        let idle = IdleWorkers::new();
        idle.register(1, &Parker::new());
        idle.register(2, &Parker::new());
        idle.deregister(1);
        assert_eq!(idle.len(), 1);
        idle.unpark_all();
        assert!(idle.is_empty());
    }
}
