//! Bounded write queue between the trigger path and the audio hardware
//!
//! The producer enqueues whole samples in one call, the device consumer
//! drains it at the hardware rate. A fill point marks the free-space
//! level at which the queue counts as writable again; [`Readiness`]
//! exposes that signal so a caller can block until playback drains.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::AudioError;

/// Device queue shared by the producer and the hardware consumer
pub struct SampleQueue {
    inner: Mutex<QueueState>,
    writable: Condvar,
}

struct QueueState {
    samples: VecDeque<i16>,
    capacity: usize,
    fill_point: usize,
}

impl SampleQueue {
    /// Create a queue holding up to `capacity` samples
    ///
    /// The fill point starts at the full capacity, so the queue is
    /// writable only when empty until [`set_fill_point`](Self::set_fill_point).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueState {
                samples: VecDeque::with_capacity(capacity),
                capacity,
                fill_point: capacity,
            }),
            writable: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Samples currently queued (0 = drained)
    pub fn filled(&self) -> usize {
        self.inner.lock().samples.len()
    }

    pub fn fill_point(&self) -> usize {
        self.inner.lock().fill_point
    }

    /// Set the free-space threshold at which the queue signals writable
    pub fn set_fill_point(&self, fill_point: usize) -> Result<(), AudioError> {
        let mut state = self.inner.lock();
        if fill_point == 0 || fill_point > state.capacity {
            return Err(AudioError::FillPoint {
                fill_point,
                capacity: state.capacity,
            });
        }
        state.fill_point = fill_point;
        Ok(())
    }

    /// Enqueue all of `samples` or nothing
    pub fn push_all(&self, samples: &[i16]) -> Result<(), AudioError> {
        let mut state = self.inner.lock();
        let free = state.capacity - state.samples.len();
        if samples.len() > free {
            return Err(AudioError::QueueOverflow {
                requested: samples.len(),
                free,
            });
        }
        state.samples.extend(samples.iter().copied());
        Ok(())
    }

    /// Enqueue all of `samples`, blocking until the queue has room
    pub fn push_all_blocking(&self, samples: &[i16]) -> Result<(), AudioError> {
        let mut state = self.inner.lock();
        if samples.len() > state.capacity {
            return Err(AudioError::QueueOverflow {
                requested: samples.len(),
                free: state.capacity - state.samples.len(),
            });
        }
        while state.capacity - state.samples.len() < samples.len() {
            self.writable.wait(&mut state);
        }
        state.samples.extend(samples.iter().copied());
        Ok(())
    }

    /// Fill `out` from the front of the queue, returning how many were taken
    ///
    /// Slots past the returned count are left untouched.
    pub fn pop_into(&self, out: &mut [i16]) -> usize {
        let mut state = self.inner.lock();
        let n = out.len().min(state.samples.len());
        for (slot, sample) in out.iter_mut().zip(state.samples.drain(..n)) {
            *slot = sample;
        }
        if n > 0 {
            self.writable.notify_all();
        }
        n
    }

    /// Drop up to `n` queued samples as if they had been played
    pub fn discard(&self, n: usize) -> usize {
        let mut state = self.inner.lock();
        let n = n.min(state.samples.len());
        state.samples.drain(..n);
        if n > 0 {
            self.writable.notify_all();
        }
        n
    }

    fn is_writable(&self) -> bool {
        self.inner.lock().is_writable()
    }

    fn wait_writable(&self) {
        let mut state = self.inner.lock();
        while !state.is_writable() {
            self.writable.wait(&mut state);
        }
    }
}

impl QueueState {
    fn is_writable(&self) -> bool {
        self.capacity - self.samples.len() >= self.fill_point
    }
}

/// Pollable write-readiness handle for a port
#[derive(Clone)]
pub struct Readiness {
    queue: Arc<SampleQueue>,
}

impl Readiness {
    pub fn new(queue: Arc<SampleQueue>) -> Self {
        Self { queue }
    }

    /// Whether free space has reached the fill point
    pub fn is_ready(&self) -> bool {
        self.queue.is_writable()
    }

    /// Block until free space reaches the fill point. No timeout.
    pub fn wait(&self) {
        self.queue.wait_writable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_is_all_or_nothing() {
        let queue = SampleQueue::new(8);
        queue.push_all(&[1; 6]).unwrap();

        let err = queue.push_all(&[2; 4]).unwrap_err();
        assert!(matches!(err, AudioError::QueueOverflow { requested: 4, free: 2 }));
        assert_eq!(queue.filled(), 6);
    }

    #[test]
    fn test_pop_preserves_order() {
        let queue = SampleQueue::new(8);
        queue.push_all(&[1, 2, 3, 4, 5]).unwrap();

        let mut out = [0i16; 3];
        assert_eq!(queue.pop_into(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);

        let mut out = [9i16; 4];
        assert_eq!(queue.pop_into(&mut out), 2);
        assert_eq!(out, [4, 5, 9, 9]);
        assert_eq!(queue.filled(), 0);
    }

    #[test]
    fn test_fill_point_bounds() {
        let queue = SampleQueue::new(10);
        assert!(queue.set_fill_point(0).is_err());
        assert!(queue.set_fill_point(11).is_err());
        queue.set_fill_point(9).unwrap();
        assert_eq!(queue.fill_point(), 9);
    }

    #[test]
    fn test_readiness_follows_fill_point() {
        let queue = Arc::new(SampleQueue::new(10));
        queue.set_fill_point(9).unwrap();
        let ready = Readiness::new(queue.clone());

        assert!(ready.is_ready());
        queue.push_all(&[0; 10]).unwrap();
        assert!(!ready.is_ready());

        queue.discard(8);
        assert!(!ready.is_ready());
        queue.discard(1);
        assert!(ready.is_ready());
    }

    #[test]
    fn test_blocking_push_waits_for_room() {
        let queue = Arc::new(SampleQueue::new(10));
        queue.push_all(&[1; 10]).unwrap();

        let consumer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            consumer.discard(4);
        });

        queue.push_all_blocking(&[2; 4]).unwrap();
        assert_eq!(queue.filled(), 10);
        assert!(queue.push_all_blocking(&[0; 11]).is_err());
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_unblocks_on_drain() {
        let queue = Arc::new(SampleQueue::new(100));
        queue.set_fill_point(99).unwrap();
        queue.push_all(&[0; 100]).unwrap();

        let consumer = queue.clone();
        let handle = thread::spawn(move || {
            for _ in 0..10 {
                thread::sleep(Duration::from_millis(2));
                consumer.discard(10);
            }
        });

        Readiness::new(queue.clone()).wait();
        assert!(queue.filled() <= 1);
        handle.join().unwrap();
    }
}
