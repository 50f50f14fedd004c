use crate::prelude::{CoreError, CoreResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// Fixed-capacity FIFO of the most recent samples of one channel.
///
/// One producer appends while any number of readers take copies. The lock is
/// held only for a single append/evict or a single copy, so readers never see
/// a partially written element; a snapshot may be stale by the time it is used.
pub struct SampleRing<T = f64> {
    capacity: usize,
    samples: RwLock<VecDeque<T>>,
    len: AtomicUsize,
}

impl<T: Clone> SampleRing<T> {
    pub fn with_capacity(capacity: usize) -> CoreResult<Self> {
        if capacity == 0 {
            return Err(CoreError::InvalidArgument(
                "sample ring capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            capacity,
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
            len: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Appends one sample, evicting the oldest when over capacity.
    pub fn push(&self, sample: T) {
        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        samples.push_back(sample);
        if samples.len() > self.capacity {
            samples.pop_front();
        }
        self.len.store(samples.len(), Ordering::Release);
    }

    pub fn push_many(&self, batch: &[T]) {
        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        for sample in batch {
            samples.push_back(sample.clone());
            if samples.len() > self.capacity {
                samples.pop_front();
            }
        }
        self.len.store(samples.len(), Ordering::Release);
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        let samples = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        samples.iter().cloned().collect()
    }

    /// Copy of the newest `count` samples (fewer if the ring holds fewer), oldest first.
    pub fn tail(&self, count: usize) -> Vec<T> {
        let samples = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        let skip = samples.len().saturating_sub(count);
        samples.iter().skip(skip).cloned().collect()
    }

    /// Empties the ring and hands back what it held.
    pub fn drain(&self) -> Vec<T> {
        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        let drained: Vec<T> = samples.drain(..).collect();
        samples.shrink_to(self.capacity);
        self.len.store(0, Ordering::Release);
        drained
    }
}
