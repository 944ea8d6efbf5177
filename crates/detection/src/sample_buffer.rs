//! Fixed-capacity circular sample buffer.
//!
//! Capacity rounds up to the next power of two of `rate * window`; once the
//! write index first wraps the buffer stays full, overwriting oldest-first.

use ringbuf::{
    traits::{Consumer, Observer, RingBuffer},
    HeapRb,
};

pub struct CircularSampleBuffer {
    rb: HeapRb<f32>,
}

impl std::fmt::Debug for CircularSampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularSampleBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl CircularSampleBuffer {
    /// Capacity = next power of two >= `sample_rate_hz * window_seconds`.
    pub fn for_window(sample_rate_hz: f32, window_seconds: f32) -> Self {
        let wanted = (sample_rate_hz * window_seconds).ceil().max(1.0) as usize;
        Self::with_capacity(wanted.next_power_of_two())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rb: HeapRb::new(capacity.max(1)),
        }
    }

    /// Append one sample, overwriting the oldest when full.
    pub fn push(&mut self, value: f32) {
        self.rb.push_overwrite(value);
    }

    pub fn len(&self) -> usize {
        self.rb.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.rb.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rb.capacity().get()
    }

    /// Set once the write index first wraps; never clears while pushing.
    pub fn is_filled(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Contents oldest-first.
    pub fn snapshot(&self) -> Vec<f32> {
        self.rb.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.rb.clear();
    }
}
