//! Rolling window of downsampled frames.
//!
//! A circular buffer: appends are O(1) and, once full, each append
//! overwrites the oldest slot. Frames and timestamps share one head/len
//! pair so they can never disagree in length or order.

use lazyeyes_common::error::{LazyEyesError, LazyEyesResult};
use lazyeyes_frame_model::FloatImage;

/// Fixed-capacity FIFO of downsampled frames with capture timestamps.
///
/// Only the processing thread touches this; it has no internal locking.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    slots: Vec<Option<FloatImage>>,
    timestamps: Vec<f64>,
    head: usize,
    len: usize,
}

impl HistoryBuffer {
    pub fn with_capacity(capacity: usize) -> LazyEyesResult<Self> {
        if capacity == 0 {
            return Err(LazyEyesError::config(
                "history capacity must be greater than zero",
            ));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Ok(Self {
            slots,
            timestamps: vec![0.0; capacity],
            head: 0,
            len: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append a frame, evicting and returning the oldest one when full.
    ///
    /// The evicted image is handed back so the caller can reuse its
    /// allocation. Every frame must have the shape of the ones already
    /// buffered. A timestamp older than the newest one is clamped up to it,
    /// keeping the sequence non-decreasing.
    pub fn append(
        &mut self,
        frame: FloatImage,
        timestamp: f64,
    ) -> LazyEyesResult<Option<FloatImage>> {
        if let Some(newest) = self.newest() {
            if !newest.same_shape(&frame) {
                return Err(LazyEyesError::processing(format!(
                    "history frame shape changed from {}x{}x{} to {}x{}x{}",
                    newest.width(),
                    newest.height(),
                    newest.channels(),
                    frame.width(),
                    frame.height(),
                    frame.channels()
                )));
            }
        }

        let timestamp = match self.newest_timestamp() {
            Some(newest) if timestamp < newest => {
                tracing::debug!(timestamp, newest, "Clamping out-of-order history timestamp");
                newest
            }
            _ => timestamp,
        };

        let capacity = self.capacity();
        let idx = if self.is_full() {
            let current = self.head;
            self.head = (self.head + 1) % capacity;
            current
        } else {
            let idx = (self.head + self.len) % capacity;
            self.len += 1;
            idx
        };

        self.timestamps[idx] = timestamp;
        Ok(self.slots[idx].replace(frame))
    }

    /// Timestamp of the oldest buffered frame.
    pub fn oldest_timestamp(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.timestamps[self.head])
    }

    /// Timestamp of the newest buffered frame.
    pub fn newest_timestamp(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.timestamps[self.physical(self.len - 1)])
    }

    /// The most recently appended frame.
    pub fn newest(&self) -> Option<&FloatImage> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.physical(self.len - 1)].as_ref()
    }

    /// Seconds between the oldest and newest buffered frames.
    /// Zero when fewer than two frames are buffered.
    pub fn time_span(&self) -> f64 {
        match (self.oldest_timestamp(), self.newest_timestamp()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Frames in order, oldest first.
    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            buffer: self,
            offset: 0,
            remaining: self.len,
        }
    }

    /// Ordered view of the buffered frames for the filter stage.
    pub fn snapshot(&self) -> Vec<&FloatImage> {
        self.iter().collect()
    }

    /// Timestamps in order, oldest first.
    pub fn timestamps(&self) -> Vec<f64> {
        (0..self.len).map(|i| self.timestamps[self.physical(i)]).collect()
    }

    /// Drop every buffered frame.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }

    #[inline]
    fn physical(&self, logical: usize) -> usize {
        (self.head + logical) % self.capacity()
    }
}

/// Iterator over buffered frames from oldest to newest.
pub struct HistoryIter<'a> {
    buffer: &'a HistoryBuffer,
    offset: usize,
    remaining: usize,
}

impl<'a> Iterator for HistoryIter<'a> {
    type Item = &'a FloatImage;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let idx = self.buffer.physical(self.offset);
        self.offset += 1;
        self.remaining -= 1;
        // Slots within the active range are always populated.
        self.buffer.slots[idx].as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> ExactSizeIterator for HistoryIter<'a> {}

impl<'a> IntoIterator for &'a HistoryBuffer {
    type Item = &'a FloatImage;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
