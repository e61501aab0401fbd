//! Hand-off of finished frames from the processing thread to the display.
//!
//! The back buffer is the frame the processing thread is currently
//! building; it owns that one outright. The front buffer is the last
//! published frame, held behind a mutex as an `Arc`. Publishing swaps a
//! pointer and consuming clones one, so the lock is never held for longer
//! than a reference-count update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lazyeyes_frame_model::Frame;

#[derive(Debug, Default)]
pub struct DoubleBufferedPresenter {
    front: Mutex<Option<Arc<Frame>>>,
    published: AtomicU64,
}

impl DoubleBufferedPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `frame` the new front buffer.
    ///
    /// Returns the previous front frame when no reader still holds it, so
    /// the caller can reuse its allocation for the next back buffer.
    pub fn publish(&self, frame: Frame) -> Option<Frame> {
        let next = Arc::new(frame);
        let previous = {
            let mut front = self.front.lock().unwrap_or_else(PoisonError::into_inner);
            front.replace(next)
        };
        self.published.fetch_add(1, Ordering::Relaxed);
        previous.and_then(|frame| Arc::try_unwrap(frame).ok())
    }

    /// The most recently published frame, or `None` before the first
    /// publish.
    pub fn consume(&self) -> Option<Arc<Frame>> {
        self.front
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use lazyeyes_frame_model::PixelLayout;

    use super::*;

    fn frame(value: u8) -> Frame {
        Frame::filled(2, 2, PixelLayout::Gray, value)
    }

    #[test]
    fn consume_before_publish_is_none() {
        let presenter = DoubleBufferedPresenter::new();
        assert!(presenter.consume().is_none());
        assert_eq!(presenter.published(), 0);
    }

    #[test]
    fn consume_returns_latest_publish() {
        let presenter = DoubleBufferedPresenter::new();
        assert!(presenter.publish(frame(1)).is_none());
        presenter.publish(frame(2));
        assert_eq!(presenter.consume().unwrap().data()[0], 2);
        assert_eq!(presenter.published(), 2);
    }

    #[test]
    fn unreferenced_front_is_recycled() {
        let presenter = DoubleBufferedPresenter::new();
        presenter.publish(frame(1));
        let recycled = presenter.publish(frame(2)).unwrap();
        assert_eq!(recycled.data()[0], 1);
    }

    #[test]
    fn front_held_by_reader_is_not_recycled() {
        let presenter = DoubleBufferedPresenter::new();
        presenter.publish(frame(1));
        let shown = presenter.consume().unwrap();
        assert!(presenter.publish(frame(2)).is_none());
        // The reader's copy is unaffected by the swap.
        assert_eq!(shown.data()[0], 1);
    }

    #[test]
    fn readers_never_see_partial_frames() {
        let presenter = Arc::new(DoubleBufferedPresenter::new());
        let writer = {
            let presenter = Arc::clone(&presenter);
            thread::spawn(move || {
                for v in 0..200u8 {
                    presenter.publish(Frame::filled(16, 16, PixelLayout::Gray, v));
                }
            })
        };

        for _ in 0..200 {
            if let Some(shown) = presenter.consume() {
                let first = shown.data()[0];
                assert!(shown.data().iter().all(|&v| v == first));
            }
        }
        writer.join().unwrap();
        assert_eq!(presenter.consume().unwrap().data()[0], 199);
    }
}
