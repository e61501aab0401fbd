//! Frame acquisition.
//!
//! A [`FrameSource`] is whatever produces raw frames: a camera, a file, a
//! generator. The processing thread owns it exclusively while the session
//! runs.

use std::collections::VecDeque;

use lazyeyes_common::error::{LazyEyesError, LazyEyesResult};
use lazyeyes_frame_model::{Frame, PixelLayout};

/// Trait for a frame producer.
///
/// `read` blocks until a frame is available. It returns `Ok(None)` or a
/// [`LazyEyesError::Capture`] error when no frame could be produced this
/// time; both are transient and the caller simply retries. Any other error
/// is fatal to the processing loop.
pub trait FrameSource: Send {
    /// Acquire the next frame.
    fn read(&mut self) -> LazyEyesResult<Option<Frame>>;

    /// Frame width in pixels.
    fn width(&self) -> usize;

    /// Frame height in pixels.
    fn height(&self) -> usize;

    /// Whether frames are single-channel.
    fn is_monochrome(&self) -> bool;

    /// Nominal frame rate, when the device reports one.
    fn frame_rate_hint(&self) -> Option<f64> {
        None
    }

    /// Human-readable source name.
    fn name(&self) -> &str {
        "frame-source"
    }

    /// Whether a finite source has delivered everything it has.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Hand back a frame the consumer is finished with so its allocation
    /// can be reused.
    fn recycle(&mut self, _frame: Frame) {}

    /// Layout of the frames this source produces.
    fn layout(&self) -> PixelLayout {
        if self.is_monochrome() {
            PixelLayout::Gray
        } else {
            PixelLayout::Bgr
        }
    }
}

/// Plays back a fixed list of frames, then reports exhaustion.
///
/// Dropped frames can be scripted with [`ReplaySource::push_drop`]; each one
/// produces a single transient capture error.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    name: String,
    width: usize,
    height: usize,
    layout: PixelLayout,
    frame_rate: Option<f64>,
    queue: VecDeque<Option<Frame>>,
    delivered: u64,
}

impl ReplaySource {
    /// Build a replay from frames that all share one shape.
    pub fn new(name: impl Into<String>, frames: Vec<Frame>) -> LazyEyesResult<Self> {
        let first = frames
            .first()
            .ok_or_else(|| LazyEyesError::config("replay needs at least one frame"))?;
        let (width, height, layout) = (first.width(), first.height(), first.layout());

        if let Some(odd) = frames.iter().find(|f| !f.same_shape(first)) {
            return Err(LazyEyesError::config(format!(
                "replay frames differ in shape: {}x{}x{} vs {}x{}x{}",
                odd.width(),
                odd.height(),
                odd.channels(),
                width,
                height,
                first.channels()
            )));
        }

        Ok(Self {
            name: name.into(),
            width,
            height,
            layout,
            frame_rate: None,
            queue: frames.into_iter().map(Some).collect(),
            delivered: 0,
        })
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    /// Queue one dropped frame after the frames already queued.
    pub fn push_drop(&mut self) {
        self.queue.push_back(None);
    }

    /// Queue another frame. It must match the replay's shape.
    pub fn push_frame(&mut self, frame: Frame) -> LazyEyesResult<()> {
        if (frame.width(), frame.height(), frame.layout()) != (self.width, self.height, self.layout)
        {
            return Err(LazyEyesError::config(format!(
                "frame {}x{} does not match replay {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        self.queue.push_back(Some(frame));
        Ok(())
    }

    /// Frames handed out so far, excluding drops.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Frames and drops still queued.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl FrameSource for ReplaySource {
    fn read(&mut self) -> LazyEyesResult<Option<Frame>> {
        match self.queue.pop_front() {
            Some(Some(frame)) => {
                self.delivered += 1;
                Ok(Some(frame))
            }
            Some(None) => Err(LazyEyesError::capture(format!(
                "{}: scripted frame drop",
                self.name
            ))),
            None => Ok(None),
        }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn is_monochrome(&self) -> bool {
        self.layout == PixelLayout::Gray
    }

    fn frame_rate_hint(&self) -> Option<f64> {
        self.frame_rate
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(value: u8) -> Frame {
        Frame::filled(4, 3, PixelLayout::Gray, value)
    }

    #[test]
    fn replays_in_order_then_exhausts() {
        let mut source = ReplaySource::new("replay", vec![gray(1), gray(2)]).unwrap();
        assert_eq!((source.width(), source.height()), (4, 3));
        assert!(source.is_monochrome());
        assert_eq!(source.layout(), PixelLayout::Gray);

        assert_eq!(source.read().unwrap().unwrap().data()[0], 1);
        assert_eq!(source.read().unwrap().unwrap().data()[0], 2);
        assert!(source.is_exhausted());
        assert!(source.read().unwrap().is_none());
        assert_eq!(source.delivered(), 2);
    }

    #[test]
    fn scripted_drop_is_transient() {
        let mut source = ReplaySource::new("replay", vec![gray(1)]).unwrap();
        source.push_drop();
        source.push_frame(gray(3)).unwrap();

        source.read().unwrap();
        let err = source.read().unwrap_err();
        assert!(err.is_transient());
        assert_eq!(source.read().unwrap().unwrap().data()[0], 3);
    }

    #[test]
    fn rejects_mixed_shapes() {
        let color = Frame::filled(4, 3, PixelLayout::Bgr, 0);
        assert!(ReplaySource::new("replay", vec![gray(0), color.clone()]).is_err());
        assert!(ReplaySource::new("replay", Vec::new()).is_err());

        let mut source = ReplaySource::new("replay", vec![gray(0)]).unwrap();
        assert!(source.push_frame(color).is_err());
    }

    #[test]
    fn boxed_source_forwards_calls() {
        let mut boxed: Box<dyn FrameSource> = Box::new(
            ReplaySource::new("boxed", vec![gray(9)])
                .unwrap()
                .with_frame_rate(30.0),
        );
        assert_eq!(boxed.name(), "boxed");
        assert_eq!(boxed.frame_rate_hint(), Some(30.0));
        assert_eq!(boxed.read().unwrap().unwrap().data()[0], 9);
        assert!(boxed.is_exhausted());
    }
}
