//! Camera lifecycle: start/stop a capture stream with an active flag.

use crate::camera::CameraError;
use crate::frame::Frame;

/// A running capture stream.
pub trait VideoStream {
    /// Dequeue the next frame as RGB8.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Halt capture on every buffer/track of the stream.
    fn stop(&mut self);
}

/// Something that can hand out capture streams (a device, a file, a fake).
pub trait CaptureSource {
    type Stream: VideoStream;

    fn acquire(&mut self) -> Result<Self::Stream, CameraError>;

    /// Human-readable name for logs.
    fn describe(&self) -> String;
}

/// Owns at most one attached stream from `S`.
pub struct CameraController<S: CaptureSource> {
    source: S,
    stream: Option<S::Stream>,
}

impl<S: CaptureSource> CameraController<S> {
    pub fn new(source: S) -> Self {
        Self { source, stream: None }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Acquire and attach a stream. Returns `Ok(false)` without touching the
    /// source when a stream is already attached. On failure the controller
    /// stays inactive.
    pub fn start(&mut self) -> Result<bool, CameraError> {
        if self.stream.is_some() {
            tracing::debug!(source = %self.source.describe(), "camera already active");
            return Ok(false);
        }

        match self.source.acquire() {
            Ok(stream) => {
                self.stream = Some(stream);
                tracing::info!(source = %self.source.describe(), "camera started");
                Ok(true)
            }
            Err(e) => {
                tracing::error!(source = %self.source.describe(), error = %e, "error accessing the camera");
                Err(e)
            }
        }
    }

    /// Halt and detach the current stream. Returns whether one was attached.
    pub fn stop(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop();
                tracing::info!(source = %self.source.describe(), "camera stopped");
                true
            }
            None => false,
        }
    }

    pub fn read_frame(&mut self) -> Result<Frame, CameraError> {
        self.stream
            .as_mut()
            .ok_or(CameraError::NotActive)?
            .read_frame()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: CaptureSource> Drop for CameraController<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Counters {
        acquired: Cell<usize>,
        stopped: Cell<usize>,
    }

    struct FakeSource {
        counters: Rc<Counters>,
        fail: bool,
    }

    struct FakeStream {
        counters: Rc<Counters>,
        halted: bool,
    }

    impl VideoStream for FakeStream {
        fn read_frame(&mut self) -> Result<Frame, CameraError> {
            if self.halted {
                return Err(CameraError::CaptureFailed("halted".into()));
            }
            Ok(Frame::from_image(RgbImage::new(4, 4), 0))
        }

        fn stop(&mut self) {
            self.halted = true;
            self.counters.stopped.set(self.counters.stopped.get() + 1);
        }
    }

    impl CaptureSource for FakeSource {
        type Stream = FakeStream;

        fn acquire(&mut self) -> Result<FakeStream, CameraError> {
            if self.fail {
                return Err(CameraError::PermissionDenied("fake".into()));
            }
            self.counters.acquired.set(self.counters.acquired.get() + 1);
            Ok(FakeStream { counters: self.counters.clone(), halted: false })
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    fn controller(fail: bool) -> (CameraController<FakeSource>, Rc<Counters>) {
        let counters = Rc::new(Counters::default());
        let source = FakeSource { counters: counters.clone(), fail };
        (CameraController::new(source), counters)
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut cam, counters) = controller(false);
        assert!(cam.start().unwrap());
        assert!(!cam.start().unwrap());
        assert!(cam.is_active());
        assert_eq!(counters.acquired.get(), 1);
    }

    #[test]
    fn test_stop_twice() {
        let (mut cam, counters) = controller(false);
        cam.start().unwrap();
        assert!(cam.stop());
        assert!(!cam.stop());
        assert!(!cam.is_active());
        assert_eq!(counters.stopped.get(), 1);
    }

    #[test]
    fn test_stop_when_never_started() {
        let (mut cam, counters) = controller(false);
        assert!(!cam.stop());
        assert_eq!(counters.stopped.get(), 0);
    }

    #[test]
    fn test_failed_start_stays_inactive() {
        let (mut cam, counters) = controller(true);
        assert!(matches!(cam.start(), Err(CameraError::PermissionDenied(_))));
        assert!(!cam.is_active());
        assert_eq!(counters.acquired.get(), 0);
    }

    #[test]
    fn test_read_frame_requires_active_stream() {
        let (mut cam, _) = controller(false);
        assert!(matches!(cam.read_frame(), Err(CameraError::NotActive)));
        cam.start().unwrap();
        assert_eq!(cam.read_frame().unwrap().width, 4);
    }

    #[test]
    fn test_restart_acquires_new_stream() {
        let (mut cam, counters) = controller(false);
        cam.start().unwrap();
        cam.stop();
        cam.start().unwrap();
        assert_eq!(counters.acquired.get(), 2);
    }

    #[test]
    fn test_drop_stops_stream() {
        let (mut cam, counters) = controller(false);
        cam.start().unwrap();
        drop(cam);
        assert_eq!(counters.stopped.get(), 1);
    }
}
