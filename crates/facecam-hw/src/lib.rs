//! facecam-hw: Camera capture and stream lifecycle.
//!
//! V4L2 devices are opened through the `v4l` crate and converted to RGB8
//! frames. [`CameraController`] owns the start/stop state over any
//! [`CaptureSource`].

pub mod camera;
pub mod controller;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat, V4lSource, V4lStream};
pub use controller::{CameraController, CaptureSource, VideoStream};
pub use frame::{Frame, FrameError};
