use facecam_core::{AnalyzerError, DetectionPipeline, DisplayedFace, FaceAnalyzer, OverlayLabel};
use facecam_hw::{CameraController, CameraError, CaptureSource, FrameError};
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of one detection cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub faces: Vec<DisplayedFace>,
    pub labels: Vec<OverlayLabel>,
    /// Source image with the overlay blended in, when requested.
    pub composite: Option<RgbImage>,
    /// Capture sequence number; `None` for uploaded images.
    pub sequence: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub camera_active: bool,
    pub source: String,
    pub known_labels: Vec<String>,
    pub match_threshold: f32,
    pub faces: usize,
}

/// Messages sent from the front-end to the engine thread.
enum EngineRequest {
    StartCamera {
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    StopCamera {
        reply: oneshot::Sender<bool>,
    },
    Cycle {
        composite: bool,
        reply: oneshot::Sender<Result<Snapshot, EngineError>>,
    },
    AnalyzeImage {
        image: RgbImage,
        composite: bool,
        reply: oneshot::Sender<Result<Snapshot, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Start the camera. Returns `false` if it was already running.
    pub async fn start_camera(&self) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::StartCamera { reply }).await?
    }

    /// Stop the camera and clear the displayed faces.
    pub async fn stop_camera(&self) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::StopCamera { reply }).await
    }

    /// Read one frame from the camera and run it through the pipeline.
    pub async fn cycle(&self, composite: bool) -> Result<Snapshot, EngineError> {
        self.request(|reply| EngineRequest::Cycle { composite, reply }).await?
    }

    /// Run an uploaded image through the pipeline.
    pub async fn analyze_image(&self, image: RgbImage, composite: bool) -> Result<Snapshot, EngineError> {
        self.request(|reply| EngineRequest::AnalyzeImage {
            image,
            composite,
            reply,
        })
        .await?
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the pipeline and the camera controller, so requests are
/// served one at a time and at most one inference runs at once. The
/// controller is built on the thread; only the source crosses over.
pub fn spawn_engine<A, S>(pipeline: DetectionPipeline<A>, source: S) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + Send + 'static,
    S: CaptureSource + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facecam-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut engine = Engine {
                pipeline,
                camera: CameraController::new(source),
            };
            while let Some(req) = rx.blocking_recv() {
                engine.handle(req);
            }
            engine.camera.stop();
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

struct Engine<A, S: CaptureSource> {
    pipeline: DetectionPipeline<A>,
    camera: CameraController<S>,
}

impl<A: FaceAnalyzer, S: CaptureSource> Engine<A, S> {
    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::StartCamera { reply } => {
                let _ = reply.send(self.start_camera());
            }
            EngineRequest::StopCamera { reply } => {
                let stopped = self.camera.stop();
                self.pipeline.clear_display();
                let _ = reply.send(stopped);
            }
            EngineRequest::Cycle { composite, reply } => {
                let _ = reply.send(self.run_cycle(composite));
            }
            EngineRequest::AnalyzeImage {
                image,
                composite,
                reply,
            } => {
                let _ = reply.send(self.analyze(&image, composite, None));
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(EngineStatus {
                    camera_active: self.camera.is_active(),
                    source: self.camera.source().describe(),
                    known_labels: self.pipeline.matcher().labels().map(str::to_string).collect(),
                    match_threshold: self.pipeline.matcher().threshold(),
                    faces: self.pipeline.faces().len(),
                });
            }
        }
    }

    fn start_camera(&mut self) -> Result<bool, EngineError> {
        let started = self.camera.start()?;
        if started {
            self.pipeline.reset();
        }
        Ok(started)
    }

    fn run_cycle(&mut self, composite: bool) -> Result<Snapshot, EngineError> {
        let frame = self.camera.read_frame()?;
        let sequence = frame.sequence;
        let image = frame.into_image()?;
        self.analyze(&image, composite, Some(sequence))
    }

    fn analyze(&mut self, image: &RgbImage, composite: bool, sequence: Option<u32>) -> Result<Snapshot, EngineError> {
        let faces = self.pipeline.process(image)?;
        let overlay = self.pipeline.overlay();
        Ok(Snapshot {
            faces,
            labels: overlay.labels().to_vec(),
            composite: composite.then(|| overlay.composite(image)),
            sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{engine, face};
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_live_cycles_smooth_age() {
        let (handle, _) = engine(vec![vec![face(30.0)], vec![face(40.0)]], false);
        assert!(handle.start_camera().await.unwrap());

        let first = handle.cycle(false).await.unwrap();
        assert_eq!(first.faces[0].age, 30.0);
        assert_eq!(first.sequence, Some(1));

        let second = handle.cycle(true).await.unwrap();
        assert_eq!(second.faces[0].age, 35.0);
        assert_eq!(second.faces[0].name, "Unknown");
        assert_eq!(second.labels[0].text, "Unknown, 35 yrs, female");
        assert_eq!(second.composite.unwrap().dimensions(), (64, 48));
    }

    #[tokio::test]
    async fn test_cycle_requires_camera() {
        let (handle, _) = engine(vec![], false);
        assert!(matches!(
            handle.cycle(false).await,
            Err(EngineError::Camera(CameraError::NotActive))
        ));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (handle, counters) = engine(vec![], false);
        assert!(handle.start_camera().await.unwrap());
        assert!(!handle.start_camera().await.unwrap());
        assert_eq!(counters.acquired.load(Ordering::SeqCst), 1);
        let status = handle.status().await.unwrap();
        assert!(status.camera_active);
        assert_eq!(status.match_threshold, 0.5);
    }

    #[tokio::test]
    async fn test_failed_start_reports_error() {
        let (handle, _) = engine(vec![], true);
        assert!(matches!(
            handle.start_camera().await,
            Err(EngineError::Camera(CameraError::DeviceBusy))
        ));
        assert!(!handle.status().await.unwrap().camera_active);
    }

    #[tokio::test]
    async fn test_stop_clears_faces() {
        let (handle, counters) = engine(vec![vec![face(30.0)]], false);
        handle.start_camera().await.unwrap();
        handle.cycle(false).await.unwrap();
        assert_eq!(handle.status().await.unwrap().faces, 1);

        assert!(handle.stop_camera().await.unwrap());
        assert!(!handle.stop_camera().await.unwrap());
        let status = handle.status().await.unwrap();
        assert!(!status.camera_active);
        assert_eq!(status.faces, 0);
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_resets_smoothing() {
        let (handle, _) = engine(vec![vec![face(30.0)], vec![face(50.0)]], false);
        handle.start_camera().await.unwrap();
        handle.cycle(false).await.unwrap();
        handle.stop_camera().await.unwrap();
        handle.start_camera().await.unwrap();
        let snapshot = handle.cycle(false).await.unwrap();
        assert_eq!(snapshot.faces[0].age, 50.0);
    }

    #[tokio::test]
    async fn test_analyze_image_without_faces() {
        let (handle, _) = engine(vec![vec![]], false);
        let snapshot = handle.analyze_image(RgbImage::new(32, 32), true).await.unwrap();
        assert!(snapshot.faces.is_empty());
        assert!(snapshot.labels.is_empty());
        assert_eq!(snapshot.sequence, None);
        assert_eq!(snapshot.composite.unwrap(), RgbImage::new(32, 32));
    }
}
