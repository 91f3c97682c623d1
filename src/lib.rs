//! Camera Sensor
//!
//! A sensor binds one camera (a local capture device or a remote MJPEG stream) to
//! a motion-detection pipeline and publishes what it sees to subscribers.
//!
//! # Architecture
//!
//! For every frame the video source delivers, the sensor:
//!
//! 1. Copies the borrowed frame into an owned, copy-on-write `Frame`.
//! 2. Scores motion against a background model and classifies it (`> 0.15`).
//! 3. Emits the motion classification.
//! 4. Emits a face region, when a face locator is installed and finds one.
//! 5. Emits the frame.
//!
//! Source faults become `SensorError` notifications. There is no automatic
//! reconnection; the caller decides when to start again.
//!
//! # Module Structure
//!
//! - `sensor`: the `Sensor` façade, its builder and lifecycle
//! - `ingest`: video sources (local V4L2, remote MJPEG, synthetic `stub://`)
//! - `detect`: motion scoring and the face locator seam
//! - `frame`: borrowed frame views and owned frames
//! - `events`: observer registry
//! - `config`: JSON + environment configuration for the `sensord` binary

pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod frame;
pub mod ingest;
mod pipeline;
pub mod sensor;

pub use config::SensorConfig;
pub use detect::{
    classify_motion, BackgroundModelScorer, BackgroundModelSettings, FaceLocator, FaceRegion,
    MotionScorer, MOTION_THRESHOLD,
};
pub use error::{ErrorKind, SensorError, CONNECTION_UNAVAILABLE};
pub use events::{Subscribers, SubscriptionId};
pub use frame::{Frame, FrameView, PixelFormat};
pub use ingest::{
    list_local_devices, open_source, CaptureSettings, FrameGrabber, LocalDeviceInfo,
    SourceDescriptor, ThreadedSource, VideoSource,
};
pub use pipeline::SensorStats;
pub use sensor::{Sensor, SensorBuilder, SensorState};
