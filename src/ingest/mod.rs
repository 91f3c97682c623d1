//! Video sources.
//!
//! This module provides the sources a sensor can be bound to:
//! - Local capture devices, opened by enumeration index (feature: ingest-v4l2)
//! - Remote MJPEG/JPEG over HTTP with optional basic auth (feature: ingest-mjpeg)
//! - Synthetic scenes for `stub://` URLs (always available)
//!
//! Transports implement `FrameGrabber`, a pull interface (`connect`, `next_frame`).
//! `ThreadedSource` turns any grabber into a `VideoSource` by driving it on a
//! dedicated acquisition thread and invoking the registered frame and error
//! handlers from that thread.
//!
//! Grabbers MUST NOT:
//! - Retain frame views beyond the delivery callback
//! - Reconnect on their own after a fault (the caller decides when to restart)

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod local;
#[cfg(feature = "ingest-mjpeg")]
pub mod mjpeg;
pub(crate) mod normalize;
pub mod synthetic;
mod threaded;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use local::{list_local_devices, LocalCamera, LocalDeviceInfo};
#[cfg(feature = "ingest-mjpeg")]
pub use mjpeg::MjpegGrabber;
pub use synthetic::SyntheticGrabber;
pub use threaded::{ErrorHandler, FrameHandler, ThreadedSource};

use crate::frame::FrameView;

/// URL scheme that selects the synthetic grabber.
pub const STUB_SCHEME: &str = "stub://";

/// Which camera a sensor is bound to. Fixed for the lifetime of the sensor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceDescriptor {
    /// Local capture device, by position in the enumerated device list.
    Local { local_index: usize },
    /// Remote MJPEG stream. Credentials are opaque; empty means none.
    Remote {
        url: String,
        #[serde(default)]
        login: String,
        #[serde(default)]
        password: String,
    },
}

impl SourceDescriptor {
    pub fn local(index: usize) -> Self {
        SourceDescriptor::Local { local_index: index }
    }

    pub fn remote(
        url: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        SourceDescriptor::Remote {
            url: url.into(),
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, SourceDescriptor::Local { .. })
    }
}

impl Default for SourceDescriptor {
    fn default() -> Self {
        SourceDescriptor::local(0)
    }
}

/// Capture parameters shared by all grabbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Target frame rate. Grabbers decimate to this rate; 0 disables decimation.
    pub target_fps: u32,
    /// Preferred frame width (synthetic and local sources).
    pub width: u32,
    /// Preferred frame height (synthetic and local sources).
    pub height: u32,
    /// Remote stream connect timeout.
    pub connect_timeout: Duration,
    /// Remote stream read timeout.
    pub read_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_fps: 10,
            width: 640,
            height: 480,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Pull-side transport contract.
///
/// `next_frame` may block until a frame is available. The returned view borrows
/// the grabber's internal buffer and is only valid until the next call.
pub trait FrameGrabber: Send + 'static {
    /// Human-readable identifier used in logs.
    fn name(&self) -> String;

    /// Open the device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<FrameView<'_>>;

    /// Release the device or stream. The grabber may be connected again later.
    fn disconnect(&mut self) {}
}

/// Push-side contract the sensor consumes.
///
/// Handlers are invoked from the source's acquisition thread, never from the
/// thread that called `start`.
pub trait VideoSource: Send {
    fn name(&self) -> String;

    fn set_frame_handler(&mut self, handler: FrameHandler);

    fn set_error_handler(&mut self, handler: ErrorHandler);

    /// Open the source and begin delivering frames. No-op while already running.
    fn start(&mut self) -> Result<()>;

    /// Ask the acquisition thread to stop. Does not wait.
    fn request_stop(&mut self);

    /// Block until the acquisition thread has exited.
    fn wait_for_stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;
}

/// Build the video source for a descriptor.
///
/// Local indices are not resolved here; resolution happens when the source is
/// started.
pub fn open_source(
    descriptor: &SourceDescriptor,
    settings: &CaptureSettings,
) -> Result<Box<dyn VideoSource>> {
    match descriptor {
        SourceDescriptor::Local { local_index } => Ok(Box::new(ThreadedSource::new(
            LocalCamera::new(*local_index, settings.clone()),
        ))),
        SourceDescriptor::Remote {
            url,
            login,
            password,
        } => open_remote(url, login, password, settings),
    }
}

fn open_remote(
    url: &str,
    login: &str,
    password: &str,
    settings: &CaptureSettings,
) -> Result<Box<dyn VideoSource>> {
    if url.starts_with(STUB_SCHEME) {
        return Ok(Box::new(ThreadedSource::new(SyntheticGrabber::new(
            url,
            settings.clone(),
        ))));
    }

    #[cfg(feature = "ingest-mjpeg")]
    {
        let grabber = MjpegGrabber::new(url, login, password, settings.clone())?;
        Ok(Box::new(ThreadedSource::new(grabber)))
    }
    #[cfg(not(feature = "ingest-mjpeg"))]
    {
        let _ = (login, password);
        anyhow::bail!("remote stream '{}' requires the ingest-mjpeg feature", url)
    }
}

/// Minimum spacing between delivered frames for a target rate.
pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}
