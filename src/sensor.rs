//! The sensor façade.
//!
//! A `Sensor` binds one video source to the motion pipeline and fans the
//! results out to subscribers. Every fault is reported three ways: returned from
//! the failing call (when there is one), recorded as the last error, and emitted
//! on the error channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;

use crate::detect::{BackgroundModelScorer, FaceLocator, FaceRegion, MotionScorer};
use crate::error::SensorError;
use crate::events::{Callback, SubscriptionId};
use crate::frame::{Frame, FrameView};
use crate::ingest::{open_source, CaptureSettings, SourceDescriptor, VideoSource};
use crate::pipeline::{Pipeline, SensorStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorState {
    /// Source opened, not acquiring.
    Ready,
    /// Acquisition thread running.
    Running,
    /// No usable source could be built. Start and Stop report the setup error.
    Degraded,
    /// Shut down. Start and Stop report `ErrorKind::Closed`.
    Closed,
}

pub struct Sensor {
    descriptor: SourceDescriptor,
    pipeline: Arc<Pipeline>,
    /// `None` when degraded, after shutdown, or while `start` is in progress.
    source: Mutex<Option<Box<dyn VideoSource>>>,
    setup_error: Option<SensorError>,
    /// Stop requested while `start` held the source. Guarded by the `source` lock.
    pending_stop: AtomicBool,
    closed: AtomicBool,
}

impl Sensor {
    /// Sensor bound to the local camera at `index` in the enumerated device list.
    pub fn local(index: usize) -> Self {
        Self::builder(SourceDescriptor::local(index)).build()
    }

    /// Sensor bound to a remote MJPEG stream. Empty credentials mean none.
    pub fn remote(
        url: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::builder(SourceDescriptor::remote(url, login, password)).build()
    }

    pub fn builder(descriptor: SourceDescriptor) -> SensorBuilder {
        SensorBuilder::new(descriptor)
    }

    /// Open the source and begin acquisition. A no-op while already running.
    pub fn start(&self) -> Result<(), SensorError> {
        self.ensure_usable()?;

        let taken = {
            let mut slot = self.lock_source();
            self.pending_stop.store(false, Ordering::SeqCst);
            slot.take()
        };
        let Some(mut source) = taken else {
            log::debug!("start requested while another start is in progress");
            return Ok(());
        };

        let result = source.start();

        let orphaned = {
            let mut slot = self.lock_source();
            if self.closed.load(Ordering::SeqCst) {
                Some(source)
            } else {
                if self.pending_stop.swap(false, Ordering::SeqCst) {
                    log::debug!("{}: applying stop requested during start", source.name());
                    source.request_stop();
                }
                *slot = Some(source);
                None
            }
        };
        let Some(mut source) = orphaned else {
            return result.map_err(|err| self.fail(SensorError::source_unavailable(err)));
        };

        // Shut down while we were starting.
        source.request_stop();
        if let Err(err) = source.wait_for_stop() {
            log::warn!("{:#}", err);
        }
        Err(self.fail(SensorError::closed()))
    }

    /// Ask acquisition to cease. Does not wait for the acquisition thread.
    pub fn stop(&self) -> Result<(), SensorError> {
        self.ensure_usable()?;
        let mut slot = self.lock_source();
        match slot.as_mut() {
            Some(source) => source.request_stop(),
            // A start is connecting; it applies the stop once the source is back.
            None => self.pending_stop.store(true, Ordering::SeqCst),
        }
        Ok(())
    }

    /// Stop acquisition, wait for the acquisition thread and release the source.
    ///
    /// Idempotent. When called from a subscriber callback the wait is skipped and
    /// the acquisition thread exits once the callback returns.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let source = self.lock_source().take();
        if let Some(mut source) = source {
            source.request_stop();
            if let Err(err) = source.wait_for_stop() {
                log::warn!("{}: {:#}", source.name(), err);
            }
            log::info!("{}: sensor shut down", source.name());
        }
    }

    pub fn state(&self) -> SensorState {
        if self.closed.load(Ordering::SeqCst) {
            return SensorState::Closed;
        }
        if self.setup_error.is_some() {
            return SensorState::Degraded;
        }
        match self.lock_source().as_ref() {
            Some(source) if source.is_running() => SensorState::Running,
            _ => SensorState::Ready,
        }
    }

    pub fn last_error(&self) -> Option<SensorError> {
        self.pipeline.last_error()
    }

    pub fn stats(&self) -> SensorStats {
        self.pipeline.stats()
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    /// Subscribe to owned frame copies. Each subscriber gets a clone; mutating
    /// one (through `Frame::pixels_mut`) never affects the others.
    pub fn on_frame<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        self.pipeline.frames.subscribe(callback)
    }

    /// Subscribe to the per-frame motion classification.
    pub fn on_motion<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.pipeline.motion.subscribe(callback)
    }

    /// Subscribe to face regions. Never fires unless a face locator was installed.
    pub fn on_face<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(FaceRegion) + Send + Sync + 'static,
    {
        if !self.pipeline.has_face_locator() {
            log::debug!("face subscriber registered without a face locator");
        }
        self.pipeline.faces.subscribe(callback)
    }

    pub fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(SensorError) + Send + Sync + 'static,
    {
        self.pipeline.errors.subscribe(callback)
    }

    /// Remove a subscription from whichever channel holds it.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.pipeline.frames.unsubscribe(id)
            || self.pipeline.motion.unsubscribe(id)
            || self.pipeline.faces.unsubscribe(id)
            || self.pipeline.errors.unsubscribe(id)
    }

    fn ensure_usable(&self) -> Result<(), SensorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.fail(SensorError::closed()));
        }
        if let Some(err) = &self.setup_error {
            return Err(self.fail(err.clone()));
        }
        Ok(())
    }

    fn fail(&self, err: SensorError) -> SensorError {
        self.pipeline.report(err.clone());
        err
    }

    fn lock_source(&self) -> MutexGuard<'_, Option<Box<dyn VideoSource>>> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Sensor {
    /// Sensor bound to the first local camera.
    fn default() -> Self {
        Self::local(0)
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Configures a sensor before its source is opened, so that subscribers see
/// faults raised during construction.
pub struct SensorBuilder {
    descriptor: SourceDescriptor,
    capture: CaptureSettings,
    scorer: Option<Box<dyn MotionScorer>>,
    face_locator: Option<Box<dyn FaceLocator>>,
    video_source: Option<Box<dyn VideoSource>>,
    frame_callbacks: Vec<Callback<Frame>>,
    motion_callbacks: Vec<Callback<bool>>,
    face_callbacks: Vec<Callback<FaceRegion>>,
    error_callbacks: Vec<Callback<SensorError>>,
}

impl SensorBuilder {
    fn new(descriptor: SourceDescriptor) -> Self {
        Self {
            descriptor,
            capture: CaptureSettings::default(),
            scorer: None,
            face_locator: None,
            video_source: None,
            frame_callbacks: Vec::new(),
            motion_callbacks: Vec::new(),
            face_callbacks: Vec::new(),
            error_callbacks: Vec::new(),
        }
    }

    pub fn capture(mut self, settings: CaptureSettings) -> Self {
        self.capture = settings;
        self
    }

    /// Replace the default `BackgroundModelScorer`.
    pub fn motion_scorer(mut self, scorer: impl MotionScorer + 'static) -> Self {
        self.scorer = Some(Box::new(scorer));
        self
    }

    pub fn face_locator(mut self, locator: impl FaceLocator + 'static) -> Self {
        self.face_locator = Some(Box::new(locator));
        self
    }

    /// Use `source` instead of opening one from the descriptor.
    pub fn video_source(mut self, source: impl VideoSource + 'static) -> Self {
        self.video_source = Some(Box::new(source));
        self
    }

    pub fn on_frame(mut self, callback: impl Fn(Frame) + Send + Sync + 'static) -> Self {
        self.frame_callbacks.push(Arc::new(callback));
        self
    }

    pub fn on_motion(mut self, callback: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.motion_callbacks.push(Arc::new(callback));
        self
    }

    pub fn on_face(mut self, callback: impl Fn(FaceRegion) + Send + Sync + 'static) -> Self {
        self.face_callbacks.push(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(SensorError) + Send + Sync + 'static) -> Self {
        self.error_callbacks.push(Arc::new(callback));
        self
    }

    /// Build the sensor. Never fails: a source that cannot be built is reported
    /// as a configuration fault and leaves the sensor degraded.
    pub fn build(self) -> Sensor {
        let scorer = self
            .scorer
            .unwrap_or_else(|| Box::new(BackgroundModelScorer::default()));
        let pipeline = Arc::new(Pipeline::new(scorer, self.face_locator));
        for callback in self.frame_callbacks {
            pipeline.frames.subscribe_shared(callback);
        }
        for callback in self.motion_callbacks {
            pipeline.motion.subscribe_shared(callback);
        }
        for callback in self.face_callbacks {
            pipeline.faces.subscribe_shared(callback);
        }
        for callback in self.error_callbacks {
            pipeline.errors.subscribe_shared(callback);
        }

        let source = match self.video_source {
            Some(source) => Ok(source),
            None => open_source(&self.descriptor, &self.capture)
                .context("unable to set up video source"),
        };

        let (source, setup_error) = match source {
            Ok(mut source) => {
                let frames = pipeline.clone();
                source.set_frame_handler(Arc::new(move |view: &FrameView<'_>| {
                    frames.process_frame(view)
                }));
                let errors = pipeline.clone();
                source.set_error_handler(Arc::new(move |err: anyhow::Error| {
                    errors.process_error(err)
                }));
                log::info!("sensor bound to {}", source.name());
                (Some(source), None)
            }
            Err(err) => {
                let err = SensorError::configuration(err);
                pipeline.report(err.clone());
                (None, Some(err))
            }
        };

        Sensor {
            descriptor: self.descriptor,
            pipeline,
            source: Mutex::new(source),
            setup_error,
            pending_stop: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn sensor_is_send_and_sync() {
        assert_send_sync::<Sensor>();
    }

    #[test]
    fn unsupported_url_degrades_sensor() {
        let sensor = Sensor::remote("rtsp://camera.local/stream", "", "");
        assert_eq!(sensor.state(), SensorState::Degraded);
        let last = sensor.last_error().expect("setup error recorded");
        assert_eq!(last.kind(), ErrorKind::ConfigurationFault);

        let err = sensor.stop().expect_err("degraded stop fails");
        assert_eq!(err.kind(), ErrorKind::ConfigurationFault);
        assert_eq!(sensor.stats().errors, 2);
    }

    #[test]
    fn shutdown_is_idempotent_and_closes() {
        let sensor = Sensor::remote("stub://idle", "", "");
        assert_eq!(sensor.state(), SensorState::Ready);
        sensor.shutdown();
        sensor.shutdown();
        assert_eq!(sensor.state(), SensorState::Closed);
        assert_eq!(
            sensor.start().expect_err("closed").kind(),
            ErrorKind::Closed
        );
    }

    #[test]
    fn unsubscribe_finds_any_channel() {
        let sensor = Sensor::remote("stub://idle", "", "");
        let frame = sensor.on_frame(|_| {});
        let error = sensor.on_error(|_| {});
        assert!(sensor.unsubscribe(error));
        assert!(sensor.unsubscribe(frame));
        assert!(!sensor.unsubscribe(frame));
    }
}
