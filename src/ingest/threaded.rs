use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};

use super::{FrameGrabber, VideoSource};
use crate::frame::FrameView;

/// Invoked on the acquisition thread for every captured frame.
pub type FrameHandler = Arc<dyn Fn(&FrameView<'_>) + Send + Sync>;

/// Invoked on the acquisition thread when the grabber faults. The thread exits
/// right after the handler returns.
pub type ErrorHandler = Arc<dyn Fn(anyhow::Error) + Send + Sync>;

/// Drives a `FrameGrabber` on a dedicated acquisition thread.
///
/// `start` connects on the caller's thread so connection failures are reported
/// synchronously, then moves the grabber onto the acquisition thread. The thread
/// hands the grabber back when it exits, so the source can be started again.
pub struct ThreadedSource<G: FrameGrabber> {
    name: String,
    grabber: Option<G>,
    worker: Option<JoinHandle<G>>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    on_frame: Option<FrameHandler>,
    on_error: Option<ErrorHandler>,
}

impl<G: FrameGrabber> ThreadedSource<G> {
    pub fn new(grabber: G) -> Self {
        Self {
            name: grabber.name(),
            grabber: Some(grabber),
            worker: None,
            stop: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            on_frame: None,
            on_error: None,
        }
    }

    fn on_acquisition_thread(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| worker.thread().id() == thread::current().id())
    }

    /// Join a finished or stopping worker and take the grabber back.
    fn reclaim(&mut self) -> Result<()> {
        if self.on_acquisition_thread() {
            return Err(anyhow!(
                "{}: cannot join its own acquisition thread",
                self.name
            ));
        }
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let grabber = worker
            .join()
            .map_err(|_| anyhow!("{}: acquisition thread panicked, grabber lost", self.name))?;
        self.grabber = Some(grabber);
        Ok(())
    }
}

impl<G: FrameGrabber> VideoSource for ThreadedSource<G> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_frame_handler(&mut self, handler: FrameHandler) {
        self.on_frame = Some(handler);
    }

    fn set_error_handler(&mut self, handler: ErrorHandler) {
        self.on_error = Some(handler);
    }

    fn start(&mut self) -> Result<()> {
        if self.is_running() && !self.stop.load(Ordering::SeqCst) {
            log::debug!("{}: start requested while running", self.name);
            return Ok(());
        }
        if self.on_acquisition_thread() {
            return Err(anyhow!(
                "{}: cannot restart from its own acquisition thread",
                self.name
            ));
        }
        self.reclaim()?;

        let mut grabber = self
            .grabber
            .take()
            .ok_or_else(|| anyhow!("{}: grabber lost after a previous failure", self.name))?;
        if let Err(err) = grabber.connect() {
            self.grabber = Some(grabber);
            return Err(err.context(format!("connect {}", self.name)));
        }

        self.stop.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let stop = self.stop.clone();
        let running = self.running.clone();
        let on_frame = self.on_frame.clone();
        let on_error = self.on_error.clone();
        let worker = thread::Builder::new()
            .name("sensor-acquisition".to_string())
            .spawn(move || run_acquisition(grabber, stop, running, on_frame, on_error))
            .map_err(|err| {
                self.running.store(false, Ordering::SeqCst);
                err
            })
            .with_context(|| format!("spawn acquisition thread for {}", self.name))?;
        self.worker = Some(worker);

        log::info!("{}: acquisition started", self.name);
        Ok(())
    }

    fn request_stop(&mut self) {
        if self.is_running() {
            log::info!("{}: stop requested", self.name);
        }
        self.stop.store(true, Ordering::SeqCst);
    }

    fn wait_for_stop(&mut self) -> Result<()> {
        if self.on_acquisition_thread() {
            log::debug!("{}: wait_for_stop called from acquisition thread", self.name);
            return Ok(());
        }
        self.reclaim()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl<G: FrameGrabber> Drop for ThreadedSource<G> {
    fn drop(&mut self) {
        self.request_stop();
        if let Err(err) = self.wait_for_stop() {
            log::warn!("{}: {:#}", self.name, err);
        }
    }
}

fn run_acquisition<G: FrameGrabber>(
    mut grabber: G,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    on_frame: Option<FrameHandler>,
    on_error: Option<ErrorHandler>,
) -> G {
    let name = grabber.name();
    let _running = RunningGuard(running);
    while !stop.load(Ordering::SeqCst) {
        let step = panic::catch_unwind(AssertUnwindSafe(|| -> Result<()> {
            let view = grabber.next_frame()?;
            if let Some(handler) = &on_frame {
                handler(&view);
            }
            Ok(())
        }));
        let fault = match step {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err,
            Err(payload) => anyhow!("frame processing panicked: {}", panic_message(&*payload)),
        };

        log::warn!("{}: acquisition fault: {:#}", name, fault);
        // The error handler must see this source as stopping.
        stop.store(true, Ordering::SeqCst);
        if let Some(handler) = &on_error {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(fault))).is_err() {
                log::error!("{}: error handler panicked", name);
            }
        }
        break;
    }
    grabber.disconnect();
    log::info!("{}: acquisition stopped", name);
    grabber
}

/// Clears the running flag when the acquisition thread exits, panic or not.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
