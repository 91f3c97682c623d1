//! Synthetic grabber for `stub://` URLs.
//!
//! Renders a static gradient with light sensor noise. Periodically a bright block
//! sweeps across the scene, so motion scoring has something to find:
//! - the first half of each `SCENE_PERIOD` frames is static
//! - the second half shows the moving block
//!
//! `stub://offline` refuses to connect, for exercising failure paths.

use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{frame_interval, CaptureSettings, FrameGrabber};
use crate::frame::{FrameView, PixelFormat};

/// Frames per static/moving cycle.
pub const SCENE_PERIOD: u64 = 40;

const OFFLINE_URL: &str = "stub://offline";
const NOISE_AMPLITUDE: i16 = 2;

pub struct SyntheticGrabber {
    url: String,
    settings: CaptureSettings,
    buffer: Vec<u8>,
    frame_count: u64,
    connected: bool,
    last_frame_at: Option<Instant>,
}

impl SyntheticGrabber {
    pub fn new(url: impl Into<String>, settings: CaptureSettings) -> Self {
        Self {
            url: url.into(),
            settings,
            buffer: Vec::new(),
            frame_count: 0,
            connected: false,
            last_frame_at: None,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn render(&mut self) {
        let width = self.settings.width as usize;
        let height = self.settings.height as usize;
        let mut rng = rand::thread_rng();

        for y in 0..height {
            for x in 0..width {
                let base = ((x * 160) / width.max(1) + 40) as i16;
                let noisy = base + rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
                let value = noisy.clamp(0, 255) as u8;
                let offset = (y * width + x) * 3;
                self.buffer[offset..offset + 3].fill(value);
            }
        }

        let phase = (self.frame_count - 1) % SCENE_PERIOD;
        if phase < SCENE_PERIOD / 2 {
            return;
        }
        // Block covers half of each dimension and sweeps left to right.
        let block_w = (width / 2).max(1);
        let block_h = (height / 2).max(1);
        let steps = (SCENE_PERIOD / 2) as usize;
        let step = (phase - SCENE_PERIOD / 2) as usize;
        let left = (width - block_w) * step / steps.max(1);
        let top = (height - block_h) / 2;
        for y in top..top + block_h {
            for x in left..left + block_w {
                let offset = (y * width + x) * 3;
                self.buffer[offset..offset + 3].copy_from_slice(&[250, 250, 250]);
            }
        }
    }
}

impl FrameGrabber for SyntheticGrabber {
    fn name(&self) -> String {
        self.url.clone()
    }

    fn connect(&mut self) -> Result<()> {
        if self.url == OFFLINE_URL {
            return Err(anyhow!("synthetic source {} is offline", self.url));
        }
        let len = PixelFormat::Rgb24
            .frame_len(self.settings.width, self.settings.height)
            .filter(|&len| len > 0)
            .ok_or_else(|| {
                anyhow!(
                    "invalid synthetic frame size {}x{}",
                    self.settings.width,
                    self.settings.height
                )
            })?;
        self.buffer = vec![0u8; len];
        self.connected = true;
        log::info!("SyntheticGrabber: connected to {} (synthetic)", self.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<FrameView<'_>> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} not connected", self.url));
        }
        let min_interval = frame_interval(self.settings.target_fps);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                thread::sleep(min_interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
        self.frame_count += 1;
        self.render();
        FrameView::new(
            &self.buffer,
            self.settings.width,
            self.settings.height,
            PixelFormat::Rgb24,
        )
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
