//! Frame snapshots.
//!
//! - `FrameView`: borrowed view of a grabber's internal buffer. Valid only for one
//!   delivery callback; the grabber may overwrite the buffer once it returns.
//! - `Frame`: owned snapshot built by copying a view. This is the only frame type
//!   subscribers ever see.
//!
//! `Frame` pixel storage is reference counted and copy-on-write. Cloning a frame
//! for each subscriber is cheap, and a subscriber that mutates its frame through
//! `pixels_mut` detaches its own copy first, so other subscribers and the motion
//! scorer never observe the change.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::ingest::normalize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed 8-bit RGB.
    Rgb24,
    /// 8-bit luma only.
    Gray8,
    /// Y plane followed by interleaved half-resolution UV plane.
    Nv12,
}

impl PixelFormat {
    /// Expected buffer length for a frame of the given size.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Gray8 => Some(pixels),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
        }
    }
}

/// Borrowed frame as produced by a grabber.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl<'a> FrameView<'a> {
    /// Wrap a pixel buffer, checking its length against the declared geometry.
    pub fn new(pixels: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero ({}x{})", width, height));
        }
        let expected = format
            .frame_len(width, height)
            .ok_or_else(|| anyhow!("frame dimensions overflow ({}x{})", width, height))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                format,
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            format,
        })
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

/// Owned frame snapshot delivered to subscribers.
#[derive(Clone)]
pub struct Frame {
    pixels: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: u64,
}

impl Frame {
    /// Build a frame from an owned buffer.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        FrameView::new(&pixels, width, height, format)?;
        Ok(Self {
            pixels: Arc::new(pixels),
            width,
            height,
            format,
            sequence: 0,
        })
    }

    /// Copy a borrowed view into an independent snapshot.
    pub fn copy_from(view: &FrameView<'_>, sequence: u64) -> Self {
        Self {
            pixels: Arc::new(view.pixels.to_vec()),
            width: view.width,
            height: view.height,
            format: view.format,
            sequence,
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            pixels: &self.pixels,
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable pixel access. Detaches this frame from any other holder first.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.pixels).as_mut_slice()
    }

    pub fn into_pixels(self) -> Vec<u8> {
        Arc::try_unwrap(self.pixels).unwrap_or_else(|shared| shared.as_ref().clone())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Position of this frame in its sensor's delivery order, starting at 1.
    /// Frames built with `Frame::new` have sequence 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True when both frames share the same pixel storage.
    pub fn shares_pixels_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    /// Luma plane, one byte per pixel.
    pub fn to_luma(&self) -> Vec<u8> {
        normalize::to_luma(&self.view())
    }

    /// Packed RGB24 copy of this frame.
    pub fn to_rgb(&self) -> Vec<u8> {
        normalize::to_rgb(&self.view())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
