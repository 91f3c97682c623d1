//! Remote MJPEG grabber.
//!
//! Connects to an HTTP(S) camera endpoint and decodes JPEG frames in memory:
//! - `multipart/x-mixed-replace` responses are read as a continuous MJPEG stream
//! - any other content type is treated as a snapshot endpoint and re-fetched
//!   once per frame interval
//!
//! Login and password are sent as HTTP basic auth by placing them in the URL
//! user-info. The grabber never reconnects on its own: a read failure ends the
//! acquisition and is reported as a fault.

use std::io::Read;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use url::Url;

use super::{frame_interval, CaptureSettings, FrameGrabber};
use crate::frame::{FrameView, PixelFormat};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const READ_CHUNK_BYTES: usize = 8192;

pub struct MjpegGrabber {
    /// URL with credentials applied. Never logged.
    url: Url,
    /// URL without credentials, for logs and errors.
    display_url: String,
    settings: CaptureSettings,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    pixels: Vec<u8>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    Snapshot,
}

impl MjpegGrabber {
    pub fn new(url: &str, login: &str, password: &str, settings: CaptureSettings) -> Result<Self> {
        let parsed = Url::parse(url).with_context(|| format!("parse camera url '{}'", url))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported camera url scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        let display_url = parsed.to_string();
        let url = with_credentials(parsed, login, password)?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(settings.connect_timeout)
            .timeout_read(settings.read_timeout)
            .build();
        Ok(Self {
            url,
            display_url,
            settings,
            agent,
            stream: None,
            pixels: Vec::new(),
            frame_count: 0,
            last_frame_at: None,
        })
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl FrameGrabber for MjpegGrabber {
    fn name(&self) -> String {
        self.display_url.clone()
    }

    fn connect(&mut self) -> Result<()> {
        let response = self
            .agent
            .request_url("GET", &self.url)
            .call()
            .with_context(|| format!("connect to {}", self.display_url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if content_type.contains("multipart") {
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(response.into_reader())));
        } else {
            self.stream = Some(HttpStream::Snapshot);
        }
        self.last_frame_at = None;
        log::info!(
            "MjpegGrabber: connected to {} ({})",
            self.display_url,
            if content_type.is_empty() {
                "no content type"
            } else {
                content_type.as_str()
            }
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<FrameView<'_>> {
        let min_interval = frame_interval(self.settings.target_fps);
        loop {
            let jpeg_bytes = match self
                .stream
                .as_mut()
                .ok_or_else(|| anyhow!("{} not connected", self.display_url))?
            {
                // A multipart stream must be drained; surplus frames are dropped below.
                HttpStream::Mjpeg(stream) => stream.read_next_jpeg()?,
                HttpStream::Snapshot => {
                    if let Some(last) = self.last_frame_at {
                        let elapsed = last.elapsed();
                        if elapsed < min_interval {
                            thread::sleep(min_interval - elapsed);
                        }
                    }
                    fetch_snapshot(&self.agent, &self.url)?
                }
            };

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let (pixels, width, height) = decode_jpeg(&jpeg_bytes)?;
            self.pixels = pixels;
            self.frame_count += 1;
            self.last_frame_at = Some(now);
            return FrameView::new(&self.pixels, width, height, PixelFormat::Rgb24);
        }
    }

    fn disconnect(&mut self) {
        self.stream = None;
    }
}

fn with_credentials(mut url: Url, login: &str, password: &str) -> Result<Url> {
    if !login.is_empty() {
        url.set_username(login)
            .map_err(|_| anyhow!("camera url cannot carry a login"))?;
    }
    if !password.is_empty() {
        url.set_password(Some(password))
            .map_err(|_| anyhow!("camera url cannot carry a password"))?;
    }
    Ok(url)
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_snapshot(agent: &ureq::Agent, url: &Url) -> Result<Vec<u8>> {
    let response = agent
        .request_url("GET", url)
        .call()
        .context("fetch jpeg snapshot")?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

fn decode_jpeg(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Ok((rgb.into_raw(), width, height))
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|pair| pair == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|pair| pair == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn encode_gray_jpeg(value: u8) -> Vec<u8> {
        let image = image::RgbImage::from_pixel(8, 8, image::Rgb([value, value, value]));
        let mut bytes = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut bytes)
            .encode_image(&image)
            .expect("encode jpeg");
        bytes
    }

    fn test_settings() -> CaptureSettings {
        CaptureSettings {
            target_fps: 0,
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(500),
            ..CaptureSettings::default()
        }
    }

    #[test]
    fn finds_jpeg_between_markers() {
        let buffer = [0x00, 0xFF, 0xD8, 0x11, 0x22, 0xFF, 0xD9, 0x33];
        assert_eq!(find_jpeg_bounds(&buffer), Some((1, 7)));
        assert_eq!(find_jpeg_bounds(&buffer[..6]), None);
    }

    #[test]
    fn credentials_go_into_userinfo() -> Result<()> {
        let url = with_credentials(Url::parse("http://cam.local/video")?, "admin", "s3cret")?;
        assert_eq!(url.username(), "admin");
        assert_eq!(url.password(), Some("s3cret"));

        let anonymous = with_credentials(Url::parse("http://cam.local/video")?, "", "")?;
        assert_eq!(anonymous.username(), "");
        assert_eq!(anonymous.password(), None);
        Ok(())
    }

    #[test]
    fn display_url_hides_credentials() -> Result<()> {
        let grabber =
            MjpegGrabber::new("http://cam.local/video", "admin", "s3cret", test_settings())?;
        assert!(!grabber.name().contains("s3cret"));
        Ok(())
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(MjpegGrabber::new("rtsp://cam.local/video", "", "", test_settings()).is_err());
    }

    #[test]
    fn reads_frames_from_multipart_stream() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().expect("accept");
            let mut request = [0u8; 1024];
            let _ = std::io::Read::read(&mut socket, &mut request);
            let mut body = Vec::new();
            for value in [40u8, 200u8] {
                let jpeg = encode_gray_jpeg(value);
                body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
                body.extend_from_slice(&jpeg);
                body.extend_from_slice(b"\r\n");
            }
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).expect("write header");
            socket.write_all(&body).expect("write body");
        });

        let mut grabber =
            MjpegGrabber::new(&format!("http://{}/video", addr), "", "", test_settings())?;
        grabber.connect()?;

        let first = grabber.next_frame()?;
        assert_eq!((first.width(), first.height()), (8, 8));
        let first_mean = first.pixels().iter().map(|&p| p as u32).sum::<u32>() / 192;
        let second = grabber.next_frame()?;
        let second_mean = second.pixels().iter().map(|&p| p as u32).sum::<u32>() / 192;
        assert!(first_mean < 100 && second_mean > 150);

        assert!(grabber.next_frame().is_err());
        server.join().expect("server thread");
        Ok(())
    }

    #[test]
    fn snapshot_endpoint_is_polled_at_target_rate() -> Result<()> {
        const REQUESTS: usize = 3;
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let server = thread::spawn(move || {
            let jpeg = encode_gray_jpeg(128);
            for _ in 0..REQUESTS {
                let (mut socket, _) = listener.accept().expect("accept");
                let mut request = [0u8; 1024];
                let _ = std::io::Read::read(&mut socket, &mut request);
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    jpeg.len()
                );
                socket.write_all(header.as_bytes()).expect("write header");
                socket.write_all(&jpeg).expect("write body");
            }
        });

        let settings = CaptureSettings {
            target_fps: 5,
            ..test_settings()
        };
        let mut grabber =
            MjpegGrabber::new(&format!("http://{}/snapshot.jpg", addr), "", "", settings)?;
        // connect() spends the first request, each frame one more.
        grabber.connect()?;
        grabber.next_frame()?;
        let first_at = Instant::now();
        grabber.next_frame()?;
        assert!(first_at.elapsed() >= Duration::from_millis(150));
        assert_eq!(grabber.frames_captured(), 2);

        server.join().expect("server thread");
        Ok(())
    }

    #[test]
    fn silent_server_times_out_on_connect() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let server = thread::spawn(move || {
            let (socket, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_millis(1500));
            drop(socket);
        });

        let mut grabber =
            MjpegGrabber::new(&format!("http://{}/video", addr), "", "", test_settings())?;
        assert!(grabber.connect().is_err());
        server.join().expect("server thread");
        Ok(())
    }
}
