//! Network camera backend.
//!
//! Connects to an HTTP camera that either streams MJPEG
//! (`multipart/x-mixed-replace`) or answers each request with one JPEG snapshot.
//! JPEG boundaries in a multipart stream are found by SOI/EOI markers, so the
//! boundary string the camera picked does not matter.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;

use url::Url;

use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on a single socket read; a stalled camera fails the capture.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) struct HttpDevice {
    url: String,
    agent: ureq::Agent,
    stream: HttpStream,
}

enum HttpStream {
    Mjpeg(MjpegReader),
    SingleJpeg,
    Ended,
}

impl HttpDevice {
    pub(crate) fn open(url: &str) -> Result<Self> {
        Self::open_with(url, http_agent(CONNECT_TIMEOUT, READ_TIMEOUT))
    }

    fn open_with(url: &str, agent: ureq::Agent) -> Result<Self> {
        let parsed = Url::parse(url).context("parse camera url")?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(anyhow!("unsupported camera scheme '{}'", other)),
        }
        let response = agent
            .get(url)
            .call()
            .with_context(|| format!("connect to camera {}", url))?;
        let content_type = response.header("Content-Type").unwrap_or("");
        let stream = if content_type.to_lowercase().contains("multipart") {
            HttpStream::Mjpeg(MjpegReader::new(response.into_reader()))
        } else {
            HttpStream::SingleJpeg
        };
        Ok(Self {
            url: url.to_string(),
            agent,
            stream,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let jpeg_bytes = match &mut self.stream {
            HttpStream::Mjpeg(reader) => match reader.read_next_jpeg()? {
                Some(bytes) => bytes,
                None => {
                    log::warn!("HttpDevice: stream from {} ended", self.url);
                    self.stream = HttpStream::Ended;
                    return Ok(None);
                }
            },
            HttpStream::SingleJpeg => fetch_single_jpeg(&self.agent, &self.url)?,
            HttpStream::Ended => return Ok(None),
        };
        decode_jpeg(&jpeg_bytes).map(Some)
    }
}

struct MjpegReader {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegReader {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Next complete JPEG, `None` once the camera closes the stream.
    fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
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

fn http_agent(connect: Duration, read: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(connect)
        .timeout_read(read)
        .build()
}

fn fetch_single_jpeg(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
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

fn decode_jpeg(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    Ok(Frame::new(image.into_rgb8()))
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    #[test]
    fn finds_jpeg_between_markers() {
        let buffer = [0x00, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x03];
        assert_eq!(find_jpeg_bounds(&buffer), Some((1, 7)));
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 0x01]), None);
    }

    #[test]
    fn mjpeg_reader_splits_frames_and_reports_end() -> Result<()> {
        let mut body = Vec::new();
        for payload in [[0xFF, 0xD8, 0xAA, 0xFF, 0xD9], [0xFF, 0xD8, 0xBB, 0xFF, 0xD9]] {
            body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
            body.extend_from_slice(&payload);
            body.extend_from_slice(b"\r\n");
        }
        let mut reader = MjpegReader::new(Box::new(Cursor::new(body)));
        assert_eq!(reader.read_next_jpeg()?, Some(vec![0xFF, 0xD8, 0xAA, 0xFF, 0xD9]));
        assert_eq!(reader.read_next_jpeg()?, Some(vec![0xFF, 0xD8, 0xBB, 0xFF, 0xD9]));
        assert_eq!(reader.read_next_jpeg()?, None);
        Ok(())
    }

    #[test]
    fn stalled_camera_read_times_out() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let camera = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().expect("accept");
            let mut request = [0u8; 1024];
            let _ = conn.read(&mut request);
            conn.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n",
            )
            .expect("write headers");
            std::thread::sleep(Duration::from_secs(2));
        });

        let url = format!("http://{}/stream", addr);
        let agent = http_agent(Duration::from_secs(1), Duration::from_millis(200));
        let mut device = HttpDevice::open_with(&url, agent)?;
        let started = Instant::now();
        assert!(device.next_frame().is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
        camera.join().expect("camera thread");
        Ok(())
    }
}
