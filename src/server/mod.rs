//! Minimal HTTP front end for a frame source.
//!
//! Routes (all `GET`, no authentication):
//! - `/video_feed`: endless MJPEG stream, one session per connection
//! - `/snapshot`: one JPEG, or `404 Image Not Found`
//! - `/health`: source status as JSON
//! - `/control/{capture,timestamp,fps,cycle,index,region,stop}`: control surface
//!
//! Every connection gets its own thread so a long-lived stream never blocks
//! other clients.

use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::parse_flag;
use crate::encode::{FrameEncoder, JpegFrameEncoder, DEFAULT_JPEG_QUALITY};
use crate::frame::Region;
use crate::source::FrameSource;
use crate::stream::{fetch_one_frame_with, Cycle, MjpegStream, STREAM_CONTENT_TYPE};

const MAX_REQUEST_BYTES: usize = 8192;
const STREAM_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: String,
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    active_streams: Arc<AtomicUsize>,
    join: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Number of `/video_feed` sessions currently running.
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    /// Stop accepting connections and end open streams at their next cycle.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream server thread panicked"))?;
        }
        Ok(())
    }
}

struct ServerContext {
    source: Option<Arc<FrameSource>>,
    encoder: Arc<JpegFrameEncoder>,
    shutdown: Arc<AtomicBool>,
    active_streams: Arc<AtomicUsize>,
}

pub struct StreamServer {
    cfg: ServerConfig,
    source: Option<Arc<FrameSource>>,
}

impl StreamServer {
    /// `source` may be `None` when it failed to open; streams are then empty.
    pub fn new(cfg: ServerConfig, source: Option<Arc<FrameSource>>) -> Self {
        Self { cfg, source }
    }

    pub fn spawn(self) -> Result<ServerHandle> {
        let encoder = Arc::new(JpegFrameEncoder::new(self.cfg.jpeg_quality)?);
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let active_streams = Arc::new(AtomicUsize::new(0));
        let ctx = Arc::new(ServerContext {
            source: self.source,
            encoder,
            shutdown: shutdown.clone(),
            active_streams: active_streams.clone(),
        });
        let join = std::thread::spawn(move || {
            if let Err(err) = run_server(listener, ctx) {
                log::error!("stream server stopped: {}", err);
            }
        });

        Ok(ServerHandle {
            addr,
            shutdown,
            active_streams,
            join: Some(join),
        })
    }
}

fn run_server(listener: TcpListener, ctx: Arc<ServerContext>) -> Result<()> {
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &ctx) {
                        log::warn!("request from {} failed: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &ServerContext) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, &json!({"error": "method_not_allowed"}))?;
        return Ok(());
    }
    match request.path.as_str() {
        "/video_feed" => serve_stream(stream, ctx),
        "/snapshot" => serve_snapshot(&mut stream, ctx),
        "/health" => serve_health(&mut stream, ctx),
        path if path.starts_with("/control/") => serve_control(&mut stream, ctx, &request),
        _ => write_json_response(&mut stream, 404, &json!({"error": "not_found"})),
    }
}

fn serve_stream(mut stream: TcpStream, ctx: &ServerContext) -> Result<()> {
    let _session_slot = StreamSlot::acquire(&ctx.active_streams);
    stream.set_write_timeout(Some(STREAM_WRITE_TIMEOUT))?;
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        STREAM_CONTENT_TYPE
    );
    stream.write_all(header.as_bytes())?;

    let encoder: Arc<dyn FrameEncoder> = ctx.encoder.clone();
    let mut session = MjpegStream::new(ctx.source.clone(), encoder);
    let peer = stream.peer_addr()?;
    log::info!("stream opened for {}", peer);
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match session.poll_cycle() {
            Cycle::Part(part) => {
                if let Err(err) = stream.write_all(&part).and_then(|_| stream.flush()) {
                    log::debug!("stream to {} closed: {}", peer, err);
                    break;
                }
            }
            Cycle::Idle => {
                if client_gone(&stream) {
                    log::debug!("stream to {} closed while idle", peer);
                    break;
                }
            }
            Cycle::Ended => break,
        }
    }
    log::info!(
        "stream closed for {} after {} frames",
        peer,
        session.parts_sent()
    );
    Ok(())
}

/// Holds one slot of the active stream count until dropped.
struct StreamSlot<'a>(&'a AtomicUsize);

impl<'a> StreamSlot<'a> {
    fn acquire(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for StreamSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Idle cycles write nothing, so a departed client only shows up on a read.
/// EOF or a socket error means it is gone; pending bytes or `WouldBlock` do not.
fn client_gone(stream: &TcpStream) -> bool {
    if stream.set_nonblocking(true).is_err() {
        return true;
    }
    let mut byte = [0u8; 1];
    let gone = match stream.peek(&mut byte) {
        Ok(0) => true,
        Ok(_) => false,
        Err(err) => !matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
        ),
    };
    gone || stream.set_nonblocking(false).is_err()
}

fn serve_snapshot(stream: &mut TcpStream, ctx: &ServerContext) -> Result<()> {
    let jpeg = ctx
        .source
        .as_deref()
        .and_then(|source| fetch_one_frame_with(source, ctx.encoder.as_ref()));
    match jpeg {
        Some(bytes) => write_response(
            stream,
            200,
            "image/jpeg",
            &[("Content-Disposition", "attachment; filename=snapshot.jpg")],
            &bytes,
        ),
        None => write_response(stream, 404, "text/plain", &[], b"Image Not Found"),
    }
}

fn serve_health(stream: &mut TcpStream, ctx: &ServerContext) -> Result<()> {
    let body = match &ctx.source {
        Some(source) => json!({"status": "ok", "source": source.stats()}),
        None => json!({"status": "no_source"}),
    };
    write_json_response(stream, 200, &body)
}

fn serve_control(
    stream: &mut TcpStream,
    ctx: &ServerContext,
    request: &HttpRequest,
) -> Result<()> {
    let Some(source) = ctx.source.as_deref() else {
        return write_json_response(stream, 503, &json!({"error": "no_source"}));
    };
    let action = request.path.trim_start_matches("/control/");
    match apply_control(source, action, &request.query) {
        Ok(()) => write_json_response(stream, 200, &json!({"status": "ok", "source": source.stats()})),
        Err(ControlError::UnknownAction) => {
            write_json_response(stream, 404, &json!({"error": "not_found"}))
        }
        Err(ControlError::Rejected(err)) => write_json_response(
            stream,
            400,
            &json!({"error": "bad_request", "detail": format!("{:#}", err)}),
        ),
    }
}

enum ControlError {
    UnknownAction,
    Rejected(anyhow::Error),
}

impl From<anyhow::Error> for ControlError {
    fn from(err: anyhow::Error) -> Self {
        ControlError::Rejected(err)
    }
}

fn apply_control(
    source: &FrameSource,
    action: &str,
    query: &HashMap<String, String>,
) -> std::result::Result<(), ControlError> {
    match action {
        "capture" => source.set_capture_enabled(flag_param(query, "enabled")?),
        "timestamp" => source.set_show_timestamp(flag_param(query, "enabled")?),
        "fps" => source.set_frames_per_second(number_param(query, "value")?)?,
        "cycle" => source.set_test_mode(number_param(query, "length")?)?,
        "index" => source.set_next_frame_index(number_param(query, "value")?)?,
        "region" => {
            let region = if query.is_empty() {
                None
            } else {
                Some(Region::new(
                    number_param(query, "x")?,
                    number_param(query, "y")?,
                    number_param(query, "width")?,
                    number_param(query, "height")?,
                ))
            };
            source.set_capture_region(region)?;
        }
        "stop" => source.stop(),
        _ => return Err(ControlError::UnknownAction),
    }
    Ok(())
}

fn flag_param(query: &HashMap<String, String>, key: &str) -> Result<bool> {
    let value = query
        .get(key)
        .ok_or_else(|| anyhow!("missing '{}' parameter", key))?;
    parse_flag(value).ok_or_else(|| anyhow!("'{}' must be true or false", key))
}

fn number_param<T: std::str::FromStr>(query: &HashMap<String, String>, key: &str) -> Result<T> {
    let value = query
        .get(key)
        .ok_or_else(|| anyhow!("missing '{}' parameter", key))?;
    value
        .parse()
        .map_err(|_| anyhow!("'{}' must be a non-negative integer", key))
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let (path, query) = raw_path.split_once('?').unwrap_or((raw_path, ""));
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query: parse_query(query),
    })
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &[], &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    extra_headers: &[(&str, &str)],
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let mut header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    for (name, value) in extra_headers {
        header.push_str(&format!("{}: {}\r\n", name, value));
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
}
