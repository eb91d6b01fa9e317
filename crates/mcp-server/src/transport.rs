//! Transport framer: complete JSON message frames over a single byte
//! stream, plus the serialized outbound write path.
//!
//! Two symmetric framings are supported on one connection, auto-detected
//! from the first non-whitespace bytes received:
//! - newline-delimited JSON (one compact JSON object per line), the default
//! - LSP-style `Content-Length: N\r\n\r\n<json>` headers
//!
//! Framing faults (oversized frame, stream ending mid-frame, malformed
//! header or body) are connection-fatal: the reader surfaces a
//! [`FramingError`] and the connection terminates. They are never turned
//! into per-request error envelopes.

use base64::Engine as _;
use serde::Serialize;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

const MAX_BUFFER_BYTES: usize = if cfg!(test) { 4096 } else { 32 * 1024 * 1024 };
const MAX_FRAME_BYTES: usize = if cfg!(test) { 1024 } else { 16 * 1024 * 1024 };

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Framing {
    Unknown,
    NewlineJson,
    ContentLength,
}

impl Framing {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::NewlineJson,
            2 => Self::ContentLength,
            _ => Self::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::NewlineJson => 1,
            Self::ContentLength => 2,
        }
    }
}

/// Shared between the reader (which detects) and the writer (which encodes).
#[derive(Clone)]
pub struct FramingMode(Arc<AtomicU8>);

impl FramingMode {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(Framing::Unknown.as_u8())))
    }

    pub fn get(&self) -> Framing {
        Framing::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, framing: Framing) {
        self.0.store(framing.as_u8(), Ordering::Release);
    }
}

impl Default for FramingMode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("frame of {len} bytes exceeds the maximum frame size of {max} bytes")]
    Oversized { len: usize, max: usize },

    #[error("stream ended mid-frame ({buffered} bytes buffered)")]
    TruncatedStream { buffered: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

const fn is_ascii_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn strip_utf8_bom(buf: &mut Vec<u8>) {
    const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
    if buf.starts_with(BOM) {
        buf.drain(..BOM.len());
    }
}

fn starts_with_content_length(buf: &[u8]) -> bool {
    const PREFIX: &[u8] = b"content-length:";
    buf.len() >= PREFIX.len() && buf[..PREFIX.len()].eq_ignore_ascii_case(PREFIX)
}

fn find_double_newline(buf: &[u8]) -> Option<usize> {
    // Prefer CRLFCRLF, fall back to LFLF.
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(pos + 4);
    }
    if let Some(pos) = buf.windows(2).position(|w| w == b"\n\n") {
        return Some(pos + 2);
    }
    None
}

fn parse_content_length(headers: &str) -> Option<usize> {
    for raw_line in headers.lines() {
        let line = raw_line.trim_end_matches('\r').trim();
        if line.len() < "content-length:".len() {
            continue;
        }
        if line.as_bytes()[.."content-length:".len()].eq_ignore_ascii_case(b"content-length:") {
            if let Ok(n) = line["content-length:".len()..].trim().parse::<usize>() {
                return Some(n);
            }
        }
    }
    None
}

/// Reads complete frames from the inbound half of the stream.
pub struct FrameReader<R> {
    read: R,
    buf: Vec<u8>,
    mode: FramingMode,
    dump: Option<FrameDumpHandle>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(read: R, mode: FramingMode) -> Self {
        Self {
            read,
            buf: Vec::new(),
            mode,
            dump: frame_dump_from_env(),
        }
    }

    /// Next complete frame payload, or `None` on clean end of stream.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        loop {
            if let Some(frame) = self.try_decode()? {
                return Ok(Some(frame));
            }

            let mut tmp = [0u8; 8192];
            let n = self.read.read(&mut tmp).await?;
            if n == 0 {
                // EOF: one last decode over buffered bytes. Some one-shot
                // runners write a single request and close stdin without a
                // trailing newline; hand that payload up as a final frame.
                if let Some(frame) = self.try_decode()? {
                    return Ok(Some(frame));
                }
                let leftover = self
                    .buf
                    .iter()
                    .filter(|b| !is_ascii_whitespace(**b))
                    .count();
                if leftover == 0 {
                    return Ok(None);
                }
                if self.mode.get() == Framing::NewlineJson {
                    let mut frame = std::mem::take(&mut self.buf);
                    while matches!(frame.first(), Some(b) if is_ascii_whitespace(*b)) {
                        frame.remove(0);
                    }
                    while matches!(frame.last(), Some(b) if is_ascii_whitespace(*b)) {
                        frame.pop();
                    }
                    return Ok(Some(frame));
                }
                return Err(FramingError::TruncatedStream { buffered: leftover });
            }
            if let Some(dump) = self.dump.as_ref() {
                dump.record("rx", &tmp[..n]);
            }
            self.buf.extend_from_slice(&tmp[..n]);
            if self.buf.len() > MAX_BUFFER_BYTES {
                return Err(FramingError::Oversized {
                    len: self.buf.len(),
                    max: MAX_BUFFER_BYTES,
                });
            }
        }
    }

    fn detect_framing(&mut self) {
        if self.mode.get() != Framing::Unknown {
            return;
        }
        strip_utf8_bom(&mut self.buf);
        let first_non_ws = self.buf.iter().position(|b| !is_ascii_whitespace(*b));
        let Some(start) = first_non_ws else {
            return;
        };
        self.buf.drain(..start);
        if starts_with_content_length(&self.buf) {
            self.mode.set(Framing::ContentLength);
        } else {
            self.mode.set(Framing::NewlineJson);
        }
    }

    fn try_decode(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        self.detect_framing();
        match self.mode.get() {
            Framing::Unknown => Ok(None),
            Framing::NewlineJson => self.try_decode_newline(),
            Framing::ContentLength => self.try_decode_content_length(),
        }
    }

    fn try_decode_newline(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        loop {
            let Some(nl) = self.buf.iter().position(|b| *b == b'\n') else {
                if self.buf.len() > MAX_FRAME_BYTES {
                    return Err(FramingError::Oversized {
                        len: self.buf.len(),
                        max: MAX_FRAME_BYTES,
                    });
                }
                return Ok(None);
            };
            let mut line = self.buf.drain(..=nl).collect::<Vec<u8>>();
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }

            // Skip blank lines between frames (compat with chatty clients).
            if line.iter().all(|b| is_ascii_whitespace(*b)) {
                continue;
            }
            if line.len() > MAX_FRAME_BYTES {
                return Err(FramingError::Oversized {
                    len: line.len(),
                    max: MAX_FRAME_BYTES,
                });
            }
            return Ok(Some(line));
        }
    }

    fn try_decode_content_length(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        let Some(header_end) = find_double_newline(&self.buf) else {
            return Ok(None);
        };
        let header_str = std::str::from_utf8(&self.buf[..header_end])
            .map_err(|e| FramingError::Malformed(format!("non-UTF-8 frame header: {e}")))?;
        let Some(len) = parse_content_length(header_str) else {
            return Err(FramingError::Malformed(
                "missing Content-Length header".to_string(),
            ));
        };
        if len > MAX_FRAME_BYTES {
            return Err(FramingError::Oversized {
                len,
                max: MAX_FRAME_BYTES,
            });
        }
        if self.buf.len() < header_end + len {
            return Ok(None);
        }
        let body = self.buf[header_end..header_end + len].to_vec();
        self.buf.drain(..header_end + len);
        Ok(Some(body))
    }
}

/// Encodes one outbound payload for the connection's framing mode.
/// Symmetric with the reader: decoding the encoded bytes yields the
/// payload unchanged.
pub fn encode_frame(payload: &[u8], framing: Framing) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 32);
    match framing {
        Framing::ContentLength => {
            out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
            out.extend_from_slice(payload);
        }
        Framing::Unknown | Framing::NewlineJson => {
            out.extend_from_slice(payload);
            out.push(b'\n');
        }
    }
    out
}

struct WriteRequest {
    bytes: Vec<u8>,
    reply: oneshot::Sender<std::io::Result<()>>,
}

/// Cloneable handle onto the single outbound writer task. Concurrent
/// completions funnel through one mpsc queue, so frames never interleave.
#[derive(Clone)]
pub struct FrameWriter {
    tx: mpsc::Sender<WriteRequest>,
    mode: FramingMode,
}

impl FrameWriter {
    /// Spawns the writer task over `write` and returns the shared handle.
    pub fn spawn<W>(write: W, mode: FramingMode) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<WriteRequest>(16);
        tokio::spawn(run_write_loop(write, rx, frame_dump_from_env()));
        Self { tx, mode }
    }

    /// Serializes `message` and writes it as one frame. Waits for the write
    /// to land (or fail) before returning.
    pub async fn write_message<T: Serialize>(&self, message: &T) -> Result<(), FramingError> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| FramingError::Malformed(format!("unserializable message: {e}")))?;
        let bytes = encode_frame(&payload, self.mode.get());

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WriteRequest {
                bytes,
                reply: reply_tx,
            })
            .await
            .map_err(|_| closed_err())?;
        reply_rx.await.map_err(|_| closed_err())??;
        Ok(())
    }
}

fn closed_err() -> FramingError {
    FramingError::Io(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "write path closed",
    ))
}

async fn run_write_loop<W: AsyncWrite + Unpin>(
    mut write: W,
    mut rx: mpsc::Receiver<WriteRequest>,
    dump: Option<FrameDumpHandle>,
) {
    while let Some(req) = rx.recv().await {
        if let Some(dump) = dump.as_ref() {
            dump.record("tx", &req.bytes);
        }
        let result = async {
            write.write_all(&req.bytes).await?;
            write.flush().await?;
            Ok(())
        }
        .await;
        let should_stop = result.is_err();
        let _ = req.reply.send(result);
        if should_stop {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Frame dumping (debugging aid for harness integrations)
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct FrameDumpHandle(Arc<Mutex<std::fs::File>>);

#[derive(Serialize)]
struct FrameDumpLine<'a> {
    ts_ms: u64,
    dir: &'a str,
    len: usize,
    b64: String,
}

impl FrameDumpHandle {
    fn record(&self, dir: &str, bytes: &[u8]) {
        let Ok(mut file) = self.0.lock() else {
            return;
        };
        let line = FrameDumpLine {
            ts_ms: now_unix_ms(),
            dir,
            len: bytes.len(),
            b64: base64::engine::general_purpose::STANDARD.encode(bytes),
        };
        if let Ok(payload) = serde_json::to_string(&line) {
            let _ = writeln!(file, "{payload}");
        }
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn frame_dump_from_env() -> Option<FrameDumpHandle> {
    let raw_path = std::env::var("FORGELINK_DUMP_FRAMES").ok()?;
    let trimmed = raw_path.trim();
    if trimmed.is_empty() {
        return None;
    }

    let path = PathBuf::from(trimmed);
    let final_path = if path.is_dir() {
        path.join(format!("forgelink_frames_{}.jsonl", std::process::id()))
    } else {
        path
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(final_path)
        .ok()?;
    Some(FrameDumpHandle(Arc::new(Mutex::new(file))))
}
