use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acquire::AcquireError;
use crate::types::ImageFile;

pub const CAPTURE_FILE_NAME: &str = "capture.jpg";

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const READ_CHUNK_BYTES: usize = 16 * 1024;

/// A capture command that writes an MJPEG stream to stdout, e.g. ffmpeg
/// reading a V4L2 device.
#[derive(Debug, Clone)]
pub struct CameraDevice {
    program: String,
    args: Vec<String>,
    max_frame_bytes: usize,
    active_tracks: Arc<AtomicUsize>,
}

impl CameraDevice {
    pub fn new(program: impl Into<String>, args: Vec<String>, max_frame_bytes: usize) -> Self {
        Self {
            program: program.into(),
            args,
            max_frame_bytes: max_frame_bytes.max(2 * JPEG_SOI.len()),
            active_tracks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_command(words: &[String], max_frame_bytes: usize) -> Result<Self, AcquireError> {
        let (program, args) = words.split_first().ok_or_else(|| {
            AcquireError::CameraAccess("no camera command configured".to_string())
        })?;
        Ok(Self::new(program.clone(), args.to_vec(), max_frame_bytes))
    }

    /// Number of sessions whose capture process has not been released yet.
    pub fn active_tracks(&self) -> usize {
        self.active_tracks.load(Ordering::SeqCst)
    }

    /// Starts the capture process and a task that keeps only its newest
    /// frame, so the pipe never backs up.
    pub fn open(&self) -> Result<CameraSession, AcquireError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AcquireError::CameraAccess(format!("{}: {}", self.program, err)))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            return Err(AcquireError::CameraAccess(
                "camera process has no stdout".to_string(),
            ));
        };

        let (sender, frames) = watch::channel(LiveFrame::default());
        let reader = tokio::spawn(publish_frames(
            MjpegFrameReader::new(stdout, self.max_frame_bytes),
            sender,
        ));

        self.active_tracks.fetch_add(1, Ordering::SeqCst);
        info!(program = %self.program, pid = ?child.id(), "Camera stream started");

        Ok(CameraSession {
            child,
            reader,
            frames,
            track: TrackGuard {
                active_tracks: Arc::clone(&self.active_tracks),
                released: false,
            },
        })
    }
}

#[derive(Debug, Default)]
struct LiveFrame {
    latest: Option<Vec<u8>>,
    failure: Option<String>,
}

async fn publish_frames<R: AsyncRead + Unpin>(
    mut frames: MjpegFrameReader<R>,
    sender: watch::Sender<LiveFrame>,
) {
    loop {
        match frames.next_frame().await {
            Ok(frame) => sender.send_modify(|live| live.latest = Some(frame)),
            Err(err) => {
                let message = match err {
                    AcquireError::CaptureFailed(message) => message,
                    other => other.to_string(),
                };
                debug!("Camera stream stopped delivering frames: {message}");
                sender.send_modify(|live| live.failure = Some(message));
                return;
            }
        }
    }
}

/// Waits until the stream has produced a frame and returns the newest one.
/// A stream that ended after frames still yields its last frame.
async fn newest_frame(frames: &mut watch::Receiver<LiveFrame>) -> Result<Vec<u8>, AcquireError> {
    let live = frames
        .wait_for(|live| live.latest.is_some() || live.failure.is_some())
        .await
        .map_err(|_| AcquireError::CaptureFailed("camera stream closed".to_string()))?;
    if let Some(frame) = &live.latest {
        return Ok(frame.clone());
    }
    Err(AcquireError::CaptureFailed(
        live.failure
            .clone()
            .unwrap_or_else(|| "camera stream closed".to_string()),
    ))
}

struct TrackGuard {
    active_tracks: Arc<AtomicUsize>,
    released: bool,
}

impl TrackGuard {
    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.active_tracks.fetch_sub(1, Ordering::SeqCst);
        true
    }
}

/// A live camera stream. Released by `stop`, by `capture`, or on drop.
pub struct CameraSession {
    child: Child,
    reader: JoinHandle<()>,
    frames: watch::Receiver<LiveFrame>,
    track: TrackGuard,
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("pid", &self.child.id())
            .field("released", &self.track.released)
            .finish()
    }
}

impl CameraSession {
    pub fn stop(mut self) {
        self.release();
    }

    /// Returns the frame the camera is showing now. Frames produced before
    /// the newest one are never returned.
    pub async fn capture(mut self, cancel: &CancellationToken) -> Result<ImageFile, AcquireError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AcquireError::Cancelled),
            frame = newest_frame(&mut self.frames) => frame,
        };
        self.release();

        let frame = result?;
        debug!("Captured camera frame of {} bytes", frame.len());
        Ok(ImageFile::new(
            general_purpose::STANDARD.encode(&frame),
            "image/jpeg",
            CAPTURE_FILE_NAME,
        ))
    }

    fn release(&mut self) {
        if !self.track.release() {
            return;
        }
        self.reader.abort();
        if let Err(err) = self.child.start_kill() {
            // The process may already have exited on its own.
            debug!("Camera process kill returned: {err}");
        }
        info!(pid = ?self.child.id(), "Camera stream stopped");
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pulls complete JPEG frames out of a byte stream. Marker segments are
/// skipped by their length, so an EXIF thumbnail's end marker does not end
/// the frame. Scanning resumes where the previous read stopped.
pub struct MjpegFrameReader<R> {
    reader: R,
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    // Offset of the next unparsed byte of the frame at the buffer start;
    // zero until an SOI has been found.
    scan_pos: usize,
    in_entropy_data: bool,
}

impl<R: AsyncRead + Unpin> MjpegFrameReader<R> {
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            max_frame_bytes,
            scan_pos: 0,
            in_entropy_data: false,
        }
    }

    pub async fn next_frame(&mut self) -> Result<Vec<u8>, AcquireError> {
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(frame);
            }
            if self.buffer.len() > self.max_frame_bytes {
                warn!(
                    "Discarding camera data: no frame end within {} bytes",
                    self.max_frame_bytes
                );
                self.buffer.clear();
                self.reset_scan();
                return Err(AcquireError::CaptureFailed(format!(
                    "frame exceeded {} bytes",
                    self.max_frame_bytes
                )));
            }

            let read = self
                .reader
                .read(&mut chunk)
                .await
                .map_err(|err| AcquireError::CaptureFailed(err.to_string()))?;
            if read == 0 {
                return Err(AcquireError::CaptureFailed(
                    "camera stream ended before a full frame".to_string(),
                ));
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    fn reset_scan(&mut self) {
        self.scan_pos = 0;
        self.in_entropy_data = false;
    }

    fn take_frame(&mut self) -> Option<Vec<u8>> {
        if self.scan_pos == 0 {
            let Some(start) = find_soi(&self.buffer) else {
                // A trailing 0xFF may be the first half of the next SOI.
                let keep = usize::from(self.buffer.last() == Some(&0xFF));
                let discard = self.buffer.len() - keep;
                self.buffer.drain(..discard);
                return None;
            };
            self.buffer.drain(..start);
            self.scan_pos = JPEG_SOI.len();
            self.in_entropy_data = false;
        }

        let end = self.scan_to_frame_end()?;
        self.reset_scan();
        Some(self.buffer.drain(..end).collect())
    }

    /// Advances `scan_pos` through the buffered frame. Returns the frame
    /// length once its EOI is found.
    fn scan_to_frame_end(&mut self) -> Option<usize> {
        let buffer = &self.buffer;
        loop {
            let pos = self.scan_pos;
            if pos >= buffer.len() {
                return None;
            }

            if self.in_entropy_data {
                let Some(offset) = buffer[pos..].iter().position(|&byte| byte == 0xFF) else {
                    self.scan_pos = buffer.len();
                    return None;
                };
                let at = pos + offset;
                let Some(&next) = buffer.get(at + 1) else {
                    self.scan_pos = at;
                    return None;
                };
                match next {
                    0xD9 => return Some(at + 2),
                    // Stuffed byte or restart marker.
                    0x00 | 0xD0..=0xD7 => self.scan_pos = at + 2,
                    0xFF => self.scan_pos = at + 1,
                    _ => {
                        self.scan_pos = at;
                        self.in_entropy_data = false;
                    }
                }
                continue;
            }

            if buffer[pos] != 0xFF {
                // Not a marker where one should be; fall back to scanning.
                self.in_entropy_data = true;
                continue;
            }
            let marker = *buffer.get(pos + 1)?;
            match marker {
                0xD9 => return Some(pos + 2),
                0xFF => self.scan_pos = pos + 1,
                0x01 | 0xD0..=0xD8 => self.scan_pos = pos + 2,
                0x00 => {
                    self.scan_pos = pos + 2;
                    self.in_entropy_data = true;
                }
                _ => {
                    let length = buffer.get(pos + 2..pos + 4)?;
                    let length = usize::from(u16::from_be_bytes([length[0], length[1]]));
                    if length < 2 {
                        self.scan_pos = pos + 2;
                        self.in_entropy_data = true;
                        continue;
                    }
                    self.scan_pos = pos + 2 + length;
                    // Start of scan: compressed data follows the header.
                    if marker == 0xDA {
                        self.in_entropy_data = true;
                    }
                }
            }
        }
    }
}

fn find_soi(haystack: &[u8]) -> Option<usize> {
    haystack.windows(2).position(|window| window == JPEG_SOI)
}
