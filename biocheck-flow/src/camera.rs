use log::{debug, info, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::CameraError;

/// A front-facing video device that can hand out its latest frame as JPEG.
pub trait VideoSource: Send {
    fn open(&mut self) -> Result<(), CameraError>;

    fn grab_jpeg(&mut self) -> Result<Vec<u8>, CameraError>;

    fn close(&mut self);

    /// Checked by the host before a flow starts.
    fn preflight(&self) -> Result<(), CameraError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "camera".to_string()
    }
}

/// Proof that a stream was acquired. Only the controller that issued it
/// accepts it back.
#[derive(Debug, PartialEq, Eq)]
pub struct StreamHandle(u64);

impl StreamHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

pub struct CameraController {
    source: Box<dyn VideoSource>,
    live: Option<u64>,
    next_id: u64,
}

impl CameraController {
    pub fn new(source: Box<dyn VideoSource>) -> Self {
        Self {
            source,
            live: None,
            next_id: 0,
        }
    }

    pub fn acquire(&mut self) -> Result<StreamHandle, CameraError> {
        if let Some(id) = self.live.take() {
            debug!("Releasing stream {} before reacquiring", id);
            self.source.close();
        }

        self.source.open()?;
        self.next_id += 1;
        self.live = Some(self.next_id);
        info!("Camera stream {} open on {}", self.next_id, self.source.describe());

        Ok(StreamHandle(self.next_id))
    }

    pub fn capture_frame(&mut self, handle: &StreamHandle) -> Result<Vec<u8>, CameraError> {
        if self.live != Some(handle.0) {
            return Err(CameraError::NotStreaming);
        }

        let frame = self.source.grab_jpeg()?;
        if frame.is_empty() {
            return Err(CameraError::Capture("empty frame".to_string()));
        }
        debug!("Captured {} byte frame from stream {}", frame.len(), handle.0);

        Ok(frame)
    }

    /// Safe on a stale or already released handle.
    pub fn release(&mut self, handle: &StreamHandle) {
        if self.live == Some(handle.0) {
            self.live = None;
            self.source.close();
            info!("Camera stream {} released", handle.0);
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(id) = self.live.take() {
            self.source.close();
            info!("Camera stream {} released on shutdown", id);
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.live.is_some()
    }

    pub fn preflight(&self) -> Result<(), CameraError> {
        self.source.preflight()
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        if self.live.is_some() {
            warn!("Camera controller dropped with a live stream");
            self.shutdown();
        }
    }
}

/// Serves a JPEG from disk as if it were the live preview. Used by headless
/// hosts that capture the photo themselves.
pub struct StillImageSource {
    path: PathBuf,
    frame: Option<Vec<u8>>,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoSource for StillImageSource {
    fn open(&mut self) -> Result<(), CameraError> {
        let bytes = fs::read(&self.path).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(self.path.display().to_string())
            }
            ErrorKind::NotFound => CameraError::NoDevice,
            _ => CameraError::Unavailable(e.to_string()),
        })?;

        if bytes.is_empty() {
            return Err(CameraError::Unavailable(format!(
                "{} is empty",
                self.path.display()
            )));
        }

        self.frame = Some(bytes);
        Ok(())
    }

    fn grab_jpeg(&mut self) -> Result<Vec<u8>, CameraError> {
        self.frame.clone().ok_or(CameraError::NotStreaming)
    }

    fn close(&mut self) {
        self.frame = None;
    }

    fn preflight(&self) -> Result<(), CameraError> {
        match fs::File::open(&self.path) {
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(
                CameraError::PermissionDenied(self.path.display().to_string()),
            ),
            _ => Ok(()),
        }
    }

    fn describe(&self) -> String {
        format!("still image {}", self.path.display())
    }
}
