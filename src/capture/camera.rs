use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;

use crate::{
    error::{CameraError, CaptureError},
    models::CameraFacing,
    settings::CaptureOptions,
};

/// What the capture controller asks a backend for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: CameraFacing,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl StreamConstraints {
    pub fn from_options(options: &CaptureOptions, facing: CameraFacing) -> Self {
        Self {
            facing,
            ideal_width: options.ideal_width,
            ideal_height: options.ideal_height,
        }
    }
}

/// Platform camera access. Implementations must not return a partially opened
/// stream: either a working handle or a [`CameraError`].
#[async_trait]
pub trait CameraBackend: Send + Sync {
    async fn open(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn CameraStream>, CameraError>;
}

/// An open camera handle.
pub trait CameraStream: Send {
    fn facing(&self) -> CameraFacing;

    /// Encoded media produced since the previous call. May be empty.
    fn next_chunk(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Releases the device. Called exactly once by the controller.
    fn stop(&mut self);
}

/// Deterministic backend for tests and headless kiosks.
///
/// Each chunk is `[facing, sequence, payload...]`, so tests can check ordering
/// and which camera produced it.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    failure: Arc<Mutex<Option<CameraError>>>,
    open_handles: Arc<AtomicUsize>,
    opened_total: Arc<AtomicUsize>,
    chunk_len: usize,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            failure: Arc::new(Mutex::new(None)),
            open_handles: Arc::new(AtomicUsize::new(0)),
            opened_total: Arc::new(AtomicUsize::new(0)),
            chunk_len: 8,
        }
    }

    /// Makes every following `open` fail with `failure` (`None` heals it).
    pub fn set_failure(&self, failure: Option<CameraError>) {
        let mut guard = match self.failure.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = failure;
    }

    /// Handles currently open. Never exceeds one when driven by the controller.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraBackend for SyntheticCamera {
    async fn open(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn CameraStream>, CameraError> {
        let failure = match self.failure.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(err) = failure {
            return Err(err);
        }

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticStream {
            facing: constraints.facing,
            sequence: 0,
            chunk_len: self.chunk_len,
            open_handles: self.open_handles.clone(),
            stopped: false,
        }))
    }
}

struct SyntheticStream {
    facing: CameraFacing,
    sequence: u8,
    chunk_len: usize,
    open_handles: Arc<AtomicUsize>,
    stopped: bool,
}

impl CameraStream for SyntheticStream {
    fn facing(&self) -> CameraFacing {
        self.facing
    }

    fn next_chunk(&mut self) -> Result<Vec<u8>, CaptureError> {
        if self.stopped {
            return Err(CaptureError::Stream("stream already stopped".into()));
        }
        self.sequence = self.sequence.wrapping_add(1);
        let marker = match self.facing {
            CameraFacing::Front => b'F',
            CameraFacing::Back => b'B',
        };
        let mut chunk = vec![marker, self.sequence];
        chunk.resize(self.chunk_len.max(2), self.sequence);
        Ok(chunk)
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop();
    }
}
