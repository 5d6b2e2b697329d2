//! Seams to the outside world: the streaming AI transport and the local
//! capture device. Implementations live in provider crates and in the service.

use crate::{
    error::TutorError,
    generic_types::{SessionSetup, TransportEvent},
};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};

/// A live, bidirectional streaming connection owned by exactly one session.
///
/// Dropping the channel closes both directions and aborts the provider task.
pub struct RealtimeChannel {
    /// Outbound PCM16 chunks, forwarded in send order.
    pub audio_tx: mpsc::Sender<Bytes>,
    /// Inbound events, in arrival order.
    pub events: mpsc::Receiver<TransportEvent>,
    pub task: JoinHandle<()>,
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Opens step-scoped streaming sessions with a realtime AI provider.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Connects and sends the session setup. Acceptance is reported later as
    /// [`TransportEvent::Opened`] on the returned channel.
    async fn connect(&self, setup: SessionSetup) -> Result<RealtimeChannel, TutorError>;
}

/// Releases the underlying microphone when dropped.
pub struct CaptureGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CaptureGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// An acquired microphone stream.
pub struct CaptureStream {
    pub sample_rate: u32,
    pub frames: mpsc::Receiver<Vec<f32>>,
    pub guard: CaptureGuard,
}

/// A local microphone that can be acquired for one session at a time.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Fails with [`TutorError::CaptureUnavailable`] when access is denied or
    /// the environment has no capture capability.
    async fn open(&self) -> Result<CaptureStream, TutorError>;
}
