//! Session Lifecycle Manager
//!
//! Owns at most one live streaming session, scoped to exactly one flattened
//! step. The capture handle and the remote channel live together in a
//! [`SessionHandle`]; dropping the handle releases both, so every exit path
//! (stop, rebind, transport error) tears the session down completely.

use bytes::Bytes;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{Instrument, debug, info, instrument, warn};
use tutor_core::{
    TutorError,
    audio::{CAPTURE_SAMPLE_RATE, OUTBOUND_CHUNK_SAMPLES, OutboundChunker},
    generic_types::{SessionSetup, TransportEvent},
    instructions::InstructionBuilder,
    realtime::{CaptureDevice, CaptureGuard, CaptureStream, RealtimeChannel, RealtimeTransport},
    steps::FlattenedStep,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Active,
    Closed,
}

/// What a start request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is connecting.
    Connecting,
    /// A session is already connecting or active; nothing was opened.
    AlreadyRunning,
    /// A restart after step navigation is already scheduled.
    RestartPending,
    /// The course has no steps, so there is nothing to tutor.
    NoStep,
}

/// Something the session needs the controller to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    Transport(TransportEvent),
    /// The post-navigation pause has elapsed; start a session for the current step.
    RestartDue,
    /// The capture device stopped delivering frames while the session was active.
    CaptureLost,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Pause between stopping a session and opening its replacement.
    pub rebind_delay: Duration,
    /// Samples per outbound PCM16 chunk.
    pub chunk_samples: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            rebind_delay: Duration::from_millis(800),
            chunk_samples: OUTBOUND_CHUNK_SAMPLES,
        }
    }
}

/// Exclusive owner of one session's capture handle and remote channel.
struct SessionHandle {
    id: Uuid,
    bound_step: usize,
    channel: RealtimeChannel,
    /// Held until the remote side accepts, then moved into the forwarder.
    frames: Option<mpsc::Receiver<Vec<f32>>>,
    forwarder: Option<JoinHandle<()>>,
    /// Fires when the forwarder sees the capture stream end.
    capture_lost: Option<oneshot::Receiver<()>>,
    _capture: CaptureGuard,
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

pub struct SessionManager {
    capture: Arc<dyn CaptureDevice>,
    transport: Arc<dyn RealtimeTransport>,
    instructions: InstructionBuilder,
    options: SessionOptions,
    status: SessionStatus,
    handle: Option<SessionHandle>,
    restart_at: Option<Instant>,
}

impl SessionManager {
    pub fn new(
        capture: Arc<dyn CaptureDevice>,
        transport: Arc<dyn RealtimeTransport>,
        instructions: InstructionBuilder,
        options: SessionOptions,
    ) -> Self {
        Self {
            capture,
            transport,
            instructions,
            options,
            status: SessionStatus::Idle,
            handle: None,
            restart_at: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.handle.as_ref().map(|h| h.id)
    }

    /// The step the live session's context was built for.
    pub fn bound_step(&self) -> Option<usize> {
        self.handle.as_ref().map(|h| h.bound_step)
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_at.is_some()
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Connecting | SessionStatus::Active
        )
    }

    pub fn learner_name(&self) -> &str {
        self.instructions.learner_name()
    }

    /// Acquires the microphone and opens a stream scoped to `step`.
    ///
    /// A second call while a session is connecting or active opens nothing.
    #[instrument(skip_all, fields(step = step.global_index))]
    pub async fn start(
        &mut self,
        step: &FlattenedStep,
        total_steps: usize,
    ) -> Result<StartOutcome, TutorError> {
        if self.is_live() {
            warn!(status = ?self.status, "Session already running. Ignoring start.");
            return Ok(StartOutcome::AlreadyRunning);
        }
        self.restart_at = None;
        self.status = SessionStatus::Connecting;

        let capture = match self.capture.open().await {
            Ok(capture) => capture,
            Err(e) => {
                warn!(error = %e, "Could not acquire microphone.");
                self.status = SessionStatus::Closed;
                return Err(e);
            }
        };
        if capture.sample_rate != CAPTURE_SAMPLE_RATE {
            warn!(
                capture_rate = capture.sample_rate,
                wire_rate = CAPTURE_SAMPLE_RATE,
                "Capture rate differs from wire rate; audio is sent without resampling."
            );
        }

        let setup = SessionSetup::voice(self.instructions.build(step, total_steps));
        let channel = match self.transport.connect(setup).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "Realtime transport refused the session.");
                // Dropping `capture` here releases the microphone.
                self.status = SessionStatus::Closed;
                return Err(e);
            }
        };

        let CaptureStream { frames, guard, .. } = capture;
        let id = Uuid::new_v4();
        self.handle = Some(SessionHandle {
            id,
            bound_step: step.global_index,
            channel,
            frames: Some(frames),
            forwarder: None,
            capture_lost: None,
            _capture: guard,
        });
        info!(session_id = %id, "Session connecting.");
        Ok(StartOutcome::Connecting)
    }

    /// Marks the session active and starts forwarding captured audio.
    pub fn activate(&mut self) {
        if self.status != SessionStatus::Connecting {
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        if let Some(mut frames) = handle.frames.take() {
            // Audio captured before acceptance is stale.
            let mut stale = 0usize;
            while frames.try_recv().is_ok() {
                stale += 1;
            }
            if stale > 0 {
                debug!(frames = stale, "Dropped audio captured while connecting.");
            }
            let (lost_tx, lost_rx) = oneshot::channel();
            handle.capture_lost = Some(lost_rx);
            handle.forwarder = Some(spawn_forwarder(
                handle.id,
                frames,
                handle.channel.audio_tx.clone(),
                lost_tx,
                self.options.chunk_samples,
            ));
        }
        self.status = SessionStatus::Active;
        info!(session_id = %handle.id, step = handle.bound_step, "Session active.");
    }

    /// Releases capture and closes the stream. Also cancels a scheduled restart.
    pub fn stop(&mut self) {
        self.restart_at = None;
        self.teardown();
    }

    /// Stops the live session and schedules a restart after the rebind delay.
    ///
    /// Returns `false` when there was nothing to rebind.
    pub fn rebind(&mut self) -> bool {
        if !self.is_live() && self.restart_at.is_none() {
            return false;
        }
        self.teardown();
        self.restart_at = Some(Instant::now() + self.options.rebind_delay);
        debug!(delay = ?self.options.rebind_delay, "Session restart scheduled.");
        true
    }

    /// Waits for the next transport event, a lost capture device or the
    /// restart deadline.
    ///
    /// Never resolves while there is neither a session nor a pending restart.
    pub async fn next_signal(&mut self) -> SessionSignal {
        let restart_at = self.restart_at;
        let signal = {
            let (events, lost) = match self.handle.as_mut() {
                Some(h) => (Some(&mut h.channel.events), Some(&mut h.capture_lost)),
                None => (None, None),
            };
            tokio::select! {
                event = next_transport_event(events) => SessionSignal::Transport(event),
                () = capture_ended(lost) => SessionSignal::CaptureLost,
                () = restart_deadline(restart_at) => SessionSignal::RestartDue,
            }
        };
        if signal == SessionSignal::RestartDue {
            self.restart_at = None;
        }
        signal
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!(session_id = %handle.id, step = handle.bound_step, "Session stopped.");
        }
        if self.status != SessionStatus::Idle {
            self.status = SessionStatus::Closed;
        }
    }
}

async fn next_transport_event(events: Option<&mut mpsc::Receiver<TransportEvent>>) -> TransportEvent {
    match events {
        Some(rx) => rx
            .recv()
            .await
            .unwrap_or(TransportEvent::Closed { reason: None }),
        None => std::future::pending().await,
    }
}

/// Resolves once the forwarder reports that capture ended. A forwarder that
/// exits for any other reason leaves this pending.
async fn capture_ended(lost: Option<&mut Option<oneshot::Receiver<()>>>) {
    let Some(slot) = lost else {
        return std::future::pending().await;
    };
    let Some(rx) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let ended = rx.await.is_ok();
    *slot = None;
    if !ended {
        std::future::pending::<()>().await;
    }
}

async fn restart_deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Forwards captured frames as fixed-size PCM16 chunks, in capture order.
fn spawn_forwarder(
    session_id: Uuid,
    mut frames: mpsc::Receiver<Vec<f32>>,
    audio_tx: mpsc::Sender<Bytes>,
    capture_lost: oneshot::Sender<()>,
    chunk_samples: usize,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut chunker = OutboundChunker::new(chunk_samples);
            let mut sent = 0u64;
            while let Some(frame) = frames.recv().await {
                for chunk in chunker.push(&frame) {
                    if audio_tx.send(chunk).await.is_err() {
                        debug!(chunks = sent, "Transport closed. Stopping audio forwarding.");
                        return;
                    }
                    sent += 1;
                }
            }
            warn!(chunks = sent, "Capture stream ended during the session.");
            let _ = capture_lost.send(());
        }
        .instrument(tracing::info_span!("audio_forwarder", %session_id)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCapture, FakeTransport, sample_steps};
    use async_trait::async_trait;
    use mockall::mock;
    use tutor_core::audio::decode_pcm16_to_f32;

    mock! {
        pub Microphone {}

        #[async_trait]
        impl CaptureDevice for Microphone {
            async fn open(&self) -> Result<CaptureStream, TutorError>;
        }
    }

    fn manager(capture: Arc<dyn CaptureDevice>, transport: Arc<FakeTransport>) -> SessionManager {
        SessionManager::new(
            capture,
            transport,
            InstructionBuilder::default(),
            SessionOptions {
                rebind_delay: Duration::from_millis(800),
                chunk_samples: 4,
            },
        )
    }

    #[tokio::test]
    async fn test_start_is_rejected_while_running() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::default());
        let mut sessions = manager(Arc::new(FakeCapture::available()), transport.clone());

        let first = sessions.start(steps.get(1).unwrap(), steps.len()).await;
        assert_eq!(first, Ok(StartOutcome::Connecting));
        assert_eq!(sessions.status(), SessionStatus::Connecting);

        let second = sessions.start(steps.get(1).unwrap(), steps.len()).await;
        assert_eq!(second, Ok(StartOutcome::AlreadyRunning));

        transport.send_event(0, TransportEvent::Opened).await;
        let signal = sessions.next_signal().await;
        assert_eq!(signal, SessionSignal::Transport(TransportEvent::Opened));
        sessions.activate();

        let third = sessions.start(steps.get(2).unwrap(), steps.len()).await;
        assert_eq!(third, Ok(StartOutcome::AlreadyRunning));
        assert_eq!(transport.connection_count(), 1);
        assert_eq!(sessions.bound_step(), Some(1));
    }

    #[tokio::test]
    async fn test_capture_unavailable_never_connects() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::default());
        let mut microphone = MockMicrophone::new();
        microphone
            .expect_open()
            .times(1)
            .returning(|| Err(TutorError::CaptureUnavailable("NotAllowedError".into())));
        let mut sessions = manager(Arc::new(microphone), transport.clone());

        let result = sessions.start(steps.get(1).unwrap(), steps.len()).await;

        assert!(matches!(result, Err(TutorError::CaptureUnavailable(_))));
        assert_eq!(sessions.status(), SessionStatus::Closed);
        assert_eq!(transport.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_rejection_releases_capture() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::rejecting());
        let capture = Arc::new(FakeCapture::available());
        let mut sessions = manager(capture.clone(), transport.clone());

        let result = sessions.start(steps.get(1).unwrap(), steps.len()).await;

        assert!(matches!(result, Err(TutorError::TransportRejected(_))));
        assert_eq!(sessions.status(), SessionStatus::Closed);
        assert_eq!(capture.released(), 1);
        assert!(sessions.session_id().is_none());
    }

    #[tokio::test]
    async fn test_instructions_are_scoped_to_the_step() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::default());
        let mut sessions = manager(Arc::new(FakeCapture::available()), transport.clone());

        sessions.start(steps.get(2).unwrap(), steps.len()).await.unwrap();

        let setup = transport.setup(0);
        assert!(setup.instructions.contains("step 2 of 8"));
        assert!(setup.instructions.contains("Lesson 1.1"));
    }

    #[tokio::test]
    async fn test_forwarding_starts_on_open_and_preserves_order() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::default());
        let capture = Arc::new(FakeCapture::available());
        let mut sessions = manager(capture.clone(), transport.clone());
        sessions.start(steps.get(1).unwrap(), steps.len()).await.unwrap();

        transport.send_event(0, TransportEvent::Opened).await;
        sessions.next_signal().await;
        sessions.activate();
        assert_eq!(sessions.status(), SessionStatus::Active);

        capture.push(vec![0.1, 0.2, 0.3]).await;
        capture.push(vec![0.4, 0.5, 0.6, 0.7, 0.8]).await;

        let mut audio = transport.take_audio(0);
        let first = decode_pcm16_to_f32(&audio.recv().await.unwrap()).unwrap();
        let second = decode_pcm16_to_f32(&audio.recv().await.unwrap()).unwrap();
        approx::assert_abs_diff_eq!(first[0], 0.1, epsilon = 0.001);
        approx::assert_abs_diff_eq!(first[3], 0.4, epsilon = 0.001);
        approx::assert_abs_diff_eq!(second[0], 0.5, epsilon = 0.001);
        approx::assert_abs_diff_eq!(second[3], 0.8, epsilon = 0.001);
    }

    #[tokio::test]
    async fn test_stop_releases_everything_and_is_idempotent() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::default());
        let capture = Arc::new(FakeCapture::available());
        let mut sessions = manager(capture.clone(), transport.clone());
        sessions.start(steps.get(1).unwrap(), steps.len()).await.unwrap();

        sessions.stop();
        assert_eq!(sessions.status(), SessionStatus::Closed);
        assert_eq!(capture.released(), 1);
        assert!(transport.is_closed(0));

        sessions.stop();
        assert_eq!(sessions.status(), SessionStatus::Closed);
        assert_eq!(capture.released(), 1);
    }

    #[tokio::test]
    async fn test_stop_on_idle_manager_is_a_noop() {
        let transport = Arc::new(FakeTransport::default());
        let mut sessions = manager(Arc::new(FakeCapture::available()), transport);
        sessions.stop();
        assert_eq!(sessions.status(), SessionStatus::Idle);
        assert!(!sessions.rebind());
        assert!(!sessions.restart_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebind_stops_before_restart_is_due() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::default());
        let mut sessions = manager(Arc::new(FakeCapture::available()), transport.clone());
        sessions.start(steps.get(1).unwrap(), steps.len()).await.unwrap();

        let requested = Instant::now();
        assert!(sessions.rebind());
        assert!(transport.is_closed(0));
        assert_eq!(sessions.status(), SessionStatus::Closed);
        assert!(sessions.restart_pending());

        assert_eq!(sessions.next_signal().await, SessionSignal::RestartDue);
        assert!(requested.elapsed() >= Duration::from_millis(800));
        assert!(!sessions.restart_pending());

        sessions.start(steps.get(2).unwrap(), steps.len()).await.unwrap();
        assert_eq!(
            transport.log(),
            vec!["connect open_before=0", "connect open_before=0"]
        );
        assert_eq!(sessions.bound_step(), Some(2));
    }

    #[tokio::test]
    async fn test_audio_captured_while_connecting_is_dropped() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::default());
        let capture = Arc::new(FakeCapture::available());
        let mut sessions = manager(capture.clone(), transport.clone());
        sessions.start(steps.get(1).unwrap(), steps.len()).await.unwrap();

        capture.push(vec![0.9; 8]).await;

        transport.send_event(0, TransportEvent::Opened).await;
        sessions.next_signal().await;
        sessions.activate();
        capture.push(vec![0.25; 4]).await;

        let mut audio = transport.take_audio(0);
        let chunk = decode_pcm16_to_f32(&audio.recv().await.unwrap()).unwrap();
        approx::assert_abs_diff_eq!(chunk[0], 0.25, epsilon = 0.001);
        assert!(audio.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_revoked_capture_is_signalled() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::default());
        let capture = Arc::new(FakeCapture::available());
        let mut sessions = manager(capture.clone(), transport.clone());
        sessions.start(steps.get(1).unwrap(), steps.len()).await.unwrap();
        transport.send_event(0, TransportEvent::Opened).await;
        sessions.next_signal().await;
        sessions.activate();

        capture.revoke();

        let signal = tokio::time::timeout(Duration::from_secs(1), sessions.next_signal())
            .await
            .unwrap();
        assert_eq!(signal, SessionSignal::CaptureLost);
    }

    #[tokio::test]
    async fn test_start_can_be_retried_after_rejection() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::rejecting());
        let capture = Arc::new(FakeCapture::available());
        let mut sessions = manager(capture.clone(), transport.clone());

        let first = sessions.start(steps.get(1).unwrap(), steps.len()).await;
        assert!(matches!(first, Err(TutorError::TransportRejected(_))));

        transport.set_rejecting(false);
        let second = sessions.start(steps.get(1).unwrap(), steps.len()).await;
        assert_eq!(second, Ok(StartOutcome::Connecting));
        assert_eq!(sessions.status(), SessionStatus::Connecting);
        assert_eq!(capture.released(), 1);
    }

    #[tokio::test]
    async fn test_closed_channel_reports_close() {
        let steps = sample_steps();
        let transport = Arc::new(FakeTransport::default());
        let mut sessions = manager(Arc::new(FakeCapture::available()), transport.clone());
        sessions.start(steps.get(1).unwrap(), steps.len()).await.unwrap();

        transport.drop_connection(0);

        assert_eq!(
            sessions.next_signal().await,
            SessionSignal::Transport(TransportEvent::Closed { reason: None })
        );
    }
}
