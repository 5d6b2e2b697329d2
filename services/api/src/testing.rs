//! In-memory stand-ins for the microphone, the realtime provider and the
//! speaker, shared by the service's unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::mpsc;
use tutor_core::{
    TutorError,
    audio::CAPTURE_SAMPLE_RATE,
    generic_types::{SessionSetup, TransportEvent},
    outline::{CourseOutline, Lesson, QuizQuestion, Section, Step, StepKind},
    playback::{PlaybackBuffer, PlaybackSink},
    realtime::{CaptureDevice, CaptureGuard, CaptureStream, RealtimeChannel, RealtimeTransport},
    steps::StepList,
};

fn step(id: &str, kind: StepKind) -> Step {
    let questions = if kind == StepKind::Quiz {
        vec![
            QuizQuestion {
                id: format!("{id}-q1"),
                question: "Which tool lifts the lash?".into(),
                options: vec!["Shield".into(), "Spoolie".into()],
                correct_index: 0,
            },
            QuizQuestion {
                id: format!("{id}-q2"),
                question: "How long does the perm solution stay on?".into(),
                options: vec!["2 minutes".into(), "8 minutes".into()],
                correct_index: 1,
            },
        ]
    } else {
        Vec::new()
    };
    Step {
        id: id.to_string(),
        title: format!("Step {id}"),
        kind,
        description: format!("Description of {id}"),
        media_url: None,
        prompt: None,
        questions,
    }
}

/// 2 sections × 2 lessons × (lecture, quiz): eight steps, quizzes on even indices.
pub fn sample_outline() -> CourseOutline {
    CourseOutline {
        title: "Lash Lift".into(),
        sections: (1..=2)
            .map(|s| Section {
                title: format!("Section {s}"),
                lessons: (1..=2)
                    .map(|l| Lesson {
                        title: format!("Lesson {s}.{l}"),
                        steps: vec![
                            step(&format!("{s}.{l}.a"), StepKind::Lecture),
                            step(&format!("{s}.{l}.b"), StepKind::Quiz),
                        ],
                    })
                    .collect(),
            })
            .collect(),
    }
}

pub fn sample_steps() -> StepList {
    StepList::from_outline(&sample_outline())
}

pub struct FakeConnection {
    pub setup: SessionSetup,
    events_tx: Option<mpsc::Sender<TransportEvent>>,
    audio_rx: Option<mpsc::Receiver<Bytes>>,
}

/// Records every connection and how many earlier ones were still open at the time.
#[derive(Default)]
pub struct FakeTransport {
    reject: AtomicBool,
    connections: Mutex<Vec<FakeConnection>>,
    log: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn rejecting() -> Self {
        let transport = Self::default();
        transport.reject.store(true, Ordering::SeqCst);
        transport
    }

    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn setup(&self, index: usize) -> SessionSetup {
        self.connections.lock().unwrap()[index].setup.clone()
    }

    pub fn take_audio(&self, index: usize) -> mpsc::Receiver<Bytes> {
        self.connections.lock().unwrap()[index]
            .audio_rx
            .take()
            .expect("audio receiver already taken")
    }

    /// True once the session side has dropped its end of the connection.
    pub fn is_closed(&self, index: usize) -> bool {
        self.connections.lock().unwrap()[index]
            .events_tx
            .as_ref()
            .is_none_or(|tx| tx.is_closed())
    }

    pub async fn send_event(&self, index: usize, event: TransportEvent) {
        let tx = self.connections.lock().unwrap()[index]
            .events_tx
            .clone()
            .expect("connection already dropped");
        tx.send(event).await.expect("session receiver dropped");
    }

    /// Simulates the remote side going away without a close frame.
    pub fn drop_connection(&self, index: usize) {
        self.connections.lock().unwrap()[index].events_tx = None;
    }
}

#[async_trait]
impl RealtimeTransport for FakeTransport {
    async fn connect(&self, setup: SessionSetup) -> Result<RealtimeChannel, TutorError> {
        let mut connections = self.connections.lock().unwrap();
        let open_before = connections
            .iter()
            .filter(|c| c.events_tx.as_ref().is_some_and(|tx| !tx.is_closed()))
            .count();
        self.log
            .lock()
            .unwrap()
            .push(format!("connect open_before={open_before}"));

        if self.reject.load(Ordering::SeqCst) {
            return Err(TutorError::TransportRejected("403 Forbidden".into()));
        }

        let (audio_tx, audio_rx) = mpsc::channel(64);
        let (events_tx, events) = mpsc::channel(64);
        connections.push(FakeConnection {
            setup,
            events_tx: Some(events_tx),
            audio_rx: Some(audio_rx),
        });
        Ok(RealtimeChannel {
            audio_tx,
            events,
            task: tokio::spawn(async {}),
        })
    }
}

/// A microphone that is always granted (or always denied) and counts releases.
pub struct FakeCapture {
    available: bool,
    sample_rate: u32,
    frames_tx: Mutex<Option<mpsc::Sender<Vec<f32>>>>,
    released: Arc<AtomicUsize>,
}

impl FakeCapture {
    pub fn available() -> Self {
        Self {
            available: true,
            sample_rate: CAPTURE_SAMPLE_RATE,
            frames_tx: Mutex::new(None),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn denied() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub async fn push(&self, frame: Vec<f32>) {
        let tx = self
            .frames_tx
            .lock()
            .unwrap()
            .clone()
            .expect("capture not open");
        tx.send(frame).await.expect("capture stream dropped");
    }

    /// Simulates the user withdrawing microphone access mid-stream.
    pub fn revoke(&self) {
        self.frames_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl CaptureDevice for FakeCapture {
    async fn open(&self) -> Result<CaptureStream, TutorError> {
        if !self.available {
            return Err(TutorError::CaptureUnavailable("NotAllowedError".into()));
        }
        let (tx, frames) = mpsc::channel(64);
        *self.frames_tx.lock().unwrap() = Some(tx);
        let released = self.released.clone();
        Ok(CaptureStream {
            sample_rate: self.sample_rate,
            frames,
            guard: CaptureGuard::new(move || {
                released.fetch_add(1, Ordering::SeqCst);
            }),
        })
    }
}

/// A speaker with a hand-driven clock that remembers what it was asked to play.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub now: Arc<Mutex<f64>>,
    pub played: Arc<Mutex<Vec<PlaybackBuffer>>>,
    pub stops: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn set_now(&self, now: f64) {
        *self.now.lock().unwrap() = now;
    }

    pub fn played(&self) -> Vec<PlaybackBuffer> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl PlaybackSink for RecordingSink {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }

    fn play(&mut self, buffer: PlaybackBuffer) {
        self.played.lock().unwrap().push(buffer);
    }

    fn stop_all(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
