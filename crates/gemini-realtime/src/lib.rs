//! Gemini Live realtime transport.
//!
//! Connects to the Gemini `BidiGenerateContent` WebSocket, sends the
//! step-scoped setup, then runs a background task that forwards microphone
//! chunks out and translates server messages into [`TransportEvent`]s.

pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{Instrument, debug, error, info, warn};
use tutor_core::{
    TutorError, audio,
    generic_types::{Modality, SessionSetup, TransportEvent},
    realtime::{RealtimeChannel, RealtimeTransport},
    transcript::Speaker,
};
use types::{
    AudioTranscriptionConfig, BidiGenerateContentRealtimeInput, BidiGenerateContentSetup, Blob,
    ClientMessage, Content, GenerationConfig, Part, PrebuiltVoiceConfig, ResponseModality,
    ServerMessage, SpeechConfig, VoiceConfig,
};

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";

const AUDIO_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for the Gemini Live API.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub voice: Option<String>,
}

impl GeminiConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            voice: None,
        }
    }

    /// The API expects fully qualified `models/...` names.
    pub fn qualified_model(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

/// A [`RealtimeTransport`] backed by the Gemini Live API.
#[derive(Debug, Clone)]
pub struct GeminiLiveTransport {
    config: GeminiConfig,
}

impl GeminiLiveTransport {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RealtimeTransport for GeminiLiveTransport {
    async fn connect(&self, setup: SessionSetup) -> Result<RealtimeChannel, TutorError> {
        let url = format!("{}?key={}", self.config.endpoint, self.config.api_key);
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| TutorError::TransportRejected(format!("connect failed: {e}")))?;
        info!(model = %self.config.qualified_model(), "Connected to Gemini Live WebSocket.");
        let (mut ws_tx, ws_rx) = ws_stream.split();

        let setup_msg = build_setup(&self.config, &setup);
        let payload = serde_json::to_string(&setup_msg)
            .map_err(|e| TutorError::TransportRejected(format!("invalid setup: {e}")))?;
        ws_tx
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| TutorError::TransportRejected(format!("setup not sent: {e}")))?;

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mime_type = format!("audio/pcm;rate={}", setup.audio_format.input_sample_rate);

        let task = tokio::spawn(
            async move {
                if let Err(e) = run(ws_tx, ws_rx, audio_rx, events_tx.clone(), mime_type).await {
                    error!(error = ?e, "Gemini Live task failed");
                    let _ = events_tx.send(TransportEvent::Error(e.to_string())).await;
                }
            }
            .instrument(tracing::info_span!("gemini_live")),
        );

        Ok(RealtimeChannel {
            audio_tx,
            events: events_rx,
            task,
        })
    }
}

/// Builds the `setup` message that opens a session.
pub fn build_setup(config: &GeminiConfig, setup: &SessionSetup) -> ClientMessage {
    let response_modalities = setup
        .output_modalities
        .iter()
        .map(|m| match m {
            Modality::Text => ResponseModality::Text,
            Modality::Audio => ResponseModality::Audio,
        })
        .collect();
    let speech_config = config.voice.as_ref().map(|voice| SpeechConfig {
        voice_config: VoiceConfig {
            prebuilt_voice_config: PrebuiltVoiceConfig {
                voice_name: voice.clone(),
            },
        },
    });

    ClientMessage::Setup(BidiGenerateContentSetup {
        model: config.qualified_model(),
        generation_config: GenerationConfig {
            response_modalities,
            speech_config,
        },
        system_instruction: Content {
            parts: vec![Part {
                text: setup.instructions.clone(),
            }],
        },
        input_audio_transcription: AudioTranscriptionConfig::default(),
        output_audio_transcription: AudioTranscriptionConfig::default(),
    })
}

/// Wraps one PCM16 chunk in a `realtimeInput` message.
pub fn build_audio_input(pcm16: &[u8], mime_type: &str) -> ClientMessage {
    ClientMessage::RealtimeInput(BidiGenerateContentRealtimeInput {
        audio: Blob {
            mime_type: mime_type.to_string(),
            data: audio::encode_pcm16_to_base64(pcm16),
        },
    })
}

/// Maps one server message to transport events, in the order they should be applied.
pub fn translate_server_message(message: ServerMessage) -> Vec<TransportEvent> {
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(TransportEvent::Opened);
    }
    if let Some(go_away) = message.go_away {
        warn!(time_left = ?go_away.time_left, "Gemini Live announced disconnect");
    }

    let Some(content) = message.server_content else {
        return events;
    };

    if content.interrupted == Some(true) {
        events.push(TransportEvent::Interrupted);
    }
    if let Some(input) = content.input_transcription {
        if !input.text.is_empty() {
            events.push(TransportEvent::Transcript {
                speaker: Speaker::Human,
                text: input.text,
            });
        }
    }
    let has_output_transcription = content.output_transcription.is_some();
    if let Some(turn) = content.model_turn {
        for part in turn.parts.into_iter().filter(|p| !p.thought) {
            if let Some(blob) = part.inline_data {
                events.push(TransportEvent::AudioChunk(blob.data));
            }
            if let Some(text) = part.text {
                if !has_output_transcription && !text.is_empty() {
                    events.push(TransportEvent::Transcript {
                        speaker: Speaker::Assistant,
                        text,
                    });
                }
            }
        }
    }
    if let Some(output) = content.output_transcription {
        if !output.text.is_empty() {
            events.push(TransportEvent::Transcript {
                speaker: Speaker::Assistant,
                text: output.text,
            });
        }
    }
    if content.turn_complete == Some(true) {
        events.push(TransportEvent::TurnComplete);
    }
    events
}

/// Proxies audio out and server messages in until either side closes.
async fn run(
    mut ws_tx: SplitSink<WsStream, WsMessage>,
    mut ws_rx: SplitStream<WsStream>,
    mut audio_rx: mpsc::Receiver<Bytes>,
    events_tx: mpsc::Sender<TransportEvent>,
    mime_type: String,
) -> Result<()> {
    loop {
        tokio::select! {
            chunk = audio_rx.recv() => {
                let Some(pcm16) = chunk else {
                    debug!("Audio channel closed. Closing Gemini Live socket.");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    return Ok(());
                };
                let payload = serde_json::to_string(&build_audio_input(&pcm16, &mime_type))?;
                ws_tx.send(WsMessage::Text(payload.into())).await?;
            },
            msg = ws_rx.next() => {
                let parsed = match msg {
                    Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<ServerMessage>(&text),
                    Some(Ok(WsMessage::Binary(data))) => serde_json::from_slice::<ServerMessage>(&data),
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = frame.map(|f| format!("{} {}", f.code, f.reason));
                        warn!(?reason, "Gemini Live WebSocket closed by server.");
                        let _ = events_tx.send(TransportEvent::Closed { reason }).await;
                        return Ok(());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        let _ = events_tx.send(TransportEvent::Closed { reason: None }).await;
                        return Ok(());
                    }
                };
                match parsed {
                    Ok(message) => {
                        for event in translate_server_message(message) {
                            if events_tx.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Ignoring unparseable Gemini Live message"),
                }
            },
        }
    }
}
