//! Manages the WebSocket connection lifecycle for one learner.

use super::{
    devices::{BrowserMicrophone, BrowserPlayback},
    protocol::{ClientMessage, ServerMessage},
};
use crate::{
    bridge::AudioBridge,
    controller::{NavOutcome, TutorController},
    lifecycle::{SessionManager, SessionOptions, SessionSignal},
    state::AppState,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use tutor_core::{TutorError, audio::OUTBOUND_CHUNK_SAMPLES, instructions::InstructionBuilder};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Waits for the `init` handshake, builds a controller for this learner and
/// runs it until the socket closes. The live session is always stopped on exit.
#[instrument(name = "ws_connection", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));
    info!("New WebSocket connection. Awaiting initialization...");

    let (mut socket_tx, mut socket_rx) = socket.split();

    // The first message from the client must be an `init` message.
    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };
    let (learner_name, sample_rate) = match init {
        Ok(init) => init,
        Err(e) => {
            error!("Connection initialization failed: {:?}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                    recoverable: false,
                },
            )
            .await;
            return;
        }
    };

    let microphone = BrowserMicrophone::default();
    microphone.set_available(sample_rate);
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();

    let instructions = InstructionBuilder::new(
        state.instructions_template.to_string(),
        learner_name.or_else(|| Some(state.config.default_learner_name.clone())),
    );
    let learner_name = instructions.learner_name().to_string();
    let sessions = SessionManager::new(
        Arc::new(microphone.clone()),
        state.transport.clone(),
        instructions,
        SessionOptions {
            rebind_delay: state.config.rebind_delay,
            chunk_samples: OUTBOUND_CHUNK_SAMPLES,
        },
    );
    let bridge = AudioBridge::new(Box::new(BrowserPlayback::new(outbox_tx)));
    let mut controller = TutorController::new(state.outline.clone(), sessions, bridge);

    let initialized = ServerMessage::Initialized {
        connection_id,
        learner_name: learner_name.clone(),
        state: controller.snapshot(),
    };
    if send_msg(&mut socket_tx, initialized).await.is_err() {
        error!("Failed to send Initialized message to client.");
        return;
    }
    info!(%learner_name, steps = controller.total_steps(), "Connection initialized.");

    if let Err(e) = run_connection(
        &mut controller,
        &microphone,
        socket_tx,
        socket_rx,
        outbox_rx,
    )
    .await
    {
        error!(error = ?e, "Connection terminated with error.");
    }

    controller.stop_session();
    info!("WebSocket connection closed and tutoring session released.");
}

/// Parses the `init` message into the learner's name and microphone rate.
fn parse_init(init_text: &str) -> Result<(Option<String>, Option<u32>)> {
    let init_msg: ClientMessage =
        serde_json::from_str(init_text).context("Malformed `init` message")?;
    match init_msg {
        ClientMessage::Init {
            learner_name,
            microphone,
        } => Ok((learner_name, microphone.map(|m| m.sample_rate))),
        _ => Err(anyhow!("First message must be `init`")),
    }
}

enum Wake {
    Client(Option<Result<Message, axum::Error>>),
    Session(SessionSignal),
    Outbound(ServerMessage),
}

/// The event loop for an initialized connection.
///
/// Client messages, session signals and outbound playback are handled one at a
/// time, each to completion.
async fn run_connection(
    controller: &mut TutorController,
    microphone: &BrowserMicrophone,
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut socket_rx: SplitStream<WebSocket>,
    mut outbox_rx: mpsc::UnboundedReceiver<ServerMessage>,
) -> Result<()> {
    loop {
        let wake = tokio::select! {
            msg = socket_rx.next() => Wake::Client(msg),
            signal = controller.next_signal() => Wake::Session(signal),
            Some(msg) = outbox_rx.recv() => Wake::Outbound(msg),
        };

        match wake {
            Wake::Client(Some(Ok(Message::Text(text)))) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => {
                        for reply in apply_client_message(controller, microphone, msg).await {
                            send_msg(&mut socket_tx, reply).await?;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed client message.");
                        send_msg(
                            &mut socket_tx,
                            ServerMessage::Error {
                                message: format!("Malformed message: {e}"),
                                recoverable: true,
                            },
                        )
                        .await?;
                    }
                }
            }
            Wake::Client(Some(Ok(Message::Binary(data)))) => {
                if let Err(e) = microphone.push_frame(&data) {
                    debug!(error = %e, "Dropping malformed microphone frame.");
                }
            }
            Wake::Client(Some(Ok(Message::Close(_)))) | Wake::Client(None) => {
                info!("Client closed the connection.");
                break;
            }
            Wake::Client(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Wake::Client(Some(Err(e))) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
            Wake::Session(signal) => {
                let outcome = controller.handle_signal(signal).await;
                if let Some(e) = outcome.error {
                    send_msg(&mut socket_tx, error_message(&e)).await?;
                }
                if outcome.state_changed {
                    send_msg(
                        &mut socket_tx,
                        ServerMessage::StateUpdate {
                            state: controller.snapshot(),
                        },
                    )
                    .await?;
                }
            }
            Wake::Outbound(msg) => send_msg(&mut socket_tx, msg).await?,
        }
    }
    Ok(())
}

/// Applies one client command and returns the messages to send back.
async fn apply_client_message(
    controller: &mut TutorController,
    microphone: &BrowserMicrophone,
    msg: ClientMessage,
) -> Vec<ServerMessage> {
    let result: Result<(), TutorError> = match msg {
        ClientMessage::Init { .. } => {
            warn!("Ignoring repeated `init` message.");
            return vec![ServerMessage::Error {
                message: "Connection is already initialized.".to_string(),
                recoverable: true,
            }];
        }
        ClientMessage::SetOutline { outline } => {
            controller.set_outline(Arc::new(outline));
            Ok(())
        }
        ClientMessage::SelectStep { index } => controller.select_step(index).map(log_nav),
        ClientMessage::NextStep => Ok(log_nav(controller.next_step())),
        ClientMessage::PrevStep => Ok(log_nav(controller.prev_step())),
        ClientMessage::JumpTo { index } => controller.jump_to(index).map(log_nav),
        ClientMessage::StartSession => controller.start_session().await.map(|outcome| {
            debug!(?outcome, "Start requested.");
        }),
        ClientMessage::StopSession => {
            controller.stop_session();
            Ok(())
        }
        ClientMessage::SelectAnswer {
            question_id,
            option,
        } => controller.select_answer(&question_id, option),
        ClientMessage::SubmitQuiz { answers } => controller.submit_quiz(answers).map(drop),
        ClientMessage::RetryQuiz => controller.retry_quiz(),
        ClientMessage::Microphone { sample_rate } => {
            microphone.set_available(sample_rate);
            Ok(())
        }
    };

    let mut replies = Vec::with_capacity(2);
    if let Err(e) = result {
        replies.push(error_message(&e));
    }
    replies.push(ServerMessage::StateUpdate {
        state: controller.snapshot(),
    });
    replies
}

fn log_nav(outcome: NavOutcome) {
    debug!(?outcome, "Navigation handled.");
}

fn error_message(e: &TutorError) -> ServerMessage {
    ServerMessage::Error {
        message: e.to_string(),
        recoverable: true,
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
