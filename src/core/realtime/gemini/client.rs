//! Gemini Live WebSocket client.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::config::GeminiLiveConfig;
use super::messages::{ClientMessage, ServerMessage};
use crate::core::realtime::base::{
    EVENT_CHANNEL_CAPACITY, OutboundMessage, OutboundSender, RealtimeError, RealtimeResult,
    RealtimeTransport, SessionSetup, TransportEvent, TransportLink, WS_CHANNEL_CAPACITY,
    classify_provider_error, is_quota_message,
};

/// [`RealtimeTransport`] backed by the Gemini Live bidirectional API.
///
/// Each `connect` opens a fresh socket, sends the setup message and spawns one
/// task that owns the socket. The task ends when the server closes, when the
/// session asks it to close, or when the session drops its event receiver.
#[derive(Debug, Clone)]
pub struct GeminiLiveTransport {
    config: GeminiLiveConfig,
}

impl GeminiLiveTransport {
    pub fn new(config: GeminiLiveConfig) -> RealtimeResult<Self> {
        // Surface bad keys and endpoints at construction rather than first use.
        config.ws_url()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GeminiLiveConfig {
        &self.config
    }
}

#[async_trait]
impl RealtimeTransport for GeminiLiveTransport {
    async fn connect(&self, setup: SessionSetup) -> RealtimeResult<TransportLink> {
        let url = self.config.ws_url()?;

        tracing::info!(
            model = %setup.model,
            voice = %setup.voice,
            tools = setup.tools.len(),
            "Connecting to Gemini Live"
        );

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| classify_provider_error(e.to_string()))?;

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        let setup_json = serde_json::to_string(&ClientMessage::setup(&setup))?;
        ws_sink
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))?;
        tracing::debug!("Sent Gemini Live setup");

        let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let final_event = loop {
                tokio::select! {
                    outbound = out_rx.recv() => {
                        let message = match outbound {
                            Some(OutboundMessage::Close) | None => {
                                if let Err(e) = ws_sink.send(Message::Close(None)).await {
                                    tracing::debug!("Failed to send close frame: {}", e);
                                }
                                break TransportEvent::Closed {
                                    reason: Some("closed by client".to_string()),
                                };
                            }
                            Some(OutboundMessage::Audio(chunk)) => ClientMessage::audio(chunk),
                            Some(OutboundMessage::ToolResults(results)) => {
                                tracing::debug!(count = results.len(), "Sending tool responses");
                                ClientMessage::tool_response(results)
                            }
                        };

                        let json = match serde_json::to_string(&message) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize client message: {}", e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            break TransportEvent::Error(RealtimeError::WebSocketError(
                                e.to_string(),
                            ));
                        }
                    }

                    inbound = ws_stream.next() => {
                        let payload = match inbound {
                            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                            Some(Ok(Message::Binary(data))) => data.to_vec(),
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {}", e);
                                }
                                continue;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                let reason = frame
                                    .map(|f| f.reason.to_string())
                                    .filter(|r| !r.is_empty());
                                tracing::info!(reason = ?reason, "Gemini Live closed the connection");
                                break close_event(reason);
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {}", e);
                                break TransportEvent::Error(classify_provider_error(e.to_string()));
                            }
                            None => break TransportEvent::Closed { reason: None },
                        };

                        let message = match serde_json::from_slice::<ServerMessage>(&payload) {
                            Ok(m) => m,
                            Err(e) => {
                                tracing::warn!(
                                    bytes = payload.len(),
                                    "Failed to parse server message: {}",
                                    e
                                );
                                continue;
                            }
                        };

                        for event in translate(message) {
                            if event_tx.send(event).await.is_err() {
                                tracing::debug!("Session dropped its event receiver");
                                return;
                            }
                        }
                    }

                    _ = event_tx.closed() => {
                        tracing::debug!("Session went away, closing socket");
                        if let Err(e) = ws_sink.send(Message::Close(None)).await {
                            tracing::debug!("Failed to send close frame: {}", e);
                        }
                        return;
                    }
                }
            };

            // Receiver may already be gone after a client-side close.
            let _ = event_tx.send(final_event).await;
            tracing::debug!("Gemini Live connection task finished");
        });

        Ok(TransportLink {
            outbound: OutboundSender::new(out_tx),
            events: event_rx,
        })
    }

    fn provider_name(&self) -> &'static str {
        "gemini-live"
    }
}

/// A close reason that mentions rate limiting is reported as a quota error.
fn close_event(reason: Option<String>) -> TransportEvent {
    match reason {
        Some(r) if is_quota_message(&r) => TransportEvent::Error(RealtimeError::QuotaExceeded(r)),
        reason => TransportEvent::Closed { reason },
    }
}

/// Map one server message onto the events the session consumes.
fn translate(message: ServerMessage) -> Vec<TransportEvent> {
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        tracing::info!("Gemini Live setup complete");
        events.push(TransportEvent::Open);
    }

    if let Some(cancellation) = &message.tool_call_cancellation {
        tracing::info!(ids = ?cancellation.ids, "Model cancelled tool calls");
    }

    if let Some(go_away) = &message.go_away {
        tracing::warn!(time_left = ?go_away.time_left, "Gemini Live will close the connection soon");
    }

    if let Some(usage) = &message.usage_metadata {
        tracing::trace!(usage = %usage, "Usage metadata");
    }

    if let Some(inbound) = message.to_inbound() {
        events.push(TransportEvent::Message(inbound));
    }

    if let Some(error) = &message.error {
        tracing::error!(error = %error, "Gemini Live reported an error");
        events.push(TransportEvent::Error(classify_provider_error(
            error.to_string(),
        )));
    }

    events
}
