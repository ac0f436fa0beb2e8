//! Gemini Live WebSocket message types.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server), one top-level key each:
//! - setup - Model, voice, system instruction, tools, transcription flags
//! - realtimeInput - Base64 PCM microphone chunks
//! - toolResponse - Results for a batch of function calls
//!
//! Server messages (received from server), one or more top-level keys:
//! - setupComplete - Setup accepted, the session is live
//! - serverContent - Model audio, transcriptions, turn boundaries, interruptions
//! - toolCall - Function calls the model wants answered
//! - toolCallCancellation - Function calls the model no longer needs
//! - goAway - The server will close the connection soon
//! - usageMetadata - Token accounting
//! - error - Request or quota failure

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::model_resource;
use crate::core::codec::EncodedChunk;
use crate::core::realtime::{
    FunctionDeclaration, InboundMessage, InlineAudio, ResponseModality, SessionSetup,
    ToolCallRequest, ToolCallResult,
};

// =============================================================================
// Client Messages
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// First message on a new connection.
    pub fn setup(setup: &SessionSetup) -> Self {
        let system_instruction = (!setup.system_instruction.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part::text(setup.system_instruction.clone())],
        });

        let tools = if setup.tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: setup.tools.clone(),
            }]
        };

        ClientMessage::Setup(Setup {
            model: model_resource(&setup.model),
            generation_config: GenerationConfig {
                response_modalities: vec![setup.response_modality],
                speech_config: (setup.response_modality == ResponseModality::Audio).then(|| {
                    SpeechConfig {
                        voice_config: VoiceSelection {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: setup.voice.clone(),
                            },
                        },
                    }
                }),
            },
            system_instruction,
            tools,
            output_audio_transcription: setup
                .output_transcription
                .then_some(AudioTranscriptionConfig {}),
            input_audio_transcription: setup
                .input_transcription
                .then_some(AudioTranscriptionConfig {}),
        })
    }

    /// One chunk of microphone audio.
    pub fn audio(chunk: EncodedChunk) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: chunk.mime_type.clone(),
                data: chunk.to_transport_text(),
            }],
        })
    }

    /// All results of one tool-call batch.
    pub fn tool_response(results: Vec<ToolCallResult>) -> Self {
        ClientMessage::ToolResponse(ToolResponse {
            function_responses: results,
        })
    }
}

/// Session configuration declared once per connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Model resource, `models/<id>`
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceSelection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSelection {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Enables transcription. Serializes as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioTranscriptionConfig {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<ToolCallResult>,
}

// =============================================================================
// Shared Content Types
// =============================================================================

/// Role-tagged list of parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }
}

/// Base64 payload with its MIME type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

// =============================================================================
// Server Messages
// =============================================================================

/// A message from the server. Any combination of fields may be present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
    #[serde(default)]
    pub usage_metadata: Option<Value>,
    #[serde(default)]
    pub error: Option<ServerError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub generation_complete: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    /// Empty when the server omits it; the bridge answers such calls with a failure.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} ", code)?;
        }
        if let Some(status) = &self.status {
            write!(f, "{}: ", status)?;
        }
        write!(f, "{}", self.message)
    }
}

impl ServerMessage {
    /// The part of this message the session acts on, if any.
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        let mut inbound = InboundMessage::default();

        if let Some(content) = &self.server_content {
            if let Some(turn) = &content.model_turn {
                inbound.audio = turn
                    .parts
                    .iter()
                    .filter_map(|part| part.inline_data.as_ref())
                    .filter(|blob| blob.mime_type.starts_with("audio/"))
                    .map(|blob| InlineAudio {
                        data: blob.data.clone(),
                        mime_type: blob.mime_type.clone(),
                    })
                    .collect();
            }
            inbound.output_transcript = content
                .output_transcription
                .as_ref()
                .map(|t| t.text.clone())
                .filter(|t| !t.is_empty());
            inbound.input_transcript = content
                .input_transcription
                .as_ref()
                .map(|t| t.text.clone())
                .filter(|t| !t.is_empty());
            inbound.turn_complete = content.turn_complete;
            inbound.interrupted = content.interrupted;
        }

        if let Some(tool_call) = &self.tool_call {
            inbound.tool_calls = tool_call
                .function_calls
                .iter()
                .map(|call| ToolCallRequest {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.args.clone(),
                })
                .collect();
        }

        (!inbound.is_empty()).then_some(inbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::AudioFormat;
    use serde_json::json;

    fn setup() -> SessionSetup {
        SessionSetup {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice: "Puck".to_string(),
            system_instruction: "Be helpful.".to_string(),
            tools: vec![FunctionDeclaration {
                name: "submit_customer_order".to_string(),
                description: Some("Record an order".to_string()),
                parameters: Some(json!({"type": "OBJECT", "properties": {}})),
            }],
            response_modality: ResponseModality::Audio,
            output_transcription: true,
            input_transcription: true,
            input_format: AudioFormat::mono(16_000),
        }
    }

    #[test]
    fn test_setup_serialization() {
        let value = serde_json::to_value(ClientMessage::setup(&setup())).unwrap();
        let body = &value["setup"];

        assert_eq!(
            body["model"],
            "models/gemini-2.5-flash-native-audio-preview-12-2025"
        );
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be helpful.");
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "submit_customer_order"
        );
        assert_eq!(body["outputAudioTranscription"], json!({}));
        assert_eq!(body["inputAudioTranscription"], json!({}));
    }

    #[test]
    fn test_setup_omits_disabled_parts() {
        let mut setup = setup();
        setup.tools.clear();
        setup.system_instruction.clear();
        setup.input_transcription = false;

        let value = serde_json::to_value(ClientMessage::setup(&setup)).unwrap();
        let body = value["setup"].as_object().unwrap();
        assert!(!body.contains_key("tools"));
        assert!(!body.contains_key("systemInstruction"));
        assert!(!body.contains_key("inputAudioTranscription"));
        assert!(body.contains_key("outputAudioTranscription"));
    }

    #[test]
    fn test_realtime_input_serialization() {
        let chunk = EncodedChunk {
            data: bytes::Bytes::from_static(&[1, 2, 3]),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        let value = serde_json::to_value(ClientMessage::audio(chunk)).unwrap();
        assert_eq!(
            value,
            json!({"realtimeInput": {"mediaChunks": [
                {"mimeType": "audio/pcm;rate=16000", "data": "AQID"}
            ]}})
        );
    }

    #[test]
    fn test_tool_response_serialization() {
        let results = vec![ToolCallResult {
            id: "x1".to_string(),
            name: "submit_customer_order".to_string(),
            response: json!({"result": "ok"}),
        }];
        let value = serde_json::to_value(ClientMessage::tool_response(results)).unwrap();
        assert_eq!(
            value,
            json!({"toolResponse": {"functionResponses": [
                {"id": "x1", "name": "submit_customer_order", "response": {"result": "ok"}}
            ]}})
        );
    }

    #[test]
    fn test_parse_setup_complete() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(msg.to_inbound().is_none());
    }

    #[test]
    fn test_parse_server_content() {
        let raw = json!({
            "serverContent": {
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
                    {"text": "thinking"}
                ]},
                "outputTranscription": {"text": "Hello"},
                "turnComplete": true
            }
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        let inbound = msg.to_inbound().unwrap();

        assert_eq!(inbound.audio.len(), 1);
        assert_eq!(inbound.audio[0].mime_type, "audio/pcm;rate=24000");
        assert_eq!(inbound.output_transcript.as_deref(), Some("Hello"));
        assert!(inbound.input_transcript.is_none());
        assert!(inbound.turn_complete);
        assert!(!inbound.interrupted);
    }

    #[test]
    fn test_parse_tool_call() {
        let raw = json!({
            "toolCall": {"functionCalls": [
                {"id": "x1", "name": "submit_customer_order", "args": {"customer_name": "Sara"}}
            ]}
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        let inbound = msg.to_inbound().unwrap();

        assert_eq!(inbound.tool_calls.len(), 1);
        assert_eq!(inbound.tool_calls[0].id, "x1");
        assert_eq!(inbound.tool_calls[0].args["customer_name"], "Sara");
    }

    #[test]
    fn test_nameless_call_keeps_rest_of_batch() {
        let raw = json!({
            "toolCall": {"functionCalls": [
                {"id": "x1", "args": {}},
                {"id": "x2", "name": "submit_customer_order"}
            ]}
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        let inbound = msg.to_inbound().unwrap();

        assert_eq!(inbound.tool_calls.len(), 2);
        assert_eq!(inbound.tool_calls[0].id, "x1");
        assert_eq!(inbound.tool_calls[0].name, "");
        assert_eq!(inbound.tool_calls[1].name, "submit_customer_order");
    }

    #[test]
    fn test_parse_error_and_unknown_fields() {
        let raw = json!({
            "error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "quota"},
            "somethingNew": {"x": 1}
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        let err = msg.error.unwrap();
        assert_eq!(err.to_string(), "429 RESOURCE_EXHAUSTED: quota");
    }
}
