// Wire codec for the provider protocol.
//
// Pure, stateless translation between semantic events and the JSON messages
// carried over the persistent connection. Decode failures are reported as
// events, never as errors; the receive loop treats them as non-fatal.

use base64::Engine;
use serde_json::{json, Value};

use super::transport::WireMessage;

/// Semantic events decoded from provider messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The provider acknowledged the setup message.
    SetupComplete,
    /// Incremental input transcription text.
    TranscriptDelta(String),
    /// Model-generated output text.
    ModelOutput(String),
    /// The current turn ended.
    TurnComplete,
    /// Application-level error payload.
    ProviderError(String),
    /// Valid JSON the codec does not understand; kept for diagnostics.
    Unrecognized(String),
    /// Malformed payload; kept for diagnostics.
    DecodeFailure(String),
}

/// Setup message sent once per connection, before any audio.
pub fn encode_setup(model: &str, system_instruction: &str) -> WireMessage {
    let setup = json!({
        "setup": {
            "model": format!("models/{}", model),
            "generationConfig": {
                "responseModalities": ["TEXT"]
            },
            "systemInstruction": {
                "parts": [{ "text": system_instruction }]
            },
            "inputAudioTranscription": {}
        }
    });

    WireMessage::Text(setup.to_string())
}

/// Audio chunk message: base64 PCM plus a MIME-style format tag.
pub fn encode_audio_chunk(pcm: &[u8], sample_rate: u32) -> WireMessage {
    let chunk = json!({
        "realtimeInput": {
            "mediaChunks": [{
                "mimeType": format!("audio/pcm;rate={}", sample_rate),
                "data": base64::engine::general_purpose::STANDARD.encode(pcm)
            }]
        }
    });

    WireMessage::Text(chunk.to_string())
}

/// Request body for the one-shot answer-generation call.
///
/// Independent of the live connection; the answer streamer posts this to the
/// provider's generate endpoint.
pub fn encode_answer_request(question: &str, instruction: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": question }]
        }],
        "systemInstruction": {
            "parts": [{ "text": instruction }]
        }
    })
}

/// Decode one raw message into its semantic events, in wire order.
///
/// A single provider message may carry several events at once (transcript
/// text together with a turn boundary is common), so this returns all of
/// them rather than collapsing to one.
pub fn decode(message: &WireMessage) -> Vec<ServerEvent> {
    let text = match message {
        WireMessage::Text(text) => text.clone(),
        // Some providers deliver JSON payloads as binary frames
        WireMessage::Binary(data) => match String::from_utf8(data.clone()) {
            Ok(text) => text,
            Err(_) => {
                return vec![ServerEvent::DecodeFailure(
                    "binary message is not UTF-8".to_string(),
                )]
            }
        },
        WireMessage::Close(_) => return Vec::new(),
    };

    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => return vec![ServerEvent::DecodeFailure(format!("{}: {}", e, text))],
    };

    let mut events = Vec::new();

    if value.get("setupComplete").is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(error) = value.get("error") {
        let detail = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        events.push(ServerEvent::ProviderError(detail));
    }

    if let Some(content) = value.get("serverContent") {
        if let Some(text) = content
            .get("inputTranscription")
            .and_then(|t| t.get("text"))
            .and_then(|t| t.as_str())
        {
            if !text.is_empty() {
                events.push(ServerEvent::TranscriptDelta(text.to_string()));
            }
        }

        if let Some(parts) = content
            .get("modelTurn")
            .and_then(|turn| turn.get("parts"))
            .and_then(|parts| parts.as_array())
        {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    if !text.is_empty() {
                        events.push(ServerEvent::ModelOutput(text.to_string()));
                    }
                }
            }
        }

        if content
            .get("turnComplete")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            events.push(ServerEvent::TurnComplete);
        }
    }

    if events.is_empty() {
        events.push(ServerEvent::Unrecognized(text));
    }

    events
}
