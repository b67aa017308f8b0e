use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Live (bidirectional) endpoint
    pub live_url: String,

    /// Base URL for the answer-generation endpoint
    pub answer_url: String,

    /// Credential; the GEMINI_API_KEY environment variable takes precedence
    pub api_key: Option<String>,

    /// Model for the live transcription session
    pub model: String,

    /// Model for streamed answers
    pub answer_model: String,

    /// Behavior instruction for the live session
    pub system_instruction: String,

    /// Behavior instruction for answer generation
    pub answer_instruction: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            live_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            answer_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            model: "gemini-2.0-flash-live-001".to_string(),
            answer_model: "gemini-2.0-flash".to_string(),
            system_instruction: "Transcribe the incoming audio. Respond only when addressed directly.".to_string(),
            answer_instruction: "Answer the question clearly and concisely.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target sample rate for the provider wire format
    pub sample_rate: u32,

    /// Expected channel count from the frame source
    pub channels: u16,

    /// Duration of each pumped frame in milliseconds
    pub frame_duration_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Provider expects 16kHz PCM
            channels: 1,        // Mono
            frame_duration_ms: 100,
        }
    }
}

impl Config {
    /// Load configuration from a file, falling back to defaults when absent.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl ProviderConfig {
    /// Resolve the credential, preferring the environment over the file.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .or_else(|| self.api_key.clone())
    }

    /// Live endpoint with the credential attached.
    pub fn live_endpoint(&self, api_key: &str) -> String {
        format!("{}?key={}", self.live_url, api_key)
    }
}
