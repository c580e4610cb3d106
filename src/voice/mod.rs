//! Voice pipeline: STT for inbound voice notes, TTS for spoken replies

mod stt;
mod tts;

pub use stt::SpeechToText;
pub use tts::TextToSpeech;

use crate::config::VoiceConfig;

/// Paired STT/TTS services; present only when both are configured
pub struct VoicePipeline {
    pub stt: SpeechToText,
    pub tts: TextToSpeech,
}

impl VoicePipeline {
    /// Build the pipeline from voice configuration
    #[must_use]
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            stt: SpeechToText::new(&config.stt),
            tts: TextToSpeech::new(&config.tts),
        }
    }
}
