// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Speech input and output through external engines

pub mod stt;
pub mod tts;

pub use stt::{Listener, Recognition, RecognizerChain, Recorder, Transcriber};
pub use tts::{SpeechEngine, Speaker, VoiceInfo, VoiceSettings};
