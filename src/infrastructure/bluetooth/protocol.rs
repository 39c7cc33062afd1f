//! Hollow Watch Protocol
//!
//! Wire vocabulary spoken over the two GATT characteristics of the watch.
//!
//! ```text
//! audio characteristic (notify, watch -> phone)
//!   "REQ_TIME"                    watch wants the clock
//!   "SET_PERSONA:<json>"          persona push (also SET_PERSONA_JSON:)
//!   "START_V" | "START_S"         open a voice / silent audio session
//!   <binary ADPCM chunk> ...      appended while a session is open
//!   "END"                         close the session
//!
//! text characteristic (write, phone -> watch)
//!   <assistant reply bytes>       chunked, see fragmenter
//!   "TIME:<unix seconds>"         single write
//! ```

use crate::domain::models::AudioMode;

/// Hollow watch BLE Service UUID
pub const SERVICE_UUID: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914b";

/// Audio Characteristic UUID - tokens and ADPCM chunks are notified here
pub const AUDIO_CHAR_UUID: &str = "beb5483e-36e1-4688-b7f5-ea07361b26a8";

/// Text Characteristic UUID - replies and time sync are written here
pub const TEXT_CHAR_UUID: &str = "0a3d547e-6967-4660-a744-8ace08191266";

/// Advertised name prefix used to filter scans
pub const DEVICE_NAME_PREFIX: &str = "Hollow";

pub const TOKEN_REQ_TIME: &str = "REQ_TIME";
pub const TOKEN_SET_PERSONA: &str = "SET_PERSONA";
pub const TOKEN_SET_PERSONA_JSON: &str = "SET_PERSONA_JSON";
pub const TOKEN_START_VOICE: &str = "START_V";
pub const TOKEN_START_SILENT: &str = "START_S";
pub const TOKEN_END: &str = "END";

/// Prefix of the outbound clock message
pub const TIME_PREFIX: &str = "TIME:";

/// A classified notification from the audio characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    RequestTime,
    SetPersona(&'a str),
    Start(AudioMode),
    End,
    Audio(&'a [u8]),
}

/// Returns the payload as text if, after trimming surrounding whitespace and
/// control bytes, it is non-empty printable ASCII.
pub fn as_printable_ascii(data: &[u8]) -> Option<&str> {
    let start = data.iter().position(|&b| b > b' ')?;
    let end = data.iter().rposition(|&b| b > b' ')? + 1;
    let trimmed = &data[start..end];

    if trimmed.iter().all(|&b| (0x20..=0x7E).contains(&b)) {
        std::str::from_utf8(trimmed).ok()
    } else {
        None
    }
}

/// Classify a notification payload.
///
/// Only printable-ASCII payloads are considered as tokens. `REQ_TIME`,
/// `START_V`, `START_S` and `END` must be the whole trimmed text. The persona
/// commands carry everything after the first `:` as payload. Anything else
/// is audio.
pub fn classify(data: &[u8]) -> Frame<'_> {
    let Some(text) = as_printable_ascii(data) else {
        return Frame::Audio(data);
    };

    match text {
        TOKEN_REQ_TIME => return Frame::RequestTime,
        TOKEN_START_VOICE => return Frame::Start(AudioMode::Voice),
        TOKEN_START_SILENT => return Frame::Start(AudioMode::Silent),
        TOKEN_END => return Frame::End,
        _ => {}
    }

    let (command, payload) = text.split_once(':').unwrap_or((text, ""));
    match command {
        TOKEN_SET_PERSONA | TOKEN_SET_PERSONA_JSON => Frame::SetPersona(payload),
        _ => Frame::Audio(data),
    }
}

/// Build the clock message sent in answer to `REQ_TIME`.
pub fn time_message(unix_seconds: u64) -> String {
    format!("{}{}", TIME_PREFIX, unix_seconds)
}
