//! Audio Module
//!
//! Codec and packaging for audio captured on the watch.
//!
//! - [`adpcm`] - IMA-ADPCM encoder/decoder shared with the firmware
//! - [`wav`] - PCM16 to WAV/base64 for the assistant backend

pub mod adpcm;
pub mod wav;

pub use adpcm::{AdpcmDecoder, AdpcmEncoder, AdpcmState};
