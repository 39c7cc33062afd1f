//! WAV packaging for decoded PCM, the delivery format the backend accepts.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

/// Size of the RIFF/WAVE header written for 16-bit mono PCM.
pub const HEADER_SIZE: usize = 44;

/// Wrap mono PCM16 samples in a RIFF/WAVE container.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_SIZE + samples.len() * 2));
    {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// WAV bytes as standard base64 without line breaks.
pub fn encode_wav_base64(samples: &[i16], sample_rate: u32) -> Result<String, hound::Error> {
    Ok(BASE64_STANDARD.encode(encode_wav(samples, sample_rate)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let wav = encode_wav(&[1, -2, 3], 16_000).unwrap();
        assert_eq!(wav.len(), HEADER_SIZE + 6);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 36 + 6);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(wav[16..20].try_into().unwrap()), 16);
        // PCM, mono
        assert_eq!(u16::from_le_bytes(wav[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 16_000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 32_000);
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(wav[34..36].try_into().unwrap()), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 6);
        assert_eq!(&wav[44..], &[1, 0, 0xFE, 0xFF, 3, 0]);
    }

    #[test]
    fn test_reads_back_with_hound() {
        let samples = [0i16, 1200, -1200, i16::MAX, i16::MIN];
        let wav = encode_wav(&samples, 16_000).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_base64_has_no_line_breaks() {
        let samples = vec![0i16; 4096];
        let encoded = encode_wav_base64(&samples, 16_000).unwrap();
        assert!(!encoded.contains('\n'));
        let decoded = BASE64_STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, encode_wav(&samples, 16_000).unwrap());
    }
}
