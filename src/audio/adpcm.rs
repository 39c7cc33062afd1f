//! IMA-ADPCM codec
//!
//! 4-bit mono IMA-ADPCM as produced by the watch firmware. Two codes per
//! byte, low nibble first. Both directions share the tables below and must
//! stay bit-compatible with the firmware encoder.

/// Quantizer step sizes, indexed by `step_index`.
pub const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Step index adjustment per 4-bit code.
pub const INDEX_TABLE: [i8; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

const MAX_STEP_INDEX: i32 = 88;

/// Predictor state carried between nibbles.
///
/// A fresh stream always starts from `(0, 0)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdpcmState {
    pub predictor: i16,
    pub step_index: u8,
}

impl AdpcmState {
    fn step(&self) -> i32 {
        STEP_TABLE[self.step_index as usize]
    }

    /// Apply one code to the state and return the reconstructed sample.
    fn advance(&mut self, code: u8) -> i16 {
        let code = code & 0x0F;
        let step = self.step();

        let mut diff = step >> 3;
        if code & 1 != 0 {
            diff += step >> 2;
        }
        if code & 2 != 0 {
            diff += step >> 1;
        }
        if code & 4 != 0 {
            diff += step;
        }
        if code & 8 != 0 {
            diff = -diff;
        }

        let predictor = (self.predictor as i32 + diff).clamp(i16::MIN as i32, i16::MAX as i32);
        self.predictor = predictor as i16;

        let index = (self.step_index as i32 + INDEX_TABLE[code as usize] as i32)
            .clamp(0, MAX_STEP_INDEX);
        self.step_index = index as u8;

        self.predictor
    }

    /// Pick the code that best approximates `sample`, then advance.
    fn quantize(&mut self, sample: i16) -> u8 {
        let step = self.step();
        let mut diff = sample as i32 - self.predictor as i32;

        let mut code = 0u8;
        if diff < 0 {
            code = 8;
            diff = -diff;
        }
        if diff >= step {
            code |= 4;
            diff -= step;
        }
        if diff >= step >> 1 {
            code |= 2;
            diff -= step >> 1;
        }
        if diff >= step >> 2 {
            code |= 1;
        }

        self.advance(code);
        code
    }
}

/// Samples plus the state after the last nibble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutput {
    pub samples: Vec<i16>,
    pub state: AdpcmState,
}

/// Decode a complete session from a fresh `(0, 0)` state.
pub fn decode(data: &[u8]) -> Vec<i16> {
    decode_with_state(data, AdpcmState::default()).samples
}

/// Decode starting from caller-supplied state (streaming mode).
pub fn decode_with_state(data: &[u8], initial: AdpcmState) -> DecodeOutput {
    let mut state = initial;
    let mut samples = Vec::with_capacity(data.len() * 2);

    for &byte in data {
        samples.push(state.advance(byte & 0x0F));
        samples.push(state.advance(byte >> 4));
    }

    DecodeOutput { samples, state }
}

/// Encode PCM16 from a fresh state. An odd trailing sample is paired with a
/// zero code in the high nibble.
pub fn encode(samples: &[i16]) -> Vec<u8> {
    AdpcmEncoder::new().encode(samples)
}

/// Streaming decoder owning its state; one instance per stream.
#[derive(Debug, Default)]
pub struct AdpcmDecoder {
    state: AdpcmState,
}

impl AdpcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, data: &[u8]) -> Vec<i16> {
        let output = decode_with_state(data, self.state);
        self.state = output.state;
        output.samples
    }

    pub fn state(&self) -> AdpcmState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = AdpcmState::default();
    }
}

/// Streaming encoder owning its state; one instance per stream.
#[derive(Debug, Default)]
pub struct AdpcmEncoder {
    state: AdpcmState,
}

impl AdpcmEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, samples: &[i16]) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples.len().div_ceil(2));

        for pair in samples.chunks(2) {
            let low = self.state.quantize(pair[0]);
            let high = match pair.get(1) {
                Some(&sample) => self.state.quantize(sample),
                None => {
                    self.state.advance(0);
                    0
                }
            };
            out.push(low | (high << 4));
        }

        out
    }

    pub fn state(&self) -> AdpcmState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = AdpcmState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, amplitude: f64, freq: f64, rate: f64) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f64 / rate;
                (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn test_tables_shape() {
        assert_eq!(STEP_TABLE[0], 7);
        assert_eq!(STEP_TABLE[88], 32767);
        assert!(STEP_TABLE.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(&INDEX_TABLE[..8], &INDEX_TABLE[8..]);
    }

    #[test]
    fn test_decode_known_vector() {
        // 0x77: low nibble 7 at step 7 -> 11, high nibble 7 at step 16 -> 41
        let output = decode_with_state(&[0x77], AdpcmState::default());
        assert_eq!(output.samples, vec![11, 41]);
        assert_eq!(
            output.state,
            AdpcmState {
                predictor: 41,
                step_index: 16
            }
        );
    }

    #[test]
    fn test_low_nibble_first() {
        // low 7 -> 11 (step index 8), high 0 at step 16 -> +2
        let samples = decode(&[0x07]);
        assert_eq!(samples, vec![11, 13]);
    }

    #[test]
    fn test_predictor_and_index_clamp() {
        let output = decode_with_state(&[0x77; 64], AdpcmState::default());
        assert_eq!(output.state.predictor, i16::MAX);
        assert_eq!(output.state.step_index, 88);

        let output = decode_with_state(&[0xFF; 64], AdpcmState::default());
        assert_eq!(output.state.predictor, i16::MIN);
        assert_eq!(output.state.step_index, 88);

        let output = decode_with_state(&[0x00; 8], AdpcmState::default());
        assert_eq!(output.state.step_index, 0);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let first = decode_with_state(&data, AdpcmState::default());
        let second = decode_with_state(&data, AdpcmState::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..200u8).map(|b| b.wrapping_mul(37)).collect();
        let whole = decode(&data);

        let mut decoder = AdpcmDecoder::new();
        let mut streamed = decoder.decode(&data[..77]);
        streamed.extend(decoder.decode(&data[77..]));
        assert_eq!(whole, streamed);

        decoder.reset();
        assert_eq!(decoder.state(), AdpcmState::default());
    }

    #[test]
    fn test_silence_round_trip() {
        let silence = vec![0i16; 320];
        let encoded = encode(&silence);
        assert_eq!(encoded.len(), 160);
        assert!(decode(&encoded).iter().all(|&s| s == 0));
    }

    #[test]
    fn test_round_trip_within_quantization_error() {
        let samples = sine(1600, 4000.0, 100.0, 16_000.0);
        let decoded = decode(&encode(&samples));
        assert_eq!(decoded.len(), samples.len());

        // Skip the adaptation ramp from the smallest step.
        let max_error = samples
            .iter()
            .zip(decoded.iter())
            .skip(32)
            .map(|(&a, &b)| (a as i32 - b as i32).abs())
            .max()
            .unwrap();
        assert!(max_error < 1024, "max error {}", max_error);
    }

    #[test]
    fn test_encoder_tracks_decoder_state() {
        let samples = sine(500, 12000.0, 440.0, 16_000.0);
        let mut encoder = AdpcmEncoder::new();
        let encoded = encoder.encode(&samples);
        let output = decode_with_state(&encoded, AdpcmState::default());
        assert_eq!(encoder.state(), output.state);
    }

    #[test]
    fn test_odd_sample_count_pads_zero_code() {
        let encoded = encode(&[1000, -1000, 500]);
        assert_eq!(encoded.len(), 2);
        assert_eq!(encoded[1] >> 4, 0);
        assert_eq!(decode(&encoded).len(), 4);
    }
}
