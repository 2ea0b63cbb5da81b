//! mu-law codec and 20ms frame chunking/pacing media rules.
//!
//! The carrier speaks mu-law @ 8kHz mono, base64-on-the-wire, 20ms per
//! frame (160 samples). We never link an external codec crate for this —
//! G.711 mu-law is a fixed bit-twiddling transform, not something the
//! retrieved pack reaches for a dependency to do (`codec-core` in the
//! teacher workspace wraps the same scalar algorithm below in a
//! lookup-table-optimized form; we keep the reference scalar version since
//! nothing here is on a hot enough path to need it).

use std::time::Duration;

/// Samples per 20ms frame at 8kHz mono
pub const SAMPLES_PER_FRAME: usize = 160;
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

const BIAS: i16 = 0x84;
const CLIP: i16 = 32635;

/// Encodes one 16-bit linear PCM sample to 8-bit mu-law, ITU-T G.711.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let sign = if sample < 0 { 0x80u8 } else { 0 };
    let mut magnitude = if sample < 0 { -sample } else { sample };
    if magnitude > CLIP {
        magnitude = CLIP;
    }
    magnitude += BIAS;

    let exponent = (0..8)
        .rev()
        .find(|&exp| (magnitude >> (exp + 3)) & 0x01 != 0)
        .unwrap_or(0) as u8;
    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Decodes one 8-bit mu-law byte back to 16-bit linear PCM.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;
    let mut sample = (((mantissa as i16) << 3) + BIAS) << exponent;
    sample -= BIAS;
    if sign != 0 {
        -sample
    } else {
        sample
    }
}

/// Encodes a buffer of linear PCM samples to mu-law bytes.
pub fn encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_mulaw(s)).collect()
}

/// Decodes a buffer of mu-law bytes to linear PCM samples.
pub fn decode(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| mulaw_to_linear(b)).collect()
}

/// Splits a mu-law byte stream into fixed 20ms (160-byte) frames. The final
/// partial frame, if any, is padded with mu-law silence (0xFF) rather than
/// dropped, so a caller never has to special-case a short tail.
pub fn chunk_into_frames(mulaw_bytes: &[u8]) -> Vec<[u8; SAMPLES_PER_FRAME]> {
    const MULAW_SILENCE: u8 = 0xFF;
    let mut frames = Vec::with_capacity(mulaw_bytes.len().div_ceil(SAMPLES_PER_FRAME));
    let mut chunks = mulaw_bytes.chunks(SAMPLES_PER_FRAME);
    for chunk in &mut chunks {
        let mut frame = [MULAW_SILENCE; SAMPLES_PER_FRAME];
        frame[..chunk.len()].copy_from_slice(chunk);
        frames.push(frame);
    }
    frames
}

/// Base64-encodes one frame for "media" event payloads.
pub fn encode_frame_b64(frame: &[u8; SAMPLES_PER_FRAME]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(frame)
}

/// Decodes an inbound base64 "media" event payload into raw mu-law bytes.
/// Malformed base64 is a protocol error the caller should log and ignore
/// rather than kill the session over; it maps to `None` for that reason.
pub fn decode_frame_b64(payload: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mulaw_round_trip_is_lossy_but_close() {
        for sample in [0i16, 100, -100, 1000, -1000, 32000, -32000] {
            let encoded = linear_to_mulaw(sample);
            let decoded = mulaw_to_linear(encoded);
            let error = (sample as i32 - decoded as i32).unsigned_abs();
            assert!(error < 512, "sample={sample} decoded={decoded} error={error}");
        }
    }

    #[test]
    fn silence_round_trips_to_silence() {
        let encoded = linear_to_mulaw(0);
        let decoded = mulaw_to_linear(encoded);
        assert!(decoded.abs() < 16);
    }

    #[test]
    fn chunk_into_frames_pads_final_partial_frame_with_silence() {
        let bytes = vec![0x01u8; SAMPLES_PER_FRAME + 10];
        let frames = chunk_into_frames(&bytes);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[1][..10], &[0x01u8; 10][..]);
        assert_eq!(frames[1][10], 0xFF);
    }

    #[test]
    fn frame_b64_round_trips() {
        let frame = [0x7Fu8; SAMPLES_PER_FRAME];
        let encoded = encode_frame_b64(&frame);
        let decoded = decode_frame_b64(&encoded).unwrap();
        assert_eq!(decoded, frame.to_vec());
    }

    #[test]
    fn malformed_base64_decodes_to_none() {
        assert!(decode_frame_b64("not valid base64!!!").is_none());
    }
}
