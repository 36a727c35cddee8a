//! Helper functions for the voice module

use base64::Engine;

/// Generate a random WebSocket key
pub(super) fn generate_ws_key() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let mut key = [0u8; 16];
    rng.fill(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}

/// Split raw PCM16 little-endian bytes into audio chunks of at most
/// `samples_per_chunk` samples. A trailing odd byte is ignored.
pub(crate) fn pcm16_chunks(
    bytes: &[u8],
    sample_rate: u32,
    samples_per_chunk: usize,
) -> Vec<super::AudioChunk> {
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    samples
        .chunks(samples_per_chunk.max(1))
        .map(|chunk| super::AudioChunk {
            samples: chunk.to_vec(),
            sample_rate,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_key_is_16_random_bytes() {
        let key = generate_ws_key();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&key)
            .unwrap();
        assert_eq!(decoded.len(), 16);
        assert_ne!(key, generate_ws_key());
    }

    #[test]
    fn test_pcm16_chunks() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x02, 0x00, 0x07];
        let chunks = pcm16_chunks(&bytes, 24_000, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].samples, vec![1, -1]);
        assert_eq!(chunks[1].samples, vec![2]);
        assert_eq!(chunks[1].sample_rate, 24_000);
    }
}
