//! G.711 μ-law (PCMU) Implementation
//!
//! The recording legs always carry PCMU, payload type 0, at 8000 Hz.

use bytes::BufMut;

/// RTP payload type of PCMU
pub const PCMU_PAYLOAD_TYPE: u8 = 0;

/// Clock rate of every G.711 stream
pub const G711_CLOCK_RATE: u32 = 8000;

/// G.711 μ-law (PCMU) Codec
pub struct PcmuCodec;

impl PcmuCodec {
    /// μ-law compression lookup table (exponent by biased magnitude >> 7)
    const ULAW_COMPRESS_TABLE: [u8; 256] = [
        0, 0, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 3,
        4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
        5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
        5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
        6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6,
        6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6,
        6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6,
        6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6,
        7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
        7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
        7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
        7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
        7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
        7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
        7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
        7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    ];

    /// μ-law decompression lookup table
    const ULAW_DECOMPRESS_TABLE: [i16; 256] = [
        -32124, -31100, -30076, -29052, -28028, -27004, -25980, -24956,
        -23932, -22908, -21884, -20860, -19836, -18812, -17788, -16764,
        -15996, -15484, -14972, -14460, -13948, -13436, -12924, -12412,
        -11900, -11388, -10876, -10364, -9852, -9340, -8828, -8316,
        -7932, -7676, -7420, -7164, -6908, -6652, -6396, -6140,
        -5884, -5628, -5372, -5116, -4860, -4604, -4348, -4092,
        -3900, -3772, -3644, -3516, -3388, -3260, -3132, -3004,
        -2876, -2748, -2620, -2492, -2364, -2236, -2108, -1980,
        -1884, -1820, -1756, -1692, -1628, -1564, -1500, -1436,
        -1372, -1308, -1244, -1180, -1116, -1052, -988, -924,
        -876, -844, -812, -780, -748, -716, -684, -652,
        -620, -588, -556, -524, -492, -460, -428, -396,
        -372, -356, -340, -324, -308, -292, -276, -260,
        -244, -228, -212, -196, -180, -164, -148, -132,
        -120, -112, -104, -96, -88, -80, -72, -64,
        -56, -48, -40, -32, -24, -16, -8, 0,
        32124, 31100, 30076, 29052, 28028, 27004, 25980, 24956,
        23932, 22908, 21884, 20860, 19836, 18812, 17788, 16764,
        15996, 15484, 14972, 14460, 13948, 13436, 12924, 12412,
        11900, 11388, 10876, 10364, 9852, 9340, 8828, 8316,
        7932, 7676, 7420, 7164, 6908, 6652, 6396, 6140,
        5884, 5628, 5372, 5116, 4860, 4604, 4348, 4092,
        3900, 3772, 3644, 3516, 3388, 3260, 3132, 3004,
        2876, 2748, 2620, 2492, 2364, 2236, 2108, 1980,
        1884, 1820, 1756, 1692, 1628, 1564, 1500, 1436,
        1372, 1308, 1244, 1180, 1116, 1052, 988, 924,
        876, 844, 812, 780, 748, 716, 684, 652,
        620, 588, 556, 524, 492, 460, 428, 396,
        372, 356, 340, 324, 308, 292, 276, 260,
        244, 228, 212, 196, 180, 164, 148, 132,
        120, 112, 104, 96, 88, 80, 72, 64,
        56, 48, 40, 32, 24, 16, 8, 0,
    ];

    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32635;

    /// Encode a single linear sample to μ-law
    pub fn encode_sample(sample: i16) -> u8 {
        let sample = sample as i32;

        // Get sign and magnitude; i32 keeps i16::MIN from overflowing
        let sign: u8 = if sample < 0 { 0x80 } else { 0x00 };
        let mag = (sample.abs().min(Self::CLIP)) + Self::BIAS;

        // Find exponent and mantissa
        let exponent = Self::ULAW_COMPRESS_TABLE[(mag >> 7) as usize];
        let mantissa = ((mag >> (exponent + 3)) & 0x0F) as u8;

        // Combine and invert
        !(sign | (exponent << 4) | mantissa)
    }

    /// Encode PCM samples to μ-law, appending one byte per sample to `out`
    pub fn encode_into<B: BufMut>(pcm: &[i16], out: &mut B) -> usize {
        for &sample in pcm {
            out.put_u8(Self::encode_sample(sample));
        }
        pcm.len()
    }

    /// Decode a single μ-law byte
    pub fn decode_sample(ulaw: u8) -> i16 {
        Self::ULAW_DECOMPRESS_TABLE[ulaw as usize]
    }

    /// Decode μ-law to PCM samples
    pub fn decode(ulaw: &[u8]) -> Vec<i16> {
        ulaw.iter().map(|&byte| Self::decode_sample(byte)).collect()
    }
}
