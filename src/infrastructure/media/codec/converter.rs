//! Linear PCM to recording format conversion

use super::g711::{PcmuCodec, G711_CLOCK_RATE};
use super::resampler::{create_resampler, Resampler};
use crate::domain::shared::Result;
use bytes::BufMut;
use tracing::debug;

/// Converts linear 16-bit frames of the original call into 8 kHz μ-law
pub struct SampleConverter {
    source_rate: u32,
    resampler: Option<Box<dyn Resampler>>,
    resampled: Vec<i16>,
}

impl SampleConverter {
    /// Create a converter for frames sampled at `source_rate`
    ///
    /// A resampler is only created when the source rate differs from the
    /// 8 kHz recording rate.
    pub fn new(source_rate: u32, quality: u8) -> Result<Self> {
        let target_rate = G711_CLOCK_RATE;
        let resampler = if source_rate != target_rate {
            debug!("Resampling {} Hz -> {} Hz (quality {})", source_rate, target_rate, quality);
            Some(create_resampler(source_rate, target_rate, quality)?)
        } else {
            None
        };

        Ok(Self::with_resampler(source_rate, resampler))
    }

    /// Create a converter around an explicit resampler
    pub fn with_resampler(source_rate: u32, resampler: Option<Box<dyn Resampler>>) -> Self {
        Self {
            source_rate,
            resampler,
            resampled: Vec::new(),
        }
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn is_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    /// Convert one frame, appending μ-law bytes to `out`; returns bytes written
    pub fn convert<B: BufMut>(&mut self, samples: &[i16], out: &mut B) -> usize {
        if samples.is_empty() {
            return 0;
        }

        match self.resampler.as_mut() {
            Some(resampler) => {
                self.resampled.clear();
                resampler.process(samples, &mut self.resampled);
                PcmuCodec::encode_into(&self.resampled, out)
            }
            None => PcmuCodec::encode_into(samples, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_same_rate_skips_resampling() {
        let mut converter = SampleConverter::new(8000, 2).unwrap();
        assert!(!converter.is_resampling());

        let mut out = BytesMut::new();
        let written = converter.convert(&[0i16; 160], &mut out);
        assert_eq!(written, 160);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn test_wideband_frame_is_downsampled() {
        let mut converter = SampleConverter::new(16000, 2).unwrap();
        assert!(converter.is_resampling());

        let mut out = BytesMut::new();
        let written = converter.convert(&[500i16; 320], &mut out);
        assert_eq!(written, 160);
    }

    #[test]
    fn test_zero_length_frame() {
        let mut converter = SampleConverter::new(16000, 2).unwrap();
        let mut out = BytesMut::new();
        assert_eq!(converter.convert(&[], &mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_invalid_rate_fails() {
        assert!(SampleConverter::new(0, 2).is_err());
    }
}
