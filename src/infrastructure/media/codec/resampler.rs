//! Streaming sample rate conversion
//!
//! Frames arrive one packet at a time, so the resampler keeps its phase and
//! the last input sample between calls; feeding 20 ms frames one after the
//! other yields the same signal as resampling the whole stream at once.

use crate::domain::shared::{ForkError, Result};

/// Resampler primitive used by the sample converter
pub trait Resampler: Send {
    /// Resample `input`, appending the produced samples to `output`
    fn process(&mut self, input: &[i16], output: &mut Vec<i16>);

    fn from_rate(&self) -> u32;

    fn to_rate(&self) -> u32;
}

/// Create the default resampler for a rate pair
pub fn create_resampler(from_rate: u32, to_rate: u32, quality: u8) -> Result<Box<dyn Resampler>> {
    Ok(Box::new(LinearResampler::new(from_rate, to_rate, quality)?))
}

/// Linear interpolation resampler with an optional running-average
/// anti-alias pre-filter used when downsampling
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    /// Input samples advanced per output sample
    step: f64,
    /// Position of the next output sample; -1.0 addresses `last`
    position: f64,
    last: Option<i16>,
    filter: Option<MovingAverage>,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32, quality: u8) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(ForkError::Resampler(format!(
                "invalid rate conversion {} -> {}",
                from_rate, to_rate
            )));
        }

        // Window spans one output period of input samples
        let filter = if quality > 0 && from_rate > to_rate {
            let taps = ((from_rate as f64 / to_rate as f64).ceil() as usize).max(1);
            Some(MovingAverage::new(taps))
        } else {
            None
        };

        Ok(Self {
            from_rate,
            to_rate,
            step: from_rate as f64 / to_rate as f64,
            position: 0.0,
            last: None,
            filter,
        })
    }

    /// Number of output samples expected for `input_len` input samples
    pub fn output_len_hint(&self, input_len: usize) -> usize {
        ((input_len as f64) / self.step).ceil() as usize + 1
    }

    fn interpolate(&self, input: &[i16], position: f64) -> i16 {
        let index = position.floor();
        let frac = position - index;
        let index = index as isize;

        let at = |i: isize| -> f64 {
            if i < 0 {
                self.last.unwrap_or(0) as f64
            } else {
                input[i as usize] as f64
            }
        };

        let s0 = at(index);
        let s1 = at(index + 1);
        (s0 + (s1 - s0) * frac)
            .round()
            .clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}

impl Resampler for LinearResampler {
    fn process(&mut self, input: &[i16], output: &mut Vec<i16>) {
        if input.is_empty() {
            return;
        }

        let filtered;
        let input = match self.filter.as_mut() {
            Some(filter) => {
                filtered = filter.apply(input);
                filtered.as_slice()
            }
            None => input,
        };

        let last_index = (input.len() - 1) as f64;
        output.reserve(self.output_len_hint(input.len()));

        // Interpolate between sample floor(p) and floor(p) + 1
        while self.position.floor() + 1.0 <= last_index {
            output.push(self.interpolate(input, self.position));
            self.position += self.step;
        }

        // Rebase so the final sample of this frame becomes index -1
        self.position -= input.len() as f64;
        self.last = input.last().copied();
    }

    fn from_rate(&self) -> u32 {
        self.from_rate
    }

    fn to_rate(&self) -> u32 {
        self.to_rate
    }
}

/// Running average over the last `taps` samples, carried across frames
struct MovingAverage {
    history: Vec<i32>,
    cursor: usize,
    sum: i64,
}

impl MovingAverage {
    fn new(taps: usize) -> Self {
        Self {
            history: vec![0; taps],
            cursor: 0,
            sum: 0,
        }
    }

    fn apply(&mut self, input: &[i16]) -> Vec<i16> {
        let taps = self.history.len() as i64;
        input
            .iter()
            .map(|&sample| {
                let sample = sample as i32;
                self.sum += (sample - self.history[self.cursor]) as i64;
                self.history[self.cursor] = sample;
                self.cursor = (self.cursor + 1) % self.history.len();
                (self.sum / taps) as i16
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rate_rejected() {
        assert!(create_resampler(0, 8000, 2).is_err());
        assert!(create_resampler(16000, 0, 2).is_err());
    }

    #[test]
    fn test_downsample_halves_frame() {
        let mut resampler = LinearResampler::new(16000, 8000, 0).unwrap();
        let input: Vec<i16> = (0..320).map(|i| i as i16).collect();
        let mut output = Vec::new();
        resampler.process(&input, &mut output);

        assert_eq!(output.len(), 160);
        assert_eq!(output[0], 0);
        assert_eq!(output[1], 2);
        assert_eq!(output[159], 318);
    }

    #[test]
    fn test_consecutive_frames_are_continuous() {
        let mut resampler = LinearResampler::new(16000, 8000, 0).unwrap();
        let signal: Vec<i16> = (0..640).map(|i| i as i16).collect();
        let mut output = Vec::new();
        resampler.process(&signal[..320], &mut output);
        resampler.process(&signal[320..], &mut output);

        assert_eq!(output.len(), 320);
        for (i, sample) in output.iter().enumerate() {
            assert_eq!(*sample, (i * 2) as i16);
        }
    }

    #[test]
    fn test_non_integer_ratio_keeps_rate() {
        let mut resampler = LinearResampler::new(44100, 8000, 2).unwrap();
        let input = vec![1000i16; 4410];
        let mut output = Vec::new();
        for frame in input.chunks(441) {
            resampler.process(frame, &mut output);
        }

        // 100 ms of audio at 8 kHz, within one sample of rounding
        assert!((output.len() as i64 - 800).abs() <= 1, "got {}", output.len());
        // DC passes through the filter once its window has filled
        assert!(output[10..].iter().all(|&s| s == 1000));
    }

    #[test]
    fn test_empty_frame_is_noop() {
        let mut resampler = LinearResampler::new(16000, 8000, 2).unwrap();
        let mut output = Vec::new();
        resampler.process(&[], &mut output);
        assert!(output.is_empty());
    }
}
