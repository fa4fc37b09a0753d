//! Frequency-domain low-pass filter
//!
//! Each channel of the chunk goes through a forward FFT, every bin from
//! `keep_fraction * len` upward is zeroed, and the inverse FFT's real part
//! replaces the samples.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::audio::AudioDescriptor;
use crate::constants::DEFAULT_LOW_PASS_KEEP;
use crate::error::TransformError;
use crate::transform::SampleTransform;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPass {
    keep_fraction: f64,
}

impl Default for LowPass {
    fn default() -> Self {
        Self {
            keep_fraction: DEFAULT_LOW_PASS_KEEP,
        }
    }
}

impl LowPass {
    /// `keep_fraction` is the share of bins (from bin 0) left untouched
    pub fn new(keep_fraction: f64) -> Result<Self, TransformError> {
        if !(keep_fraction > 0.0 && keep_fraction <= 1.0) {
            return Err(TransformError::InvalidParameter(format!(
                "low-pass keep fraction {} outside (0, 1]",
                keep_fraction
            )));
        }
        Ok(Self { keep_fraction })
    }

    pub fn keep_fraction(&self) -> f64 {
        self.keep_fraction
    }
}

impl SampleTransform for LowPass {
    fn name(&self) -> &str {
        "low-pass"
    }

    fn apply(&self, samples: &mut [f64], descriptor: &AudioDescriptor) {
        let channels = descriptor.channels.max(1) as usize;
        let frames = samples.len() / channels;
        if frames == 0 {
            return;
        }

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(frames);
        let inverse = planner.plan_fft_inverse(frames);
        let cutoff = (frames as f64 * self.keep_fraction).floor() as usize;
        let norm = 1.0 / frames as f64;
        let mut buffer = vec![Complex::new(0.0, 0.0); frames];

        for channel in 0..channels {
            for (frame, bin) in buffer.iter_mut().enumerate() {
                *bin = Complex::new(samples[frame * channels + channel], 0.0);
            }

            forward.process(&mut buffer);
            for bin in &mut buffer[cutoff..] {
                *bin = Complex::new(0.0, 0.0);
            }
            inverse.process(&mut buffer);

            for (frame, value) in buffer.iter().enumerate() {
                samples[frame * channels + channel] = value.re * norm;
            }
        }
    }
}
