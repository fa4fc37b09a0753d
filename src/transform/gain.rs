//! Linear gain

use crate::audio::AudioDescriptor;
use crate::error::TransformError;
use crate::transform::SampleTransform;

/// Multiplies every sample by `10^(dB/20)` and clips to `[-1, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    db: f64,
    factor: f64,
}

impl Gain {
    pub fn from_db(db: f64) -> Result<Self, TransformError> {
        if !db.is_finite() {
            return Err(TransformError::InvalidParameter(format!("gain {} dB", db)));
        }
        Ok(Self {
            db,
            factor: 10f64.powf(db / 20.0),
        })
    }

    pub fn db(&self) -> f64 {
        self.db
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl SampleTransform for Gain {
    fn name(&self) -> &str {
        "gain"
    }

    fn apply(&self, samples: &mut [f64], _descriptor: &AudioDescriptor) {
        for sample in samples.iter_mut() {
            *sample = (*sample * self.factor).clamp(-1.0, 1.0);
        }
    }
}
