use crate::error::{Result, SegmentError};

/// Settings shared by both mixture-of-Gaussians strategies
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    /// Warm-up window; the automatic learning rate is `1 / min(frames, history)`
    pub history: u32,
    /// Gaussian components per pixel
    pub nmixtures: usize,
    /// Blend factor in [0, 1]; 0 freezes the model after seeding.
    /// Negative selects the automatic rate derived from `history`.
    pub learning_rate: f32,
    /// Cumulative weight that selects the leading background components
    pub background_ratio: f32,
    /// Squared distance over variance below which a pixel matches a component
    pub variance_threshold: f32,
    /// Standard deviation of a freshly seeded component
    pub noise_sigma: f32,
    /// Variance floor applied while adapting
    pub min_variance: f32,
    pub shadow_detection: bool,
    /// Lower bound of the brightness-ratio band `[shadow_threshold, 1]`
    /// in which a darkened background colour counts as shadow
    pub shadow_threshold: f32,
    pub morphological_cleanup: bool,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            history: 100,
            nmixtures: 5,
            learning_rate: 0.005,
            background_ratio: 0.7,
            variance_threshold: 16.0,
            noise_sigma: 15.0,
            min_variance: 4.0,
            shadow_detection: false,
            shadow_threshold: 0.5,
            morphological_cleanup: true,
        }
    }
}

impl ModelParameters {
    /// Reject out-of-range settings. Nothing is clamped.
    pub fn validate(&self) -> Result<()> {
        if self.nmixtures == 0 {
            return Err(SegmentError::invalid_parameter(
                "nmixtures",
                "at least one component per pixel is required",
            ));
        }
        if !(self.background_ratio > 0.0 && self.background_ratio <= 1.0) {
            return Err(SegmentError::invalid_parameter(
                "background_ratio",
                format!("{} is outside (0, 1]", self.background_ratio),
            ));
        }
        if !(self.variance_threshold >= 0.0) || !self.variance_threshold.is_finite() {
            return Err(SegmentError::invalid_parameter(
                "variance_threshold",
                format!("{} must be a non-negative number", self.variance_threshold),
            ));
        }
        if self.learning_rate.is_nan() || self.learning_rate > 1.0 {
            return Err(SegmentError::invalid_parameter(
                "learning_rate",
                format!("{} is above 1", self.learning_rate),
            ));
        }
        if self.learning_rate < 0.0 && self.history == 0 {
            return Err(SegmentError::invalid_parameter(
                "history",
                "the automatic learning rate needs a history of at least one frame",
            ));
        }
        if !(self.noise_sigma > 0.0) || !self.noise_sigma.is_finite() {
            return Err(SegmentError::invalid_parameter(
                "noise_sigma",
                format!("{} must be positive", self.noise_sigma),
            ));
        }
        if !(self.min_variance > 0.0) || !self.min_variance.is_finite() {
            return Err(SegmentError::invalid_parameter(
                "min_variance",
                format!("{} must be positive", self.min_variance),
            ));
        }
        if !(self.shadow_threshold > 0.0 && self.shadow_threshold < 1.0) {
            return Err(SegmentError::invalid_parameter(
                "shadow_threshold",
                format!("{} is outside (0, 1)", self.shadow_threshold),
            ));
        }
        Ok(())
    }

    /// Learning rate to apply on the `frames_seen`-th frame (1-based)
    pub fn learning_rate_at(&self, frames_seen: u64) -> f32 {
        if self.learning_rate >= 0.0 {
            self.learning_rate
        } else {
            1.0 / frames_seen.clamp(1, self.history.max(1) as u64) as f32
        }
    }
}
