use super::params::ModelParameters;
use super::types::{check_dimensions, Label, Mask, SegmentationModel};
use crate::error::Result;
use image::{Rgb, RgbImage};
use rayon::prelude::*;

/// Smallest weight a new component starts with while the model is learning
const MIN_INITIAL_WEIGHT: f32 = 1e-3;

/// One Gaussian mode of a pixel's colour history
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Component {
    pub weight: f32,
    pub mean: [f32; 3],
    /// Isotropic variance, shared by the three channels
    pub variance: f32,
}

impl Component {
    fn seeded(value: [f32; 3], variance: f32, weight: f32) -> Self {
        Self {
            weight,
            mean: value,
            variance,
        }
    }

    /// Ordering key, larger is more background-like
    fn rank(&self) -> f32 {
        self.weight / self.variance
    }

    fn distance2(&self, value: [f32; 3]) -> f32 {
        self.mean
            .iter()
            .zip(value.iter())
            .map(|(m, v)| (v - m) * (v - m))
            .sum()
    }
}

/// Per-frame constants for the pixel update
#[derive(Debug, Clone, Copy)]
struct UpdateConfig {
    capacity: usize,
    learning_rate: f32,
    background_ratio: f32,
    variance_threshold: f32,
    seed_variance: f32,
    min_variance: f32,
    shadow_threshold: Option<f32>,
}

/// Adaptive mixture-of-Gaussians background model
///
/// Each pixel keeps up to `nmixtures` components in a flat grid indexed by
/// `(row * width + col) * nmixtures`, ranked best-first by weight/variance.
/// Pixels are updated independently, so a frame is processed in parallel
/// while frames themselves must arrive in order.
pub struct GaussianMixtureModel {
    params: ModelParameters,
    width: u32,
    height: u32,
    components: Vec<Component>,
    counts: Vec<usize>,
    frames_seen: u64,
}

impl GaussianMixtureModel {
    pub fn new(params: ModelParameters) -> Result<Self> {
        params.validate()?;
        tracing::info!(
            "Mixture model: {} components, learning rate {}, background ratio {}, variance threshold {}, shadows {}",
            params.nmixtures,
            params.learning_rate,
            params.background_ratio,
            params.variance_threshold,
            params.shadow_detection
        );

        Ok(Self {
            params,
            width: 0,
            height: 0,
            components: Vec::new(),
            counts: Vec::new(),
            frames_seen: 0,
        })
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    /// Ranked components of the pixel at (x, y); empty before the first frame
    pub fn pixel_components(&self, x: u32, y: u32) -> &[Component] {
        if self.counts.is_empty() || x >= self.width || y >= self.height {
            return &[];
        }
        let pixel = (y * self.width + x) as usize;
        let start = pixel * self.params.nmixtures;
        &self.components[start..start + self.counts[pixel]]
    }

    /// Mean colour of every pixel's top-ranked component
    pub fn background_estimate(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            match self.pixel_components(x, y).first() {
                Some(c) => Rgb(c.mean.map(|m| m.round().clamp(0.0, 255.0) as u8)),
                None => Rgb([0, 0, 0]),
            }
        })
    }

    fn allocate(&mut self, width: u32, height: u32) {
        let pixels = width as usize * height as usize;
        tracing::debug!(
            "Allocating mixture state for {}x{} ({} pixels)",
            width,
            height,
            pixels
        );
        self.width = width;
        self.height = height;
        self.components = vec![Component::default(); pixels * self.params.nmixtures];
        self.counts = vec![0; pixels];
    }

    fn update_config(&self) -> UpdateConfig {
        UpdateConfig {
            capacity: self.params.nmixtures,
            learning_rate: self.params.learning_rate_at(self.frames_seen),
            background_ratio: self.params.background_ratio,
            variance_threshold: self.params.variance_threshold,
            seed_variance: self.params.noise_sigma * self.params.noise_sigma,
            min_variance: self.params.min_variance,
            shadow_threshold: self
                .params
                .shadow_detection
                .then_some(self.params.shadow_threshold),
        }
    }
}

impl SegmentationModel for GaussianMixtureModel {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("mog_segment", frame = self.frames_seen).entered();

        if self.counts.is_empty() {
            let (width, height) = frame.dimensions();
            self.allocate(width, height);
        } else {
            check_dimensions(self.frames_seen as usize, (self.width, self.height), frame)?;
        }
        self.frames_seen += 1;

        let config = self.update_config();
        let mut mask = Mask::new(self.width, self.height);
        let labels: &mut [u8] = &mut mask;

        self.components
            .par_chunks_mut(config.capacity)
            .zip(self.counts.par_iter_mut())
            .zip(frame.as_raw().par_chunks_exact(3))
            .zip(labels.par_iter_mut())
            .for_each(|(((components, count), pixel), label)| {
                let value = [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32];
                *label = update_pixel(components, count, value, &config).encode();
            });

        Ok(mask)
    }

    fn name(&self) -> &'static str {
        if self.params.shadow_detection {
            "mog-shadow"
        } else {
            "mog"
        }
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting mixture model state");
        self.components.clear();
        self.counts.clear();
        self.width = 0;
        self.height = 0;
        self.frames_seen = 0;
    }
}

/// Match, adapt, re-rank and classify one pixel
fn update_pixel(
    components: &mut [Component],
    count: &mut usize,
    value: [f32; 3],
    config: &UpdateConfig,
) -> Label {
    let n = *count;
    if n == 0 {
        components[0] = Component::seeded(value, config.seed_variance, 1.0);
        *count = 1;
        return Label::Background;
    }

    // Evaluated against the state before this observation is absorbed
    let shadow = config.shadow_threshold.is_some_and(|tau| {
        is_shadow(&components[..n], value, tau, config)
    });

    let matched = components[..n]
        .iter()
        .position(|c| c.distance2(value) < config.variance_threshold * c.variance);

    let rank = match matched {
        // A frozen model is a fixed reference: nothing it holds changes
        Some(k) if config.learning_rate == 0.0 => Some(k),
        Some(k) => {
            let lr = config.learning_rate;
            for (i, c) in components[..n].iter_mut().enumerate() {
                if i == k {
                    c.weight += lr * (1.0 - c.weight);
                } else {
                    c.weight *= 1.0 - lr;
                }
            }

            let c = &mut components[k];
            let rho = (lr / c.weight).min(1.0);
            let d2 = c.distance2(value);
            for (m, v) in c.mean.iter_mut().zip(value.iter()) {
                *m += rho * (v - *m);
            }
            c.variance = (c.variance + rho * (d2 - c.variance)).max(config.min_variance);

            normalize_weights(&mut components[..n]);
            Some(rerank(&mut components[..n], k))
        }
        None if config.learning_rate == 0.0 => None,
        None => {
            let slot = if n < config.capacity {
                *count = n + 1;
                n
            } else {
                n - 1
            };
            let weight = config.learning_rate.max(MIN_INITIAL_WEIGHT);
            components[slot] = Component::seeded(value, config.seed_variance, weight);
            normalize_weights(&mut components[..*count]);
            rerank(&mut components[..*count], slot);
            None
        }
    };

    match rank {
        Some(r) if in_background(&components[..*count], r, config.background_ratio) => {
            Label::Background
        }
        _ if shadow => Label::Shadow,
        _ => Label::Foreground,
    }
}

fn normalize_weights(components: &mut [Component]) {
    let total: f32 = components.iter().map(|c| c.weight).sum();
    if total > 0.0 {
        for c in components.iter_mut() {
            c.weight /= total;
        }
    }
}

/// Move the component at `index` to its place in an otherwise sorted slice.
/// Returns its new position.
fn rerank(components: &mut [Component], mut index: usize) -> usize {
    while index > 0 && components[index].rank() > components[index - 1].rank() {
        components.swap(index, index - 1);
        index -= 1;
    }
    while index + 1 < components.len() && components[index].rank() < components[index + 1].rank()
    {
        components.swap(index, index + 1);
        index += 1;
    }
    index
}

/// Number of leading components whose cumulative weight first exceeds the ratio
fn background_count(components: &[Component], background_ratio: f32) -> usize {
    let mut cumulative = 0.0;
    for (i, c) in components.iter().enumerate() {
        cumulative += c.weight;
        if cumulative > background_ratio {
            return i + 1;
        }
    }
    components.len()
}

fn in_background(components: &[Component], rank: usize, background_ratio: f32) -> bool {
    rank < background_count(components, background_ratio)
}

/// A pixel is shadow when it is a darkened copy of a background component:
/// brightness ratio within `[tau, 1]` and small colour distortion.
fn is_shadow(components: &[Component], value: [f32; 3], tau: f32, config: &UpdateConfig) -> bool {
    let background = background_count(components, config.background_ratio);
    components[..background].iter().any(|c| {
        let energy: f32 = c.mean.iter().map(|m| m * m).sum();
        if energy <= 0.0 {
            return false;
        }
        let dot: f32 = c.mean.iter().zip(value.iter()).map(|(m, v)| m * v).sum();
        let ratio = dot / energy;
        if ratio < tau || ratio > 1.0 {
            return false;
        }
        let distortion: f32 = c
            .mean
            .iter()
            .zip(value.iter())
            .map(|(m, v)| (v - ratio * m) * (v - ratio * m))
            .sum();
        distortion < config.variance_threshold * c.variance * ratio * ratio
    })
}
