mod compose;
mod mean;
mod mog;
mod morphology;
mod params;
mod temporal;
pub mod types;

pub use compose::{apply_mask, foreground_only, mask_to_rgb};
pub use mean::MeanImageModel;
pub use mog::{Component, GaussianMixtureModel};
pub use morphology::MaskPostprocessor;
pub use params::ModelParameters;
pub use temporal::{TemporalGradientModel, Volume};
pub use types::{Label, Mask, SegmentationModel};
