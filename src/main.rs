use anyhow::{Context, Result};
use bgsub::capture::{FrameSource, ImageSequence};
use bgsub::output::ImageDirectory;
use bgsub::segmentation::{MaskPostprocessor, ModelParameters};
use bgsub::{SegmentationPipeline, Strategy};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input frames: a printf-style pattern such as frames/%05d.jpg, or a directory
    #[arg(short, long)]
    input: PathBuf,

    /// Output root; frames are written to <output>/option_<n>/
    #[arg(short, long)]
    output: PathBuf,

    /// 1 mean image subtraction, 2 MOG, 3 MOG with shadow detection, 4 temporal gradient
    #[arg(long, default_value_t = 2)]
    bg_option: u8,

    /// Number of Gaussians per pixel
    #[arg(long, default_value_t = 5)]
    nmixtures: usize,

    /// Background ratio for MOG
    #[arg(long, default_value_t = 0.7)]
    bg_ratio: f32,

    /// MOG learning rate; 0 keeps only the first frame as background,
    /// negative derives it from --history
    #[arg(long, default_value_t = 0.005, allow_hyphen_values = true)]
    learning_rate: f32,

    /// Morphological cleanup of the mask
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    morph: bool,

    /// Structuring element radius for the cleanup
    #[arg(long, default_value_t = 1)]
    morph_radius: u8,

    /// Shadow detection (option 3)
    #[arg(long)]
    shadow_det: bool,

    /// Lower brightness ratio a shadow may have relative to the background
    #[arg(long, default_value_t = 0.5)]
    shadow_ratio: f32,

    /// History length for MOG
    #[arg(long, default_value_t = 100)]
    history: u32,

    /// Standard deviation of a new Gaussian
    #[arg(long, default_value_t = 15.0)]
    noise_std: f32,

    /// Variance threshold for a pixel to match a Gaussian
    #[arg(long, default_value_t = 16.0)]
    var_thresh: f32,

    /// Threshold for mean removal (option 1)
    #[arg(long, default_value_t = 25.0)]
    mean_thresh: f32,

    /// Temporal smoothing scale in frames (option 4)
    #[arg(long, default_value_t = 5.0)]
    sigma: f32,

    /// Response threshold (option 4)
    #[arg(long, default_value_t = 10.0)]
    temporal_thresh: f32,

    /// Write the mask visualisation instead of the masked frames
    #[arg(long)]
    show_mask: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn model_parameters(&self) -> ModelParameters {
        ModelParameters {
            history: self.history,
            nmixtures: self.nmixtures,
            learning_rate: self.learning_rate,
            background_ratio: self.bg_ratio,
            variance_threshold: self.var_thresh,
            noise_sigma: self.noise_std,
            shadow_detection: self.shadow_det,
            shadow_threshold: self.shadow_ratio,
            morphological_cleanup: self.morph,
            ..ModelParameters::default()
        }
    }

    fn strategy(&self) -> Strategy {
        match self.bg_option {
            1 => Strategy::MeanSubtraction {
                threshold: self.mean_thresh,
                cleanup: false,
            },
            2 => Strategy::SimpleMog(self.model_parameters()),
            3 => Strategy::ShadowMog(self.model_parameters()),
            4 => Strategy::TemporalGradient {
                sigma: self.sigma,
                threshold: self.temporal_thresh,
                cleanup: self.morph,
            },
            other => {
                tracing::warn!("Unknown bg option {}, falling back to MOG", other);
                Strategy::SimpleMog(self.model_parameters())
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("bgsub starting");

    let strategy = args.strategy();
    let pipeline = SegmentationPipeline::new(strategy)
        .context("Invalid segmentation settings")?
        .with_postprocessor(MaskPostprocessor::new(args.morph_radius))
        .with_show_mask(args.show_mask);

    let folder = args
        .output
        .join(format!("option_{}", pipeline.strategy().option_number()));
    let mut sink = ImageDirectory::create(&folder)
        .with_context(|| format!("Failed to prepare output directory {}", folder.display()))?;

    let mut source = ImageSequence::open(&args.input)
        .with_context(|| format!("Failed to open input {}", args.input.display()))?;
    tracing::info!(
        "Input: {} frames at {:?}",
        source.frame_count(),
        source.resolution()
    );

    let summary = pipeline
        .run(&mut source, &mut sink)
        .context("Background removal failed")?;

    tracing::info!(
        "Wrote {} frames to {}",
        summary.frames,
        folder.display()
    );

    if args.debug || args.show_mask {
        if let Some(background) = &summary.background {
            let path = folder.join("background.jpg");
            background
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Background estimate written to {}", path.display());
        }
    }

    Ok(())
}
