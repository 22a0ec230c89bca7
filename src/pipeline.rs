use crate::capture::FrameSource;
use crate::error::{Result, SegmentError};
use crate::output::OutputSink;
use crate::segmentation::types::{check_dimensions, FOREGROUND};
use crate::segmentation::{
    apply_mask, foreground_only, mask_to_rgb, GaussianMixtureModel, Mask, MaskPostprocessor,
    MeanImageModel, ModelParameters, SegmentationModel, TemporalGradientModel, Volume,
};
use image::RgbImage;
use std::time::{Duration, Instant};

/// Frames between timing reports
const STATS_INTERVAL: usize = 30;

/// Background removal strategy and its settings
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Threshold the distance from the mean of the whole sequence
    MeanSubtraction { threshold: f32, cleanup: bool },
    /// Mixture of Gaussians, shadows reported as foreground
    SimpleMog(ModelParameters),
    /// Mixture of Gaussians with shadow pixels removed from the foreground
    ShadowMog(ModelParameters),
    /// Second temporal derivative over the whole sequence
    TemporalGradient {
        sigma: f32,
        threshold: f32,
        cleanup: bool,
    },
}

impl Strategy {
    /// The number the command line uses for this strategy
    pub fn option_number(&self) -> u8 {
        match self {
            Strategy::MeanSubtraction { .. } => 1,
            Strategy::SimpleMog(_) => 2,
            Strategy::ShadowMog(_) => 3,
            Strategy::TemporalGradient { .. } => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::MeanSubtraction { .. } => "mean-subtraction",
            Strategy::SimpleMog(_) => "mog",
            Strategy::ShadowMog(_) => "mog-shadow",
            Strategy::TemporalGradient { .. } => "temporal-gradient",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Strategy::MeanSubtraction { threshold, .. } => {
                if !(*threshold >= 0.0) || !threshold.is_finite() {
                    return Err(SegmentError::invalid_parameter(
                        "mean_threshold",
                        format!("{} must be a non-negative number", threshold),
                    ));
                }
                Ok(())
            }
            Strategy::SimpleMog(params) | Strategy::ShadowMog(params) => params.validate(),
            Strategy::TemporalGradient {
                sigma,
                threshold,
                cleanup,
            } => TemporalGradientModel::new(*sigma, *threshold, *cleanup).map(|_| ()),
        }
    }
}

/// What a finished run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub frames: usize,
    pub foreground_pixels: u64,
    /// The model's background estimate at the end of the run, if it keeps one
    pub background: Option<RgbImage>,
}

#[derive(Default)]
struct StageTimes {
    frames: usize,
    acquire: Duration,
    segment: Duration,
    output: Duration,
}

impl StageTimes {
    fn log(&self) {
        if self.frames == 0 {
            return;
        }
        let per_frame = |d: Duration| d.as_secs_f64() * 1000.0 / self.frames as f64;
        let acquire_ms = per_frame(self.acquire);
        let segment_ms = per_frame(self.segment);
        let output_ms = per_frame(self.output);
        tracing::info!(
            "Frame {}: acquire={:.1}ms, segment={:.1}ms, output={:.1}ms, total={:.1}ms",
            self.frames,
            acquire_ms,
            segment_ms,
            output_ms,
            acquire_ms + segment_ms + output_ms
        );
    }
}

/// Drives one strategy over a frame source into an output sink
pub struct SegmentationPipeline {
    strategy: Strategy,
    postprocessor: MaskPostprocessor,
    show_mask: bool,
}

impl SegmentationPipeline {
    /// Validates the strategy settings up front
    pub fn new(strategy: Strategy) -> Result<Self> {
        strategy.validate()?;
        Ok(Self {
            strategy,
            postprocessor: MaskPostprocessor::default(),
            show_mask: false,
        })
    }

    pub fn with_postprocessor(mut self, postprocessor: MaskPostprocessor) -> Self {
        self.postprocessor = postprocessor;
        self
    }

    /// Emit the mask visualisation instead of the masked frame
    pub fn with_show_mask(mut self, show_mask: bool) -> Self {
        self.show_mask = show_mask;
        self
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn run<S, O>(&self, source: &mut S, sink: &mut O) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        O: OutputSink + ?Sized,
    {
        let (width, height) = source.resolution();
        tracing::info!(
            "Running {} on {} frames at {}x{}",
            self.strategy.name(),
            source.frame_count(),
            width,
            height
        );

        let summary = match &self.strategy {
            Strategy::MeanSubtraction { threshold, cleanup } => {
                let mut model = MeanImageModel::from_source(source, *threshold)?;
                let summary = self.run_per_frame(&mut model, *cleanup, false, source, sink)?;
                RunSummary {
                    background: Some(model.mean_image()),
                    ..summary
                }
            }
            Strategy::SimpleMog(params) => {
                if params.shadow_detection {
                    tracing::warn!("Shadow detection is ignored by the simple mixture model");
                }
                let params = ModelParameters {
                    shadow_detection: false,
                    ..params.clone()
                };
                let cleanup = params.morphological_cleanup;
                let mut model = GaussianMixtureModel::new(params)?;
                let summary = self.run_per_frame(&mut model, cleanup, false, source, sink)?;
                mixture_summary(&model, summary)
            }
            Strategy::ShadowMog(params) => {
                let cleanup = params.morphological_cleanup;
                let mut model = GaussianMixtureModel::new(params.clone())?;
                let summary = self.run_per_frame(&mut model, cleanup, true, source, sink)?;
                mixture_summary(&model, summary)
            }
            Strategy::TemporalGradient {
                sigma,
                threshold,
                cleanup,
            } => {
                let model = TemporalGradientModel::new(*sigma, *threshold, *cleanup)?;
                self.run_volume(&model, source, sink)?
            }
        };

        tracing::info!(
            "Finished {}: {} frames, {} foreground pixels",
            self.strategy.name(),
            summary.frames,
            summary.foreground_pixels
        );
        Ok(summary)
    }

    fn run_per_frame<M, S, O>(
        &self,
        model: &mut M,
        cleanup: bool,
        drop_shadows: bool,
        source: &mut S,
        sink: &mut O,
    ) -> Result<RunSummary>
    where
        M: SegmentationModel + ?Sized,
        S: FrameSource + ?Sized,
        O: OutputSink + ?Sized,
    {
        let expected = source.resolution();
        let mut times = StageTimes::default();
        let mut summary = RunSummary::default();

        for index in 0..source.frame_count() {
            let acquire_start = Instant::now();
            let frame = source.read_frame(index)?;
            check_dimensions(index, expected, &frame)?;
            times.acquire += acquire_start.elapsed();

            let segment_start = Instant::now();
            let raw = model.segment(&frame)?;
            let mut mask = if drop_shadows {
                foreground_only(&raw)
            } else {
                raw.clone()
            };
            if cleanup {
                mask = self.postprocessor.open(&mask);
            }
            times.segment += segment_start.elapsed();

            // The shadow strategy shows shadows in grey before they are dropped
            let visual = if drop_shadows { &raw } else { &mask };
            let output_start = Instant::now();
            summary.foreground_pixels += self.emit(index, &frame, &mask, visual, sink)?;
            times.output += output_start.elapsed();

            summary.frames += 1;
            times.frames += 1;
            if times.frames % STATS_INTERVAL == 0 {
                times.log();
            }
        }

        times.log();
        Ok(summary)
    }

    fn run_volume<S, O>(
        &self,
        model: &TemporalGradientModel,
        source: &mut S,
        sink: &mut O,
    ) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        O: OutputSink + ?Sized,
    {
        let acquire_start = Instant::now();
        let volume = Volume::from_source(source)?;
        let acquire = acquire_start.elapsed();

        let segment_start = Instant::now();
        let masks = model.segment_volume(&volume);
        let segment = segment_start.elapsed();

        let output_start = Instant::now();
        let mut summary = RunSummary::default();
        for (index, mask) in masks.iter().enumerate() {
            let frame = volume.frame(index).ok_or_else(|| {
                SegmentError::source_unavailable("<volume>", format!("missing frame {}", index))
            })?;
            summary.foreground_pixels += self.emit(index, &frame, mask, mask, sink)?;
            summary.frames += 1;
        }

        StageTimes {
            frames: summary.frames,
            acquire,
            segment,
            output: output_start.elapsed(),
        }
        .log();
        Ok(summary)
    }

    /// Compose and write one output frame, returning its foreground pixel count
    fn emit<O: OutputSink + ?Sized>(
        &self,
        index: usize,
        frame: &RgbImage,
        mask: &Mask,
        visual: &Mask,
        sink: &mut O,
    ) -> Result<u64> {
        let output = if self.show_mask {
            mask_to_rgb(visual)
        } else {
            apply_mask(frame, mask)
        };
        sink.write_frame(index, &output)?;
        Ok(mask.pixels().filter(|p| p[0] == FOREGROUND).count() as u64)
    }
}

/// Attach the mixture's background estimate, absent when no frame was seen
fn mixture_summary(model: &GaussianMixtureModel, summary: RunSummary) -> RunSummary {
    let background = (summary.frames > 0).then(|| model.background_estimate());
    RunSummary {
        background,
        ..summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameBuffer;
    use image::Rgb;

    #[derive(Default)]
    struct CollectSink {
        frames: Vec<(usize, RgbImage)>,
    }

    impl OutputSink for CollectSink {
        fn write_frame(&mut self, index: usize, frame: &RgbImage) -> Result<()> {
            self.frames.push((index, frame.clone()));
            Ok(())
        }
    }

    fn white_pixels(frame: &RgbImage) -> Vec<(u32, u32)> {
        frame
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == 255)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn test_single_mixture_scenario() {
        let black = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        let mut changed = black.clone();
        changed.put_pixel(1, 1, Rgb([255, 0, 0]));
        let mut source = FrameBuffer::new(vec![black.clone(), black, changed]);

        let params = ModelParameters {
            nmixtures: 1,
            variance_threshold: 1.0,
            morphological_cleanup: false,
            ..Default::default()
        };
        let pipeline = SegmentationPipeline::new(Strategy::SimpleMog(params))
            .unwrap()
            .with_show_mask(true);
        let mut sink = CollectSink::default();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();

        assert_eq!((summary.frames, summary.foreground_pixels), (3, 1));
        let indices: Vec<usize> = sink.frames.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(white_pixels(&sink.frames[0].1).is_empty());
        assert!(white_pixels(&sink.frames[1].1).is_empty());
        assert_eq!(white_pixels(&sink.frames[2].1), vec![(1, 1)]);
    }

    #[test]
    fn test_masked_output_keeps_foreground_colour() {
        let gray = RgbImage::from_pixel(3, 3, Rgb([50, 50, 50]));
        let mut changed = gray.clone();
        changed.put_pixel(0, 2, Rgb([10, 200, 30]));
        let mut source = FrameBuffer::new(vec![gray.clone(), changed]);

        let params = ModelParameters {
            variance_threshold: 4.0,
            morphological_cleanup: false,
            ..Default::default()
        };
        let pipeline = SegmentationPipeline::new(Strategy::SimpleMog(params)).unwrap();
        let mut sink = CollectSink::default();
        pipeline.run(&mut source, &mut sink).unwrap();

        let out = &sink.frames[1].1;
        assert_eq!(out.get_pixel(0, 2), &Rgb([10, 200, 30]));
        assert_eq!(out.get_pixel(1, 1), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_mean_subtraction_uniform_gray() {
        let gray = RgbImage::from_pixel(4, 4, Rgb([128, 128, 128]));
        let mut source = FrameBuffer::new(vec![gray.clone(), gray]);
        let pipeline = SegmentationPipeline::new(Strategy::MeanSubtraction {
            threshold: 1.0,
            cleanup: true,
        })
        .unwrap();
        let mut sink = CollectSink::default();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();

        assert_eq!((summary.frames, summary.foreground_pixels), (2, 0));
        assert!(sink
            .frames
            .iter()
            .all(|(_, f)| f.pixels().all(|p| p == &Rgb([0, 0, 0]))));
        assert_eq!(
            summary.background,
            Some(RgbImage::from_pixel(4, 4, Rgb([128, 128, 128])))
        );
    }

    #[test]
    fn test_mixture_reports_background_estimate() {
        let scene = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8 * 60, y as u8 * 90, 40]));
        let mut passing = scene.clone();
        passing.put_pixel(1, 1, Rgb([250, 10, 10]));
        let mut source = FrameBuffer::new(vec![scene.clone(), scene.clone(), passing]);

        let params = ModelParameters {
            variance_threshold: 4.0,
            morphological_cleanup: false,
            ..Default::default()
        };
        let pipeline = SegmentationPipeline::new(Strategy::ShadowMog(params)).unwrap();
        let mut sink = CollectSink::default();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();

        // A single passing value never outranks the established background
        assert_eq!(summary.background, Some(scene));
    }

    #[test]
    fn test_shadow_strategy_excludes_shadow() {
        let lit = RgbImage::from_pixel(2, 1, Rgb([200, 160, 120]));
        let mut shaded = lit.clone();
        shaded.put_pixel(0, 0, Rgb([140, 112, 84]));
        let params = ModelParameters {
            variance_threshold: 4.0,
            shadow_detection: true,
            morphological_cleanup: false,
            ..Default::default()
        };

        let mut source = FrameBuffer::new(vec![lit.clone(), lit.clone(), shaded.clone()]);
        let pipeline = SegmentationPipeline::new(Strategy::ShadowMog(params.clone())).unwrap();
        let mut sink = CollectSink::default();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();
        assert_eq!(summary.foreground_pixels, 0);

        // The simple strategy keeps the darkened pixel as foreground
        let mut source = FrameBuffer::new(vec![lit.clone(), lit, shaded]);
        let pipeline = SegmentationPipeline::new(Strategy::SimpleMog(params)).unwrap();
        let mut sink = CollectSink::default();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();
        assert_eq!(summary.foreground_pixels, 1);
    }

    #[test]
    fn test_temporal_gradient_static_sequence() {
        let frame = RgbImage::from_fn(5, 4, |x, y| Rgb([x as u8 * 30, y as u8 * 30, 90]));
        let mut source = FrameBuffer::new(vec![frame; 8]);
        let pipeline = SegmentationPipeline::new(Strategy::TemporalGradient {
            sigma: 5.0,
            threshold: 10.0,
            cleanup: false,
        })
        .unwrap();
        let mut sink = CollectSink::default();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();

        assert_eq!((summary.frames, summary.foreground_pixels), (8, 0));
        assert!(summary.background.is_none());
        assert!(sink
            .frames
            .iter()
            .all(|(_, f)| f.pixels().all(|p| p == &Rgb([0, 0, 0]))));
    }

    #[test]
    fn test_cleanup_removes_isolated_foreground() {
        let black = RgbImage::from_pixel(6, 6, Rgb([0, 0, 0]));
        let mut changed = black.clone();
        changed.put_pixel(3, 3, Rgb([255, 255, 255]));
        let mut source = FrameBuffer::new(vec![black, changed]);

        let params = ModelParameters {
            variance_threshold: 4.0,
            ..Default::default()
        };
        let pipeline = SegmentationPipeline::new(Strategy::SimpleMog(params)).unwrap();
        let mut sink = CollectSink::default();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();
        assert_eq!(summary.foreground_pixels, 0);
    }

    #[test]
    fn test_dimension_mismatch_aborts() {
        let mut source = FrameBuffer::new(vec![
            RgbImage::new(4, 4),
            RgbImage::new(4, 4),
            RgbImage::new(3, 4),
        ]);
        let pipeline =
            SegmentationPipeline::new(Strategy::SimpleMog(ModelParameters::default())).unwrap();
        let mut sink = CollectSink::default();

        let err = pipeline.run(&mut source, &mut sink).err().unwrap();
        assert!(matches!(
            err,
            SegmentError::DimensionMismatch {
                index: 2,
                expected: (4, 4),
                actual: (3, 4)
            }
        ));
        // Frames written before the failure stay written
        assert_eq!(sink.frames.len(), 2);
    }

    #[test]
    fn test_invalid_parameters_rejected_at_construction() {
        let params = ModelParameters {
            nmixtures: 0,
            ..Default::default()
        };
        assert!(matches!(
            SegmentationPipeline::new(Strategy::ShadowMog(params)),
            Err(SegmentError::InvalidParameter { name: "nmixtures", .. })
        ));
        assert!(SegmentationPipeline::new(Strategy::MeanSubtraction {
            threshold: -5.0,
            cleanup: false
        })
        .is_err());
        assert!(SegmentationPipeline::new(Strategy::TemporalGradient {
            sigma: -1.0,
            threshold: 10.0,
            cleanup: false
        })
        .is_err());
    }

    #[test]
    fn test_strategy_numbers() {
        let params = ModelParameters::default();
        assert_eq!(
            Strategy::MeanSubtraction { threshold: 25.0, cleanup: false }.option_number(),
            1
        );
        assert_eq!(Strategy::SimpleMog(params.clone()).option_number(), 2);
        assert_eq!(Strategy::ShadowMog(params).option_number(), 3);
        assert_eq!(
            Strategy::TemporalGradient { sigma: 5.0, threshold: 10.0, cleanup: false }
                .option_number(),
            4
        );
    }
}
