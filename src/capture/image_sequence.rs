use super::FrameSource;
use crate::error::{Result, SegmentError};
use image::RgbImage;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "ppm", "tif", "tiff"];

/// Indexed image files, either a printf-style pattern (`frames/%05d.jpg`)
/// or every image file in a directory sorted by name.
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    width: u32,
    height: u32,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(input: P) -> Result<Self> {
        let input = input.as_ref();
        tracing::info!("Opening image sequence {}", input.display());

        let paths = if input.is_dir() {
            list_directory(input)?
        } else if let Some(pattern) = IndexPattern::parse(&input.to_string_lossy()) {
            pattern.resolve()
        } else if input.exists() {
            return Err(SegmentError::source_unavailable(
                input,
                "not an image sequence; decode the video into numbered frames first",
            ));
        } else {
            return Err(SegmentError::source_unavailable(input, "path does not exist"));
        };

        let first = paths
            .first()
            .ok_or_else(|| SegmentError::FrameCountUnknown {
                path: input.to_path_buf(),
            })?;
        let (width, height) = image::image_dimensions(first).map_err(|e| {
            SegmentError::source_unavailable(first, format!("cannot read image header: {}", e))
        })?;

        tracing::info!(
            "Image sequence has {} frames at {}x{}",
            paths.len(),
            width,
            height
        );

        Ok(Self {
            paths,
            width,
            height,
        })
    }
}

impl FrameSource for ImageSequence {
    fn frame_count(&self) -> usize {
        self.paths.len()
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self, index: usize) -> Result<RgbImage> {
        let path = self.paths.get(index).ok_or_else(|| {
            SegmentError::source_unavailable(
                format!("<frame {}>", index),
                format!("sequence has {} frames", self.paths.len()),
            )
        })?;
        let decoded = image::open(path)
            .map_err(|e| SegmentError::source_unavailable(path, e.to_string()))?;
        Ok(decoded.to_rgb8())
    }
}

fn list_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| SegmentError::source_unavailable(dir, e.to_string()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `prefix%0Ndsuffix` split into its parts
#[derive(Debug, PartialEq)]
struct IndexPattern {
    prefix: String,
    width: usize,
    suffix: String,
}

impl IndexPattern {
    fn parse(pattern: &str) -> Option<Self> {
        let start = pattern.find('%')?;
        let rest = &pattern[start + 1..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let rest = &rest[digits.len()..];
        let suffix = rest.strip_prefix('d')?;
        let width = if digits.is_empty() {
            0
        } else {
            digits.parse().ok()?
        };
        Some(Self {
            prefix: pattern[..start].to_string(),
            width,
            suffix: suffix.to_string(),
        })
    }

    fn path_for(&self, index: usize) -> PathBuf {
        PathBuf::from(format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.suffix,
            width = self.width
        ))
    }

    /// Consecutive existing files starting at index 0, or 1 when 0 is absent
    fn resolve(&self) -> Vec<PathBuf> {
        let start = if self.path_for(0).is_file() { 0 } else { 1 };
        (start..)
            .map(|i| self.path_for(i))
            .take_while(|p| p.is_file())
            .collect()
    }
}
