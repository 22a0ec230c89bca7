use super::OutputSink;
use crate::error::{Result, SegmentError};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Writes each frame as `<dir>/<index:05>.<extension>`
pub struct ImageDirectory {
    dir: PathBuf,
    extension: String,
}

impl ImageDirectory {
    /// Create (if needed) and open `dir` for JPEG output
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::with_extension(dir, "jpg")
    }

    pub fn with_extension<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!("Preparing output directory {}", dir.display());

        std::fs::create_dir_all(dir).map_err(|source| SegmentError::DirectoryUnwritable {
            path: dir.to_path_buf(),
            source,
        })?;

        // Only an actual write answers for ownership, ACLs and read-only mounts
        tempfile::NamedTempFile::new_in(dir).map_err(|source| {
            SegmentError::DirectoryUnwritable {
                path: dir.to_path_buf(),
                source,
            }
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        })
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{:05}.{}", index, self.extension))
    }
}

impl OutputSink for ImageDirectory {
    fn write_frame(&mut self, index: usize, frame: &RgbImage) -> Result<()> {
        let path = self.frame_path(index);
        tracing::debug!("Writing {}", path.display());
        frame.save(&path)?;
        Ok(())
    }
}
