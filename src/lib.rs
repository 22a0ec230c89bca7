//! Background/foreground separation for finite frame sequences.
//!
//! A [`pipeline::SegmentationPipeline`] pulls frames from a
//! [`capture::FrameSource`], classifies them with one [`pipeline::Strategy`],
//! optionally cleans the mask with a morphological open and writes the
//! masked frames to an [`output::OutputSink`].

pub mod capture;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod segmentation;

pub use error::{Result, SegmentError};
pub use pipeline::{RunSummary, SegmentationPipeline, Strategy};
