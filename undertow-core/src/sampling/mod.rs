//! Bounded sampling and content inspection
//!
//! Pulls a fixed-size slice from the middle of a remote object, extracts a
//! still frame from it and runs a pluggable classifier over that frame.

pub mod classifier;
pub mod frame;
pub mod inspector;
pub mod sampler;

pub use classifier::{Classifier, ClassifierError, StubClassifier};
pub use frame::{
    ExtractionError, FfmpegFrameExtractor, FrameExtractor, FrameSource, StillFrameGrabber,
};
pub use inspector::{ContentInspector, InspectionError, InspectionReport};
pub use sampler::{BoundedSampler, Sample, SampleError, SamplePlan};
