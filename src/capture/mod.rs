// Frame-capture pipeline: resolver -> fetcher -> extractor, driven by the orchestrator

pub mod diagnostics;
pub mod errors;
pub mod extractor;
pub mod fetcher;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod resolvers;
pub mod tools;
pub mod traits;
pub mod utils;

pub use errors::{AttemptError, AttemptStage, CaptureError, FailureKind};
pub use models::{CandidateFormat, CandidateSet, CaptureRequest, CapturedFrame, PlaybackContext};
pub use orchestrator::FrameCapturer;
pub use traits::{FrameExtractor, MediaResolver, MediaStream, StreamFetcher};
