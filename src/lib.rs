// YouTube frame capture: resolve a playable format, stream it into the
// decoder, return one PNG frame.

pub mod capture;
pub mod config;
pub mod handler;
pub mod server;

pub use capture::{CaptureError, CaptureRequest, CapturedFrame, FrameCapturer};
pub use config::CaptureConfig;
