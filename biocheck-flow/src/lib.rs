pub mod auth;
pub mod bridge;
pub mod camera;
pub mod config;
pub mod error;
pub mod flow;
pub mod report;
pub mod retry;
pub mod session;
pub mod timer;
pub mod validation;
#[cfg(feature = "opencv")]
pub mod v4l2;

pub use bridge::{encode_reply, exit_code, parse_reply, prepare, run_request, StartRequest};
pub use camera::{CameraController, StillImageSource, StreamHandle, VideoSource};
pub use config::{SessionConfig, Settings};
pub use error::{CameraError, ErrorCode, FlowError, SubmitError, TokenError};
pub use flow::{CapturePhase, FlowController, FlowView, Page, UserAction};
pub use report::{Attributes, Outcome, ValidationResult};
pub use session::Session;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
