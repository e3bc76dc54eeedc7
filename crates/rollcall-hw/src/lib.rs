//! rollcall-hw — Hardware collaborators for the attendance system.
//!
//! V4L2 camera capture plus the operator feedback panel (16x2 I2C LCD and
//! GPIO buzzer) behind an explicit init/teardown handle.

pub mod camera;
pub mod feedback;
pub mod frame;

pub use camera::{Camera, CameraError};
pub use feedback::{FeedbackConfig, FeedbackError, FeedbackPanel};
pub use frame::Frame;
