//! Controllable target (UE5 editor) bindings

pub mod remote_control;
pub mod script;
pub mod traits;

pub use remote_control::{RemoteControlClient, RemoteControlConfig};
pub use traits::{CaptureError, ExecutionError, TargetClient};
