// ── Domain model ──
//
// Session-level types derived from the controller's wire models.

pub mod device;
pub mod parameter;

pub use device::{Device, DeviceLists, Direction, SelectionState};
pub use parameter::{MAX_VALUE, Parameter, ParameterChange, caption_for};
