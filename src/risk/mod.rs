// Risk management module
pub mod protective;
pub mod sizing;

pub use protective::{ExitReason, ProtectiveStops};
pub use sizing::position_size;
